//! PK3/PKE-style ZIP archive, backed by the `zip` crate. A temp-file copy of
//! the last-written archive is kept around so an incremental save can
//! stream-copy unmodified entries' compressed bytes instead of recompressing
//! them.

use crate::archive::base::{Archive, ArchiveBase, ArchiveFormatId};
use crate::archive::dir::ArchiveDir;
use crate::archive::entry::ArchiveEntry;
use crate::errors::{ArchiveError, ArchiveResult};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive as ZipReader, ZipWriter};

pub struct ZipArchive {
    base: ArchiveBase,
    temp_file: parking_lot::Mutex<Option<tempfile::NamedTempFile>>,
    max_entry_size: u64,
}

impl ZipArchive {
    #[must_use]
    pub fn new(max_entry_size: u64) -> Self {
        Self { base: ArchiveBase::new(ArchiveFormatId::Zip), temp_file: parking_lot::Mutex::new(None), max_entry_size }
    }

    fn cache_temp_copy(&self, bytes: &[u8]) -> ArchiveResult<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix("slade-zip-")
            .tempfile()
            .map_err(|e| ArchiveError::Io(e))?;
        tmp.write_all(bytes).map_err(ArchiveError::Io)?;
        tmp.flush().map_err(ArchiveError::Io)?;
        *self.temp_file.lock() = Some(tmp);
        Ok(())
    }
}

impl Archive for ZipArchive {
    fn base(&self) -> &ArchiveBase {
        &self.base
    }

    fn open_bytes(&self, bytes: &[u8]) -> ArchiveResult<()> {
        self.cache_temp_copy(bytes)?;
        let mut reader =
            ZipReader::new(Cursor::new(bytes)).map_err(|e| ArchiveError::InvalidFormat(e.to_string()))?;
        let root = self.base.root().clone();

        for index in 0..reader.len() {
            let mut zip_entry =
                reader.by_index(index).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
            let method = zip_entry.compression();
            if method != CompressionMethod::Deflated && method != CompressionMethod::Stored {
                return Err(ArchiveError::UnsupportedFeature(format!("zip compression method {method:?}")));
            }
            let raw_name = zip_entry.name().to_string();
            let is_dir = zip_entry.is_dir() || raw_name.ends_with('/');
            let (dir_path, file_name) = split_path(&raw_name);
            let dir = if dir_path.is_empty() { root.clone() } else { root.create_dir_path(&dir_path) };

            if is_dir {
                continue;
            }
            let size = zip_entry.size();
            if size > self.max_entry_size {
                return Err(ArchiveError::EntryTooLarge(raw_name, size));
            }
            let mut data = Vec::with_capacity(size as usize);
            zip_entry.read_to_end(&mut data).map_err(ArchiveError::Io)?;
            let entry = ArchiveEntry::new(file_name, data);
            entry.set_ex_prop("ZipIndex", index as f64);
            entry.force_unmodified();
            dir.add_entry(entry, None)?;
        }
        Ok(())
    }

    fn write_bytes(&self) -> ArchiveResult<Vec<u8>> {
        let entries = self.base.entry_tree_as_list();
        let mut seen_names = std::collections::HashSet::new();
        for e in &entries {
            if !seen_names.insert(e.upper_name()) {
                return Err(ArchiveError::DuplicateName(e.name(), "/".to_string()));
            }
        }

        let old_source = self.temp_file.lock().as_ref().and_then(|f| std::fs::read(f.path()).ok());
        let old_reader = old_source.as_ref().and_then(|bytes| ZipReader::new(Cursor::new(bytes)).ok());

        let mut out = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut out));
            write_dir_contents(&mut writer, self.base.root(), old_reader.as_ref())?;
            writer.finish().map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        }

        for entry in &entries {
            entry.force_unmodified();
        }
        self.cache_temp_copy(&out)?;
        Ok(out)
    }
}

fn to_io_err(e: zip::result::ZipError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

/// Writes every entry under `dir` (recursively) with its fully-qualified
/// zip path, reusing the compressed bytes of unmodified entries from
/// `old_reader` when its `ZipIndex` still names the same path.
fn write_dir_contents<W: std::io::Write + std::io::Seek>(
    writer: &mut ZipWriter<W>,
    dir: &ArchiveDir,
    old_reader: Option<&ZipReader<Cursor<&Vec<u8>>>>,
) -> ArchiveResult<()> {
    let base_path = dir.path().trim_start_matches('/').to_string();
    for entry in dir.entries() {
        let path = if base_path.is_empty() { entry.name() } else { format!("{base_path}/{}", entry.name()) };
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut copied = false;
        if entry.state() == crate::archive::entry::EntryState::Unmodified {
            if let (Some(reader), Some(idx)) =
                (old_reader, entry.ex_prop("ZipIndex").map(|p| p.as_uint() as usize))
            {
                let mut reader = reader.clone();
                if let Ok(mut raw) = reader.by_index_raw(idx) {
                    if raw.name() == path {
                        writer.raw_copy_file(raw.by_ref()).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
                        copied = true;
                    }
                }
            }
        }
        if !copied {
            writer.start_file(&path, options).map_err(|e| ArchiveError::Io(to_io_err(e)))?;
            let data = entry.data_if_loaded().unwrap_or_default();
            writer.write_all(&data).map_err(ArchiveError::Io)?;
        }
    }
    for sub in dir.subdirs() {
        let sub_path = format!("{}/", sub.path().trim_start_matches('/'));
        writer.add_directory(&sub_path, SimpleFileOptions::default()).map_err(|e| ArchiveError::Io(to_io_err(e)))?;
        write_dir_contents(writer, &sub, old_reader)?;
    }
    Ok(())
}

fn split_path(path: &str) -> (String, String) {
    match path.trim_end_matches('/').rfind('/') {
        Some(i) => (path[..i].to_string(), path[i + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_separates_dir_and_file() {
        assert_eq!(split_path("maps/map01/TEXTMAP"), ("maps/map01".to_string(), "TEXTMAP".to_string()));
        assert_eq!(split_path("sprites.txt"), (String::new(), "sprites.txt".to_string()));
    }

    #[test]
    fn open_rejects_oversized_entry() {
        let mut out = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut out));
            writer.start_file("BIG", SimpleFileOptions::default()).unwrap();
            writer.write_all(&vec![0u8; 64]).unwrap();
            writer.finish().unwrap();
        }
        let archive = ZipArchive::new(16);
        let err = archive.open_bytes(&out).unwrap_err();
        assert!(matches!(err, ArchiveError::EntryTooLarge(_, _)));
    }

    #[test]
    fn open_then_write_round_trips_entry_names() {
        let mut out = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut out));
            writer.start_file("A.txt", SimpleFileOptions::default()).unwrap();
            writer.write_all(b"hi").unwrap();
            writer.finish().unwrap();
        }
        let archive = ZipArchive::new(1024 * 1024);
        archive.open_bytes(&out).unwrap();
        let rewritten = archive.write_bytes().unwrap();
        let mut reader = ZipReader::new(Cursor::new(rewritten)).unwrap();
        assert_eq!(reader.len(), 1);
        assert_eq!(reader.by_index(0).unwrap().name(), "A.txt");
    }
}
