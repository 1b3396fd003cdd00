//! Archive abstraction: a tree of entries read from, and written back to,
//! one of several on-disk container formats.

pub mod base;
pub mod dir;
pub mod dirarchive;
pub mod entry;
pub mod jaguar;
pub mod search;
pub mod signal;
pub mod vwad;
pub mod wad;
pub mod zip;

pub use base::{Archive, ArchiveBase, ArchiveFormatId, MapDesc};
pub use dir::ArchiveDir;
pub use entry::{ArchiveEntry, EntryState};
pub use search::SearchOptions;

/// Opens `path`, sniffing its format the way a format-detecting front end
/// would: directories go to `DirArchive`, a WAD-shaped header to
/// `WadArchive`, otherwise a ZIP central directory is attempted, and a
/// `vwad` magic is tried last. `cfg` supplies the skip-hidden flag, IWAD
/// lock, duplicate-name policy, VWAD signing identity, and entry size cap
/// that each format applies as it opens.
pub fn open_path(
    path: &std::path::Path,
    cfg: &crate::config::ArchiveConfig,
) -> crate::errors::ArchiveResult<std::sync::Arc<dyn Archive + Send + Sync>> {
    use crate::errors::ArchiveError;

    if path.is_dir() {
        let archive = std::sync::Arc::new(dirarchive::DirArchive::new(cfg.archive_dir_ignore_hidden));
        archive.open_file(path)?;
        return Ok(archive);
    }

    let bytes = std::fs::read(path).map_err(|_| ArchiveError::FileUnreadable(path.display().to_string()))?;

    if wad::is_wad_archive(&bytes) {
        let archive = std::sync::Arc::new(wad::WadArchive::new());
        archive.set_lock_iwad(cfg.iwad_lock);
        archive.open_bytes(&bytes)?;
        archive.base().set_filename(Some(path.to_path_buf()));
        archive.base().set_on_disk(true);
        archive.base().set_modified(false);
        return Ok(archive);
    }
    if wad::is_wad_archive_big_endian(&bytes) {
        let archive = std::sync::Arc::new(wad::WadArchive::new_jaguar());
        archive.set_lock_iwad(cfg.iwad_lock);
        archive.open_bytes(&bytes)?;
        archive.base().set_filename(Some(path.to_path_buf()));
        archive.base().set_on_disk(true);
        archive.base().set_modified(false);
        return Ok(archive);
    }

    if bytes.len() >= 4 && &bytes[0..4] == b"VWAD" {
        let archive = std::sync::Arc::new(vwad::VWadArchive::new());
        if !cfg.vwad_private_key.is_empty()
            && let Ok(key) = vwad::VWadKeyPair::from_z85(&cfg.vwad_private_key)
        {
            archive.set_signing_key(Some(key));
        }
        archive.open_bytes(&bytes)?;
        archive.base().root().set_allow_duplicate_names(cfg.vwad_allow_duplicate_names);
        if !cfg.vwad_author_name.is_empty() {
            archive.set_author(&cfg.vwad_author_name);
        }
        archive.base().set_filename(Some(path.to_path_buf()));
        archive.base().set_on_disk(true);
        archive.base().set_modified(false);
        return Ok(archive);
    }

    let archive = std::sync::Arc::new(zip::ZipArchive::new(cfg.max_entry_size_bytes()));
    archive.open_bytes(&bytes)?;
    archive.base().root().set_allow_duplicate_names(cfg.zip_allow_duplicate_names);
    archive.base().set_filename(Some(path.to_path_buf()));
    archive.base().set_on_disk(true);
    archive.base().set_modified(false);
    Ok(archive)
}
