//! Shared archive state and tree operations common to every concrete format
//! (§4 Archive base). Each format (`WadArchive`, `ZipArchive`, `VWadArchive`,
//! `DirArchive`) embeds an `ArchiveBase` and implements the `Archive` trait
//! for its own on-disk read/write.

use crate::archive::dir::ArchiveDir;
use crate::archive::entry::{ArchiveEntry, EntryState};
use crate::archive::search::{self, SearchOptions};
use crate::archive::signal::{ArchiveEvent, Listener, SignalBus};
use crate::errors::{ArchiveError, ArchiveResult};
use crate::map::MapFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormatId {
    Wad,
    WadJaguar,
    Zip,
    VWad,
    Dir,
}

impl ArchiveFormatId {
    #[must_use]
    pub const fn supports_dirs(self) -> bool {
        !matches!(self, Self::Wad | Self::WadJaguar)
    }
}

/// Describes a detected map within an archive: the bounding entry range (for
/// binary formats) and the identified wire format.
#[derive(Debug, Clone)]
pub struct MapDesc {
    pub name: String,
    pub head: ArchiveEntry,
    pub end: ArchiveEntry,
    pub format: MapFormat,
    /// Some maps (e.g. a WAD nested in a PK3 under `maps/`) are themselves
    /// whole archives rather than a lump range; `head == end` in that case.
    pub nested_archive: bool,
}

pub struct ArchiveBase {
    pub format_id: ArchiveFormatId,
    filename: parking_lot::RwLock<Option<PathBuf>>,
    modified: std::sync::atomic::AtomicBool,
    read_only: std::sync::atomic::AtomicBool,
    on_disk: std::sync::atomic::AtomicBool,
    root: ArchiveDir,
    signals: SignalBus,
}

impl ArchiveBase {
    #[must_use]
    pub fn new(format_id: ArchiveFormatId) -> Self {
        Self {
            format_id,
            filename: parking_lot::RwLock::new(None),
            modified: std::sync::atomic::AtomicBool::new(false),
            read_only: std::sync::atomic::AtomicBool::new(false),
            on_disk: std::sync::atomic::AtomicBool::new(false),
            root: ArchiveDir::new_root(format_id.supports_dirs()),
            signals: SignalBus::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &ArchiveDir {
        &self.root
    }

    #[must_use]
    pub fn filename(&self) -> Option<PathBuf> {
        self.filename.read().clone()
    }

    pub fn set_filename(&self, path: Option<PathBuf>) {
        *self.filename.write() = path;
    }

    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn set_modified(&self, modified: bool) {
        self.modified.store(modified, std::sync::atomic::Ordering::Release);
        if modified {
            self.signals.emit(ArchiveEvent::Modified);
        }
    }

    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, std::sync::atomic::Ordering::Release);
    }

    #[must_use]
    pub fn on_disk(&self) -> bool {
        self.on_disk.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn set_on_disk(&self, on_disk: bool) {
        self.on_disk.store(on_disk, std::sync::atomic::Ordering::Release);
    }

    pub fn subscribe(&self, listener: Listener) {
        self.signals.subscribe(listener);
    }

    pub fn emit(&self, event: ArchiveEvent) {
        self.signals.emit(event);
    }

    fn check_writable(&self) -> ArchiveResult<()> {
        if self.read_only() {
            let name = self.filename().map_or_else(|| "<unsaved>".to_string(), |p| p.display().to_string());
            return Err(ArchiveError::ReadOnly(name));
        }
        Ok(())
    }

    /// Adds `entry` to `dir` (root if `None`) at `position`.
    pub fn add_entry(&self, dir: Option<&ArchiveDir>, entry: ArchiveEntry, position: Option<usize>) -> ArchiveResult<()> {
        self.check_writable()?;
        let target = dir.unwrap_or(&self.root);
        target.add_entry(entry.clone(), position)?;
        self.set_modified(true);
        self.emit(ArchiveEvent::EntryAdded { entry });
        Ok(())
    }

    pub fn remove_entry(&self, dir: &ArchiveDir, entry: &ArchiveEntry) -> ArchiveResult<()> {
        self.check_writable()?;
        let index = dir.entry_index(entry).ok_or_else(|| ArchiveError::FileNotFound(entry.name()))?;
        dir.remove_entry(entry);
        self.set_modified(true);
        self.emit(ArchiveEvent::EntryRemoved { entry: entry.clone(), dir_path: dir.path(), index });
        Ok(())
    }

    pub fn rename_entry(&self, entry: &ArchiveEntry, new_name: impl Into<String>) -> ArchiveResult<()> {
        self.check_writable()?;
        let old_name = entry.name();
        let new_name = new_name.into();
        entry.rename(new_name);
        entry.set_state(EntryState::Modified);
        self.set_modified(true);
        self.emit(ArchiveEvent::EntryRenamed { entry: entry.clone(), old_name });
        Ok(())
    }

    pub fn swap_entries(&self, dir: &ArchiveDir, a: &ArchiveEntry, b: &ArchiveEntry) -> ArchiveResult<()> {
        self.check_writable()?;
        let (Some(i1), Some(i2)) = (dir.entry_index(a), dir.entry_index(b)) else {
            return Err(ArchiveError::FileNotFound(a.name()));
        };
        dir.swap_entries(a, b);
        self.set_modified(true);
        self.emit(ArchiveEvent::EntriesSwapped { index1: i1, index2: i2, dir_path: dir.path() });
        Ok(())
    }

    pub fn move_entry(&self, from_dir: &ArchiveDir, to_dir: &ArchiveDir, entry: &ArchiveEntry, position: Option<usize>) -> ArchiveResult<()> {
        self.check_writable()?;
        if !from_dir.remove_entry(entry) {
            return Err(ArchiveError::FileNotFound(entry.name()));
        }
        to_dir.add_entry(entry.clone(), position)?;
        self.set_modified(true);
        Ok(())
    }

    pub fn create_dir(&self, path: &str) -> ArchiveResult<ArchiveDir> {
        self.check_writable()?;
        if !self.format_id.supports_dirs() {
            return Err(ArchiveError::UnsupportedFeature("directories".to_string()));
        }
        let dir = self.root.create_dir_path(path);
        self.set_modified(true);
        Ok(dir)
    }

    pub fn remove_dir(&self, path: &str) -> ArchiveResult<()> {
        self.check_writable()?;
        let Some(dir) = self.root.find_dir_path(path) else {
            return Err(ArchiveError::FileNotFound(path.to_string()));
        };
        let Some(parent) = dir.parent() else {
            return Err(ArchiveError::UnsupportedFeature("cannot remove root".to_string()));
        };
        parent.remove_subdir(&dir.name());
        self.set_modified(true);
        Ok(())
    }

    pub fn rename_dir(&self, path: &str, new_name: impl Into<String>) -> ArchiveResult<()> {
        self.check_writable()?;
        let Some(dir) = self.root.find_dir_path(path) else {
            return Err(ArchiveError::FileNotFound(path.to_string()));
        };
        dir.set_name(new_name);
        self.set_modified(true);
        Ok(())
    }

    #[must_use]
    pub fn find_first(&self, opts: &SearchOptions) -> Option<ArchiveEntry> {
        search::find_first(opts.dir.as_ref().unwrap_or(&self.root), opts)
    }

    #[must_use]
    pub fn find_last(&self, opts: &SearchOptions) -> Option<ArchiveEntry> {
        search::find_last(opts.dir.as_ref().unwrap_or(&self.root), opts)
    }

    #[must_use]
    pub fn find_all(&self, opts: &SearchOptions) -> Vec<ArchiveEntry> {
        search::find_all(opts.dir.as_ref().unwrap_or(&self.root), opts)
    }

    /// Depth-first flattening of the whole tree, used by writers that need a
    /// stable linear entry order.
    #[must_use]
    pub fn entry_tree_as_list(&self) -> Vec<ArchiveEntry> {
        self.root.linearize()
    }

    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.entry_tree_as_list().len()
    }
}

/// Behavior every concrete archive format must supply; tree bookkeeping is
/// inherited via `ArchiveBase` rather than re-implemented per format.
pub trait Archive {
    fn base(&self) -> &ArchiveBase;

    /// Reads and parses `bytes` into this archive's tree, replacing any
    /// existing content.
    fn open_bytes(&self, bytes: &[u8]) -> ArchiveResult<()>;

    /// Opens from a file path, storing it as the archive's `filename`.
    fn open_file(&self, path: &Path) -> ArchiveResult<()> {
        let bytes = std::fs::read(path)
            .map_err(|_| ArchiveError::FileUnreadable(path.display().to_string()))?;
        self.open_bytes(&bytes)?;
        self.base().set_filename(Some(path.to_path_buf()));
        self.base().set_on_disk(true);
        self.base().set_modified(false);
        Ok(())
    }

    /// Serializes the current tree to bytes in this format.
    fn write_bytes(&self) -> ArchiveResult<Vec<u8>>;

    /// Writes to `path` (or the archive's stored filename if `None`),
    /// forcing every entry's state back to `Unmodified` on success.
    fn save(&self, path: Option<&Path>) -> ArchiveResult<()> {
        self.base().check_writable_for_save()?;
        let target = match path.map(Path::to_path_buf).or_else(|| self.base().filename()) {
            Some(p) => p,
            None => return Err(ArchiveError::FileUnwritable("<no filename set>".to_string())),
        };
        let bytes = self.write_bytes()?;
        std::fs::write(&target, &bytes)
            .map_err(|_| ArchiveError::FileUnwritable(target.display().to_string()))?;
        for entry in self.base().entry_tree_as_list() {
            entry.force_unmodified();
        }
        self.base().set_filename(Some(target));
        self.base().set_on_disk(true);
        self.base().set_modified(false);
        self.base().emit(ArchiveEvent::Saved);
        Ok(())
    }

    /// Loads (lazily, if supported) the bytes backing `entry`.
    fn load_entry_data(&self, entry: &ArchiveEntry) -> ArchiveResult<Vec<u8>> {
        entry.data(|_| Ok(Vec::new())).map_err(ArchiveError::Io)
    }

    /// Scans the entry tree for map markers/headers, producing one
    /// `MapDesc` per detected map. `WadArchive` overrides this with its
    /// marker-plus-lump-sequence scan over the flat entry list; every
    /// other (tree-capable) format gets this default, which looks for a
    /// top-level `maps/` directory and treats each of its children as one
    /// map: a `.wad`-suffixed entry is a nested embedded archive, a subdir
    /// is a per-map folder whose own entries are either a `TEXTMAP` (UDMF)
    /// or a full Doom/Hexen/Doom64 lump set.
    fn detect_maps(&self) -> Vec<MapDesc> {
        if !self.base().format_id.supports_dirs() {
            return Vec::new();
        }
        let Some(maps_dir) = self.base().root().subdir("maps") else { return Vec::new() };
        let mut out = Vec::new();
        for entry in maps_dir.entries() {
            if entry.upper_name().ends_with(".WAD") {
                let format = self.load_entry_data(&entry).ok().and_then(|bytes| sniff_nested_wad_format(&bytes)).unwrap_or(MapFormat::Doom);
                out.push(MapDesc { name: entry.name_no_ext(), head: entry.clone(), end: entry, format, nested_archive: true });
            }
        }
        for sub in maps_dir.subdirs() {
            if let Some(desc) = detect_folder_map(&sub) {
                out.push(desc);
            }
        }
        out
    }
}

/// Peeks a nested WAD entry's own map format by fully parsing it in a
/// throwaway `WadArchive`; used only to label `MapDesc::format` for a
/// `nested_archive` map, whose lumps this core does not otherwise read.
fn sniff_nested_wad_format(bytes: &[u8]) -> Option<MapFormat> {
    let nested = crate::archive::wad::WadArchive::new();
    nested.open_bytes(bytes).ok()?;
    nested.detect_maps().first().map(|d| d.format)
}

/// A per-map PK3/ZIP folder has no preceding marker lump; its own entries
/// (`TEXTMAP` or the binary lump set) are the whole map body.
fn detect_folder_map(dir: &ArchiveDir) -> Option<MapDesc> {
    let entries = dir.entries();
    let has = |name: &str| entries.iter().any(|e| e.upper_name() == name);
    if has("TEXTMAP") {
        let head = entries.iter().find(|e| e.upper_name() == "TEXTMAP")?.clone();
        let end = entries.iter().find(|e| e.upper_name() == "ENDMAP").cloned().unwrap_or_else(|| head.clone());
        return Some(MapDesc { name: dir.name(), head, end, format: MapFormat::Udmf, nested_archive: false });
    }
    let required = ["VERTEXES", "LINEDEFS", "SIDEDEFS", "THINGS", "SECTORS"];
    if required.iter().all(|r| has(r)) {
        let head = entries.first()?.clone();
        let end = entries.last()?.clone();
        let format = if has("BEHAVIOR") {
            MapFormat::Hexen
        } else if has("LEAFS") && has("LIGHTS") && has("MACROS") {
            MapFormat::Doom64
        } else {
            MapFormat::Doom
        };
        return Some(MapDesc { name: dir.name(), head, end, format, nested_archive: false });
    }
    None
}

impl ArchiveBase {
    fn check_writable_for_save(&self) -> ArchiveResult<()> {
        if self.read_only() {
            let name = self.filename().map_or_else(|| "<unsaved>".to_string(), |p| p.display().to_string());
            return Err(ArchiveError::ReadOnly(name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyArchive {
        base: ArchiveBase,
    }

    impl Archive for DummyArchive {
        fn base(&self) -> &ArchiveBase {
            &self.base
        }
        fn open_bytes(&self, _bytes: &[u8]) -> ArchiveResult<()> {
            Ok(())
        }
        fn write_bytes(&self) -> ArchiveResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn add_and_remove_entry_updates_modified_flag() {
        let archive = DummyArchive { base: ArchiveBase::new(ArchiveFormatId::Zip) };
        assert!(!archive.base().modified());
        let entry = ArchiveEntry::new("LUMP", vec![1, 2, 3]);
        archive.base().add_entry(None, entry.clone(), None).unwrap();
        assert!(archive.base().modified());
        archive.base().set_modified(false);
        archive.base().remove_entry(archive.base().root(), &entry).unwrap();
        assert_eq!(archive.base().num_entries(), 0);
    }

    #[test]
    fn read_only_archive_rejects_mutation() {
        let archive = DummyArchive { base: ArchiveBase::new(ArchiveFormatId::Wad) };
        archive.base().set_read_only(true);
        let err = archive.base().add_entry(None, ArchiveEntry::new("X", vec![]), None).unwrap_err();
        assert!(matches!(err, ArchiveError::ReadOnly(_)));
    }

    #[test]
    fn wad_format_does_not_support_directories() {
        let archive = DummyArchive { base: ArchiveBase::new(ArchiveFormatId::Wad) };
        let err = archive.base().create_dir("maps").unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFeature(_)));
    }

    #[test]
    fn default_detect_maps_finds_udmf_folder_map() {
        let archive = DummyArchive { base: ArchiveBase::new(ArchiveFormatId::Zip) };
        let maps = archive.base().create_dir("maps").unwrap();
        let map01 = maps.get_or_create_subdir("MAP01");
        map01.add_entry(ArchiveEntry::new("TEXTMAP", b"namespace=\"doom\";".to_vec()), None).unwrap();
        map01.add_entry(ArchiveEntry::new("ENDMAP", vec![]), None).unwrap();

        let descs = archive.detect_maps();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].name, "MAP01");
        assert_eq!(descs[0].format, MapFormat::Udmf);
        assert!(!descs[0].nested_archive);
    }

    #[test]
    fn default_detect_maps_ignores_non_map_entries_outside_maps_dir() {
        let archive = DummyArchive { base: ArchiveBase::new(ArchiveFormatId::Zip) };
        archive.base().add_entry(None, ArchiveEntry::new("README.TXT", vec![]), None).unwrap();
        assert!(archive.detect_maps().is_empty());
    }
}
