//! One-to-one filesystem mirror archive. Every entry's `filePath` exProp
//! holds its absolute path on disk; `open`/`save` walk the directory tree
//! directly rather than a serialized container format.

use crate::archive::base::{Archive, ArchiveBase, ArchiveFormatId};
use crate::archive::dir::ArchiveDir;
use crate::archive::entry::ArchiveEntry;
use crate::errors::{ArchiveError, ArchiveResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A filesystem-change notification the editor polls for and hands to
/// [`DirArchive::update_changed_entries`] (§4.5/§6 `DirEntryChange`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirChangeAction {
    Updated,
    DeletedFile,
    DeletedDir,
    AddedDir,
    AddedFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryChange {
    pub action: DirChangeAction,
    pub entry_path: String,
    pub file_path: PathBuf,
    pub mtime: i64,
}

pub struct DirArchive {
    base: ArchiveBase,
    source_dir: parking_lot::RwLock<Option<PathBuf>>,
    file_modification_times: parking_lot::RwLock<HashMap<PathBuf, SystemTime>>,
    removed_files: parking_lot::Mutex<Vec<PathBuf>>,
    /// `(old_path, new_path)` pairs recorded by `rename_dir`, for callers
    /// that need to reconcile in-flight external changes after a rename.
    renamed_dirs: parking_lot::Mutex<Vec<(PathBuf, PathBuf)>>,
    /// Last action + mtime seen per on-disk path, so a change that was
    /// already applied (or explicitly silenced) isn't re-reported.
    ignored_file_changes: parking_lot::Mutex<HashMap<PathBuf, (DirChangeAction, i64)>>,
    skip_hidden: bool,
}

impl DirArchive {
    #[must_use]
    pub fn new(skip_hidden: bool) -> Self {
        Self {
            base: ArchiveBase::new(ArchiveFormatId::Dir),
            source_dir: parking_lot::RwLock::new(None),
            file_modification_times: parking_lot::RwLock::new(HashMap::new()),
            removed_files: parking_lot::Mutex::new(Vec::new()),
            renamed_dirs: parking_lot::Mutex::new(Vec::new()),
            ignored_file_changes: parking_lot::Mutex::new(HashMap::new()),
            skip_hidden,
        }
    }

    /// Removes `entry` from `dir` and, if it has an on-disk `filePath`,
    /// queues that path for deletion on the next save (§4.5 remove hook).
    pub fn remove_entry(&self, dir: &ArchiveDir, entry: &ArchiveEntry) -> ArchiveResult<()> {
        if let Some(path) = entry.ex_prop("filePath") {
            self.removed_files.lock().push(PathBuf::from(path.as_string(0)));
        }
        self.base.remove_entry(dir, entry)
    }

    /// Renames `entry` and queues its old on-disk path for deletion, since
    /// the next save will write it under the new name instead.
    pub fn rename_entry(&self, entry: &ArchiveEntry, new_name: impl Into<String>) -> ArchiveResult<()> {
        if let Some(path) = entry.ex_prop("filePath") {
            self.removed_files.lock().push(PathBuf::from(path.as_string(0)));
        }
        self.base.rename_entry(entry, new_name)
    }

    /// Renames `dir` and records the `(old, new)` path pair for bookkeeping.
    pub fn rename_dir(&self, path: &str, new_name: impl Into<String>) -> ArchiveResult<()> {
        let new_name = new_name.into();
        if let Some(dir) = self.base.root().find_dir_path(path) {
            let old_fs = dir.ex_prop("filePath").map(|p| PathBuf::from(p.as_string(0)));
            self.base.rename_dir(path, new_name.clone())?;
            if let Some(old_fs) = old_fs {
                let new_fs = old_fs.with_file_name(&new_name);
                self.renamed_dirs.lock().push((old_fs, new_fs));
            }
            return Ok(());
        }
        self.base.rename_dir(path, new_name)
    }

    #[must_use]
    pub fn renamed_dirs(&self) -> Vec<(PathBuf, PathBuf)> {
        self.renamed_dirs.lock().clone()
    }

    /// Silences future reports of `change` until its path next changes
    /// action or mtime (§4.5 `ignoreChangedEntries`).
    pub fn ignore_changed_entries(&self, changes: &[DirEntryChange]) {
        let mut map = self.ignored_file_changes.lock();
        for change in changes {
            map.insert(change.file_path.clone(), (change.action.clone(), change.mtime));
        }
    }

    /// True if `change` matches a previously-ignored action/mtime pair for
    /// its path, per §4.5's `shouldIgnoreEntryChange` rules:
    /// two deletes ignore; a delete paired with a non-delete never ignores;
    /// otherwise compare mtimes.
    #[must_use]
    pub fn should_ignore_entry_change(&self, change: &DirEntryChange) -> bool {
        let map = self.ignored_file_changes.lock();
        let Some((prev_action, prev_mtime)) = map.get(&change.file_path) else { return false };
        let is_delete = |a: &DirChangeAction| matches!(a, DirChangeAction::DeletedFile | DirChangeAction::DeletedDir);
        match (is_delete(prev_action), is_delete(&change.action)) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => *prev_mtime == change.mtime,
        }
    }

    /// Applies a batch of externally-observed filesystem changes (§4.5).
    /// Changes matching `should_ignore_entry_change` are skipped.
    pub fn update_changed_entries(&self, changes: &[DirEntryChange]) -> ArchiveResult<()> {
        for change in changes {
            if self.should_ignore_entry_change(change) {
                continue;
            }
            match change.action {
                DirChangeAction::Updated => {
                    if let Some(entry) = self.find_entry_by_file_path(&change.file_path) {
                        let bytes = std::fs::read(&change.file_path)
                            .map_err(|_| ArchiveError::FileUnreadable(change.file_path.display().to_string()))?;
                        entry.import_bytes(bytes);
                        entry.force_unmodified();
                        self.file_modification_times.write().insert(change.file_path.clone(), systemtime_from_unix(change.mtime));
                    }
                }
                DirChangeAction::DeletedFile => {
                    if let Some(entry) = self.find_entry_by_file_path(&change.file_path) {
                        let (dir, _) = self.locate_entry(&entry);
                        if let Some(dir) = dir {
                            dir.remove_entry(&entry);
                        }
                    }
                }
                DirChangeAction::DeletedDir => {
                    if let Some(name) = change.file_path.file_name().and_then(|n| n.to_str())
                        && let Some(dir) = self.dir_by_file_path(&change.file_path)
                        && let Some(parent_dir) = dir.parent()
                    {
                        parent_dir.remove_subdir(name);
                    }
                }
                DirChangeAction::AddedDir => {
                    if let Some(parent_dir) = self.dir_by_file_path(change.file_path.parent().unwrap_or(&change.file_path)) {
                        if let Some(name) = change.file_path.file_name().and_then(|n| n.to_str()) {
                            let subdir = parent_dir.get_or_create_subdir(name);
                            subdir.set_ex_prop("filePath", change.file_path.display().to_string());
                        }
                    }
                }
                DirChangeAction::AddedFile => {
                    if let Some(parent_dir) = self.dir_by_file_path(change.file_path.parent().unwrap_or(&change.file_path)) {
                        if let Some(name) = change.file_path.file_name().and_then(|n| n.to_str()) {
                            let bytes = std::fs::read(&change.file_path)
                                .map_err(|_| ArchiveError::FileUnreadable(change.file_path.display().to_string()))?;
                            let entry = ArchiveEntry::new(name, bytes);
                            entry.set_ex_prop("filePath", change.file_path.display().to_string());
                            parent_dir.add_entry(entry, None)?;
                            self.file_modification_times.write().insert(change.file_path.clone(), systemtime_from_unix(change.mtime));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn find_entry_by_file_path(&self, file_path: &Path) -> Option<ArchiveEntry> {
        self.base.entry_tree_as_list().into_iter().find(|e| {
            e.ex_prop("filePath").map(|p| p.as_string(0)).as_deref() == file_path.to_str()
        })
    }

    fn locate_entry(&self, entry: &ArchiveEntry) -> (Option<ArchiveDir>, Option<usize>) {
        fn search(dir: &ArchiveDir, entry: &ArchiveEntry) -> Option<(ArchiveDir, usize)> {
            if let Some(idx) = dir.entry_index(entry) {
                return Some((dir.clone(), idx));
            }
            for sub in dir.subdirs() {
                if let Some(found) = search(&sub, entry) {
                    return Some(found);
                }
            }
            None
        }
        match search(self.base.root(), entry) {
            Some((dir, idx)) => (Some(dir), Some(idx)),
            None => (None, None),
        }
    }

    fn dir_by_file_path(&self, file_path: &Path) -> Option<ArchiveDir> {
        fn search(dir: &ArchiveDir, file_path: &Path) -> Option<ArchiveDir> {
            if dir.ex_prop("filePath").map(|p| p.as_string(0)).as_deref() == file_path.to_str() {
                return Some(dir.clone());
            }
            for sub in dir.subdirs() {
                if let Some(found) = search(&sub, file_path) {
                    return Some(found);
                }
            }
            None
        }
        search(self.base.root(), file_path)
    }

    #[must_use]
    pub fn source_dir(&self) -> Option<PathBuf> {
        self.source_dir.read().clone()
    }

    /// Recursively imports `fs_path` into `dir`, recording mtimes.
    fn import_dir(&self, fs_path: &Path, dir: &ArchiveDir) -> ArchiveResult<()> {
        let read_dir = std::fs::read_dir(fs_path).map_err(|_| ArchiveError::FileUnreadable(fs_path.display().to_string()))?;
        let mut children: Vec<_> = read_dir.filter_map(std::result::Result::ok).collect();
        children.sort_by_key(std::fs::DirEntry::file_name);

        for child in children {
            let name = child.file_name().to_string_lossy().into_owned();
            if self.skip_hidden && crate::fsutil::is_hidden(&name) {
                continue;
            }
            let path = child.path();
            let metadata = child.metadata().map_err(|_| ArchiveError::FileUnreadable(path.display().to_string()))?;
            if metadata.is_dir() {
                let subdir = dir.get_or_create_subdir(&name);
                subdir.set_ex_prop("filePath", path.display().to_string());
                self.import_dir(&path, &subdir)?;
            } else {
                let bytes = std::fs::read(&path).map_err(|_| ArchiveError::FileUnreadable(path.display().to_string()))?;
                let entry = ArchiveEntry::new(name, bytes);
                entry.force_unmodified();
                entry.set_ex_prop("filePath", path.display().to_string());
                dir.add_entry(entry, None)?;
                if let Ok(mtime) = metadata.modified() {
                    self.file_modification_times.write().insert(path, mtime);
                }
            }
        }
        Ok(())
    }

    /// Marks `path` for deletion on the next `save`.
    pub fn queue_removed_file(&self, path: PathBuf) {
        self.removed_files.lock().push(path);
    }

    /// Walks the current on-disk tree under `source_dir` and removes any
    /// directory that no longer has a counterpart in the in-memory tree.
    fn prune_orphan_dirs(&self, fs_path: &Path, dir: &ArchiveDir) -> ArchiveResult<()> {
        let Ok(read_dir) = std::fs::read_dir(fs_path) else { return Ok(()) };
        for child in read_dir.filter_map(std::result::Result::ok) {
            let Ok(metadata) = child.metadata() else { continue };
            if !metadata.is_dir() {
                continue;
            }
            let name = child.file_name().to_string_lossy().into_owned();
            match dir.subdir(&name) {
                Some(subdir) => self.prune_orphan_dirs(&child.path(), &subdir)?,
                None => {
                    let _ = std::fs::remove_dir_all(child.path());
                }
            }
        }
        Ok(())
    }

    fn write_dir(&self, dir: &ArchiveDir, fs_path: &Path) -> ArchiveResult<()> {
        std::fs::create_dir_all(fs_path).map_err(|_| ArchiveError::FileUnwritable(fs_path.display().to_string()))?;
        for entry in dir.entries() {
            let entry_path = fs_path.join(entry.name());
            let unchanged_path = entry
                .ex_prop("filePath")
                .map(|p| p.as_string(0))
                .is_some_and(|p| PathBuf::from(p) == entry_path);
            if entry.state() == crate::archive::entry::EntryState::Unmodified && unchanged_path {
                continue;
            }
            let bytes = entry.data_if_loaded().unwrap_or_default();
            std::fs::write(&entry_path, &bytes).map_err(|_| ArchiveError::FileUnwritable(entry_path.display().to_string()))?;
            entry.set_ex_prop("filePath", entry_path.display().to_string());
            if let Ok(metadata) = std::fs::metadata(&entry_path) {
                if let Ok(mtime) = metadata.modified() {
                    self.file_modification_times.write().insert(entry_path, mtime);
                }
            }
        }
        for sub in dir.subdirs() {
            self.write_dir(&sub, &fs_path.join(sub.name()))?;
        }
        Ok(())
    }
}

fn systemtime_from_unix(secs: i64) -> SystemTime {
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs as u64)
    } else {
        SystemTime::UNIX_EPOCH - std::time::Duration::from_secs((-secs) as u64)
    }
}

impl Archive for DirArchive {
    fn base(&self) -> &ArchiveBase {
        &self.base
    }

    fn open_bytes(&self, _bytes: &[u8]) -> ArchiveResult<()> {
        Err(ArchiveError::UnsupportedFeature("DirArchive opens from a directory path, not bytes".to_string()))
    }

    fn open_file(&self, path: &Path) -> ArchiveResult<()> {
        if !path.is_dir() {
            return Err(ArchiveError::InvalidFormat(format!("{} is not a directory", path.display())));
        }
        self.base.root().set_ex_prop("filePath", path.display().to_string());
        self.import_dir(path, self.base.root())?;
        *self.source_dir.write() = Some(path.to_path_buf());
        self.base.set_filename(Some(path.to_path_buf()));
        self.base.set_on_disk(true);
        self.base.set_modified(false);
        Ok(())
    }

    fn write_bytes(&self) -> ArchiveResult<Vec<u8>> {
        Err(ArchiveError::UnsupportedFeature("DirArchive saves directly to disk, not to a byte buffer".to_string()))
    }

    fn save(&self, path: Option<&Path>) -> ArchiveResult<()> {
        let target = path.map(Path::to_path_buf).or_else(|| self.source_dir()).ok_or_else(|| {
            ArchiveError::FileUnwritable("<no source directory set>".to_string())
        })?;

        for removed in self.removed_files.lock().drain(..) {
            let _ = std::fs::remove_file(&removed);
        }
        self.prune_orphan_dirs(&target, self.base.root())?;
        self.write_dir(self.base.root(), &target)?;

        for entry in self.base.entry_tree_as_list() {
            entry.force_unmodified();
        }
        *self.source_dir.write() = Some(target.clone());
        self.base.set_filename(Some(target));
        self.base.set_on_disk(true);
        self.base.set_modified(false);
        self.base.emit(crate::archive::signal::ArchiveEvent::Saved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_mirrors_nested_directory_tree() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"hi").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/b.txt"), b"there").unwrap();

        let archive = DirArchive::new(true);
        archive.open_file(tmp.path()).unwrap();
        assert_eq!(archive.base().num_entries(), 2);
        let sub = archive.base().root().subdir("sub").unwrap();
        assert_eq!(sub.num_entries(), 1);
    }

    #[test]
    fn save_writes_modified_entries_and_removes_queued_files() {
        let tmp = tempfile::tempdir().unwrap();
        let stale = tmp.path().join("stale.txt");
        std::fs::write(&stale, b"old").unwrap();

        let archive = DirArchive::new(true);
        archive.open_file(tmp.path()).unwrap();
        archive.queue_removed_file(stale.clone());
        archive.base().add_entry(None, ArchiveEntry::new("new.txt", b"fresh".to_vec()), None).unwrap();

        archive.save(None).unwrap();
        assert!(!stale.exists());
        assert_eq!(std::fs::read(tmp.path().join("new.txt")).unwrap(), b"fresh");
    }

    #[test]
    fn rename_entry_queues_old_path_for_removal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"hi").unwrap();

        let archive = DirArchive::new(true);
        archive.open_file(tmp.path()).unwrap();
        let entry = archive.base().root().entry_at(0).unwrap();
        archive.rename_entry(&entry, "b.txt").unwrap();
        archive.save(None).unwrap();

        assert!(!tmp.path().join("a.txt").exists());
        assert_eq!(std::fs::read(tmp.path().join("b.txt")).unwrap(), b"hi");
    }

    #[test]
    fn update_changed_entries_reimports_updated_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, b"old").unwrap();

        let archive = DirArchive::new(true);
        archive.open_file(tmp.path()).unwrap();
        std::fs::write(&file, b"newer").unwrap();

        let change = DirEntryChange {
            action: DirChangeAction::Updated,
            entry_path: "/a.txt".to_string(),
            file_path: file.clone(),
            mtime: 1,
        };
        archive.update_changed_entries(&[change]).unwrap();

        let entry = archive.base().root().entry_at(0).unwrap();
        assert_eq!(entry.data_if_loaded().unwrap(), b"newer");
        assert_eq!(entry.state(), crate::archive::entry::EntryState::Unmodified);
    }

    #[test]
    fn should_ignore_entry_change_rules() {
        let archive = DirArchive::new(true);
        let path = PathBuf::from("/tmp/x.txt");
        let change = DirEntryChange {
            action: DirChangeAction::Updated,
            entry_path: "/x.txt".to_string(),
            file_path: path.clone(),
            mtime: 42,
        };
        assert!(!archive.should_ignore_entry_change(&change));

        archive.ignore_changed_entries(std::slice::from_ref(&change));
        assert!(archive.should_ignore_entry_change(&change));

        let changed_mtime = DirEntryChange { mtime: 43, ..change.clone() };
        assert!(!archive.should_ignore_entry_change(&changed_mtime));

        let deleted = DirEntryChange { action: DirChangeAction::DeletedFile, ..change.clone() };
        assert!(!archive.should_ignore_entry_change(&deleted));
    }
}
