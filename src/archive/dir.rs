//! Tree node: children entries (ordered) + child subdirs + parent +
//! uniqueness policy (§3 ArchiveDir).

use crate::archive::entry::ArchiveEntry;
use crate::errors::{ArchiveError, ArchiveResult};
use crate::property::PropertyList;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

struct DirInner {
    name: String,
    ex_props: PropertyList,
    parent: Option<Weak<RwLock<DirInner>>>,
    dirs: Vec<ArchiveDir>,
    entries: Vec<ArchiveEntry>,
    allow_duplicate_names: bool,
}

#[derive(Clone)]
pub struct ArchiveDir {
    inner: Arc<RwLock<DirInner>>,
}

impl ArchiveDir {
    #[must_use]
    pub fn new_root(allow_duplicate_names: bool) -> Self {
        Self::new(String::new(), None, allow_duplicate_names)
    }

    fn new(name: String, parent: Option<Weak<RwLock<DirInner>>>, allow_duplicate_names: bool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DirInner {
                name,
                ex_props: PropertyList::new(),
                parent,
                dirs: Vec::new(),
                entries: Vec::new(),
                allow_duplicate_names,
            })),
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.write().name = name.into();
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.inner.read().parent.as_ref().and_then(Weak::upgrade).map(|inner| Self { inner })
    }

    /// Full slash-separated path from the root (exclusive of root's own
    /// anonymous name), e.g. `/maps/map01`.
    #[must_use]
    pub fn path(&self) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(self.clone());
        while let Some(d) = cur {
            let name = d.name();
            if !name.is_empty() {
                parts.push(name);
            }
            cur = d.parent();
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    #[must_use]
    pub fn allow_duplicate_names(&self) -> bool {
        self.inner.read().allow_duplicate_names
    }

    pub fn set_allow_duplicate_names(&self, allow: bool) {
        self.inner.write().allow_duplicate_names = allow;
    }

    #[must_use]
    pub fn entries(&self) -> Vec<ArchiveEntry> {
        self.inner.read().entries.clone()
    }

    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[must_use]
    pub fn entry_at(&self, index: usize) -> Option<ArchiveEntry> {
        self.inner.read().entries.get(index).cloned()
    }

    #[must_use]
    pub fn entry_index(&self, entry: &ArchiveEntry) -> Option<usize> {
        self.inner.read().entries.iter().position(|e| e.ptr_eq(entry))
    }

    #[must_use]
    pub fn subdirs(&self) -> Vec<Self> {
        self.inner.read().dirs.clone()
    }

    #[must_use]
    pub fn subdir(&self, name: &str) -> Option<Self> {
        self.inner.read().dirs.iter().find(|d| d.name().eq_ignore_ascii_case(name)).cloned()
    }

    pub fn ex_prop(&self, key: &str) -> Option<crate::property::Property> {
        self.inner.read().ex_props.get(key).cloned()
    }

    pub fn set_ex_prop(&self, key: &str, value: impl Into<crate::property::Property>) {
        self.inner.write().ex_props.set(key, value);
    }

    /// Checks the uniqueness invariant before insertion.
    fn check_unique(&self, name: &str) -> ArchiveResult<()> {
        if self.allow_duplicate_names() {
            return Ok(());
        }
        let no_ext = strip_ext(name);
        let clash = self.inner.read().entries.iter().any(|e| e.name_no_ext().eq_ignore_ascii_case(&no_ext));
        if clash {
            return Err(ArchiveError::DuplicateName(name.to_string(), self.path()));
        }
        Ok(())
    }

    /// Adds `entry` at `position` (`None` = end).
    pub fn add_entry(&self, entry: ArchiveEntry, position: Option<usize>) -> ArchiveResult<()> {
        self.check_unique(&entry.name())?;
        let mut inner = self.inner.write();
        let pos = position.unwrap_or(inner.entries.len()).min(inner.entries.len());
        inner.entries.insert(pos, entry);
        Ok(())
    }

    /// Removes `entry`, returning true if it was present.
    pub fn remove_entry(&self, entry: &ArchiveEntry) -> bool {
        let mut inner = self.inner.write();
        if let Some(idx) = inner.entries.iter().position(|e| e.ptr_eq(entry)) {
            inner.entries.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn swap_entries(&self, a: &ArchiveEntry, b: &ArchiveEntry) -> bool {
        let mut inner = self.inner.write();
        let ia = inner.entries.iter().position(|e| e.ptr_eq(a));
        let ib = inner.entries.iter().position(|e| e.ptr_eq(b));
        match (ia, ib) {
            (Some(ia), Some(ib)) => {
                inner.entries.swap(ia, ib);
                true
            }
            _ => false,
        }
    }

    pub fn move_entry(&self, entry: &ArchiveEntry, position: Option<usize>) -> bool {
        let mut inner = self.inner.write();
        let Some(idx) = inner.entries.iter().position(|e| e.ptr_eq(entry)) else {
            return false;
        };
        let e = inner.entries.remove(idx);
        let pos = position.unwrap_or(inner.entries.len()).min(inner.entries.len());
        inner.entries.insert(pos, e);
        true
    }

    /// Creates (if missing) and returns the immediate child subdir `name`.
    pub fn get_or_create_subdir(&self, name: &str) -> Self {
        if let Some(existing) = self.subdir(name) {
            return existing;
        }
        let allow_dup = self.allow_duplicate_names();
        let child = Self::new(name.to_string(), Some(Arc::downgrade(&self.inner)), allow_dup);
        self.inner.write().dirs.push(child.clone());
        child
    }

    /// Walks/creates a `/`-separated path of subdirs starting from `self`.
    pub fn create_dir_path(&self, path: &str) -> Self {
        let mut cur = self.clone();
        for part in path.split('/').filter(|s| !s.is_empty()) {
            cur = cur.get_or_create_subdir(part);
        }
        cur
    }

    /// Finds a subdir by `/`-separated path without creating it.
    #[must_use]
    pub fn find_dir_path(&self, path: &str) -> Option<Self> {
        let mut cur = self.clone();
        for part in path.split('/').filter(|s| !s.is_empty()) {
            cur = cur.subdir(part)?;
        }
        Some(cur)
    }

    pub fn remove_subdir(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        if let Some(idx) = inner.dirs.iter().position(|d| d.name().eq_ignore_ascii_case(name)) {
            inner.dirs.remove(idx);
            true
        } else {
            false
        }
    }

    /// Depth-first linearization: each dir is visited before its children
    /// (§4.1 `entryTreeAsList`). Entries in a dir are listed after the dir
    /// itself (root contributes no entry for itself, only its children).
    #[must_use]
    pub fn linearize(&self) -> Vec<ArchiveEntry> {
        let mut out = Vec::new();
        self.linearize_into(&mut out);
        out
    }

    fn linearize_into(&self, out: &mut Vec<ArchiveEntry>) {
        out.extend(self.entries());
        for d in self.subdirs() {
            d.linearize_into(out);
        }
    }
}

fn strip_ext(name: &str) -> String {
    match name.rfind('.') {
        Some(i) => name[..i].to_string(),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_rejected_case_insensitively() {
        let root = ArchiveDir::new_root(false);
        root.add_entry(ArchiveEntry::new("Foo.txt", vec![]), None).unwrap();
        let err = root.add_entry(ArchiveEntry::new("FOO.TXT", vec![]), None).unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateName(_, _)));
    }

    #[test]
    fn allow_duplicate_names_permits_clash() {
        let root = ArchiveDir::new_root(true);
        root.add_entry(ArchiveEntry::new("a", vec![]), None).unwrap();
        assert!(root.add_entry(ArchiveEntry::new("a", vec![]), None).is_ok());
    }

    #[test]
    fn path_reflects_parent_chain() {
        let root = ArchiveDir::new_root(false);
        let sub = root.get_or_create_subdir("maps");
        let subsub = sub.get_or_create_subdir("map01");
        assert_eq!(subsub.path(), "/maps/map01");
    }

    #[test]
    fn linearize_is_depth_first_dirs_before_children() {
        let root = ArchiveDir::new_root(false);
        root.add_entry(ArchiveEntry::new("A", vec![]), None).unwrap();
        let sub = root.get_or_create_subdir("d");
        sub.add_entry(ArchiveEntry::new("B", vec![]), None).unwrap();
        root.add_entry(ArchiveEntry::new("C", vec![]), None).unwrap();
        let names: Vec<_> = root.linearize().iter().map(super::ArchiveEntry::name).collect();
        assert_eq!(names, vec!["A", "C", "B"]);
    }
}
