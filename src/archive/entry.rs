//! A single named byte payload within an archive (§3 ArchiveEntry).

use crate::memchunk::MemChunk;
use crate::property::PropertyList;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unmodified,
    Modified,
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None,
    Jaguar,
}

/// Mutable state of an entry, behind a single lock so that lazy-load and
/// ordinary mutation can't race within the cooperative single-threaded model
/// (§5: a flag, not a mutex-for-concurrency — `RwLock` here is the teacher's
/// chosen interior-mutability primitive, not a concurrency claim).
#[derive(Debug)]
struct EntryInner {
    name: String,
    data: MemChunk,
    size: usize,
    state: EntryState,
    locked: bool,
    encryption: Encryption,
    loaded: bool,
    offset_on_disk: u64,
    size_on_disk: u64,
    ex_props: PropertyList,
}

/// Shared handle to an entry. Owned by its `ArchiveDir`; weak handles are
/// published to observers (signals, `MapDesc`) per §9.
#[derive(Clone)]
pub struct ArchiveEntry {
    inner: Arc<RwLock<EntryInner>>,
}

pub type EntryHandle = ArchiveEntry;
pub type WeakEntryHandle = Weak<RwLock<EntryInner>>;

impl ArchiveEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            inner: Arc::new(RwLock::new(EntryInner {
                name: name.into(),
                data: MemChunk::from_vec(data),
                size,
                state: EntryState::New,
                locked: false,
                encryption: Encryption::None,
                loaded: true,
                offset_on_disk: 0,
                size_on_disk: 0,
                ex_props: PropertyList::new(),
            })),
        }
    }

    /// Creates an entry that declares a logical `size` but has no data yet;
    /// reads of it must route through `Archive::load_entry_data` (invariant
    /// in §3: `loaded=false && size>0` implies lazy loading).
    #[must_use]
    pub fn new_unloaded(name: impl Into<String>, size: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(EntryInner {
                name: name.into(),
                data: MemChunk::new(),
                size,
                state: EntryState::Unmodified,
                locked: false,
                encryption: Encryption::None,
                loaded: size == 0,
                offset_on_disk: 0,
                size_on_disk: 0,
                ex_props: PropertyList::new(),
            })),
        }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakEntryHandle {
        Arc::downgrade(&self.inner)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    #[must_use]
    pub fn upper_name(&self) -> String {
        self.name().to_ascii_uppercase()
    }

    #[must_use]
    pub fn name_no_ext(&self) -> String {
        let name = self.name();
        match name.rfind('.') {
            Some(i) => name[..i].to_string(),
            None => name,
        }
    }

    #[must_use]
    pub fn upper_name_no_ext(&self) -> String {
        self.name_no_ext().to_ascii_uppercase()
    }

    pub fn rename(&self, new_name: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.name = new_name.into();
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    #[must_use]
    pub fn state(&self) -> EntryState {
        self.inner.read().state
    }

    pub fn set_state(&self, state: EntryState) {
        let mut inner = self.inner.write();
        // New never regresses to Modified implicitly; Unmodified can only be
        // forced by a writer (§3 lifecycle).
        if inner.state == EntryState::New && state == EntryState::Modified {
            return;
        }
        inner.state = state;
    }

    pub fn force_unmodified(&self) {
        self.inner.write().state = EntryState::Unmodified;
    }

    #[must_use]
    pub fn locked(&self) -> bool {
        self.inner.read().locked
    }

    pub fn set_locked(&self, locked: bool) {
        self.inner.write().locked = locked;
    }

    #[must_use]
    pub fn encryption(&self) -> Encryption {
        self.inner.read().encryption
    }

    pub fn set_encryption(&self, enc: Encryption) {
        self.inner.write().encryption = enc;
    }

    #[must_use]
    pub fn loaded(&self) -> bool {
        self.inner.read().loaded
    }

    #[must_use]
    pub fn offset_on_disk(&self) -> u64 {
        self.inner.read().offset_on_disk
    }

    pub fn set_offset_on_disk(&self, offset: u64) {
        self.inner.write().offset_on_disk = offset;
    }

    #[must_use]
    pub fn size_on_disk(&self) -> u64 {
        self.inner.read().size_on_disk
    }

    pub fn set_size_on_disk(&self, size: u64) {
        self.inner.write().size_on_disk = size;
    }

    /// Returns the raw bytes, invoking `loader` first if the entry hasn't
    /// been loaded yet (§3 lazy-load hook).
    pub fn data(&self, loader: impl FnOnce(&Self) -> std::io::Result<Vec<u8>>) -> std::io::Result<Vec<u8>> {
        if !self.loaded() {
            let bytes = loader(self)?;
            let mut inner = self.inner.write();
            inner.size = bytes.len();
            inner.data = MemChunk::from_vec(bytes);
            inner.loaded = true;
        }
        Ok(self.inner.read().data.data().to_vec())
    }

    /// Direct access to already-loaded data without a loader hook; panics
    /// semantics are avoided by returning `None` if not loaded.
    #[must_use]
    pub fn data_if_loaded(&self) -> Option<Vec<u8>> {
        let inner = self.inner.read();
        if inner.loaded { Some(inner.data.data().to_vec()) } else { None }
    }

    pub fn import_bytes(&self, bytes: Vec<u8>) {
        let mut inner = self.inner.write();
        inner.size = bytes.len();
        inner.data = MemChunk::from_vec(bytes);
        inner.loaded = true;
    }

    pub fn ex_prop(&self, key: &str) -> Option<crate::property::Property> {
        self.inner.read().ex_props.get(key).cloned()
    }

    pub fn set_ex_prop(&self, key: &str, value: impl Into<crate::property::Property>) {
        self.inner.write().ex_props.set(key, value);
    }

    pub fn remove_ex_prop(&self, key: &str) -> bool {
        self.inner.write().ex_props.remove(key)
    }
}

impl std::fmt::Debug for ArchiveEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveEntry").field("name", &self.name()).field("size", &self.size()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_starts_in_new_state() {
        let e = ArchiveEntry::new("HELLO", b"Hi!".to_vec());
        assert_eq!(e.state(), EntryState::New);
        assert_eq!(e.size(), 3);
    }

    #[test]
    fn state_never_regresses_new_to_modified() {
        let e = ArchiveEntry::new("HELLO", b"Hi!".to_vec());
        e.set_state(EntryState::Modified);
        assert_eq!(e.state(), EntryState::New);
        e.force_unmodified();
        assert_eq!(e.state(), EntryState::Unmodified);
        e.set_state(EntryState::Modified);
        assert_eq!(e.state(), EntryState::Modified);
    }

    #[test]
    fn name_no_ext_strips_last_extension_only() {
        let e = ArchiveEntry::new("texture.wad.gz", vec![]);
        assert_eq!(e.name_no_ext(), "texture.wad");
    }

    #[test]
    fn unloaded_entry_routes_through_loader() {
        let e = ArchiveEntry::new_unloaded("LUMP", 3);
        assert!(!e.loaded());
        let bytes = e.data(|_| Ok(b"abc".to_vec())).unwrap();
        assert_eq!(bytes, b"abc");
        assert!(e.loaded());
    }
}
