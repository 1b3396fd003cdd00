//! Crate-wide error taxonomy.
//!
//! Deep internals return `Result`s; the public archive/map operations surface
//! a concise error enum per §7 of the design. A thread-local "last error"
//! string is kept alongside for call sites that cannot thread a `Result`
//! through (legacy-UI-style callers), mirroring the original's global error
//! string without a real global.

use std::cell::RefCell;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file unreadable: {0}")]
    FileUnreadable(String),

    #[error("file unwritable: {0}")]
    FileUnwritable(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("corrupt archive: {0}")]
    Corrupt(String),

    #[error("entry '{0}' too large ({1} MB)")]
    EntryTooLarge(String, u64),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("duplicate name '{0}' in directory '{1}'")]
    DuplicateName(String, String),

    #[error("entry '{0}' is locked")]
    Locked(String),

    #[error("archive '{0}' is read-only")]
    ReadOnly(String),

    #[error("object does not belong to this archive/map: {0}")]
    NotOurs(String),

    #[error("bad signing key")]
    BadKey,

    #[error("signing key is too weak")]
    WeakKey,

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("map object not found: {0}")]
    ObjectNotFound(u32),

    #[error("object belongs to a different map")]
    WrongMap,

    #[error("invalid map format data: {0}")]
    InvalidFormat(String),

    #[error("UDMF parser error: {0}")]
    ParserError(String),

    #[error("missing required property '{0}' on {1} block")]
    MissingRequiredProperty(String, &'static str),
}

#[derive(Debug, Error)]
pub enum SladeError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Map(#[from] MapError),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
pub type MapResult<T> = Result<T, MapError>;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Records a human-readable message for legacy call sites that poll
/// `last_error()` instead of propagating a `Result`.
pub fn set_last_error(msg: impl Into<String>) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = msg.into());
}

#[must_use]
pub fn last_error() -> String {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}
