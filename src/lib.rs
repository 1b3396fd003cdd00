#![forbid(unsafe_code)]

//! SLADE core: the archive container abstraction and the Doom-family map
//! database built on top of it (see `SPEC_FULL.md`/`DESIGN.md`).
//!
//! The crate is organized leaves-first, mirroring §2 of the design:
//! `property` and `memchunk` are the shared value/byte primitives; `archive`
//! holds the entry tree and its four format codecs; `map` holds the typed
//! object store, its four format readers/writers, and geometry operations.
//! `config`, `errors`, `logger`, `progress` and `services` are the ambient
//! seams every layer depends on.

pub mod archive;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod fsutil;
pub mod logger;
pub mod map;
pub mod memchunk;
pub mod progress;
pub mod property;
pub mod services;

pub use archive::{Archive, ArchiveDir, ArchiveEntry};
pub use errors::{ArchiveError, ArchiveResult, MapError, MapResult, SladeError};
pub use map::SladeMap;
pub use property::{Property, PropertyList};

/// Initializes process-wide logging. Should be called once, early, by any
/// binary embedding this crate; library consumers that already run their
/// own `log` backend can skip this.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::init()
}
