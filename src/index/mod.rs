//! Persistent content-fingerprint index.
//!
//! - **Records**: path, size, modification time and fingerprint per file
//! - **Store**: the in-memory mapping for one tracked tree
//! - **File**: the text format and the atomic write path
//!
//! An index is loaded fully into memory at the start of a run, mutated only
//! after a change is committed to disk, and written back atomically at the
//! end, so a crash never leaves a half-written index behind.

mod file;
mod record;
mod store;

pub use file::{DEFAULT_INDEX_FILE, atomic_write, load, save, serialize, temp_path};
pub use record::{
    FileMeta, FileRecord, Timestamp, format_timestamp, parse_timestamp, rel_path_string,
    timestamp_from, validate_rel_path,
};
pub use store::IndexStore;
