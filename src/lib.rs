//! dintact - integrity checking and mirroring for backup trees
//!
//! A *hot* tree is the working copy; a *cold* tree is its backup. Each tree
//! carries an index of per-file fingerprints. `check` verifies a cold tree
//! against its index, `sync` mirrors hot-side changes onto the cold tree
//! and refuses to overwrite cold files that no longer match their records.
//!
//! # Architecture
//!
//! - [`fingerprint`] - Content digests (XXH3-128, SHA-256)
//! - [`scan`] - Directory walking and exclusion rules
//! - [`index`] - Per-tree index of file records and its on-disk format
//! - [`tree`] - Storage abstraction over disk and memory
//! - [`diff`] - Classifying changes between an index and a tree, with move detection
//! - [`reconcile`] - Check and sync engines and their reports
//! - [`progress`] - Progress events emitted by the engines
//! - [`config`] - Settings file and flag resolution
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod progress;
pub mod reconcile;
pub mod scan;
pub mod tree;

pub use error::{Error, Result};
