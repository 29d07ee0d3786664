//! In-memory tree for tests and dry experiments.
//!
//! Time is a logical clock: every mutation advances it by one second, so two
//! writes never share a modification time unless a test asks for it.
//!
//! Directories exist implicitly, as prefixes of file paths. Like a real
//! filesystem, a file cannot be written where a directory is, or below
//! another file.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Duration, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::index::{FileMeta, Timestamp};
use crate::scan::Snapshot;
use crate::tree::Tree;

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    modified: Timestamp,
}

impl Entry {
    fn meta(&self) -> FileMeta {
        FileMeta {
            size: self.data.len() as u64,
            modified: self.modified,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Entry>,
    ticks: i64,
    failing: BTreeSet<String>,
    unreadable: BTreeSet<String>,
}

impl State {
    fn tick(&mut self) -> Timestamp {
        self.ticks += 1;
        epoch() + Duration::seconds(self.ticks)
    }

    fn is_dir(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(p, _)| p.starts_with(&prefix))
    }

    /// Why a file cannot be created at `path`, ignoring `leaving`, which is
    /// about to move away.
    fn obstacle(&self, path: &str, leaving: Option<&str>) -> Option<String> {
        let prefix = format!("{path}/");
        let below = self
            .files
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .any(|(p, _)| Some(p.as_str()) != leaving);
        if below {
            return Some(format!("{path} is a directory"));
        }
        path.match_indices('/')
            .map(|(i, _)| &path[..i])
            .find(|dir| self.files.contains_key(*dir) && Some(*dir) != leaving)
            .map(|file| format!("{file} is not a directory"))
    }
}

fn epoch() -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_default()
}

/// A tree held entirely in memory.
#[derive(Debug)]
pub struct MemoryTree {
    name: String,
    state: Mutex<State>,
}

impl MemoryTree {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace a file, advancing the clock.
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut state = self.state();
        let modified = state.tick();
        state.files.insert(
            path.to_string(),
            Entry {
                data: data.into(),
                modified,
            },
        );
    }

    /// Replace a file's bytes but keep its size and modification time, the
    /// way silent media corruption looks to a metadata-only scan.
    pub fn corrupt(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut state = self.state();
        if let Some(entry) = state.files.get_mut(path) {
            let mut data = data.into();
            data.resize(entry.data.len(), 0);
            entry.data = data;
        }
    }

    /// Bump a file's modification time without changing its bytes.
    pub fn touch(&self, path: &str) {
        let mut state = self.state();
        let modified = state.tick();
        if let Some(entry) = state.files.get_mut(path) {
            entry.modified = modified;
        }
    }

    pub fn delete(&self, path: &str) {
        self.state().files.remove(path);
    }

    /// Move a file outside of any reconciler bookkeeping.
    pub fn relocate(&self, from: &str, to: &str) {
        let mut state = self.state();
        if let Some(entry) = state.files.remove(from) {
            state.files.insert(to.to_string(), entry);
        }
    }

    #[must_use]
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).map(|e| e.data.clone())
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    /// Make every mutation of `path` fail.
    pub fn fail_writes(&self, path: &str) {
        self.state().failing.insert(path.to_string());
    }

    /// Make reads of `path` fail.
    pub fn fail_reads(&self, path: &str) {
        self.state().unreadable.insert(path.to_string());
    }

    /// Drop injected failures for `path`.
    pub fn heal(&self, path: &str) {
        let mut state = self.state();
        state.failing.remove(path);
        state.unreadable.remove(path);
    }

    fn check_writable(state: &State, path: &str) -> Result<()> {
        if state.failing.contains(path) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected write failure: {path}"),
            )));
        }
        Ok(())
    }
}

impl Tree for MemoryTree {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn locate(&self, path: &str) -> PathBuf {
        PathBuf::from(format!("memory:{}/{path}", self.name))
    }

    fn scan(&self) -> Result<Snapshot> {
        Ok(self
            .state()
            .files
            .iter()
            .map(|(p, e)| (p.clone(), e.meta()))
            .collect())
    }

    fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        Ok(self.state().files.get(path).map(Entry::meta))
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(self.state().is_dir(path))
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let state = self.state();
        if state.unreadable.contains(path) {
            return Err(Error::io_at(
                self.locate(path),
                io::Error::new(io::ErrorKind::PermissionDenied, "injected read failure"),
            ));
        }
        match state.files.get(path) {
            Some(entry) => Ok(Box::new(Cursor::new(entry.data.clone()))),
            None => Err(Error::io_at(
                self.locate(path),
                io::Error::from(io::ErrorKind::NotFound),
            )),
        }
    }

    fn write(
        &self,
        path: &str,
        content: &mut dyn Read,
        modified: Option<Timestamp>,
    ) -> Result<FileMeta> {
        Self::check_writable(&self.state(), path)?;
        let mut data = Vec::new();
        content
            .read_to_end(&mut data)
            .map_err(|e| Error::io_at(self.locate(path), e))?;

        let mut state = self.state();
        if let Some(reason) = state.obstacle(path, None) {
            return Err(Error::io_at(self.locate(path), io::Error::other(reason)));
        }
        let modified = match modified {
            Some(ts) => ts,
            None => state.tick(),
        };
        let entry = Entry { data, modified };
        let meta = entry.meta();
        state.files.insert(path.to_string(), entry);
        Ok(meta)
    }

    fn remove(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        Self::check_writable(&state, path)?;
        state.files.remove(path).map(|_| ()).ok_or_else(|| {
            Error::io_at(self.locate(path), io::Error::from(io::ErrorKind::NotFound))
        })
    }

    fn rename(&self, from: &str, to: &str) -> Result<FileMeta> {
        let mut state = self.state();
        Self::check_writable(&state, from)?;
        Self::check_writable(&state, to)?;
        if let Some(reason) = state.obstacle(to, Some(from)) {
            return Err(Error::io_at(self.locate(to), io::Error::other(reason)));
        }
        let entry = state.files.remove(from).ok_or_else(|| {
            Error::io_at(self.locate(from), io::Error::from(io::ErrorKind::NotFound))
        })?;
        let meta = entry.meta();
        state.files.insert(to.to_string(), entry);
        Ok(meta)
    }
}
