//! Hashing progress bar.
//!
//! Driven by the engine's [`Event`]s and drawn on stderr with `indicatif`,
//! only when stderr is a terminal and nobody asked for JSON.

use std::io::IsTerminal;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::progress::Event;

const TEMPLATE: &str =
    "{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

pub struct HashProgress {
    enabled: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl HashProgress {
    /// A display that draws only if `wanted` and stderr is a terminal.
    #[must_use]
    pub fn new(wanted: bool) -> Self {
        Self {
            enabled: wanted && std::io::stderr().is_terminal(),
            bar: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one engine event. Hashing starts a bar, every hashed file
    /// advances it, and anything past hashing clears it.
    pub fn handle(&self, event: &Event<'_>) {
        if !self.enabled {
            return;
        }
        let mut slot = self.slot();
        match event {
            Event::Hashing { tree, files, bytes } => {
                if let Some(old) = slot.take() {
                    old.finish_and_clear();
                }
                let style = ProgressStyle::with_template(TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> ");
                let bar = ProgressBar::new(*bytes)
                    .with_style(style)
                    .with_message(format!("Hashing {files} files in {tree}"));
                bar.enable_steady_tick(Duration::from_millis(120));
                *slot = Some(bar);
            }
            Event::Hashed { bytes, .. } => {
                if let Some(bar) = slot.as_ref() {
                    bar.inc(*bytes);
                }
            }
            Event::Scanned { .. } => {}
            _ => {
                if let Some(bar) = slot.take() {
                    bar.finish_and_clear();
                }
            }
        }
    }

    /// Clear the bar, if one is showing.
    pub fn finish(&self) {
        if let Some(bar) = self.slot().take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_display_ignores_events() {
        let progress = HashProgress::new(false);
        progress.handle(&Event::Hashing {
            tree: "t",
            files: 2,
            bytes: 10,
        });
        progress.handle(&Event::Hashed { path: "a", bytes: 5 });
        assert!(progress.slot().is_none());
        progress.finish();
    }
}
