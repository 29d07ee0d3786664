//! Per-change confirmation for `sync --confirm`.
//!
//! Prompts go to stderr through `dialoguer`, so JSON on stdout stays intact.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use dialoguer::Select;
use tracing::warn;

use crate::cli::output::change_paths;
use crate::diff::Change;
use crate::error::{Error, Result};

const CHOICES: &[&str] = &["yes", "no", "all remaining", "quit"];

/// What one answer means for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    All,
    Quit,
}

impl Answer {
    /// Escape, or a choice outside the list, quits.
    fn from_choice(choice: Option<usize>) -> Self {
        match choice {
            Some(0) => Self::Yes,
            Some(1) => Self::No,
            Some(2) => Self::All,
            _ => Self::Quit,
        }
    }
}

pub struct ChangePrompt<'a> {
    cancel: &'a AtomicBool,
    all: AtomicBool,
}

impl<'a> ChangePrompt<'a> {
    /// Quitting sets `cancel`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if stdin is not a terminal.
    pub fn new(cancel: &'a AtomicBool) -> Result<Self> {
        if !std::io::stdin().is_terminal() {
            return Err(Error::InvalidArgument(
                "--confirm needs an interactive terminal".to_string(),
            ));
        }
        Ok(Self {
            cancel,
            all: AtomicBool::new(false),
        })
    }

    /// Whether to apply `change`.
    pub fn ask(&self, change: &Change) -> bool {
        if self.all.load(Ordering::Relaxed) {
            return true;
        }
        let choice = Select::new()
            .with_prompt(format!(
                "{} {}",
                change.kind().to_string().bold(),
                change_paths(change)
            ))
            .items(CHOICES)
            .default(0)
            .interact_opt();
        let answer = match choice {
            Ok(choice) => Answer::from_choice(choice),
            Err(e) => {
                warn!(error = %e, "Prompt failed, stopping");
                Answer::Quit
            }
        };
        self.apply(answer)
    }

    fn apply(&self, answer: Answer) -> bool {
        match answer {
            Answer::Yes => true,
            Answer::No => false,
            Answer::All => {
                self.all.store(true, Ordering::Relaxed);
                true
            }
            Answer::Quit => {
                self.cancel.store(true, Ordering::Relaxed);
                false
            }
        }
    }
}
