//! Human and JSON rendering shared by the commands.

use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::diff::Change;
use crate::error::Result;
use crate::reconcile::Outcome;

/// JSON envelope for commands that end in an [`Outcome`].
#[derive(Serialize)]
pub struct RunOutput<'a, T: Serialize> {
    pub outcome: Outcome,
    pub exit_code: u8,
    #[serde(flatten)]
    pub report: &'a T,
}

/// Print `report` as one JSON document on stdout.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn print_run<T: Serialize>(outcome: Outcome, report: &T) -> Result<()> {
    print_json(&RunOutput {
        outcome,
        exit_code: outcome.exit_code(),
        report,
    })
}

/// Print any serializable value as one JSON line on stdout.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let payload = serde_json::to_string(value)?;
    println!("{payload}");
    Ok(())
}

/// One-character marker and colour for a change.
#[must_use]
pub fn change_marker(change: &Change) -> ColoredString {
    match change {
        Change::Insert { .. } => "+".green(),
        Change::Delete { .. } => "-".red(),
        Change::Modify { .. } => "~".yellow(),
        Change::Move { .. } => ">".cyan(),
    }
}

/// `a/b.txt` or `old -> new` for moves.
#[must_use]
pub fn change_paths(change: &Change) -> String {
    match change {
        Change::Move { from, to } => format!("{} -> {}", from.path, to.path),
        other => other.path().to_string(),
    }
}

pub fn print_change(change: &Change) {
    println!("  {} {}", change_marker(change), change_paths(change));
}

/// Final status line.
pub fn print_outcome(outcome: Outcome) {
    let label = match outcome {
        Outcome::Clean => "clean".green().bold(),
        Outcome::Changed => "changed".blue().bold(),
        Outcome::Attention => "needs attention".yellow().bold(),
        Outcome::Violation => "INTEGRITY VIOLATION".red().bold(),
    };
    println!("{} {label}", "Result:".bold());
}

/// Format a byte size as a human-readable string.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// `1 file` / `3 files`.
#[must_use]
pub fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}
