//! Compare command implementation.
//!
//! Works on the two indexes alone, so it is cheap enough to run before every
//! sync and never reads a file.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::cli::ScanArgs;
use crate::cli::commands::{Context, load_existing};
use crate::cli::output::{plural, print_change, print_outcome, print_run};
use crate::diff::{ChangeKind, ChangeSet, diff_indexes};
use crate::error::{Error, Result};
use crate::reconcile::Outcome;

#[derive(Serialize)]
struct CompareReport<'a> {
    hot_files: usize,
    cold_files: usize,
    /// What sync would do to the cold tree if the hot index were current.
    changes: &'a ChangeSet,
}

/// Execute the compare command.
///
/// # Errors
///
/// Returns `IndexNotFound` if either tree has no index, or
/// `AlgorithmMismatch` if they were built with different algorithms.
pub fn execute(ctx: &Context, hot: &Path, cold: &Path) -> Result<Outcome> {
    let resolved = ctx.resolve(&ScanArgs::default(), None, false)?;
    let hot_index = load_existing(hot, &resolved)?;
    let cold_index = load_existing(cold, &resolved)?;
    if hot_index.algorithm() != cold_index.algorithm() {
        return Err(Error::AlgorithmMismatch {
            hot: hot_index.algorithm().to_string(),
            cold: cold_index.algorithm().to_string(),
        });
    }

    let changes = diff_indexes(&cold_index, &hot_index);
    let outcome = if changes.is_empty() {
        Outcome::Clean
    } else {
        Outcome::Changed
    };

    if ctx.json {
        print_run(
            outcome,
            &CompareReport {
                hot_files: hot_index.len(),
                cold_files: cold_index.len(),
                changes: &changes,
            },
        )?;
    } else if !ctx.quiet {
        println!("{}", "Compare".bold().underline());
        println!();
        println!(
            "  {} {} / {}",
            "Indexed:".blue().bold(),
            plural(hot_index.len(), "hot file"),
            plural(cold_index.len(), "cold file")
        );
        if !changes.is_empty() {
            println!(
                "  {} {} deleted, {} moved, {} new, {} modified",
                "Pending:".blue().bold(),
                changes.count(ChangeKind::Delete),
                changes.count(ChangeKind::Move),
                changes.count(ChangeKind::Insert),
                changes.count(ChangeKind::Modify)
            );
            println!();
            for change in &changes {
                print_change(change);
            }
        }
        println!();
        print_outcome(outcome);
    }
    Ok(outcome)
}
