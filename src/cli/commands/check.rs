//! Check command implementation.

use std::path::Path;

use colored::Colorize;
use tracing::info;

use crate::cli::ScanArgs;
use crate::cli::commands::{Context, hash_pool, index_path, load_existing, open_tree};
use crate::cli::output::{format_size, plural, print_outcome, print_run};
use crate::cli::progress::HashProgress;
use crate::error::Result;
use crate::index;
use crate::progress::Event;
use crate::reconcile::{CheckOptions, CheckReport, Outcome, Reconciler, ViolationKind};

/// Execute the check command.
///
/// The index is rewritten only when metadata was refreshed or `accept` is
/// set; file content is never touched.
///
/// # Errors
///
/// Returns an error if the tree or its index cannot be opened, or the
/// updated index cannot be saved.
pub fn execute(
    ctx: &Context,
    cold: &Path,
    deep: bool,
    accept: bool,
    scan: &ScanArgs,
) -> Result<Outcome> {
    let resolved = ctx.resolve(scan, None, deep)?;
    let tree = open_tree(cold, &resolved)?;
    let index = load_existing(cold, &resolved)?;

    let pool = hash_pool(resolved.jobs)?;
    let bar = HashProgress::new(ctx.human());
    let progress = |event: &Event<'_>| bar.handle(event);
    let result = Reconciler::new()
        .chunk_size(resolved.chunk_size)
        .deep(resolved.deep)
        .pool(&pool)
        .progress(&progress)
        .check(&tree, index, CheckOptions { accept });
    bar.finish();
    let result = result?;

    if result.index_changed {
        let path = index_path(cold, &resolved);
        index::save(&result.index, &path)?;
        info!(index = %path.display(), "Index updated");
    }

    let outcome = result.report.outcome();
    if ctx.json {
        print_run(outcome, &result.report)?;
    } else if !ctx.quiet {
        print_human(&result.report, outcome);
    }
    Ok(outcome)
}

fn print_human(report: &CheckReport, outcome: Outcome) {
    println!("{}", "Check".bold().underline());
    println!();
    println!("  {} {}", "Tree:".blue().bold(), report.tree);
    println!(
        "  {} {} ({}), {} rehashed{}",
        "Files:".blue().bold(),
        plural(report.files, "file"),
        format_size(report.bytes),
        report.hashed_files,
        if report.deep { " (deep)" } else { "" }
    );
    if report.refreshed > 0 {
        println!(
            "  {}",
            format!("{} with new timestamps but identical content", plural(report.refreshed, "file"))
                .dimmed()
        );
    }

    if !report.violations.is_empty() {
        println!();
        println!("{}", "Integrity violations:".red().bold());
        for v in &report.violations {
            let detail = match &v.kind {
                ViolationKind::Modified => "modified".to_string(),
                ViolationKind::Missing => "missing".to_string(),
                ViolationKind::Relocated { to } => format!("relocated to {to}"),
                ViolationKind::Unreadable { message } => format!("unreadable: {message}"),
            };
            println!("  {} {} {}", "!".red(), v.path, detail.dimmed());
            if let (Some(expected), Some(observed)) = (&v.expected, &v.observed) {
                if expected != observed {
                    println!(
                        "      {}",
                        format!("expected {} found {}", expected.short(), observed.short())
                            .dimmed()
                    );
                }
            }
        }
    }

    if !report.anomalies.is_empty() {
        println!();
        println!("{}", "Unexpected files:".yellow().bold());
        for a in &report.anomalies {
            println!(
                "  {} {} {}",
                "?".yellow(),
                a.path,
                format_size(a.size).dimmed()
            );
        }
    }

    if report.accepted && outcome == Outcome::Changed {
        println!();
        println!("{}", "Observed state accepted into the index.".dimmed());
    }

    println!();
    print_outcome(outcome);
}
