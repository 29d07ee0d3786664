//! Sync command implementation.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use colored::Colorize;
use tracing::info;

use crate::cli::ScanArgs;
use crate::cli::commands::{Context, hash_pool, index_path, open_tree};
use crate::cli::output::{
    change_marker, change_paths, format_size, plural, print_change, print_outcome, print_run,
};
use crate::cli::progress::HashProgress;
use crate::cli::prompt::ChangePrompt;
use crate::diff::Change;
use crate::error::Result;
use crate::index;
use crate::progress::Event;
use crate::reconcile::{Damage, Outcome, Reconciler, SyncOptions, SyncReport};

/// Switches of one sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncFlags {
    pub deep: bool,
    pub dry_run: bool,
    pub repair: bool,
    pub confirm: bool,
}

/// Execute the sync command.
///
/// Both indexes are saved after the run, including one that stopped part-way,
/// so they describe what actually reached the cold tree. A dry run saves
/// nothing.
///
/// # Errors
///
/// Returns an error if either tree or index cannot be opened, the indexes
/// use different algorithms, `--confirm` has no terminal to ask on, or saving
/// fails.
pub fn execute(
    ctx: &Context,
    hot: &Path,
    cold: &Path,
    flags: &SyncFlags,
    scan: &ScanArgs,
) -> Result<Outcome> {
    let resolved = ctx.resolve(scan, None, flags.deep)?;
    let hot_tree = open_tree(hot, &resolved)?;
    let cold_tree = open_tree(cold, &resolved)?;

    let hot_index_path = index_path(hot, &resolved);
    let cold_index_path = index_path(cold, &resolved);
    let cold_index = index::load(&cold_index_path, cold, resolved.algorithm)?;
    let hot_index = index::load(&hot_index_path, hot, cold_index.algorithm())?;

    let cancel = AtomicBool::new(false);
    let prompt = if flags.confirm {
        Some(ChangePrompt::new(&cancel)?)
    } else {
        None
    };

    let human = ctx.human();
    let bar = HashProgress::new(human);
    let live = |event: &Event<'_>| {
        bar.handle(event);
        if !human {
            return;
        }
        match event {
            Event::Applied { change } => print_change(change),
            Event::Repaired { path } => {
                println!("  {} {} {}", "*".cyan(), path, "repaired".dimmed());
            }
            _ => {}
        }
    };
    let ask = |change: &Change| {
        bar.finish();
        prompt.as_ref().is_none_or(|p| p.ask(change))
    };

    if human {
        let title = if flags.dry_run { "Sync (dry run)" } else { "Sync" };
        println!("{}", title.bold().underline());
        println!();
    }

    let pool = hash_pool(resolved.jobs)?;
    let mut reconciler = Reconciler::new()
        .chunk_size(resolved.chunk_size)
        .deep(resolved.deep)
        .pool(&pool)
        .progress(&live)
        .cancel(&cancel);
    if prompt.is_some() {
        reconciler = reconciler.confirm(&ask);
    }
    let result = reconciler.sync(
        &hot_tree,
        &cold_tree,
        hot_index,
        cold_index,
        SyncOptions {
            dry_run: flags.dry_run,
            repair: flags.repair,
        },
    );
    bar.finish();
    let result = result?;

    if !flags.dry_run {
        // Cold first: if the hot save is lost, the next run replays changes
        // the cold side already holds, which preflight recognises.
        index::save(&result.cold_index, &cold_index_path)?;
        index::save(&result.hot_index, &hot_index_path)?;
        info!(
            hot = %hot_index_path.display(),
            cold = %cold_index_path.display(),
            "Indexes saved"
        );
    }

    let outcome = result.report.outcome();
    if ctx.json {
        print_run(outcome, &result.report)?;
    } else if !ctx.quiet {
        print_human(&result.report, outcome);
    }
    Ok(outcome)
}

fn print_human(report: &SyncReport, outcome: Outcome) {
    if report.dry_run {
        for change in &report.applied {
            print_change(change);
        }
    }
    if !report.applied.is_empty() {
        println!();
    }

    let verb = if report.dry_run { "to apply" } else { "applied" };
    println!(
        "  {} {} {verb}, {} already in place",
        "Changes:".blue().bold(),
        plural(report.applied.len(), "change"),
        report.already_applied.len()
    );
    println!(
        "  {} {} ({}) rehashed",
        "Hashed:".blue().bold(),
        plural(report.hashed_files, "file"),
        format_size(report.hashed_bytes)
    );

    if !report.conflicts.is_empty() {
        println!();
        println!("{}", "Conflicts (skipped):".red().bold());
        for c in &report.conflicts {
            println!(
                "  {} {} {}",
                change_marker(&c.change),
                change_paths(&c.change),
                c.reason.to_string().dimmed()
            );
        }
    }

    if !report.failures.is_empty() {
        println!();
        println!("{}", "Failed:".yellow().bold());
        for f in &report.failures {
            println!(
                "  {} {} {}",
                change_marker(&f.change),
                change_paths(&f.change),
                f.message.dimmed()
            );
        }
    }

    if !report.repaired.is_empty() {
        println!();
        let title = if report.dry_run { "To repair from hot:" } else { "Repaired from hot:" };
        println!("{}", title.cyan().bold());
        for r in &report.repaired {
            let damage = match &r.damage {
                Damage::Missing => "was missing".to_string(),
                Damage::Diverged { observed } => format!("held {}", observed.short()),
                Damage::Unreadable { message } => format!("unreadable: {message}"),
            };
            println!("  {} {} {}", "*".cyan(), r.path, damage.dimmed());
        }
    }

    if !report.declined.is_empty() {
        println!();
        println!("{}", "Declined:".yellow().bold());
        for change in &report.declined {
            println!("  {} {}", change_marker(change), change_paths(change));
        }
    }

    if !report.unreadable.is_empty() {
        println!();
        println!("{}", "Unreadable hot files (not synced):".yellow().bold());
        for u in &report.unreadable {
            println!("  {} {} {}", "?".yellow(), u.path, u.message.dimmed());
        }
    }

    if !report.skipped.is_empty() {
        println!();
        println!(
            "{}",
            format!("{} not attempted", plural(report.skipped.len(), "change")).dimmed()
        );
    }

    println!();
    print_outcome(outcome);
}
