//! Init command implementation.

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;
use tracing::info;

use crate::cli::ScanArgs;
use crate::cli::commands::{Context, hash_pool, index_path, open_tree};
use crate::cli::output::{format_size, plural, print_json};
use crate::cli::progress::HashProgress;
use crate::error::{Error, Result};
use crate::fingerprint::Algorithm;
use crate::index;
use crate::progress::Event;
use crate::reconcile::{Outcome, Reconciler};

#[derive(Serialize)]
struct InitOutput<'a> {
    tree: &'a Path,
    index: PathBuf,
    algorithm: Algorithm,
    files: usize,
    bytes: u64,
    replaced: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if an index exists and `force` is not set,
/// or any error from scanning, hashing or saving.
pub fn execute(
    ctx: &Context,
    tree: &Path,
    force: bool,
    algorithm: Option<Algorithm>,
    scan: &ScanArgs,
) -> Result<Outcome> {
    let resolved = ctx.resolve(scan, algorithm, false)?;
    let fs_tree = open_tree(tree, &resolved)?;
    let path = index_path(tree, &resolved);

    let replaced = path.exists();
    if replaced && !force {
        return Err(Error::AlreadyInitialized { path });
    }

    let pool = hash_pool(resolved.jobs)?;
    let bar = HashProgress::new(ctx.human());
    let progress = |event: &Event<'_>| bar.handle(event);
    let index = Reconciler::new()
        .chunk_size(resolved.chunk_size)
        .pool(&pool)
        .progress(&progress)
        .build_index(&fs_tree, tree, resolved.algorithm);
    bar.finish();
    let index = index?;
    index::save(&index, &path)?;
    info!(index = %path.display(), replaced, "Index written");

    if ctx.json {
        print_json(&InitOutput {
            tree,
            index: path,
            algorithm: index.algorithm(),
            files: index.len(),
            bytes: index.total_size(),
            replaced,
        })?;
    } else if !ctx.quiet {
        let verb = if replaced { "Rebuilt" } else { "Created" };
        println!(
            "{} index {}",
            verb.green().bold(),
            path.display().to_string().bold()
        );
        println!(
            "  {} ({}), {}",
            plural(index.len(), "file"),
            format_size(index.total_size()),
            index.algorithm().to_string().dimmed()
        );
    }
    Ok(Outcome::Clean)
}
