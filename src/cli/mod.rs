//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::fingerprint::Algorithm;

pub mod commands;
pub mod output;
pub mod progress;
pub mod prompt;

/// dintact - verify and maintain bit-identical backups
#[derive(Parser, Debug)]
#[command(name = "dintact", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (default: <config dir>/dintact/config.json)
    #[arg(long, global = true, env = "DINTACT_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Options shared by every command that scans a tree.
#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Hashing threads (default: one per CPU)
    #[arg(short, long, env = "DINTACT_JOBS", value_name = "N")]
    pub jobs: Option<usize>,

    /// Extra exclude pattern in gitignore syntax (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fingerprint every file of a tree into a fresh index
    Init {
        /// Root of the tree
        tree: PathBuf,

        /// Replace an existing index
        #[arg(long)]
        force: bool,

        /// Fingerprint algorithm (xxh128, sha256)
        #[arg(long, value_name = "NAME")]
        algorithm: Option<Algorithm>,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Verify a cold tree against its index
    Check {
        /// Root of the cold tree
        cold: PathBuf,

        /// Rehash every file instead of trusting size and modification time
        #[arg(long, env = "DINTACT_DEEP")]
        deep: bool,

        /// Record the observed state as the new baseline
        #[arg(long)]
        accept: bool,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Mirror changes of the hot tree onto the cold tree
    Sync {
        /// Root of the hot (working) tree
        hot: PathBuf,

        /// Root of the cold (backup) tree
        cold: PathBuf,

        /// Rehash every file instead of trusting size and modification time
        #[arg(long, env = "DINTACT_DEEP")]
        deep: bool,

        /// Show what would change without touching either tree
        #[arg(long)]
        dry_run: bool,

        /// Rewrite missing or damaged cold files from their hot copies
        #[arg(long)]
        repair: bool,

        /// Ask before applying each change
        #[arg(long, conflicts_with = "dry_run")]
        confirm: bool,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Compare the indexes of two trees without reading any file
    Compare {
        /// Root of the hot tree
        hot: PathBuf,

        /// Root of the cold tree
        cold: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
