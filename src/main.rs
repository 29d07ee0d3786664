//! dintact CLI entry point.

use clap::Parser;
use dintact::cli::commands::{self, Context};
use dintact::cli::{Cli, Commands};
use dintact::config::{Settings, load_settings};
use dintact::error::Error;
use dintact::reconcile::Outcome;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command; outcomes and errors map to disjoint exit codes
    match run(&cli, json) {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,ignore=info,globset=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<Outcome, Error> {
    let settings = match &cli.command {
        Commands::Completions { .. } | Commands::Version => Settings::default(),
        _ => load_settings(cli.config.as_deref())?,
    };
    let ctx = Context {
        settings,
        json,
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::Init {
            tree,
            force,
            algorithm,
            scan,
        } => commands::init::execute(&ctx, tree, *force, *algorithm, scan),
        Commands::Check {
            cold,
            deep,
            accept,
            scan,
        } => commands::check::execute(&ctx, cold, *deep, *accept, scan),
        Commands::Sync {
            hot,
            cold,
            deep,
            dry_run,
            repair,
            confirm,
            scan,
        } => commands::sync::execute(
            &ctx,
            hot,
            cold,
            &commands::sync::SyncFlags {
                deep: *deep,
                dry_run: *dry_run,
                repair: *repair,
                confirm: *confirm,
            },
            scan,
        ),
        Commands::Compare { hot, cold } => commands::compare::execute(&ctx, hot, cold),
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(json),
    }
}
