//! Version command implementation.

use crate::error::Result;
use crate::fingerprint::Algorithm;
use crate::reconcile::Outcome;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    algorithms: [Algorithm; 2],
    default_algorithm: Algorithm,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<Outcome> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    if json {
        let output = VersionOutput {
            version,
            build,
            algorithms: [Algorithm::Xxh128, Algorithm::Sha256],
            default_algorithm: Algorithm::default(),
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
        return Ok(Outcome::Clean);
    }

    println!("dintact version {version} ({build})");
    Ok(Outcome::Clean)
}
