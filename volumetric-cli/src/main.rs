//! Volumetric: version-controlled archive volumes for container runtimes.
//!
//! # Usage
//!
//! ```text
//! volumetric [--config FILE] checkout
//! volumetric [--config FILE] diff <VOLUME>
//! volumetric [--config FILE] commit <VOLUME> [--dry-run]
//! ```
//!
//! The daemon socket comes from `DOCKER_HOST` (`unix://` only), else the
//! standard socket path. Logging goes to stderr; set `RUST_LOG` to adjust.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{checkout::CheckoutArgs, commit::CommitArgs, diff::DiffArgs};
use volumetric_core::configuration::DEFAULT_CONFIG_PATH;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "volumetric",
    version,
    about = "Check out, diff, and commit archive-backed container volumes",
    long_about = None,
)]
struct Cli {
    /// Path to volumetric.yaml.
    #[arg(
        long,
        global = true,
        env = "VOLUMETRIC_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        value_name = "FILE"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Populate every declared volume whose update policy calls for it.
    Checkout(CheckoutArgs),

    /// Show how a live volume differs from its archive.
    Diff(DiffArgs),

    /// Capture a live volume into a fresh archive, keeping a backup.
    Commit(CommitArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Checkout(args) => args.run(&cli.config),
        Commands::Diff(args) => args.run(&cli.config),
        Commands::Commit(args) => args.run(&cli.config),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
