//! `volumetric commit <volume>`: capture a live volume into its archive.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use volumetric_archive::{commit, CommitOptions, CommitOutcome, Environment};

use super::{connect, load_config};

/// Arguments for `volumetric commit`.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Declared volume name.
    pub volume: String,

    /// Report the backup that would be made without touching anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CommitArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let volume = config.find_volume(&self.volume)?;
        let mut proxy = connect()?;
        let mut env = Environment::new(&mut proxy, &config.lock_directory);

        let options = CommitOptions {
            dry_run: self.dry_run,
        };
        let outcome = commit(&volume, &mut env, options)
            .with_context(|| format!("commit failed for '{}'", self.volume))?;

        match outcome {
            CommitOutcome::DryRun { backup } => println!(
                "[dry-run] would move {} to {}",
                volume.source_path.display(),
                backup.display()
            ),
            CommitOutcome::Committed {
                backup,
                paused,
                entries,
            } => println!(
                "✓ '{}' committed ({entries} entries, {} containers paused); previous archive at {}",
                volume.name,
                paused.len(),
                backup.display()
            ),
        }
        Ok(())
    }
}
