//! `volumetric checkout`: populate every declared volume.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;

use volumetric_archive::{checkout_all, CheckoutOutcome, Environment};

use super::{connect, load_config};

/// Arguments for `volumetric checkout`.
#[derive(Args, Debug)]
pub struct CheckoutArgs {}

impl CheckoutArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let volumes = config.volumes().context("could not read volume declarations")?;
        if volumes.is_empty() {
            println!("No volumes declared under {}.", config.volume_directory.display());
            return Ok(());
        }

        let mut proxy = connect()?;
        let mut env = Environment::new(&mut proxy, &config.lock_directory);
        let reports = checkout_all(&volumes, &mut env);

        let mut failed = 0;
        for report in &reports {
            match &report.result {
                Ok(CheckoutOutcome::Unchanged) => {
                    println!("✓ '{}' up to date", report.volume);
                }
                Ok(CheckoutOutcome::CheckedOut { mountpoint, entries }) => {
                    println!(
                        "✓ '{}' checked out ({entries} entries into {})",
                        report.volume,
                        mountpoint.display()
                    );
                }
                Err(err) => {
                    failed += 1;
                    eprintln!("{err}");
                }
            }
        }

        if failed > 0 {
            bail!("{failed} of {} volumes failed to check out", reports.len());
        }
        Ok(())
    }
}
