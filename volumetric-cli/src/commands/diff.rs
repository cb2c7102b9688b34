//! `volumetric diff <volume>`: show how a live volume differs from its archive.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use volumetric_archive::diff;

use super::{connect, load_config};

/// Arguments for `volumetric diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Declared volume name.
    pub volume: String,
}

impl DiffArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let volume = config.find_volume(&self.volume)?;
        let mut proxy = connect()?;

        let report = diff(&volume, &mut proxy)
            .with_context(|| format!("diff failed for '{}'", self.volume))?;

        if report.is_empty() {
            println!("No differences for '{}'.", report.volume);
        } else {
            print!("{report}");
        }
        Ok(())
    }
}
