//! Materialize an archive into its live volume.
//!
//! Steps run in a fixed order: decide, check, create volume, extract, commit
//! hook. The first failure stops the run and is reported with the step that
//! produced it. Nothing is created if decide or check fail.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use volumetric_core::{ArchiveVolume, VolumeName};

use crate::archive::ArchiveFile;
use crate::error::VolumeError;
use crate::policy::{strategy_for, Decision, Environment};

/// What a successful checkout did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The policy found nothing to do.
    Unchanged,
    CheckedOut { mountpoint: PathBuf, entries: usize },
}

/// The checkout step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStep {
    Decide,
    Check,
    CreateVolume,
    Extract,
    CommitHook,
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutStep::Decide => write!(f, "decide"),
            CheckoutStep::Check => write!(f, "check"),
            CheckoutStep::CreateVolume => write!(f, "create volume"),
            CheckoutStep::Extract => write!(f, "extract"),
            CheckoutStep::CommitHook => write!(f, "commit hook (volume already created)"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{volume}: {step} failed: {source}")]
pub struct CheckoutError {
    pub volume: VolumeName,
    pub step: CheckoutStep,
    #[source]
    pub source: VolumeError,
}

/// Check out `volume` according to its update policy.
pub fn checkout(
    volume: &ArchiveVolume,
    env: &mut Environment<'_>,
) -> Result<CheckoutOutcome, CheckoutError> {
    let failed = |step| {
        move |source| CheckoutError {
            volume: volume.name.clone(),
            step,
            source,
        }
    };
    let strategy = strategy_for(volume.update_policy);

    let decision = strategy
        .decide(volume, env)
        .map_err(failed(CheckoutStep::Decide))?;
    if decision == Decision::NoAction {
        debug!(volume = %volume.name, policy = %strategy.policy(), "nothing to do");
        return Ok(CheckoutOutcome::Unchanged);
    }

    let (mountpoint, entries) = {
        let archive =
            ArchiveFile::map(&volume.source_path).map_err(failed(CheckoutStep::Check))?;
        strategy
            .check(volume, &archive, env)
            .map_err(failed(CheckoutStep::Check))?;

        let live = env
            .runtime
            .create_volume(volume.name.as_str())
            .map_err(|e| failed(CheckoutStep::CreateVolume)(VolumeError::from(e)))?;
        info!(volume = %volume.name, mountpoint = %live.mountpoint.display(), "volume created");

        let entries = archive
            .extract(&live.mountpoint)
            .map_err(failed(CheckoutStep::Extract))?;
        (live.mountpoint, entries)
    };

    strategy
        .commit_hook(volume, env)
        .map_err(failed(CheckoutStep::CommitHook))?;

    info!(volume = %volume.name, entries, "checkout complete");
    Ok(CheckoutOutcome::CheckedOut {
        mountpoint,
        entries,
    })
}
