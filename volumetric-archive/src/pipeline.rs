//! Batch checkout across every declared volume.

use tracing::{debug, info};

use volumetric_core::{ArchiveVolume, VolumeName};

use crate::checkout::{checkout, CheckoutError, CheckoutOutcome};
use crate::policy::Environment;

/// The result of checking out one volume in a batch.
#[derive(Debug)]
pub struct VolumeReport {
    pub volume: VolumeName,
    pub result: Result<CheckoutOutcome, CheckoutError>,
}

impl VolumeReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Check out each volume in order. A failure is recorded and the next volume
/// is attempted.
pub fn checkout_all(volumes: &[ArchiveVolume], env: &mut Environment<'_>) -> Vec<VolumeReport> {
    let mut reports = Vec::with_capacity(volumes.len());
    for volume in volumes {
        let result = checkout(volume, env);
        if let Err(err) = &result {
            // Callers report the failure; this only traces it.
            debug!(volume = %volume.name, step = %err.step, "{}", err.source);
        }
        reports.push(VolumeReport {
            volume: volume.name.clone(),
            result,
        });
    }
    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    info!(volumes = reports.len(), failed, "checkout finished");
    reports
}
