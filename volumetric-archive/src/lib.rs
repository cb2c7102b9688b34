//! volumetric-archive: the engine that moves content between archives and
//! live volumes.
//!
//! Provides:
//! - [`checkout`]: materialize a declared archive into its live volume,
//!   governed by the volume's update policy
//! - [`diff`]: compare a live volume against its archive
//! - [`commit`]: capture a live volume back into a fresh archive
//! - [`pipeline`]: batch checkout across every declared volume

pub mod archive;
pub mod checkout;
pub mod commit;
pub mod diff;
pub mod directory;
pub mod error;
pub mod lock_file;
pub mod pipeline;
pub mod policy;

#[cfg(test)]
mod test_support;

pub use archive::{ArchiveEntry, ArchiveFile};
pub use checkout::{checkout, CheckoutError, CheckoutOutcome, CheckoutStep};
pub use commit::{commit, CommitOptions, CommitOutcome};
pub use diff::{diff, ChangeRecord, DiffReport};
pub use error::VolumeError;
pub use lock_file::LockFile;
pub use pipeline::{checkout_all, VolumeReport};
pub use policy::{Decision, Environment, Strategy};
