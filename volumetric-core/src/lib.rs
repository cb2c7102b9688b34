//! Volumetric core library: domain types, digests, configuration, errors.
//!
//! - [`types`]: volume names, update policies, declared archive volumes
//! - [`hash`]: [`FileHash`] and its `<algorithm>:<hex>` text form
//! - [`configuration`]: `volumetric.yaml` and project discovery
//! - [`project`]: per-project volume declarations

pub mod configuration;
pub mod error;
pub mod hash;
pub mod project;
pub mod types;

pub use configuration::Configuration;
pub use error::{ConfigError, HashError};
pub use hash::{FileHash, HashAlgorithm};
pub use project::ProjectFile;
pub use types::{ArchiveVolume, UpdatePolicy, VolumeName};
