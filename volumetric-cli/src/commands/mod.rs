pub mod checkout;
pub mod commit;
pub mod diff;

use std::path::Path;

use anyhow::{Context, Result};

use volumetric_core::Configuration;
use volumetric_docker::DockerProxy;

pub(crate) fn load_config(path: &Path) -> Result<Configuration> {
    Configuration::load(path)
        .with_context(|| format!("could not load configuration from {}", path.display()))
}

pub(crate) fn connect() -> Result<DockerProxy> {
    DockerProxy::from_env().context("could not resolve the daemon socket")
}
