//! Common helpers shared across CLI commands.

use std::path::{Path, PathBuf};

use orbitstream::config::{default_config_path, PipelineConfig};

use crate::error::CliError;

/// `--config` if given, otherwise the per-user default.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<PathBuf, CliError> {
    match cli_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(default_config_path()?),
    }
}

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config(cli_path: Option<&Path>) -> Result<PipelineConfig, CliError> {
    let path = resolve_config_path(cli_path)?;
    Ok(PipelineConfig::load_or_default(&path)?)
}
