//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show`, and `config init`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use orbitstream::config::PipelineConfig;

use super::common::{load_config, resolve_config_path};
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path {
        /// Use this file instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration (file merged over defaults)
    Show {
        /// Use this file instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Use this file instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path { config } => run_path(config.as_deref()),
        ConfigCommands::Show { config } => run_show(config.as_deref()),
        ConfigCommands::Init { config, force } => {
            let path = resolve_config_path(config.as_deref())?;
            run_init(&path, force)
        }
    }
}

fn run_path(config: Option<&Path>) -> Result<(), CliError> {
    println!("{}", resolve_config_path(config)?.display());
    Ok(())
}

fn run_show(config: Option<&Path>) -> Result<(), CliError> {
    let effective = load_config(config)?;
    print!("{}", effective.to_ini_string());
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }
    PipelineConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
