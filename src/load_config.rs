//! Loads the YAML configuration file (optional), applies environment
//! overrides, and validates the merged [`AppConfig`].
//!
//! All errors here are `anyhow::Error`s with enough context to be shown
//! directly at the CLI boundary.

use crate::config::AppConfig;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_LISTEN: &str = "BATCH_CONVERT_LISTEN";
pub const ENV_MAX_CONCURRENCY: &str = "BATCH_CONVERT_MAX_CONCURRENCY";
pub const ENV_WORKSPACE_ROOT: &str = "BATCH_CONVERT_WORKSPACE_ROOT";
pub const ENV_CONVERTER: &str = "BATCH_CONVERT_CONVERTER";

/// Loads config from `path` if given (defaults otherwise), then env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path_ref) => read_config_file(path_ref)?,
        None => {
            info!("No config file given, using defaults");
            AppConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    config.trace_loaded();
    Ok(config)
}

fn read_config_file(path_ref: &Path) -> Result<AppConfig> {
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid "all defaults" config.
    if config_content.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    if let Ok(var) = std::env::var(ENV_LISTEN) {
        config.server.listen = match var.parse() {
            Ok(addr) => addr,
            Err(e) => {
                error!(error = ?e, var = ?var, "{ENV_LISTEN} must be a socket address");
                anyhow::bail!("{ENV_LISTEN} must be a socket address like 127.0.0.1:3000: {e}");
            }
        };
        info!(listen = %config.server.listen, "Listen address taken from env");
    }

    if let Ok(var) = std::env::var(ENV_MAX_CONCURRENCY) {
        config.convert.max_concurrency = match var.parse::<usize>() {
            Ok(n) => n,
            Err(e) => {
                error!(error = ?e, var = ?var, "{ENV_MAX_CONCURRENCY} must be an integer");
                anyhow::bail!("{ENV_MAX_CONCURRENCY} must be a positive integer: {e}");
            }
        };
        info!(
            max_concurrency = config.convert.max_concurrency,
            "Concurrency ceiling taken from env"
        );
    }

    if let Ok(var) = std::env::var(ENV_WORKSPACE_ROOT) {
        config.convert.workspace_root = PathBuf::from(var);
        info!(
            workspace_root = %config.convert.workspace_root.display(),
            "Workspace root taken from env"
        );
    }

    if let Ok(var) = std::env::var(ENV_CONVERTER) {
        info!(program = %var, "Converter program taken from env");
        config.convert.converter.program = var;
    }

    Ok(())
}

/// Rejects configs the pipeline cannot run with.
pub fn validate(config: &AppConfig) -> Result<()> {
    let convert = &config.convert;
    if convert.max_concurrency == 0 {
        anyhow::bail!("convert.max_concurrency must be at least 1");
    }
    if convert.max_container_entries == 0 || convert.max_extracted_bytes == 0 {
        anyhow::bail!("convert.max_container_entries and convert.max_extracted_bytes must be positive");
    }
    if convert.target_extension.trim().is_empty() {
        anyhow::bail!("convert.target_extension must not be empty");
    }
    if convert.source_extensions.is_empty() {
        anyhow::bail!("convert.source_extensions must list at least one extension");
    }
    for name in [&convert.archive_name, &convert.manifest_name] {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            anyhow::bail!("invalid file name in config: {name:?}");
        }
    }
    if convert.converter.program.trim().is_empty() {
        anyhow::bail!("convert.converter.program must not be empty");
    }
    Ok(())
}
