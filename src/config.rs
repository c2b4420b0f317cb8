// src/config.rs

//! Loading of the two configuration files under the storage directory.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, RuleSet};

pub const CONFIG_FILE: &str = "config.toml";
pub const RULESET_FILE: &str = "ruleset.toml";

/// Load operational configuration.
///
/// A missing file means defaults; a file that exists but does not parse is
/// an error.
pub fn load_config(storage_dir: &Path) -> Result<Config> {
    let path = storage_dir.join(CONFIG_FILE);
    if !path.exists() {
        log::warn!("{} not found, using default configuration", path.display());
        return Ok(Config::default());
    }
    Config::load(&path).map_err(|e| AppError::config(format!("{}: {e}", path.display())))
}

/// Load scoring rules, with the same missing-file rule as [`load_config`].
pub fn load_ruleset(storage_dir: &Path) -> Result<RuleSet> {
    let path = storage_dir.join(RULESET_FILE);
    if !path.exists() {
        log::warn!("{} not found, using default ruleset", path.display());
        return Ok(RuleSet::default());
    }
    RuleSet::load(&path).map_err(|e| AppError::config(format!("{}: {e}", path.display())))
}

/// Load and validate both files.
pub fn load_all(storage_dir: &Path) -> Result<(Config, RuleSet)> {
    let config = load_config(storage_dir)?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid {CONFIG_FILE}: {e}")))?;

    let rules = load_ruleset(storage_dir)?;
    rules
        .validate()
        .map_err(|e| AppError::config(format!("Invalid {RULESET_FILE}: {e}")))?;

    log::info!(
        "Loaded configuration from {} (ruleset {})",
        storage_dir.display(),
        rules.ruleset_version()
    );
    Ok((config, rules))
}
