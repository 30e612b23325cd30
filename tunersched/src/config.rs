//! Configuration file format.
//!
//! Every section is optional; absent values fall back to the command line
//! defaults, and command line values win over the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::scheduler::EvaluatorConfig;

/// Name looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "tunersched.toml";

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct DatabaseSection {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

pub fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Config file to load: explicit path > auto-detect > none.
pub fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    })
}
