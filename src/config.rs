use std::fs;

use log::LevelFilter;
use serde::Deserialize;

use crate::errors::ConfigError;

#[derive(Deserialize)]
pub struct StoreParameters {
    pub root_dir: String,
}

#[derive(Deserialize)]
pub struct RunParameters {
    pub timeout_secs: u64,
    #[serde(default)]
    pub relax_target: bool,
    #[serde(default)]
    pub demand_adjustment_override: Option<f64>,
}

#[derive(Deserialize)]
pub struct NotifyParameters {
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_endpoint: String,
    pub from: String,
    pub to: String,
}

#[derive(Deserialize)]
pub struct General {
    pub log_path: String,
    pub log_level: LevelFilter,
    pub log_to_stdout: bool,
}

#[derive(Deserialize)]
pub struct Config {
    pub store: StoreParameters,
    pub run: RunParameters,
    #[serde(default)]
    pub notify: Option<NotifyParameters>,
    pub general: General,
}

/// Loads the configuration file and returns a struct with all configuration
/// items.
///
/// # Arguments
///
/// * 'config_path' - path to the configuration file
pub fn load_config(config_path: &str) -> Result<Config, ConfigError> {
    let toml = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&toml)?;
    Ok(config)
}
