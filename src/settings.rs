//! Layered configuration: built-in defaults, then an optional config file,
//! then `SETCOVER_*` environment variables (`__` separates nested keys, as in
//! `SETCOVER_GENERATOR__SEED=7`).

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default file name looked up in the working directory, any format
/// `config` recognises by extension.
pub const DEFAULT_CONFIG_NAME: &str = "setcover";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_filter: String,
    /// Rules fed to the greedy engine before the online phase starts.
    pub start_rules: usize,
    pub budget_secs: u64,
    /// Log progress every this many online rules, never if zero.
    pub stats_every: u64,
    pub generator: GeneratorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            start_rules: 5000,
            budget_secs: 300,
            stats_every: 1000,
            generator: GeneratorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub num_rules: usize,
    pub num_sets: usize,
    pub max_rules_per_set: usize,
    pub seed: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            num_rules: 7000,
            num_sets: 3000,
            max_rules_per_set: 20,
            seed: 10,
        }
    }
}

impl Settings {
    /// Loads settings. An explicit `path` must exist; without one a
    /// `setcover.*` file in the working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        let builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix("SETCOVER").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
