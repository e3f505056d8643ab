use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Config {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub generation: GenerationSettings,
}

/// Configuration for the task generation coordinator
#[derive(Deserialize, Debug)]
pub struct GenerationSettings {
    /// How far ahead of today a sweep materializes, in days
    pub lookahead_days: i64,
    /// Limit on occurrences created per series per run
    pub max_batch_size: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let core = hearth_core::models::GenerationConfig::default();
        Self {
            lookahead_days: core.lookahead_days,
            max_batch_size: core.max_batch_size,
        }
    }
}

impl GenerationSettings {
    pub fn to_core(&self) -> hearth_core::models::GenerationConfig {
        hearth_core::models::GenerationConfig {
            lookahead_days: self.lookahead_days,
            max_batch_size: self.max_batch_size,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("hearth.toml"))
            .merge(Env::prefixed("HEARTH_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            generation: GenerationSettings::default(),
        }
    }
}

fn default_database_path() -> String {
    "hearth.db".to_string()
}
