use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

pub const DEFAULT_DATABASE_PATH: &str = "archivist.db";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
}

/// A volume the operator expects to attach. `id` must stay stable across mounts;
/// `root` is where the volume is currently mounted.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VolumeConfig {
    pub id: String,
    pub label: String,
    pub root: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            volumes: Vec::new(),
        }
    }
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("ARCHIVIST"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
