//! Daemon configuration.

use config::{Config, Environment, File};
use serde::Deserialize;

/// Configuration for the `havend` daemon.
///
/// Loaded from an optional file plus `HAVEN_`-prefixed environment
/// variables; CLI flags override both.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Listen address, e.g. `127.0.0.1:8080`
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// PostgreSQL URL; in-memory storage when absent
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_url: None,
        }
    }
}

impl ApiConfig {
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder
            .add_source(Environment::with_prefix("HAVEN"))
            .build()?
            .try_deserialize()
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}
