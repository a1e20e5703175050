//! Server configuration

use anyhow::{ensure, Result};
use diagnosis_lib::predictor::{ServiceConfig, DEFAULT_TOP_K};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment prefix, e.g. `DIAGNOSIS_MODEL_DIR`
pub const ENV_PREFIX: &str = "DIAGNOSIS";

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance label attached to log events
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// HTTP port for predict, symptoms, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding `manifest.json` and the artifacts it lists
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Ranked diseases per response
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            model_dir: default_model_dir(),
            top_k: default_top_k(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    pub fn from_environment(source: config::Environment) -> Result<Self> {
        let config: ServerConfig = config::Config::builder()
            .add_source(source.try_parsing(true))
            .build()?
            .try_deserialize()?;

        ensure!(config.top_k >= 1, "top_k must be at least 1");
        Ok(config)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            top_k: self.top_k,
            instance: self.node_name.clone(),
        }
    }
}
