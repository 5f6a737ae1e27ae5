use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where the out-of-process fetcher drops CSV exports.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_limit() -> i64 {
    100
}

fn default_max_limit() -> i64 {
    1000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.query.default_limit < 1 {
        anyhow::bail!("query.default_limit must be >= 1");
    }

    if config.query.max_limit < config.query.default_limit {
        anyhow::bail!("query.max_limit must be >= query.default_limit");
    }

    Ok(config)
}
