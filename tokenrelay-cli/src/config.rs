//! CLI configuration handling.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokenrelay_client::ClientConfig;
use tokenrelay_core::StoreBackend;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Target API and renewal settings.
    pub client: ClientConfig,

    /// Where credentials are kept between invocations.
    pub store: StoreBackend,

    /// Override for the file store location.
    pub credentials_path: Option<PathBuf>,

    /// Separates independent sessions in one store.
    pub namespace: String,

    /// Logging level, overridden by `RUST_LOG`.
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            store: StoreBackend::default(),
            credentials_path: None,
            namespace: "default".to_string(),
            log_level: "warn".to_string(),
            config_path: PathBuf::new(),
        }
    }
}

/// `config.toml` in the platform config directory.
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("tokenrelay.toml"))
}

/// Load configuration from `path`, or the default location.
///
/// A missing file yields the defaults; an unreadable or invalid one is an error.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        parse_config(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    config.config_path = config_path;
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<CliConfig> {
    let config: CliConfig = toml::from_str(contents)?;
    config.client.parsed_base_url()?;
    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "tokenrelay", "tokenrelay")
}
