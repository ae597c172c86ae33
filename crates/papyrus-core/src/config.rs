//! Configuration management for papyrus.
//!
//! Loads configuration from ${PAPYRUS_HOME}/config.toml with defaults for
//! every field.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use papyrus_types::QuerySettings;
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable overriding `backend_url`.
pub const BACKEND_URL_ENV: &str = "PAPYRUS_BACKEND_URL";

pub mod paths {
    //! Path resolution for papyrus configuration and data directories.
    //!
    //! PAPYRUS_HOME resolution order:
    //! 1. PAPYRUS_HOME environment variable (if set)
    //! 2. ~/.config/papyrus (default)

    use std::path::PathBuf;

    use anyhow::{Context, Result};

    pub const HOME_ENV: &str = "PAPYRUS_HOME";

    /// Returns the papyrus home directory.
    pub fn papyrus_home() -> Result<PathBuf> {
        if let Ok(home) = std::env::var(HOME_ENV) {
            return Ok(PathBuf::from(home));
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("papyrus"))
            .context("Could not determine home directory (set PAPYRUS_HOME)")
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(papyrus_home()?.join("config.toml"))
    }

    /// Directory of the durable key-value slots (history lives here).
    pub fn storage_dir() -> Result<PathBuf> {
        Ok(papyrus_home()?.join("storage"))
    }

    pub fn logs_dir() -> Result<PathBuf> {
        Ok(papyrus_home()?.join("logs"))
    }
}

/// Embedded commented template written by `config init`.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Defaults applied to `ask` when no flag overrides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub top_k: u32,
    pub bm25_weight: f64,
    pub prompt_template: String,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            top_k: QuerySettings::DEFAULT_TOP_K,
            bm25_weight: QuerySettings::DEFAULT_BM25_WEIGHT,
            prompt_template: QuerySettings::DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    pub api_prefix: String,
    /// 0 disables the timeout.
    pub request_timeout_secs: u32,
    pub log_level: String,
    pub query: QueryDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: Self::DEFAULT_BACKEND_URL.to_string(),
            api_prefix: Self::DEFAULT_API_PREFIX.to_string(),
            request_timeout_secs: 0,
            log_level: Self::DEFAULT_LOG_LEVEL.to_string(),
            query: QueryDefaults::default(),
        }
    }
}

impl Config {
    const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
    const DEFAULT_API_PREFIX: &str = "/api/v1";
    const DEFAULT_LOG_LEVEL: &str = "warn";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path()?)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })
    }

    /// Backend URL with `PAPYRUS_BACKEND_URL` taking precedence.
    pub fn backend_url(&self) -> Result<Url> {
        self.resolve_backend_url(std::env::var(BACKEND_URL_ENV).ok().as_deref())
    }

    fn resolve_backend_url(&self, env_override: Option<&str>) -> Result<Url> {
        let raw = env_override
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.backend_url);
        let url = Url::parse(raw).with_context(|| format!("Invalid backend URL: {raw}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Backend URL must be http or https: {raw}");
        }
        Ok(url)
    }

    /// Base URL of the query API, e.g. `http://localhost:8000/api/v1`.
    pub fn api_base_url(&self) -> Result<String> {
        let backend = self.backend_url()?;
        Ok(join_api_base(&backend, &self.api_prefix))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.request_timeout_secs)))
        }
    }

    /// Query settings from the `[query]` table, weights auto-balanced.
    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings::balanced(
            self.query.top_k,
            self.query.bm25_weight,
            self.query.prompt_template.clone(),
        )
    }
}

fn join_api_base(backend: &Url, prefix: &str) -> String {
    let base = backend.as_str().trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{prefix}")
    }
}
