//! Configuration file and source factory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use adaptest_core::engine::EngineConfig;
use adaptest_core::session::SessionConfig;
use adaptest_core::traits::SupplementarySource;

use crate::directory::DirectorySource;
use crate::http::HttpSource;

/// Environment variable that overrides the key of every HTTP source.
pub const SOURCE_KEY_ENV: &str = "ADAPTEST_SOURCE_KEY";

/// Configuration for one supplementary source.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Http {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Directory {
        path: PathBuf,
    },
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceConfig::Http {
                base_url,
                api_key,
                timeout_secs,
            } => f
                .debug_struct("Http")
                .field("base_url", base_url)
                .field("api_key", &api_key.as_ref().map(|_| "***"))
                .field("timeout_secs", timeout_secs)
                .finish(),
            SourceConfig::Directory { path } => {
                f.debug_struct("Directory").field("path", path).finish()
            }
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Top-level adaptest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptestConfig {
    /// Session parameters.
    #[serde(default)]
    pub exam: SessionConfig,
    /// Supplementary sources keyed by name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    /// Questions requested per subject/type slot from each source.
    #[serde(default = "default_per_type")]
    pub supplementary_per_type: u32,
    /// Max concurrent supplementary fetches.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Max retries on transient source errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_per_type() -> u32 {
    5
}
fn default_parallelism() -> usize {
    4
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}

impl Default for AdaptestConfig {
    fn default() -> Self {
        Self {
            exam: SessionConfig::default(),
            sources: BTreeMap::new(),
            supplementary_per_type: default_per_type(),
            parallelism: default_parallelism(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl AdaptestConfig {
    /// Engine settings derived from this file.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            parallelism: self.parallelism,
            supplementary_per_type: self.supplementary_per_type,
        }
    }

    /// Parse a config from TOML text and resolve environment references.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: AdaptestConfig = toml::from_str(content)?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        let override_key = std::env::var(SOURCE_KEY_ENV).ok().filter(|k| !k.is_empty());
        for source in self.sources.values_mut() {
            match source {
                SourceConfig::Http {
                    base_url, api_key, ..
                } => {
                    *base_url = resolve_env_vars(base_url);
                    *api_key = match &override_key {
                        Some(key) => Some(key.clone()),
                        None => api_key.as_deref().map(resolve_env_vars),
                    };
                }
                SourceConfig::Directory { path } => {
                    *path = PathBuf::from(resolve_env_vars(&path.to_string_lossy()));
                }
            }
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + len];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `adaptest.toml` in the current directory
/// 2. `~/.config/adaptest/config.toml`
///
/// Falls back to defaults when neither exists. `ADAPTEST_SOURCE_KEY`
/// overrides the key of every HTTP source.
pub fn load_config() -> Result<AdaptestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AdaptestConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("adaptest.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = AdaptestConfig::from_toml_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), sources = config.sources.len(), "loaded config");
            Ok(config)
        }
        None => {
            let mut config = AdaptestConfig::default();
            config.apply_env();
            Ok(config)
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("adaptest"))
}

/// Create a source instance from its configuration.
pub fn create_source(
    name: &str,
    source: &SourceConfig,
    config: &AdaptestConfig,
) -> Result<Arc<dyn SupplementarySource>> {
    match source {
        SourceConfig::Http {
            base_url,
            api_key,
            timeout_secs,
        } => {
            let http = HttpSource::with_timeout(name, base_url, api_key.clone(), *timeout_secs)
                .with_context(|| format!("failed to create source '{name}'"))?
                .with_retry(
                    config.max_retries,
                    Duration::from_millis(config.retry_delay_ms),
                );
            Ok(Arc::new(http))
        }
        SourceConfig::Directory { path } => Ok(Arc::new(DirectorySource::new(name, path))),
    }
}

/// Create every configured source, in name order.
pub fn create_sources(config: &AdaptestConfig) -> Result<Vec<Arc<dyn SupplementarySource>>> {
    config
        .sources
        .iter()
        .map(|(name, source)| create_source(name, source, config))
        .collect()
}
