//! TOML configuration parsing and validation.
//!
//! Every section has defaults, so an absent config file yields a usable
//! [`Config::minimal`] that targets a local SQLite database and the
//! default content repository.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use idx_sync_core::models::{NullPolicy, StorageMode};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Environment variable that, when set, overrides `url`.
    #[serde(default = "default_db_url_env")]
    pub url_env: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            url_env: default_db_url_env(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_url() -> String {
    "sqlite:./data/idx-sync.sqlite".to_string()
}
fn default_db_url_env() -> String {
    "IDX_SYNC_DATABASE_URL".to_string()
}
fn default_max_connections() -> u32 {
    5
}

impl DbConfig {
    /// The effective database URL: `url_env` if set, else `url`.
    pub fn resolved_url(&self) -> String {
        std::env::var(&self.url_env)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.url.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_repo")]
    pub repo: String,
    /// Tree revision to scan. Falls back to the local `git rev-parse HEAD`.
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Recognized document extensions, without the dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude_prefixes")]
    pub exclude_prefixes: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Only documents whose path contains this substring are synced.
    #[serde(default)]
    pub path_filter: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            repo: default_repo(),
            revision: None,
            api_base: default_api_base(),
            token_env: default_token_env(),
            extensions: default_extensions(),
            exclude_prefixes: default_exclude_prefixes(),
            exclude_globs: Vec::new(),
            path_filter: None,
        }
    }
}

fn default_owner() -> String {
    "constanceyu".to_string()
}
fn default_repo() -> String {
    "helix-home".to_string()
}
fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "IDX_SYNC_GITHUB_TOKEN".to_string()
}
fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}
fn default_exclude_prefixes() -> Vec<String> {
    vec![".github".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Replaces the document extension to form the fragment path.
    #[serde(default = "default_fragment_suffix")]
    pub fragment_suffix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            fragment_suffix: default_fragment_suffix(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/".to_string()
}
fn default_fragment_suffix() -> String {
    ".idx.json".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: StorageMode,
    /// Maximum documents fetched and written at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub null_policy: NullPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            concurrency: default_concurrency(),
            null_policy: NullPolicy::default(),
        }
    }
}

fn default_concurrency() -> usize {
    16
}

impl Config {
    /// All defaults; used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.concurrency == 0 {
            bail!("sync.concurrency must be > 0");
        }
        if self.db.max_connections == 0 {
            bail!("db.max_connections must be > 0");
        }
        if self.source.extensions.is_empty() {
            bail!("source.extensions must not be empty");
        }
        if self.fetch.fragment_suffix.is_empty() {
            bail!("fetch.fragment_suffix must not be empty");
        }
        if self.source.owner.is_empty() || self.source.repo.is_empty() {
            bail!("source.owner and source.repo must be set");
        }
        reqwest::Url::parse(&self.fetch.base_url)
            .with_context(|| format!("fetch.base_url is not a valid URL: {}", self.fetch.base_url))?;

        let url = self.db.resolved_url();
        if !(url.starts_with("sqlite:")
            || url.starts_with("postgres://")
            || url.starts_with("postgresql://"))
        {
            bail!(
                "Unsupported database URL '{}'. Must start with sqlite:, postgres:// or postgresql://",
                url
            );
        }
        Ok(())
    }
}

/// Load and validate the config at `path`, or [`Config::minimal`] if the
/// file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let config = Config::minimal();
        config.validate()?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
