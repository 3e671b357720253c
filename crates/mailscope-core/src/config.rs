use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project-relative location of the config file.
pub const PROJECT_CONFIG_PATH: &str = ".mailscope/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailscopeConfig {
    #[serde(default)]
    pub threads: ThreadConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub live: LiveConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    #[serde(default = "default_max_display_depth")]
    pub max_display_depth: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            max_display_depth: default_max_display_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_topics: default_max_topics(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_heatmap_bucket_secs")]
    pub heatmap_bucket_secs: i64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            heatmap_bucket_secs: default_heatmap_bucket_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Messages kept by a follow-tail view.
    #[serde(default = "default_tail_limit")]
    pub tail_limit: usize,
    /// Messages requested per older-page fetch.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Agent whose DM conversations the dashboard shows.
    #[serde(default)]
    pub self_agent: Option<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            tail_limit: default_tail_limit(),
            page_size: default_page_size(),
            refresh_interval_ms: default_refresh_interval_ms(),
            self_agent: None,
        }
    }
}

/// Load `<project_root>/.mailscope/config.toml`, or defaults if absent.
pub fn load_project_config(project_root: &Path) -> Result<MailscopeConfig> {
    load_config_file(&project_root.join(PROJECT_CONFIG_PATH))
}

/// Load `<config_dir>/mailscope/config.toml`, or defaults if absent.
pub fn load_user_config() -> Result<MailscopeConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(MailscopeConfig::default());
    };
    load_config_file(&config_dir.join("mailscope/config.toml"))
}

/// Load one config file; a missing file yields defaults.
pub fn load_config_file(path: &Path) -> Result<MailscopeConfig> {
    if !path.exists() {
        return Ok(MailscopeConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<MailscopeConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve the effective config.
///
/// Precedence (highest wins): explicit `--config` file, project file, user
/// file, built-in defaults. Files replace each other whole; sections are not
/// merged field by field.
pub fn resolve_config(project_root: &Path, explicit: Option<&Path>) -> Result<MailscopeConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        return load_config_file(path);
    }

    let project_path: PathBuf = project_root.join(PROJECT_CONFIG_PATH);
    if project_path.exists() {
        return load_config_file(&project_path);
    }

    load_user_config()
}

const fn default_max_display_depth() -> usize {
    6
}

const fn default_max_nodes() -> usize {
    12
}

const fn default_max_topics() -> usize {
    8
}

const fn default_top_n() -> usize {
    5
}

const fn default_heatmap_bucket_secs() -> i64 {
    3_600
}

const fn default_tail_limit() -> usize {
    500
}

const fn default_page_size() -> usize {
    200
}

const fn default_refresh_interval_ms() -> u64 {
    2_000
}
