use crate::domain::{models::StatusFilter, vcs::DiffOptions};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitConfig {
    pub executable: String,
    pub max_concurrent_queries: usize,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            executable: "git".to_string(),
            max_concurrent_queries: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub limit: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiffConfig {
    pub context_lines: u32,
    pub ignore_whitespace: bool,
    /// Status letters shown by default, e.g. "AMD". "*" shows everything.
    pub status_filter: String,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context_lines: 3,
            ignore_whitespace: false,
            status_filter: "*".to_string(),
        }
    }
}

impl DiffConfig {
    pub fn options(&self) -> DiffOptions {
        DiffOptions {
            context_lines: self.context_lines,
            ignore_whitespace: self.ignore_whitespace,
        }
    }

    pub fn status_filter(&self) -> Result<StatusFilter> {
        StatusFilter::parse(&self.status_filter)
            .ok_or_else(|| anyhow!("Invalid status filter '{}'", self.status_filter))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub git: GitConfig,
    pub log: LogConfig,
    pub diff: DiffConfig,
    pub watch: WatchConfig,
}

pub fn get_config_path() -> Option<PathBuf> {
    home::home_dir().map(|mut path| {
        path.push(".config");
        path.push("revlens");
        path.push("config.toml");
        path
    })
}

impl Config {
    /// Loads the user config, falling back to defaults when it is missing or broken.
    pub fn load() -> Self {
        let Some(path) = get_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {path:?}"))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {path:?}"))?;
        config.diff.status_filter()?;
        Ok(config)
    }
}
