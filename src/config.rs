//! Ambient configuration schema and loader.
//!
//! This defines the shape of `.roux/config.toml` (§6.1) and a loader from a
//! TOML string/file. Discovering *which* file to load and merging it with
//! CLI flags or environment variables is left to an external caller (§1).

use std::{
    fs::{read_to_string, write},
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::RouxError;

fn default_debounce_ms() -> u64 {
    1000
}

fn default_grace_secs() -> u64 {
    5
}

fn default_excludes() -> Vec<String> {
    vec![
        ".roux".to_string(),
        "node_modules".to_string(),
        ".git".to_string(),
        ".obsidian".to_string(),
    ]
}

fn default_fuzzy_threshold() -> f32 {
    0.7
}

fn default_semantic_threshold() -> f32 {
    0.7
}

/// Runtime configuration for a single vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Debounce window for the file watcher, in milliseconds.
    pub debounce_ms: u64,
    /// How long an unlinked id is retained as a pending-unlink before its
    /// vector record is dropped, in seconds (§5).
    pub grace_period_secs: u64,
    /// Directory names excluded from the scanner, on top of the fixed
    /// `{.roux, node_modules, .git, .obsidian}` set (§4.6).
    pub extra_excludes: Vec<String>,
    /// Default similarity threshold used by `resolve_nodes` fuzzy matching.
    pub fuzzy_threshold: f32,
    /// Default similarity threshold used by `resolve_nodes` semantic matching.
    pub semantic_threshold: f32,
    /// Expected embedding dimension, validated against the configured
    /// embedder at startup.
    pub embedding_dimensions: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debounce_ms: default_debounce_ms(),
            grace_period_secs: default_grace_secs(),
            extra_excludes: default_excludes(),
            fuzzy_threshold: default_fuzzy_threshold(),
            semantic_threshold: default_semantic_threshold(),
            embedding_dimensions: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(src: &str) -> Result<Self, RouxError> {
        Ok(toml::from_str(src)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RouxError> {
        tracing::debug!("loading config from {:?}", path.as_ref());
        if !path.as_ref().exists() {
            tracing::debug!("no config file present, using defaults");
            return Ok(Config::default());
        }
        let content = read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, RouxError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RouxError> {
        Ok(write(path, self.to_toml_string()?)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Directory names excluded from the scanner: the fixed set plus any
    /// user-configured extras, de-duplicated.
    pub fn excluded_dirs(&self) -> Vec<String> {
        let mut excludes = default_excludes();
        for extra in &self.extra_excludes {
            if !excludes.iter().any(|e| e == extra) {
                excludes.push(extra.clone());
            }
        }
        excludes
    }
}
