//! Application configuration.
//!
//! Values come from an optional YAML file, then the `TABLE_BUILDER_DATA_DIR`
//! environment variable, then command-line flags, later sources winning.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{retry::RetryPolicy, table::ViewMode, yaml};

pub const DATA_DIR_ENV: &str = "TABLE_BUILDER_DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = ".table-builder";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub retry: RetrySettings,
    pub default_view: ViewMode,
    pub seed_sample_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            retry: RetrySettings::default(),
            default_view: ViewMode::Grid,
            seed_sample_data: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Reads `path` when given, otherwise starts from defaults, then applies
    /// the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => yaml::load::<AppConfig>(path)
                .with_context(|| format!("Loading configuration from {path:?}"))?,
            None => AppConfig::default(),
        };
        let config = config.with_env(|key| std::env::var(key).ok());
        config.validate()?;
        debug!("Effective configuration: {config:?}");
        Ok(config)
    }

    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.data_dir.as_os_str().is_empty(),
            "data_dir must not be empty"
        );
        ensure!(
            self.retry.initial_delay_ms <= self.retry.max_delay_ms,
            "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
            self.retry.initial_delay_ms,
            self.retry.max_delay_ms
        );
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .max_retries(self.retry.max_retries)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "retry:\n  max_retries: 7\ndefault_view: card\n").unwrap();
        let config: AppConfig = yaml::load(&path).unwrap();
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.default_view, ViewMode::Card);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "data_dri: /tmp\n").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn flag_beats_env_beats_file() {
        let from_env = AppConfig::default().with_env(|key| {
            (key == DATA_DIR_ENV).then(|| "/env/dir".to_string())
        });
        assert_eq!(from_env.data_dir, PathBuf::from("/env/dir"));
        let from_flag = from_env.with_data_dir(Some(PathBuf::from("/flag/dir")));
        assert_eq!(from_flag.data_dir, PathBuf::from("/flag/dir"));
    }

    #[test]
    fn retry_settings_map_to_policy() {
        let policy = AppConfig::default().retry_policy();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn inverted_delays_fail_validation() {
        let mut config = AppConfig::default();
        config.retry.initial_delay_ms = 5000;
        assert!(config.validate().is_err());
    }
}
