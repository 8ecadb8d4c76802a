//! Tool configuration: where the model lives, where reference data comes from, and watch
//! settings. Read from a YAML file; relative paths are taken from the config file's directory.

use crate::error::ModelError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment override for the watch debounce delay, in milliseconds.
pub const DEBOUNCE_ENV: &str = "MODELGEN_DEBOUNCE_MS";

const DEFAULT_DEBOUNCE_MS: u64 = 500;

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolConfig {
    /// Directory scanned recursively for `*.model` files.
    pub model_root: PathBuf,
    /// JSON file of reference values attached after resolution.
    #[serde(default)]
    pub reference_data: Option<PathBuf>,
    #[serde(default)]
    pub watch: WatchConfig,
}

impl ToolConfig {
    pub fn new(model_root: impl Into<PathBuf>) -> Self {
        ToolConfig {
            model_root: model_root.into(),
            reference_data: None,
            watch: WatchConfig::default(),
        }
    }

    pub fn with_reference_data(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_data = Some(path.into());
        self
    }

    /// Load from a YAML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ModelError::from_io(path, e))?;
        let mut config: ToolConfig = serde_yaml::from_str(&raw)
            .map_err(|e| ModelError::Config(format!("{}: {}", path.display(), e)))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.model_root = base.join(&config.model_root);
        config.reference_data = config.reference_data.map(|p| base.join(p));
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ModelError> {
        if let Ok(raw) = std::env::var(DEBOUNCE_ENV) {
            self.watch.debounce_ms = raw.parse().map_err(|_| {
                ModelError::Config(format!(
                    "{} must be a number of milliseconds, got '{}'",
                    DEBOUNCE_ENV, raw
                ))
            })?;
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }
}
