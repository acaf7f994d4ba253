use std::path::Path;
use std::time::Duration;

use repodiff_events::DEFAULT_IGNORE_FILE;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Tuning knobs for the diff cache.
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides:
///
/// ```toml
/// debounce_ms = 500
/// ignore_file_name = ".hgignore"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Delay between the first change of a burst and the recompute it
    /// triggers, in milliseconds.
    pub debounce_ms: u64,
    /// File name whose change invalidates ignore rules.
    pub ignore_file_name: String,
    /// Delay before a new entry's first full recompute, in milliseconds.
    pub initial_full_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            ignore_file_name: DEFAULT_IGNORE_FILE.to_string(),
            initial_full_delay_ms: 0,
        }
    }
}

impl CacheConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn initial_full_delay(&self) -> Duration {
        Duration::from_millis(self.initial_full_delay_ms)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn from_toml_str(s: &str) -> CacheResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read a TOML config file.
    pub fn load(path: &Path) -> CacheResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CacheError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
