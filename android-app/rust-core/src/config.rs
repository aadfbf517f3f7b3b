//! Bridge configuration passed from Kotlin as JSON.
//!
//! ```json
//! { "log_tag": "AdkManager", "log_level": "debug", "flush_on_close": true }
//! ```
//!
//! Every field is optional; a blank string selects all defaults.

use std::str::FromStr;

use adktoolkit::ManagerConfig;
use log::LevelFilter;
use serde::Deserialize;

use crate::BridgeError;

/// Configuration for the JNI bridge
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Logcat tag
    #[serde(default = "default_log_tag")]
    pub log_tag: String,

    /// `off`, `error`, `warn`, `info`, `debug` or `trace`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_flush_on_close")]
    pub flush_on_close: bool,
}

fn default_log_tag() -> String {
    "AdkManager".to_string()
}

fn default_log_level() -> String {
    "debug".to_string()
}

const fn default_flush_on_close() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_tag: default_log_tag(),
            log_level: default_log_level(),
            flush_on_close: default_flush_on_close(),
        }
    }
}

impl BridgeConfig {
    /// Parse the JSON handed to `AdkBridge.init`
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }

    /// Log level filter, falling back to `Debug` for unknown names
    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Debug)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            flush_on_close: self.flush_on_close,
            ..ManagerConfig::default()
        }
    }
}
