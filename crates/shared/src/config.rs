//! Engine configuration management.

use serde::Deserialize;

/// Ledger engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Hold configuration.
    #[serde(default)]
    pub holds: HoldConfig,
    /// Posting configuration.
    #[serde(default)]
    pub posting: PostingConfig,
    /// Reversal configuration.
    #[serde(default)]
    pub reversal: ReversalConfig,
}

/// Hold configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HoldConfig {
    /// Lifetime of an authorization hold in seconds.
    #[serde(default = "default_hold_ttl")]
    pub ttl_secs: i64,
}

fn default_hold_ttl() -> i64 {
    259_200 // 3 days
}

/// Posting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PostingConfig {
    /// Maximum number of lines accepted in a single posting.
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

fn default_max_lines() -> usize {
    100
}

/// Reversal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReversalConfig {
    /// Window after a capture during which a reversal is accepted, in hours.
    #[serde(default = "default_reversal_window")]
    pub window_hours: i64,
}

fn default_reversal_window() -> i64 {
    720 // 30 days
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_hold_ttl(),
        }
    }
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
        }
    }
}

impl Default for ReversalConfig {
    fn default() -> Self {
        Self {
            window_hours: default_reversal_window(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            holds: HoldConfig::default(),
            posting: PostingConfig::default(),
            reversal: ReversalConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("MERIDIAN").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
