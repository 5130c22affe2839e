//! Configuration management for the ingestion service
//!
//! Loads configuration from config.toml at startup.
//! Flush cadence, batch cap, sink and load settings are all tunable here.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{Symbol, SymbolError};

/// Service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Flush cadence and batch sizing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Persistence backend
    #[serde(default)]
    pub sink: SinkConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Synthetic producers
    #[serde(default)]
    pub load: LoadConfig,
}

/// Flush cycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Delay between flush cycles in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Most ticks handed to the sink in one cycle
    #[serde(default = "default_batch_cap")]
    pub batch_cap: usize,
}

/// Which sink to persist into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkBackend {
    Sqlite,
    Memory,
}

/// Persistence settings
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_backend")]
    pub backend: SinkBackend,

    /// SQLite database file (sqlite backend only)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write log files in addition to the console
    #[serde(default = "default_true")]
    pub file_output: bool,
}

/// Load generator settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Concurrent producer tasks
    #[serde(default = "default_producers")]
    pub producers: usize,

    /// How long producers run, in seconds
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Pause between batches of one producer, in milliseconds
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,

    /// Instruments quoted in every batch
    #[serde(default = "default_instruments")]
    pub instruments: Vec<InstrumentConfig>,
}

/// One synthetic instrument: price = base_price + uniform(0, jitter)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub base_price: f64,
    #[serde(default)]
    pub jitter: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            batch_cap: default_batch_cap(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
            file_output: true,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            producers: default_producers(),
            duration_secs: default_duration_secs(),
            pause_ms: default_pause_ms(),
            instruments: default_instruments(),
        }
    }
}

fn default_flush_interval_ms() -> u64 {
    100
}

fn default_batch_cap() -> usize {
    2000
}

fn default_backend() -> SinkBackend {
    SinkBackend::Sqlite
}

fn default_database_path() -> PathBuf {
    PathBuf::from("ticks.db")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_producers() -> usize {
    50
}

fn default_duration_secs() -> u64 {
    30
}

fn default_pause_ms() -> u64 {
    10
}

fn default_instruments() -> Vec<InstrumentConfig> {
    [
        ("AAPL", 150.0, 10.0),
        ("GOOGL", 2800.0, 50.0),
        ("MSFT", 299.0, 5.0),
        ("TSLA", 750.0, 20.0),
    ]
    .into_iter()
    .map(|(symbol, base_price, jitter)| InstrumentConfig {
        symbol: symbol.to_string(),
        base_price,
        jitter,
    })
    .collect()
}

impl PipelineConfig {
    #[inline]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl LoadConfig {
    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    #[inline]
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl InstrumentConfig {
    pub fn symbol(&self) -> Result<Symbol, SymbolError> {
        self.symbol.parse()
    }
}

impl Config {
    /// Load configuration from the file named by `CONFIG_PATH`
    /// (default `config.toml`)
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(config_path)
    }

    /// Load configuration from an explicit path, defaults if it is missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.batch_cap == 0 {
            return Err(ConfigError::Invalid("pipeline.batch_cap must be > 0".into()));
        }
        if self.pipeline.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.flush_interval_ms must be > 0".into(),
            ));
        }
        if self.load.enabled {
            if self.load.producers == 0 {
                return Err(ConfigError::Invalid("load.producers must be > 0".into()));
            }
            if self.load.instruments.is_empty() {
                return Err(ConfigError::Invalid("load.instruments is empty".into()));
            }
            for instrument in &self.load.instruments {
                instrument.symbol().map_err(|e| {
                    ConfigError::Invalid(format!("load instrument {:?}: {}", instrument.symbol, e))
                })?;
            }
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.flush_interval_ms, 100);
        assert_eq!(config.pipeline.batch_cap, 2000);
        assert_eq!(config.pipeline.flush_interval(), Duration::from_millis(100));
        assert_eq!(config.sink.backend, SinkBackend::Sqlite);
        assert_eq!(config.sink.database_path, PathBuf::from("ticks.db"));
        assert_eq!(config.load.producers, 50);
        assert_eq!(config.load.instruments.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [pipeline]
            batch_cap = 500

            [sink]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.batch_cap, 500);
        assert_eq!(config.pipeline.flush_interval_ms, 100);
        assert_eq!(config.sink.backend, SinkBackend::Memory);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_instruments_from_toml() {
        let config = Config::from_toml_str(
            r#"
            [load]
            producers = 2

            [[load.instruments]]
            symbol = "NVDA"
            base_price = 480.0
            "#,
        )
        .unwrap();

        assert_eq!(
            config.load.instruments,
            vec![InstrumentConfig {
                symbol: "NVDA".into(),
                base_price: 480.0,
                jitter: 0.0,
            }]
        );
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml_str("[pipeline\nbatch_cap = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_zero_cap_and_interval() {
        let mut config = Config::default();
        config.pipeline.batch_cap = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.pipeline.flush_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_instrument() {
        let mut config = Config::default();
        config.load.instruments[0].symbol = "TOOLONGSYMBOL".into();
        assert!(config.validate().is_err());

        // Not checked when load is disabled
        config.load.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.pipeline.batch_cap, 2000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nflush_interval_ms = 250\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pipeline.flush_interval(), Duration::from_millis(250));
    }
}
