//! Configuration loading using Figment.
//!
//! Configuration is layered, later layers winning:
//! 1. compiled defaults (the constants the device firmware shipped with)
//! 2. `config/rollcall.toml`
//! 3. environment variables prefixed with `ROLLCALL_`, nested keys separated
//!    by `__`
//!
//! # Example
//! ```no_run
//! use rollcall::config::RollcallConfig;
//!
//! // ROLLCALL_FLUSH__SEND_TIMEOUT_SECS=30 overrides flush.send_timeout_secs
//! let config = RollcallConfig::load()?;
//! config.validate()?;
//! println!("Sheet: {}", config.endpoint.sheet_name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rollcall_core::capabilities::SectorKey;
use rollcall_core::FIELD_COUNT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::dispatch::RetryPolicy;

/// Default location of the configuration file, relative to the working
/// directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/rollcall.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "ROLLCALL_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RollcallConfig {
    pub application: ApplicationConfig,
    pub endpoint: EndpointConfig,
    pub buffer: BufferConfig,
    pub flush: FlushConfig,
    pub reader: ReaderConfig,
    pub coordinator: CoordinatorConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Device name shown in logs
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rollcall".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Spreadsheet web app endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Deployment exec URL, `https://script.google.com/macros/s/<id>/exec`
    pub url: String,
    /// Sheet receiving attendance rows
    pub sheet_name: String,
    /// Hard timeout of one HTTP request
    pub timeout_secs: u64,
    /// Attempts of the whole POST/GET exchange
    pub max_attempts: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
    /// Skip TLS certificate verification
    pub insecure_tls: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            sheet_name: "LOG_Attendance".to_string(),
            timeout_secs: 10,
            max_attempts: 3,
            retry_delay_ms: 1000,
            insecure_tls: false,
        }
    }
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Records held between flushes
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: rollcall_core::DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Occupancy that triggers a flush and pauses capture
    pub min_batch_size: usize,
    /// Age of the last capture after which a partial batch is sent
    pub send_timeout_secs: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 10,
            send_timeout_secs: 60,
        }
    }
}

impl FlushConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Card reader session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Data blocks holding student id, staff id and name, in that order
    pub blocks: Vec<u8>,
    /// Key A for every data block
    pub key: [u8; 6],
    pub presence_timeout_ms: u64,
    pub serial_timeout_ms: u64,
    /// Interval between polls inside the presence and serial windows
    pub poll_interval_ms: u64,
    /// Quiet period after a successful read
    pub cooldown_ms: u64,
    /// Consecutive failed reads that trigger the emergency flush and restart
    pub failure_ceiling: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            blocks: vec![4, 5, 6],
            key: SectorKey::default().0,
            presence_timeout_ms: 25,
            serial_timeout_ms: 25,
            poll_interval_ms: 5,
            cooldown_ms: 500,
            failure_ceiling: 3,
        }
    }
}

impl ReaderConfig {
    pub fn sector_key(&self) -> SectorKey {
        SectorKey(self.key)
    }

    pub fn presence_timeout(&self) -> Duration {
        Duration::from_millis(self.presence_timeout_ms)
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Control loop timing and escalation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub tick_interval_ms: u64,
    pub probe_interval_secs: u64,
    /// Consecutive failed periodic probes that latch the reader off
    pub probe_failure_ceiling: u32,
    pub wifi_check_interval_secs: u64,
    /// How long one reconnect attempt may take
    pub wifi_connect_timeout_secs: u64,
    pub wifi_poll_interval_ms: u64,
    pub wifi_max_attempts: u32,
    pub wifi_retry_delay_ms: u64,
    /// Pause between a fatal outcome and the restart
    pub restart_delay_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            probe_interval_secs: 300,
            probe_failure_ceiling: 5,
            wifi_check_interval_secs: 30,
            wifi_connect_timeout_secs: 20,
            wifi_poll_interval_ms: 500,
            wifi_max_attempts: 3,
            wifi_retry_delay_ms: 1000,
            restart_delay_ms: 2000,
        }
    }
}

impl CoordinatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn wifi_check_interval(&self) -> Duration {
        Duration::from_secs(self.wifi_check_interval_secs)
    }

    pub fn wifi_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.wifi_connect_timeout_secs)
    }

    pub fn wifi_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wifi_poll_interval_ms)
    }

    pub fn wifi_retry_delay(&self) -> Duration {
        Duration::from_millis(self.wifi_retry_delay_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl RollcallConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment. A missing file
    /// leaves the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The provider stack, exposed so callers can merge extra layers.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(RollcallConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if self.endpoint.url.trim().is_empty() {
            return Err("endpoint.url must be set".to_string());
        }
        if self.endpoint.sheet_name.trim().is_empty() {
            return Err("endpoint.sheet_name must not be empty".to_string());
        }
        if self.endpoint.max_attempts == 0 {
            return Err("endpoint.max_attempts must be at least 1".to_string());
        }

        if self.buffer.capacity == 0 {
            return Err("buffer.capacity must be at least 1".to_string());
        }
        if self.flush.min_batch_size == 0 || self.flush.min_batch_size > self.buffer.capacity {
            return Err(format!(
                "flush.min_batch_size {} must be between 1 and buffer.capacity ({})",
                self.flush.min_batch_size, self.buffer.capacity
            ));
        }

        if self.reader.blocks.len() != FIELD_COUNT {
            return Err(format!(
                "reader.blocks must list exactly {} blocks, got {}",
                FIELD_COUNT,
                self.reader.blocks.len()
            ));
        }
        if self.reader.failure_ceiling == 0 {
            return Err("reader.failure_ceiling must be at least 1".to_string());
        }

        if self.coordinator.probe_failure_ceiling == 0 {
            return Err("coordinator.probe_failure_ceiling must be at least 1".to_string());
        }
        if self.coordinator.wifi_max_attempts == 0 {
            return Err("coordinator.wifi_max_attempts must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn valid_config() -> RollcallConfig {
        let mut config = RollcallConfig::default();
        config.endpoint.url = "https://script.google.com/macros/s/TEST/exec".to_string();
        config
    }

    #[test]
    fn test_defaults_match_device_constants() {
        let config = RollcallConfig::default();
        assert_eq!(config.buffer.capacity, 10);
        assert_eq!(config.flush.min_batch_size, 10);
        assert_eq!(config.flush.send_timeout(), Duration::from_secs(60));
        assert_eq!(config.endpoint.timeout(), Duration::from_secs(10));
        assert_eq!(config.endpoint.retry_policy().max_attempts, 3);
        assert_eq!(config.coordinator.probe_interval(), Duration::from_secs(300));
        assert_eq!(config.coordinator.probe_failure_ceiling, 5);
        assert_eq!(config.reader.failure_ceiling, 3);
        assert_eq!(config.reader.blocks, vec![4, 5, 6]);
        assert_eq!(config.reader.sector_key(), SectorKey([0xFF; 6]));
    }

    #[test]
    fn test_config_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_url_rejected() {
        assert!(RollcallConfig::default().validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = valid_config();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_batch_larger_than_capacity() {
        let mut config = valid_config();
        config.flush.min_batch_size = 11;
        let err = config.validate().unwrap_err();
        assert!(err.contains("min_batch_size"));
    }

    #[test]
    fn test_block_count_enforced() {
        let mut config = valid_config();
        config.reader.blocks = vec![4, 5];
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[endpoint]
url = "https://script.google.com/macros/s/FILE/exec"
sheet_name = "Rekap"

[flush]
min_batch_size = 5
"#
        )
        .unwrap();

        let config = RollcallConfig::load_from(file.path()).unwrap();
        assert_eq!(config.endpoint.sheet_name, "Rekap");
        assert_eq!(config.flush.min_batch_size, 5);
        // untouched sections keep their defaults
        assert_eq!(config.buffer.capacity, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[flush]\nsend_timeout_secs = 90").unwrap();

        std::env::set_var("ROLLCALL_FLUSH__SEND_TIMEOUT_SECS", "30");
        let config = RollcallConfig::load_from(file.path());
        std::env::remove_var("ROLLCALL_FLUSH__SEND_TIMEOUT_SECS");

        assert_eq!(config.unwrap().flush.send_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let config = RollcallConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.endpoint.sheet_name, "LOG_Attendance");
    }
}
