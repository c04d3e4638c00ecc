//! Serial link configuration

use crate::error::LinkError;
use config::{Config, Environment, File};
use ring_buffer::BufferConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable prefix, e.g. `FRAMELINK__BAUD_RATE=9600`
pub const ENV_PREFIX: &str = "FRAMELINK";

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    /// Baud rate for serial communication
    pub baud_rate: u32,
    /// Framed ring buffer settings
    pub buffer: BufferConfig,
    /// Frames held between the consumer thread and the application
    pub channel_capacity: usize,
    /// Extend retries before a chunk is dropped
    pub max_retries: u8,
    /// Delay between extend retries in milliseconds
    pub retry_backoff_ms: u64,
    /// Frames are COBS-encoded on the wire
    pub cobs: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            buffer: BufferConfig::default(),
            channel_capacity: 64,
            max_retries: 3,
            retry_backoff_ms: 10,
            cobs: false,
        }
    }
}

impl LinkConfig {
    /// Load configuration from an optional file, overridden by `FRAMELINK__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, LinkError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading link configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        }

        let config: LinkConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the link cannot run with
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.baud_rate == 0 {
            return Err(LinkError::Config("baud_rate must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(LinkError::Config("channel_capacity must be positive".into()));
        }
        if self.buffer.capacity < 2 {
            return Err(LinkError::Config(format!(
                "buffer.capacity {} is below the 2-byte minimum",
                self.buffer.capacity
            )));
        }
        Ok(())
    }

    /// Delay between extend retries
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_is_valid() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_backoff(), Duration::from_millis(10));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_baud = LinkConfig {
            baud_rate: 0,
            ..Default::default()
        };
        assert!(matches!(zero_baud.validate(), Err(LinkError::Config(_))));

        let tiny_buffer = LinkConfig {
            buffer: BufferConfig {
                capacity: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(tiny_buffer.validate(), Err(LinkError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = write_temp(
            "link.toml",
            r#"
device = "/dev/ttyACM1"
baud_rate = 9600
cobs = true

[buffer]
capacity = 512
"#,
        );

        let config = LinkConfig::load(Some(&path)).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.device, "/dev/ttyACM1");
        assert_eq!(config.baud_rate, 9600);
        assert!(config.cobs);
        assert_eq!(config.buffer.capacity, 512);
        assert_eq!(config.buffer.read_timeout_ms, 100);
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = write_temp("env-link.toml", "retry_backoff_ms = 20\n");
        // Only fields no other test loads, since the process environment is shared
        std::env::set_var("FRAMELINK__RETRY_BACKOFF_MS", "50");
        std::env::set_var("FRAMELINK__BUFFER__DELIMITER", "10");

        let result = LinkConfig::load(Some(&path));
        std::env::remove_var("FRAMELINK__RETRY_BACKOFF_MS");
        std::env::remove_var("FRAMELINK__BUFFER__DELIMITER");
        fs::remove_file(&path).ok();

        let config = result.unwrap();
        assert_eq!(config.retry_backoff(), Duration::from_millis(50));
        assert_eq!(config.buffer.delimiter, b'\n');
        assert_eq!(config.buffer.capacity, 4096);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = write_temp("bad-link.toml", "channel_capacity = 0\n");
        let result = LinkConfig::load(Some(&path));
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(LinkError::Config(_))));
    }
}
