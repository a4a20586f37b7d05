//! Session configuration
//!
//! Link parameters, protocol timing and the firmware command vocabulary.
//! Everything here can be loaded from a JSON file; missing fields fall back
//! to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::acquisition::Endianness;
use crate::protocol::{CommandSet, ProtocolError, BATCH_FRAME_LEN};

/// Baud rates the board firmware can be built for
pub const SUPPORTED_BAUD_RATES: [u32; 8] =
    [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// Default baud rate of the test board
pub const DEFAULT_BAUD_RATE: u32 = 230400;

/// Default port name
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM8";
/// Default port name
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Physical link parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate, one of [`SUPPORTED_BAUD_RATES`]
    pub baud_rate: u32,
    /// Driver read timeout in milliseconds; 0 returns immediately with
    /// whatever is buffered
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 0,
        }
    }
}

impl LinkConfig {
    /// Link settings for a port at the default baud rate
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Driver read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Check the baud rate against the supported set
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            return Err(ProtocolError::UnsupportedBaudRate(self.baud_rate));
        }
        Ok(())
    }
}

/// Protocol timing: settle delays, retry budgets and bulk polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after a command before its reply is read
    pub command_settle_ms: u64,
    /// Pause after the init command; the board reprograms the sensor
    pub init_settle_ms: u64,
    /// Receive attempts before a command is considered unanswered
    pub retry_attempts: u32,
    /// Delay between empty receive attempts
    pub retry_delay_ms: u64,
    /// Longest an acquisition run may take before its ack is given up on
    pub acquisition_timeout_ms: u64,
    /// Bytes that must be buffered before a batch is read out
    pub bulk_min_bytes: usize,
    /// Delay between buffered-byte checks, in microseconds
    pub bulk_poll_interval_us: u64,
    /// Buffered-byte checks before reading out whatever arrived
    pub bulk_max_polls: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            command_settle_ms: 300,
            init_settle_ms: 1000,
            retry_attempts: 40,
            retry_delay_ms: 250,
            acquisition_timeout_ms: 10 * 60 * 1000,
            bulk_min_bytes: BATCH_FRAME_LEN,
            bulk_poll_interval_us: 100,
            bulk_max_polls: 500,
        }
    }
}

impl TimingConfig {
    /// Settle delay for ordinary commands
    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }

    /// Settle delay for the init command
    pub fn init_settle(&self) -> Duration {
        Duration::from_millis(self.init_settle_ms)
    }

    /// Delay between empty receive attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Receive attempts allowed for the acquisition run reply
    pub fn acquisition_attempts(&self) -> u32 {
        if self.retry_delay_ms == 0 {
            return self.retry_attempts;
        }
        let attempts = self.acquisition_timeout_ms.div_ceil(self.retry_delay_ms);
        u32::try_from(attempts)
            .unwrap_or(u32::MAX)
            .max(self.retry_attempts)
    }

    /// Delay between bulk buffered-byte checks
    pub fn bulk_poll_interval(&self) -> Duration {
        Duration::from_micros(self.bulk_poll_interval_us)
    }
}

/// Everything needed to open and drive a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Physical link
    pub link: LinkConfig,
    /// Timing policy
    pub timing: TimingConfig,
    /// Firmware command vocabulary
    pub commands: CommandSet,
    /// Byte order of sample fields in batch frames
    pub endianness: Endianness,
}

impl SessionConfig {
    /// Defaults for a given port
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            link: LinkConfig::new(port_name),
            ..Self::default()
        }
    }

    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse from a JSON string
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ProtocolError::Config(e.to_string()))?;
        config.link.validate()?;
        Ok(config)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string_pretty(self).map_err(|e| ProtocolError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.link.baud_rate, 230400);
        assert_eq!(config.link.read_timeout(), Duration::ZERO);
        assert_eq!(config.timing.retry_attempts, 40);
        assert_eq!(config.timing.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.timing.bulk_min_bytes, 196);
        assert_eq!(config.endianness, Endianness::Little);
    }

    #[test]
    fn test_acquisition_attempts_cover_ceiling() {
        let timing = TimingConfig::default();
        // 600 s / 250 ms
        assert_eq!(timing.acquisition_attempts(), 2400);

        let timing = TimingConfig {
            acquisition_timeout_ms: 1000,
            ..TimingConfig::default()
        };
        // never below the ordinary budget
        assert_eq!(timing.acquisition_attempts(), 40);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json(
            r#"{ "link": { "port_name": "COM3" }, "timing": { "retry_attempts": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.link.port_name, "COM3");
        assert_eq!(config.link.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.timing.retry_attempts, 5);
        assert_eq!(config.timing.retry_delay_ms, 250);
        assert_eq!(config.commands, CommandSet::default());
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = SessionConfig::for_port("/dev/ttyUSB1");
        config.endianness = Endianness::Big;
        let text = config.to_json().unwrap();
        assert_eq!(SessionConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn test_unsupported_baud_rejected() {
        let err = SessionConfig::from_json(r#"{ "link": { "baud_rate": 12345 } }"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedBaudRate(12345)));
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = SessionConfig::from_file("/nonexistent/accprobe.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/accprobe.json"));
    }
}
