use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::error::{BridgeError, BridgeResult};

/// TtyBridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// TCP listener settings
    #[serde(default)]
    pub listen: ListenConfig,
    /// Serial device settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Relay behaviour settings
    #[serde(default)]
    pub relay: RelayConfig,
}

/// TCP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

/// Serial device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path
    #[serde(default = "default_serial_port")]
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Stop bits
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Parity
    #[serde(default)]
    pub parity: ParityConfig,
    /// Flow control
    #[serde(default)]
    pub flow_control: FlowControlConfig,
}

/// Relay behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Per-direction buffer capacity in bytes
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Serial polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Treat transport errors as fatal to the whole server
    #[serde(default)]
    pub strict_errors: bool,
}

/// Parity configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    None,
    Odd,
    Even,
}

/// Flow control configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    None,
    Hardware,
    Software,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_backlog() -> u32 {
    1
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_buffer_capacity() -> usize {
    128
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl BridgeConfig {
    /// Validate settings that would make the relay inoperable
    pub fn validate(&self) -> BridgeResult<()> {
        if self.relay.buffer_capacity < 4 {
            return Err(BridgeError::Config {
                message: format!(
                    "buffer capacity {} is too small (minimum 4)",
                    self.relay.buffer_capacity
                ),
            });
        }
        if self.relay.poll_interval_ms == 0 {
            return Err(BridgeError::Config {
                message: "poll interval must be at least 1 ms".to_string(),
            });
        }
        if !matches!(self.serial.data_bits, 5..=8) {
            return Err(BridgeError::Config {
                message: format!("invalid data bits: {}", self.serial.data_bits),
            });
        }
        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(BridgeError::Config {
                message: format!("invalid stop bits: {}", self.serial.stop_bits),
            });
        }
        Ok(())
    }
}

impl ListenConfig {
    /// Bind address as a `host:port` string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl RelayConfig {
    /// Polling interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: ParityConfig::default(),
            flow_control: FlowControlConfig::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            strict_errors: false,
        }
    }
}

impl Default for ParityConfig {
    fn default() -> Self {
        ParityConfig::None
    }
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        FlowControlConfig::None
    }
}
