use crate::domain::config::{BridgeConfig, FlowControlConfig, ParityConfig};
use clap::{Parser, ValueEnum};

/// Command line arguments for TtyBridge
#[derive(Parser, Debug)]
#[command(
    name = "ttybridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "TCP to serial bridge for remote access to serial-attached devices",
    long_about = "Bridges a single TCP client to a serial device, relaying bytes in both directions so a remote peer can talk to the device as if connected directly."
)]
pub struct Args {
    /// Listen address
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Serial port path (e.g. /dev/ttyUSB0)
    #[arg(short, long)]
    pub serial: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Data bits
    #[arg(long)]
    pub data_bits: Option<u8>,

    /// Stop bits
    #[arg(long)]
    pub stop_bits: Option<u8>,

    /// Parity (none, even, odd)
    #[arg(long, value_enum)]
    pub parity: Option<ParityArg>,

    /// Flow control (none, software, hardware)
    #[arg(long, value_enum)]
    pub flow_control: Option<FlowControlArg>,

    /// Per-direction relay buffer capacity in bytes
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Serial polling interval in milliseconds
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Treat a transport error as fatal instead of waiting for the next client
    #[arg(long)]
    pub strict: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parity configuration argument
#[derive(ValueEnum, Debug, Clone)]
pub enum ParityArg {
    None,
    Even,
    Odd,
}

/// Flow control configuration argument
#[derive(ValueEnum, Debug, Clone)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

impl Args {
    /// Overlay CLI flags onto the loaded configuration; flags win
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.host {
            config.listen.host = host.clone();
        }
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(serial) = &self.serial {
            config.serial.port = serial.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(data_bits) = self.data_bits {
            config.serial.data_bits = data_bits;
        }
        if let Some(stop_bits) = self.stop_bits {
            config.serial.stop_bits = stop_bits;
        }
        if let Some(parity) = &self.parity {
            config.serial.parity = parity.clone().into();
        }
        if let Some(flow_control) = &self.flow_control {
            config.serial.flow_control = flow_control.clone().into();
        }
        if let Some(capacity) = self.capacity {
            config.relay.buffer_capacity = capacity;
        }
        if let Some(poll_ms) = self.poll_ms {
            config.relay.poll_interval_ms = poll_ms;
        }
        if self.strict {
            config.relay.strict_errors = true;
        }
    }
}

impl From<ParityArg> for ParityConfig {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Self::None,
            ParityArg::Even => Self::Even,
            ParityArg::Odd => Self::Odd,
        }
    }
}

impl From<FlowControlArg> for FlowControlConfig {
    fn from(flow_control: FlowControlArg) -> Self {
        match flow_control {
            FlowControlArg::None => Self::None,
            FlowControlArg::Software => Self::Software,
            FlowControlArg::Hardware => Self::Hardware,
        }
    }
}
