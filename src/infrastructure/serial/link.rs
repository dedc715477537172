use crate::domain::{
    config::{FlowControlConfig, ParityConfig, SerialConfig},
    error::{BridgeError, BridgeResult},
};
use async_trait::async_trait;
use serialport::SerialPort;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Serial device contract used by the relay.
///
/// `recv` returns an empty buffer when the device produced nothing within the
/// adapter's read timeout; callers decide how long to wait before retrying.
#[async_trait]
pub trait SerialLink: Send + Sync {
    /// Forward bytes to the device, returning the number written
    async fn send(&self, data: &[u8]) -> BridgeResult<usize>;

    /// Read up to `max_len` bytes from the device
    async fn recv(&self, max_len: usize) -> BridgeResult<Vec<u8>>;
}

/// `serialport`-backed adapter.
///
/// Opened once at startup and held for the life of the process; the device is
/// released when the link is dropped during shutdown. Reads use a short
/// timeout so a silent device maps to an empty result instead of parking the
/// caller indefinitely.
pub struct SerialPortLink {
    port: Arc<Mutex<Box<dyn SerialPort + Send>>>,
    name: String,
}

impl SerialPortLink {
    /// Open and configure the serial device
    pub fn open(config: &SerialConfig, read_timeout: Duration) -> BridgeResult<Self> {
        let mut builder = serialport::new(&config.port, config.baud_rate);

        builder = builder.data_bits(match config.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            _ => {
                return Err(BridgeError::Config {
                    message: format!("Invalid data bits: {}", config.data_bits),
                })
            }
        });

        builder = builder.stop_bits(match config.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            _ => {
                return Err(BridgeError::Config {
                    message: format!("Invalid stop bits: {}", config.stop_bits),
                })
            }
        });

        builder = builder.parity(match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        });

        builder = builder.flow_control(match config.flow_control {
            FlowControlConfig::None => serialport::FlowControl::None,
            FlowControlConfig::Software => serialport::FlowControl::Software,
            FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
        });

        builder = builder.timeout(read_timeout);

        let port = builder.open()?;

        info!(
            "serial port {} opened at {} baud",
            config.port, config.baud_rate
        );

        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            name: config.port.clone(),
        })
    }

    /// Device path this link was opened with
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl SerialLink for SerialPortLink {
    async fn send(&self, data: &[u8]) -> BridgeResult<usize> {
        let mut port = self.port.lock().await;
        port.write_all(data)?;
        debug!("sent {} bytes over serial", data.len());
        Ok(data.len())
    }

    async fn recv(&self, max_len: usize) -> BridgeResult<Vec<u8>> {
        let mut buffer = vec![0u8; max_len];
        let mut port = self.port.lock().await;
        match port.read(&mut buffer) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => {
                buffer.truncate(n);
                debug!("received {} bytes over serial", n);
                Ok(buffer)
            }
            // Timeout means the device had nothing this interval
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
