//! TtyBridge Library
//!
//! Bridges a single TCP client to a serial-attached device, relaying bytes
//! in both directions with sequential session handling and coordinated
//! shutdown.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::relay::{DuplexRelay, RelaySettings};
pub use crate::core::server::BridgeServer;
pub use crate::core::session::{ClientSession, SessionOutcome, SessionState};
pub use crate::core::shutdown::{ShutdownCoordinator, ShutdownToken};
pub use crate::domain::config::BridgeConfig;
pub use crate::domain::error::{BridgeError, BridgeResult};
pub use crate::infrastructure::serial::{SerialLink, SerialPortLink};
