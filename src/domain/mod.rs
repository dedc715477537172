// Domain module - Configuration and error types
pub mod config;
pub mod error;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
