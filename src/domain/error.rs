use thiserror::Error;

/// TtyBridge unified error type
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Session error: {message}")]
    Session { message: String },
}

pub type BridgeResult<T> = Result<T, BridgeError>;
