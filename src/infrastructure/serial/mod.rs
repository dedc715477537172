// Serial module - Serial device adapter
pub mod link;

pub use link::{SerialLink, SerialPortLink};
