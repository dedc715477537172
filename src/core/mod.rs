// Core module - Relay, acceptor and shutdown coordination
pub mod relay;
pub mod server;
pub mod session;
pub mod shutdown;

pub use relay::{DuplexRelay, RelaySettings};
pub use server::BridgeServer;
pub use session::{ClientSession, SessionOutcome, SessionState};
pub use shutdown::{ShutdownCoordinator, ShutdownToken};
