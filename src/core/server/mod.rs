// Server module - Connection acceptor
use crate::core::relay::{DuplexRelay, RelaySettings};
use crate::core::session::{ClientSession, SessionOutcome};
use crate::core::shutdown::ShutdownToken;
use crate::domain::config::ListenConfig;
use crate::domain::error::{BridgeError, BridgeResult};
use crate::infrastructure::serial::SerialLink;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info, warn};

/// Sequential single-session bridge server.
///
/// Accepts one client at a time; the next `accept` is not issued until the
/// previous session's relay has joined both of its tasks. The listener and
/// the serial link are owned here and released together when the server is
/// dropped on the teardown path.
pub struct BridgeServer {
    listener: TcpListener,
    relay: DuplexRelay,
    strict_errors: bool,
}

impl BridgeServer {
    /// Bind the listening socket with the configured backlog
    pub async fn bind(config: &ListenConfig) -> BridgeResult<TcpListener> {
        let addr: SocketAddr = config.addr().parse().map_err(|e| BridgeError::Config {
            message: format!("invalid listen address {}: {}", config.addr(), e),
        })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.backlog)?;

        info!("listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    pub fn new(listener: TcpListener, serial: Arc<dyn SerialLink>, settings: RelaySettings) -> Self {
        Self {
            listener,
            strict_errors: settings.strict_errors,
            relay: DuplexRelay::new(serial, settings),
        }
    }

    pub fn local_addr(&self) -> BridgeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop.
    ///
    /// Returns `Ok(())` on requested shutdown. An `accept` failure is fatal
    /// and propagates so the caller releases the listener and serial handle;
    /// under the strict policy a transport error inside a session is fatal
    /// too.
    pub async fn run(&self, shutdown: ShutdownToken) -> BridgeResult<()> {
        loop {
            info!("waiting for client connection");

            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("acceptor stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted.map_err(|e| {
                    error!("accept failed: {}", e);
                    e
                })?,
            };

            info!("client connected from {}", peer);
            let session = ClientSession::new(stream, peer);
            let outcome = self.relay.run(session, shutdown.clone()).await;

            match outcome {
                SessionOutcome::ClientDisconnected => {
                    info!("session with {} closed", peer);
                }
                SessionOutcome::TransportError => {
                    if self.strict_errors {
                        return Err(BridgeError::Session {
                            message: format!("transport error in session with {}", peer),
                        });
                    }
                    warn!("session with {} ended after transport error", peer);
                }
                SessionOutcome::ShutdownRequested => {
                    info!("acceptor stopping");
                    return Ok(());
                }
            }
        }
    }
}
