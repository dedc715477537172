// Relay module - Duplex data movement between client and serial device
use crate::core::session::{ClientSession, SessionHandle, SessionOutcome, SessionState};
use crate::core::shutdown::ShutdownToken;
use crate::domain::config::RelayConfig;
use crate::infrastructure::serial::SerialLink;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, error, info, warn};

/// Trailing line terminator length the device appends to every line
const LINE_TERMINATOR_LEN: usize = 2;

/// Relay behaviour knobs
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Per-direction buffer capacity in bytes
    pub buffer_capacity: usize,
    /// How long the downlink sleeps when the device is silent
    pub poll_interval: Duration,
    /// Escalate serial send failures and end the server on transport errors
    pub strict_errors: bool,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            buffer_capacity: config.buffer_capacity,
            poll_interval: config.poll_interval(),
            strict_errors: config.strict_errors,
        }
    }
}

/// Duplex relay for one client session.
///
/// Runs the uplink (client to serial) and downlink (serial to client) as
/// concurrent tasks, each owning its own buffer and stream half. Whichever
/// task detects session end flips the session to `Closing`, which unblocks
/// the other task at its next suspension point; `run` joins both before
/// reporting the combined outcome.
pub struct DuplexRelay {
    serial: Arc<dyn SerialLink>,
    settings: RelaySettings,
}

impl DuplexRelay {
    pub fn new(serial: Arc<dyn SerialLink>, settings: RelaySettings) -> Self {
        Self { serial, settings }
    }

    /// Drive one session to completion
    pub async fn run(&self, session: ClientSession, shutdown: ShutdownToken) -> SessionOutcome {
        let (handle, reader, writer) = session.into_parts();
        info!(session = %handle.id(), peer = %handle.peer(), "relay started");

        let uplink_task = tokio::spawn(uplink(
            reader,
            Arc::clone(&self.serial),
            handle.clone(),
            self.settings,
            shutdown.clone(),
        ));
        let downlink_task = tokio::spawn(downlink(
            writer,
            Arc::clone(&self.serial),
            handle.clone(),
            self.settings,
            shutdown,
        ));

        let (uplink_result, downlink_result) = tokio::join!(uplink_task, downlink_task);
        let uplink_outcome = uplink_result.unwrap_or_else(|e| {
            error!(session = %handle.id(), "uplink task failed: {}", e);
            Some(SessionOutcome::TransportError)
        });
        let downlink_outcome = downlink_result.unwrap_or_else(|e| {
            error!(session = %handle.id(), "downlink task failed: {}", e);
            Some(SessionOutcome::TransportError)
        });

        let outcome = SessionOutcome::combine(uplink_outcome, downlink_outcome);
        handle.mark_closed();
        info!(
            session = %handle.id(),
            peer = %handle.peer(),
            bytes_up = handle.bytes_up(),
            bytes_down = handle.bytes_down(),
            outcome = %outcome,
            "relay finished"
        );
        outcome
    }
}

/// Client-to-serial direction.
///
/// Reads at most capacity-1 bytes per iteration, leaving one spare slot in
/// the buffer.
async fn uplink(
    mut reader: OwnedReadHalf,
    serial: Arc<dyn SerialLink>,
    handle: SessionHandle,
    settings: RelaySettings,
    shutdown: ShutdownToken,
) -> Option<SessionOutcome> {
    let mut buffer = vec![0u8; settings.buffer_capacity];
    let read_limit = settings.buffer_capacity - 1;
    let mut state_rx = handle.watch();

    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => {
                handle.mark_closing();
                return Some(SessionOutcome::ShutdownRequested);
            }
            _ = state_rx.wait_for(|s| *s != SessionState::Active) => return None,
            read = reader.read(&mut buffer[..read_limit]) => read,
        };

        match read {
            Ok(0) => {
                info!(session = %handle.id(), peer = %handle.peer(), "client closed connection");
                handle.mark_closing();
                return Some(SessionOutcome::ClientDisconnected);
            }
            Ok(n) => {
                debug!(
                    session = %handle.id(),
                    bytes = n,
                    payload = %preview(&buffer[..n]),
                    "client -> serial"
                );
                match serial.send(&buffer[..n]).await {
                    Ok(_) => handle.add_bytes_up(n),
                    Err(e) if settings.strict_errors => {
                        warn!(session = %handle.id(), "serial send failed: {}", e);
                        handle.mark_closing();
                        return Some(SessionOutcome::TransportError);
                    }
                    // Best-effort forwarding; the device may recover
                    Err(e) => warn!(session = %handle.id(), "serial send failed: {}", e),
                }
            }
            Err(e) => {
                error!(session = %handle.id(), "client read failed: {}", e);
                handle.mark_closing();
                return Some(SessionOutcome::TransportError);
            }
        }
    }
}

/// Serial-to-client direction.
///
/// Polls the device, pacing retries with the configured interval, and strips
/// the trailing line terminator before forwarding. Frames that strip to
/// nothing produce no client write.
async fn downlink(
    mut writer: OwnedWriteHalf,
    serial: Arc<dyn SerialLink>,
    handle: SessionHandle,
    settings: RelaySettings,
    shutdown: ShutdownToken,
) -> Option<SessionOutcome> {
    let mut state_rx = handle.watch();

    loop {
        let data = tokio::select! {
            _ = shutdown.cancelled() => {
                handle.mark_closing();
                return Some(SessionOutcome::ShutdownRequested);
            }
            _ = state_rx.wait_for(|s| *s != SessionState::Active) => return None,
            received = serial.recv(settings.buffer_capacity) => match received {
                Ok(data) => data,
                Err(e) => {
                    // Transient device trouble reads as silence
                    warn!(session = %handle.id(), "serial read failed: {}", e);
                    Vec::new()
                }
            },
        };

        if data.is_empty() {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    handle.mark_closing();
                    return Some(SessionOutcome::ShutdownRequested);
                }
                _ = state_rx.wait_for(|s| *s != SessionState::Active) => return None,
                _ = tokio::time::sleep(settings.poll_interval) => {}
            }
            continue;
        }

        let payload_len = data.len().saturating_sub(LINE_TERMINATOR_LEN);
        if payload_len == 0 {
            continue;
        }
        let payload = &data[..payload_len];

        debug!(
            session = %handle.id(),
            bytes = payload_len,
            payload = %preview(payload),
            "serial -> client"
        );
        if let Err(e) = writer.write_all(payload).await {
            error!(session = %handle.id(), "client write failed: {}", e);
            handle.mark_closing();
            return Some(SessionOutcome::TransportError);
        }
        handle.add_bytes_down(payload_len);
    }
}

fn preview(data: &[u8]) -> String {
    const PREVIEW_LEN: usize = 16;
    if data.len() <= PREVIEW_LEN {
        hex::encode(data)
    } else {
        format!("{}..", hex::encode(&data[..PREVIEW_LEN]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shutdown::ShutdownCoordinator;
    use crate::domain::error::{BridgeError, BridgeResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    /// In-memory serial device: records everything sent, replays queued frames
    struct MockLink {
        sent: StdMutex<Vec<Vec<u8>>>,
        incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
        recv_calls: AtomicUsize,
        fail_sends: bool,
    }

    impl MockLink {
        fn new(fail_sends: bool) -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let link = Arc::new(Self {
                sent: StdMutex::new(Vec::new()),
                incoming: tokio::sync::Mutex::new(rx),
                recv_calls: AtomicUsize::new(0),
                fail_sends,
            });
            (link, tx)
        }

        fn sent_frames(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SerialLink for MockLink {
        async fn send(&self, data: &[u8]) -> BridgeResult<usize> {
            if self.fail_sends {
                return Err(BridgeError::Session {
                    message: "device write refused".to_string(),
                });
            }
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(data.len())
        }

        async fn recv(&self, _max_len: usize) -> BridgeResult<Vec<u8>> {
            self.recv_calls.fetch_add(1, Ordering::Relaxed);
            let mut incoming = self.incoming.lock().await;
            Ok(incoming.try_recv().unwrap_or_default())
        }
    }

    fn test_settings(strict: bool) -> RelaySettings {
        RelaySettings {
            buffer_capacity: 128,
            poll_interval: Duration::from_millis(50),
            strict_errors: strict,
        }
    }

    async fn tcp_pair() -> (TcpStream, ClientSession) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        (client, ClientSession::new(stream, peer))
    }

    #[tokio::test]
    async fn test_uplink_forwards_client_bytes_verbatim() {
        let (serial, _tx) = MockLink::new(false);
        let relay = DuplexRelay::new(serial.clone(), test_settings(false));
        let coordinator = ShutdownCoordinator::new();

        let (mut client, session) = tcp_pair().await;
        let run = tokio::spawn({
            let token = coordinator.token();
            async move { relay.run(session, token).await }
        });

        client.write_all(b"PING").await.unwrap();
        client.flush().await.unwrap();

        // Wait until the frame reaches the device, then disconnect cleanly
        let mut frames = Vec::new();
        for _ in 0..50 {
            frames = serial.sent_frames();
            if !frames.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(frames, vec![b"PING".to_vec()]);

        drop(client);
        let outcome = timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert_eq!(outcome, SessionOutcome::ClientDisconnected);
        // No duplication after session end
        assert_eq!(serial.sent_frames().len(), 1);
    }

    #[tokio::test]
    async fn test_downlink_strips_line_terminator() {
        let (serial, device_tx) = MockLink::new(false);
        let relay = DuplexRelay::new(serial, test_settings(false));
        let coordinator = ShutdownCoordinator::new();

        let (mut client, session) = tcp_pair().await;
        let run = tokio::spawn({
            let token = coordinator.token();
            async move { relay.run(session, token).await }
        });

        device_tx.send(b"OK\r\n".to_vec()).unwrap();

        let mut response = [0u8; 2];
        timeout(Duration::from_secs(1), client.read_exact(&mut response))
            .await
            .expect("client should receive stripped payload")
            .unwrap();
        assert_eq!(&response, b"OK");

        drop(client);
        timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bare_terminator_produces_no_client_write() {
        let (serial, device_tx) = MockLink::new(false);
        let relay = DuplexRelay::new(serial, test_settings(false));
        let coordinator = ShutdownCoordinator::new();

        let (mut client, session) = tcp_pair().await;
        let run = tokio::spawn({
            let token = coordinator.token();
            async move { relay.run(session, token).await }
        });

        device_tx.send(b"\r\n".to_vec()).unwrap();

        let mut byte = [0u8; 1];
        let read = timeout(Duration::from_millis(200), client.read(&mut byte)).await;
        assert!(read.is_err(), "nothing should arrive for a bare terminator");

        drop(client);
        timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_silent_device_respects_poll_interval() {
        let (serial, _device_tx) = MockLink::new(false);
        let relay = DuplexRelay::new(serial.clone(), test_settings(false));
        let coordinator = ShutdownCoordinator::new();

        let (client, session) = tcp_pair().await;
        let run = tokio::spawn({
            let token = coordinator.token();
            async move { relay.run(session, token).await }
        });

        tokio::time::sleep(Duration::from_millis(220)).await;
        // 50 ms pacing allows roughly 4-5 polls in 220 ms
        assert!(serial.recv_calls.load(Ordering::Relaxed) <= 8);

        drop(client);
        timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_active_session() {
        let (serial, _device_tx) = MockLink::new(false);
        let relay = DuplexRelay::new(serial, test_settings(false));
        let coordinator = ShutdownCoordinator::new();

        let (_client, session) = tcp_pair().await;
        let run = tokio::spawn({
            let token = coordinator.token();
            async move { relay.run(session, token).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.trigger();

        let outcome = timeout(Duration::from_millis(500), run)
            .await
            .expect("relay should stop within a polling interval")
            .unwrap();
        assert_eq!(outcome, SessionOutcome::ShutdownRequested);
    }

    #[tokio::test]
    async fn test_strict_policy_escalates_send_failure() {
        let (serial, _device_tx) = MockLink::new(true);
        let relay = DuplexRelay::new(serial, test_settings(true));
        let coordinator = ShutdownCoordinator::new();

        let (mut client, session) = tcp_pair().await;
        let run = tokio::spawn({
            let token = coordinator.token();
            async move { relay.run(session, token).await }
        });

        client.write_all(b"PING").await.unwrap();

        let outcome = timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert_eq!(outcome, SessionOutcome::TransportError);
    }

    #[tokio::test]
    async fn test_lenient_policy_keeps_session_alive_on_send_failure() {
        let (serial, _device_tx) = MockLink::new(true);
        let relay = DuplexRelay::new(serial, test_settings(false));
        let coordinator = ShutdownCoordinator::new();

        let (mut client, session) = tcp_pair().await;
        let run = tokio::spawn({
            let token = coordinator.token();
            async move { relay.run(session, token).await }
        });

        client.write_all(b"PING").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Session survives the failed forward; clean disconnect still works
        drop(client);
        let outcome = timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert_eq!(outcome, SessionOutcome::ClientDisconnected);
    }
}
