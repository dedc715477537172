// Session module - Client session lifecycle
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Both relay directions are running
    Active,
    /// One side detected session end; the other side is being unblocked
    Closing,
    /// Both directional tasks have been joined
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Active => write!(f, "Active"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Clean zero-length read from the client
    ClientDisconnected,
    /// Socket read/write failure other than clean end-of-stream
    TransportError,
    /// Process shutdown interrupted the session
    ShutdownRequested,
}

impl SessionOutcome {
    fn rank(self) -> u8 {
        match self {
            SessionOutcome::ClientDisconnected => 0,
            SessionOutcome::TransportError => 1,
            SessionOutcome::ShutdownRequested => 2,
        }
    }

    /// Combine the outcomes reported by the two directional tasks.
    ///
    /// `None` means a task stopped because the other side flipped the session
    /// to `Closing`. Shutdown dominates, then transport errors; with nothing
    /// reported the session counts as a clean disconnect.
    pub fn combine(uplink: Option<Self>, downlink: Option<Self>) -> Self {
        uplink
            .into_iter()
            .chain(downlink)
            .max_by_key(|outcome| outcome.rank())
            .unwrap_or(SessionOutcome::ClientDisconnected)
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::ClientDisconnected => write!(f, "client disconnected"),
            SessionOutcome::TransportError => write!(f, "transport error"),
            SessionOutcome::ShutdownRequested => write!(f, "shutdown requested"),
        }
    }
}

/// One accepted TCP connection.
///
/// Created on accept, consumed by the relay, which splits it into the two
/// stream halves and a shared [`SessionHandle`]. The socket is closed exactly
/// once, when both halves have been dropped by their tasks.
pub struct ClientSession {
    id: Uuid,
    peer: SocketAddr,
    stream: TcpStream,
}

impl ClientSession {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            stream,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Split into the shared handle and the two directional stream halves
    pub fn into_parts(self) -> (SessionHandle, OwnedReadHalf, OwnedWriteHalf) {
        let (reader, writer) = self.stream.into_split();
        let (state_tx, _) = watch::channel(SessionState::Active);

        let handle = SessionHandle {
            id: self.id,
            peer: self.peer,
            state: Arc::new(state_tx),
            bytes_up: Arc::new(AtomicU64::new(0)),
            bytes_down: Arc::new(AtomicU64::new(0)),
        };

        (handle, reader, writer)
    }
}

/// Shared view of a session held by both directional tasks
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    peer: SocketAddr,
    state: Arc<watch::Sender<SessionState>>,
    bytes_up: Arc<AtomicU64>,
    bytes_down: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Flip the session to `Closing`; only the first caller has an effect
    pub fn mark_closing(&self) {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Active {
                *state = SessionState::Closing;
                true
            } else {
                false
            }
        });
    }

    /// Record final teardown once both tasks are joined
    pub fn mark_closed(&self) {
        self.state.send_replace(SessionState::Closed);
    }

    pub fn add_bytes_up(&self, n: usize) {
        self.bytes_up.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_down(&self, n: usize) {
        self.bytes_down.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_combination_priority() {
        use SessionOutcome::*;

        assert_eq!(
            SessionOutcome::combine(Some(ClientDisconnected), None),
            ClientDisconnected
        );
        assert_eq!(
            SessionOutcome::combine(Some(ClientDisconnected), Some(TransportError)),
            TransportError
        );
        assert_eq!(
            SessionOutcome::combine(Some(ShutdownRequested), Some(TransportError)),
            ShutdownRequested
        );
        assert_eq!(SessionOutcome::combine(None, None), ClientDisconnected);
    }

    #[tokio::test]
    async fn test_mark_closing_is_idempotent() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();

        let session = ClientSession::new(stream, peer);
        let (handle, _reader, _writer) = session.into_parts();

        assert_eq!(handle.state(), SessionState::Active);
        handle.mark_closing();
        handle.mark_closing();
        assert_eq!(handle.state(), SessionState::Closing);

        handle.mark_closed();
        assert_eq!(handle.state(), SessionState::Closed);

        drop(client);
    }

    #[tokio::test]
    async fn test_state_watch_observes_transition() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();

        let (handle, _reader, _writer) = ClientSession::new(stream, peer).into_parts();
        let mut rx = handle.watch();

        let waiter = tokio::spawn(async move {
            rx.wait_for(|state| *state != SessionState::Active)
                .await
                .map(|state| *state)
        });

        handle.mark_closing();
        let observed = waiter.await.unwrap().unwrap();
        assert_eq!(observed, SessionState::Closing);
    }
}
