// Shutdown module - Process shutdown coordination
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Process-wide shutdown phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
}

/// Shutdown coordinator.
///
/// Owns the watch channel every task observes. Signal futures only flip the
/// channel; all descriptor release happens in normal task context along the
/// single teardown path in `main`. Installing the signal listener is deferred
/// until startup has finished, so a signal arriving while resources are
/// partially constructed takes the default process disposition instead of
/// observing a half-built server.
pub struct ShutdownCoordinator {
    state: Arc<watch::Sender<ShutdownState>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state: Arc::new(state),
        }
    }

    /// Token for tasks that need to observe shutdown
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            state: self.state.subscribe(),
        }
    }

    /// Request shutdown; repeated calls are harmless
    pub fn trigger(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if changed {
            info!("shutdown requested");
        }
    }

    /// Spawn the task that turns SIGINT/SIGTERM into a shutdown request.
    ///
    /// Call only once the listener and serial handle are open.
    pub fn spawn_signal_listener(&self) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            wait_for_signal().await;
            let changed = state.send_if_modified(|s| {
                if *s == ShutdownState::Running {
                    *s = ShutdownState::ShuttingDown;
                    true
                } else {
                    false
                }
            });
            if changed {
                info!("shutdown requested");
            }
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to install SIGTERM listener: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to wait for interrupt: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to wait for interrupt: {}", e);
            } else {
                info!("interrupt received");
            }
        }
        _ = terminate.recv() => {
            info!("termination signal received");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to wait for interrupt: {}", e);
    } else {
        info!("interrupt received");
    }
}

/// Cloneable handle a task parks on to learn about shutdown
#[derive(Clone)]
pub struct ShutdownToken {
    state: watch::Receiver<ShutdownState>,
}

impl ShutdownToken {
    /// Resolve once shutdown has been requested
    pub async fn cancelled(&self) {
        let mut state = self.state.clone();
        // An error means the coordinator is gone, which also means shutdown
        let _ = state
            .wait_for(|s| *s == ShutdownState::ShuttingDown)
            .await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow() == ShutdownState::ShuttingDown
    }
}
