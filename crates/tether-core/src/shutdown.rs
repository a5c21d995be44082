//! Coordinated shutdown
//!
//! The controller hands out [`CancellationToken`]s to the sweeper and the
//! HTTP server. On shutdown it stops accepting new sessions, cancels those
//! tokens and terminates every live session within a bounded time.
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//! spawn_sweeper(manager.clone(), interval, shutdown.token());
//! wait_for_shutdown_signal().await;
//! shutdown.shutdown(Some(manager.as_ref())).await;
//! ```

use crate::session::SessionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Accepting new sessions
    Running,
    /// New sessions are refused; live sessions are being stopped
    Stopping,
    /// Done
    Terminated,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Shutdown coordinator shared by the server's components
#[derive(Debug)]
pub struct ShutdownController {
    cancel_token: CancellationToken,
    phase: watch::Sender<ShutdownPhase>,
    initiated: AtomicBool,
    timeout: Duration,
}

impl ShutdownController {
    /// Controller with the default 30s stop timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS))
    }

    /// Controller with a custom bound on stopping live sessions
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            phase,
            initiated: AtomicBool::new(false),
            timeout,
        })
    }

    /// Token cancelled when shutdown starts
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Whether new sessions may be created
    #[must_use]
    pub fn is_accepting_work(&self) -> bool {
        self.phase() == ShutdownPhase::Running
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Run the shutdown sequence once; later calls return immediately
    pub async fn shutdown(&self, manager: Option<&SessionManager>) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return;
        }

        self.set_phase(ShutdownPhase::Stopping);
        self.cancel_token.cancel();

        if let Some(manager) = manager {
            if tokio::time::timeout(self.timeout, manager.shutdown())
                .await
                .is_err()
            {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Timed out stopping live sessions"
                );
            }
        }

        self.set_phase(ShutdownPhase::Terminated);
    }
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C");
        }
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}
