//! Proxy session tracking.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Count live sessions so shutdown can wait for them to drain
//! - Broadcast a forced close once the shutdown grace period ends
//!
//! A session pairs one client exchange with the single upstream
//! connection dialed for it. It is owned by whichever task drives that
//! upstream connection and ends when that task drops it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Global atomic counter for session IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a proxy session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Tracks live sessions for graceful shutdown.
///
/// Uses a watch channel to tell every session when it must close.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    /// Current count of live sessions.
    active_count: Arc<AtomicU64>,
    /// Flipped to `true` when remaining sessions must be torn down.
    close_tx: Arc<watch::Sender<bool>>,
    close_rx: watch::Receiver<bool>,
}

impl SessionTracker {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            close_tx: Arc::new(tx),
            close_rx: rx,
        }
    }

    /// Start a session. The count is decremented when the session is dropped.
    pub fn open(&self, peer: SocketAddr, route: &str) -> ProxySession {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        let session = ProxySession {
            id: SessionId::new(),
            peer,
            route: route.to_string(),
            started: Instant::now(),
            active_count: Arc::clone(&self.active_count),
            close_rx: self.close_rx.clone(),
        };
        tracing::trace!(session_id = %session.id, peer = %peer, route = %route, "Session opened");
        session
    }

    /// Current count of live sessions.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until no session is live.
    pub async fn wait_idle(&self) {
        // Check periodically
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Tell every live session to close immediately.
    pub fn force_close(&self) {
        let _ = self.close_tx.send(true);
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-exchange state pairing a client with its upstream connection.
#[derive(Debug)]
pub struct ProxySession {
    id: SessionId,
    peer: SocketAddr,
    route: String,
    started: Instant,
    active_count: Arc<AtomicU64>,
    close_rx: watch::Receiver<bool>,
}

impl ProxySession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Resolves once the server forces remaining sessions to close.
    pub async fn closed(&mut self) {
        // A dropped tracker means the server is gone; close as well.
        let _ = self.close_rx.wait_for(|closed| *closed).await;
    }
}

impl Drop for ProxySession {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(
            session_id = %self.id,
            peer = %self.peer,
            route = %self.route,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "Session closed"
        );
    }
}
