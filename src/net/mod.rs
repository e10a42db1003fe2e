//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Downstream:
//!     listener.rs (bind once, fail fast if the port is taken)
//!     → axum serve loop (one task per connection)
//!
//! Upstream:
//!     dialer.rs (DNS → TCP → optional TLS via tls.rs)
//!     → connection.rs (session tracking, forced close)
//! ```
//!
//! # Design Decisions
//! - Each proxied exchange is tracked for graceful shutdown
//! - Upstream TLS is handled transparently behind `UpstreamStream`

pub mod connection;
pub mod dialer;
pub mod listener;
pub mod tls;

pub use connection::{ProxySession, SessionId, SessionTracker};
pub use dialer::{DialError, UpstreamDialer, UpstreamStream};
pub use listener::ListenerError;
