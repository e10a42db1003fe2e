//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (session_id, route, target)
//!     → logging.rs (subscriber + filter setup)
//!
//! Consumers:
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Session ID flows through every event of a proxied exchange
//! - HTTP-level spans come from tower-http's TraceLayer

pub mod logging;
