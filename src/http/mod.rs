//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, route lookup, classification)
//!     → request.rs (upgrade detection, upstream request)
//!     → forward.rs (standard exchange)   or   upgrade.rs (handshake + bridge)
//!       (body.rs marks the end of the upload; the response timeout starts there)
//!     → response.rs (relay, error mapping)
//!     → Send to client
//! ```

pub mod body;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;
pub mod upgrade;

pub use forward::Forwarder;
pub use response::ForwardError;
pub use server::{HttpServer, ServerError};
pub use upgrade::{BridgeState, CloseReason, UpgradeBridge};
