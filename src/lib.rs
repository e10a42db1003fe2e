//! Development reverse proxy library.
//!
//! Requests under a configured path prefix are forwarded to a backend
//! origin with the path rewritten; `Upgrade` handshakes (WebSocket) are
//! bridged byte-for-byte. Everything else goes to a fallback collaborator.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::RouteTable;
