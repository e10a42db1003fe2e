//! TCP listener setup.
//!
//! # Responsibilities
//! - Bind to the configured host and port exactly once
//! - Fail fast with a distinct error when the port is already taken

use std::io;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Another process already owns the address.
    #[error("Failed to bind: {addr} is already in use")]
    AddrInUse { addr: String },

    /// Any other bind failure (permissions, unresolvable host, ...).
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Bind the configured address.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ListenerError> {
    let addr = config.bind_address();
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| match source.kind() {
            io::ErrorKind::AddrInUse => ListenerError::AddrInUse { addr: addr.clone() },
            _ => ListenerError::Bind {
                addr: addr.clone(),
                source,
            },
        })?;

    let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
        addr: addr.clone(),
        source,
    })?;

    tracing::info!(
        address = %local_addr,
        configured = %addr,
        "Listener bound"
    );

    Ok(listener)
}
