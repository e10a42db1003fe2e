//! Upstream connection establishment.
//!
//! # Responsibilities
//! - Resolve the target host
//! - Connect TCP, trying every resolved address in order
//! - Wrap the socket in TLS for `https` targets
//! - Classify failures so callers can log and map them
//!
//! # Design Decisions
//! - No pooling: every session dials a fresh connection
//! - One deadline covers DNS, connect and TLS handshake

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::net::tls;
use crate::routing::Target;

/// Why an upstream could not be reached.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("connection refused by {authority}")]
    ConnectionRefused { authority: String },

    #[error("timed out after {timeout:?} connecting to {authority}")]
    Timeout { authority: String, timeout: Duration },

    #[error("failed to resolve {host}: {reason}")]
    DnsFailure { host: String, reason: String },

    #[error("TLS handshake with {authority} failed: {source}")]
    TlsHandshake {
        authority: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {authority}: {source}")]
    Connect {
        authority: String,
        #[source]
        source: io::Error,
    },
}

impl DialError {
    /// Stable short label for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            DialError::ConnectionRefused { .. } => "connection-refused",
            DialError::Timeout { .. } => "timeout",
            DialError::DnsFailure { .. } => "dns-failure",
            DialError::TlsHandshake { .. } => "tls-handshake-failure",
            DialError::Connect { .. } => "connect-failed",
        }
    }
}

/// A connected upstream socket, plain or TLS.
pub enum UpstreamStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamStream::Plain(s) => f.debug_tuple("Plain").field(s).finish(),
            UpstreamStream::Tls(s) => f.debug_tuple("Tls").field(s.get_ref().0).finish(),
        }
    }
}

impl AsyncRead for UpstreamStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            UpstreamStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for UpstreamStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            UpstreamStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_flush(cx),
            UpstreamStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            UpstreamStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Opens connections to route targets.
#[derive(Clone)]
pub struct UpstreamDialer {
    connect_timeout: Duration,
    tls: TlsConnector,
}

impl std::fmt::Debug for UpstreamDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamDialer")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl UpstreamDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            tls: tls::client_connector(),
        }
    }

    /// Connect to `target` within the configured timeout.
    pub async fn dial(&self, target: &Target) -> Result<UpstreamStream, DialError> {
        match tokio::time::timeout(self.connect_timeout, self.connect(target)).await {
            Ok(result) => result,
            Err(_) => Err(DialError::Timeout {
                authority: target.authority(),
                timeout: self.connect_timeout,
            }),
        }
    }

    async fn connect(&self, target: &Target) -> Result<UpstreamStream, DialError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((target.host(), target.port()))
            .await
            .map_err(|e| DialError::DnsFailure {
                host: target.host().to_string(),
                reason: e.to_string(),
            })?
            .collect();

        if addrs.is_empty() {
            return Err(DialError::DnsFailure {
                host: target.host().to_string(),
                reason: "no addresses returned".to_string(),
            });
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    tracing::trace!(upstream = %addr, "Upstream TCP connected");
                    let _ = stream.set_nodelay(true);
                    return self.secure(target, stream).await;
                }
                Err(e) => {
                    tracing::trace!(upstream = %addr, error = %e, "Upstream address failed");
                    last_error = Some(e);
                }
            }
        }

        let authority = target.authority();
        Err(match last_error {
            Some(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                DialError::ConnectionRefused { authority }
            }
            Some(source) => DialError::Connect { authority, source },
            None => DialError::ConnectionRefused { authority },
        })
    }

    async fn secure(&self, target: &Target, stream: TcpStream) -> Result<UpstreamStream, DialError> {
        if !target.is_secure() {
            return Ok(UpstreamStream::Plain(stream));
        }

        let tls_stream = tls::handshake(&self.tls, target.host(), stream)
            .await
            .map_err(|source| DialError::TlsHandshake {
                authority: target.authority(),
                source,
            })?;
        Ok(UpstreamStream::Tls(Box::new(tls_stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn dialer() -> UpstreamDialer {
        UpstreamDialer::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn dials_plain_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hello").await.unwrap();
        });

        let target = Target::parse(&format!("http://{}", addr)).unwrap();
        let mut stream = dialer().dial(&target).await.unwrap();
        assert!(matches!(stream, UpstreamStream::Plain(_)));

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let target = Target::parse(&format!("http://{}", addr)).unwrap();
        let err = dialer().dial(&target).await.unwrap_err();
        assert_eq!(err.reason(), "connection-refused", "got {err}");
    }

    #[tokio::test]
    async fn unresolvable_host_is_dns_failure() {
        let target = Target::parse("http://no-such-host.invalid:8081").unwrap();
        let err = dialer().dial(&target).await.unwrap_err();
        assert!(
            matches!(err, DialError::DnsFailure { .. } | DialError::Timeout { .. }),
            "got {err}"
        );
    }

    #[tokio::test]
    async fn tls_to_plain_server_fails_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        });

        let target = Target::parse(&format!("https://{}", addr)).unwrap();
        let err = dialer().dial(&target).await.unwrap_err();
        assert_eq!(err.reason(), "tls-handshake-failure", "got {err}");
    }
}
