//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use dev_proxy::config::{ProxyConfig, RouteConfig};
use dev_proxy::{HttpServer, RouteTable, Shutdown};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A running proxy and the handle that stops it.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Config bound to loopback with the given routes.
pub fn proxy_config(routes: Vec<RouteConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;
    config.routes = routes;
    config
}

/// `/api` → backend, prefix stripped, upgrades forwarded.
pub fn api_route(backend: SocketAddr) -> RouteConfig {
    RouteConfig::strip_prefix("/api", format!("http://{}/", backend))
}

/// Start a proxy for `config` on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let routes = RouteTable::from_config(&config.routes).unwrap();
    start_server(HttpServer::new(config, routes)).await
}

/// Start an already-built server on an ephemeral port.
pub async fn start_server(server: HttpServer) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy { addr, shutdown }
}

/// HTTP client that never goes through a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// An address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Read up to and including the blank line ending an HTTP head.
pub async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed before end of head");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Backend that describes the request it received.
///
/// Body format: `METHOD URI\nhost=...\nx-custom=...\nbody=...`
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(echo);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo(request: Request<Body>) -> String {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    format!(
        "{} {}\nhost={}\nx-custom={}\nbody={}",
        parts.method,
        parts.uri,
        header("host"),
        header("x-custom"),
        String::from_utf8_lossy(&body)
    )
}

/// Value of the `Content-Length` header in a raw request head, or zero.
pub fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Backend that reads each request (head and body), reports it, and
/// answers with a fixed raw response.
pub async fn start_recording_backend(
    response: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (requests_tx, requests) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let requests_tx = requests_tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let mut body = vec![0u8; content_length(&head)];
                if socket.read_exact(&mut body).await.is_err() {
                    return;
                }
                let _ = requests_tx.send((head, body));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });
    (addr, requests)
}

/// Backend that answers with a fixed raw response.
pub async fn start_raw_backend(response: &'static str) -> SocketAddr {
    start_recording_backend(response).await.0
}

/// Backend that writes `partial` after the request head, then holds the
/// connection open without finishing the response.
pub async fn start_stalling_backend(partial: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_head(&mut socket).await;
                let _ = socket.write_all(partial.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });
    addr
}

/// Backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });
    addr
}

/// A raw upgrade backend: answers 101, then echoes bytes until EOF.
pub struct UpgradeBackend {
    pub addr: SocketAddr,
    /// Request heads as received.
    pub heads: mpsc::UnboundedReceiver<String>,
    /// One message per connection that reached end-of-stream.
    pub closed: mpsc::UnboundedReceiver<()>,
}

pub async fn start_upgrade_backend() -> UpgradeBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads_tx, heads) = mpsc::unbounded_channel();
    let (closed_tx, closed) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let heads_tx = heads_tx.clone();
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = heads_tx.send(head);
                socket
                    .write_all(
                        b"HTTP/1.1 101 Switching Protocols\r\n\
                          Connection: Upgrade\r\n\
                          Upgrade: raw-test\r\n\
                          X-Upstream: yes\r\n\r\n",
                    )
                    .await
                    .unwrap();

                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });

    UpgradeBackend { addr, heads, closed }
}

/// WebSocket echo backend reporting the request path of each handshake.
pub async fn start_ws_echo_backend() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (paths_tx, paths) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let paths_tx = paths_tx.clone();
            tokio::spawn(async move {
                let callback = move |req: &Request, resp: Response| {
                    let _ = paths_tx.send(req.uri().to_string());
                    Ok(resp)
                };
                let mut ws = match tokio_tungstenite::accept_hdr_async(socket, callback).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() || message.is_binary() {
                        if ws.send(message).await.is_err() {
                            break;
                        }
                    } else if message.is_close() {
                        break;
                    }
                }
            });
        }
    });

    (addr, paths)
}
