//! Failure injection tests for the development proxy.

use std::time::Duration;

use axum::http::StatusCode;
use dev_proxy::config::RouteConfig;
use dev_proxy::http::ServerError;
use dev_proxy::net::ListenerError;
use dev_proxy::{HttpServer, RouteTable, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

mod common;

#[tokio::test]
async fn test_unreachable_upstream_returns_502() {
    let dead = common::dead_addr().await;
    let proxy = common::start_proxy(common::proxy_config(vec![common::api_route(dead)])).await;

    let resp = tokio::time::timeout(
        Duration::from_secs(10),
        common::client().get(proxy.url("/api/widgets")).send(),
    )
    .await
    .expect("proxy must answer within the connect budget")
    .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(resp.text().await.unwrap(), "Upstream request failed");
}

#[tokio::test]
async fn test_server_keeps_serving_after_upstream_failure() {
    let dead = common::dead_addr().await;
    let live = common::start_echo_backend().await;
    let proxy = common::start_proxy(common::proxy_config(vec![
        RouteConfig::strip_prefix("/down", format!("http://{}/", dead)),
        RouteConfig::strip_prefix("/up", format!("http://{}/", live)),
    ]))
    .await;
    let client = common::client();

    for _ in 0..3 {
        let resp = client.get(proxy.url("/down/x")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = client.get(proxy.url("/up/x")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.text().await.unwrap().starts_with("GET /x\n"));
    }
}

#[tokio::test]
async fn test_unresolvable_upstream_returns_502() {
    let route = RouteConfig::strip_prefix("/api", "http://does-not-exist.invalid:9/");
    let proxy = common::start_proxy(common::proxy_config(vec![route])).await;

    let resp = tokio::time::timeout(
        Duration::from_secs(10),
        common::client().get(proxy.url("/api/widgets")).send(),
    )
    .await
    .expect("proxy must answer within the connect budget")
    .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_silent_upstream_times_out_with_504() {
    let silent = common::start_silent_backend().await;
    let mut config = common::proxy_config(vec![common::api_route(silent)]);
    config.timeouts.response_secs = 1;
    let proxy = common::start_proxy(config).await;

    let resp = tokio::time::timeout(
        Duration::from_secs(10),
        common::client().get(proxy.url("/api/slow")).send(),
    )
    .await
    .expect("response timeout must bound the exchange")
    .unwrap();

    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_slow_upload_is_not_cut_by_response_timeout() {
    let backend = common::start_echo_backend().await;
    let mut config = common::proxy_config(vec![common::api_route(backend)]);
    config.timeouts.response_secs = 1;
    let proxy = common::start_proxy(config).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    stream
        .write_all(
            b"POST /api/upload HTTP/1.1\r\n\
              Host: localhost\r\n\
              Content-Length: 10\r\n\
              Connection: close\r\n\r\n\
              hello",
        )
        .await
        .unwrap();
    // Longer than the response budget, spent before the upload completes.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    stream.write_all(b"world").await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_string(&mut response))
        .await
        .expect("proxy must answer once the upload finishes")
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("POST /upload\n"), "{response}");
    assert!(response.contains("body=helloworld"), "{response}");
}

#[tokio::test]
async fn test_upstream_closing_without_response_returns_502() {
    let backend = common::start_raw_backend("").await;
    let proxy = common::start_proxy(common::proxy_config(vec![common::api_route(backend)])).await;

    let resp = common::client()
        .get(proxy.url("/api/empty"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_port_in_use_fails_startup() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = common::proxy_config(Vec::new());
    config.server.port = taken.local_addr().unwrap().port();
    let routes = RouteTable::from_config(&config.routes).unwrap();
    let shutdown = Shutdown::new();

    let result = HttpServer::new(config, routes)
        .bind_and_run(shutdown.subscribe())
        .await;

    assert!(matches!(
        result,
        Err(ServerError::Listener(ListenerError::AddrInUse { .. }))
    ));
}

#[tokio::test]
async fn test_shutdown_with_no_sessions_stops_promptly() {
    let config = common::proxy_config(Vec::new());
    let routes = RouteTable::from_config(&config.routes).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(HttpServer::new(config, routes).run(listener, shutdown.subscribe()));

    let resp = common::client()
        .get(format!("http://{}/anything", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server must stop once idle")
        .unwrap();
    assert!(result.is_ok());
}
