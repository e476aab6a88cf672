//! Exercises the reverse proxy and gate together against a real upstream
//! HTTP server and real TCP sockets, the way the teacher's `dev-server`
//! integration tests avoid mocking the pipeline away.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use lrt_core::gate::Gate;
use lrt_core::proxy::{self, ProxyState};
use tokio::net::TcpListener;

async fn spawn_upstream(body: &'static str) -> std::net::SocketAddr {
    let app = Router::new().route("/", get(move || async move { body }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_proxy(gate: Arc<Gate>) -> std::net::SocketAddr {
    let state = Arc::new(ProxyState {
        gate,
        client: reqwest::Client::new(),
    });
    let app = proxy::router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn forwards_to_upstream_once_built() {
    let upstream_addr = spawn_upstream("lrt/test: OK").await;

    let gate = Arc::new(Gate::new(upstream_addr));
    gate.mark_built_once();

    let proxy_addr = spawn_proxy(Arc::clone(&gate)).await;

    let resp = reqwest::get(format!("http://{proxy_addr}/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "lrt/test: OK");
}

#[tokio::test]
async fn serves_502_with_error_body_instead_of_touching_upstream() {
    // Deliberately bind no upstream at this address; a non-empty
    // `error_response` must short-circuit before dialing it.
    let dead_addr: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();
    let gate = Arc::new(Gate::new(dead_addr));
    gate.mark_built_once();

    {
        let mut guard = gate.acquire_exclusive().await;
        guard.error_response = b"build failed: syntax error".to_vec();
    }

    let proxy_addr = spawn_proxy(Arc::clone(&gate)).await;
    let resp = reqwest::get(format!("http://{proxy_addr}/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
    assert_eq!(resp.text().await.unwrap(), "build failed: syntax error");
}

#[tokio::test]
async fn request_blocks_until_first_build_completes() {
    let upstream_addr = spawn_upstream("lrt/test: OK").await;
    let gate = Arc::new(Gate::new(upstream_addr));
    // `built_once` is never set before the proxy starts serving.

    let proxy_addr = spawn_proxy(Arc::clone(&gate)).await;

    let gate_for_request = Arc::clone(&gate);
    let request = tokio::spawn(async move {
        let _ = gate_for_request;
        reqwest::get(format!("http://{proxy_addr}/")).await.unwrap()
    });

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert!(
        !request.is_finished(),
        "request must not complete before the first build resolves"
    );

    gate.mark_built_once();
    let resp = request.await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn rewritten_requests_preserve_query_and_reach_fresh_generation() {
    let upstream_v1 = spawn_upstream("lrt/test: OK").await;
    let upstream_v2 = spawn_upstream("lrt/test: OVERRIDE").await;

    let gate = Arc::new(Gate::new(upstream_v1));
    gate.mark_built_once();
    let proxy_addr = spawn_proxy(Arc::clone(&gate)).await;

    let resp = reqwest::get(format!("http://{proxy_addr}/?x=1")).await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "lrt/test: OK");

    // Simulate a rebuild landing a new generation under the writer lock.
    {
        let mut guard = gate.acquire_exclusive().await;
        guard.service_addr = upstream_v2;
    }

    let resp = reqwest::get(format!("http://{proxy_addr}/?x=1")).await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "lrt/test: OVERRIDE");
}
