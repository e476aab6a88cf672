//! Transparent single-upstream HTTP reverse proxy (spec §4.7, C7).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;

use crate::gate::Gate;

/// Headers meaningful only for a single transport hop (RFC 7230 §6.1). A
/// transparent proxy must not forward these between independent
/// connections in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Shared state handed to every request handler.
pub struct ProxyState {
    pub gate: Arc<Gate>,
    pub client: reqwest::Client,
}

/// Build the router: a single fallback route forwards every method/path.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new().fallback(any(handle)).with_state(state)
}

async fn handle(State(state): State<Arc<ProxyState>>, req: Request) -> Response {
    let guard = state.gate.acquire_shared().await;

    if !guard.error_response.is_empty() {
        return (StatusCode::BAD_GATEWAY, guard.error_response.clone()).into_response();
    }

    let service_addr = guard.service_addr;
    drop(guard);

    match forward(&state.client, service_addr, req).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "upstream request failed");
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

/// Streams the request body upstream and the response body back without
/// buffering.
///
/// HTTP trailers are not forwarded: `reqwest::Body::wrap_stream` and
/// `axum::body::Body::from_stream` both build on a plain byte-chunk stream
/// with no trailer channel, so there is nowhere to read a trailer from on
/// the upstream side or write one on the downstream side with this stack.
/// Go services fronted by this proxy are not expected to emit trailers
/// (`net/http` only sends them from handlers that opt in via the
/// `http.TrailerPrefix` mechanism), so this is a latent gap rather than an
/// observed one.
async fn forward(
    client: &reqwest::Client,
    service_addr: std::net::SocketAddr,
    req: Request,
) -> Result<Response, reqwest::Error> {
    let (parts, body) = req.into_parts();
    let upstream_uri = rewrite_uri(&parts.uri, service_addr);

    let method = convert_method(&parts.method);
    let mut upstream_req = client.request(method, upstream_uri.to_string());
    upstream_req = upstream_req.headers(strip_hop_by_hop(parts.headers));

    let body_stream = body.into_data_stream();
    upstream_req = upstream_req.body(reqwest::Body::wrap_stream(body_stream));

    let upstream_resp = upstream_req.send().await?;

    let status = upstream_resp.status();
    let headers = strip_hop_by_hop(upstream_resp.headers().clone());
    let byte_stream = upstream_resp.bytes_stream();

    let mut response = Response::new(Body::from_stream(byte_stream));
    *response.status_mut() = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    *response.headers_mut() = headers;

    Ok(response)
}

fn rewrite_uri(incoming: &Uri, service_addr: std::net::SocketAddr) -> Uri {
    let path_and_query = incoming
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("http://{service_addr}{path_and_query}")
        .parse()
        .unwrap_or_else(|_| Uri::from_static("http://invalid/"))
}

fn convert_method(method: &axum::http::Method) -> reqwest::Method {
    reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET)
}

/// Strip hop-by-hop headers, working across the `axum`/`reqwest` header
/// map boundary (both are built on the `http` crate's types underneath).
fn strip_hop_by_hop(headers: HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            filtered.append(name, value);
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_connection_and_transfer_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let filtered = strip_hop_by_hop(headers);
        assert!(filtered.get("connection").is_none());
        assert!(filtered.get("transfer-encoding").is_none());
        assert!(filtered.get("content-type").is_some());
    }

    #[test]
    fn rewrites_path_and_query_onto_service_addr() {
        let uri: Uri = "/widgets?id=3".parse().unwrap();
        let addr: std::net::SocketAddr = "127.0.0.1:13000".parse().unwrap();
        let rewritten = rewrite_uri(&uri, addr);
        assert_eq!(rewritten.to_string(), "http://127.0.0.1:13000/widgets?id=3");
    }
}
