//! Plain HTTP fetch endpoint.
//!
//! `GET /http` returns the raw content with cache-validator headers:
//! `Content-Type` is fixed, `Last-Modified` carries the snapshot mtime and
//! `ETag` the content fingerprint. `HEAD` is answered by the same route.

use crate::server::{
    content::ContentSource,
    telemetry::{increment_bytes_served, increment_requests},
};
use axum::{
    Extension, Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use objwire_core::types::{HTTP_OBJECT_PATH, MEDIA_TYPE};
use std::net::SocketAddr;

#[derive(Clone)]
pub struct HttpState {
    source: ContentSource,
    verbose: bool,
}

/// Builds the router serving the plain fetch endpoint.
pub fn router(source: ContentSource, verbose: bool) -> Router {
    Router::new()
        .route(HTTP_OBJECT_PATH, get(fetch_object))
        .with_state(HttpState { source, verbose })
}

async fn fetch_object(
    State(state): State<HttpState>,
    connect_info: Option<Extension<ConnectInfo<SocketAddr>>>,
) -> Response {
    if state.verbose {
        if let Some(Extension(ConnectInfo(addr))) = connect_info {
            tracing::info!("HTTP: remote addr: {addr}");
        }
    }
    increment_requests("http");

    let snapshot = match state.source.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    increment_bytes_served(snapshot.len() as u64);

    let mut response = Response::new(Body::from(snapshot.content().clone()));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE));
    if let Ok(value) = HeaderValue::from_str(snapshot.mtime()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(snapshot.fingerprint()) {
        headers.insert(header::ETAG, value);
    }
    response
}
