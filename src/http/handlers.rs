//! The two endpoints.
//!
//! Both always answer 200 with a JSON body; internal failures only show up
//! in logs and metrics.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::resolve_client_ip;

/// Reflect the request back as a snapshot and queue it for the history.
pub async fn reflect(State(state): State<AppState>, request: Request<Body>) -> Response {
    metrics::record_request("reflect");

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = resolve_client_ip(request.headers(), peer);

    let snapshot = state.builder.build(request, ip).await;
    let response = json_response(&snapshot);
    state.persister.enqueue(snapshot);
    response
}

/// Return the stored history, newest first.
pub async fn logs(State(state): State<AppState>) -> Response {
    metrics::record_request("logs");

    let store = Arc::clone(&state.store);
    let entries = match tokio::task::spawn_blocking(move || store.read_all()).await {
        Ok(Ok(entries)) => entries,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "History unreadable, serving empty list");
            Vec::new()
        }
        Err(e) => {
            tracing::error!(error = %e, "History read task failed");
            Vec::new()
        }
    };
    json_response(&entries)
}

fn json_response<T: Serialize>(value: &T) -> Response {
    let mut body = serde_json::to_vec(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode response");
        b"null".to_vec()
    });
    body.push(b'\n');

    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}
