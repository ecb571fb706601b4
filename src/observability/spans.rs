//! Per-request spans.
//!
//! Every request gets a UUID v4 id in its span so all events logged while
//! serving it can be correlated. The id is not added to the request headers,
//! which are reflected back verbatim.

use axum::http::Request;
use tracing::Span;
use uuid::Uuid;

/// `make_span_with` callback for `tower_http::trace::TraceLayer`.
pub fn make_request_span<B>(request: &Request<B>) -> Span {
    tracing::info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
    )
}
