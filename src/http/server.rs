//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router (`/logs` + reflect fallback) and its middleware
//! - Serve HTTP/1.1 and cleartext HTTP/2 on each accepted connection
//! - Stop accepting on shutdown and drain open connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware,
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::EchoConfig;
use crate::history::{HistoryStore, Persister};
use crate::http::handlers;
use crate::net::connection::wait_for_drain;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::observability::spans::make_request_span;
use crate::security::{rate_limit_middleware, RateLimiterState};
use crate::snapshot::SnapshotBuilder;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<HistoryStore>,
    pub persister: Persister,
    pub builder: SnapshotBuilder,
}

/// HTTP server for the echo service.
pub struct HttpServer {
    router: Router,
    config: EchoConfig,
}

impl HttpServer {
    pub fn new(config: EchoConfig, store: Arc<HistoryStore>, persister: Persister) -> Self {
        let state = AppState {
            store,
            persister,
            builder: SnapshotBuilder::new(config.limits.clone()),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    fn build_router(config: &EchoConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/logs", any(handlers::logs))
            .fallback(handlers::reflect)
            .with_state(state);

        let router = if config.rate_limit.enabled {
            let limiter = Arc::new(RateLimiterState::new(&config.rate_limit));
            router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        } else {
            router
        };

        router.layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
    }

    /// The fully layered router, for driving the handlers without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Accept connections until `shutdown` fires, then drain open ones for at
    /// most `shutdown.drain_timeout_secs`.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let tracker = ConnectionTracker::new();
        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http2()
            .max_concurrent_streams(self.config.http2.max_concurrent_streams)
            .max_frame_size(self.config.http2.max_frame_size);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        self.spawn_connection(&builder, &tracker, stream, peer, permit);
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                _ = shutdown.recv() => {
                    tracing::info!("No longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        tracker.begin_drain();
        let deadline = Duration::from_secs(self.config.shutdown.drain_timeout_secs);
        if tokio::time::timeout(deadline, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                open_connections = tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    fn spawn_connection(
        &self,
        builder: &auto::Builder<TokioExecutor>,
        tracker: &ConnectionTracker,
        stream: TcpStream,
        peer: SocketAddr,
        permit: ConnectionPermit,
    ) {
        let guard = tracker.track();
        let drain = tracker.drain_signal();
        let builder = builder.clone();
        let service = TowerToHyperService::new(self.router.clone().map_request(
            move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(ConnectInfo(peer));
                request
            },
        ));

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;

            let conn = builder.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = wait_for_drain(drain) => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        });
    }
}
