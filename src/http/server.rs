//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the single catch-all handler
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Buffer request bodies and hand requests to the dispatcher
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::dispatch::RequestDispatcher;
use crate::http::request::{request_id, RequestIdLayer};
use crate::http::response::text;
use crate::lifecycle::Shutdown;
use crate::observability::tracing::request_span;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RequestDispatcher>,
    pub max_body_size: usize,
}

/// HTTP front end of the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
        let max_body_size = state.max_body_size;
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(TimeoutLayer::with_status_code(StatusCode::GATEWAY_TIMEOUT, request_timeout))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: buffer the body and dispatch.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let id = request_id(&request);
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(
                request_id = %id,
                error = %e,
                "Could not read request body"
            );
            return text(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large.");
        }
    };

    state.dispatcher.dispatch(Request::from_parts(parts, body)).await
}
