//! Request tracing middleware

use axum::{body::Body, http::Request, response::Response, Router};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::rate_limiter::client_key;

/// Wrap the router in a span per request and log status and latency
pub fn with_request_tracing<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    client_ip = %client_key(request.headers()),
                )
            })
            .on_request(|_request: &Request<Body>, _span: &Span| {
                tracing::debug!("Request started");
            })
            .on_response(|response: &Response, latency: Duration, _span: &Span| {
                let status = response.status();
                let duration_ms = latency.as_millis() as u64;
                if status.is_server_error() {
                    tracing::error!(
                        status = status.as_u16(),
                        duration_ms,
                        "Request completed with error"
                    );
                } else if status.is_client_error() {
                    tracing::warn!(
                        status = status.as_u16(),
                        duration_ms,
                        "Request completed with client error"
                    );
                } else {
                    tracing::info!(status = status.as_u16(), duration_ms, "Request completed");
                }
            }),
    )
}
