//! Access logging.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info, warn};

/// Log method, path, status and latency. Headers are never logged since the
/// callback route carries a shared secret in one.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        warn!(%method, %path, status, elapsed_ms, "Request failed");
    } else if path.ends_with("/health") {
        debug!(%method, %path, status, elapsed_ms, "Health check");
    } else {
        info!(%method, %path, status, elapsed_ms, "Request handled");
    }

    response
}
