use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{debug, warn};

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        warn!(
            target = "beacon_cache_proxy::http",
            %method,
            %uri,
            status = status.as_u16(),
            elapsed_ms,
            "request failed"
        );
    } else {
        debug!(
            target = "beacon_cache_proxy::http",
            %method,
            %uri,
            status = status.as_u16(),
            elapsed_ms,
            "request completed"
        );
    }

    response
}
