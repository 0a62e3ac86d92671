mod middleware;
mod proxy;

pub use proxy::{COMMITTEES_PATH, ProxyState, build_router};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::upstream::UpstreamError;

fn bad_gateway(source: &'static str, err: &UpstreamError) -> Response {
    warn!(target = "beacon_cache_proxy::http", source, error = %err, "upstream request failed");
    StatusCode::BAD_GATEWAY.into_response()
}
