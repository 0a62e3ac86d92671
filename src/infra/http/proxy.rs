use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
};
use tracing::{debug, warn};

use super::{bad_gateway, middleware::log_responses};
use crate::cache::{CachedCommittees, CommitteeCache, EpochKey};
use crate::infra::capture::capture;
use crate::infra::upstream::UpstreamProxy;

/// The one route served from the cache.
pub const COMMITTEES_PATH: &str = "/eth/v1/beacon/states/head/committees";

const EPOCH_PARAM: &str = "epoch";

#[derive(Clone)]
pub struct ProxyState {
    pub cache: Arc<CommitteeCache>,
    pub upstream: Arc<UpstreamProxy>,
}

pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route(COMMITTEES_PATH, any(committees))
        .fallback(passthrough)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
}

/// Serve committees from the cache when possible. Every branch other than a
/// cache hit ends at the upstream.
async fn committees(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let Some(key) = cacheable_epoch(&request) else {
        return passthrough(State(state), request).await;
    };

    let lookup = state.cache.get(request.headers(), key).await;
    match lookup {
        Ok(Some(hit)) => {
            debug!(target = "beacon_cache_proxy::http", epoch = %key, "cache hit");
            return hit_response(hit);
        }
        Ok(None) => {}
        Err(err) => {
            warn!(
                target = "beacon_cache_proxy::http",
                epoch = %key,
                error = %err,
                "cache read failed; passing through"
            );
            return passthrough(State(state), request).await;
        }
    }

    debug!(target = "beacon_cache_proxy::http", epoch = %key, "cache miss");
    populate(state, key, request).await
}

/// Forward to the upstream, hand the response to the client, and persist a
/// copy in the background.
async fn populate(state: ProxyState, key: EpochKey, request: Request<Body>) -> Response {
    let response = match state.upstream.forward(request).await {
        Ok(response) => response,
        Err(err) => return bad_gateway("committees", &err),
    };

    let (response, captured) = match capture(response).await {
        Ok(pair) => pair,
        Err(err) => return bad_gateway("committees", &err),
    };

    if !captured.is_cacheable() {
        debug!(
            target = "beacon_cache_proxy::http",
            epoch = %key,
            status = captured.status.as_u16(),
            bytes = captured.body.len(),
            "upstream response not cacheable"
        );
        return response;
    }

    let cache = Arc::clone(&state.cache);
    tokio::spawn(async move {
        match cache.set(key, &captured.body).await {
            Ok(()) => {
                debug!(target = "beacon_cache_proxy::http", epoch = %key, "cached committees");
            }
            Err(err) if err.is_already_cached() => {
                debug!(target = "beacon_cache_proxy::http", epoch = %key, "committees already cached");
            }
            Err(err) => warn!(
                target = "beacon_cache_proxy::http",
                epoch = %key,
                error = %err,
                "failed to cache committees"
            ),
        }
    });

    response
}

async fn passthrough(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    match state.upstream.forward(request).await {
        Ok(response) => response,
        Err(err) => bad_gateway("passthrough", &err),
    }
}

/// Epoch requested by a cacheable `GET`, or `None` when the request must pass through.
fn cacheable_epoch(request: &Request<Body>) -> Option<EpochKey> {
    if request.method() != Method::GET {
        return None;
    }
    let query = request.uri().query()?;
    let (_, value) =
        url::form_urlencoded::parse(query.as_bytes()).find(|(name, _)| name == EPOCH_PARAM)?;
    let key = EpochKey::parse(&value);
    if key.is_none() {
        debug!(
            target = "beacon_cache_proxy::http",
            epoch = %value,
            "non-numeric epoch; passing through"
        );
    }
    key
}

fn hit_response(hit: CachedCommittees) -> Response {
    (StatusCode::OK, hit.headers(), hit.body).into_response()
}
