//! Beacon node client: forwards requests verbatim and hands responses back
//! either streamed or captured.

use std::time::Duration;

use axum::{
    body::{Body, HttpBody},
    http::{HeaderMap, HeaderName, Request, Uri, header},
    response::Response,
};
use reqwest::{Client, redirect};
use thiserror::Error;
use url::Url;

use super::capture::{CapturedResponse, capture};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid upstream request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to buffer upstream response: {0}")]
    ResponseBody(#[source] axum::Error),
}

#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: Client,
    base: Url,
}

impl UpstreamProxy {
    pub fn new(base: Url, connect_timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .build()
            .map_err(UpstreamError::Client)?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Upstream URL for `uri`: the base path joined with the request path and query.
    pub fn target(&self, uri: &Uri) -> Url {
        let mut url = self.base.clone();
        let prefix = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{}", uri.path()));
        url.set_query(uri.query());
        url
    }

    /// Forward `request` and stream the upstream response back.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response, UpstreamError> {
        let upstream = self.send(request).await?;

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers());
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Issue a bodiless `GET` for `path_and_query` and capture the full response.
    pub async fn fetch(&self, path_and_query: &str) -> Result<CapturedResponse, UpstreamError> {
        let request = Request::get(path_and_query).body(Body::empty())?;
        let response = self.forward(request).await?;
        let (_, captured) = capture(response).await?;
        Ok(captured)
    }

    /// Send `request` upstream, streaming its body as it arrives.
    async fn send(&self, request: Request<Body>) -> Result<reqwest::Response, UpstreamError> {
        let (parts, body) = request.into_parts();

        let mut builder = self
            .client
            .request(parts.method, self.target(&parts.uri))
            .headers(strip_hop_by_hop(&parts.headers));
        // Bodiless requests stay bodiless instead of going out chunked.
        if !body.is_end_stream() {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        Ok(builder.send().await?)
    }
}

/// Copy `headers` minus connection-scoped ones, those listed in `Connection`,
/// and `host`.
pub(crate) fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) && !listed.contains(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
        || name == header::HOST
        || name.as_str() == "keep-alive"
}
