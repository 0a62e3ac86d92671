use axum::{
    body::Body,
    http::StatusCode,
    response::Response,
};
use bytes::Bytes;
use http_body_util::BodyExt;

use super::upstream::UpstreamError;

/// Buffered copy of a response that was also handed to the client.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl CapturedResponse {
    /// Only complete `200 OK` responses with a body are worth persisting.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK && !self.body.is_empty()
    }
}

/// Buffer the whole body of `response`, returning a rebuilt response with the
/// same status, headers and bytes alongside the captured copy.
pub async fn capture(response: Response) -> Result<(Response, CapturedResponse), UpstreamError> {
    let (parts, body) = response.into_parts();
    let bytes = BodyExt::collect(body)
        .await
        .map_err(UpstreamError::ResponseBody)?
        .to_bytes();
    let captured = CapturedResponse {
        status: parts.status,
        body: bytes.clone(),
    };
    Ok((Response::from_parts(parts, Body::from(bytes)), captured))
}
