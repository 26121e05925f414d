//! Correlation id propagation and per-request span.
//!
//! Cameras never send a correlation id, operator tooling sometimes does. Either
//! way every request runs inside an `http_request` span so service logs for one
//! poll (sync check, drain, mark) can be grouped.

use axum::{
    extract::Request,
    http::{header::HeaderValue, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// The header name for correlation IDs.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// W3C Trace Context header.
const TRACEPARENT_HEADER: &str = "traceparent";

/// Extension that holds the correlation ID for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Explicit header first, then the trace id of `traceparent`
    /// (`version-traceid-parentid-flags`), then a fresh UUID.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());

        header(CORRELATION_ID_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
            .or_else(|| {
                header(TRACEPARENT_HEADER)
                    .and_then(|tp| tp.split('-').nth(1))
                    .filter(|trace_id| !trace_id.is_empty())
                    .map(|trace_id| Self(trace_id.to_string()))
            })
            .unwrap_or_else(Self::generate)
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attach a correlation id to the request, echo it on the response, and run
/// the handler inside an `http_request` span.
pub async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = CorrelationId::from_headers(request.headers());
    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let mut response = next.run(request).await;

        if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }

        tracing::debug!(status = response.status().as_u16(), "Request completed");
        response
    }
    .instrument(span)
    .await
}
