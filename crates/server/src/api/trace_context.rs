//! W3C Trace Context propagation middleware for Axum.
//!
//! Reads `traceparent` and `tracestate` from an inbound hop and makes the
//! caller's span the parent of this node's request span, so one request tree
//! shows up as one trace.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::propagation::Extractor;
use opentelemetry::{global, trace::TraceContextExt};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Carrier that reads from HTTP header maps.
struct HeaderExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(axum::http::HeaderName::as_str).collect()
    }
}

/// Axum middleware that extracts W3C Trace Context from incoming requests.
///
/// When a valid `traceparent` header is present, the extracted context becomes
/// the parent of the current span, linking this request to the caller's trace.
/// When absent, a new root context is used (no-op).
pub async fn propagate_trace_context(request: Request, next: Next) -> Response {
    let parent_cx = global::get_text_map_propagator(|p| {
        let extractor = HeaderExtractor(request.headers());
        p.extract(&extractor)
    });

    if parent_cx.span().span_context().is_remote() {
        tracing::Span::current().set_parent(parent_cx);
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use opentelemetry::propagation::TextMapPropagator;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use tower::ServiceExt;

    use super::*;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn hop_headers(traceparent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", traceparent.parse().unwrap());
        headers.insert("tracestate", "hopsim=auth".parse().unwrap());
        headers.insert("x-simulation-payload", "W10=".parse().unwrap());
        headers
    }

    #[test]
    fn extractor_sees_every_hop_header() {
        let headers = hop_headers(TRACEPARENT);
        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some(TRACEPARENT));
        assert_eq!(extractor.get("tracestate"), Some("hopsim=auth"));
        let mut keys = extractor.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["traceparent", "tracestate", "x-simulation-payload"]);
    }

    #[test]
    fn extractor_skips_non_ascii_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            axum::http::HeaderValue::from_bytes(&[0x80, 0x81]).unwrap(),
        );
        assert!(HeaderExtractor(&headers).get("traceparent").is_none());
    }

    #[test]
    fn caller_span_is_recovered() {
        let headers = hop_headers(TRACEPARENT);
        let cx = TraceContextPropagator::new().extract(&HeaderExtractor(&headers));
        let span = cx.span().span_context().clone();
        assert!(span.is_remote());
        assert_eq!(span.trace_id().to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(span.span_id().to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn garbage_traceparent_is_ignored() {
        let headers = hop_headers("not-a-traceparent");
        let cx = TraceContextPropagator::new().extract(&HeaderExtractor(&headers));
        assert!(!cx.span().span_context().is_remote());
    }

    #[tokio::test]
    async fn middleware_passes_requests_through() {
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn(propagate_trace_context));

        let mut request = HttpRequest::builder().uri("/ping").body(Body::empty()).unwrap();
        *request.headers_mut() = hop_headers(TRACEPARENT);

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
