//! Request transformer middleware.
//!
//! # Responsibilities
//! - Read the flag query parameter and build the [`OptionSet`]
//! - Apply the active transforms in a fixed order: body, content type, bearer
//! - Answer directly on failure, otherwise hand the request to the next handler
//!
//! # Design Decisions
//! - Requests without flags pass through untouched; the body is not read
//! - The query string is never rewritten
//! - Transformer state is immutable and shared by every request

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{
        header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING, X_CONTENT_TYPE_OPTIONS},
        HeaderValue, Request, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use url::form_urlencoded;

use crate::config::TransformerConfig;
use crate::observability::metrics;
use crate::transform::error::TransformError;
use crate::transform::options::{Flag, OptionSet};
use crate::transform::sink::{DiagnosticSink, StderrSink};

/// Rewrites requests according to the flags found in their query string.
#[derive(Clone)]
pub struct RequestTransformer {
    name: Arc<str>,
    config: Arc<TransformerConfig>,
    sink: Arc<dyn DiagnosticSink>,
}

impl RequestTransformer {
    /// Create a transformer instance. Empty options fall back to their defaults.
    pub fn new(config: TransformerConfig, name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            config: Arc::new(config.normalized()),
            sink: Arc::new(StderrSink),
        }
    }

    /// Replace the diagnostic sink (stderr by default).
    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Put this transformer in front of `next`.
    pub fn wrap<S>(&self, next: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        next.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            transform_middleware,
        ))
    }

    /// Flags requested by the given URI.
    pub fn options(&self, uri: &Uri) -> OptionSet {
        match query_value(uri, &self.config.transformer_query_parameter_name) {
            Some(raw) if !raw.is_empty() => OptionSet::parse(&raw),
            _ => OptionSet::empty(),
        }
    }

    /// Apply the requested transforms to `request`.
    pub async fn transform(&self, request: Request<Body>) -> Result<Request<Body>, TransformError> {
        let options = self.options(request.uri());
        if options.is_empty() {
            metrics::record_outcome("passthrough");
            return Ok(request);
        }

        tracing::debug!(
            middleware = %self.name,
            flags = ?options,
            path = %request.uri().path(),
            "Transforming request"
        );

        let (mut parts, mut body) = request.into_parts();

        if options.contains(Flag::Body) {
            let raw = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(TransformError::ReadBody)?;
            let wrapped = self.wrap_body(&raw)?;

            parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(wrapped.len()));
            parts.headers.remove(TRANSFER_ENCODING);
            body = Body::from(wrapped);
        }

        if options.contains(Flag::Json) {
            parts
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if options.contains(Flag::Bearer) {
            let token = query_value(
                &parts.uri,
                &self.config.token_transform_query_parameter_field_name,
            )
            .unwrap_or_default();
            let value = HeaderValue::try_from(format!("Bearer {token}"))?;
            parts.headers.insert(AUTHORIZATION, value);
        }

        for flag in options.iter() {
            metrics::record_flag(flag.as_str());
        }
        metrics::record_outcome("forwarded");

        Ok(Request::from_parts(parts, body))
    }

    /// Wrap the raw body into `{"<field>": "<body as text>"}`.
    fn wrap_body(&self, raw: &Bytes) -> Result<Vec<u8>, TransformError> {
        let text = String::from_utf8_lossy(raw);
        let object = BTreeMap::from([(self.config.json_transform_field_name.as_str(), text)]);
        Ok(serde_json::to_vec(&object)?)
    }

    /// Report a failure and build the response sent instead of forwarding.
    fn reject(&self, err: TransformError) -> Response {
        let message = err.to_string();
        tracing::error!(
            middleware = %self.name,
            kind = err.kind(),
            error = %message,
            "Request transformation failed"
        );
        metrics::record_outcome("rejected");

        if let Err(write_err) = self.sink.write_line(&format!("{}: {}", self.name, message)) {
            // Losing diagnostics is unrecoverable for this instance.
            panic!("{}: diagnostic sink failed: {}", self.name, write_err);
        }

        error_response(err.status(), &message)
    }
}

impl std::fmt::Debug for RequestTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTransformer")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Middleware function applying a [`RequestTransformer`] before `next`.
pub async fn transform_middleware(
    State(transformer): State<RequestTransformer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match transformer.transform(request).await {
        Ok(request) => next.run(request).await,
        Err(err) => transformer.reject(err),
    }
}

/// First value of `key` in the URI query, form-urlencoded decoded.
fn query_value(uri: &Uri, key: &str) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Plain-text error response carrying the error message.
fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        format!("{message}\n"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::sink::MemorySink;
    use axum::{body::to_bytes, http::HeaderMap, routing::any};
    use std::io;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// What the next handler observed.
    #[derive(Debug, Clone)]
    struct Seen {
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Option<Seen>>>);

    impl Capture {
        fn take(&self) -> Option<Seen> {
            self.0.lock().unwrap().take()
        }
    }

    fn next_handler(capture: Capture) -> Router {
        Router::new().route(
            "/",
            any(move |request: Request<Body>| {
                let capture = capture.clone();
                async move {
                    let (parts, body) = request.into_parts();
                    let body = to_bytes(body, usize::MAX).await.unwrap();
                    *capture.0.lock().unwrap() = Some(Seen {
                        uri: parts.uri,
                        headers: parts.headers,
                        body,
                    });
                    StatusCode::NO_CONTENT
                }
            }),
        )
    }

    fn app(transformer: &RequestTransformer, capture: Capture) -> Router {
        transformer.wrap(next_handler(capture))
    }

    /// `|` is percent-encoded so the URI parser never has to accept it raw.
    fn uri(query: &str) -> String {
        format!("/?{}", query.replace('|', "%7C"))
    }

    fn request(query: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri(query))
            .header(CONTENT_TYPE, "text/plain")
            .header(AUTHORIZATION, "Basic abc")
            .header("x-trace", "t-1")
            .body(body.into())
            .unwrap()
    }

    fn json_body(seen: &Seen) -> serde_json::Value {
        serde_json::from_slice(&seen.body).unwrap()
    }

    #[tokio::test]
    async fn test_all_flags_scenario() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "transformer-plugin");
        let capture = Capture::default();

        let response = app(&transformer, capture.clone())
            .oneshot(request("transformer=body|json|bearer&token=TOKENDATA", "RAWSTRING"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let seen = capture.take().expect("next handler was not called");
        assert_eq!(json_body(&seen), serde_json::json!({ "data": "RAWSTRING" }));
        assert_eq!(seen.headers[AUTHORIZATION], "Bearer TOKENDATA");
        assert_eq!(seen.headers[CONTENT_TYPE], "application/json");
        assert_eq!(seen.headers[CONTENT_LENGTH], seen.body.len().to_string().as_str());
    }

    #[tokio::test]
    async fn test_no_flag_is_passthrough() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");

        for query in ["token=TOKENDATA", "transformer=&token=TOKENDATA"] {
            let capture = Capture::default();
            let original = request(query, "RAWSTRING");
            let original_uri = original.uri().clone();
            let original_headers = original.headers().clone();

            app(&transformer, capture.clone()).oneshot(original).await.unwrap();

            let seen = capture.take().unwrap();
            assert_eq!(seen.uri, original_uri);
            assert_eq!(seen.headers, original_headers);
            assert_eq!(seen.body, "RAWSTRING");
        }
    }

    #[tokio::test]
    async fn test_every_flag_combination() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");

        for mask in 0u8..8 {
            let flags: Vec<&str> = [(1, "body"), (2, "json"), (4, "bearer")]
                .into_iter()
                .filter(|(bit, _)| mask & bit != 0)
                .map(|(_, flag)| flag)
                .collect();
            let query = format!("transformer={}&token=T", flags.join("|"));

            let capture = Capture::default();
            app(&transformer, capture.clone())
                .oneshot(request(&query, "RAW"))
                .await
                .unwrap();
            let seen = capture.take().unwrap();

            if flags.contains(&"body") {
                assert_eq!(json_body(&seen), serde_json::json!({ "data": "RAW" }), "{query}");
            } else {
                assert_eq!(seen.body, "RAW", "{query}");
                assert!(seen.headers.get(CONTENT_LENGTH).is_none(), "{query}");
            }

            let expected_type = if flags.contains(&"json") { "application/json" } else { "text/plain" };
            assert_eq!(seen.headers[CONTENT_TYPE], expected_type, "{query}");

            let expected_auth = if flags.contains(&"bearer") { "Bearer T" } else { "Basic abc" };
            assert_eq!(seen.headers[AUTHORIZATION], expected_auth, "{query}");

            assert_eq!(seen.headers["x-trace"], "t-1");
            assert_eq!(seen.uri.to_string(), uri(&query));
        }
    }

    #[tokio::test]
    async fn test_flags_are_case_insensitive() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");
        let capture = Capture::default();

        app(&transformer, capture.clone())
            .oneshot(request("transformer=BODY|Json|BEARER&token=abc", "x"))
            .await
            .unwrap();

        let seen = capture.take().unwrap();
        assert_eq!(json_body(&seen), serde_json::json!({ "data": "x" }));
        assert_eq!(seen.headers[CONTENT_TYPE], "application/json");
        assert_eq!(seen.headers[AUTHORIZATION], "Bearer abc");
    }

    #[tokio::test]
    async fn test_unknown_flags_do_nothing() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");
        let capture = Capture::default();
        let original = request("transformer=foo|bar", "RAW");
        let original_headers = original.headers().clone();

        let response = app(&transformer, capture.clone()).oneshot(original).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let seen = capture.take().unwrap();
        assert_eq!(seen.headers, original_headers);
        assert_eq!(seen.body, "RAW");
    }

    #[tokio::test]
    async fn test_json_without_body_keeps_body() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");
        let capture = Capture::default();

        app(&transformer, capture.clone())
            .oneshot(request("transformer=json", "<xml/>"))
            .await
            .unwrap();

        let seen = capture.take().unwrap();
        assert_eq!(seen.body, "<xml/>");
        assert_eq!(seen.headers[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_bearer_without_token_is_empty() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");
        let capture = Capture::default();

        app(&transformer, capture.clone())
            .oneshot(request("transformer=bearer", ""))
            .await
            .unwrap();

        assert_eq!(capture.take().unwrap().headers[AUTHORIZATION], "Bearer ");
    }

    #[tokio::test]
    async fn test_token_is_query_decoded() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");
        let capture = Capture::default();

        app(&transformer, capture.clone())
            .oneshot(request("transformer=bearer&token=a%2Fb+c&token=second", ""))
            .await
            .unwrap();

        assert_eq!(capture.take().unwrap().headers[AUTHORIZATION], "Bearer a/b c");
    }

    #[tokio::test]
    async fn test_custom_parameter_names() {
        let config = TransformerConfig {
            transformer_query_parameter_name: "transform".into(),
            json_transform_field_name: "payload".into(),
            token_transform_query_parameter_field_name: "key".into(),
        };
        let transformer = RequestTransformer::new(config, "edge");
        let capture = Capture::default();

        app(&transformer, capture.clone())
            .oneshot(request("transform=body|bearer&key=K&transformer=json", "hi"))
            .await
            .unwrap();

        let seen = capture.take().unwrap();
        assert_eq!(json_body(&seen), serde_json::json!({ "payload": "hi" }));
        assert_eq!(seen.headers[AUTHORIZATION], "Bearer K");
        // `transformer` is not the configured parameter here
        assert_eq!(seen.headers[CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_body_is_wrapped_as_text() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");
        let capture = Capture::default();

        app(&transformer, capture.clone())
            .oneshot(request("transformer=body", r#"{"already":"json"}"#))
            .await
            .unwrap();

        let seen = capture.take().unwrap();
        assert_eq!(
            json_body(&seen),
            serde_json::json!({ "data": "{\"already\":\"json\"}" })
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");
        let capture = Capture::default();

        app(&transformer, capture.clone())
            .oneshot(request("transformer=body", vec![0xff, b'o', b'k']))
            .await
            .unwrap();

        let seen = capture.take().unwrap();
        assert_eq!(json_body(&seen), serde_json::json!({ "data": "\u{FFFD}ok" }));
    }

    #[tokio::test]
    async fn test_body_transform_drops_transfer_encoding() {
        let transformer = RequestTransformer::new(TransformerConfig::default(), "edge");
        let capture = Capture::default();
        let mut req = request("transformer=body", "chunks");
        req.headers_mut()
            .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        app(&transformer, capture.clone()).oneshot(req).await.unwrap();

        let seen = capture.take().unwrap();
        assert!(seen.headers.get(TRANSFER_ENCODING).is_none());
        assert_eq!(seen.headers[CONTENT_LENGTH], "17");
    }

    #[tokio::test]
    async fn test_body_read_error_short_circuits() {
        let sink = MemorySink::new();
        let transformer =
            RequestTransformer::new(TransformerConfig::default(), "edge").with_sink(sink.clone());
        let capture = Capture::default();

        let stream = futures_util::stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"partial")),
            Err(io::Error::other("connection reset")),
        ]);
        let req = request("transformer=body|json|bearer&token=T", Body::from_stream(stream));

        let response = app(&transformer, capture.clone()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[X_CONTENT_TYPE_OPTIONS], "nosniff");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("connection reset"), "{body}");
        assert!(body.ends_with('\n'));

        assert!(capture.take().is_none(), "next handler must not run");

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("edge: "), "{}", lines[0]);
        assert!(lines[0].contains("connection reset"));
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let sink = MemorySink::new();
        let transformer =
            RequestTransformer::new(TransformerConfig::default(), "edge").with_sink(sink.clone());
        let capture = Capture::default();

        let response = app(&transformer, capture.clone())
            .oneshot(request("transformer=bearer&token=a%0Ab", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(capture.take().is_none());
        assert_eq!(sink.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_successful_requests_write_no_diagnostics() {
        let sink = MemorySink::new();
        let transformer =
            RequestTransformer::new(TransformerConfig::default(), "edge").with_sink(sink.clone());

        app(&transformer, Capture::default())
            .oneshot(request("transformer=body|json|bearer|nope", "RAW"))
            .await
            .unwrap();

        assert!(sink.lines().is_empty());
    }

    struct BrokenSink;

    impl DiagnosticSink for BrokenSink {
        fn write_line(&self, _line: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stderr closed"))
        }
    }

    #[tokio::test]
    #[should_panic(expected = "diagnostic sink failed")]
    async fn test_sink_failure_is_fatal() {
        let transformer =
            RequestTransformer::new(TransformerConfig::default(), "edge").with_sink(BrokenSink);
        let stream = futures_util::stream::iter(vec![Err::<Bytes, _>(io::Error::other("reset"))]);

        let _ = app(&transformer, Capture::default())
            .oneshot(request("transformer=body", Body::from_stream(stream)))
            .await;
    }

    #[test]
    fn test_empty_config_values_use_defaults() {
        let transformer = RequestTransformer::new(
            TransformerConfig {
                transformer_query_parameter_name: String::new(),
                json_transform_field_name: String::new(),
                token_transform_query_parameter_field_name: String::new(),
            },
            "edge",
        );
        assert_eq!(transformer.config(), &TransformerConfig::default());
        assert_eq!(transformer.name(), "edge");

        let options = transformer.options(&"/?transformer=json".parse().unwrap());
        assert!(options.contains(Flag::Json));
    }
}
