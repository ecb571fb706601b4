//! Turns an inbound request into a [`RequestSnapshot`].
//!
//! Building never fails: a body that cannot be decoded leaves `rawBody` null
//! or the form body without its body part, and the failure is only logged.

use axum::body::Body;
use axum::http::{header, request::Parts, Method, Request, Version};
use serde_json::Value;

use crate::config::LimitsConfig;
use crate::observability::metrics;
use crate::snapshot::body::{self, BodyEncoding, DecodeError};
use crate::snapshot::{header_fields, FormFields, RequestSnapshot};

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    limits: LimitsConfig,
}

impl SnapshotBuilder {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Consume `request` and describe it. `ip` comes from the client IP
    /// resolver and is stored as given.
    pub async fn build(&self, request: Request<Body>, ip: String) -> RequestSnapshot {
        let (parts, body) = request.into_parts();
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();

        let (raw_body, form_body) = match BodyEncoding::detect(&content_type) {
            BodyEncoding::UrlEncoded => (Value::Null, Some(self.urlencoded(&parts, body).await)),
            BodyEncoding::Multipart => (
                Value::Null,
                Some(self.multipart(&parts, body, &content_type).await),
            ),
            BodyEncoding::Json => (self.json(body).await, None),
        };

        RequestSnapshot::new(
            ip,
            request_target(&parts),
            parts.method.to_string(),
            raw_body,
            form_body,
            header_fields(&parts.headers),
        )
    }

    async fn json(&self, body: Body) -> Value {
        let decoded = match body::read_limited(body, self.limits.json_max_bytes).await {
            Ok(bytes) => body::parse_json(&bytes),
            Err(e) => Err(e),
        };
        decoded.unwrap_or_else(|e| {
            // An empty body is the normal case for GET and friends.
            if !matches!(e, DecodeError::Empty) {
                note_failure(&e);
            }
            Value::Null
        })
    }

    /// Body pairs first, then query pairs. The body is only read for
    /// methods that carry form data.
    async fn urlencoded(&self, parts: &Parts, body: Body) -> FormFields {
        let mut form = FormFields::new();
        if carries_form_body(&parts.method) {
            match body::read_limited(body, self.limits.form_max_bytes).await {
                Ok(bytes) => body::parse_urlencoded(&bytes, &mut form),
                Err(e) => note_failure(&e),
            }
        }
        if let Some(query) = parts.uri.query() {
            body::parse_urlencoded(query.as_bytes(), &mut form);
        }
        form
    }

    /// Query pairs first, then multipart text fields, then file descriptors.
    async fn multipart(&self, parts: &Parts, body: Body, content_type: &str) -> FormFields {
        let mut form = FormFields::new();
        if let Some(query) = parts.uri.query() {
            body::parse_urlencoded(query.as_bytes(), &mut form);
        }
        if let Err(e) =
            body::parse_multipart(body, content_type, self.limits.multipart_max_bytes, &mut form)
                .await
        {
            note_failure(&e);
        }
        form
    }
}

fn carries_form_body(method: &Method) -> bool {
    method == Method::POST || method == Method::PUT || method == Method::PATCH
}

fn note_failure(err: &DecodeError) {
    tracing::debug!(error = %err, kind = err.kind(), "Request body not decoded");
    metrics::record_decode_failure(err.kind());
}

/// The request target as the client sent it. HTTP/2 requests always carry
/// scheme and authority in the URI, so only path and query are kept there.
fn request_target(parts: &Parts) -> String {
    if parts.version == Version::HTTP_2 {
        parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned())
    } else {
        parts.uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(LimitsConfig::default())
    }

    fn request(method: &str, uri: &str, content_type: Option<&str>, body: &str) -> Request<Body> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            req = req.header(header::CONTENT_TYPE, ct);
        }
        req.body(Body::from(body.to_owned())).unwrap()
    }

    #[tokio::test]
    async fn json_body_is_reflected() {
        let req = request(
            "POST",
            "/items?x=1",
            Some("application/json"),
            r#"{"name":"echo","tags":["a","b"],"n":3.5}"#,
        );
        let snapshot = builder().build(req, "203.0.113.9".into()).await;

        assert_eq!(
            snapshot.raw_body(),
            &json!({"name": "echo", "tags": ["a", "b"], "n": 3.5})
        );
        assert!(snapshot.form_body().is_none());
        assert_eq!(snapshot.ip(), "203.0.113.9");
        assert_eq!(snapshot.method(), "POST");
        assert_eq!(snapshot.uri(), "/items?x=1");
        assert_eq!(snapshot.headers()["content-type"], vec!["application/json"]);
    }

    #[tokio::test]
    async fn malformed_json_degrades_to_null() {
        let req = request("POST", "/", None, "{bad");
        let snapshot = builder().build(req, String::new()).await;
        assert_eq!(snapshot.raw_body(), &Value::Null);
        assert!(snapshot.form_body().is_none());
    }

    #[tokio::test]
    async fn json_over_limit_degrades_to_null() {
        let limits = LimitsConfig {
            json_max_bytes: 4,
            ..LimitsConfig::default()
        };
        let req = request("POST", "/", Some("application/json"), r#"{"a":1}"#);
        let snapshot = SnapshotBuilder::new(limits).build(req, String::new()).await;
        assert_eq!(snapshot.raw_body(), &Value::Null);
    }

    #[tokio::test]
    async fn urlencoded_body_populates_form() {
        let req = request(
            "POST",
            "/submit",
            Some("application/x-www-form-urlencoded"),
            "a=1&a=2&b=x",
        );
        let snapshot = builder().build(req, String::new()).await;

        let form = snapshot.form_body().unwrap();
        assert_eq!(form.get("a").unwrap(), ["1", "2"]);
        assert_eq!(form.get("b").unwrap(), ["x"]);
        assert_eq!(snapshot.raw_body(), &Value::Null);
    }

    #[tokio::test]
    async fn urlencoded_query_values_follow_body_values() {
        let req = request(
            "POST",
            "/submit?a=q&z=1",
            Some("application/x-www-form-urlencoded"),
            "a=body",
        );
        let snapshot = builder().build(req, String::new()).await;

        let form = snapshot.form_body().unwrap();
        assert_eq!(form.get("a").unwrap(), ["body", "q"]);
        assert_eq!(form.get("z").unwrap(), ["1"]);
    }

    #[tokio::test]
    async fn urlencoded_get_ignores_body() {
        let req = request(
            "GET",
            "/search?q=rust",
            Some("application/x-www-form-urlencoded"),
            "ignored=1",
        );
        let snapshot = builder().build(req, String::new()).await;

        let form = snapshot.form_body().unwrap();
        assert_eq!(form.get("q").unwrap(), ["rust"]);
        assert!(form.get("ignored").is_none());
    }

    #[tokio::test]
    async fn multipart_body_lists_uploads() {
        let body = concat!(
            "--b0undary\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
            "report\r\n",
            "--b0undary\r\n",
            "Content-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "0123456789\r\n",
            "--b0undary--\r\n",
        );
        let req = request(
            "POST",
            "/upload?src=test",
            Some("multipart/form-data; boundary=b0undary"),
            body,
        );
        let snapshot = builder().build(req, String::new()).await;

        let form = snapshot.form_body().unwrap();
        assert_eq!(form.get("src").unwrap(), ["test"]);
        assert_eq!(form.get("title").unwrap(), ["report"]);
        assert_eq!(form.get("f").unwrap(), ["[FileName: [x.txt] Size: [10]]"]);
        assert_eq!(snapshot.raw_body(), &Value::Null);
    }

    #[tokio::test]
    async fn broken_multipart_still_builds() {
        let req = request("POST", "/?k=v", Some("multipart/form-data"), "garbage");
        let snapshot = builder().build(req, String::new()).await;

        let form = snapshot.form_body().unwrap();
        assert_eq!(form.get("k").unwrap(), ["v"]);
        assert_eq!(form.len(), 1);
    }

    #[tokio::test]
    async fn http2_target_drops_authority() {
        let req = Request::builder()
            .version(Version::HTTP_2)
            .uri("http://example.com/path?x=1")
            .body(Body::empty())
            .unwrap();
        let snapshot = builder().build(req, String::new()).await;
        assert_eq!(snapshot.uri(), "/path?x=1");
    }

    #[tokio::test]
    async fn http1_absolute_form_is_kept() {
        let req = Request::builder()
            .uri("http://example.com/path?x=1")
            .body(Body::empty())
            .unwrap();
        let snapshot = builder().build(req, String::new()).await;
        assert_eq!(snapshot.uri(), "http://example.com/path?x=1");
    }
}
