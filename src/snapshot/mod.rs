//! Request snapshots.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → builder.rs (split parts, pick decoder by Content-Type)
//!     → body.rs (JSON | urlencoded | multipart)
//!     → RequestSnapshot (immutable)
//!     → response body + history queue
//! ```

pub mod body;
pub mod builder;

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use body::{BodyEncoding, DecodeError};
pub use builder::SnapshotBuilder;

/// Header name (lowercase) to every value received for it, in arrival order.
pub type HeaderFields = BTreeMap<String, Vec<String>>;

/// Multi-valued form fields, keyed by field name.
///
/// Repeated values for one key keep the order they were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormFields(BTreeMap<String, Vec<String>>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to the list stored under `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// One reflected request, as returned to the caller and stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    ip: String,
    time: DateTime<Utc>,
    uri: String,
    method: String,
    #[serde(rename = "rawBody", default)]
    raw_body: Value,
    #[serde(rename = "formBody", default)]
    form_body: Option<FormFields>,
    #[serde(default)]
    headers: HeaderFields,
}

impl RequestSnapshot {
    pub(crate) fn new(
        ip: String,
        uri: String,
        method: String,
        raw_body: Value,
        form_body: Option<FormFields>,
        headers: HeaderFields,
    ) -> Self {
        Self {
            ip,
            time: Utc::now(),
            uri,
            method,
            raw_body,
            form_body,
            headers,
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Decoded JSON body, `Value::Null` unless the body was read as JSON.
    pub fn raw_body(&self) -> &Value {
        &self.raw_body
    }

    /// Form fields, `None` unless the body was form or multipart encoded.
    pub fn form_body(&self) -> Option<&FormFields> {
        self.form_body.as_ref()
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }
}

/// Flatten a header map into name → values. Values that are not valid UTF-8
/// are converted lossily.
pub fn header_fields(headers: &HeaderMap) -> HeaderFields {
    let mut fields = HeaderFields::new();
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        fields.insert(name.as_str().to_owned(), values);
    }
    fields
}
