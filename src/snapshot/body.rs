//! Body decoders.
//!
//! Each decoder returns an explicit `Result`; the builder decides how a
//! failure degrades the snapshot.

use std::collections::BTreeMap;

use axum::body::{Body, Bytes};
use multer::{Constraints, Multipart, SizeLimit};
use serde_json::Value;

use crate::snapshot::FormFields;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// How a request body is interpreted, chosen from its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    UrlEncoded,
    Multipart,
    Json,
}

impl BodyEncoding {
    /// The urlencoded match is exact; a `charset` parameter falls through to
    /// JSON decoding.
    pub fn detect(content_type: &str) -> Self {
        if content_type == FORM_URLENCODED {
            BodyEncoding::UrlEncoded
        } else if content_type.contains(MULTIPART_FORM_DATA) {
            BodyEncoding::Multipart
        } else {
            BodyEncoding::Json
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read body: {0}")]
    Body(#[from] axum::Error),

    #[error("body is empty")]
    Empty,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] multer::Error),
}

impl DecodeError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Body(_) => "body",
            DecodeError::Empty => "empty",
            DecodeError::Json(_) => "json",
            DecodeError::Multipart(_) => "multipart",
        }
    }
}

/// Buffer the body, failing once more than `limit` bytes arrive.
pub async fn read_limited(body: Body, limit: usize) -> Result<Bytes, DecodeError> {
    Ok(axum::body::to_bytes(body, limit).await?)
}

/// Decode the first JSON value in `bytes`. Anything after it is ignored.
pub fn parse_json(bytes: &[u8]) -> Result<Value, DecodeError> {
    match serde_json::Deserializer::from_slice(bytes)
        .into_iter::<Value>()
        .next()
    {
        Some(value) => Ok(value?),
        None => Err(DecodeError::Empty),
    }
}

/// Append every `key=value` pair in `input` to `form`.
pub fn parse_urlencoded(input: &[u8], form: &mut FormFields) {
    for (key, value) in url::form_urlencoded::parse(input) {
        form.add(key, value);
    }
}

/// Synthetic form value describing one uploaded file.
pub fn describe_upload(file_name: &str, size: u64) -> String {
    format!("[FileName: [{}] Size: [{}]]", file_name, size)
}

/// Decode a multipart body into `form`.
///
/// Text fields are appended as they arrive. File fields are summarized with
/// [`describe_upload`]; all files of one field are joined with `;` and
/// appended after that field's text values. Fields decoded before an error
/// are kept.
pub async fn parse_multipart(
    body: Body,
    content_type: &str,
    limit: u64,
    form: &mut FormFields,
) -> Result<(), DecodeError> {
    let boundary = multer::parse_boundary(content_type)?;
    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(limit));
    let mut multipart = Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

    let mut uploads: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let result = async {
        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            let file_name = field
                .file_name()
                .filter(|f| !f.is_empty())
                .map(str::to_owned);

            match file_name {
                Some(file_name) => {
                    let mut size = 0u64;
                    while let Some(chunk) = field.chunk().await? {
                        size += chunk.len() as u64;
                    }
                    uploads
                        .entry(name)
                        .or_default()
                        .push(describe_upload(&file_name, size));
                }
                None => {
                    let value = field.text().await?;
                    form.add(name, value);
                }
            }
        }
        Ok::<(), multer::Error>(())
    }
    .await;

    for (name, files) in uploads {
        form.add(name, files.join(";"));
    }

    result.map_err(DecodeError::from)
}
