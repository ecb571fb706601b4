//! Configuration validation.
//!
//! Semantic checks only; serde handles the syntax. All problems are
//! collected and returned together.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::EchoConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &EchoConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    if config.history.path.trim().is_empty() {
        errors.push(ValidationError::new("history.path", "must not be empty"));
    }
    if config.history.capacity == 0 {
        errors.push(ValidationError::new("history.capacity", "must be > 0"));
    }

    // h2 requires 16 KiB ..= 16 MiB - 1.
    let frame = config.http2.max_frame_size;
    if !(16_384..=16_777_215).contains(&frame) {
        errors.push(ValidationError::new(
            "http2.max_frame_size",
            format!("{} outside 16384..=16777215", frame),
        ));
    }
    if config.http2.max_concurrent_streams == 0 {
        errors.push(ValidationError::new("http2.max_concurrent_streams", "must be > 0"));
    }

    if config.limits.multipart_max_bytes == 0
        || config.limits.form_max_bytes == 0
        || config.limits.json_max_bytes == 0
    {
        errors.push(ValidationError::new("limits", "all limits must be > 0"));
    }

    if config.rate_limit.enabled
        && (config.rate_limit.requests_per_second == 0 || config.rate_limit.burst_size == 0)
    {
        errors.push(ValidationError::new(
            "rate_limit",
            "requests_per_second and burst_size must be > 0 when enabled",
        ));
    }

    if config.persistence.max_attempts == 0 {
        errors.push(ValidationError::new("persistence.max_attempts", "must be >= 1"));
    }

    if config.persistence.queue_capacity == 0 {
        errors.push(ValidationError::new("persistence.queue_capacity", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
