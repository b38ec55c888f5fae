use std::io;

use alexandrea_core::GatewayError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
    #[error("unexpected http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("response is missing the `{0}` field")]
    MissingField(&'static str),
    #[error("model service at `{url}` is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: Box<AdapterError>,
    },
}

impl AdapterError {
    pub fn unreachable(url: impl Into<String>, source: AdapterError) -> Self {
        AdapterError::Unreachable {
            url: url.into(),
            source: Box::new(source),
        }
    }
}

impl From<AdapterError> for GatewayError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Http(err) if err.is_timeout() => GatewayError::Timeout,
            AdapterError::Http(err) if err.is_decode() => GatewayError::Decode(err.to_string()),
            AdapterError::Http(err) => GatewayError::Transport(err.to_string()),
            AdapterError::Json(err) => GatewayError::Decode(err.to_string()),
            AdapterError::MissingField(field) => {
                GatewayError::Decode(format!("response is missing the `{field}` field"))
            }
            AdapterError::HttpStatus { status, body } => GatewayError::Status {
                status: status.as_u16(),
                body,
            },
            other => GatewayError::Transport(other.to_string()),
        }
    }
}

/// Read failures while consuming a streamed body.
pub(crate) fn read_error(err: io::Error) -> GatewayError {
    if err.kind() == io::ErrorKind::TimedOut {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}
