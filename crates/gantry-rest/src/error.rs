use std::time::Duration;

use gantry_codec::CodecError;

use crate::auth::AuthError;

pub type RestResult<T> = Result<T, RestError>;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("path param not set: {0}")]
    UnsetPathParam(String),
    #[error("multipart files require POST, PUT or PATCH, got {0}")]
    MultipartMethod(http::Method),
    #[error("multipart files cannot be combined with an explicit body")]
    MultipartBodyConflict,
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("no handler registered for auth scheme {0:?}")]
    InvalidAuthScheme(crate::auth::AuthScheme),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("body read failed: {0}")]
    BodyRead(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RestError {
    /// Context errors bypass both the retry policy and the circuit breaker.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut(_))
    }
}
