use bytes::Bytes;
use gantry_codec::Codec;
use http::header::{CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;

use crate::error::RestResult;

/// Wrapper over the raw HTTP response. Decoding selects a codec from the
/// response's Content-Type and consumes the body; streaming consumers take
/// the raw handle via `into_inner`.
#[derive(Debug)]
pub struct Response {
    inner: reqwest::Response,
    flagged_status: bool,
}

impl Response {
    pub(crate) fn new(inner: reqwest::Response) -> Self {
        Self {
            inner,
            flagged_status: false,
        }
    }

    pub(crate) fn flagged(mut self) -> Self {
        self.flagged_status = true;
        self
    }

    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    pub fn status_text(&self) -> &'static str {
        self.inner.status().canonical_reason().unwrap_or("")
    }

    pub fn is_success(&self) -> bool {
        (200..=204).contains(&self.status())
    }

    /// True when the client escalated this status through its
    /// error-on-status set and retries were exhausted.
    pub fn is_error_status(&self) -> bool {
        self.flagged_status
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// Decode the body into `v` using the codec matching the response's
    /// Content-Type. Consumes the response.
    pub async fn decode<T: DeserializeOwned>(self) -> RestResult<T> {
        let mime = self
            .inner
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let codec = Codec::for_mime(&mime)?;
        let data = self.inner.bytes().await?;
        Ok(codec.decode(&data)?)
    }

    pub async fn bytes(self) -> RestResult<Bytes> {
        Ok(self.inner.bytes().await?)
    }

    pub async fn text(self) -> RestResult<String> {
        Ok(self.inner.text().await?)
    }

    /// Raw response handle for streaming consumers. The caller owns the body
    /// from here on.
    pub fn into_inner(self) -> reqwest::Response {
        self.inner
    }
}
