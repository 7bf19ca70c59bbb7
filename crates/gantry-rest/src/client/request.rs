use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use gantry_codec::{Codec, CodecOptions};
use http::Method;
use http::header::{HeaderMap, HeaderName};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{RestError, RestResult};

/// One file attached to a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub path: PathBuf,
}

pub(crate) enum RequestBody {
    Bytes(Bytes),
    Reader(Pin<Box<dyn AsyncRead + Send + Sync>>),
}

#[derive(Debug)]
pub(crate) enum Payload {
    Empty,
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

/// Mutable builder for a single call. Created by `Client::new_request`,
/// consumed once by `Client::execute`; not meant to be shared across
/// concurrent executions.
pub struct Request {
    pub(crate) url: String,
    pub(crate) method: Method,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    path_params: HashMap<String, String>,
    body: Option<RequestBody>,
    content_type: Option<String>,
    files: Vec<FilePart>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    codec_options: CodecOptions,
}

impl Request {
    pub(crate) fn new(url: String, method: Method, codec_options: CodecOptions) -> Self {
        Self {
            url,
            method,
            headers: Vec::new(),
            query: Vec::new(),
            form: Vec::new(),
            path_params: HashMap::new(),
            body: None,
            content_type: None,
            files: Vec::new(),
            timeout: None,
            cancel: CancellationToken::new(),
            codec_options,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    /// Value for a `${name}` segment in the request URL.
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn content_type(mut self, mime: impl Into<String>) -> Self {
        self.content_type = Some(mime.into());
        self
    }

    /// Structured body, encoded through the codec matching the request's
    /// content type (JSON when none is set).
    pub fn body<T: serde::Serialize>(mut self, value: &T) -> RestResult<Self> {
        let mime = self
            .content_type
            .clone()
            .unwrap_or_else(|| gantry_codec::MIME_JSON.to_string());
        let codec = Codec::for_mime(&mime)?;
        let data = codec.encode(value, self.codec_options)?;
        self.content_type = Some(mime);
        self.body = Some(RequestBody::Bytes(Bytes::from(data)));
        Ok(self)
    }

    pub fn raw_body(mut self, data: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(data.into()));
        self
    }

    /// Raw streaming body. Buffered when the request is materialized so the
    /// retry loop can replay it.
    pub fn raw_reader(mut self, reader: impl AsyncRead + Send + Sync + 'static) -> Self {
        self.body = Some(RequestBody::Reader(Box::pin(reader)));
        self
    }

    /// Attach a file for a multipart upload. Restricted to POST/PUT/PATCH.
    pub fn file(mut self, field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            path: path.into(),
        });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) async fn prepare(self) -> RestResult<PreparedRequest> {
        let target = substitute_path_params(&self.url, &self.path_params)?;
        let mut url = reqwest::Url::parse(&target)
            .map_err(|err| RestError::InvalidUrl(format!("{target}: {err}")))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| RestError::InvalidHeader(err.to_string()))?;
            headers.append(name, crate::auth::header_value(value.clone())?);
        }

        let payload = if !self.files.is_empty() {
            if !matches!(self.method, Method::POST | Method::PUT | Method::PATCH) {
                return Err(RestError::MultipartMethod(self.method));
            }
            if self.body.is_some() {
                return Err(RestError::MultipartBodyConflict);
            }
            Payload::Multipart {
                fields: self.form,
                files: self.files,
            }
        } else if !self.form.is_empty() {
            Payload::Form(self.form)
        } else if let Some(body) = self.body {
            let data = match body {
                RequestBody::Bytes(data) => data,
                RequestBody::Reader(mut reader) => {
                    let mut buf = Vec::new();
                    reader.read_to_end(&mut buf).await?;
                    Bytes::from(buf)
                }
            };
            Payload::Bytes {
                data,
                content_type: self.content_type,
            }
        } else {
            Payload::Empty
        };

        Ok(PreparedRequest {
            method: self.method,
            url,
            headers,
            payload,
            timeout: self.timeout,
            cancel: self.cancel,
        })
    }
}

/// Fully materialized request. Everything needed to (re)build the transport
/// call, so retries replay without touching the original builder.
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    pub method: Method,
    pub url: reqwest::Url,
    pub headers: HeaderMap,
    pub payload: Payload,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

/// Replace `${name}` path segments from the param mapping. A segment with no
/// mapping fails the request before anything is sent.
fn substitute_path_params(url: &str, params: &HashMap<String, String>) -> RestResult<String> {
    if !url.contains("${") {
        return Ok(url.to_string());
    }
    let mut segments = Vec::new();
    for segment in url.split('/') {
        if let Some(name) = segment
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            let value = params
                .get(name)
                .ok_or_else(|| RestError::UnsetPathParam(name.to_string()))?;
            segments.push(value.as_str());
        } else {
            segments.push(segment);
        }
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_params_substitute_segments() {
        let mut params = HashMap::new();
        params.insert("v".to_string(), "v1".to_string());
        params.insert("u".to_string(), "42".to_string());
        let url = substitute_path_params("https://x/api/${v}/users/${u}", &params).unwrap();
        assert_eq!(url, "https://x/api/v1/users/42");
    }

    #[test]
    fn missing_path_param_fails() {
        let mut params = HashMap::new();
        params.insert("v".to_string(), "v1".to_string());
        let err = substitute_path_params("https://x/api/${v}/users/${u}", &params).unwrap_err();
        assert!(matches!(err, RestError::UnsetPathParam(name) if name == "u"));
    }

    #[tokio::test]
    async fn multipart_requires_mutating_method() {
        let request = Request::new(
            "https://x/upload".to_string(),
            Method::GET,
            CodecOptions::default(),
        )
        .file("doc", "/tmp/doc.txt");
        let err = request.prepare().await.unwrap_err();
        assert!(matches!(err, RestError::MultipartMethod(_)));
    }

    #[tokio::test]
    async fn form_fields_become_urlencoded_payload() {
        let request = Request::new(
            "https://x/token".to_string(),
            Method::POST,
            CodecOptions::default(),
        )
        .form_field("grant_type", "client_credentials");
        let prepared = request.prepare().await.unwrap();
        assert!(matches!(prepared.payload, Payload::Form(ref fields) if fields.len() == 1));
    }
}
