use std::collections::HashMap;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri, header};
use bytes::Bytes;
use gantry_codec::{Codec, CodecOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::auth::header_value;
use crate::error::{RestError, RestResult};

enum OutBody {
    Empty,
    Bytes(Vec<u8>),
    Stream(Body),
}

/// Per-request handler context: read side (method, params, headers, buffered
/// body) plus the response under construction. Writes go through the codec
/// matching the target media type; `set_status` applies before any body
/// write.
pub struct ServerContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path_params: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: Bytes,
    codec_options: CodecOptions,
    status: StatusCode,
    out_headers: HeaderMap,
    out_body: OutBody,
}

impl ServerContext {
    pub(crate) async fn new(
        request: axum::extract::Request,
        path_params: HashMap<String, String>,
        codec_options: CodecOptions,
    ) -> RestResult<Self> {
        let (parts, body) = request.into_parts();
        let query: Vec<(String, String)> = parts
            .uri
            .query()
            .map(serde_urlencoded::from_str)
            .transpose()
            .map_err(|err| RestError::BodyRead(err.to_string()))?
            .unwrap_or_default();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|err| RestError::BodyRead(err.to_string()))?;
        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            path_params,
            query,
            body,
            codec_options,
            status: StatusCode::OK,
            out_headers: HeaderMap::new(),
            out_body: OutBody::Empty,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Uri {
        &self.uri
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Path parameter if present, query parameter otherwise.
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.path_param(name).or_else(|| self.query_param(name))
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Clone of the incoming header map.
    pub fn in_headers(&self) -> HeaderMap {
        self.headers.clone()
    }

    pub fn get_body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the request body using the codec matching its Content-Type.
    pub fn read<T: DeserializeOwned>(&self) -> RestResult<T> {
        let mime = self.get_header(header::CONTENT_TYPE.as_str()).unwrap_or_default();
        let codec = Codec::for_mime(mime)?;
        Ok(codec.decode(&self.body)?)
    }

    /// Response status. Call before writing a body.
    pub fn set_status(&mut self, status: u16) -> RestResult<()> {
        self.status = StatusCode::from_u16(status)
            .map_err(|err| RestError::Config(format!("invalid status {status}: {err}")))?;
        Ok(())
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> RestResult<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| RestError::InvalidHeader(err.to_string()))?;
        self.out_headers.insert(name, header_value(value.to_string())?);
        Ok(())
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) -> RestResult<()> {
        self.out_headers
            .append(header::SET_COOKIE, header_value(format!("{name}={value}"))?);
        Ok(())
    }

    /// Encode `value` with the codec for `mime` and set it as the response
    /// body and Content-Type.
    pub fn write<T: Serialize>(&mut self, value: &T, mime: &str) -> RestResult<()> {
        let codec = Codec::for_mime(mime)?;
        let data = codec.encode(value, self.codec_options)?;
        self.out_headers
            .insert(header::CONTENT_TYPE, header_value(mime.to_string())?);
        self.out_body = OutBody::Bytes(data);
        Ok(())
    }

    pub fn write_json<T: Serialize>(&mut self, value: &T) -> RestResult<()> {
        self.write(value, gantry_codec::MIME_JSON)
    }

    pub fn write_yaml<T: Serialize>(&mut self, value: &T) -> RestResult<()> {
        self.write(value, gantry_codec::MIME_YAML)
    }

    pub fn write_xml<T: Serialize>(&mut self, value: &T) -> RestResult<()> {
        self.write(value, gantry_codec::MIME_XML)
    }

    /// Stream a reader to the response body.
    pub fn write_from(&mut self, reader: impl AsyncRead + Send + Sync + 'static) {
        self.out_body = OutBody::Stream(Body::from_stream(ReaderStream::new(reader)));
    }

    pub(crate) fn into_response(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(match self.out_body {
            OutBody::Empty => Body::empty(),
            OutBody::Bytes(data) => Body::from(data),
            OutBody::Stream(body) => body,
        });
        *response.status_mut() = self.status;
        *response.headers_mut() = self.out_headers;
        response
    }
}
