//! MIME-keyed codec service shared by the REST client, the server context
//! and config loading. Encoders are selected by media type (or by file
//! extension for config files); unknown types surface an error instead of
//! guessing.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub const MIME_JSON: &str = "application/json";
pub const MIME_YAML: &str = "application/yaml";
pub const MIME_XML: &str = "application/xml";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_FORM: &str = "application/x-www-form-urlencoded";
pub const MIME_MULTIPART: &str = "multipart/form-data";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";
pub const MIME_EVENT_STREAM: &str = "text/event-stream";

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("no codec registered for mime type: {0}")]
    UnknownMime(String),
    #[error("no codec for file extension: {0}")]
    UnknownExtension(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Options forwarded to the selected codec. Stamped onto responses by the
/// REST client so `decode` behaves the same on both sides of a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecOptions {
    /// Pretty-print encoded output (JSON only).
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    Yaml,
    Xml,
}

impl Codec {
    /// Select a codec by media type. Parameters after `;` are ignored.
    pub fn for_mime(mime: &str) -> CodecResult<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or(mime)
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" | "text/json" => Ok(Self::Json),
            "application/yaml" | "application/x-yaml" | "text/yaml" => Ok(Self::Yaml),
            "application/xml" | "text/xml" => Ok(Self::Xml),
            _ => Err(CodecError::UnknownMime(essence)),
        }
    }

    /// Infer a codec from a file extension (config loading).
    pub fn for_path(path: impl AsRef<Path>) -> CodecResult<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "xml" => Ok(Self::Xml),
            _ => Err(CodecError::UnknownExtension(ext)),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Json => MIME_JSON,
            Self::Yaml => MIME_YAML,
            Self::Xml => MIME_XML,
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T, opts: CodecOptions) -> CodecResult<Vec<u8>> {
        match self {
            Self::Json => {
                if opts.pretty {
                    serde_json::to_vec_pretty(value).map_err(|err| CodecError::Encode(err.to_string()))
                } else {
                    serde_json::to_vec(value).map_err(|err| CodecError::Encode(err.to_string()))
                }
            }
            Self::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|err| CodecError::Encode(err.to_string())),
            Self::Xml => quick_xml::se::to_string(value)
                .map(String::into_bytes)
                .map_err(|err| CodecError::Encode(err.to_string())),
        }
    }

    pub fn encode_to_string<T: Serialize>(
        &self,
        value: &T,
        opts: CodecOptions,
    ) -> CodecResult<String> {
        let bytes = self.encode(value, opts)?;
        String::from_utf8(bytes).map_err(|err| CodecError::Encode(err.to_string()))
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> CodecResult<T> {
        match self {
            Self::Json => {
                serde_json::from_slice(data).map_err(|err| CodecError::Decode(err.to_string()))
            }
            Self::Yaml => {
                serde_yaml::from_slice(data).map_err(|err| CodecError::Decode(err.to_string()))
            }
            Self::Xml => {
                let text = std::str::from_utf8(data)
                    .map_err(|err| CodecError::Decode(err.to_string()))?;
                quick_xml::de::from_str(text).map_err(|err| CodecError::Decode(err.to_string()))
            }
        }
    }
}
