use std::path::Path;

use gantry_codec::Codec;
use serde::{Deserialize, Serialize};

use crate::error::{RestError, RestResult};
use crate::server::cors::CorsOptions;

/// Server wiring, loadable from JSON/YAML/XML (codec picked from the file
/// extension). Timeouts are milliseconds; zero disables the deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    #[serde(default)]
    pub path_prefix: String,
    pub listen_host: String,
    pub listen_port: u16,
    #[serde(default)]
    pub read_timeout: u64,
    #[serde(default)]
    pub write_timeout: u64,
    #[serde(default)]
    pub enable_tls: bool,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub cors: Option<CorsOptions>,
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> RestResult<Self> {
        let path = path.as_ref();
        let codec = Codec::for_path(path)?;
        let data = std::fs::read(path)?;
        Ok(codec.decode(&data)?)
    }

    pub fn validate(&self) -> RestResult<()> {
        if self.id.is_empty() {
            return Err(RestError::Config("server id is empty".to_string()));
        }
        if self.listen_host.is_empty() {
            return Err(RestError::Config("listen host is empty".to_string()));
        }
        if self.listen_port == 0 {
            return Err(RestError::Config("listen port is not set".to_string()));
        }
        if self.enable_tls {
            let cert = self.cert_path.as_deref().unwrap_or_default();
            let key = self.private_key_path.as_deref().unwrap_or_default();
            if cert.is_empty() || key.is_empty() {
                return Err(RestError::Config(
                    "tls enabled but cert_path or private_key_path is missing".to_string(),
                ));
            }
        }
        Ok(())
    }
}
