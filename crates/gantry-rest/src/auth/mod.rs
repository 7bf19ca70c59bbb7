//! Pluggable request authentication. A provider exposes a small capability
//! set (scheme, user, password, token); the client maps each scheme to a
//! handler that stamps the right headers before the request goes out.

mod oauth2;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::future::BoxFuture;
use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::error::{RestError, RestResult};

pub use oauth2::OAuth2ClientCredentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    Basic,
    Bearer,
    ApiKey,
    OAuth2,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials for {0:?} auth")]
    MissingCredentials(AuthScheme),
    #[error("empty auth token")]
    EmptyToken,
    #[error("error creating token request: {0}")]
    TokenRequest(String),
    #[error("error executing token request: {0}")]
    TokenExchange(String),
    #[error("token endpoint returned status {0}")]
    TokenStatus(u16),
    #[error("access_token not found")]
    TokenMissing,
    #[error("access_token is not a string")]
    TokenNotString,
    #[error("unsupported expires_in value")]
    BadExpiry,
}

/// Credential source consulted by the client at execute time.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn scheme(&self) -> AuthScheme;

    fn username(&self) -> Option<String> {
        None
    }

    fn password(&self) -> Option<String> {
        None
    }

    /// Header carrying the credential for `ApiKey` providers.
    fn header_name(&self) -> Option<String> {
        None
    }

    /// Token for `Bearer`, `ApiKey` and `OAuth2` providers. May perform IO
    /// (the OAuth2 provider refreshes here).
    async fn token(&self) -> RestResult<String> {
        Ok(String::new())
    }
}

/// Handler applying one auth scheme to an outgoing header map.
pub type AuthHandler = Arc<
    dyn for<'a> Fn(&'a dyn AuthProvider, &'a mut HeaderMap) -> BoxFuture<'a, RestResult<()>>
        + Send
        + Sync,
>;

/// The built-in scheme handlers. The client starts from these; callers may
/// override any scheme through the builder.
pub fn default_handlers() -> HashMap<AuthScheme, AuthHandler> {
    let mut handlers: HashMap<AuthScheme, AuthHandler> = HashMap::new();
    handlers.insert(
        AuthScheme::Basic,
        Arc::new(|provider, headers| Box::pin(apply_basic(provider, headers))),
    );
    handlers.insert(
        AuthScheme::Bearer,
        Arc::new(|provider, headers| Box::pin(apply_bearer(provider, headers))),
    );
    handlers.insert(
        AuthScheme::OAuth2,
        Arc::new(|provider, headers| Box::pin(apply_bearer(provider, headers))),
    );
    handlers.insert(
        AuthScheme::ApiKey,
        Arc::new(|provider, headers| Box::pin(apply_api_key(provider, headers))),
    );
    handlers
}

async fn apply_basic(provider: &dyn AuthProvider, headers: &mut HeaderMap) -> RestResult<()> {
    let user = provider
        .username()
        .ok_or(AuthError::MissingCredentials(AuthScheme::Basic))?;
    let pass = provider.password().unwrap_or_default();
    let encoded = BASE64.encode(format!("{user}:{pass}"));
    headers.insert(AUTHORIZATION, header_value(format!("Basic {encoded}"))?);
    Ok(())
}

async fn apply_bearer(provider: &dyn AuthProvider, headers: &mut HeaderMap) -> RestResult<()> {
    let token = provider.token().await?;
    if token.is_empty() {
        return Err(AuthError::EmptyToken.into());
    }
    headers.insert(AUTHORIZATION, header_value(format!("Bearer {token}"))?);
    Ok(())
}

async fn apply_api_key(provider: &dyn AuthProvider, headers: &mut HeaderMap) -> RestResult<()> {
    let name = provider
        .header_name()
        .ok_or(AuthError::MissingCredentials(AuthScheme::ApiKey))?;
    let key = provider.token().await?;
    if key.is_empty() {
        return Err(AuthError::EmptyToken.into());
    }
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| RestError::InvalidHeader(err.to_string()))?;
    headers.insert(name, header_value(key)?);
    Ok(())
}

pub(crate) fn header_value(value: String) -> RestResult<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|err| RestError::InvalidHeader(err.to_string()))
}

type BasicSource = Arc<dyn Fn() -> (String, String) + Send + Sync>;

/// Username/password pair, statically held or dynamically sourced.
pub struct BasicAuth {
    source: BasicSource,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        let user = user.into();
        let pass = pass.into();
        Self {
            source: Arc::new(move || (user.clone(), pass.clone())),
        }
    }

    pub fn from_source(source: impl Fn() -> (String, String) + Send + Sync + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

#[async_trait]
impl AuthProvider for BasicAuth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Basic
    }

    fn username(&self) -> Option<String> {
        Some((self.source)().0)
    }

    fn password(&self) -> Option<String> {
        Some((self.source)().1)
    }
}

type TokenSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Static or computed bearer token.
pub struct BearerAuth {
    source: TokenSource,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            source: Arc::new(move || token.clone()),
        }
    }

    pub fn from_source(source: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

#[async_trait]
impl AuthProvider for BearerAuth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Bearer
    }

    async fn token(&self) -> RestResult<String> {
        Ok((self.source)())
    }
}

/// Fixed key delivered in a caller-chosen header.
pub struct ApiKeyAuth {
    header: String,
    key: String,
}

impl ApiKeyAuth {
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for ApiKeyAuth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::ApiKey
    }

    fn header_name(&self) -> Option<String> {
        Some(self.header.clone())
    }

    async fn token(&self) -> RestResult<String> {
        Ok(self.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_handler_encodes_credentials() {
        let provider = BasicAuth::new("user", "pass");
        let mut headers = HeaderMap::new();
        apply_basic(&provider, &mut headers).await.unwrap();
        assert_eq!(headers[AUTHORIZATION], "Basic dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn bearer_handler_rejects_empty_token() {
        let provider = BearerAuth::new("");
        let mut headers = HeaderMap::new();
        let err = apply_bearer(&provider, &mut headers).await.unwrap_err();
        assert!(matches!(err, RestError::Auth(AuthError::EmptyToken)));
    }

    #[tokio::test]
    async fn api_key_handler_uses_custom_header() {
        let provider = ApiKeyAuth::new("X-Api-Key", "secret");
        let mut headers = HeaderMap::new();
        apply_api_key(&provider, &mut headers).await.unwrap();
        assert_eq!(headers["x-api-key"], "secret");
    }
}
