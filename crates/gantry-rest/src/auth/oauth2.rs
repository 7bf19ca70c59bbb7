use async_trait::async_trait;
use http::Method;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::auth::{AuthError, AuthProvider, AuthScheme};
use crate::client::Client;
use crate::error::RestResult;

const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Refreshed tokens expire slightly early so a token handed out at the edge
/// of its lifetime is not rejected upstream.
const EXPIRY_BUFFER_MS: i64 = 100;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at_ms: i64,
}

/// OAuth2 client-credentials provider (RFC 6749 §4.4). Fetches tokens over
/// its own REST client and caches them until just before expiry. The whole
/// check-then-refresh path holds one async mutex, so concurrent callers
/// trigger at most one network call and share the fresh token.
pub struct OAuth2ClientCredentials {
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    grant_type: String,
    extra_params: Vec<(String, String)>,
    http: Client,
    cache: Mutex<Option<CachedToken>>,
}

impl OAuth2ClientCredentials {
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> RestResult<Self> {
        Ok(Self {
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            grant_type: GRANT_CLIENT_CREDENTIALS.to_string(),
            extra_params: Vec::new(),
            http: Client::builder().build()?,
            cache: Mutex::new(None),
        })
    }

    pub fn with_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = grant_type.into();
        self
    }

    /// Extra form fields sent to the token endpoint, rendered via `Display`.
    pub fn with_extra_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.extra_params.push((key.into(), value.to_string()));
        self
    }

    /// Replace the internal HTTP client (proxy/TLS wiring, tests).
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    async fn refresh(&self) -> RestResult<(String, Option<i64>)> {
        let mut request = self
            .http
            .new_request(&self.token_endpoint, Method::POST)
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?;
        request = request
            .form_field("grant_type", &self.grant_type)
            .form_field("client_id", &self.client_id)
            .form_field("client_secret", &self.client_secret);
        for (key, value) in &self.extra_params {
            request = request.form_field(key, value);
        }

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;
        let status = response.status();
        if status != 200 {
            return Err(AuthError::TokenStatus(status).into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;
        let payload: serde_json::Map<String, Value> = serde_json::from_slice(&body)
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;

        let access_token = match payload.get("access_token") {
            None => return Err(AuthError::TokenMissing.into()),
            Some(Value::String(token)) => token.clone(),
            Some(_) => return Err(AuthError::TokenNotString.into()),
        };

        let expires_at_ms = match payload.get("expires_in") {
            None => None,
            Some(value) => {
                let seconds = value.as_f64().ok_or(AuthError::BadExpiry)?;
                Some(now_ms() + (seconds * 1000.0) as i64 - EXPIRY_BUFFER_MS)
            }
        };
        Ok((access_token, expires_at_ms))
    }
}

#[async_trait]
impl AuthProvider for OAuth2ClientCredentials {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::OAuth2
    }

    async fn token(&self) -> RestResult<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at_ms > now_ms() {
                return Ok(cached.access_token.clone());
            }
        }

        let (access_token, expires_at_ms) = self.refresh().await.inspect_err(|err| {
            tracing::warn!(error = %err, "oauth2 token refresh failed");
        })?;
        // A response without expires_in yields a single-use token: nothing is
        // cached and every Token() call refreshes.
        *cache = expires_at_ms.map(|expires_at_ms| CachedToken {
            access_token: access_token.clone(),
            expires_at_ms,
        });
        Ok(access_token)
    }
}

fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
