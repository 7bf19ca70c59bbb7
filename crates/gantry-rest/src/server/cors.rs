use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::server::Filter;

fn default_max_age() -> u32 {
    600
}

fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_status() -> u16 {
    StatusCode::NO_CONTENT.as_u16()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsOptions {
    #[serde(default = "default_max_age")]
    pub max_age: u32,
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_methods")]
    pub allowed_methods: Vec<String>,
    /// Status returned for preflight requests.
    #[serde(default = "default_status")]
    pub response_status: u16,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            max_age: default_max_age(),
            allowed_origins: default_origins(),
            allowed_methods: default_methods(),
            response_status: default_status(),
        }
    }
}

impl CorsOptions {
    fn allowed_origin(&self, origin: Option<&str>) -> Option<String> {
        if self.allowed_origins.iter().any(|allowed| allowed == "*") {
            return Some("*".to_string());
        }
        let origin = origin?;
        self.allowed_origins
            .iter()
            .find(|allowed| allowed.as_str() == origin)
            .cloned()
    }
}

/// Pre-route filter: answers preflight requests directly and stamps the
/// allow headers on every other response.
pub(crate) fn cors_filter(options: CorsOptions) -> Filter {
    std::sync::Arc::new(move |request: Request, next: Next| {
        let options = options.clone();
        Box::pin(async move {
            let origin = request
                .headers()
                .get(header::ORIGIN)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let allowed = options.allowed_origin(origin.as_deref());

            if request.method() == Method::OPTIONS {
                return preflight(&options, allowed);
            }

            let mut response = next.run(request).await;
            if let Some(allowed) = allowed {
                if let Ok(value) = HeaderValue::from_str(&allowed) {
                    response
                        .headers_mut()
                        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                }
            }
            response
        })
    })
}

fn preflight(options: &CorsOptions, allowed: Option<String>) -> Response {
    let status =
        StatusCode::from_u16(options.response_status).unwrap_or(StatusCode::NO_CONTENT);
    let mut response = status.into_response();
    let headers = response.headers_mut();
    if let Some(allowed) = allowed {
        if let Ok(value) = HeaderValue::from_str(&allowed) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&options.allowed_methods.join(", ")) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
    }
    if let Ok(value) = HeaderValue::from_str(&options.max_age.to_string()) {
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, value);
    }
    response
}
