//! REST core: a policy-driven HTTP client (retry, circuit breaking,
//! pluggable auth including OAuth2 client-credentials) and a lifecycle-
//! managed HTTP server with a path-parameter router and codec-aware
//! request/response handling.

pub mod auth;
pub mod breaker;
pub mod client;
pub mod error;
pub mod retry;
pub mod server;

pub use auth::{
    ApiKeyAuth, AuthError, AuthHandler, AuthProvider, AuthScheme, BasicAuth, BearerAuth,
    OAuth2ClientCredentials,
};
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{Client, ClientBuilder, FilePart, Request, Response};
pub use error::{RestError, RestResult};
pub use retry::RetryPolicy;
pub use server::{CorsOptions, Filter, Handler, RestServer, ServerConfig, ServerContext};

pub use http::Method;
pub use tokio_util::sync::CancellationToken;
