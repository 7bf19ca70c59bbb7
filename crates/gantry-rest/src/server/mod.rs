//! Lifecycle-managed HTTP server over an axum router. Routes are registered
//! with `:name` path templates, global filters run middleware-style ahead of
//! every route, and handlers work against a codec-aware `ServerContext`.

mod config;
mod context;
mod cors;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{RawPathParams, Request};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{MethodFilter, on};
use futures_util::future::BoxFuture;
use gantry_codec::CodecOptions;

use crate::error::{RestError, RestResult};

pub use config::ServerConfig;
pub use context::ServerContext;
pub use cors::CorsOptions;

use cors::cors_filter;

/// Route handler working against the request context.
pub type Handler = Arc<
    dyn for<'a> Fn(&'a mut ServerContext) -> BoxFuture<'a, RestResult<()>> + Send + Sync,
>;

/// Global filter. Receives the request and the rest of the chain; it must
/// call `next.run` (or answer directly) to produce the response.
pub type Filter =
    Arc<dyn Fn(Request, Next) -> BoxFuture<'static, AxumResponse> + Send + Sync>;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct RestServer {
    config: ServerConfig,
    router: Router,
    filters: Vec<Filter>,
    unhandled: Option<Handler>,
    unsupported: Option<Handler>,
    codec_options: CodecOptions,
    handle: Option<axum_server::Handle>,
    local_addr: Option<SocketAddr>,
}

impl RestServer {
    pub fn new(config: ServerConfig) -> RestResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            router: Router::new(),
            filters: Vec::new(),
            unhandled: None,
            unsupported: None,
            codec_options: CodecOptions::default(),
            handle: None,
            local_addr: None,
        })
    }

    pub fn codec_options(mut self, options: CodecOptions) -> Self {
        self.codec_options = options;
        self
    }

    /// Register `handler` under `path_prefix + path` for the given methods.
    /// `:name` segments become extracted path parameters.
    pub fn add_route(
        &mut self,
        path: &str,
        handler: Handler,
        methods: &[Method],
    ) -> RestResult<()> {
        let full = normalize_captures(&join_path(&self.config.path_prefix, path));
        let mut filter: Option<MethodFilter> = None;
        for method in methods {
            let next = MethodFilter::try_from(method.clone())
                .map_err(|_| RestError::Config(format!("unroutable method {method}")))?;
            filter = Some(match filter {
                Some(current) => current.or(next),
                None => next,
            });
        }
        let filter = filter
            .ok_or_else(|| RestError::Config("route needs at least one method".to_string()))?;

        let endpoint = {
            let handler = handler.clone();
            let codec_options = self.codec_options;
            move |params: RawPathParams, request: Request| {
                let handler = handler.clone();
                let params: HashMap<String, String> = params
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect();
                async move { run_handler(handler, params, request, codec_options).await }
            }
        };
        let router = std::mem::take(&mut self.router);
        self.router = router.route(&full, on(filter, endpoint));
        Ok(())
    }

    pub fn get(&mut self, path: &str, handler: Handler) -> RestResult<()> {
        self.add_route(path, handler, &[Method::GET])
    }

    pub fn post(&mut self, path: &str, handler: Handler) -> RestResult<()> {
        self.add_route(path, handler, &[Method::POST])
    }

    pub fn put(&mut self, path: &str, handler: Handler) -> RestResult<()> {
        self.add_route(path, handler, &[Method::PUT])
    }

    pub fn delete(&mut self, path: &str, handler: Handler) -> RestResult<()> {
        self.add_route(path, handler, &[Method::DELETE])
    }

    /// Handler for requests matching no route (404).
    pub fn unhandled(&mut self, handler: Handler) {
        self.unhandled = Some(handler);
    }

    /// Handler for routes hit with an unregistered method (405).
    pub fn unsupported(&mut self, handler: Handler) {
        self.unsupported = Some(handler);
    }

    /// Global filter, applied to every request ahead of routing. Filters run
    /// in registration order.
    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Address actually bound, available after `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and serve in a background task. HTTPS when TLS is
    /// enabled and cert + key paths are both set.
    pub async fn start(&mut self) -> RestResult<()> {
        let codec_options = self.codec_options;
        let mut app = self.router.clone();

        app = match &self.unhandled {
            Some(handler) => {
                let handler = handler.clone();
                app.fallback(move |request: Request| {
                    let handler = handler.clone();
                    async move { run_handler(handler, HashMap::new(), request, codec_options).await }
                })
            }
            None => app.fallback(|| async { StatusCode::NOT_FOUND }),
        };
        app = match &self.unsupported {
            Some(handler) => {
                let handler = handler.clone();
                app.method_not_allowed_fallback(move |request: Request| {
                    let handler = handler.clone();
                    async move { run_handler(handler, HashMap::new(), request, codec_options).await }
                })
            }
            None => app.method_not_allowed_fallback(|| async { StatusCode::METHOD_NOT_ALLOWED }),
        };

        for filter in self.filters.iter().rev() {
            let filter = filter.clone();
            app = app.layer(middleware::from_fn(move |request: Request, next: Next| {
                let filter = filter.clone();
                async move { filter(request, next).await }
            }));
        }
        if let Some(cors) = self.config.cors.clone() {
            let filter = cors_filter(cors);
            app = app.layer(middleware::from_fn(move |request: Request, next: Next| {
                let filter = filter.clone();
                async move { filter(request, next).await }
            }));
        }
        let deadline = self.config.read_timeout + self.config.write_timeout;
        if deadline > 0 {
            let deadline = Duration::from_millis(deadline);
            app = app.layer(middleware::from_fn(move |request: Request, next: Next| {
                async move {
                    match tokio::time::timeout(deadline, next.run(request)).await {
                        Ok(response) => response,
                        Err(_) => StatusCode::GATEWAY_TIMEOUT.into_response(),
                    }
                }
            }));
        }

        let listener = std::net::TcpListener::bind((
            self.config.listen_host.as_str(),
            self.config.listen_port,
        ))?;
        listener.set_nonblocking(true)?;
        self.local_addr = Some(listener.local_addr()?);

        let handle = axum_server::Handle::new();
        self.handle = Some(handle.clone());
        let id = self.config.id.clone();
        let addr = self.local_addr;

        if self.config.enable_tls {
            let cert = self.config.cert_path.clone().unwrap_or_default();
            let key = self.config.private_key_path.clone().unwrap_or_default();
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
            let server = axum_server::from_tcp_rustls(listener, tls).handle(handle);
            tokio::spawn(async move {
                tracing::info!(id = %id, ?addr, "https server started");
                if let Err(err) = server.serve(app.into_make_service()).await {
                    tracing::error!(id = %id, error = %err, "server terminated");
                }
            });
        } else {
            let server = axum_server::from_tcp(listener).handle(handle);
            tokio::spawn(async move {
                tracing::info!(id = %id, ?addr, "http server started");
                if let Err(err) = server.serve(app.into_make_service()).await {
                    tracing::error!(id = %id, error = %err, "server terminated");
                }
            });
        }
        Ok(())
    }

    /// Gracefully drain in-flight requests and stop serving.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::info!(id = %self.config.id, "server stopping");
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    }
}

async fn run_handler(
    handler: Handler,
    params: HashMap<String, String>,
    request: Request,
    codec_options: CodecOptions,
) -> AxumResponse {
    let mut ctx = match ServerContext::new(request, params, codec_options).await {
        Ok(ctx) => ctx,
        Err(err) => return error_response(err),
    };
    match handler(&mut ctx).await {
        Ok(()) => ctx.into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: RestError) -> AxumResponse {
    let status = match err {
        RestError::Codec(_) | RestError::BodyRead(_) | RestError::UnsetPathParam(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

/// Join prefix and path with exactly one `/` between them.
fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => format!("/{prefix}"),
        (false, false) => format!("/{prefix}/{path}"),
    }
}

/// Rewrite `:name` template segments to the router's `{name}` captures.
fn normalize_captures(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_uses_single_separator() {
        assert_eq!(join_path("/api/", "/users"), "/api/users");
        assert_eq!(join_path("api", "users"), "/api/users");
        assert_eq!(join_path("", "users"), "/users");
        assert_eq!(join_path("api", ""), "/api");
    }

    #[test]
    fn template_segments_become_captures() {
        assert_eq!(
            normalize_captures("/api/:version/users/:id"),
            "/api/{version}/users/{id}"
        );
        assert_eq!(normalize_captures("/plain/path"), "/plain/path");
    }
}
