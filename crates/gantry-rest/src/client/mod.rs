//! Policy-driven HTTP client. A `Client` composes the transport with an
//! optional auth provider, retry policy and circuit breaker; each call is
//! built as a `Request` and run through `execute`.

mod request;
mod response;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gantry_codec::CodecOptions;
use http::Method;
use http::header::{CONTENT_TYPE, HeaderMap};
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthHandler, AuthProvider, AuthScheme, default_handlers};
use crate::breaker::CircuitBreaker;
use crate::error::{RestError, RestResult};
use crate::retry::RetryPolicy;

pub use request::{FilePart, Request};
pub use response::Response;

use request::{Payload, PreparedRequest};

const DEFAULT_MAX_IDLE_PER_HOST: usize = 20;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ClientBuilder {
    max_idle_per_host: usize,
    request_timeout: Duration,
    idle_timeout: Duration,
    connect_timeout: Duration,
    verify_ssl: bool,
    ca_cert_paths: Vec<PathBuf>,
    identity_pem_path: Option<PathBuf>,
    proxy_url: Option<String>,
    proxy_basic_auth: Option<(String, String)>,
    base_url: Option<String>,
    cookie_store: bool,
    auth: Option<Arc<dyn AuthProvider>>,
    retry: Option<RetryPolicy>,
    breaker: Option<Arc<CircuitBreaker>>,
    codec_options: CodecOptions,
    error_on_status: HashSet<u16>,
    auth_handlers: HashMap<AuthScheme, AuthHandler>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verify_ssl: true,
            ca_cert_paths: Vec::new(),
            identity_pem_path: None,
            proxy_url: None,
            proxy_basic_auth: None,
            base_url: None,
            cookie_store: false,
            auth: None,
            retry: None,
            breaker: None,
            codec_options: CodecOptions::default(),
            error_on_status: HashSet::new(),
            auth_handlers: default_handlers(),
        }
    }
}

impl ClientBuilder {
    pub fn max_idle_per_host(mut self, count: usize) -> Self {
        self.max_idle_per_host = count;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    /// Additional PEM root certificates trusted by the transport.
    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_paths.push(path.into());
        self
    }

    /// Client certificate + key (combined PEM) presented during TLS.
    pub fn identity_pem(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_pem_path = Some(path.into());
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn proxy_basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.proxy_basic_auth = Some((user.into(), pass.into()));
        self
    }

    /// Base joined to relative request URLs. The stored path always ends
    /// with `/` so joins produce exactly one separator.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.cookie_store = enabled;
        self
    }

    pub fn auth(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn codec_options(mut self, options: CodecOptions) -> Self {
        self.codec_options = options;
        self
    }

    /// Statuses escalated to errors for retry/circuit accounting.
    pub fn error_on_status(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.error_on_status.extend(statuses);
        self
    }

    /// Override the handler applied for one auth scheme.
    pub fn auth_handler(mut self, scheme: AuthScheme, handler: AuthHandler) -> Self {
        self.auth_handlers.insert(scheme, handler);
        self
    }

    pub fn build(self) -> RestResult<Client> {
        let base_url = match self.base_url {
            None => None,
            Some(raw) => {
                reqwest::Url::parse(&raw)
                    .map_err(|err| RestError::Config(format!("invalid base url {raw}: {err}")))?;
                Some(if raw.ends_with('/') {
                    raw
                } else {
                    format!("{raw}/")
                })
            }
        };

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout)
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout);
        if !self.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        for path in &self.ca_cert_paths {
            let pem = std::fs::read(path)?;
            for cert in reqwest::Certificate::from_pem_bundle(&pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(path) = &self.identity_pem_path {
            let pem = std::fs::read(path)?;
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }
        if let Some(url) = &self.proxy_url {
            let mut proxy = reqwest::Proxy::all(url)?;
            if let Some((user, pass)) = &self.proxy_basic_auth {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }
        if self.cookie_store {
            builder = builder.cookie_store(true);
        }

        Ok(Client {
            shared: Arc::new(ClientShared {
                http: builder.build()?,
                base_url,
                auth: self.auth,
                retry: self.retry,
                breaker: self.breaker,
                codec_options: self.codec_options,
                error_on_status: self.error_on_status,
                auth_handlers: self.auth_handlers,
            }),
        })
    }
}

struct ClientShared {
    http: reqwest::Client,
    base_url: Option<String>,
    auth: Option<Arc<dyn AuthProvider>>,
    retry: Option<RetryPolicy>,
    breaker: Option<Arc<CircuitBreaker>>,
    codec_options: CodecOptions,
    error_on_status: HashSet<u16>,
    auth_handlers: HashMap<AuthScheme, AuthHandler>,
}

/// Safe for concurrent use; clones share the transport pool and policies.
#[derive(Clone)]
pub struct Client {
    shared: Arc<ClientShared>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Start a request. Relative URLs (no scheme/host) are joined to the
    /// configured base URL.
    pub fn new_request(&self, url: &str, method: Method) -> RestResult<Request> {
        let target = if url.contains("://") {
            url.to_string()
        } else if let Some(base) = &self.shared.base_url {
            format!("{base}{}", url.trim_start_matches('/'))
        } else {
            return Err(RestError::InvalidUrl(format!(
                "relative url {url} without a base url"
            )));
        };
        Ok(Request::new(target, method, self.shared.codec_options))
    }

    pub fn get(&self, url: &str) -> RestResult<Request> {
        self.new_request(url, Method::GET)
    }

    pub fn post(&self, url: &str) -> RestResult<Request> {
        self.new_request(url, Method::POST)
    }

    pub fn put(&self, url: &str) -> RestResult<Request> {
        self.new_request(url, Method::PUT)
    }

    pub fn delete(&self, url: &str) -> RestResult<Request> {
        self.new_request(url, Method::DELETE)
    }

    /// Run the request through auth, the circuit breaker, the transport and
    /// the retry policy. Cancellation short-circuits both the transport call
    /// and any pending backoff wait.
    pub async fn execute(&self, request: Request) -> RestResult<Response> {
        let mut prepared = request.prepare().await?;
        self.apply_auth(&mut prepared.headers).await?;

        let cancel = prepared.cancel.clone();
        let mut attempt = 0usize;
        loop {
            let outcome = self.attempt(&prepared, &cancel).await;
            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let is_err = self.shared.error_on_status.contains(&status);
                    self.notify_breaker(!is_err);
                    if !is_err {
                        return Ok(Response::new(response));
                    }
                    if self.should_retry(attempt) {
                        tracing::debug!(status, attempt, "status escalated to error, retrying");
                        self.backoff(attempt, &cancel).await?;
                        attempt += 1;
                        continue;
                    }
                    return Ok(Response::new(response).flagged());
                }
                Err(err) if matches!(err, RestError::Transport(_)) => {
                    self.notify_breaker(false);
                    if self.should_retry(attempt) {
                        tracing::debug!(error = %err, attempt, "transport error, retrying");
                        self.backoff(attempt, &cancel).await?;
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
                // A cancelled or timed-out transport call was admitted by the
                // breaker, so its outcome must still be reported; it is never
                // retried.
                Err(err) if err.is_cancellation() => {
                    self.notify_breaker(false);
                    return Err(err);
                }
                // Circuit rejection and request-building failures abort
                // before a call is admitted.
                Err(err) => return Err(err),
            }
        }
    }

    async fn apply_auth(&self, headers: &mut HeaderMap) -> RestResult<()> {
        let Some(auth) = &self.shared.auth else {
            return Ok(());
        };
        let handler = self
            .shared
            .auth_handlers
            .get(&auth.scheme())
            .cloned()
            .ok_or(RestError::InvalidAuthScheme(auth.scheme()))?;
        handler(auth.as_ref(), headers).await
    }

    async fn attempt(
        &self,
        prepared: &PreparedRequest,
        cancel: &CancellationToken,
    ) -> RestResult<reqwest::Response> {
        let builder = self.to_transport(prepared).await?;
        if let Some(breaker) = &self.shared.breaker {
            breaker.can_execute()?;
        }
        let deadline = prepared.timeout;
        tokio::select! {
            _ = cancel.cancelled() => Err(RestError::Cancelled),
            result = builder.send() => result.map_err(|err| match deadline {
                // An explicit per-request deadline is a context error, not a
                // transport failure; it bypasses the retry policy.
                Some(timeout) if err.is_timeout() => RestError::TimedOut(timeout),
                _ => RestError::from(err),
            }),
        }
    }

    async fn to_transport(&self, prepared: &PreparedRequest) -> RestResult<reqwest::RequestBuilder> {
        let mut builder = self
            .shared
            .http
            .request(prepared.method.clone(), prepared.url.clone())
            .headers(prepared.headers.clone());
        if let Some(timeout) = prepared.timeout {
            builder = builder.timeout(timeout);
        }
        match &prepared.payload {
            Payload::Empty => {}
            Payload::Bytes { data, content_type } => {
                if let Some(mime) = content_type {
                    builder = builder.header(CONTENT_TYPE, mime);
                }
                builder = builder.body(data.clone());
            }
            Payload::Form(fields) => {
                builder = builder.form(fields);
            }
            Payload::Multipart { fields, files } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                for file in files {
                    let data = tokio::fs::read(&file.path).await?;
                    let file_name = file
                        .path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let mime = mime_guess::from_path(&file.path).first_or_octet_stream();
                    let part = reqwest::multipart::Part::bytes(data)
                        .file_name(file_name)
                        .mime_str(mime.essence_str())?;
                    form = form.part(file.field.clone(), part);
                }
                builder = builder.multipart(form);
            }
        }
        Ok(builder)
    }

    fn notify_breaker(&self, success: bool) {
        if let Some(breaker) = &self.shared.breaker {
            breaker.record(success);
        }
    }

    fn should_retry(&self, attempt: usize) -> bool {
        self.shared
            .retry
            .as_ref()
            .is_some_and(|policy| attempt < policy.max_retries())
    }

    /// Wait out the retry backoff, racing the request's cancellation token.
    async fn backoff(&self, attempt: usize, cancel: &CancellationToken) -> RestResult<()> {
        let Some(policy) = &self.shared.retry else {
            return Ok(());
        };
        let wait = policy.wait_time(attempt);
        tokio::select! {
            _ = cancel.cancelled() => Err(RestError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}
