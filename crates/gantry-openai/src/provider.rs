use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use gantry_genai::{
    Exchange, GenAiError, GenAiProvider, GenAiResult, GenOptions, GenResponse, GenStream,
};
use gantry_rest::{
    BearerAuth, CancellationToken, CircuitBreaker, Client, Method, Request, RestError, RetryPolicy,
};

use crate::convert;
use crate::sse::SseDecoder;
use crate::wire::{ChatChunk, ChatRequest, ErrorEnvelope};

pub const PROVIDER_NAME: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const ORG_HEADER: &str = "OpenAI-Organization";
const STREAM_DONE: &str = "[DONE]";

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub org_id: Option<String>,
    pub extra_headers: HashMap<String, String>,
    pub retry: Option<RetryPolicy>,
    pub circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            org_id: None,
            extra_headers: HashMap::new(),
            retry: None,
            circuit_breaker: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }
}

/// Chat-completions provider. Transport, auth, retry and circuit breaking
/// all go through the REST client; the Authorization header comes from the
/// client's bearer auth provider.
pub struct OpenAiProvider {
    http: Client,
    org_id: Option<String>,
    extra_headers: HashMap<String, String>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> GenAiResult<Self> {
        let mut builder = Client::builder()
            .base_url(config.base_url)
            .auth(Arc::new(BearerAuth::new(config.api_key)));
        if let Some(policy) = config.retry {
            builder = builder.retry(policy);
        }
        if let Some(breaker) = config.circuit_breaker {
            builder = builder.circuit_breaker(breaker);
        }
        let http = builder.build().map_err(map_rest_error)?;
        Ok(Self {
            http,
            org_id: config.org_id,
            extra_headers: config.extra_headers,
        })
    }

    fn chat_request(
        &self,
        wire: &ChatRequest,
        cancel: CancellationToken,
    ) -> GenAiResult<Request> {
        let mut request = self
            .http
            .new_request(CHAT_COMPLETIONS_PATH, Method::POST)
            .map_err(map_rest_error)?
            .cancellation(cancel)
            .body(wire)
            .map_err(map_rest_error)?;
        if let Some(org_id) = &self.org_id {
            request = request.header(ORG_HEADER, org_id.clone());
        }
        for (name, value) in &self.extra_headers {
            request = request.header(name.clone(), value.clone());
        }
        Ok(request)
    }
}

#[async_trait]
impl GenAiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate(
        &self,
        model: &str,
        exchange: &Exchange,
        options: &GenOptions,
    ) -> GenAiResult<GenResponse> {
        let wire = convert::chat_request(model, exchange, options, false);
        let request = self.chat_request(&wire, options.cancellation.clone())?;
        let response = self.http.execute(request).await.map_err(map_rest_error)?;

        let status = response.status();
        if !response.is_success() {
            let body = response.bytes().await.map_err(map_rest_error)?;
            return Err(api_error(status, &body));
        }
        let wire_response = response.decode().await.map_err(map_rest_error)?;
        Ok(convert::to_gen_response(wire_response))
    }

    async fn generate_stream(
        &self,
        model: &str,
        exchange: &Exchange,
        options: &GenOptions,
    ) -> GenStream {
        let (results_tx, results) = mpsc::channel(16);
        let (errors_tx, errors) = mpsc::channel(1);

        let wire = convert::chat_request(model, exchange, options, true);
        let request = self.chat_request(&wire, options.cancellation.clone());
        let http = self.http.clone();
        let cancel = options.cancellation.clone();

        tokio::spawn(async move {
            let outcome = match request {
                Ok(request) => stream_chunks(http, request, cancel, results_tx).await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                tracing::warn!(error = %err, "chat completions stream aborted");
                let _ = errors_tx.send(err).await;
            }
        });

        GenStream { results, errors }
    }
}

/// Owns the results sender for the lifetime of the stream: returning drops
/// it, closing the channel exactly once. Errors are handed to the caller.
async fn stream_chunks(
    http: Client,
    request: Request,
    cancel: CancellationToken,
    results: mpsc::Sender<GenResponse>,
) -> GenAiResult<()> {
    let response = http.execute(request).await.map_err(map_rest_error)?;
    let status = response.status();
    if !response.is_success() {
        let body = response.bytes().await.map_err(map_rest_error)?;
        return Err(api_error(status, &body));
    }

    let mut raw = response.into_inner();
    let mut decoder = SseDecoder::new();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(GenAiError::Cancelled),
            next = raw.chunk() => next,
        };
        let chunk = next.map_err(|err| GenAiError::Provider(err.to_string()))?;
        let Some(chunk) = chunk else {
            // Body ended without a [DONE] frame; treat as a clean close.
            return Ok(());
        };

        for payload in decoder.push_bytes(&chunk) {
            if payload == STREAM_DONE {
                return Ok(());
            }
            let parsed: ChatChunk = serde_json::from_str(&payload)
                .map_err(|err| GenAiError::Provider(format!("invalid stream chunk: {err}")))?;
            if results.send(convert::chunk_to_response(parsed)).await.is_err() {
                // Receiver went away; stop reading.
                return Ok(());
            }
        }
    }
}

fn map_rest_error(err: RestError) -> GenAiError {
    match err {
        RestError::Cancelled => GenAiError::Cancelled,
        other => GenAiError::Provider(other.to_string()),
    }
}

fn api_error(status: u16, body: &[u8]) -> GenAiError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => GenAiError::Provider(format!(
            "openai API error [{}]: {}",
            envelope.error.kind.as_deref().unwrap_or("unknown"),
            envelope.error.message
        )),
        Err(_) => GenAiError::Provider(format!("status {status}")),
    }
}
