use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::GenAiResult;
use crate::exchange::Exchange;
use crate::message::Message;

/// Why generation stopped, provider-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCall,
    ContentFilter,
    InProgress,
    Unknown,
    Error,
}

/// One alternative completion for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenMetadata {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenResponse {
    pub candidates: Vec<Candidate>,
    pub metadata: GenMetadata,
}

/// Per-call generation knobs, built fluently. The cancellation token is the
/// call's context: providers abort transport and streaming work when it
/// fires.
#[derive(Debug, Clone, Default)]
pub struct GenOptions {
    pub system_instruction: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub candidate_count: Option<u32>,
    pub stop_sequences: Vec<String>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub seed: Option<i64>,
    /// Requested output media type; JSON selects structured output modes on
    /// providers that support them.
    pub output_mime: Option<String>,
    /// Ask streaming responses to include token usage.
    pub stream_usage: bool,
    pub cancellation: CancellationToken,
}

impl GenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(text.into());
        self
    }

    pub fn temperature(mut self, value: f64) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn top_p(mut self, value: f64) -> Self {
        self.top_p = Some(value);
        self
    }

    pub fn candidate_count(mut self, count: u32) -> Self {
        self.candidate_count = Some(count);
        self
    }

    pub fn stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    pub fn max_tokens(mut self, count: u32) -> Self {
        self.max_tokens = Some(count);
        self
    }

    pub fn presence_penalty(mut self, value: f64) -> Self {
        self.presence_penalty = Some(value);
        self
    }

    pub fn frequency_penalty(mut self, value: f64) -> Self {
        self.frequency_penalty = Some(value);
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn output_mime(mut self, mime: impl Into<String>) -> Self {
        self.output_mime = Some(mime.into());
        self
    }

    pub fn stream_usage(mut self, enabled: bool) -> Self {
        self.stream_usage = enabled;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Streaming result: a producer/consumer channel pair owned by a single
/// provider task. Both channels close exactly once when the stream ends; on
/// failure a single error is emitted first.
pub struct GenStream {
    pub results: mpsc::Receiver<GenResponse>,
    pub errors: mpsc::Receiver<crate::error::GenAiError>,
}

/// Generative backend. `generate` is one synchronous completion;
/// `generate_stream` yields incremental responses over channels.
#[async_trait]
pub trait GenAiProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        model: &str,
        exchange: &Exchange,
        options: &GenOptions,
    ) -> GenAiResult<GenResponse>;

    async fn generate_stream(
        &self,
        model: &str,
        exchange: &Exchange,
        options: &GenOptions,
    ) -> GenStream;
}

/// Provider lookup by name. Construct explicitly and inject; a process-wide
/// default is available for convenience.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenAiProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn GenAiProvider>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> GenAiResult<Arc<dyn GenAiProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| crate::error::GenAiError::UnknownProvider(name.to_string()))
    }
}

static GLOBAL_REGISTRY: OnceLock<Mutex<ProviderRegistry>> = OnceLock::new();

/// Process-wide default registry.
pub fn global_registry() -> &'static Mutex<ProviderRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| Mutex::new(ProviderRegistry::new()))
}

/// Register a provider in the default registry.
pub fn register_provider(provider: Arc<dyn GenAiProvider>) {
    global_registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .register(provider);
}

/// Look up a provider in the default registry.
pub fn provider(name: &str) -> GenAiResult<Arc<dyn GenAiProvider>> {
    global_registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
}
