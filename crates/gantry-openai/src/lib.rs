//! OpenAI chat-completions provider for the GenAI layer: synchronous
//! generation and SSE streaming over the REST client.

mod convert;
mod provider;
mod sse;
mod wire;

pub use provider::{DEFAULT_BASE_URL, OpenAiConfig, OpenAiProvider, PROVIDER_NAME};
