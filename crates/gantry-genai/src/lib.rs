//! Provider-agnostic GenAI core: the conversation data model (messages,
//! parts, exchanges), in-memory conversation history, prompt templates with
//! placeholder normalisation, the provider trait with sync and streaming
//! generation, and sessions with query contextualisation.
//!
//! This crate deliberately does not depend on any HTTP stack; concrete
//! providers (e.g. `gantry-openai`) perform the IO.

pub mod error;
pub mod exchange;
pub mod memory;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod session;

pub use error::{GenAiError, GenAiResult};
pub use exchange::Exchange;
pub use memory::{InMemory, Memory};
pub use message::{FunctionContent, Message, Part, PartData, Role};
pub use prompt::{PromptStore, PromptTemplate, normalize};
pub use provider::{
    Candidate, FinishReason, GenAiProvider, GenMetadata, GenOptions, GenResponse, GenStream,
    ProviderRegistry, global_registry, provider, register_provider,
};
pub use session::{CONTEXTUALISE_TEMPLATE, Session};
