use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::GenAiResult;
use crate::exchange::Exchange;
use crate::memory::Memory;
use crate::message::{Message, Role};
use crate::prompt::PromptTemplate;
use crate::provider::{GenAiProvider, GenOptions};

/// Template used to rewrite a follow-up question against prior ones.
/// Expects `PreviousQuestions` (list) and `CurrentQuestion`.
pub const CONTEXTUALISE_TEMPLATE: &str = "\
Given these previous questions from the user:
{{PreviousQuestions}}

Rewrite the question below so it can be understood on its own. Reply with
only the rewritten question, nothing else.

{{CurrentQuestion}}";

const PARAM_PREVIOUS_QUESTIONS: &str = "PreviousQuestions";
const PARAM_CURRENT_QUESTION: &str = "CurrentQuestion";

/// Binds a provider, a contextualisation model and a memory under one
/// session id.
pub struct Session {
    id: String,
    ctx_model: String,
    provider: Arc<dyn GenAiProvider>,
    memory: Box<dyn Memory>,
    ctx_template: PromptTemplate,
    ctx_options: GenOptions,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        ctx_model: impl Into<String>,
        provider: Arc<dyn GenAiProvider>,
        memory: Box<dyn Memory>,
    ) -> Self {
        Self {
            id: id.into(),
            ctx_model: ctx_model.into(),
            provider,
            memory,
            ctx_template: PromptTemplate::new("contextualise", CONTEXTUALISE_TEMPLATE),
            ctx_options: GenOptions::new(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.ctx_template = template;
        self
    }

    pub fn with_options(mut self, options: GenOptions) -> Self {
        self.ctx_options = options;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> &Arc<dyn GenAiProvider> {
        &self.provider
    }

    pub fn memory(&mut self) -> &mut dyn Memory {
        self.memory.as_mut()
    }

    /// Rewrite `text` as a standalone question using the last `n` exchanges
    /// of this session. Falls back to the original text when there is no
    /// usable history or the model yields no assistant reply.
    pub async fn contextualise(&mut self, text: &str, n: isize) -> GenAiResult<String> {
        let history = self.memory.last(&self.id, n);
        if history.is_empty() {
            return Ok(text.to_string());
        }

        let previous: Vec<Value> = history
            .iter()
            .flat_map(|exchange| exchange.texts_by_role(Role::User))
            .map(Value::String)
            .collect();
        if previous.is_empty() {
            return Ok(text.to_string());
        }

        let mut params = HashMap::new();
        params.insert(
            PARAM_PREVIOUS_QUESTIONS.to_string(),
            Value::Array(previous),
        );
        params.insert(
            PARAM_CURRENT_QUESTION.to_string(),
            Value::String(text.to_string()),
        );
        let prompt = self.ctx_template.format(&params)?;

        let mut exchange = Exchange::new();
        exchange.append(Message::user_text(prompt));
        let response = self
            .provider
            .generate(&self.ctx_model, &exchange, &self.ctx_options)
            .await?;
        if let Some(candidate) = response.candidates.first() {
            exchange.append(candidate.message.clone());
        }

        match exchange.last() {
            Some(message) if message.role == Role::Assistant => match message.text() {
                Some(rewritten) if !rewritten.trim().is_empty() => {
                    tracing::debug!(session = %self.id, "contextualised question");
                    Ok(rewritten.trim().to_string())
                }
                _ => Ok(text.to_string()),
            },
            _ => Ok(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::GenAiError;
    use crate::memory::InMemory;
    use crate::provider::{Candidate, FinishReason, GenMetadata, GenResponse, GenStream};

    struct ScriptedProvider {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(reply: Option<&str>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenAiProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _model: &str,
            exchange: &Exchange,
            _options: &GenOptions,
        ) -> Result<GenResponse, GenAiError> {
            let prompt = exchange.last().and_then(Message::text).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            let candidates = match &self.reply {
                Some(reply) => vec![Candidate {
                    index: 0,
                    message: Message::assistant_text(reply.clone()),
                    finish_reason: FinishReason::Stop,
                }],
                None => Vec::new(),
            };
            Ok(GenResponse {
                candidates,
                metadata: GenMetadata::default(),
            })
        }

        async fn generate_stream(
            &self,
            _model: &str,
            _exchange: &Exchange,
            _options: &GenOptions,
        ) -> GenStream {
            let (_results_tx, results) = tokio::sync::mpsc::channel(1);
            let (_errors_tx, errors) = tokio::sync::mpsc::channel(1);
            GenStream { results, errors }
        }
    }

    fn seeded_session(provider: Arc<ScriptedProvider>) -> Session {
        let mut memory = InMemory::new();
        let mut exchange = Exchange::new();
        exchange.append(Message::user_text("What is a circuit breaker?"));
        exchange.append(Message::assistant_text("A failure-isolation state machine."));
        memory.add("s1", exchange);
        Session::new("s1", "ctx-model", provider, Box::new(memory))
    }

    #[tokio::test]
    async fn contextualise_uses_the_model_reply() {
        let provider = Arc::new(ScriptedProvider::new(Some(
            "How does a circuit breaker recover from open state?",
        )));
        let mut session = seeded_session(provider.clone());

        let rewritten = session.contextualise("How does it recover?", 5).await.unwrap();
        assert_eq!(
            rewritten,
            "How does a circuit breaker recover from open state?"
        );

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("What is a circuit breaker?"));
        assert!(prompts[0].contains("How does it recover?"));
    }

    #[tokio::test]
    async fn empty_history_returns_original_text() {
        let provider = Arc::new(ScriptedProvider::new(Some("unused")));
        let memory = InMemory::new();
        let mut session = Session::new("fresh", "ctx-model", provider.clone(), Box::new(memory));

        let rewritten = session.contextualise("Hello there", 5).await.unwrap();
        assert_eq!(rewritten, "Hello there");
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_assistant_reply_falls_back_to_original() {
        let provider = Arc::new(ScriptedProvider::new(None));
        let mut session = seeded_session(provider);

        let rewritten = session.contextualise("How does it recover?", 5).await.unwrap();
        assert_eq!(rewritten, "How does it recover?");
    }
}
