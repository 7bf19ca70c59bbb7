pub type GenAiResult<T> = Result<T, GenAiError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenAiError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("template {0} already exists")]
    DuplicateTemplate(String),
    #[error("template {0} not found")]
    TemplateNotFound(String),
    #[error("template parse failed: {0}")]
    TemplateParse(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    Provider(String),
}
