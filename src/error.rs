use thiserror::Error;

/// Fatal errors surfaced at engine construction.
///
/// Nothing on the request path raises these; an engine that constructed
/// successfully degrades to live rendering on any later backend trouble.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cache configuration rejected: {message}")]
    Configuration { message: String },
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
