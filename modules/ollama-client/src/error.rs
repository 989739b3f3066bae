use thiserror::Error;

pub type Result<T> = std::result::Result<T, OllamaError>;

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("Cannot reach Ollama at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Ollama error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}
