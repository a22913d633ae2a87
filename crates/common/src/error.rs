//! Error types for Summaria components

/// Common errors across Summaria components
#[derive(Debug, Clone)]
pub enum SummariaError {
    Telegram(String),
    Store(String),
    LlmTimeout,
    LlmRateLimited,
    Llm(String),
}

impl std::fmt::Display for SummariaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummariaError::Telegram(msg) => write!(f, "Telegram error: {}", msg),
            SummariaError::Store(msg) => write!(f, "Store error: {}", msg),
            SummariaError::LlmTimeout => write!(f, "LLM error: request timed out"),
            SummariaError::LlmRateLimited => write!(f, "LLM error: rate limited"),
            SummariaError::Llm(msg) => write!(f, "LLM error: {}", msg),
        }
    }
}

impl std::error::Error for SummariaError {}
