//! Shared LLM client utilities

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::SummariaError;

/// Attempts per request, counting the first one.
const MAX_ATTEMPTS: u32 = 3;

/// LLM client for OpenAI-compatible APIs
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

/// Chat message for LLM conversations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

/// Response choice
#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

/// Response message
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl LlmClient {
    /// Create a new LLM client. `timeout` bounds every request end to end.
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key,
            model,
            base_url,
        }
    }

    /// Send a chat completion request.
    ///
    /// Transient failures (timeout, HTTP 429, 5xx) are retried up to
    /// [`MAX_ATTEMPTS`] times with exponential backoff; whatever survives the
    /// retries is classified into the timeout / rate-limit / other taxonomy.
    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, SummariaError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = SummariaError::Llm("no attempts made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            debug!(
                "Sending LLM request with {} messages (attempt {}/{})",
                request.messages.len(),
                attempt,
                MAX_ATTEMPTS
            );

            match self.try_chat_completion(&url, &request).await {
                Ok(response) => return Ok(response),
                Err((e, retryable)) => {
                    if !retryable || attempt == MAX_ATTEMPTS {
                        error!("LLM request failed: {}", e);
                        return Err(e);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    warn!("LLM request failed ({}), retrying in {:?}", e, backoff);
                    last_error = e;
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        Err(last_error)
    }

    async fn try_chat_completion(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, (SummariaError, bool)> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    (SummariaError::LlmTimeout, true)
                } else {
                    (SummariaError::Llm(format!("HTTP request failed: {e}")), true)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return if status.as_u16() == 429 {
                Err((SummariaError::LlmRateLimited, true))
            } else if status.is_server_error() {
                Err((
                    SummariaError::Llm(format!("LLM API error: {status} - {body}")),
                    true,
                ))
            } else {
                Err((
                    SummariaError::Llm(format!("LLM API error: {status} - {body}")),
                    false,
                ))
            };
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| (SummariaError::Llm(format!("Failed to read response: {e}")), false))?;

        serde_json::from_str(&response_text)
            .map_err(|e| (SummariaError::Llm(format!("Failed to parse LLM response: {e}")), false))
    }

    /// Simple text completion: first choice's content, or an error.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, SummariaError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens,
        };

        let response = self.chat_completion(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| SummariaError::Llm("No response from LLM".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_omits_absent_options() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("temperature"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn response_parses_without_content() {
        let json = r#"{"choices":[{"message":{}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(response.choices[0].message.content.is_none());
    }
}
