//! Minimal Telegram Bot API client
//!
//! Only the calls the bot needs: `getMe`, `getUpdates` long polling,
//! `sendMessage` (optionally into a topic thread, optionally as a reply),
//! and webhook registration. Everything else the platform offers is out of
//! scope; the dispatcher works off the four fields it extracts from an
//! update (conversation key, author, text, arrival time).

use serde::{Deserialize, Serialize};
use tracing::debug;

use common::SummariaError;

/// Telegram `Update` envelope. Non-message updates deserialize with
/// `message: None` and are ignored upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

/// The subset of Telegram's `Message` the bot consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    /// Unix timestamp, seconds
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// Text or caption, whichever the message carries.
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

/// Thin reqwest client over the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        // Long polls run up to getUpdates' own timeout; leave headroom.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(50))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: "https://api.telegram.org".to_string(),
            token,
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
    ) -> Result<T, SummariaError> {
        let response = self
            .client
            .post(self.url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| SummariaError::Telegram(format!("{method} request failed: {e}")))?;

        let api: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| SummariaError::Telegram(format!("{method} response parse failed: {e}")))?;

        if !api.ok {
            return Err(SummariaError::Telegram(format!(
                "{method} rejected: {}",
                api.description.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        api.result
            .ok_or_else(|| SummariaError::Telegram(format!("{method} returned no result")))
    }

    /// The bot's own identity; used for mention and command-suffix matching.
    pub async fn get_me(&self) -> Result<User, SummariaError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, SummariaError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;
        debug!("Received {} update(s)", updates.len());
        Ok(updates)
    }

    /// Deliver reply text to a conversation.
    pub async fn send_message(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), SummariaError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            message_thread_id: thread_id,
            reply_to_message_id: reply_to,
        };
        let _: Message = self.call("sendMessage", &request).await?;
        Ok(())
    }

    /// Point Telegram at our webhook endpoint.
    pub async fn set_webhook(&self, url: &str) -> Result<(), SummariaError> {
        let _: bool = self
            .call("setWebhook", &serde_json::json!({ "url": url }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_parses_with_topic_and_caption() {
        let json = r#"{
            "update_id": 42,
            "message": {
                "message_id": 7,
                "message_thread_id": 99,
                "from": {"id": 1, "first_name": "Alice", "username": "alice"},
                "chat": {"id": -100123},
                "date": 1714564800,
                "caption": "a photo caption"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.message_thread_id, Some(99));
        assert_eq!(message.text_or_caption(), Some("a photo caption"));
    }

    #[test]
    fn non_message_update_is_tolerated() {
        let json = r#"{"update_id": 43, "edited_message": {"message_id": 1}}"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn send_request_omits_absent_fields() {
        let request = SendMessageRequest {
            chat_id: 5,
            text: "hi",
            message_thread_id: None,
            reply_to_message_id: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("message_thread_id"));
        assert!(!json.contains("reply_to_message_id"));
    }
}
