//! LLM wrappers: transcript summaries and in-character replies

use async_trait::async_trait;

use common::{ChatMessage, LlmClient, SummariaError};

use crate::pipeline::Summarize;

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize Telegram group chats like a helpful \
assistant. No emojis or bullet points. Just plain text in the order things were said.";

const PERSONA_SYSTEM_PROMPT: &str = "You are Summaria, a group-chat assistant bot. You know \
you're a bot, but you talk like a regular. You're witty, helpful, and have great taste - a \
little glam, a little playful, but never mean. No need to introduce yourself. No \
third-person talk. Just be casual, warm, and in the loop.";

/// Role-specific wrapper over the shared [`LlmClient`].
#[derive(Debug, Clone)]
pub struct SummariaLlm {
    client: LlmClient,
}

impl SummariaLlm {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Reply in character to a user who mentioned the bot directly.
    pub async fn persona_reply(
        &self,
        user_name: &str,
        prompt: &str,
    ) -> Result<String, SummariaError> {
        let messages = vec![
            ChatMessage::system(PERSONA_SYSTEM_PROMPT),
            ChatMessage::user(format!("The user is {user_name}. {prompt}")),
        ];
        let reply = self.client.complete(messages, None, Some(300)).await?;
        Ok(reply.trim().to_string())
    }
}

#[async_trait]
impl Summarize for SummariaLlm {
    async fn summarize(&self, transcript: &str) -> Result<String, SummariaError> {
        let messages = vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!("Summarize this:\n{transcript}")),
        ];
        self.client.complete(messages, Some(0.3), None).await
    }
}
