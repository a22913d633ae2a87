//! Inbound update dispatcher
//!
//! One handler for every update: dedup by update id, store the record,
//! then evaluate exactly one reply predicate (command or direct mention).
//! Nothing in here may take the event loop down; transport and LLM errors
//! are logged and answered with canned text where a reply is owed.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use common::{ConversationKey, InboundMessage, RetentionStore, UsageGuard};

use crate::llm::SummariaLlm;
use crate::pipeline::{SummaryPipeline, REPLY_LLM_FAILED};
use crate::telegram::{Message, TelegramClient, Update};

const HELP_TEXT: &str = "/tldr [30m|2h|all] - summarize recent messages (up to 3h)\n\
/clearhistory - clear buffered history (owner only)\n\
/help - show this message\n\
Mention me or reply to me for a direct answer.";

const REPLY_CLEARED: &str = "Message history cleared.";
const REPLY_NOT_OWNER: &str = "Only the owner can clear history.";

/// How many processed update ids are remembered for dedup.
const SEEN_CAP: usize = 1024;

enum Command {
    Tldr(Option<String>),
    ClearHistory,
    Help,
    /// Any other slash command, including ones addressed to other bots.
    /// Never stored, never answered.
    Other,
}

pub struct Dispatcher {
    telegram: TelegramClient,
    llm: SummariaLlm,
    pipeline: SummaryPipeline<SummariaLlm>,
    retention: RetentionStore,
    guard: UsageGuard,
    bot_username: String,
    owner_id: i64,
    seen: SeenUpdates,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        telegram: TelegramClient,
        llm: SummariaLlm,
        pipeline: SummaryPipeline<SummariaLlm>,
        retention: RetentionStore,
        guard: UsageGuard,
        bot_username: String,
        owner_id: i64,
    ) -> Self {
        Self {
            telegram,
            llm,
            pipeline,
            retention,
            guard,
            bot_username,
            owner_id,
            seen: SeenUpdates::new(SEEN_CAP),
        }
    }

    /// Process one update. Re-delivery of an already-seen update id is a
    /// no-op, so a message is stored and answered at most once.
    pub async fn handle_update(&mut self, update: Update) {
        if !self.seen.insert(update.update_id) {
            debug!("Skipping duplicate update {}", update.update_id);
            return;
        }

        let Some(message) = update.message else {
            return;
        };
        let Some(from) = message.from.clone() else {
            return;
        };
        let Some(text) = message.text_or_caption().map(str::trim) else {
            return;
        };
        if text.is_empty() {
            return;
        }
        let text = text.to_string();

        let key = ConversationKey::new(message.chat.id, message.message_thread_id);
        let now = Utc::now();

        if let Some(command) = parse_command(&text, &self.bot_username) {
            match command {
                Command::Tldr(token) => {
                    let reply = self
                        .pipeline
                        .run(
                            &self.retention,
                            &mut self.guard,
                            key,
                            from.id,
                            token.as_deref(),
                            now,
                        )
                        .await;
                    self.reply(&message, &reply).await;
                }
                Command::ClearHistory => {
                    if self.owner_id != 0 && from.id == self.owner_id {
                        self.retention.clear(key);
                        info!("History cleared for chat {}", key.chat_id);
                        self.reply(&message, REPLY_CLEARED).await;
                    } else {
                        self.reply(&message, REPLY_NOT_OWNER).await;
                    }
                }
                Command::Help => {
                    self.reply(&message, HELP_TEXT).await;
                }
                Command::Other => {}
            }
            // Commands are never stored in the retention buffer.
            return;
        }

        // The four fields the core consumes, extracted from the envelope.
        let inbound = InboundMessage {
            key,
            author_id: from.id,
            author_name: from.first_name.clone(),
            text: text.clone(),
            arrived_at: DateTime::from_timestamp(message.date, 0).unwrap_or(now),
        };
        self.retention
            .append(inbound.key, inbound.author_id, inbound.to_record(), now)
            .await;

        if is_addressed(&message, &text, &self.bot_username) {
            if self.guard.check_cooldown(from.id, now) {
                debug!("Mention from {} suppressed by cooldown", from.id);
                return;
            }
            let prompt = strip_mention(&text, &self.bot_username);
            if prompt.is_empty() {
                let nudge = format!("I'm here, {} - say something.", from.first_name);
                self.reply(&message, &nudge).await;
                return;
            }
            let reply = match self.llm.persona_reply(&from.first_name, &prompt).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Persona reply failed: {}", e);
                    REPLY_LLM_FAILED.to_string()
                }
            };
            self.reply(&message, &reply).await;
        }
    }

    async fn reply(&self, message: &Message, text: &str) {
        if let Err(e) = self
            .telegram
            .send_message(
                message.chat.id,
                message.message_thread_id,
                Some(message.message_id),
                text,
            )
            .await
        {
            warn!("Reply to chat {} failed: {}", message.chat.id, e);
        }
    }
}

/// Bounded set of recently processed update ids.
struct SeenUpdates {
    set: HashSet<i64>,
    order: VecDeque<i64>,
    cap: usize,
}

impl SeenUpdates {
    fn new(cap: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    /// False when the id was already present.
    fn insert(&mut self, id: i64) -> bool {
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }
}

/// Parse a leading slash command, tolerating the `@BotName` suffix Telegram
/// appends in groups. Commands addressed to a different bot parse as
/// [`Command::Other`].
fn parse_command(text: &str, bot_username: &str) -> Option<Command> {
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.split_whitespace();
    let head = parts.next()?.trim_start_matches('/');
    let (name, suffix) = match head.split_once('@') {
        Some((name, suffix)) => (name, Some(suffix)),
        None => (head, None),
    };
    if let Some(suffix) = suffix {
        if !suffix.eq_ignore_ascii_case(bot_username) {
            return Some(Command::Other);
        }
    }
    let argument = parts.next().map(str::to_string);
    match name.to_ascii_lowercase().as_str() {
        "tldr" => Some(Command::Tldr(argument)),
        "clearhistory" => Some(Command::ClearHistory),
        "help" => Some(Command::Help),
        _ => Some(Command::Other),
    }
}

/// True when the message speaks to the bot: an `@mention` in the text, or a
/// reply to one of the bot's own messages.
fn is_addressed(message: &Message, text: &str, bot_username: &str) -> bool {
    if bot_username.is_empty() {
        return false;
    }
    let mention = format!("@{}", bot_username.to_ascii_lowercase());
    if text.to_ascii_lowercase().contains(&mention) {
        return true;
    }
    message
        .reply_to_message
        .as_deref()
        .and_then(|replied| replied.from.as_ref())
        .and_then(|from| from.username.as_deref())
        .is_some_and(|username| username.eq_ignore_ascii_case(bot_username))
}

/// The message text with the bot's `@mention` tokens removed.
fn strip_mention(text: &str, bot_username: &str) -> String {
    let mention = format!("@{}", bot_username.to_ascii_lowercase());
    text.split_whitespace()
        .filter(|token| token.to_ascii_lowercase() != mention)
        .collect::<Vec<_>>()
        .join(" ")
}
