//! Summary request pipeline
//!
//! One summarize request end to end: cooldown gate, window resolution,
//! retention fetch, empty/quota guards, transcript assembly, the external
//! summarizer call, and the reply text. Every path produces a reply; no
//! error crosses this boundary to the event loop.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use common::{window, ConversationKey, Record, RetentionStore, SummariaError, UsageGuard};

pub const REPLY_COOLDOWN: &str = "Easy there. Give me a few seconds between requests.";
pub const REPLY_NOTHING: &str = "Nothing to summarize in that window.";
pub const REPLY_NOTHING_AFTER_RESTART: &str =
    "Nothing to summarize in that window. (I restarted recently, so I may be missing older history.)";
pub const REPLY_QUOTA: &str = "I've hit my daily summary limit. It resets at midnight UTC.";
pub const REPLY_LLM_TIMEOUT: &str = "I tried, but the summary timed out. Give it another go in a bit.";
pub const REPLY_LLM_RATE_LIMITED: &str = "The summary service is swamped right now. Try again in a minute.";
pub const REPLY_LLM_FAILED: &str = "I tried, but that glitched. Try again later.";

/// Capability the pipeline delegates transcript summarization to.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<String, SummariaError>;
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum summaries per UTC day
    pub daily_limit: u32,
    /// Retention horizon, also the window ceiling, in minutes
    pub horizon_minutes: i64,
    /// How long after startup the empty reply discloses possible data loss
    pub startup_grace_minutes: i64,
    /// Defensive cap on assembled transcript size
    pub max_transcript_bytes: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            daily_limit: 100,
            horizon_minutes: 180,
            startup_grace_minutes: 90,
            max_transcript_bytes: 24_000,
        }
    }
}

/// Orchestrates summarize requests against the shared store and guard.
pub struct SummaryPipeline<S> {
    summarizer: S,
    settings: PipelineSettings,
    started_at: DateTime<Utc>,
}

impl<S: Summarize> SummaryPipeline<S> {
    pub fn new(summarizer: S, settings: PipelineSettings, started_at: DateTime<Utc>) -> Self {
        Self {
            summarizer,
            settings,
            started_at,
        }
    }

    /// Run one request. Always returns reply text.
    pub async fn run(
        &self,
        retention: &RetentionStore,
        guard: &mut UsageGuard,
        key: ConversationKey,
        actor_id: i64,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> String {
        if guard.check_cooldown(actor_id, now) {
            return REPLY_COOLDOWN.to_string();
        }

        let window_minutes = window::resolve(token, self.settings.horizon_minutes);
        let records = retention.query(key, window_minutes, now).await;

        if records.is_empty() {
            let grace = Duration::minutes(self.settings.startup_grace_minutes);
            return if now - self.started_at < grace {
                REPLY_NOTHING_AFTER_RESTART.to_string()
            } else {
                REPLY_NOTHING.to_string()
            };
        }

        if guard.daily_count(now) >= self.settings.daily_limit {
            info!("Daily summary limit reached, refusing request");
            return REPLY_QUOTA.to_string();
        }

        let transcript = build_transcript(&records, self.settings.max_transcript_bytes);
        info!(
            "Summarizing {} record(s) over {} minute(s) for chat {}",
            records.len(),
            window_minutes,
            key.chat_id
        );

        match self.summarizer.summarize(&transcript).await {
            Ok(summary) => {
                let count = guard.check_and_increment_daily(now, 1).await;
                info!("Summary produced, usage {}/{}", count, self.settings.daily_limit);
                summary.trim().to_string()
            }
            Err(e) => {
                error!("Summarizer failed: {}", e);
                match e {
                    SummariaError::LlmTimeout => REPLY_LLM_TIMEOUT.to_string(),
                    SummariaError::LlmRateLimited => REPLY_LLM_RATE_LIMITED.to_string(),
                    _ => REPLY_LLM_FAILED.to_string(),
                }
            }
        }
    }
}

/// Join records as `"{author}: {text}"` lines, oldest first. When the result
/// would exceed `max_bytes`, whole lines are dropped from the oldest end.
fn build_transcript(records: &[Record], max_bytes: usize) -> String {
    if records.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = records
        .iter()
        .map(|record| format!("{}: {}", record.author, record.text))
        .collect();

    let mut start = 0;
    let mut total: usize = lines.iter().map(|line| line.len() + 1).sum();
    while start < lines.len() - 1 && total > max_bytes {
        total -= lines[start].len() + 1;
        start += 1;
    }

    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubSummarizer {
        calls: AtomicUsize,
        transcripts: Mutex<Vec<String>>,
        outcome: Result<String, SummariaError>,
    }

    impl StubSummarizer {
        fn ok(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                transcripts: Mutex::new(Vec::new()),
                outcome: Ok(reply.to_string()),
            }
        }

        fn failing(error: SummariaError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                transcripts: Mutex::new(Vec::new()),
                outcome: Err(error),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Summarize for &StubSummarizer {
        async fn summarize(&self, transcript: &str) -> Result<String, SummariaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.transcripts.lock().unwrap().push(transcript.to_string());
            self.outcome.clone()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn pipeline<'a>(
        stub: &'a StubSummarizer,
        settings: PipelineSettings,
        started_at: DateTime<Utc>,
    ) -> SummaryPipeline<&'a StubSummarizer> {
        SummaryPipeline::new(stub, settings, started_at)
    }

    async fn seeded_store(key: ConversationKey) -> RetentionStore {
        let mut store = RetentionStore::new(180, 3);
        store
            .append(key, 1, Record::new(t0(), "Alice", "going to the gym"), t0())
            .await;
        let later = t0() + Duration::minutes(5);
        store
            .append(key, 2, Record::new(later, "Bob", "nice, which one"), later)
            .await;
        store
    }

    #[tokio::test]
    async fn summarizes_recent_records_verbatim() {
        let key = ConversationKey::root(1);
        let store = seeded_store(key).await;
        let mut guard = UsageGuard::new(30);
        let stub = StubSummarizer::ok("  they talked about the gym  ");
        // started long before the request: no restart disclosure in play
        let pipeline = pipeline(&stub, PipelineSettings::default(), t0() - Duration::hours(5));

        let now = t0() + Duration::minutes(10);
        let reply = pipeline.run(&store, &mut guard, key, 7, None, now).await;

        assert_eq!(reply, "they talked about the gym");
        assert_eq!(stub.calls(), 1);
        let transcripts = stub.transcripts.lock().unwrap();
        assert_eq!(
            transcripts[0],
            "Alice: going to the gym\nBob: nice, which one"
        );
        assert_eq!(guard.daily_count(now), 1);
    }

    #[tokio::test]
    async fn empty_window_replies_without_calling_the_summarizer() {
        let key = ConversationKey::root(1);
        let store = RetentionStore::new(180, 3);
        let mut guard = UsageGuard::new(30);
        let stub = StubSummarizer::ok("unused");
        let pipeline = pipeline(&stub, PipelineSettings::default(), t0() - Duration::hours(5));

        let reply = pipeline.run(&store, &mut guard, key, 7, None, t0()).await;

        assert_eq!(reply, REPLY_NOTHING);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn empty_window_discloses_recent_restart() {
        let key = ConversationKey::root(1);
        let store = RetentionStore::new(180, 3);
        let mut guard = UsageGuard::new(30);
        let stub = StubSummarizer::ok("unused");
        // started ten minutes before the request: inside the grace period
        let pipeline = pipeline(&stub, PipelineSettings::default(), t0() - Duration::minutes(10));

        let reply = pipeline.run(&store, &mut guard, key, 7, None, t0()).await;

        assert_eq!(reply, REPLY_NOTHING_AFTER_RESTART);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_quota_replies_without_calling_the_summarizer() {
        let key = ConversationKey::root(1);
        let store = seeded_store(key).await;
        let mut guard = UsageGuard::new(30);
        let now = t0() + Duration::minutes(10);
        let settings = PipelineSettings {
            daily_limit: 2,
            ..PipelineSettings::default()
        };
        for _ in 0..2 {
            guard.check_and_increment_daily(now, 1).await;
        }
        let stub = StubSummarizer::ok("unused");
        let pipeline = pipeline(&stub, settings, t0() - Duration::hours(5));

        let reply = pipeline.run(&store, &mut guard, key, 7, None, now).await;

        assert_eq!(reply, REPLY_QUOTA);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn summarizer_timeout_apologizes_and_does_not_consume_quota() {
        let key = ConversationKey::root(1);
        let store = seeded_store(key).await;
        let mut guard = UsageGuard::new(30);
        let stub = StubSummarizer::failing(SummariaError::LlmTimeout);
        let pipeline = pipeline(&stub, PipelineSettings::default(), t0() - Duration::hours(5));

        let now = t0() + Duration::minutes(10);
        let reply = pipeline.run(&store, &mut guard, key, 7, None, now).await;

        assert_eq!(reply, REPLY_LLM_TIMEOUT);
        assert_eq!(stub.calls(), 1);
        assert_eq!(guard.daily_count(now), 0);
    }

    #[tokio::test]
    async fn rapid_repeat_requests_hit_the_cooldown() {
        let key = ConversationKey::root(1);
        let store = seeded_store(key).await;
        let mut guard = UsageGuard::new(30);
        let stub = StubSummarizer::ok("summary");
        let pipeline = pipeline(&stub, PipelineSettings::default(), t0() - Duration::hours(5));

        let now = t0() + Duration::minutes(10);
        let first = pipeline.run(&store, &mut guard, key, 7, None, now).await;
        let second = pipeline
            .run(&store, &mut guard, key, 7, None, now + Duration::seconds(5))
            .await;

        assert_eq!(first, "summary");
        assert_eq!(second, REPLY_COOLDOWN);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn window_token_narrows_the_fetch() {
        let key = ConversationKey::root(1);
        let store = seeded_store(key).await;
        let mut guard = UsageGuard::new(30);
        let stub = StubSummarizer::ok("summary");
        let pipeline = pipeline(&stub, PipelineSettings::default(), t0() - Duration::hours(5));

        // 6 minutes back from t0+10m covers only Bob's message
        let now = t0() + Duration::minutes(10);
        pipeline.run(&store, &mut guard, key, 7, Some("6m"), now).await;

        let transcripts = stub.transcripts.lock().unwrap();
        assert_eq!(transcripts[0], "Bob: nice, which one");
    }

    #[test]
    fn transcript_cap_drops_oldest_lines_first() {
        let records: Vec<Record> = (0..10)
            .map(|i| Record::new(t0(), "A", format!("message number {i}")))
            .collect();

        let full = build_transcript(&records, 100_000);
        assert!(full.starts_with("A: message number 0"));

        let capped = build_transcript(&records, 60);
        assert!(capped.len() <= 60);
        assert!(capped.ends_with("A: message number 9"));
        assert!(!capped.contains("message number 0"));
    }

    #[test]
    fn transcript_cap_always_keeps_the_newest_line() {
        let records = vec![Record::new(t0(), "A", "x".repeat(500))];
        let transcript = build_transcript(&records, 10);
        assert!(transcript.contains(&"x".repeat(500)));
    }
}
