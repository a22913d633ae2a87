//! Two-tier retention of recent conversation text
//!
//! The in-memory tier is the source of truth while the process lives:
//! per-conversation buffers in arrival order, trimmed lazily to the
//! retention horizon on every append. The durable tier is consulted only
//! when a query finds the in-memory tier sparse. After a restart the
//! buffers start empty, and without the fallback every summarize request
//! would spuriously report "nothing to summarize".

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::event::{ConversationKey, Record};
use crate::store::MessageLog;

/// Below this many in-memory results a query also consults the durable tier.
pub const DEFAULT_FALLBACK_THRESHOLD: usize = 3;

/// Append-only, time-windowed store of records per conversation.
pub struct RetentionStore {
    buffers: HashMap<ConversationKey, VecDeque<Record>>,
    horizon: Duration,
    fallback_threshold: usize,
    log: Option<Arc<MessageLog>>,
}

impl RetentionStore {
    pub fn new(horizon_minutes: i64, fallback_threshold: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            horizon: Duration::minutes(horizon_minutes.max(1)),
            fallback_threshold,
            log: None,
        }
    }

    /// Attach the durable tier. Without it the store is memory-only.
    pub fn with_log(mut self, log: Arc<MessageLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Append one record and lazily evict expired records for the same key.
    ///
    /// The durable write is best-effort: a failure is logged and the append
    /// still counts as succeeded, since the record is in memory.
    pub async fn append(
        &mut self,
        key: ConversationKey,
        author_id: i64,
        record: Record,
        now: DateTime<Utc>,
    ) {
        self.evict_expired(key, now);
        self.buffers.entry(key).or_default().push_back(record.clone());

        if let Some(log) = &self.log {
            if let Err(e) = log.append(key, author_id, record).await {
                warn!("Durable append skipped for chat {}: {}", key.chat_id, e);
            }
        }
    }

    /// Drop in-memory records for `key` older than the retention horizon.
    pub fn evict_expired(&mut self, key: ConversationKey, now: DateTime<Utc>) {
        let cutoff = now - self.horizon;
        if let Some(buffer) = self.buffers.get_mut(&key) {
            buffer.retain(|record| record.timestamp > cutoff);
        }
    }

    /// Records for `key` newer than `now - window_minutes`, oldest first.
    ///
    /// The in-memory tier is consulted first; when it yields fewer than the
    /// fallback threshold, the durable tier is queried for the same key and
    /// window and the larger result set wins. Durable-tier failures degrade
    /// to the in-memory result, never to an error.
    pub async fn query(
        &self,
        key: ConversationKey,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Vec<Record> {
        let cutoff = now - Duration::minutes(window_minutes.max(1));
        let from_memory: Vec<Record> = self
            .buffers
            .get(&key)
            .map(|buffer| {
                buffer
                    .iter()
                    .filter(|record| record.timestamp > cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if from_memory.len() >= self.fallback_threshold {
            return from_memory;
        }

        let Some(log) = &self.log else {
            return from_memory;
        };

        match log.query_since(key, cutoff).await {
            Ok(from_log) if from_log.len() > from_memory.len() => {
                debug!(
                    "Durable fallback for chat {}: {} records vs {} in memory",
                    key.chat_id,
                    from_log.len(),
                    from_memory.len()
                );
                from_log
            }
            Ok(_) => from_memory,
            Err(e) => {
                warn!("Durable query failed for chat {}: {}", key.chat_id, e);
                from_memory
            }
        }
    }

    /// Forget the in-memory sequence for `key`. The durable tier keeps its
    /// rows; this is "forget going forward", not erasure.
    pub fn clear(&mut self, key: ConversationKey) {
        self.buffers.remove(&key);
    }
}
