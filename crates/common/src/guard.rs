//! Cooldown and daily-quota tracking for expensive operations

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::warn;

use crate::store::MessageLog;

/// Per-actor cooldowns plus the UTC-day usage counter.
///
/// Cooldowns live only in process memory and are lost on restart. The daily
/// counter is keyed on the current UTC date, so a new day implicitly starts
/// a fresh counter; when a durable log is attached the count is written
/// through best-effort and can be restored after a restart.
pub struct UsageGuard {
    cooldown: Duration,
    last_action: HashMap<i64, DateTime<Utc>>,
    today: NaiveDate,
    count: u32,
    log: Option<Arc<MessageLog>>,
}

impl UsageGuard {
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs.max(0)),
            last_action: HashMap::new(),
            today: NaiveDate::MIN,
            count: 0,
            log: None,
        }
    }

    /// Attach the durable log for counter write-through and restore.
    pub fn with_log(mut self, log: Arc<MessageLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Load today's count from the durable log, if one is attached.
    pub async fn restore(&mut self, now: DateTime<Utc>) {
        self.roll_over(now);
        if let Some(log) = &self.log {
            match log.daily_count(self.today).await {
                Ok(count) => self.count = count,
                Err(e) => warn!("Could not restore daily usage count: {}", e),
            }
        }
    }

    /// True when the actor acted within the cooldown window.
    ///
    /// Every check stamps `now` as the actor's last action, whatever the
    /// outcome, so calling this repeatedly in rapid succession keeps
    /// extending the block.
    pub fn check_cooldown(&mut self, actor_id: i64, now: DateTime<Utc>) -> bool {
        let blocked = self
            .last_action
            .get(&actor_id)
            .is_some_and(|last| now - *last < self.cooldown);
        self.last_action.insert(actor_id, now);
        blocked
    }

    /// Today's usage count without incrementing it.
    pub fn daily_count(&mut self, now: DateTime<Utc>) -> u32 {
        self.roll_over(now);
        self.count
    }

    /// Add `cost` to today's counter and return the new count. Write-through
    /// to the durable log is best-effort.
    pub async fn check_and_increment_daily(&mut self, now: DateTime<Utc>, cost: u32) -> u32 {
        self.roll_over(now);
        self.count += cost;
        if let Some(log) = &self.log {
            if let Err(e) = log.put_daily_count(self.today, self.count).await {
                warn!("Durable usage write skipped: {}", e);
            }
        }
        self.count
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        let date = now.date_naive();
        if date != self.today {
            self.today = date;
            self.count = 0;
        }
    }
}
