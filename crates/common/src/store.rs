//! SQLite durable tier for messages and the daily usage counter
//!
//! Writes are best-effort from the caller's point of view: the retention
//! store and the usage guard log a failure and carry on with their in-memory
//! state. Busy/locked errors are retried a bounded number of times with a
//! short sleep before giving up.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::warn;

use crate::error::SummariaError;
use crate::event::{ConversationKey, Record};

const BUSY_ATTEMPTS: u32 = 3;
const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// SQLite-backed log of messages per conversation, plus the per-day usage
/// counter. All calls run on the blocking pool; the connection is shared
/// behind a mutex.
pub struct MessageLog {
    conn: Arc<Mutex<Connection>>,
}

impl MessageLog {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &str) -> Result<Self, SummariaError> {
        let conn = Connection::open(path)
            .map_err(|e| SummariaError::Store(format!("SQLite open error: {e}")))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                chat_id     INTEGER NOT NULL,
                thread_id   INTEGER NOT NULL,
                author_id   INTEGER NOT NULL,
                author_name TEXT NOT NULL,
                text        TEXT NOT NULL,
                timestamp   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages (chat_id, thread_id, timestamp);
            CREATE TABLE IF NOT EXISTS daily_usage (
                date  TEXT PRIMARY KEY,
                count INTEGER NOT NULL
            );",
        )
        .map_err(|e| SummariaError::Store(format!("SQLite create table error: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, used by tests and as a last-resort fallback.
    pub fn in_memory() -> Result<Self, SummariaError> {
        Self::open(":memory:")
    }

    /// Append one record for `key`. Retries when SQLite reports the database
    /// busy or locked, then gives up with an error the caller may swallow.
    pub async fn append(
        &self,
        key: ConversationKey,
        author_id: i64,
        record: Record,
    ) -> Result<(), SummariaError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            with_busy_retry(|| {
                conn.execute(
                    "INSERT INTO messages (chat_id, thread_id, author_id, author_name, text, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        key.chat_id,
                        key.thread_id,
                        author_id,
                        record.author,
                        record.text,
                        record.timestamp.to_rfc3339(),
                    ],
                )
            })
            .map_err(|e| SummariaError::Store(format!("SQLite insert error: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| SummariaError::Store(format!("spawn_blocking error: {e}")))?
    }

    /// Records for `key` newer than `cutoff`, ordered oldest first.
    pub async fn query_since(
        &self,
        key: ConversationKey,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Record>, SummariaError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn
                .prepare(
                    "SELECT author_name, text, timestamp FROM messages
                     WHERE chat_id = ?1 AND thread_id = ?2 AND timestamp > ?3
                     ORDER BY timestamp ASC",
                )
                .map_err(|e| SummariaError::Store(format!("SQLite prepare error: {e}")))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![key.chat_id, key.thread_id, cutoff.to_rfc3339()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .map_err(|e| SummariaError::Store(format!("SQLite query error: {e}")))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| SummariaError::Store(format!("SQLite row error: {e}")))?;

            let mut records = Vec::with_capacity(rows.len());
            for (author, text, timestamp) in rows {
                // The durable tier may hold rows written by another process
                // clock; a row that does not parse is skipped, not fatal.
                match DateTime::parse_from_rfc3339(&timestamp) {
                    Ok(ts) => records.push(Record::new(ts.with_timezone(&Utc), author, text)),
                    Err(e) => warn!("Skipping message row with bad timestamp {timestamp:?}: {e}"),
                }
            }
            Ok(records)
        })
        .await
        .map_err(|e| SummariaError::Store(format!("spawn_blocking error: {e}")))?
    }

    /// The stored usage count for `date`, zero when absent.
    pub async fn daily_count(&self, date: NaiveDate) -> Result<u32, SummariaError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let result = conn
                .prepare("SELECT count FROM daily_usage WHERE date = ?1")
                .and_then(|mut stmt| {
                    stmt.query_row(rusqlite::params![date.to_string()], |row| {
                        row.get::<_, u32>(0)
                    })
                });
            match result {
                Ok(count) => Ok(count),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
                Err(e) => Err(SummariaError::Store(format!("SQLite query error: {e}"))),
            }
        })
        .await
        .map_err(|e| SummariaError::Store(format!("spawn_blocking error: {e}")))?
    }

    /// Write the usage count for `date`, replacing any previous value.
    pub async fn put_daily_count(&self, date: NaiveDate, count: u32) -> Result<(), SummariaError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            with_busy_retry(|| {
                conn.execute(
                    "INSERT OR REPLACE INTO daily_usage (date, count) VALUES (?1, ?2)",
                    rusqlite::params![date.to_string(), count],
                )
            })
            .map_err(|e| SummariaError::Store(format!("SQLite insert error: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| SummariaError::Store(format!("spawn_blocking error: {e}")))?
    }
}

fn lock(
    conn: &Arc<Mutex<Connection>>,
) -> Result<std::sync::MutexGuard<'_, Connection>, SummariaError> {
    conn.lock()
        .map_err(|e| SummariaError::Store(format!("lock error: {e}")))
}

/// Run a write, retrying a bounded number of times while SQLite reports the
/// database busy or locked.
fn with_busy_retry<T>(
    mut op: impl FnMut() -> Result<T, rusqlite::Error>,
) -> Result<T, rusqlite::Error> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(e) if is_busy(&e) && attempt < BUSY_ATTEMPTS => {
                attempt += 1;
                warn!("SQLite busy, retrying (attempt {attempt}/{BUSY_ATTEMPTS})");
                std::thread::sleep(BUSY_BACKOFF * attempt);
            }
            other => return other,
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn append_then_query_roundtrips_in_order() {
        let log = MessageLog::in_memory().unwrap();
        let key = ConversationKey::root(1);

        log.append(key, 10, Record::new(ts(0), "Alice", "first"))
            .await
            .unwrap();
        log.append(key, 11, Record::new(ts(5), "Bob", "second"))
            .await
            .unwrap();

        let records = log.query_since(key, ts(0) - chrono::Duration::minutes(1)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].author, "Alice");
        assert_eq!(records[1].text, "second");
    }

    #[tokio::test]
    async fn query_filters_by_cutoff_and_key() {
        let log = MessageLog::in_memory().unwrap();
        let key = ConversationKey::root(1);
        let other = ConversationKey::new(1, Some(9));

        log.append(key, 10, Record::new(ts(0), "Alice", "old"))
            .await
            .unwrap();
        log.append(key, 10, Record::new(ts(30), "Alice", "new"))
            .await
            .unwrap();
        log.append(other, 10, Record::new(ts(30), "Alice", "elsewhere"))
            .await
            .unwrap();

        let records = log.query_since(key, ts(10)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "new");
    }

    #[tokio::test]
    async fn daily_count_defaults_to_zero_and_replaces() {
        let log = MessageLog::in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert_eq!(log.daily_count(day).await.unwrap(), 0);
        log.put_daily_count(day, 3).await.unwrap();
        assert_eq!(log.daily_count(day).await.unwrap(), 3);
        log.put_daily_count(day, 4).await.unwrap();
        assert_eq!(log.daily_count(day).await.unwrap(), 4);

        let next = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert_eq!(log.daily_count(next).await.unwrap(), 0);
    }
}
