//! SQL-based storage implementation for users and messages

use super::errors::{StoreError, StoreResult};
use super::model::{
    MessageBody, MessageFilter, NewMessage, ReceivedRequest, RequestStatus, RequestTransition,
    SentRequest, StoredMessage, UserRecord,
};
use super::traits::{MessageStore, UserStore};
use crate::types::{MessageId, Timestamp, UserId};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// SQLite store behind an r2d2 pool
#[derive(Clone)]
pub struct SqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlStore {
    /// Wrap an existing pool and run pending migrations
    pub fn new(pool: Pool<SqliteConnectionManager>) -> StoreResult<Self> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("create {}: {}", parent.display(), e)))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder().max_size(pool_size).build(manager)?;
        Self::new(pool)
    }

    /// Run a blocking closure against a pooled connection off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

/// SQLite integers are signed; refuse values that would not read back unchanged
fn sql_int(value: u64, field: &str) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::Backend(format!("{} {} exceeds the storable range", field, value)))
}

fn parse_status(s: String) -> StoreResult<RequestStatus> {
    RequestStatus::parse(&s).ok_or_else(|| StoreError::Backend(format!("unknown status {}", s)))
}

fn load_user(conn: &Connection, user_id: &UserId) -> StoreResult<Option<UserRecord>> {
    let base = conn
        .query_row(
            "SELECT name, picture FROM users WHERE user_id = ?",
            params![user_id.as_str()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()?;

    let Some((name, picture)) = base else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT friend_id FROM friends WHERE user_id = ?")?;
    let friends = stmt
        .query_map(params![user_id.as_str()], |row| row.get::<_, String>(0))?
        .map(|r| r.map(UserId))
        .collect::<Result<BTreeSet<_>, _>>()?;

    let mut stmt =
        conn.prepare("SELECT receiver_id, status FROM sent_requests WHERE user_id = ? ORDER BY seq")?;
    let sent = stmt
        .query_map(params![user_id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn
        .prepare("SELECT sender_id, status FROM received_requests WHERE user_id = ? ORDER BY seq")?;
    let received = stmt
        .query_map(params![user_id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut sent_requests = Vec::with_capacity(sent.len());
    for (to, status) in sent {
        sent_requests.push(SentRequest { to: UserId(to), status: parse_status(status)? });
    }
    let mut my_requests = Vec::with_capacity(received.len());
    for (from, status) in received {
        my_requests.push(ReceivedRequest { from: UserId(from), status: parse_status(status)? });
    }

    Ok(Some(UserRecord {
        user_id: user_id.clone(),
        name,
        picture,
        friends,
        sent_requests,
        my_requests,
    }))
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<(String, StoredMessage)> {
    let kind: String = row.get(4)?;
    let body = match kind.as_str() {
        "voice" => MessageBody::Voice {
            audio: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            duration: row.get::<_, Option<f64>>(7)?.unwrap_or_default(),
        },
        "file" => MessageBody::File {
            url: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            mime_type: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            file_name: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            size: row.get::<_, Option<i64>>(11)?.map(|s| s.max(0) as u64),
        },
        _ => MessageBody::Text { message: row.get::<_, Option<String>>(5)?.unwrap_or_default() },
    };

    let message = StoredMessage {
        id: MessageId(row.get(0)?),
        sender: UserId(row.get(1)?),
        receiver: UserId(row.get(2)?),
        timestamp: Timestamp::from_millis(row.get::<_, i64>(3)?.max(0) as u64),
        body,
        reply_to: row.get(12)?,
    };
    Ok((kind, message))
}

const MESSAGE_COLUMNS: &str = "id, sender, receiver, timestamp, kind, message, audio, duration, \
                               file, file_type, file_name, file_size, reply_to";

#[async_trait]
impl UserStore for SqlStore {
    async fn find_user(&self, user_id: &UserId) -> StoreResult<Option<UserRecord>> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| load_user(conn, &user_id)).await
    }

    async fn insert_user(&self, record: UserRecord) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO users (user_id, name, picture) VALUES (?, ?, ?)",
                params![record.user_id.as_str(), &record.name, &record.picture],
            )?;
            if inserted == 0 {
                return Err(StoreError::Conflict(format!("user {} already exists", record.user_id)));
            }

            for friend in &record.friends {
                tx.execute(
                    "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?, ?)",
                    params![record.user_id.as_str(), friend.as_str()],
                )?;
            }
            for sent in &record.sent_requests {
                tx.execute(
                    "INSERT INTO sent_requests (user_id, receiver_id, status) VALUES (?, ?, ?)",
                    params![record.user_id.as_str(), sent.to.as_str(), sent.status.as_str()],
                )?;
            }
            for received in &record.my_requests {
                tx.execute(
                    "INSERT INTO received_requests (user_id, sender_id, status) VALUES (?, ?, ?)",
                    params![record.user_id.as_str(), received.from.as_str(), received.status.as_str()],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn ensure_user(&self, user_id: &UserId, name: &str) -> StoreResult<UserRecord> {
        let user_id = user_id.clone();
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (user_id, name) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET name = excluded.name",
                params![user_id.as_str(), &name],
            )?;
            load_user(conn, &user_id)?
                .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
        })
        .await
    }

    async fn transition_request(&self, t: RequestTransition) -> StoreResult<()> {
        if t.sender == t.receiver {
            return Err(StoreError::Conflict("request pair must name two users".to_string()));
        }

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            for user in [&t.sender, &t.receiver] {
                let exists: Option<i64> = tx
                    .query_row("SELECT 1 FROM users WHERE user_id = ?", params![user.as_str()], |row| {
                        row.get(0)
                    })
                    .optional()?;
                if exists.is_none() {
                    return Err(StoreError::NotFound(format!("user {}", user)));
                }
            }

            let sent: Option<String> = tx
                .query_row(
                    "SELECT status FROM sent_requests WHERE user_id = ? AND receiver_id = ?",
                    params![t.sender.as_str(), t.receiver.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let received: Option<String> = tx
                .query_row(
                    "SELECT status FROM received_requests WHERE user_id = ? AND sender_id = ?",
                    params![t.receiver.as_str(), t.sender.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let sent = sent.map(parse_status).transpose()?;
            let received = received.map(parse_status).transpose()?;
            if sent != t.expected || received != t.expected {
                // dropping the transaction rolls back
                return Err(StoreError::Conflict(format!(
                    "request {} -> {}: expected {:?}, found sent={:?} received={:?}",
                    t.sender, t.receiver, t.expected, sent, received
                )));
            }

            tx.execute(
                "INSERT INTO sent_requests (user_id, receiver_id, status) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, receiver_id) DO UPDATE SET status = excluded.status",
                params![t.sender.as_str(), t.receiver.as_str(), t.next.as_str()],
            )?;
            tx.execute(
                "INSERT INTO received_requests (user_id, sender_id, status) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, sender_id) DO UPDATE SET status = excluded.status",
                params![t.receiver.as_str(), t.sender.as_str(), t.next.as_str()],
            )?;

            if t.befriend {
                tx.execute(
                    "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2), (?2, ?1)",
                    params![t.sender.as_str(), t.receiver.as_str()],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl MessageStore for SqlStore {
    async fn insert_message(&self, message: NewMessage) -> StoreResult<StoredMessage> {
        self.with_conn(move |conn| {
            let stored = message.into_stored(MessageId::generate());

            let (text, audio, duration, file, file_type, file_name, file_size) = match &stored.body {
                MessageBody::Text { message } => (Some(message), None, None, None, None, None, None),
                MessageBody::Voice { audio, duration } => {
                    (None, Some(audio), Some(*duration), None, None, None, None)
                }
                MessageBody::File { url, mime_type, file_name, size } => (
                    None,
                    None,
                    None,
                    Some(url),
                    Some(mime_type),
                    Some(file_name),
                    size.map(|s| sql_int(s, "file size")).transpose()?,
                ),
            };
            let timestamp = sql_int(stored.timestamp.as_millis(), "timestamp")?;

            conn.execute(
                &format!("INSERT INTO messages ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)", MESSAGE_COLUMNS),
                params![
                    &stored.id.0,
                    stored.sender.as_str(),
                    stored.receiver.as_str(),
                    timestamp,
                    stored.body.kind().as_str(),
                    text,
                    audio,
                    duration,
                    file,
                    file_type,
                    file_name,
                    file_size,
                    &stored.reply_to,
                ],
            )?;

            Ok(stored)
        })
        .await
    }

    async fn find_messages(&self, filter: &MessageFilter) -> StoreResult<Vec<StoredMessage>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let limit = filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)).unwrap_or(-1);
            let (a, b) = match &filter.conversation {
                Some((a, b)) => (Some(a.0.clone()), Some(b.0.clone())),
                None => (None, None),
            };

            // newest first so LIMIT keeps the most recent, then flipped
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages
                 WHERE ?1 IS NULL
                    OR (sender = ?1 AND receiver = ?2)
                    OR (sender = ?2 AND receiver = ?1)
                 ORDER BY timestamp DESC, seq DESC
                 LIMIT ?3",
                MESSAGE_COLUMNS
            ))?;
            let mut messages = stmt
                .query_map(params![a, b, limit], message_from_row)?
                .map(|r| r.map(|(_, m)| m))
                .collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }
}
