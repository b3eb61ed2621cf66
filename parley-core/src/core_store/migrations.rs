//! Database migrations for the relay store
//!
//! Provides versioned migrations for the user and message schema.
//! Each migration is applied atomically and tracked in the schema_version table.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Users, mirrored friend requests, and messages",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                picture TEXT
            );

            -- Symmetric relation, one row per direction
            CREATE TABLE IF NOT EXISTS friends (
                user_id TEXT NOT NULL,
                friend_id TEXT NOT NULL,
                PRIMARY KEY (user_id, friend_id),
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
            );

            -- Sender-side half of a request (sentRequests)
            CREATE TABLE IF NOT EXISTS sent_requests (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('request', 'accept', 'decline')),
                UNIQUE (user_id, receiver_id),
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
            );

            -- Receiver-side half of a request (myRequests)
            CREATE TABLE IF NOT EXISTS received_requests (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('request', 'accept', 'decline')),
                UNIQUE (user_id, sender_id),
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                receiver TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('text', 'voice', 'file')),
                message TEXT,
                audio TEXT,
                duration REAL,
                file TEXT,
                file_type TEXT,
                file_name TEXT,
                file_size INTEGER,
                reply_to TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(sender, receiver, timestamp);
        "#,
    }]
}

fn pool_error(e: r2d2::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Failed to get connection: {}", e),
    )))
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, rusqlite::Error> {
    let conn = pool.get().map_err(pool_error)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Result<i32, _> = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), rusqlite::Error> {
    let current_version = get_current_version(pool)?;
    let pending: Vec<_> =
        get_migrations().into_iter().filter(|m| m.version > current_version).collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get().map_err(pool_error)?;

    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applied store migration"
        );
    }

    Ok(())
}

/// Read the applied schema version
pub fn current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, rusqlite::Error> {
    get_current_version(pool)
}
