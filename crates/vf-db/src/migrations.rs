//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use vf_core::{Error, Result};

/// V1: initial schema -- users, videos and indexes.
const V1_INITIAL: &str = r#"
CREATE TABLE users (
    id                           INTEGER PRIMARY KEY AUTOINCREMENT,
    email                        TEXT UNIQUE NOT NULL,
    username                     TEXT UNIQUE,
    password_hash                TEXT NOT NULL,
    is_active                    INTEGER NOT NULL DEFAULT 0,
    is_staff                     INTEGER NOT NULL DEFAULT 0,
    is_superuser                 INTEGER NOT NULL DEFAULT 0,
    activation_token             TEXT,
    activation_token_created     TEXT,
    password_reset_token         TEXT,
    password_reset_token_created TEXT,
    date_joined                  TEXT NOT NULL,
    last_login                   TEXT
);

CREATE TABLE videos (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    title         TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    category      TEXT NOT NULL DEFAULT 'other',
    thumbnail_url TEXT,
    thumbnail     TEXT,
    video_file    TEXT,
    video_url     TEXT,
    duration      INTEGER,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX idx_videos_created_at ON videos(created_at);
CREATE INDEX idx_videos_title      ON videos(title);
"#;

/// V2: background job queue.
const V2_JOBS: &str = r#"
CREATE TABLE jobs (
    id         TEXT PRIMARY KEY,
    queue      TEXT NOT NULL,
    queue_rank INTEGER NOT NULL,
    func_name  TEXT NOT NULL,
    payload    TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'queued',
    result     TEXT,
    error      TEXT,
    worker     TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    ended_at   TEXT
);

CREATE INDEX idx_jobs_status_rank ON jobs(status, queue_rank, created_at);
CREATE INDEX idx_jobs_queue       ON jobs(queue);
"#;

/// V3: refresh-token blacklist used by logout.
const V3_TOKEN_BLACKLIST: &str = r#"
CREATE TABLE token_blacklist (
    jti            TEXT PRIMARY KEY,
    user_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at     TEXT NOT NULL,
    blacklisted_at TEXT NOT NULL
);

CREATE INDEX idx_token_blacklist_expires ON token_blacklist(expires_at);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, V1_INITIAL),
    (2, V2_JOBS),
    (3, V3_TOKEN_BLACKLIST),
];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;

        tracing::debug!(version, "Applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn test_all_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();

        for t in ["users", "videos", "jobs", "token_blacklist", "schema_migrations"] {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [t],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "table {t} should exist");
        }
    }
}
