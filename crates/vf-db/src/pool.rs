//! SQLite connection pool.
//!
//! HTTP handlers and queue workers write to the same database at the same
//! time, so every pooled connection gets a busy timeout and foreign keys, and
//! file databases run in WAL mode. Opening a pool also migrates the schema.

use std::path::Path;
use std::time::Duration;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use uuid::Uuid;
use vf_core::{Error, Result};

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_POOL_SIZE: u32 = 8;
const MEMORY_POOL_SIZE: u32 = 4;

/// Applied to each connection as r2d2 opens it.
#[derive(Debug, Clone, Copy)]
struct ConnectionSetup {
    wal: bool,
}

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionSetup {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        if self.wal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            if !mode.eq_ignore_ascii_case("wal") {
                tracing::warn!(%mode, "SQLite refused WAL journal mode");
            }
        }
        Ok(())
    }
}

fn build(manager: SqliteConnectionManager, size: u32, setup: ConnectionSetup) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(size)
        .connection_customizer(Box::new(setup))
        .build(manager)
        .map_err(|e| Error::database(format!("cannot open database pool: {e}")))?;

    migrations::run_migrations(&*get_conn(&pool)?)?;
    Ok(pool)
}

/// Open (creating if needed) the database file at `db_path`.
///
/// Missing parent directories are created, so a fresh `media/` or `data/`
/// layout works without a setup step.
pub fn init_pool(db_path: impl AsRef<Path>) -> Result<DbPool> {
    let db_path = db_path.as_ref();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %db_path.display(), "Opening database");
    build(
        SqliteConnectionManager::file(db_path),
        FILE_POOL_SIZE,
        ConnectionSetup { wal: true },
    )
}

/// A private in-memory database shared by every connection of the returned
/// pool and invisible to any other pool.
pub fn init_memory_pool() -> Result<DbPool> {
    let uri = format!("file:videoflix-{}?mode=memory&cache=shared", Uuid::new_v4().simple());
    build(
        SqliteConnectionManager::file(uri),
        MEMORY_POOL_SIZE,
        ConnectionSetup { wal: false },
    )
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("no database connection available: {e}")))
}
