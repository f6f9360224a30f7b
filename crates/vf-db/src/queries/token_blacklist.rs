//! Refresh-token blacklist.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use vf_core::{Error, Result, UserId};

use crate::models::{format_timestamp, now_timestamp, BlacklistedToken};

/// Record a refresh token's `jti` as revoked until `expires_at`.
///
/// Blacklisting the same token twice is a no-op.
pub fn blacklist_token(
    conn: &Connection,
    jti: &str,
    user_id: UserId,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO token_blacklist (jti, user_id, expires_at, blacklisted_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![jti, user_id.get(), format_timestamp(expires_at), now_timestamp()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn is_blacklisted(conn: &Connection, jti: &str) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM token_blacklist WHERE jti = ?1",
        [jti],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

pub fn get_blacklisted(conn: &Connection, jti: &str) -> Result<Option<BlacklistedToken>> {
    match conn.query_row(
        "SELECT jti, user_id, expires_at, blacklisted_at FROM token_blacklist WHERE jti = ?1",
        [jti],
        BlacklistedToken::from_row,
    ) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Remove entries whose token would have expired anyway.
pub fn purge_expired(conn: &Connection) -> Result<usize> {
    conn.execute(
        "DELETE FROM token_blacklist WHERE expires_at < ?1",
        [now_timestamp()],
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::pool::init_memory_pool;
    use crate::queries::users::create_user;
    use chrono::Duration;

    #[test]
    fn blacklist_and_purge() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = create_user(
            &conn,
            &NewUser {
                email: "bl@example.com",
                password_hash: "h",
                ..Default::default()
            },
        )
        .unwrap();

        blacklist_token(&conn, "live", user.id, Utc::now() + Duration::hours(1)).unwrap();
        blacklist_token(&conn, "live", user.id, Utc::now() + Duration::hours(1)).unwrap();
        blacklist_token(&conn, "dead", user.id, Utc::now() - Duration::hours(1)).unwrap();

        assert!(is_blacklisted(&conn, "live").unwrap());
        assert!(is_blacklisted(&conn, "dead").unwrap());
        assert!(!is_blacklisted(&conn, "other").unwrap());
        assert_eq!(get_blacklisted(&conn, "live").unwrap().unwrap().user_id, user.id);

        assert_eq!(purge_expired(&conn).unwrap(), 1);
        assert!(!is_blacklisted(&conn, "dead").unwrap());
        assert!(is_blacklisted(&conn, "live").unwrap());
    }
}
