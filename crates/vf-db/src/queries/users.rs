//! User account operations.

use rusqlite::Connection;
use uuid::Uuid;
use vf_core::{Error, Result, UserId};

use crate::models::{now_timestamp, NewUser, User};

const COLS: &str = "id, email, username, password_hash, is_active, is_staff, is_superuser,
    activation_token, activation_token_created, password_reset_token,
    password_reset_token_created, date_joined, last_login";

/// Lower-case the domain part of an email address and trim whitespace.
///
/// The local part is left untouched since some mail systems treat it
/// case-sensitively.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Insert a new user. The email is normalized before storing.
pub fn create_user(conn: &Connection, new: &NewUser<'_>) -> Result<User> {
    let email = normalize_email(new.email);
    let now = now_timestamp();

    conn.execute(
        "INSERT INTO users (email, username, password_hash, is_active, is_staff, is_superuser, date_joined)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            email,
            new.username,
            new.password_hash,
            new.is_active,
            new.is_staff,
            new.is_superuser,
            now
        ],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            Error::Conflict(format!("User with email '{email}' already exists"))
        } else {
            Error::database(e.to_string())
        }
    })?;

    let id = UserId::from(conn.last_insert_rowid());
    get_user_by_id(conn, id)?.ok_or_else(|| Error::not_found("user", id))
}

/// Get a user by primary key.
pub fn get_user_by_id(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let q = format!("SELECT {COLS} FROM users WHERE id = ?1");
    match conn.query_row(&q, [id.get()], User::from_row) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a user by (normalized) email address.
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let q = format!("SELECT {COLS} FROM users WHERE email = ?1");
    match conn.query_row(&q, [normalize_email(email)], User::from_row) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        [normalize_email(email)],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

pub fn username_exists(conn: &Connection, username: &str) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        [username],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Return `base` if no user has it yet, otherwise the first free
/// `base1`, `base2`, ...
pub fn unique_username(conn: &Connection, base: &str) -> Result<String> {
    if !username_exists(conn, base)? {
        return Ok(base.to_string());
    }
    let mut counter = 1u32;
    loop {
        let candidate = format!("{base}{counter}");
        if !username_exists(conn, &candidate)? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Store a fresh activation token and return it.
pub fn generate_activation_token(conn: &Connection, id: UserId) -> Result<Uuid> {
    let token = Uuid::new_v4();
    let n = conn
        .execute(
            "UPDATE users SET activation_token = ?1, activation_token_created = ?2 WHERE id = ?3",
            rusqlite::params![token.to_string(), now_timestamp(), id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if n == 0 {
        return Err(Error::not_found("user", id));
    }
    Ok(token)
}

/// Mark the account active and clear its activation token.
pub fn activate_user(conn: &Connection, id: UserId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE users SET is_active = 1, activation_token = NULL, activation_token_created = NULL
             WHERE id = ?1",
            [id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Store a fresh password-reset token and return it.
pub fn generate_password_reset_token(conn: &Connection, id: UserId) -> Result<Uuid> {
    let token = Uuid::new_v4();
    let n = conn
        .execute(
            "UPDATE users SET password_reset_token = ?1, password_reset_token_created = ?2
             WHERE id = ?3",
            rusqlite::params![token.to_string(), now_timestamp(), id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if n == 0 {
        return Err(Error::not_found("user", id));
    }
    Ok(token)
}

pub fn clear_password_reset_token(conn: &Connection, id: UserId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE users SET password_reset_token = NULL, password_reset_token_created = NULL
             WHERE id = ?1",
            [id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Replace the password hash and clear any pending reset token.
pub fn reset_password(conn: &Connection, id: UserId, password_hash: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE users SET password_hash = ?1,
                password_reset_token = NULL, password_reset_token_created = NULL
             WHERE id = ?2",
            rusqlite::params![password_hash, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Update a user's password hash.
pub fn update_password(conn: &Connection, id: UserId, password_hash: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            rusqlite::params![password_hash, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn touch_last_login(conn: &Connection, id: UserId) -> Result<()> {
    conn.execute(
        "UPDATE users SET last_login = ?1 WHERE id = ?2",
        rusqlite::params![now_timestamp(), id.get()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Promote an existing account to an active staff superuser.
pub fn promote_superuser(conn: &Connection, id: UserId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE users SET is_active = 1, is_staff = 1, is_superuser = 1 WHERE id = ?1",
            [id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
