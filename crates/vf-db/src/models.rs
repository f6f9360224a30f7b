//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. Column order must match the `COLS` constant of the
//! corresponding query module.

use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use uuid::Uuid;
use vf_core::{Category, JobId, JobStatus, QueueName, UserId, VideoId};

/// Activation links stay valid for a day.
pub const ACTIVATION_TOKEN_LIFETIME_HOURS: i64 = 24;

/// Password-reset links stay valid for an hour.
pub const RESET_TOKEN_LIFETIME_HOURS: i64 = 1;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Current time as a fixed-width RFC 3339 string, so that text ordering in
/// SQL matches chronological ordering.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_err(idx, e))
}

fn parse_opt_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|v| Uuid::parse_str(&v).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

/// `true` when `created` is missing, unparseable, or older than `hours`.
fn token_expired(created: Option<&str>, hours: i64, now: DateTime<Utc>) -> bool {
    match created.and_then(parse_timestamp) {
        Some(ts) => now > ts + Duration::hours(hours),
        None => true,
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub activation_token: Option<Uuid>,
    pub activation_token_created: Option<String>,
    pub password_reset_token: Option<Uuid>,
    pub password_reset_token_created: Option<String>,
    pub date_joined: String,
    pub last_login: Option<String>,
}

impl User {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: UserId::from(row.get::<_, i64>(0)?),
            email: row.get(1)?,
            username: row.get(2)?,
            password_hash: row.get(3)?,
            is_active: row.get(4)?,
            is_staff: row.get(5)?,
            is_superuser: row.get(6)?,
            activation_token: parse_opt_uuid(row, 7)?,
            activation_token_created: row.get(8)?,
            password_reset_token: parse_opt_uuid(row, 9)?,
            password_reset_token_created: row.get(10)?,
            date_joined: row.get(11)?,
            last_login: row.get(12)?,
        })
    }

    pub fn is_activation_token_expired(&self, now: DateTime<Utc>) -> bool {
        token_expired(
            self.activation_token_created.as_deref(),
            ACTIVATION_TOKEN_LIFETIME_HOURS,
            now,
        )
    }

    pub fn is_password_reset_token_expired(&self, now: DateTime<Utc>) -> bool {
        token_expired(
            self.password_reset_token_created.as_deref(),
            RESET_TOKEN_LIFETIME_HOURS,
            now,
        )
    }
}

/// Field values for inserting a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: Option<&'a str>,
    pub password_hash: &'a str,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub thumbnail_url: Option<String>,
    pub thumbnail: Option<String>,
    pub video_file: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i64>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Video {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let category: String = row.get(3)?;
        Ok(Self {
            id: VideoId::from(row.get::<_, i64>(0)?),
            title: row.get(1)?,
            description: row.get(2)?,
            category: Category::parse_lossy(&category),
            thumbnail_url: row.get(4)?,
            thumbnail: row.get(5)?,
            video_file: row.get(6)?,
            video_url: row.get(7)?,
            duration: row.get(8)?,
            is_active: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    /// Local file path relative to the media root, ignoring empty strings.
    pub fn file(&self) -> Option<&str> {
        self.video_file.as_deref().filter(|f| !f.is_empty())
    }

    /// External playback URL, ignoring empty strings.
    pub fn external_url(&self) -> Option<&str> {
        self.video_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Field values for inserting a video.
#[derive(Debug, Clone, Default)]
pub struct NewVideo {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub thumbnail_url: Option<String>,
    pub thumbnail: Option<String>,
    pub video_file: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i64>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub queue: QueueName,
    pub func_name: String,
    /// JSON-encoded job payload.
    pub payload: String,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub worker: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

impl Job {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_text(row, 0)?,
            queue: parse_text(row, 1)?,
            func_name: row.get(2)?,
            payload: row.get(3)?,
            status: parse_text(row, 4)?,
            result: row.get(5)?,
            error: row.get(6)?,
            worker: row.get(7)?,
            created_at: row.get(8)?,
            started_at: row.get(9)?,
            ended_at: row.get(10)?,
        })
    }
}

// ---------------------------------------------------------------------------
// BlacklistedToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BlacklistedToken {
    pub jti: String,
    pub user_id: UserId,
    pub expires_at: String,
    pub blacklisted_at: String,
}

impl BlacklistedToken {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            jti: row.get(0)?,
            user_id: UserId::from(row.get::<_, i64>(1)?),
            expires_at: row.get(2)?,
            blacklisted_at: row.get(3)?,
        })
    }
}
