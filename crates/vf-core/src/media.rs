//! Catalog-domain enums: video categories, HLS renditions, queue names and
//! job states.
//!
//! All enums serialize in lowercase and implement `Display` manually so the
//! database, URLs and JSON share one spelling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Genre a video is filed under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Action,
    Comedy,
    Drama,
    Horror,
    Romance,
    #[serde(rename = "sci-fi")]
    SciFi,
    Thriller,
    Documentary,
    Animation,
    #[default]
    Other,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 10] = [
        Category::Action,
        Category::Comedy,
        Category::Drama,
        Category::Horror,
        Category::Romance,
        Category::SciFi,
        Category::Thriller,
        Category::Documentary,
        Category::Animation,
        Category::Other,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Action => "Action",
            Self::Comedy => "Comedy",
            Self::Drama => "Drama",
            Self::Horror => "Horror",
            Self::Romance => "Romance",
            Self::SciFi => "Science Fiction",
            Self::Thriller => "Thriller",
            Self::Documentary => "Documentary",
            Self::Animation => "Animation",
            Self::Other => "Other",
        }
    }

    /// Parse a stored category, mapping anything unknown to [`Category::Other`].
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Action => "action",
            Self::Comedy => "comedy",
            Self::Drama => "drama",
            Self::Horror => "horror",
            Self::Romance => "romance",
            Self::SciFi => "sci-fi",
            Self::Thriller => "thriller",
            Self::Documentary => "documentary",
            Self::Animation => "animation",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| Error::Validation(format!("unknown category '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Rendition
// ---------------------------------------------------------------------------

/// An HLS output rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Rendition {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Rendition {
    /// All renditions, lowest first.
    pub const ALL: [Rendition; 3] = [Rendition::P480, Rendition::P720, Rendition::P1080];

    /// Output frame size as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::P480 => (854, 480),
            Self::P720 => (1280, 720),
            Self::P1080 => (1920, 1080),
        }
    }

    /// Target video bitrate in kbit/s.
    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            Self::P480 => 1000,
            Self::P720 => 2500,
            Self::P1080 => 5000,
        }
    }

    /// Resolve a rendition name for encoding; unknown names use 720p.
    pub fn or_default(name: &str) -> Self {
        name.parse().unwrap_or(Self::P720)
    }
}

impl Default for Rendition {
    fn default() -> Self {
        Self::P720
    }
}

impl fmt::Display for Rendition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P480 => f.write_str("480p"),
            Self::P720 => f.write_str("720p"),
            Self::P1080 => f.write_str("1080p"),
        }
    }
}

impl FromStr for Rendition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "480p" => Ok(Self::P480),
            "720p" => Ok(Self::P720),
            "1080p" => Ok(Self::P1080),
            other => Err(Error::Validation(format!("unknown resolution '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// QueueName
// ---------------------------------------------------------------------------

/// Named job queue. Workers drain `high` before `default` before `low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    High,
    Default,
    Low,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::High, QueueName::Default, QueueName::Low];

    /// Dequeue rank; lower drains first.
    pub fn rank(&self) -> i64 {
        match self {
            Self::High => 0,
            Self::Default => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("high"),
            Self::Default => f.write_str("default"),
            Self::Low => f.write_str("low"),
        }
    }
}

impl FromStr for QueueName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "default" => Ok(Self::Default),
            "low" => Ok(Self::Low),
            other => Err(Error::Validation(format!("unknown queue '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Started => f.write_str("started"),
            Self::Finished => f.write_str("finished"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "started" => Ok(Self::Started),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(format!("unknown job status '{other}'"))),
        }
    }
}
