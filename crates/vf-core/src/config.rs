//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for server, auth, tools, transcoding, workers, mail and
//! caching. Every section defaults sensibly so a completely empty `{}` file
//! is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::{Error, QueueName, Rendition};

/// Placeholder signing secret. `validate` warns while it is in use.
pub const DEFAULT_JWT_SECRET: &str = "change-me-videoflix-dev-secret";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub tools: ToolsConfig,
    pub transcode: TranscodeConfig,
    pub worker: WorkerConfig,
    pub mail: MailConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            warnings.push("auth.jwt_secret is the built-in default; set a private secret".into());
        }

        if self.auth.access_token_lifetime_secs == 0 || self.auth.refresh_token_lifetime_secs == 0 {
            warnings.push("auth token lifetimes must be greater than zero".into());
        }

        let samesite = ["strict", "lax", "none"];
        if !samesite.contains(&self.auth.cookie_samesite.to_ascii_lowercase().as_str()) {
            warnings.push(format!(
                "auth.cookie_samesite '{}' is not one of Strict, Lax, None",
                self.auth.cookie_samesite
            ));
        }

        if self.auth.cookie_samesite.eq_ignore_ascii_case("none") && !self.auth.cookie_secure {
            warnings.push("cookie_samesite None requires cookie_secure".into());
        }

        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            warnings.push(format!(
                "auth.bcrypt_cost {} is outside 4..=31",
                self.auth.bcrypt_cost
            ));
        }

        if self.mail.transport == MailTransport::Webhook && self.mail.webhook_url.is_none() {
            warnings.push("mail.transport is webhook but mail.webhook_url is not set".into());
        }

        if self.worker.abandoned_after_secs <= self.transcode.timeout_secs {
            warnings.push(format!(
                "worker.abandoned_after_secs {} does not exceed transcode.timeout_secs {}; running jobs may be failed early",
                self.worker.abandoned_after_secs, self.transcode.timeout_secs
            ));
        }

        if self.worker.embedded && self.worker.count == 0 {
            warnings.push("worker.embedded is set but worker.count is 0".into());
        }

        if self.transcode.resolutions.is_empty() {
            warnings.push("transcode.resolutions is empty; uploads will not be packaged".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Root for uploaded videos, thumbnails and HLS output.
    pub media_root: PathBuf,
    /// Public base URL used to build absolute media and segment links.
    pub site_url: String,
    /// Base URL of the web frontend (activation redirects, reset links).
    pub frontend_url: String,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            db_path: PathBuf::from("./data/videoflix.db"),
            media_root: PathBuf::from("./media"),
            site_url: "http://127.0.0.1:8000".into(),
            frontend_url: "http://localhost:5500".into(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Frontend base for a request arriving on `host`.
    ///
    /// Browsers treat `localhost` and `127.0.0.1` as different origins, so a
    /// request made against the loopback address is sent back to the
    /// loopback variant of the frontend.
    pub fn frontend_for_host(&self, host: Option<&str>) -> String {
        let base = self.frontend_url.trim_end_matches('/');
        match host {
            Some(h) if h.starts_with("127.0.0.1") => base.replacen("localhost", "127.0.0.1", 1),
            _ => base.to_string(),
        }
    }

    /// `site_url` without a trailing slash.
    pub fn site_base(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }
}

/// Authentication and cookie settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_lifetime_secs: u64,
    pub refresh_token_lifetime_secs: u64,
    pub cookie_secure: bool,
    pub cookie_samesite: String,
    /// Require an authenticated user for catalog and streaming routes.
    pub protect_media: bool,
    pub rate_limit_per_minute: u32,
    /// bcrypt work factor for new password hashes.
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.into(),
            access_token_lifetime_secs: 5 * 60,
            refresh_token_lifetime_secs: 24 * 60 * 60,
            cookie_secure: false,
            cookie_samesite: "Lax".into(),
            protect_media: false,
            rate_limit_per_minute: 60,
            bcrypt_cost: 12,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// HLS packaging and thumbnail defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub resolutions: Vec<Rendition>,
    pub segment_secs: u32,
    pub preset: String,
    pub crf: u32,
    pub timeout_secs: u64,
    pub thumbnail_timestamp: String,
    pub thumbnail_timeout_secs: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            resolutions: Rendition::ALL.to_vec(),
            segment_secs: 10,
            preset: "fast".into(),
            crf: 23,
            timeout_secs: 300,
            thumbnail_timestamp: "00:00:01".into(),
            thumbnail_timeout_secs: 60,
        }
    }
}

/// Background worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Run workers inside the HTTP server process.
    pub embedded: bool,
    pub count: usize,
    pub queues: Vec<QueueName>,
    pub poll_interval_ms: u64,
    /// A job still `started` after this long belonged to a worker that died.
    pub abandoned_after_secs: u64,
    /// Finished and failed jobs are deleted once this old.
    pub job_retention_hours: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            embedded: true,
            count: 1,
            queues: QueueName::ALL.to_vec(),
            poll_interval_ms: 2000,
            abandoned_after_secs: 1800,
            job_retention_hours: 7 * 24,
        }
    }
}

/// How outgoing mail leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// Write messages to the log.
    #[default]
    Log,
    /// POST messages as JSON to `webhook_url`.
    Webhook,
}

/// Outgoing mail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub transport: MailTransport,
    pub from: String,
    pub webhook_url: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: MailTransport::Log,
            from: "noreply@videoflix.com".into(),
            webhook_url: None,
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub video_list_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            video_list_ttl_secs: 300,
        }
    }
}
