//! Errors shared by every videoflix crate.
//!
//! Each variant knows the HTTP status it maps to and a stable `code` string
//! that ends up in JSON error bodies, so handlers only have to pick the
//! right variant.

use std::fmt;

/// Why a JWT was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Expired,
    Malformed,
    /// An access token where a refresh token was expected, or the reverse.
    WrongType,
    /// Refresh token on the blacklist after logout.
    Revoked,
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenRejection::Expired => "token is expired",
            TokenRejection::Malformed => "token is invalid",
            TokenRejection::WrongType => "token has the wrong type",
            TokenRejection::Revoked => "token is blacklisted",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Bad input from the caller. The message is shown to the client as is.
    #[error("{0}")]
    Validation(String),

    /// A stored or submitted file path that would leave the media root.
    #[error("unsafe media path: {0}")]
    UnsafePath(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Token(TokenRejection),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// ffmpeg or ffprobe missing, timed out or exited non-zero.
    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("queue '{queue}': {message}")]
    Queue { queue: String, message: String },

    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database(source.into())
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn queue(queue: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::Queue {
            queue: queue.to_string(),
            message: message.into(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::UnsafePath(_) | Error::Config(_) => 400,
            Error::Unauthorized(_) | Error::Token(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound { .. } => 404,
            Error::Conflict(_) => 409,
            Error::Tool { .. } => 502,
            Error::Database(_)
            | Error::Io(_)
            | Error::Queue { .. }
            | Error::Mail(_)
            | Error::Internal(_) => 500,
        }
    }

    /// Machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation_error",
            Error::UnsafePath(_) => "invalid_path",
            Error::Unauthorized(_) => "not_authenticated",
            Error::Token(TokenRejection::Expired) => "token_expired",
            Error::Token(_) => "token_not_valid",
            Error::Forbidden(_) => "permission_denied",
            Error::Conflict(_) => "conflict",
            Error::Config(_) => "config_error",
            Error::Database(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::Queue { .. } => "queue_error",
            Error::Mail(_) => "mail_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Errors whose message was written for the client.
    pub fn is_client_facing(&self) -> bool {
        self.http_status() < 500 || matches!(self, Error::Mail(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_mistakes_are_4xx() {
        assert_eq!(Error::Validation("Passwords do not match.".into()).http_status(), 400);
        assert_eq!(Error::UnsafePath("/etc/passwd".into()).http_status(), 400);
        assert_eq!(Error::Unauthorized("no credentials".into()).http_status(), 401);
        assert_eq!(Error::Forbidden("staff only".into()).http_status(), 403);
        assert_eq!(Error::not_found("video", 42).http_status(), 404);
        assert_eq!(Error::Conflict("email taken".into()).http_status(), 409);
    }

    #[test]
    fn token_rejections_share_401_but_not_code() {
        let expired = Error::Token(TokenRejection::Expired);
        let revoked = Error::Token(TokenRejection::Revoked);
        assert_eq!(expired.http_status(), 401);
        assert_eq!(revoked.http_status(), 401);
        assert_eq!(expired.code(), "token_expired");
        assert_eq!(revoked.code(), "token_not_valid");
        assert_eq!(revoked.to_string(), "token is blacklisted");
    }

    #[test]
    fn validation_message_is_verbatim() {
        let err = Error::Validation("Enter a valid email address.".into());
        assert_eq!(err.to_string(), "Enter a valid email address.");
        assert!(err.is_client_facing());
    }

    #[test]
    fn infrastructure_failures_are_5xx() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(matches!(io, Error::Io(_)));
        assert_eq!(io.http_status(), 500);
        assert!(!io.is_client_facing());

        let db = Error::database("disk I/O error");
        assert_eq!(db.to_string(), "database error: disk I/O error");

        let ffmpeg = Error::tool("ffmpeg", "exit status 1");
        assert_eq!(ffmpeg.http_status(), 502);
        assert_eq!(ffmpeg.to_string(), "ffmpeg: exit status 1");
    }

    #[test]
    fn mail_failures_are_shown_to_the_client() {
        let err = Error::Mail("relay refused".into());
        assert_eq!(err.http_status(), 500);
        assert!(err.is_client_facing());
        assert_eq!(err.code(), "mail_error");
    }
}
