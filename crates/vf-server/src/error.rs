//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; any [`vf_core::Error`]
//! converts into an [`AppError`] with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vf_core::Error;

use crate::middleware::request_id::current_request_id;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: Error) -> Self {
        Self {
            inner,
            request_id: current_request_id(),
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.inner.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn inner(&self) -> &Error {
        &self.inner
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self::new(e)
    }
}

/// Client-facing message. Caller errors carry their text verbatim; server
/// errors other than mail failures are not echoed back.
fn public_message(err: &Error) -> String {
    match err {
        Error::Mail(m) => m.clone(),
        e if e.is_client_facing() => e.to_string(),
        _ => "Internal server error.".to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": public_message(&self.inner),
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_produces_404() {
        let response = AppError::new(Error::not_found("video", 3)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_produces_401() {
        let response = AppError::new(Error::Unauthorized("bad token".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn caller_errors_keep_plain_message() {
        assert_eq!(
            public_message(&Error::Validation("Passwords do not match.".into())),
            "Passwords do not match."
        );
        assert_eq!(
            public_message(&Error::not_found("video", 9)),
            "video not found: 9"
        );
    }

    #[test]
    fn token_errors_carry_their_code() {
        let body_code = AppError::new(Error::Token(vf_core::TokenRejection::Expired))
            .inner()
            .code();
        assert_eq!(body_code, "token_expired");
        assert_eq!(
            public_message(&Error::database("locked")),
            "Internal server error."
        );
    }

    #[test]
    fn with_request_id() {
        let err = AppError::new(Error::Internal("oops".into())).with_request_id("req-123".into());
        assert_eq!(err.request_id.as_deref(), Some("req-123"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
