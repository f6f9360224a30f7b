//! Authentication middleware and extractors.
//!
//! Every API request passes through [`auth_middleware`], which resolves the
//! caller from a JWT access token and stores a [`CurrentUser`] in the
//! request extensions. Handlers opt into requirements with the
//! [`AuthUser`] and [`StaffUser`] extractors.
//!
//! Token resolution order:
//! 1. `Authorization: Bearer <token>` -- an invalid token here is a 401
//! 2. Cookie `access_token=<token>` -- an invalid cookie is ignored

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use vf_core::{Error, Result, UserId};

use crate::context::AppContext;
use crate::error::AppError;
use crate::jwt::TokenType;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// An authenticated, active user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub is_staff: bool,
}

/// The caller as resolved by [`auth_middleware`]; `None` for anonymous.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthUser>);

/// Staff-only access.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthUser);

fn load_active_user(ctx: &AppContext, id: UserId) -> Result<AuthUser> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let user = vf_db::queries::users::get_user_by_id(&conn, id)?
        .ok_or_else(|| Error::Unauthorized("User not found".into()))?;
    if !user.is_active {
        return Err(Error::Unauthorized("User is inactive".into()));
    }
    Ok(AuthUser {
        id: user.id,
        email: user.email,
        is_staff: user.is_staff,
    })
}

fn user_from_token(ctx: &AppContext, token: &str) -> Result<AuthUser> {
    let claims = ctx.jwt.verify(token, TokenType::Access)?;
    load_active_user(ctx, claims.user_id())
}

/// Resolve the caller from raw header and cookie values.
pub fn authenticate(
    ctx: &AppContext,
    authorization: Option<&str>,
    access_cookie: Option<&str>,
) -> Result<Option<AuthUser>> {
    if let Some(token) = authorization.and_then(|v| v.strip_prefix("Bearer ")) {
        return user_from_token(ctx, token.trim()).map(Some);
    }

    if let Some(token) = access_cookie.filter(|t| !t.is_empty()) {
        match user_from_token(ctx, token) {
            Ok(user) => return Ok(Some(user)),
            Err(reason @ (Error::Token(_) | Error::Unauthorized(_))) => {
                tracing::debug!(%reason, "Ignoring invalid access_token cookie");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(None)
}

/// Resolves the caller and inserts [`CurrentUser`] into extensions.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let cookie = jar.get(ACCESS_COOKIE).map(|c| c.value().to_owned());

    match authenticate(&ctx, authorization.as_deref(), cookie.as_deref()) {
        Ok(user) => {
            if let Some(ref u) = user {
                tracing::trace!(user_id = %u.id, "Authenticated request");
            }
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Rejects anonymous callers on media routes when `auth.protect_media` is set.
pub async fn media_auth_middleware(
    State(ctx): State<AppContext>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if ctx.config.auth.protect_media {
        let authenticated = request
            .extensions()
            .get::<CurrentUser>()
            .is_some_and(|c| c.0.is_some());
        if !authenticated {
            return AppError::from(not_authenticated()).into_response();
        }
    }
    next.run(request).await
}

fn not_authenticated() -> Error {
    Error::Unauthorized("Authentication credentials were not provided.".into())
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .and_then(|c| c.0.clone())
            .ok_or_else(|| not_authenticated().into())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(Error::Forbidden(
                "You do not have permission to perform this action.".into(),
            )
            .into());
        }
        Ok(StaffUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use vf_core::TokenRejection;
    use vf_db::models::NewUser;

    fn user(ctx: &AppContext, email: &str, active: bool) -> UserId {
        let conn = ctx.db.get().unwrap();
        vf_db::queries::users::create_user(
            &conn,
            &NewUser {
                email,
                password_hash: "h",
                is_active: active,
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn anonymous_without_credentials() {
        let ctx = test_context();
        assert!(authenticate(&ctx, None, None).unwrap().is_none());
    }

    #[test]
    fn bearer_token_resolves_user() {
        let ctx = test_context();
        let id = user(&ctx, "a@example.com", true);
        let token = ctx.jwt.issue(id, TokenType::Access).unwrap();
        let header = format!("Bearer {token}");
        let resolved = authenticate(&ctx, Some(&header), None).unwrap().unwrap();
        assert_eq!(resolved.id, id);
        assert!(!resolved.is_staff);
    }

    #[test]
    fn invalid_bearer_is_rejected_but_cookie_is_ignored() {
        let ctx = test_context();
        let err = authenticate(&ctx, Some("Bearer nope"), None).unwrap_err();
        assert!(matches!(err, Error::Token(TokenRejection::Malformed)));
        assert!(authenticate(&ctx, None, Some("nope")).unwrap().is_none());
    }

    #[test]
    fn cookie_used_when_no_header() {
        let ctx = test_context();
        let id = user(&ctx, "c@example.com", true);
        let token = ctx.jwt.issue(id, TokenType::Access).unwrap();
        let resolved = authenticate(&ctx, Some("Basic abc"), Some(&token)).unwrap();
        assert_eq!(resolved.unwrap().id, id);
    }

    #[test]
    fn inactive_user_is_rejected() {
        let ctx = test_context();
        let id = user(&ctx, "i@example.com", false);
        let token = ctx.jwt.issue(id, TokenType::Access).unwrap();
        let header = format!("Bearer {token}");
        assert!(authenticate(&ctx, Some(&header), None).is_err());
        assert!(authenticate(&ctx, None, Some(&token)).unwrap().is_none());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let ctx = test_context();
        let id = user(&ctx, "r@example.com", true);
        let refresh = ctx.jwt.issue(id, TokenType::Refresh).unwrap();
        let header = format!("Bearer {refresh}");
        assert!(authenticate(&ctx, Some(&header), None).is_err());
    }
}
