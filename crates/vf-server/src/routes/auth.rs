//! Account route handlers: registration, activation, JWT cookie login,
//! logout, refresh, password reset and CSRF.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use vf_core::config::AuthConfig;
use vf_core::{Error, QueueName, UserId};
use vf_db::queries::users;

use crate::accounts;
use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::{AuthUser, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::queue::{self, JobPayload};

pub const CSRF_COOKIE: &str = "csrftoken";

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirmed_password: String,
}

/// Public view of an account.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    pub user: UserResponse,
    /// Activation token, also delivered by email.
    pub token: String,
    pub message: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub detail: String,
    pub access: String,
    pub refresh: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DetailResponse {
    pub detail: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RefreshResponse {
    pub detail: String,
    pub access: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PasswordConfirmRequest {
    pub new_password: String,
    pub confirm_password: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CsrfResponse {
    #[serde(rename = "csrfToken")]
    pub csrf_token: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn same_site(auth: &AuthConfig) -> SameSite {
    match auth.cookie_samesite.to_ascii_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    }
}

fn token_cookie(name: &'static str, value: String, max_age_secs: i64, auth: &AuthConfig) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(auth.cookie_secure)
        .same_site(same_site(auth))
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|v| v.to_str().ok())
}

/// `scheme://host` of the incoming request, falling back to `site_url`.
fn request_base(headers: &HeaderMap, ctx: &AppContext) -> String {
    match request_host(headers) {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("http");
            format!("{scheme}://{host}")
        }
        None => ctx.config.server.site_base().to_string(),
    }
}

fn parse_uid(uid: &str) -> Result<UserId, Error> {
    uid.parse()
        .map_err(|_| Error::Validation("User not found.".into()))
}

fn user_not_found() -> Error {
    Error::Validation("User not found.".into())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/register/
#[utoipa::path(
    post,
    path = "/api/register/",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, activation mail queued", body = RegisterResponse),
        (status = 400, description = "Invalid registration data")
    )
)]
pub async fn register(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let base_url = request_base(&headers, &ctx);
    let response = register_user(&ctx, &payload, &base_url).map_err(|e| {
        let message = match e {
            Error::Validation(m) | Error::Conflict(m) => m,
            other => other.to_string(),
        };
        AppError::from(Error::Validation(message))
    })?;
    Ok((StatusCode::CREATED, Json(response)))
}

fn register_user(ctx: &AppContext, payload: &RegisterRequest, base_url: &str) -> vf_core::Result<RegisterResponse> {
    let email = payload.email.trim();
    accounts::validate_email(email)?;
    if payload.password != payload.confirmed_password {
        return Err(Error::Validation("Passwords do not match.".into()));
    }
    accounts::validate_password(&payload.password, Some(email))?;

    let conn = vf_db::pool::get_conn(&ctx.db)?;
    if users::email_exists(&conn, email)? {
        return Err(Error::Validation("A user with this email already exists.".into()));
    }

    let username = users::unique_username(&conn, &accounts::username_base(email))?;
    let hash = accounts::hash_password(&payload.password, ctx.config.auth.bcrypt_cost)?;
    let user = users::create_user(
        &conn,
        &vf_db::models::NewUser {
            email,
            username: Some(username.as_str()),
            password_hash: &hash,
            ..Default::default()
        },
    )?;
    let token = users::generate_activation_token(&conn, user.id)?;
    drop(conn);

    queue::enqueue(
        &ctx.db,
        QueueName::Default,
        &JobPayload::SendActivationEmail {
            user_id: user.id,
            base_url: base_url.to_string(),
        },
    )?;

    tracing::info!(user_id = %user.id, "Registered new account");

    Ok(RegisterResponse {
        user: UserResponse {
            id: user.id.get(),
            email: user.email,
        },
        token: token.to_string(),
        message: "Registration successful! Please check your email.".into(),
    })
}

/// GET /api/activate/{uid}/{token}/
#[utoipa::path(
    get,
    path = "/api/activate/{uid}/{token}/",
    params(
        ("uid" = String, Path, description = "User id"),
        ("token" = String, Path, description = "Activation token")
    ),
    responses(
        (status = 302, description = "Activated, redirect to the login page"),
        (status = 200, description = "Account was already active"),
        (status = 400, description = "Unknown user, bad or expired token")
    )
)]
pub async fn activate(
    State(ctx): State<AppContext>,
    Path((uid, token)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let user_id = parse_uid(&uid)?;
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let user = users::get_user_by_id(&conn, user_id)?.ok_or_else(user_not_found)?;

    if !accounts::token_matches(user.activation_token, &token) {
        return Err(Error::Validation("Invalid activation token.".into()).into());
    }
    if user.is_activation_token_expired(chrono::Utc::now()) {
        return Err(Error::Validation(
            "Activation token has expired. Please register again.".into(),
        )
        .into());
    }
    if user.is_active {
        return Ok(Json(serde_json::json!({ "message": "Account already activated." })).into_response());
    }

    users::activate_user(&conn, user.id)?;
    tracing::info!(user_id = %user.id, "Account activated");

    let frontend = ctx.config.server.frontend_for_host(request_host(&headers));
    Ok(super::stream::found(&accounts::login_redirect(&frontend)))
}

/// POST /api/login/
#[utoipa::path(
    post,
    path = "/api/login/",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, auth cookies set", body = LoginResponse),
        (status = 401, description = "Invalid credentials or inactive account")
    )
)]
pub async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let user = users::get_user_by_email(&conn, payload.email.trim())?
        .filter(|u| accounts::verify_password(&payload.password, &u.password_hash))
        .ok_or_else(|| Error::Unauthorized("Invalid credentials.".into()))?;

    if !user.is_active {
        return Err(Error::Unauthorized(
            "Account is not activated. Please activate your account first.".into(),
        )
        .into());
    }

    users::touch_last_login(&conn, user.id)?;
    let pair = ctx.jwt.issue_pair(user.id)?;
    tracing::info!(user_id = %user.id, "User logged in");

    let auth = &ctx.config.auth;
    let jar = jar
        .add(token_cookie(ACCESS_COOKIE, pair.access.clone(), ctx.jwt.access_lifetime_secs(), auth))
        .add(token_cookie(REFRESH_COOKIE, pair.refresh.clone(), ctx.jwt.refresh_lifetime_secs(), auth));

    Ok((
        jar,
        Json(LoginResponse {
            detail: "Login successful!".into(),
            access: pair.access,
            refresh: pair.refresh,
            user: UserResponse {
                id: user.id.get(),
                email: user.email,
            },
        }),
    ))
}

/// POST /api/logout/
#[utoipa::path(
    post,
    path = "/api/logout/",
    responses(
        (status = 200, description = "Cookies cleared", body = DetailResponse)
    )
)]
pub async fn logout(State(ctx): State<AppContext>, jar: CookieJar) -> (CookieJar, Json<DetailResponse>) {
    if let Some(refresh) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_owned()) {
        let revoked = vf_db::pool::get_conn(&ctx.db).and_then(|conn| ctx.jwt.blacklist(&conn, &refresh));
        if let Err(e) = revoked {
            tracing::debug!("Refresh token not blacklisted on logout: {e}");
        }
    }

    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));

    (
        jar,
        Json(DetailResponse {
            detail: "Logout successful! All tokens will be deleted.".into(),
        }),
    )
}

/// POST /api/token/refresh/
#[utoipa::path(
    post,
    path = "/api/token/refresh/",
    responses(
        (status = 200, description = "New access token issued", body = RefreshResponse),
        (status = 400, description = "Refresh cookie missing"),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    )
)]
pub async fn refresh(
    State(ctx): State<AppContext>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RefreshResponse>), AppError> {
    let refresh = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation("Refresh token missing.".into()))?;

    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let access = ctx.jwt.refresh_access(&conn, &refresh).map_err(|e| match e {
        Error::Token(reason) => {
            tracing::debug!(%reason, "Refresh rejected");
            Error::Unauthorized("Invalid refresh token.".into())
        }
        other => other,
    })?;

    let jar = jar.add(token_cookie(
        ACCESS_COOKIE,
        access.clone(),
        ctx.jwt.access_lifetime_secs(),
        &ctx.config.auth,
    ));
    Ok((
        jar,
        Json(RefreshResponse {
            detail: "Token refreshed".into(),
            access,
        }),
    ))
}

/// POST /api/password_reset/
#[utoipa::path(
    post,
    path = "/api/password_reset/",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset mail queued", body = DetailResponse),
        (status = 400, description = "Unknown email"),
        (status = 500, description = "Mail could not be dispatched")
    )
)]
pub async fn password_reset(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<DetailResponse>, AppError> {
    let user = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        let user = users::get_user_by_email(&conn, payload.email.trim())?.ok_or_else(|| {
            Error::Validation("No user found with this email address.".into())
        })?;
        users::generate_password_reset_token(&conn, user.id)?;
        user
    };

    let frontend_url = ctx.config.server.frontend_for_host(request_host(&headers));
    let dispatched = queue::enqueue(
        &ctx.db,
        QueueName::Default,
        &JobPayload::SendPasswordResetEmail {
            user_id: user.id,
            frontend_url,
        },
    );
    if let Err(e) = dispatched {
        tracing::error!(user_id = %user.id, "Failed to queue password reset mail: {e}");
        return Err(Error::Mail("Failed to send the email. Please try again.".into()).into());
    }

    Ok(Json(DetailResponse {
        detail: "An email has been sent to reset your password.".into(),
    }))
}

/// POST /api/password_confirm/{uid}/{token}/
#[utoipa::path(
    post,
    path = "/api/password_confirm/{uid}/{token}/",
    params(
        ("uid" = String, Path, description = "User id"),
        ("token" = String, Path, description = "Password reset token")
    ),
    request_body = PasswordConfirmRequest,
    responses(
        (status = 200, description = "Password changed", body = DetailResponse),
        (status = 400, description = "Weak password, unknown user, bad or expired token")
    )
)]
pub async fn password_confirm(
    State(ctx): State<AppContext>,
    Path((uid, token)): Path<(String, String)>,
    Json(payload): Json<PasswordConfirmRequest>,
) -> Result<Json<DetailResponse>, AppError> {
    if let Some(ref confirm) = payload.confirm_password {
        if *confirm != payload.new_password {
            return Err(Error::Validation("Passwords do not match.".into()).into());
        }
    }
    accounts::validate_password(&payload.new_password, None)?;

    let user_id = parse_uid(&uid)?;
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let user = users::get_user_by_id(&conn, user_id)?.ok_or_else(user_not_found)?;

    if !accounts::token_matches(user.password_reset_token, &token) {
        return Err(Error::Validation("Invalid password reset token.".into()).into());
    }
    if user.is_password_reset_token_expired(chrono::Utc::now()) {
        return Err(Error::Validation(
            "Password reset token has expired. Please request a new one.".into(),
        )
        .into());
    }

    let hash = accounts::hash_password(&payload.new_password, ctx.config.auth.bcrypt_cost)?;
    users::reset_password(&conn, user.id, &hash)?;
    tracing::info!(user_id = %user.id, "Password reset");

    Ok(Json(DetailResponse {
        detail: "Password has been reset successfully.".into(),
    }))
}

/// GET /api/csrf/
#[utoipa::path(
    get,
    path = "/api/csrf/",
    responses(
        (status = 200, description = "CSRF token", body = CsrfResponse)
    )
)]
pub async fn csrf(jar: CookieJar) -> (CookieJar, Json<CsrfResponse>) {
    let token = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(32)
                .map(char::from)
                .collect()
        });

    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(365))
        .build();

    (jar.add(cookie), Json(CsrfResponse { csrf_token: token }))
}

/// GET /api/me/
#[utoipa::path(
    get,
    path = "/api/me/",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(user: AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        id: user.id.get(),
        email: user.email,
    })
}
