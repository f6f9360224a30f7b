//! Axum router construction.
//!
//! Builds the full application router with all route groups, middleware
//! layers, media and static file serving.

use axum::http::{header, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::auth::{auth_middleware, media_auth_middleware};
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::request_id::{request_id_middleware, X_REQUEST_ID};
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    info(title = "Videoflix API"),
    paths(
        routes::auth::register,
        routes::auth::activate,
        routes::auth::login,
        routes::auth::logout,
        routes::auth::refresh,
        routes::auth::password_reset,
        routes::auth::password_confirm,
        routes::auth::csrf,
        routes::auth::me,
        routes::videos::list_videos,
        routes::videos::create_video,
        routes::videos::get_video,
        routes::videos::delete_video,
        routes::stream::hls_manifest,
        routes::stream::hls_segment,
        routes::stream::direct_stream,
        routes::queue::queue_status,
        routes::queue::manage_queue,
        routes::health::health_check,
    ),
    components(schemas(
        routes::auth::RegisterRequest,
        routes::auth::RegisterResponse,
        routes::auth::UserResponse,
        routes::auth::LoginRequest,
        routes::auth::LoginResponse,
        routes::auth::DetailResponse,
        routes::auth::RefreshResponse,
        routes::auth::PasswordResetRequest,
        routes::auth::PasswordConfirmRequest,
        routes::auth::CsrfResponse,
        routes::videos::VideoResponse,
        routes::videos::CreateVideoRequest,
        routes::queue::QueueAction,
        routes::queue::ManageQueueRequest,
        routes::queue::ManageQueueResponse,
        routes::health::HealthResponse,
        crate::catalog::VideoSummary,
        crate::queue::QueueSnapshot,
        vf_core::Category,
        vf_core::Rendition,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([X_REQUEST_ID.clone(), header::CONTENT_RANGE])
        .allow_credentials(true);

    // Credential endpoints share one limiter.
    let limited_auth = Router::new()
        .route("/register/", post(routes::auth::register))
        .route("/login/", post(routes::auth::login))
        .route("/password_reset/", post(routes::auth::password_reset))
        .route("/token/refresh/", post(routes::auth::refresh))
        .layer(middleware::from_fn_with_state(ctx.clone(), rate_limit_middleware));

    let auth_routes = Router::new()
        .route("/activate/{uid}/{token}/", get(routes::auth::activate))
        .route("/logout/", post(routes::auth::logout))
        .route(
            "/password_confirm/{uid}/{token}/",
            post(routes::auth::password_confirm),
        )
        .route("/csrf/", get(routes::auth::csrf))
        .route("/me/", get(routes::auth::me))
        .merge(limited_auth);

    let video_routes = Router::new()
        .route(
            "/video/",
            get(routes::videos::list_videos)
                .post(routes::videos::create_video)
                .options(routes::videos::list_options),
        )
        .route("/video/queue/status/", get(routes::queue::queue_status))
        .route("/video/queue/manage/", post(routes::queue::manage_queue))
        .route(
            "/video/{id}/",
            get(routes::videos::get_video).delete(routes::videos::delete_video),
        )
        .route("/video/{id}/direct/", get(routes::stream::direct_stream))
        .route(
            "/video/{id}/{res}/index.m3u8",
            get(routes::stream::hls_manifest),
        )
        .route(
            "/video/{id}/{res}/{segment}",
            get(routes::stream::hls_segment),
        )
        .layer(middleware::from_fn_with_state(ctx.clone(), media_auth_middleware));

    let api = auth_routes
        .merge(video_routes)
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let media = Router::new()
        .nest_service("/media", ServeDir::new(ctx.media_root()))
        .layer(middleware::from_fn_with_state(ctx.clone(), media_auth_middleware))
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", api)
        .merge(media);

    if let Some(dir) = ctx.config.server.static_dir.as_ref().filter(|d| d.exists()) {
        tracing::info!("Serving static files from {}", dir.display());
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
