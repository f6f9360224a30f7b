//! Catalog route handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use vf_core::{Category, Error, QueueName, VideoId};
use vf_db::models::{NewVideo, Video};

use crate::catalog::{self, VideoSummary};
use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::StaffUser;
use crate::queue::{self, JobPayload};

const MAX_TITLE_LEN: usize = 200;

/// Full video record.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VideoResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub thumbnail_url: String,
    pub video_file: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i64>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl VideoResponse {
    fn from_model(video: &Video, ctx: &AppContext) -> Self {
        Self {
            id: video.id.get(),
            title: video.title.clone(),
            description: video.description.clone(),
            category: video.category,
            thumbnail_url: catalog::resolve_thumbnail_url(
                video,
                ctx.config.server.site_base(),
                ctx.media_root(),
            ),
            video_file: video.video_file.clone(),
            video_url: video.video_url.clone(),
            duration: video.duration,
            is_active: video.is_active,
            created_at: video.created_at.clone(),
            updated_at: video.updated_at.clone(),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateVideoRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Unknown names are filed under `other`.
    #[serde(default)]
    pub category: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Thumbnail path relative to the media root.
    pub thumbnail: Option<String>,
    /// Source file path relative to the media root.
    pub video_file: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i64>,
}

/// GET /api/video/
#[utoipa::path(
    get,
    path = "/api/video/",
    responses(
        (status = 200, description = "Active videos, newest first", body = Vec<VideoSummary>)
    )
)]
pub async fn list_videos(State(ctx): State<AppContext>) -> Json<Vec<VideoSummary>> {
    Json(catalog::list_videos(&ctx))
}

/// POST /api/video/
#[utoipa::path(
    post,
    path = "/api/video/",
    request_body = CreateVideoRequest,
    responses(
        (status = 201, description = "Video created", body = VideoResponse),
        (status = 400, description = "Invalid video data"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn create_video(
    State(ctx): State<AppContext>,
    StaffUser(staff): StaffUser,
    Json(payload): Json<CreateVideoRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(Error::Validation("Title must not be empty.".into()).into());
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::Validation(format!(
            "Title must be at most {MAX_TITLE_LEN} characters."
        ))
        .into());
    }

    let video_file = payload.video_file.filter(|f| !f.trim().is_empty());
    if let Some(file) = video_file.as_deref() {
        vf_av::layout::check_relative(file).map_err(|_| {
            Error::Validation("video_file must be a path inside the media directory.".into())
        })?;
    }
    let thumbnail = payload.thumbnail.filter(|t| !t.trim().is_empty());
    if let Some(thumb) = thumbnail.as_deref().filter(|t| !t.starts_with("http")) {
        vf_av::layout::check_relative(thumb).map_err(|_| {
            Error::Validation("thumbnail must be a URL or a path inside the media directory.".into())
        })?;
    }

    let new = NewVideo {
        title: title.to_string(),
        description: payload.description,
        category: payload
            .category
            .as_deref()
            .map(Category::parse_lossy)
            .unwrap_or_default(),
        thumbnail_url: payload.thumbnail_url,
        thumbnail,
        video_file,
        video_url: payload.video_url,
        duration: payload.duration,
    };

    let video = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::videos::create_video(&conn, &new)?
    };
    ctx.video_cache.invalidate();
    tracing::info!(video_id = %video.id, user_id = %staff.id, "Video created");

    if video.file().is_some() {
        queue::enqueue(
            &ctx.db,
            QueueName::High,
            &JobPayload::ProcessAllResolutions {
                video_id: video.id,
                resolutions: ctx.config.transcode.resolutions.clone(),
            },
        )?;
    }

    Ok((StatusCode::CREATED, Json(VideoResponse::from_model(&video, &ctx))))
}

/// GET /api/video/{id}/
#[utoipa::path(
    get,
    path = "/api/video/{id}/",
    params(("id" = i64, Path, description = "Video id")),
    responses(
        (status = 200, description = "Video", body = VideoResponse),
        (status = 404, description = "No active video with this id")
    )
)]
pub async fn get_video(
    State(ctx): State<AppContext>,
    Path(id): Path<VideoId>,
) -> Result<Json<VideoResponse>, AppError> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let video = vf_db::queries::videos::get_active_video(&conn, id)?
        .ok_or_else(|| Error::not_found("video", id))?;
    Ok(Json(VideoResponse::from_model(&video, &ctx)))
}

/// DELETE /api/video/{id}/
#[utoipa::path(
    delete,
    path = "/api/video/{id}/",
    params(("id" = i64, Path, description = "Video id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Unknown video")
    )
)]
pub async fn delete_video(
    State(ctx): State<AppContext>,
    StaffUser(staff): StaffUser,
    Path(id): Path<VideoId>,
) -> Result<StatusCode, AppError> {
    let deleted = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::videos::delete_video(&conn, id)?
    };
    if !deleted {
        return Err(Error::not_found("video", id).into());
    }
    ctx.video_cache.invalidate();

    let hls_dir = vf_av::layout::video_hls_dir(ctx.media_root(), id);
    if hls_dir.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(&hls_dir).await {
            tracing::warn!(video_id = %id, "Failed to remove HLS output: {e}");
        }
    }

    tracing::info!(video_id = %id, user_id = %staff.id, "Video deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// OPTIONS /api/video/
pub async fn list_options() -> impl IntoResponse {
    (StatusCode::OK, [(axum::http::header::ALLOW, "GET, POST, OPTIONS")])
}
