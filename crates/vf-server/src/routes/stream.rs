//! HLS manifest, segment and direct-file route handlers.
//!
//! Packaged renditions live under `{media_root}/hls/{video_id}/{rendition}`.
//! When a rendition is missing the manifest route queues packaging and
//! answers a single-entry playlist that plays the source file meanwhile.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio_util::io::ReaderStream;
use vf_core::{Error, QueueName, Rendition, VideoId};

use super::streaming_helpers::{guess_content_type, serve_file_streaming};
use crate::catalog::media_url;
use crate::context::AppContext;
use crate::error::AppError;
use crate::hls::{self, MPEGURL};
use crate::queue::{self, JobPayload};

const DIRECT_CORS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization"),
];

fn parse_rendition(res: &str) -> Result<Rendition, AppError> {
    res.parse::<Rendition>().map_err(AppError::from)
}

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn manifest_response(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, MPEGURL)], body).into_response()
}

/// GET /api/video/{id}/{res}/index.m3u8
#[utoipa::path(
    get,
    path = "/api/video/{id}/{res}/index.m3u8",
    params(
        ("id" = i64, Path, description = "Video id"),
        ("res" = String, Path, description = "480p, 720p or 1080p")
    ),
    responses(
        (status = 200, description = "HLS playlist", content_type = "application/vnd.apple.mpegurl"),
        (status = 400, description = "Unknown resolution"),
        (status = 404, description = "Unknown video")
    )
)]
pub async fn hls_manifest(
    State(ctx): State<AppContext>,
    Path((video_id, res)): Path<(VideoId, String)>,
) -> Result<Response, AppError> {
    let video = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::videos::get_video(&conn, video_id)?
            .ok_or_else(|| Error::not_found("video", video_id))?
    };
    let rendition = parse_rendition(&res)?;
    let site = ctx.config.server.site_base();

    let playlist = vf_av::layout::playlist_path(ctx.media_root(), video_id, rendition);
    if playlist.exists() {
        match tokio::fs::read_to_string(&playlist).await {
            Ok(text) => {
                return Ok(manifest_response(hls::rewrite_playlist(&text, site, video_id, rendition)));
            }
            Err(e) => {
                tracing::warn!(video_id = %video_id, %rendition, "Failed to read playlist: {e}");
                return Ok(manifest_response(hls::EMPTY_MANIFEST.to_string()));
            }
        }
    }

    let local = video
        .file()
        .filter(|file| vf_av::layout::check_relative(file).is_ok());
    if let Some(file) = local {
        let payload = JobPayload::ProcessVideo {
            video_id,
            resolution: rendition.to_string(),
        };
        match queue::enqueue_unique(&ctx.db, QueueName::Default, &payload) {
            Ok(Some(job)) => {
                tracing::info!(video_id = %video_id, %rendition, job_id = %job.id, "Queued on-demand packaging");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(video_id = %video_id, "Failed to queue packaging: {e}"),
        }
        return Ok(manifest_response(hls::fallback_manifest(&media_url(site, file))));
    }

    if let Some(url) = video.external_url() {
        return Ok(manifest_response(hls::external_manifest(url, rendition)));
    }

    Ok(manifest_response(hls::EMPTY_MANIFEST.to_string()))
}

/// GET /api/video/{id}/{res}/{segment}
#[utoipa::path(
    get,
    path = "/api/video/{id}/{res}/{segment}",
    params(
        ("id" = i64, Path, description = "Video id"),
        ("res" = String, Path, description = "480p, 720p or 1080p"),
        ("segment" = String, Path, description = "Segment file name")
    ),
    responses(
        (status = 200, description = "MPEG-TS segment", content_type = "video/MP2T"),
        (status = 400, description = "Invalid segment name or resolution"),
        (status = 404, description = "Rendition or segment missing")
    )
)]
pub async fn hls_segment(
    State(ctx): State<AppContext>,
    Path((video_id, res, segment)): Path<(VideoId, String, String)>,
) -> Result<Response, AppError> {
    hls::validate_segment_name(&segment)?;
    let rendition = parse_rendition(&res)?;

    let dir = vf_av::layout::rendition_dir(ctx.media_root(), video_id, rendition);
    if !dir.is_dir() {
        return Err(Error::not_found("HLS stream", format!("{video_id}/{rendition}")).into());
    }
    let file = tokio::fs::File::open(dir.join(&segment))
        .await
        .map_err(|_| Error::not_found("segment", format!("{video_id}/{rendition}/{segment}")))?;
    let len = file.metadata().await.map_err(Error::from)?.len();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, guess_content_type(&segment).to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
            (header::CONTENT_DISPOSITION, "inline".to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// GET /api/video/{id}/direct/
#[utoipa::path(
    get,
    path = "/api/video/{id}/direct/",
    params(("id" = i64, Path, description = "Video id")),
    responses(
        (status = 200, description = "Source file", content_type = "video/mp4"),
        (status = 206, description = "Partial content"),
        (status = 302, description = "Redirect to the external URL"),
        (status = 404, description = "No active video or no playable source"),
        (status = 416, description = "Range not satisfiable")
    )
)]
pub async fn direct_stream(
    State(ctx): State<AppContext>,
    Path(video_id): Path<VideoId>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let video = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::videos::get_active_video(&conn, video_id)?
            .ok_or_else(|| Error::not_found("video", video_id))?
    };

    let local = video.file().and_then(|file| {
        vf_av::layout::media_file(ctx.media_root(), file)
            .map_err(|e| tracing::warn!(video_id = %video_id, "Refusing to stream: {e}"))
            .ok()
    });
    if let Some(path) = local {
        let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
        let response = serve_file_streaming(&path, "video/mp4", range, &DIRECT_CORS).await?;
        return Ok(response);
    }

    if let Some(url) = video.external_url() {
        let mut response = found(url);
        for (name, value) in DIRECT_CORS {
            response
                .headers_mut()
                .insert(name, header::HeaderValue::from_static(value));
        }
        return Ok(response);
    }

    Ok((
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "No video available." })),
    )
        .into_response())
}
