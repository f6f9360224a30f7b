//! Staff-only queue inspection and management.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use vf_core::{Error, QueueName, Rendition, VideoId};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::StaffUser;
use crate::queue::{self, JobPayload, QueueSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Clear,
    RetryFailed,
    Process,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ManageQueueRequest {
    pub action: QueueAction,
    /// Required for `process`.
    #[schema(value_type = Option<i64>)]
    pub video_id: Option<VideoId>,
    /// Defaults to the configured renditions.
    pub resolutions: Option<Vec<Rendition>>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ManageQueueResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// GET /api/video/queue/status/
#[utoipa::path(
    get,
    path = "/api/video/queue/status/",
    responses(
        (status = 200, description = "Queued jobs per queue", body = BTreeMap<String, QueueSnapshot>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn queue_status(
    State(ctx): State<AppContext>,
    _staff: StaffUser,
) -> Result<Json<BTreeMap<String, QueueSnapshot>>, AppError> {
    Ok(Json(queue::queue_stats(&ctx.db)?))
}

/// POST /api/video/queue/manage/
#[utoipa::path(
    post,
    path = "/api/video/queue/manage/",
    request_body = ManageQueueRequest,
    responses(
        (status = 200, description = "Action applied", body = ManageQueueResponse),
        (status = 400, description = "Missing video_id or unknown video"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn manage_queue(
    State(ctx): State<AppContext>,
    StaffUser(staff): StaffUser,
    Json(payload): Json<ManageQueueRequest>,
) -> Result<Json<ManageQueueResponse>, AppError> {
    tracing::info!(user_id = %staff.id, action = ?payload.action, "Queue management");

    let response = match payload.action {
        QueueAction::Clear => {
            let count = queue::clear_all_queues(&ctx.db)?;
            ManageQueueResponse {
                message: "All queues cleared.".into(),
                count: Some(count),
                job_id: None,
            }
        }
        QueueAction::RetryFailed => {
            let count = queue::retry_failed_jobs(&ctx.db)?;
            ManageQueueResponse {
                message: format!("{count} failed jobs requeued."),
                count: Some(count),
                job_id: None,
            }
        }
        QueueAction::Process => {
            let video_id = payload
                .video_id
                .ok_or_else(|| Error::Validation("video_id is required for process.".into()))?;
            let exists = {
                let conn = vf_db::pool::get_conn(&ctx.db)?;
                vf_db::queries::videos::get_video(&conn, video_id)?.is_some()
            };
            if !exists {
                return Err(Error::Validation(format!("Video {video_id} not found.")).into());
            }

            let resolutions = payload
                .resolutions
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| ctx.config.transcode.resolutions.clone());
            let job = queue::enqueue(
                &ctx.db,
                QueueName::High,
                &JobPayload::ProcessAllResolutions {
                    video_id,
                    resolutions,
                },
            )?;
            ManageQueueResponse {
                message: format!("Processing queued for video {video_id}."),
                count: None,
                job_id: Some(job.id.to_string()),
            }
        }
    };

    Ok(Json(response))
}
