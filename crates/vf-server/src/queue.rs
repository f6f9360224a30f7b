//! Typed job payloads on top of the `jobs` table.
//!
//! A job row stores its kind in `func_name` and the serialized
//! [`JobPayload`] in `payload`. Producers call [`enqueue`]; workers decode
//! with [`JobPayload::decode`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vf_core::{Error, JobId, QueueName, Rendition, Result, UserId, VideoId};
use vf_db::models::Job;
use vf_db::pool::DbPool;
use vf_db::queries::jobs;

/// Work a queue worker knows how to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Package one rendition of a video.
    ProcessVideo { video_id: VideoId, resolution: String },
    /// Fan out `ProcessVideo` for every rendition not yet on disk.
    ProcessAllResolutions {
        video_id: VideoId,
        resolutions: Vec<Rendition>,
    },
    RegenerateStream {
        video_id: VideoId,
        resolution: String,
        force: bool,
    },
    CleanupOldSegments { video_id: VideoId, days_old: u64 },
    GenerateThumbnail { video_id: VideoId, force: bool },
    SendActivationEmail { user_id: UserId, base_url: String },
    SendPasswordResetEmail { user_id: UserId, frontend_url: String },
}

impl JobPayload {
    pub fn func_name(&self) -> &'static str {
        match self {
            Self::ProcessVideo { .. } => "process_video",
            Self::ProcessAllResolutions { .. } => "process_all_resolutions",
            Self::RegenerateStream { .. } => "regenerate_stream",
            Self::CleanupOldSegments { .. } => "cleanup_old_segments",
            Self::GenerateThumbnail { .. } => "generate_thumbnail",
            Self::SendActivationEmail { .. } => "send_activation_email",
            Self::SendPasswordResetEmail { .. } => "send_password_reset_email",
        }
    }

    /// Queue a job kind lands on unless the producer picks one.
    pub fn default_queue(&self) -> QueueName {
        match self {
            Self::ProcessAllResolutions { .. } => QueueName::High,
            Self::CleanupOldSegments { .. } => QueueName::Low,
            _ => QueueName::Default,
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Internal(format!("failed to encode job payload: {e}")))
    }

    pub fn decode(job: &Job) -> Result<Self> {
        serde_json::from_str(&job.payload).map_err(|e| {
            Error::queue(job.queue, format!("undecodable payload for job {}: {e}", job.id))
        })
    }
}

/// Append a job to `queue`.
pub fn enqueue(db: &DbPool, queue: QueueName, payload: &JobPayload) -> Result<Job> {
    let conn = vf_db::pool::get_conn(db)?;
    let job = jobs::enqueue_job(&conn, queue, payload.func_name(), &payload.encode()?)?;
    tracing::debug!(job_id = %job.id, %queue, func = payload.func_name(), "Enqueued job");
    Ok(job)
}

/// Enqueue unless an identical job is already queued or running.
///
/// Returns `None` when a duplicate was found.
pub fn enqueue_unique(db: &DbPool, queue: QueueName, payload: &JobPayload) -> Result<Option<Job>> {
    let encoded = payload.encode()?;
    let conn = vf_db::pool::get_conn(db)?;
    if jobs::has_pending(&conn, payload.func_name(), &encoded)? {
        tracing::debug!(func = payload.func_name(), "Identical job already pending");
        return Ok(None);
    }
    let job = jobs::enqueue_job(&conn, queue, payload.func_name(), &encoded)?;
    Ok(Some(job))
}

/// Queued jobs of one queue.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct QueueSnapshot {
    pub count: usize,
    #[schema(value_type = Vec<String>)]
    pub jobs: Vec<JobId>,
}

/// Queued job ids per queue name.
pub fn queue_stats(db: &DbPool) -> Result<BTreeMap<String, QueueSnapshot>> {
    let conn = vf_db::pool::get_conn(db)?;
    let mut stats = BTreeMap::new();
    for queue in QueueName::ALL {
        let ids: Vec<JobId> = jobs::list_queued(&conn, queue)?
            .into_iter()
            .map(|j| j.id)
            .collect();
        stats.insert(
            queue.to_string(),
            QueueSnapshot {
                count: ids.len(),
                jobs: ids,
            },
        );
    }
    Ok(stats)
}

/// Drop every queued job. Returns how many were removed.
pub fn clear_all_queues(db: &DbPool) -> Result<usize> {
    let conn = vf_db::pool::get_conn(db)?;
    let mut total = 0;
    for queue in QueueName::ALL {
        let removed = jobs::clear_queue(&conn, queue)?;
        tracing::info!(%queue, removed, "Cleared queue");
        total += removed;
    }
    Ok(total)
}

/// Move failed jobs back to queued.
pub fn retry_failed_jobs(db: &DbPool) -> Result<usize> {
    let conn = vf_db::pool::get_conn(db)?;
    let count = jobs::retry_failed(&conn)?;
    tracing::info!(count, "Retried failed jobs");
    Ok(count)
}
