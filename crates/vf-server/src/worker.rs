//! Queue workers.
//!
//! Each worker polls the `jobs` table for the highest-priority queued job,
//! runs it, and records the outcome. Workers run embedded in the HTTP
//! server or standalone via `videoflix worker`.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use vf_core::{Error, QueueName, Rendition, Result, UserId, VideoId};
use vf_db::models::{Job, Video};

use crate::accounts;
use crate::context::AppContext;
use crate::queue::{self, JobPayload};

/// Interval between housekeeping passes.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub queues: Vec<QueueName>,
    pub count: usize,
    /// Exit once no job is available instead of polling.
    pub burst: bool,
    pub poll_interval: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &vf_core::config::WorkerConfig) -> Self {
        Self {
            queues: config.queues.clone(),
            count: config.count.max(1),
            burst: false,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Run `options.count` workers until cancelled (or drained, in burst mode).
///
/// Returns the total number of jobs processed.
pub async fn run_workers(ctx: AppContext, options: WorkerOptions, cancel: CancellationToken) -> usize {
    if let Err(e) = recover_abandoned(&ctx) {
        tracing::warn!("Could not recover abandoned jobs: {e}");
    }

    let pid = std::process::id();
    let handles: Vec<_> = (0..options.count.max(1))
        .map(|i| {
            let ctx = ctx.clone();
            let options = options.clone();
            let cancel = cancel.clone();
            let name = format!("vf-worker-{pid}-{i}");
            tokio::spawn(async move { run_worker(ctx, options, name, cancel).await })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        match handle.await {
            Ok(n) => total += n,
            Err(e) => tracing::error!("Worker task panicked: {e}"),
        }
    }
    total
}

/// A single worker loop.
pub async fn run_worker(
    ctx: AppContext,
    options: WorkerOptions,
    name: String,
    cancel: CancellationToken,
) -> usize {
    tracing::info!(worker = %name, queues = ?options.queues, burst = options.burst, "Worker started");
    let mut processed = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match work_one(&ctx, &options.queues, &name).await {
            Ok(true) => {
                processed += 1;
                continue;
            }
            Ok(false) if options.burst => break,
            Ok(false) => {}
            Err(e) => tracing::error!(worker = %name, "Worker error: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(options.poll_interval) => {}
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!(worker = %name, processed, "Worker stopped");
    processed
}

/// Claim and run one job. `Ok(false)` when every queue is empty.
pub async fn work_one(ctx: &AppContext, queues: &[QueueName], worker: &str) -> Result<bool> {
    let job = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::jobs::dequeue_next(&conn, queues, worker)?
    };
    let Some(job) = job else {
        return Ok(false);
    };

    tracing::info!(job_id = %job.id, queue = %job.queue, func = %job.func_name, "Running job");

    // A panicking job must still leave a terminal row behind.
    let outcome = match JobPayload::decode(&job) {
        Ok(payload) => {
            let task_ctx = ctx.clone();
            tokio::spawn(async move { execute(&task_ctx, &payload).await })
                .await
                .unwrap_or_else(|e| Err(Error::Internal(format!("job panicked: {e}"))))
        }
        Err(e) => Err(e),
    };

    let conn = vf_db::pool::get_conn(&ctx.db)?;
    match outcome {
        Ok(result) => {
            vf_db::queries::jobs::finish_job(&conn, job.id, Some(&result))?;
            tracing::info!(job_id = %job.id, %result, "Job finished");
        }
        Err(e) => {
            vf_db::queries::jobs::fail_job(&conn, job.id, &e.to_string())?;
            handle_failed_job(&job, &e);
        }
    }
    Ok(true)
}

fn handle_failed_job(job: &Job, error: &Error) {
    tracing::error!(
        job_id = %job.id,
        queue = %job.queue,
        func = %job.func_name,
        error = %error,
        "Job failed"
    );
}

/// Run a payload and return a short result summary.
pub async fn execute(ctx: &AppContext, payload: &JobPayload) -> Result<String> {
    match payload {
        JobPayload::ProcessVideo {
            video_id,
            resolution,
        } => process_video(ctx, *video_id, resolution).await,
        JobPayload::ProcessAllResolutions {
            video_id,
            resolutions,
        } => process_all_resolutions(ctx, *video_id, resolutions),
        JobPayload::RegenerateStream {
            video_id,
            resolution,
            force,
        } => regenerate_stream(ctx, *video_id, resolution, *force).await,
        JobPayload::CleanupOldSegments { video_id, days_old } => {
            let dir = vf_av::layout::video_hls_dir(ctx.media_root(), *video_id);
            let max_age = Duration::from_secs(days_old.saturating_mul(24 * 60 * 60));
            let removed = vf_av::cleanup_old_segments(&dir, max_age)?;
            Ok(format!("removed {removed} segments"))
        }
        JobPayload::GenerateThumbnail { video_id, force } => {
            generate_thumbnail(ctx, *video_id, *force).await
        }
        JobPayload::SendActivationEmail { user_id, base_url } => {
            send_activation_email(ctx, *user_id, base_url).await
        }
        JobPayload::SendPasswordResetEmail {
            user_id,
            frontend_url,
        } => send_password_reset_email(ctx, *user_id, frontend_url).await,
    }
}

/// Load a video that has a local source file.
fn video_with_file(ctx: &AppContext, video_id: VideoId) -> Result<(Video, String)> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let video = vf_db::queries::videos::get_video(&conn, video_id)?
        .ok_or_else(|| Error::not_found("video", video_id))?;
    let file = video
        .file()
        .map(str::to_owned)
        .ok_or_else(|| Error::Validation(format!("Video {video_id} has no video file")))?;
    Ok((video, file))
}

async fn process_video(ctx: &AppContext, video_id: VideoId, resolution: &str) -> Result<String> {
    let (_, file) = video_with_file(ctx, video_id)?;
    let rendition = Rendition::or_default(resolution);
    let input = vf_av::layout::media_file(ctx.media_root(), &file)?;
    let output = vf_av::layout::rendition_dir(ctx.media_root(), video_id, rendition);

    let stream =
        vf_av::create_hls_stream(&ctx.tools, &input, &output, rendition, &ctx.config.transcode)
            .await?;
    tracing::info!(video_id = %video_id, %rendition, segments = stream.segment_count(), "HLS stream created");
    Ok(format!("{rendition}: {} segments", stream.segment_count()))
}

fn process_all_resolutions(
    ctx: &AppContext,
    video_id: VideoId,
    resolutions: &[Rendition],
) -> Result<String> {
    let mut queued = Vec::new();
    for &rendition in resolutions {
        let dir = vf_av::layout::rendition_dir(ctx.media_root(), video_id, rendition);
        if vf_av::get_hls_segments(&dir).is_some() {
            tracing::info!(video_id = %video_id, %rendition, "Stream already exists");
            continue;
        }
        queue::enqueue(
            &ctx.db,
            QueueName::Default,
            &JobPayload::ProcessVideo {
                video_id,
                resolution: rendition.to_string(),
            },
        )?;
        queued.push(rendition.to_string());
    }
    Ok(format!("queued [{}]", queued.join(", ")))
}

async fn regenerate_stream(
    ctx: &AppContext,
    video_id: VideoId,
    resolution: &str,
    force: bool,
) -> Result<String> {
    video_with_file(ctx, video_id)?;
    let rendition = Rendition::or_default(resolution);

    if force {
        let dir = vf_av::layout::rendition_dir(ctx.media_root(), video_id, rendition);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
            tracing::info!(video_id = %video_id, %rendition, "Removed existing stream");
        }
    }

    let job = queue::enqueue(
        &ctx.db,
        QueueName::Default,
        &JobPayload::ProcessVideo {
            video_id,
            resolution: rendition.to_string(),
        },
    )?;
    Ok(format!("queued {}", job.id))
}

async fn generate_thumbnail(ctx: &AppContext, video_id: VideoId, force: bool) -> Result<String> {
    let (video, file) = video_with_file(ctx, video_id)?;
    if !force && video.thumbnail.as_deref().is_some_and(|t| !t.is_empty()) {
        return Ok("thumbnail already present".into());
    }

    let settings = &ctx.config.transcode;
    let input = vf_av::layout::media_file(ctx.media_root(), &file)?;
    let output = vf_av::layout::thumbnail_path(ctx.media_root(), video_id);
    vf_av::extract_thumbnail(
        &ctx.tools,
        &input,
        &output,
        &settings.thumbnail_timestamp,
        Duration::from_secs(settings.thumbnail_timeout_secs),
    )
    .await?;

    let rel = vf_av::layout::thumbnail_rel_path(video_id);
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    vf_db::queries::videos::update_thumbnail(&conn, video_id, &rel)?;
    ctx.video_cache.invalidate();
    Ok(rel)
}

async fn send_activation_email(ctx: &AppContext, user_id: UserId, base_url: &str) -> Result<String> {
    let user = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::users::get_user_by_id(&conn, user_id)?
            .ok_or_else(|| Error::not_found("user", user_id))?
    };
    let token = user
        .activation_token
        .ok_or_else(|| Error::Validation(format!("User {user_id} has no activation token")))?;

    let link = accounts::activation_link(base_url, user.id, token);
    let mail = accounts::activation_email(&ctx.config.mail.from, &user.email, &link);
    ctx.mailer.send(&mail).await?;
    Ok(format!("sent to {}", user.email))
}

async fn send_password_reset_email(
    ctx: &AppContext,
    user_id: UserId,
    frontend_url: &str,
) -> Result<String> {
    let user = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        vf_db::queries::users::get_user_by_id(&conn, user_id)?
            .ok_or_else(|| Error::not_found("user", user_id))?
    };
    let token = user
        .password_reset_token
        .ok_or_else(|| Error::Validation(format!("User {user_id} has no password reset token")))?;

    let link = accounts::password_reset_link(frontend_url, user.id, token);
    let mail = accounts::password_reset_email(&ctx.config.mail.from, &user.email, &link);
    ctx.mailer.send(&mail).await?;
    Ok(format!("sent to {}", user.email))
}

/// RFC 3339 timestamp `age` ago, or `None` if that predates chrono's range.
fn cutoff(age: Duration) -> Option<String> {
    let age = chrono::Duration::from_std(age).ok()?;
    Utc::now()
        .checked_sub_signed(age)
        .map(vf_db::models::format_timestamp)
}

/// Fail jobs whose worker died mid-run so they can be retried or re-queued.
pub fn recover_abandoned(ctx: &AppContext) -> Result<usize> {
    let Some(before) = cutoff(Duration::from_secs(ctx.config.worker.abandoned_after_secs)) else {
        return Ok(0);
    };
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let n = vf_db::queries::jobs::fail_abandoned(&conn, &before)?;
    if n > 0 {
        tracing::warn!(count = n, "Marked abandoned jobs as failed");
    }
    Ok(n)
}

/// Delete finished and failed jobs past the retention window.
pub fn purge_old_jobs(ctx: &AppContext) -> Result<usize> {
    let hours = ctx.config.worker.job_retention_hours;
    let Some(before) = cutoff(Duration::from_secs(hours.saturating_mul(60 * 60))) else {
        return Ok(0);
    };
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    vf_db::queries::jobs::purge_finished(&conn, &before)
}

/// One housekeeping pass. Failures are logged and do not stop the others.
pub fn maintenance_pass(ctx: &AppContext) {
    match vf_db::pool::get_conn(&ctx.db)
        .and_then(|conn| vf_db::queries::token_blacklist::purge_expired(&conn))
    {
        Ok(0) => {}
        Ok(n) => tracing::info!(purged = n, "Purged expired blacklisted tokens"),
        Err(e) => tracing::warn!("Blacklist purge failed: {e}"),
    }

    if let Err(e) = recover_abandoned(ctx) {
        tracing::warn!("Abandoned job recovery failed: {e}");
    }

    match purge_old_jobs(ctx) {
        Ok(0) => {}
        Ok(n) => tracing::info!(purged = n, "Purged old job records"),
        Err(e) => tracing::warn!("Job purge failed: {e}"),
    }
    ctx.auth_limiter.retain_recent();
}

/// Run [`maintenance_pass`] every hour until cancelled.
pub async fn run_maintenance(ctx: AppContext, cancel: CancellationToken) {
    loop {
        maintenance_pass(&ctx);

        tokio::select! {
            _ = tokio::time::sleep(MAINTENANCE_INTERVAL) => {}
            _ = cancel.cancelled() => break,
        }
    }
}
