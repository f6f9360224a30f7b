//! Job queue operations.
//!
//! Jobs live in a single table partitioned by queue name. Workers claim
//! work with an atomic `UPDATE ... RETURNING`, draining lower `queue_rank`
//! first and then the oldest job.

use rusqlite::Connection;
use vf_core::{Error, JobId, JobStatus, QueueName, Result};

use crate::models::{now_timestamp, Job};

const COLS: &str = "id, queue, func_name, payload, status, result, error, worker,
    created_at, started_at, ended_at";

/// Insert a queued job.
pub fn enqueue_job(
    conn: &Connection,
    queue: QueueName,
    func_name: &str,
    payload: &str,
) -> Result<Job> {
    let id = JobId::new();
    let now = now_timestamp();

    conn.execute(
        "INSERT INTO jobs (id, queue, queue_rank, func_name, payload, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'queued', ?6)",
        rusqlite::params![
            id.to_string(),
            queue.to_string(),
            queue.rank(),
            func_name,
            payload,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Job {
        id,
        queue,
        func_name: func_name.to_string(),
        payload: payload.to_string(),
        status: JobStatus::Queued,
        result: None,
        error: None,
        worker: None,
        created_at: now,
        started_at: None,
        ended_at: None,
    })
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let q = format!("SELECT {COLS} FROM jobs WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Job::from_row) {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Atomically claim the next queued job from any of `queues`.
///
/// Sets `status='started'`, `worker` and `started_at`.
pub fn dequeue_next(conn: &Connection, queues: &[QueueName], worker: &str) -> Result<Option<Job>> {
    if queues.is_empty() {
        return Ok(None);
    }
    let ranks = queues
        .iter()
        .map(|q| q.rank().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    // SQLite RETURNING is supported since 3.35.
    let q = format!(
        "UPDATE jobs SET status='started', worker=?1, started_at=?2
         WHERE id = (
             SELECT id FROM jobs WHERE status='queued' AND queue_rank IN ({ranks})
             ORDER BY queue_rank ASC, created_at ASC, rowid ASC LIMIT 1
         )
         RETURNING {COLS}"
    );

    match conn.query_row(&q, rusqlite::params![worker, now_timestamp()], Job::from_row) {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Mark a job as finished with an optional result summary.
pub fn finish_job(conn: &Connection, id: JobId, result: Option<&str>) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE jobs SET status='finished', result=?1, ended_at=?2 WHERE id=?3",
            rusqlite::params![result, now_timestamp(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a job as failed.
pub fn fail_job(conn: &Connection, id: JobId, error: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE jobs SET status='failed', error=?1, ended_at=?2 WHERE id=?3",
            rusqlite::params![error, now_timestamp(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Queued jobs of one queue, oldest first.
pub fn list_queued(conn: &Connection, queue: QueueName) -> Result<Vec<Job>> {
    let q = format!(
        "SELECT {COLS} FROM jobs WHERE status='queued' AND queue=?1
         ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([queue.to_string()], Job::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

pub fn count_by_status(conn: &Connection, status: JobStatus) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE status=?1",
        [status.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete every queued job in `queue`. Returns the number removed.
pub fn clear_queue(conn: &Connection, queue: QueueName) -> Result<usize> {
    conn.execute(
        "DELETE FROM jobs WHERE status='queued' AND queue=?1",
        [queue.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Put every failed job back on its queue. Returns the number requeued.
pub fn retry_failed(conn: &Connection) -> Result<usize> {
    conn.execute(
        "UPDATE jobs SET status='queued', error=NULL, result=NULL, worker=NULL,
            started_at=NULL, ended_at=NULL
         WHERE status='failed'",
        [],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Fail every job claimed before `started_before` that never finished.
///
/// A worker killed mid-job leaves its row `started` forever, which would
/// block [`has_pending`] deduplication and [`retry_failed`].
pub fn fail_abandoned(conn: &Connection, started_before: &str) -> Result<usize> {
    conn.execute(
        "UPDATE jobs
         SET status='failed', ended_at=?2,
             error='abandoned by worker ' || COALESCE(worker, '?')
         WHERE status='started' AND started_at < ?1",
        rusqlite::params![started_before, now_timestamp()],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete finished and failed jobs that ended before `ended_before`.
pub fn purge_finished(conn: &Connection, ended_before: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM jobs WHERE status IN ('finished', 'failed') AND ended_at < ?1",
        [ended_before],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// `true` when a queued or started job with exactly this payload exists.
pub fn has_pending(conn: &Connection, func_name: &str, payload: &str) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM jobs
         WHERE func_name=?1 AND payload=?2 AND status IN ('queued', 'started')",
        rusqlite::params![func_name, payload],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format_timestamp;
    use crate::pool::init_memory_pool;
    use chrono::{Duration, Utc};

    fn backdate(conn: &Connection, id: JobId, column: &str, hours: i64) {
        let ts = format_timestamp(Utc::now() - Duration::hours(hours));
        conn.execute(
            &format!("UPDATE jobs SET {column}=?1 WHERE id=?2"),
            rusqlite::params![ts, id.to_string()],
        )
        .unwrap();
    }

    #[test]
    fn enqueue_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let job = enqueue_job(&conn, QueueName::Default, "process_video", "{}").unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let found = get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(found.queue, QueueName::Default);
        assert_eq!(found.func_name, "process_video");
    }

    #[test]
    fn dequeue_prefers_high_then_oldest() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let low = enqueue_job(&conn, QueueName::Low, "cleanup", "{}").unwrap();
        let d1 = enqueue_job(&conn, QueueName::Default, "a", "{}").unwrap();
        let _d2 = enqueue_job(&conn, QueueName::Default, "b", "{}").unwrap();
        let high = enqueue_job(&conn, QueueName::High, "c", "{}").unwrap();

        let all = QueueName::ALL;
        let first = dequeue_next(&conn, &all, "w1").unwrap().unwrap();
        assert_eq!(first.id, high.id);
        assert_eq!(first.status, JobStatus::Started);
        assert_eq!(first.worker.as_deref(), Some("w1"));

        let second = dequeue_next(&conn, &all, "w1").unwrap().unwrap();
        assert_eq!(second.id, d1.id);

        // restricted to low only
        let only_low = dequeue_next(&conn, &[QueueName::Low], "w2").unwrap().unwrap();
        assert_eq!(only_low.id, low.id);
    }

    #[test]
    fn dequeue_empty() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(dequeue_next(&conn, &QueueName::ALL, "w").unwrap().is_none());
        enqueue_job(&conn, QueueName::Low, "x", "{}").unwrap();
        assert!(dequeue_next(&conn, &[], "w").unwrap().is_none());
        assert!(dequeue_next(&conn, &[QueueName::High], "w").unwrap().is_none());
    }

    #[test]
    fn finish_fail_and_retry() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let ok = enqueue_job(&conn, QueueName::Default, "ok", "{}").unwrap();
        let bad = enqueue_job(&conn, QueueName::Default, "bad", "{}").unwrap();
        dequeue_next(&conn, &QueueName::ALL, "w").unwrap();
        dequeue_next(&conn, &QueueName::ALL, "w").unwrap();

        assert!(finish_job(&conn, ok.id, Some("done")).unwrap());
        assert!(fail_job(&conn, bad.id, "boom").unwrap());

        let failed = get_job(&conn, bad.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.ended_at.is_some());
        assert_eq!(count_by_status(&conn, JobStatus::Failed).unwrap(), 1);

        assert_eq!(retry_failed(&conn).unwrap(), 1);
        let retried = get_job(&conn, bad.id).unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Queued);
        assert!(retried.error.is_none());

        let finished = get_job(&conn, ok.id).unwrap().unwrap();
        assert_eq!(finished.status, JobStatus::Finished);
        assert_eq!(finished.result.as_deref(), Some("done"));
    }

    #[test]
    fn list_and_clear_queue() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        enqueue_job(&conn, QueueName::High, "a", "{}").unwrap();
        enqueue_job(&conn, QueueName::High, "b", "{}").unwrap();
        enqueue_job(&conn, QueueName::Low, "c", "{}").unwrap();

        assert_eq!(list_queued(&conn, QueueName::High).unwrap().len(), 2);
        assert_eq!(clear_queue(&conn, QueueName::High).unwrap(), 2);
        assert!(list_queued(&conn, QueueName::High).unwrap().is_empty());
        assert_eq!(list_queued(&conn, QueueName::Low).unwrap().len(), 1);
    }

    #[test]
    fn pending_detection() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let payload = r#"{"video_id":1,"resolution":"720p"}"#;
        assert!(!has_pending(&conn, "process_video", payload).unwrap());

        let job = enqueue_job(&conn, QueueName::Default, "process_video", payload).unwrap();
        assert!(has_pending(&conn, "process_video", payload).unwrap());

        dequeue_next(&conn, &QueueName::ALL, "w").unwrap();
        assert!(has_pending(&conn, "process_video", payload).unwrap());

        finish_job(&conn, job.id, None).unwrap();
        assert!(!has_pending(&conn, "process_video", payload).unwrap());
    }

    #[test]
    fn abandoned_jobs_become_retryable() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let payload = r#"{"video_id":3,"resolution":"480p"}"#;
        let stuck = enqueue_job(&conn, QueueName::Default, "process_video", payload).unwrap();
        let running = enqueue_job(&conn, QueueName::Default, "process_video", "{}").unwrap();
        dequeue_next(&conn, &QueueName::ALL, "dead-worker").unwrap();
        dequeue_next(&conn, &QueueName::ALL, "live-worker").unwrap();
        backdate(&conn, stuck.id, "started_at", 2);

        let cutoff = format_timestamp(Utc::now() - Duration::hours(1));
        assert_eq!(fail_abandoned(&conn, &cutoff).unwrap(), 1);

        let failed = get_job(&conn, stuck.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("abandoned by worker dead-worker"));
        assert!(!has_pending(&conn, "process_video", payload).unwrap());
        assert_eq!(
            get_job(&conn, running.id).unwrap().unwrap().status,
            JobStatus::Started
        );

        assert_eq!(retry_failed(&conn).unwrap(), 1);
        assert!(has_pending(&conn, "process_video", payload).unwrap());
    }

    #[test]
    fn purge_keeps_recent_and_unfinished_jobs() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let old_ok = enqueue_job(&conn, QueueName::Default, "a", "{}").unwrap();
        let old_bad = enqueue_job(&conn, QueueName::Default, "b", "{}").unwrap();
        let fresh = enqueue_job(&conn, QueueName::Default, "c", "{}").unwrap();
        let queued = enqueue_job(&conn, QueueName::Low, "d", "{}").unwrap();
        for _ in 0..3 {
            dequeue_next(&conn, &[QueueName::Default], "w").unwrap();
        }
        finish_job(&conn, old_ok.id, None).unwrap();
        fail_job(&conn, old_bad.id, "boom").unwrap();
        finish_job(&conn, fresh.id, None).unwrap();
        backdate(&conn, old_ok.id, "ended_at", 48);
        backdate(&conn, old_bad.id, "ended_at", 48);

        let cutoff = format_timestamp(Utc::now() - Duration::hours(24));
        assert_eq!(purge_finished(&conn, &cutoff).unwrap(), 2);
        assert!(get_job(&conn, old_ok.id).unwrap().is_none());
        assert!(get_job(&conn, old_bad.id).unwrap().is_none());
        assert!(get_job(&conn, fresh.id).unwrap().is_some());
        assert!(get_job(&conn, queued.id).unwrap().is_some());
    }
}
