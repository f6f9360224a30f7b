//! Video catalog operations.

use rusqlite::Connection;
use vf_core::{Error, Result, VideoId};

use crate::models::{now_timestamp, NewVideo, Video};

const COLS: &str = "id, title, description, category, thumbnail_url, thumbnail,
    video_file, video_url, duration, is_active, created_at, updated_at";

/// Insert a new (active) video and return it.
pub fn create_video(conn: &Connection, new: &NewVideo) -> Result<Video> {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO videos (title, description, category, thumbnail_url, thumbnail,
            video_file, video_url, duration, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
        rusqlite::params![
            new.title,
            new.description,
            new.category.to_string(),
            new.thumbnail_url,
            new.thumbnail,
            new.video_file,
            new.video_url,
            new.duration,
            now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let id = VideoId::from(conn.last_insert_rowid());
    get_video(conn, id)?.ok_or_else(|| Error::not_found("video", id))
}

/// Get a video by ID regardless of its active flag.
pub fn get_video(conn: &Connection, id: VideoId) -> Result<Option<Video>> {
    let q = format!("SELECT {COLS} FROM videos WHERE id = ?1");
    match conn.query_row(&q, [id.get()], Video::from_row) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get an active video by ID.
pub fn get_active_video(conn: &Connection, id: VideoId) -> Result<Option<Video>> {
    Ok(get_video(conn, id)?.filter(|v| v.is_active))
}

/// Get the first video with an exact title match.
pub fn get_video_by_title(conn: &Connection, title: &str) -> Result<Option<Video>> {
    let q = format!("SELECT {COLS} FROM videos WHERE title = ?1 ORDER BY id ASC LIMIT 1");
    match conn.query_row(&q, [title], Video::from_row) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

fn query_videos(conn: &Connection, where_clause: &str) -> Result<Vec<Video>> {
    let q = format!("SELECT {COLS} FROM videos {where_clause} ORDER BY created_at DESC, id DESC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], Video::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Active videos, newest first.
pub fn list_active_videos(conn: &Connection) -> Result<Vec<Video>> {
    query_videos(conn, "WHERE is_active = 1")
}

/// All videos that reference a local file, newest first.
pub fn list_videos_with_files(conn: &Connection) -> Result<Vec<Video>> {
    query_videos(conn, "WHERE video_file IS NOT NULL AND video_file != ''")
}

/// Set the stored thumbnail path (relative to the media root).
pub fn update_thumbnail(conn: &Connection, id: VideoId, thumbnail: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE videos SET thumbnail = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![thumbnail, now_timestamp(), id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete a video by ID. Returns true if a row was deleted.
pub fn delete_video(conn: &Connection, id: VideoId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM videos WHERE id = ?1", [id.get()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use vf_core::Category;

    fn sample(title: &str) -> NewVideo {
        NewVideo {
            title: title.to_string(),
            description: "desc".into(),
            category: Category::Drama,
            ..Default::default()
        }
    }

    #[test]
    fn create_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let v = create_video(&conn, &sample("Ocean")).unwrap();
        assert_eq!(v.title, "Ocean");
        assert_eq!(v.category, Category::Drama);
        assert!(v.is_active);
        assert_eq!(v.created_at, v.updated_at);

        let found = get_active_video(&conn, v.id).unwrap().unwrap();
        assert_eq!(found.id, v.id);
        assert!(get_video_by_title(&conn, "Ocean").unwrap().is_some());
        assert!(get_video_by_title(&conn, "Desert").unwrap().is_none());
    }

    #[test]
    fn list_is_newest_first() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = create_video(&conn, &sample("first")).unwrap();
        let b = create_video(&conn, &sample("second")).unwrap();

        let list = list_active_videos(&conn).unwrap();
        assert_eq!(list.iter().map(|v| v.id).collect::<Vec<_>>(), vec![b.id, a.id]);
    }

    #[test]
    fn inactive_videos_are_hidden() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let v = create_video(&conn, &sample("hidden")).unwrap();
        conn.execute("UPDATE videos SET is_active = 0 WHERE id = ?1", [v.id.get()])
            .unwrap();

        assert!(list_active_videos(&conn).unwrap().is_empty());
        assert!(get_active_video(&conn, v.id).unwrap().is_none());
        assert!(get_video(&conn, v.id).unwrap().is_some());
    }

    #[test]
    fn with_files_filter() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        create_video(&conn, &sample("no file")).unwrap();
        let mut with = sample("file");
        with.video_file = Some("videos/a.mp4".into());
        let v = create_video(&conn, &with).unwrap();

        let list = list_videos_with_files(&conn).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, v.id);
        assert_eq!(list[0].file(), Some("videos/a.mp4"));
    }

    #[test]
    fn thumbnail_and_delete() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let v = create_video(&conn, &sample("thumb")).unwrap();
        assert!(update_thumbnail(&conn, v.id, "thumbnails/video_1_thumbnail.jpg").unwrap());
        let updated = get_video(&conn, v.id).unwrap().unwrap();
        assert_eq!(updated.thumbnail.as_deref(), Some("thumbnails/video_1_thumbnail.jpg"));

        assert!(delete_video(&conn, v.id).unwrap());
        assert!(!delete_video(&conn, v.id).unwrap());
    }
}
