//! Catalog presentation: summary DTOs, thumbnail URL resolution and the
//! cached list.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use vf_core::Category;
use vf_db::models::Video;

use crate::context::AppContext;

/// One entry of `GET /api/video/`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct VideoSummary {
    pub id: i64,
    pub created_at: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub category: Category,
}

impl VideoSummary {
    pub fn from_video(video: &Video, site_base: &str, media_root: &Path) -> Self {
        Self {
            id: video.id.get(),
            created_at: video.created_at.clone(),
            title: video.title.clone(),
            description: video.description.clone(),
            thumbnail_url: resolve_thumbnail_url(video, site_base, media_root),
            category: video.category,
        }
    }
}

/// Pick the best thumbnail for `video`.
///
/// Order: uploaded thumbnail file, explicit `thumbnail_url`, generated
/// frame on disk, category placeholder.
pub fn resolve_thumbnail_url(video: &Video, site_base: &str, media_root: &Path) -> String {
    if let Some(thumb) = video.thumbnail.as_deref().filter(|t| !t.is_empty()) {
        if thumb.starts_with("http") {
            return thumb.to_string();
        }
        return media_url(site_base, thumb);
    }

    if let Some(url) = video.thumbnail_url.as_deref().filter(|u| !u.is_empty()) {
        return url.to_string();
    }

    if vf_av::layout::thumbnail_path(media_root, video.id).exists() {
        return media_url(site_base, &vf_av::layout::thumbnail_rel_path(video.id));
    }

    default_thumbnail_url(site_base, video.category)
}

/// `{site}/media/{rel}`.
pub fn media_url(site_base: &str, rel: &str) -> String {
    format!("{site_base}/media/{}", rel.trim_start_matches('/'))
}

pub fn default_thumbnail_url(site_base: &str, category: Category) -> String {
    let name = match category {
        Category::Action => "action",
        Category::Comedy => "comedy",
        Category::Drama => "drama",
        _ => "default",
    };
    format!("{site_base}/static/images/default_thumbnails/{name}.svg")
}

// ---------------------------------------------------------------------------
// VideoListCache
// ---------------------------------------------------------------------------

struct CachedList {
    stored_at: Instant,
    videos: Vec<VideoSummary>,
}

/// Single-entry TTL cache for the catalog list.
///
/// Every [`invalidate`](Self::invalidate) bumps a generation counter. A list
/// loaded before an invalidation carries the old generation and is dropped
/// by [`put`](Self::put) instead of overwriting fresher state.
pub struct VideoListCache {
    ttl: Duration,
    generation: AtomicU64,
    entry: RwLock<Option<CachedList>>,
}

impl VideoListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            entry: RwLock::new(None),
        }
    }

    /// Take this before reading the database and hand it to `put`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get(&self) -> Option<Vec<VideoSummary>> {
        let guard = self.entry.read();
        let cached = guard.as_ref()?;
        (cached.stored_at.elapsed() < self.ttl).then(|| cached.videos.clone())
    }

    pub fn put(&self, generation: u64, videos: Vec<VideoSummary>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entry = self.entry.write();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!("Discarding video list loaded before an invalidation");
            return;
        }
        *entry = Some(CachedList {
            stored_at: Instant::now(),
            videos,
        });
    }

    pub fn invalidate(&self) {
        let mut entry = self.entry.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *entry = None;
        tracing::debug!("Video list cache invalidated");
    }
}

/// Active videos, newest first, served from cache when fresh.
///
/// Database errors degrade to an empty list.
pub fn list_videos(ctx: &AppContext) -> Vec<VideoSummary> {
    if let Some(cached) = ctx.video_cache.get() {
        return cached;
    }

    let generation = ctx.video_cache.generation();
    let loaded = vf_db::pool::get_conn(&ctx.db)
        .and_then(|conn| vf_db::queries::videos::list_active_videos(&conn));

    match loaded {
        Ok(videos) => {
            let site = ctx.config.server.site_base();
            let summaries: Vec<VideoSummary> = videos
                .iter()
                .map(|v| VideoSummary::from_video(v, site, ctx.media_root()))
                .collect();
            ctx.video_cache.put(generation, summaries.clone());
            summaries
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load video list");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vf_core::VideoId;

    fn video(category: Category) -> Video {
        Video {
            id: VideoId::from(7),
            title: "Test".into(),
            description: String::new(),
            category,
            thumbnail_url: None,
            thumbnail: None,
            video_file: None,
            video_url: None,
            duration: None,
            is_active: true,
            created_at: "2026-01-01T00:00:00.000000Z".into(),
            updated_at: "2026-01-01T00:00:00.000000Z".into(),
        }
    }

    const SITE: &str = "http://127.0.0.1:8000";

    #[test]
    fn uploaded_thumbnail_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = video(Category::Drama);
        v.thumbnail = Some("thumbnails/custom.jpg".into());
        v.thumbnail_url = Some("https://cdn.example.com/x.jpg".into());
        assert_eq!(
            resolve_thumbnail_url(&v, SITE, dir.path()),
            "http://127.0.0.1:8000/media/thumbnails/custom.jpg"
        );

        v.thumbnail = Some("https://img.example.com/a.jpg".into());
        assert_eq!(resolve_thumbnail_url(&v, SITE, dir.path()), "https://img.example.com/a.jpg");
    }

    #[test]
    fn explicit_url_then_generated_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = video(Category::Other);
        v.thumbnail_url = Some("https://cdn.example.com/x.jpg".into());
        assert_eq!(resolve_thumbnail_url(&v, SITE, dir.path()), "https://cdn.example.com/x.jpg");

        v.thumbnail_url = None;
        let generated = vf_av::layout::thumbnail_path(dir.path(), v.id);
        std::fs::create_dir_all(generated.parent().unwrap()).unwrap();
        std::fs::write(&generated, b"jpg").unwrap();
        assert_eq!(
            resolve_thumbnail_url(&v, SITE, dir.path()),
            "http://127.0.0.1:8000/media/thumbnails/video_7_thumbnail.jpg"
        );
    }

    #[test]
    fn category_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_thumbnail_url(&video(Category::Action), SITE, dir.path())
            .ends_with("/static/images/default_thumbnails/action.svg"));
        assert!(resolve_thumbnail_url(&video(Category::Comedy), SITE, dir.path())
            .ends_with("/comedy.svg"));
        assert!(resolve_thumbnail_url(&video(Category::Horror), SITE, dir.path())
            .ends_with("/default.svg"));
    }

    #[test]
    fn cache_expires_and_invalidates() {
        let cache = VideoListCache::new(Duration::from_secs(60));
        assert!(cache.get().is_none());
        cache.put(cache.generation(), vec![]);
        assert!(cache.get().is_some());
        cache.invalidate();
        assert!(cache.get().is_none());

        let disabled = VideoListCache::new(Duration::ZERO);
        disabled.put(disabled.generation(), vec![]);
        assert!(disabled.get().is_none());
    }

    #[test]
    fn list_loaded_before_invalidation_is_not_stored() {
        let cache = VideoListCache::new(Duration::from_secs(300));
        let stale = VideoSummary::from_video(&video(Category::Drama), SITE, Path::new("/media"));

        let generation = cache.generation();
        // A delete lands between the database read and the store.
        cache.invalidate();
        cache.put(generation, vec![stale]);
        assert!(cache.get().is_none());

        cache.put(cache.generation(), vec![]);
        assert_eq!(cache.get().map(|v| v.len()), Some(0));
    }
}
