//! Where generated media lives under the media root.
//!
//! ```text
//! {media_root}/hls/{video_id}/{rendition}/playlist.m3u8
//! {media_root}/hls/{video_id}/{rendition}/segment_000.ts
//! {media_root}/thumbnails/video_{video_id}_thumbnail.jpg
//! ```

use std::path::{Component, Path, PathBuf};

use vf_core::{Error, Rendition, Result, VideoId};

pub const PLAYLIST_NAME: &str = "playlist.m3u8";
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

/// Check that `rel` names something inside the media root.
///
/// Absolute paths, `..` and drive prefixes are refused.
pub fn check_relative(rel: &str) -> Result<&Path> {
    let path = Path::new(rel);
    let inside = !rel.trim().is_empty()
        && !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if inside {
        Ok(path)
    } else {
        Err(Error::UnsafePath(rel.to_string()))
    }
}

/// Absolute location of a file stored relative to the media root.
pub fn media_file(media_root: &Path, rel: &str) -> Result<PathBuf> {
    check_relative(rel).map(|p| media_root.join(p))
}

/// All renditions of one video.
pub fn video_hls_dir(media_root: &Path, video_id: VideoId) -> PathBuf {
    media_root.join("hls").join(video_id.to_string())
}

pub fn rendition_dir(media_root: &Path, video_id: VideoId, rendition: Rendition) -> PathBuf {
    video_hls_dir(media_root, video_id).join(rendition.to_string())
}

pub fn playlist_path(media_root: &Path, video_id: VideoId, rendition: Rendition) -> PathBuf {
    rendition_dir(media_root, video_id, rendition).join(PLAYLIST_NAME)
}

/// Thumbnail path relative to the media root, as stored on the video row.
pub fn thumbnail_rel_path(video_id: VideoId) -> String {
    format!("thumbnails/video_{video_id}_thumbnail.jpg")
}

pub fn thumbnail_path(media_root: &Path, video_id: VideoId) -> PathBuf {
    media_root.join(thumbnail_rel_path(video_id))
}
