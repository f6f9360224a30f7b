//! Playlist text served by the streaming routes.

use vf_core::{Error, Rendition, Result, VideoId};

pub const MPEGURL: &str = "application/vnd.apple.mpegurl";

/// Playlist served when neither packaged output nor a source file exists.
pub const EMPTY_MANIFEST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:VOD\n#EXTINF:10.0,\n#EXT-X-ENDLIST\n";

/// Point every segment line of a packaged playlist at the segment route.
pub fn rewrite_playlist(playlist: &str, site_base: &str, video_id: VideoId, rendition: Rendition) -> String {
    let mut out = String::with_capacity(playlist.len() * 2);
    for line in playlist.lines() {
        let trimmed = line.trim();
        if trimmed.ends_with(".ts") {
            out.push_str(&format!("{site_base}/api/video/{video_id}/{rendition}/{trimmed}"));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Single-entry playlist that plays the source file while packaging runs.
pub fn fallback_manifest(media_url: &str) -> String {
    format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:VOD\n#EXTINF:10.0,\n{media_url}\n#EXT-X-ENDLIST\n"
    )
}

/// Master playlist wrapping an externally hosted stream.
pub fn external_manifest(url: &str, rendition: Rendition) -> String {
    format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION={rendition}\n{url}\n")
}

/// Reject segment names that could escape the rendition directory.
pub fn validate_segment_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(Error::Validation("Invalid segment filename".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_only_segment_lines() {
        let playlist = "#EXTM3U\n#EXTINF:10.0,\nsegment_000.ts\n#EXTINF:4.2,\nsegment_001.ts\n#EXT-X-ENDLIST\n";
        let out = rewrite_playlist(playlist, "http://h", VideoId::from(3), Rendition::P480);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[2], "http://h/api/video/3/480p/segment_000.ts");
        assert_eq!(lines[4], "http://h/api/video/3/480p/segment_001.ts");
        assert_eq!(lines[5], "#EXT-X-ENDLIST");
    }

    #[test]
    fn fallback_points_at_source() {
        let m = fallback_manifest("http://h/media/videos/a.mp4");
        assert!(m.starts_with("#EXTM3U"));
        assert!(m.contains("#EXTINF:10.0,\nhttp://h/media/videos/a.mp4\n"));
        assert!(m.trim_end().ends_with("#EXT-X-ENDLIST"));
    }

    #[test]
    fn external_master_playlist() {
        let m = external_manifest("https://cdn/x.m3u8", Rendition::P720);
        assert!(m.contains("#EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=720p\nhttps://cdn/x.m3u8"));
    }

    #[test]
    fn segment_names() {
        assert!(validate_segment_name("segment_000.ts").is_ok());
        for bad in ["../x.ts", "a/b.ts", "a\\b.ts", ".hidden", ""] {
            assert!(validate_segment_name(bad).is_err(), "{bad}");
        }
    }
}
