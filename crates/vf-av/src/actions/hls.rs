//! HLS packaging with libx264/aac via ffmpeg.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use vf_core::config::TranscodeConfig;
use vf_core::{Error, Rendition};

use crate::command::ToolCommand;
use crate::layout::{PLAYLIST_NAME, SEGMENT_PATTERN};
use crate::tools::ToolRegistry;

/// A packaged rendition found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsStream {
    pub playlist: PathBuf,
    /// `.ts` segments sorted by file name.
    pub segments: Vec<PathBuf>,
}

impl HlsStream {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Arguments for packaging `input` into `output_dir` at `rendition`.
///
/// Frames are scaled to fit the rendition and letterboxed so every output
/// has the exact rendition size.
pub fn build_hls_args(
    input: &Path,
    output_dir: &Path,
    rendition: Rendition,
    settings: &TranscodeConfig,
) -> Vec<String> {
    let (w, h) = rendition.dimensions();
    let kbps = rendition.bitrate_kbps();
    let bitrate = format!("{kbps}k");

    vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c:v".into(),
        "libx264".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:v".into(),
        bitrate.clone(),
        "-maxrate".into(),
        bitrate,
        "-bufsize".into(),
        format!("{}k", kbps * 2),
        "-vf".into(),
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        ),
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        settings.segment_secs.to_string(),
        "-hls_list_size".into(),
        "0".into(),
        "-hls_segment_filename".into(),
        output_dir.join(SEGMENT_PATTERN).to_string_lossy().into_owned(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-preset".into(),
        settings.preset.clone(),
        "-crf".into(),
        settings.crf.to_string(),
        output_dir.join(PLAYLIST_NAME).to_string_lossy().into_owned(),
    ]
}

/// Encode `input` into an HLS rendition under `output_dir`.
///
/// The directory is created if needed. Fails with [`Error::Tool`] when
/// ffmpeg is missing, exits non-zero, times out, or leaves no playlist.
pub async fn create_hls_stream(
    tools: &ToolRegistry,
    input: &Path,
    output_dir: &Path,
    rendition: Rendition,
    settings: &TranscodeConfig,
) -> vf_core::Result<HlsStream> {
    let ffmpeg = tools.require("ffmpeg")?;

    if !input.exists() {
        return Err(Error::not_found("video file", input.display()));
    }

    tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
        Error::Internal(format!(
            "Failed to create HLS output dir {}: {e}",
            output_dir.display()
        ))
    })?;

    tracing::info!(
        input = %input.display(),
        output = %output_dir.display(),
        %rendition,
        "Packaging HLS rendition"
    );

    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.timeout(Duration::from_secs(settings.timeout_secs));
    cmd.args(build_hls_args(input, output_dir, rendition, settings));
    cmd.execute().await?;

    get_hls_segments(output_dir)
        .ok_or_else(|| Error::tool("ffmpeg", "no playlist was written"))
}

/// Inspect a rendition directory.
///
/// Returns `None` when the directory or its playlist is missing. The
/// playlist is `playlist.m3u8` when present, else the first `.m3u8` by name.
pub fn get_hls_segments(dir: &Path) -> Option<HlsStream> {
    let entries = std::fs::read_dir(dir).ok()?;

    let mut playlists = Vec::new();
    let mut segments = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("m3u8") => playlists.push(path),
            Some("ts") => segments.push(path),
            _ => {}
        }
    }

    playlists.sort();
    segments.sort();

    let playlist = playlists
        .iter()
        .find(|p| p.file_name().is_some_and(|n| n == PLAYLIST_NAME))
        .or_else(|| playlists.first())?
        .clone();

    Some(HlsStream { playlist, segments })
}

/// Return the existing rendition or package it now.
pub async fn ensure_hls_stream(
    tools: &ToolRegistry,
    input: &Path,
    output_dir: &Path,
    rendition: Rendition,
    settings: &TranscodeConfig,
) -> vf_core::Result<HlsStream> {
    if let Some(existing) = get_hls_segments(output_dir) {
        tracing::debug!(dir = %output_dir.display(), "HLS rendition already present");
        return Ok(existing);
    }
    create_hls_stream(tools, input, output_dir, rendition, settings).await
}

/// Delete `.ts` files under `video_dir` (recursively) last modified before
/// `now - max_age`. Returns the number of files removed.
///
/// A missing directory removes nothing.
pub fn cleanup_old_segments(video_dir: &Path, max_age: Duration) -> vf_core::Result<usize> {
    if !video_dir.exists() {
        return Ok(0);
    }
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    let mut stack = vec![video_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().is_some_and(|e| e == "ts") && meta.modified()? < cutoff {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
    }

    if removed > 0 {
        tracing::info!(dir = %video_dir.display(), removed, "Removed old HLS segments");
    }
    Ok(removed)
}
