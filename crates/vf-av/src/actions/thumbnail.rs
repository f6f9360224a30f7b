//! Poster-frame extraction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use vf_core::Error;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

const THUMB_W: u32 = 320;
const THUMB_H: u32 = 180;

pub fn build_thumbnail_args(input: &Path, output: &Path, timestamp: &str) -> Vec<String> {
    vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-ss".into(),
        timestamp.to_string(),
        "-vframes".into(),
        "1".into(),
        "-q:v".into(),
        "2".into(),
        "-vf".into(),
        format!(
            "scale={THUMB_W}:{THUMB_H}:force_original_aspect_ratio=decrease,pad={THUMB_W}:{THUMB_H}:(ow-iw)/2:(oh-ih)/2"
        ),
        "-y".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Grab a single 320x180 JPEG frame at `timestamp` (`HH:MM:SS`).
pub async fn extract_thumbnail(
    tools: &ToolRegistry,
    input: &Path,
    output: &Path,
    timestamp: &str,
    timeout: Duration,
) -> vf_core::Result<PathBuf> {
    let ffmpeg = tools.require("ffmpeg")?;

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.timeout(timeout);
    cmd.args(build_thumbnail_args(input, output, timestamp));
    cmd.execute().await?;

    if !output.exists() {
        return Err(Error::tool("ffmpeg", "Thumbnail could not be created"));
    }

    tracing::debug!(output = %output.display(), "Extracted thumbnail");
    Ok(output.to_path_buf())
}
