//! # vf-av
//!
//! FFmpeg shell-outs and media file layout for videoflix.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Media layout** ([`layout`]) -- where HLS renditions and thumbnails
//!   live under the media root.
//! - **Action functions** ([`actions`]) -- HLS packaging per rendition,
//!   segment inspection and cleanup, and thumbnail extraction.

pub mod actions;
pub mod command;
pub mod layout;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use tools::{ToolInfo, ToolRegistry};

pub use actions::{
    cleanup_old_segments, create_hls_stream, ensure_hls_stream, extract_thumbnail,
    get_hls_segments, HlsStream,
};
