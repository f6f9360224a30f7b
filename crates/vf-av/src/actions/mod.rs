//! Media processing actions: HLS packaging and thumbnail extraction.

mod hls;
mod thumbnail;

pub use hls::{
    build_hls_args, cleanup_old_segments, create_hls_stream, ensure_hls_stream, get_hls_segments,
    HlsStream,
};
pub use thumbnail::{build_thumbnail_args, extract_thumbnail};
