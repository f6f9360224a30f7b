//! File streaming with HTTP range support via `ReaderStream`.

use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use vf_core::Error;

const CHUNK: usize = 64 * 1024;

/// A parsed `Range: bytes=...` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=START-` or `bytes=START-END`.
    From { start: u64, end: Option<u64> },
    /// `bytes=-N`: the last N bytes.
    Suffix(u64),
}

impl ByteRange {
    /// Inclusive `(start, end)` within a file of `size` bytes, or `None`
    /// when unsatisfiable.
    pub fn resolve(self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        let last = size - 1;
        match self {
            Self::From { start, end } => {
                let end = end.unwrap_or(last).min(last);
                (start <= end).then_some((start, end))
            }
            Self::Suffix(0) => None,
            Self::Suffix(n) => Some((size.saturating_sub(n), last)),
        }
    }
}

/// Parse a single-range `Range` header value. Multi-range requests are
/// not supported and parse as `None`.
pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        return end.parse().ok().map(ByteRange::Suffix);
    }
    let start = start.parse().ok()?;
    let end = if end.is_empty() { None } else { Some(end.parse().ok()?) };
    Some(ByteRange::From { start, end })
}

/// MIME type by file extension.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "ts" => "video/MP2T",
        _ => "application/octet-stream",
    }
}

/// Serve `file_path` as `content_type`, honouring a `Range` header.
///
/// `extra_headers` are added to every response, including 416.
pub async fn serve_file_streaming(
    file_path: &Path,
    content_type: &str,
    range_header: Option<&str>,
    extra_headers: &[(HeaderName, &'static str)],
) -> Result<Response, Error> {
    let metadata = tokio::fs::metadata(file_path)
        .await
        .map_err(|_| Error::not_found("file", file_path.display()))?;
    let file_size = metadata.len();

    let range = range_header.and_then(parse_range_header);

    let mut response = match range {
        Some(range) => match range.resolve(file_size) {
            Some((start, end)) => {
                let length = end - start + 1;
                let mut file = tokio::fs::File::open(file_path)
                    .await
                    .map_err(|_| Error::not_found("file", file_path.display()))?;
                file.seek(std::io::SeekFrom::Start(start)).await?;
                let body = Body::from_stream(ReaderStream::with_capacity(file.take(length), CHUNK));

                (
                    StatusCode::PARTIAL_CONTENT,
                    [
                        (header::CONTENT_TYPE, content_type.to_string()),
                        (header::CONTENT_RANGE, format!("bytes {start}-{end}/{file_size}")),
                        (header::CONTENT_LENGTH, length.to_string()),
                        (header::ACCEPT_RANGES, "bytes".to_string()),
                    ],
                    body,
                )
                    .into_response()
            }
            None => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{file_size}"))],
                Body::empty(),
            )
                .into_response(),
        },
        None => {
            let file = tokio::fs::File::open(file_path)
                .await
                .map_err(|_| Error::not_found("file", file_path.display()))?;
            let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK));

            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, file_size.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                body,
            )
                .into_response()
        }
    };

    let headers = response.headers_mut();
    for (name, value) in extra_headers {
        headers.insert(name.clone(), HeaderValue::from_static(value));
    }
    Ok(response)
}
