use std::path::Path;

use thiserror::Error;

/// Largest payload a single ledger record accepts.
pub const RECORD_CEILING: usize = 100_000;
/// Room for the prefix, chunk namespace and push header around the payload.
pub const RECORD_OVERHEAD: usize = 64;
pub const MAX_CHUNK_SIZE: usize = RECORD_CEILING - RECORD_OVERHEAD;

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;
const MIN_ADAPTIVE_CHUNK_SIZE: usize = 25_000;

#[derive(Error, Debug, PartialEq)]
pub enum SizingError {
    #[error("chunk size {0} is outside 1..={max}", max = MAX_CHUNK_SIZE)]
    InvalidChunkSize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Image,
    Video,
    Audio,
    Document,
    Model,
    Text,
    Other,
}

impl ContentClass {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        let (kind, sub) = mime.split_once('/').unwrap_or((mime.as_str(), ""));

        match (kind, sub) {
            ("image", _) => ContentClass::Image,
            ("video", _) => ContentClass::Video,
            ("audio", _) => ContentClass::Audio,
            ("model", _) => ContentClass::Model,
            ("text", _) => ContentClass::Text,
            ("application", "json" | "xml" | "yaml" | "toml" | "x-ndjson") => ContentClass::Text,
            ("application", "pdf" | "msword" | "rtf" | "epub+zip") => ContentClass::Document,
            ("application", s) if s.starts_with("vnd.openxmlformats") => ContentClass::Document,
            ("application", s) if s.starts_with("vnd.oasis.opendocument") => ContentClass::Document,
            _ => ContentClass::Other,
        }
    }

    pub fn chunk_size(&self) -> usize {
        match self {
            ContentClass::Image => 95_000,
            ContentClass::Video => 95_000,
            ContentClass::Audio => 90_000,
            ContentClass::Model => 90_000,
            ContentClass::Document => 80_000,
            ContentClass::Text => 60_000,
            ContentClass::Other => DEFAULT_CHUNK_SIZE,
        }
    }
}

/// How the chunk size is picked before chunking starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingPolicy {
    /// Static table keyed by content class
    #[default]
    ByContentType,
    /// By total file size
    Dynamic,
    /// By measured upload throughput in bytes/second, falls back to
    /// `Dynamic` without a measurement
    Adaptive(Option<u64>),
    Fixed(usize),
}

impl SizingPolicy {
    pub fn resolve(&self, mime: &str, file_size: u64) -> Result<usize, SizingError> {
        let size = match *self {
            SizingPolicy::ByContentType => ContentClass::from_mime(mime).chunk_size(),
            SizingPolicy::Dynamic => dynamic(file_size),
            SizingPolicy::Adaptive(None) => dynamic(file_size),
            // Aim for roughly one record per second
            SizingPolicy::Adaptive(Some(bps)) => {
                (bps as usize).clamp(MIN_ADAPTIVE_CHUNK_SIZE, MAX_CHUNK_SIZE)
            }
            SizingPolicy::Fixed(size) => size,
        };

        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(SizingError::InvalidChunkSize(size));
        }
        Ok(size)
    }
}

fn dynamic(file_size: u64) -> usize {
    match file_size {
        0..=1_048_576 => DEFAULT_CHUNK_SIZE,
        1_048_577..=10_485_760 => 80_000,
        _ => 95_000,
    }
}

/// Best guess at a mime type from the file extension.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "glb" => "model/gltf-binary",
        "gltf" => "model/gltf+json",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
