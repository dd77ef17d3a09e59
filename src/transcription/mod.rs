//! Speech-to-text for audio commands.
//!
//! The `/command` endpoint hands uploaded audio to a [`Transcriber`] and feeds
//! the resulting text to the command interpreter. [`WhisperClient`] is the
//! HTTP implementation.

mod client;

pub use client::WhisperClient;

use crate::error::Result;
use async_trait::async_trait;

/// File extensions the transcription service accepts
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "mp4", "mpeg", "mpga", "m4a", "wav", "webm"];

const SUPPORTED_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/mp4",
    "audio/wav",
    "audio/x-wav",
    "audio/webm",
    "audio/m4a",
];

/// Audio file uploaded by a device
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl AudioUpload {
    pub fn is_supported_format(&self) -> bool {
        is_supported_format(&self.filename, self.content_type.as_deref())
    }
}

/// Accepts a file when either its extension or its MIME type is supported.
pub fn is_supported_format(filename: &str, content_type: Option<&str>) -> bool {
    let extension_ok = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()));

    // Parameters such as `; codecs=opus` are ignored
    let mime_ok = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .is_some_and(|ct| SUPPORTED_MIME_TYPES.contains(&ct.as_str()));

    extension_ok || mime_ok
}

/// Converts recorded speech to text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Returns the trimmed transcript, which may be empty for silent audio.
    async fn transcribe(&self, audio: AudioUpload) -> Result<String>;
}
