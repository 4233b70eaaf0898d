//! Voice-to-text adapter
//!
//! A transcription attempt converts the inbound recording to 16 kHz mono WAV
//! inside a scratch directory that is removed when the attempt ends, then asks
//! the speech backend for text. Every failure leaves the caller free to retry.

mod ffmpeg;
mod whisper;

pub use ffmpeg::FfmpegConverter;
pub use whisper::WhisperBackend;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionError {
    #[error("Failed to download voice message: {0}")]
    Download(String),
    #[error("Audio conversion failed: {0}")]
    AudioConversion(String),
    #[error("Speech was not recognized")]
    SpeechUnrecognized,
    #[error("Speech service error: {0}")]
    Backend(String),
}

impl TranscriptionError {
    /// Text shown to the user; the displayed question stays up for a retry
    pub fn user_notice(&self) -> String {
        match self {
            Self::Download(_) => "Could not download the voice message. Please send it again.".to_string(),
            Self::AudioConversion(_) => {
                "Could not convert the voice message. Make sure ffmpeg is installed.".to_string()
            }
            Self::SpeechUnrecognized => "Could not recognize speech. Please try again.".to_string(),
            Self::Backend(e) => format!("Speech recognition service error: {e}"),
        }
    }
}

/// Container format of an inbound recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// Telegram voice notes: Opus in Ogg
    #[default]
    Ogg,
    Mp3,
    M4a,
    Wav,
    Webm,
}

impl AudioFormat {
    pub fn from_mime(mime: Option<&str>) -> Self {
        match mime.map(str::to_ascii_lowercase).as_deref() {
            Some("audio/mpeg" | "audio/mp3") => Self::Mp3,
            Some("audio/mp4" | "audio/m4a" | "audio/x-m4a") => Self::M4a,
            Some("audio/wav" | "audio/x-wav" | "audio/wave") => Self::Wav,
            Some("audio/webm") => Self::Webm,
            _ => Self::Ogg,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Wav => "wav",
            Self::Webm => "webm",
        }
    }
}

/// Converts a recording into speech-backend ready WAV bytes
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// `scratch` is an empty directory owned by the current attempt
    async fn to_wav(
        &self,
        scratch: &Path,
        audio: &[u8],
        format: AudioFormat,
    ) -> Result<Vec<u8>, TranscriptionError>;
}

/// Speech recognition service
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn recognize(&self, wav: Vec<u8>, language: &str) -> Result<String, TranscriptionError>;
}

/// The contract the conversation runtime consumes
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        language: &str,
    ) -> Result<String, TranscriptionError>;
}

#[async_trait]
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        language: &str,
    ) -> Result<String, TranscriptionError> {
        (**self).transcribe(audio, format, language).await
    }
}

/// Converter + backend pipeline with per-attempt scratch space
pub struct SpeechTranscriber<C, B> {
    converter: C,
    backend: B,
    scratch_root: PathBuf,
}

impl<C: AudioConverter, B: SpeechBackend> SpeechTranscriber<C, B> {
    pub fn new(converter: C, backend: B) -> Self {
        Self {
            converter,
            backend,
            scratch_root: std::env::temp_dir(),
        }
    }

    /// Place scratch directories under `root` instead of the system temp dir
    #[cfg(test)]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }
}

#[async_trait]
impl<C: AudioConverter, B: SpeechBackend> Transcriber for SpeechTranscriber<C, B> {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        language: &str,
    ) -> Result<String, TranscriptionError> {
        // Removed on drop, whichever way this function returns
        let scratch = tempfile::Builder::new()
            .prefix("voice-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| TranscriptionError::AudioConversion(format!("scratch directory: {e}")))?;

        let wav = self.converter.to_wav(scratch.path(), audio, format).await?;
        tracing::debug!(bytes = wav.len(), "Converted voice message");

        let text = self.backend.recognize(wav, language).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::SpeechUnrecognized);
        }
        Ok(text.to_string())
    }
}
