//! Whisper-compatible `/audio/transcriptions` backend

use super::{SpeechBackend, TranscriptionError};
use crate::config::SpeechConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;

pub struct WhisperBackend {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl WhisperBackend {
    pub fn new(config: &SpeechConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/audio/transcriptions", config.endpoint.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

/// Whisper wants ISO-639-1 codes; accept locale tags like `ru-RU`
fn whisper_language(language: &str) -> Option<&str> {
    let code = language.split(['-', '_']).next().unwrap_or_default().trim();
    if code.is_empty() || code.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(code)
    }
}

#[async_trait]
impl SpeechBackend for WhisperBackend {
    async fn recognize(&self, wav: Vec<u8>, language: &str) -> Result<String, TranscriptionError> {
        let audio = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Backend(format!("audio part: {e}")))?;

        let mut form = Form::new()
            .part("file", audio)
            .text("model", self.model.clone())
            .text("response_format", "text")
            .text("temperature", "0");
        if let Some(code) = whisper_language(language) {
            form = form.text("language", code.to_string());
        }

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = %status, body = %body, "Speech service rejected request");
            return Err(TranscriptionError::Backend(format!("HTTP {status}")));
        }

        let text = body.trim();
        if text.is_empty() {
            return Err(TranscriptionError::SpeechUnrecognized);
        }
        Ok(text.to_string())
    }
}
