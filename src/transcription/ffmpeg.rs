//! ffmpeg-backed audio conversion

use super::{AudioConverter, AudioFormat, TranscriptionError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const CONVERSION_TIMEOUT: Duration = Duration::from_secs(60);
const TARGET_SAMPLE_RATE: &str = "16000";

/// Runs ffmpeg with an argument vector; paths never pass through a shell
pub struct FfmpegConverter {
    ffmpeg: PathBuf,
}

impl FfmpegConverter {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-ac", "1", "-ar", TARGET_SAMPLE_RATE])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn to_wav(
        &self,
        scratch: &Path,
        audio: &[u8],
        format: AudioFormat,
    ) -> Result<Vec<u8>, TranscriptionError> {
        let input = scratch.join(format!("input.{}", format.extension()));
        let output = scratch.join("output.wav");

        tokio::fs::write(&input, audio)
            .await
            .map_err(|e| TranscriptionError::AudioConversion(format!("write input: {e}")))?;

        let result = tokio::time::timeout(CONVERSION_TIMEOUT, self.command(&input, &output).output())
            .await
            .map_err(|_| TranscriptionError::AudioConversion("ffmpeg timed out".to_string()))?
            .map_err(|e| {
                TranscriptionError::AudioConversion(format!(
                    "failed to run {}: {e}",
                    self.ffmpeg.display()
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscriptionError::AudioConversion(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        tokio::fs::read(&output)
            .await
            .map_err(|e| TranscriptionError::AudioConversion(format!("read output: {e}")))
    }
}
