//! Questionnaire bot
//!
//! Walks authorized chat users through predefined questionnaires, accepting
//! typed or spoken answers, and delivers each completed test as a single
//! formatted line.

mod catalog;
mod config;
mod controller;
mod gateway;
mod result_format;
mod runtime;
mod session;
mod transcription;

use catalog::TestCatalog;
use config::BotConfig;
use gateway::TelegramGateway;
use runtime::Dispatcher;
use session::SessionStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{FfmpegConverter, SpeechTranscriber, WhisperBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "questionnaire_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = BotConfig::from_env()?;

    tracing::info!(path = %config.catalog_path.display(), "Loading test catalog");
    let catalog = TestCatalog::load(&config.catalog_path)?;
    tracing::info!(count = catalog.len(), tests = ?catalog.names(), "Test catalog loaded");

    tracing::info!(
        admins = config.access.len(),
        ffmpeg = %config.ffmpeg_path.display(),
        speech_endpoint = %config.speech.endpoint,
        language = %config.speech.language,
        "Configuration loaded"
    );

    let gateway = Arc::new(TelegramGateway::new(&config.telegram)?);
    let transcriber = Arc::new(SpeechTranscriber::new(
        FfmpegConverter::new(config.ffmpeg_path.clone()),
        WhisperBackend::new(&config.speech)?,
    ));

    let dispatcher = Dispatcher::new(
        Arc::new(catalog),
        SessionStore::new(),
        gateway.clone(),
        transcriber,
        config.access,
        config.speech.language,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown requested");
            cancel.cancel();
        }
    });

    gateway.run_long_polling(&dispatcher, cancel).await;

    Ok(())
}
