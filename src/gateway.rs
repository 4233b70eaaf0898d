//! Messaging gateway: inbound chat events and outbound UI actions

pub mod telegram;

use crate::session::{MessageId, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use telegram::TelegramGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {method}: {description}")]
    Api {
        method: &'static str,
        description: String,
    },
    #[error("Malformed response from {0}")]
    MalformedResponse(&'static str),
}

/// A voice recording as referenced by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceNote {
    pub file_id: String,
    pub mime_type: Option<String>,
}

/// Interactive controls attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Controls {
    /// Menu of choices the user answers by tapping one
    Choices(Vec<String>),
    /// Single "Skip" button under a question
    Skip,
}

/// An authorization-pending event from a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: UserId,
    pub kind: InboundKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    StartCommand,
    Text { message_id: MessageId, text: String },
    Voice { message_id: MessageId, voice: VoiceNote },
    Skip,
}

/// Outbound UI actions
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(
        &self,
        user: UserId,
        text: &str,
        controls: Option<&Controls>,
    ) -> Result<MessageId, GatewayError>;

    async fn edit_message(
        &self,
        user: UserId,
        message: MessageId,
        text: &str,
        controls: Option<&Controls>,
    ) -> Result<(), GatewayError>;

    async fn delete_message(&self, user: UserId, message: MessageId) -> Result<(), GatewayError>;

    /// Fetch the raw audio of a voice note
    async fn download_voice(&self, voice: &VoiceNote) -> Result<Vec<u8>, GatewayError>;
}

#[async_trait]
impl<T: ChatGateway + ?Sized> ChatGateway for Arc<T> {
    async fn send_message(
        &self,
        user: UserId,
        text: &str,
        controls: Option<&Controls>,
    ) -> Result<MessageId, GatewayError> {
        (**self).send_message(user, text, controls).await
    }

    async fn edit_message(
        &self,
        user: UserId,
        message: MessageId,
        text: &str,
        controls: Option<&Controls>,
    ) -> Result<(), GatewayError> {
        (**self).edit_message(user, message, text, controls).await
    }

    async fn delete_message(&self, user: UserId, message: MessageId) -> Result<(), GatewayError> {
        (**self).delete_message(user, message).await
    }

    async fn download_voice(&self, voice: &VoiceNote) -> Result<Vec<u8>, GatewayError> {
        (**self).download_voice(voice).await
    }
}
