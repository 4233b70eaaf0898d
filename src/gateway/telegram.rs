//! Telegram Bot API gateway over HTTPS long polling

use super::{ChatGateway, Controls, GatewayError, Inbound, InboundKind, VoiceNote};
use crate::config::TelegramConfig;
use crate::runtime::Dispatcher;
use crate::session::{MessageId, UserId};
use crate::transcription::Transcriber;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);
const MENU_ROW_WIDTH: usize = 2;
pub const SKIP_LABEL: &str = "Skip";
const SKIP_CALLBACK_PREFIX: &str = "skip";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice: Option<Voice>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Voice {
    file_id: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: TgUser,
    #[serde(default)]
    message: Option<TgMessage>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    #[serde(default)]
    file_path: Option<String>,
}

impl Update {
    /// Id of the callback query to acknowledge, if this is one
    fn callback_id(&self) -> Option<&str> {
        self.callback_query.as_ref().map(|c| c.id.as_str())
    }

    /// Translate into a gateway-neutral event; unsupported updates yield `None`
    pub fn into_inbound(self) -> Option<Inbound> {
        if let Some(callback) = self.callback_query {
            let data = callback.data.as_deref().unwrap_or_default();
            if data.split(':').next() != Some(SKIP_CALLBACK_PREFIX) {
                return None;
            }
            let user = callback
                .message
                .as_ref()
                .map_or(callback.from.id, |m| m.chat.id);
            return Some(Inbound {
                user_id: UserId(user),
                kind: InboundKind::Skip,
            });
        }

        let message = self.message?;
        let user_id = UserId(message.chat.id);
        let message_id = MessageId(message.message_id);

        if let Some(voice) = message.voice {
            return Some(Inbound {
                user_id,
                kind: InboundKind::Voice {
                    message_id,
                    voice: VoiceNote {
                        file_id: voice.file_id,
                        mime_type: voice.mime_type,
                    },
                },
            });
        }

        let text = message.text?;
        let kind = if is_start_command(&text) {
            InboundKind::StartCommand
        } else {
            InboundKind::Text { message_id, text }
        };
        Some(Inbound { user_id, kind })
    }
}

fn is_start_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    command == "/start" || command.starts_with("/start@")
}

fn reply_markup(user: UserId, controls: &Controls) -> Value {
    match controls {
        Controls::Choices(choices) => {
            let rows: Vec<Vec<Value>> = choices
                .chunks(MENU_ROW_WIDTH)
                .map(|row| row.iter().map(|c| json!({ "text": c })).collect())
                .collect();
            json!({ "keyboard": rows, "resize_keyboard": true })
        }
        Controls::Skip => json!({
            "inline_keyboard": [[{
                "text": SKIP_LABEL,
                "callback_data": format!("{SKIP_CALLBACK_PREFIX}:{user}"),
            }]]
        }),
    }
}

// ============================================================================
// Gateway
// ============================================================================

pub struct TelegramGateway {
    client: Client,
    api_base: String,
    file_base: String,
    poll_timeout: Duration,
}

impl TelegramGateway {
    pub fn new(config: &TelegramConfig) -> Result<Self, GatewayError> {
        // The HTTP timeout must outlive a full long poll
        let client = Client::builder()
            .timeout(config.poll_timeout + Duration::from_secs(15))
            .build()?;
        let api_url = config.api_url.trim_end_matches('/');
        Ok(Self {
            client,
            api_base: format!("{api_url}/bot{}", config.bot_token),
            file_base: format!("{api_url}/file/bot{}", config.bot_token),
            poll_timeout: config.poll_timeout,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: Value,
    ) -> Result<T, GatewayError> {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{method}", self.api_base))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(GatewayError::Api {
                method,
                description: response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        response.result.ok_or(GatewayError::MalformedResponse(method))
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, GatewayError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": self.poll_timeout.as_secs(),
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }

    /// Poll updates until cancelled, handing each one to the dispatcher in arrival order
    ///
    /// Dispatch only enqueues, so a slow chat never stalls polling.
    pub async fn run_long_polling<T: Transcriber + 'static>(
        &self,
        dispatcher: &Dispatcher<TelegramGateway, T>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Starting Telegram long polling");
        let mut offset = 0;

        loop {
            let polled = tokio::select! {
                () = cancel.cancelled() => break,
                polled = self.get_updates(offset) => polled,
            };

            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(callback_id) = update.callback_id() {
                    if let Err(e) = self.answer_callback(callback_id).await {
                        tracing::warn!(error = %e, "Failed to answer callback query");
                    }
                }
                match update.into_inbound() {
                    Some(inbound) => dispatcher.dispatch(inbound).await,
                    None => tracing::debug!("Ignoring unsupported update"),
                }
            }
        }

        tracing::info!("Telegram long polling stopped");
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn send_message(
        &self,
        user: UserId,
        text: &str,
        controls: Option<&Controls>,
    ) -> Result<MessageId, GatewayError> {
        let mut body = json!({ "chat_id": user.0, "text": text });
        if let Some(controls) = controls {
            body["reply_markup"] = reply_markup(user, controls);
        }
        let sent: TgMessage = self.call("sendMessage", body).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_message(
        &self,
        user: UserId,
        message: MessageId,
        text: &str,
        controls: Option<&Controls>,
    ) -> Result<(), GatewayError> {
        let mut body = json!({ "chat_id": user.0, "message_id": message.0, "text": text });
        if let Some(controls) = controls {
            body["reply_markup"] = reply_markup(user, controls);
        }
        // Result is the edited message, or `true` for inline messages
        let _: Value = self.call("editMessageText", body).await?;
        Ok(())
    }

    async fn delete_message(&self, user: UserId, message: MessageId) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": user.0, "message_id": message.0 }),
            )
            .await?;
        Ok(())
    }

    async fn download_voice(&self, voice: &VoiceNote) -> Result<Vec<u8>, GatewayError> {
        let file: TgFile = self
            .call("getFile", json!({ "file_id": voice.file_id }))
            .await?;
        let path = file
            .file_path
            .ok_or(GatewayError::MalformedResponse("getFile"))?;

        let bytes = self
            .client
            .get(format!("{}/{path}", self.file_base))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
