//! Effects produced by state transitions

use crate::gateway::VoiceNote;
use crate::session::MessageId;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the test menu as a new message (reported back via `PromptDisplayed`)
    ShowMenu { text: String, choices: Vec<String> },

    /// Display a question with its Skip control, editing `replace` in place when set
    ShowQuestion {
        text: String,
        replace: Option<MessageId>,
    },

    /// Best-effort removal of a chat message
    DeleteMessage { message_id: MessageId },

    /// Plain informational message
    Notify { text: String },

    /// Send the rendered result
    DeliverResult { text: String },

    /// Transcribe a voice answer off the user's queue
    Transcribe {
        voice: VoiceNote,
        test: String,
        question_index: usize,
        generation: u64,
    },
}

impl Effect {
    pub fn delete(message_id: MessageId) -> Self {
        Effect::DeleteMessage { message_id }
    }

    pub fn notify(text: impl Into<String>) -> Self {
        Effect::Notify { text: text.into() }
    }
}
