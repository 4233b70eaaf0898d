//! Events that drive a user's session

use crate::gateway::VoiceNote;
use crate::session::MessageId;
use crate::transcription::TranscriptionError;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    Start,
    Text {
        message_id: MessageId,
        text: String,
    },
    Voice {
        message_id: MessageId,
        voice: VoiceNote,
    },
    Skip,

    // Runtime feedback
    /// A prompt (menu or question) was sent as a new message
    PromptDisplayed { message_id: MessageId },
    /// Outcome of a transcription started for `question_index` of `test`
    /// during session run `generation`
    TranscriptionFinished {
        test: String,
        question_index: usize,
        generation: u64,
        outcome: Result<String, TranscriptionError>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Text { .. } => "text",
            Event::Voice { .. } => "voice",
            Event::Skip => "skip",
            Event::PromptDisplayed { .. } => "prompt_displayed",
            Event::TranscriptionFinished { .. } => "transcription_finished",
        }
    }
}
