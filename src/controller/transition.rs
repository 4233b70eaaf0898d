//! Pure state transition function
//!
//! Given the same session, catalog and event it always produces the same
//! outcome, with no I/O. Invariants kept on every `Ok` result:
//! - `answers.len() <= index <= questions.len()` for the active test;
//! - answers only hold questions of the active test;
//! - at most one prompt message is tracked, and a replaced one is deleted.

use super::{Effect, Event};
use crate::catalog::{TestCatalog, TestDefinition};
use crate::result_format;
use crate::session::{SessionState, UserSession};
use thiserror::Error;

pub const MENU_PROMPT: &str = "Which test are we filling in?";
pub const RESULT_HEADER: &str = "Result:";
pub const STALE_VOICE_NOTICE: &str =
    "The voice answer arrived after the question changed and was discarded.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_session: UserSession,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: UserSession) -> Self {
        Self {
            new_session: session,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition; the session is left untouched
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Start with the /start command.")]
    NoActiveTest,
    #[error("Unknown test \"{0}\". Choose one from the menu.")]
    UnknownTest(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

#[allow(clippy::too_many_lines)]
pub fn transition(
    session: &UserSession,
    catalog: &TestCatalog,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (&session.state, event) {
        // ============================================================
        // Start: always allowed, tears down whatever prompt is shown
        // ============================================================
        (_, Event::Start) => {
            Ok(TransitionResult::new(session.next_run(SessionState::AwaitingSelection))
                .with_effects(session.active_message.map(Effect::delete))
                .with_effect(Effect::ShowMenu {
                    text: MENU_PROMPT.to_string(),
                    choices: catalog.names(),
                }))
        }

        // ============================================================
        // Test selection
        // ============================================================
        (SessionState::AwaitingSelection, Event::Text { message_id, text }) => {
            let definition = catalog
                .lookup(text.trim())
                .map_err(|_| TransitionError::UnknownTest(text))?;

            let mut effects = vec![Effect::delete(message_id)];
            effects.extend(session.active_message.map(Effect::delete));

            let started = session.next_run(SessionState::AwaitingAnswer {
                test: definition.name.clone(),
                index: 0,
            });
            Ok(present_next(started, definition, effects))
        }

        // ============================================================
        // Answering
        // ============================================================
        (SessionState::AwaitingAnswer { test, index }, Event::Text { message_id, text }) => {
            let definition = active_definition(catalog, test, *index)?;
            let next = record_answer(session, definition, *index, text);
            Ok(present_next(next, definition, vec![Effect::delete(message_id)]))
        }

        (SessionState::AwaitingAnswer { test, index }, Event::Voice { message_id, voice }) => {
            active_definition(catalog, test, *index)?;
            Ok(TransitionResult::new(session.clone())
                .with_effect(Effect::delete(message_id))
                .with_effect(Effect::Transcribe {
                    voice,
                    test: test.clone(),
                    question_index: *index,
                    generation: session.generation,
                }))
        }

        (SessionState::AwaitingAnswer { test, index }, Event::Skip) => {
            let definition = active_definition(catalog, test, *index)?;
            let mut next = session.clone();
            next.state = SessionState::AwaitingAnswer {
                test: test.clone(),
                index: index + 1,
            };
            Ok(present_next(next, definition, vec![]))
        }

        // ============================================================
        // Transcription outcomes
        // ============================================================
        (_, Event::TranscriptionFinished { outcome: Err(e), .. }) => {
            Ok(TransitionResult::new(session.clone()).with_effect(Effect::notify(e.user_notice())))
        }

        (
            SessionState::AwaitingAnswer { test, index },
            Event::TranscriptionFinished {
                test: for_test,
                question_index,
                generation,
                outcome: Ok(text),
            },
        ) if session.generation == generation && *test == for_test && *index == question_index => {
            let definition = active_definition(catalog, test, *index)?;
            let next = record_answer(session, definition, *index, text);
            Ok(present_next(next, definition, vec![]))
        }

        // The question or run it was spoken for is gone
        (_, Event::TranscriptionFinished { outcome: Ok(_), .. }) => {
            Ok(TransitionResult::new(session.clone()).with_effect(Effect::notify(STALE_VOICE_NOTICE)))
        }

        // ============================================================
        // Prompt bookkeeping
        // ============================================================
        (SessionState::Idle, Event::PromptDisplayed { message_id }) => {
            // Nothing to prompt for any more
            Ok(TransitionResult::new(session.clone()).with_effect(Effect::delete(message_id)))
        }

        (_, Event::PromptDisplayed { message_id }) => {
            let mut next = session.clone();
            let replaced = next
                .active_message
                .replace(message_id)
                .filter(|old| *old != message_id);
            Ok(TransitionResult::new(next).with_effects(replaced.map(Effect::delete)))
        }

        // ============================================================
        // Answers without an active test
        // ============================================================
        (SessionState::Idle | SessionState::AwaitingSelection, Event::Voice { message_id, .. }) => {
            // Voice notes never stay in the chat, answered or not
            Ok(TransitionResult::new(session.clone())
                .with_effect(Effect::delete(message_id))
                .with_effect(Effect::notify(TransitionError::NoActiveTest.to_string())))
        }

        (
            SessionState::Idle | SessionState::AwaitingSelection,
            Event::Text { .. } | Event::Skip,
        ) => Err(TransitionError::NoActiveTest),
    }
}

fn active_definition<'a>(
    catalog: &'a TestCatalog,
    test: &str,
    index: usize,
) -> Result<&'a TestDefinition, TransitionError> {
    let definition = catalog.lookup(test).map_err(|_| {
        TransitionError::InvalidTransition(format!("active test {test:?} is not in the catalog"))
    })?;
    if index >= definition.question_count() {
        return Err(TransitionError::InvalidTransition(format!(
            "question {index} is past the end of {test:?}"
        )));
    }
    Ok(definition)
}

fn record_answer(
    session: &UserSession,
    definition: &TestDefinition,
    index: usize,
    answer: String,
) -> UserSession {
    let mut next = session.clone();
    next.answers
        .record(definition.questions[index].clone(), answer);
    next.state = SessionState::AwaitingAnswer {
        test: definition.name.clone(),
        index: index + 1,
    };
    next
}

/// Show the question at the session's index, or complete the test
fn present_next(
    session: UserSession,
    definition: &TestDefinition,
    effects: Vec<Effect>,
) -> TransitionResult {
    match definition.questions.get(session.current_question_index()) {
        Some(question) => {
            let replace = session.active_message;
            TransitionResult::new(session)
                .with_effects(effects)
                .with_effect(Effect::ShowQuestion {
                    text: question.clone(),
                    replace,
                })
        }
        None => complete(session, definition, effects),
    }
}

fn complete(
    session: UserSession,
    definition: &TestDefinition,
    effects: Vec<Effect>,
) -> TransitionResult {
    let rendered = result_format::render(definition, &session.answers);
    TransitionResult::new(session.next_run(SessionState::Idle))
        .with_effects(effects)
        .with_effect(Effect::DeliverResult {
            text: format!("{RESULT_HEADER}\n{rendered}"),
        })
        .with_effects(session.active_message.map(Effect::delete))
}
