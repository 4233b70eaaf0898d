//! Property-based tests for the state machine
//!
//! These tests drive random event sequences through `transition` while a tiny
//! chat model executes the prompt effects, and check the session invariants
//! after every step.

use super::transition::*;
use super::*;
use crate::catalog::{TestCatalog, TestDefinition};
use crate::gateway::VoiceNote;
use crate::session::{MessageId, SessionState, UserId, UserSession};
use crate::transcription::TranscriptionError;
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Test Helpers
// ============================================================================

const USER: UserId = UserId(1);

fn test_catalog() -> TestCatalog {
    TestCatalog::from_definitions(vec![
        TestDefinition::new("T1", ["Name?", "Age?"], "T1", "|"),
        TestDefinition::new("T2", ["A", "B", "C"], "T2", ";"),
        TestDefinition::new("T3", ["Only"], "T3", ","),
    ])
    .unwrap()
}

/// Chat model: which prompt messages are currently visible
#[derive(Default)]
struct Chat {
    prompts: HashSet<MessageId>,
    next_id: i64,
}

impl Chat {
    fn new_prompt(&mut self) -> MessageId {
        self.next_id += 1;
        let id = MessageId(self.next_id);
        self.prompts.insert(id);
        id
    }

    /// Apply effects the way the runtime does, returning follow-up events
    fn execute(&mut self, effects: Vec<Effect>) -> Vec<Event> {
        let mut follow_ups = Vec::new();
        for effect in effects {
            match effect {
                Effect::ShowMenu { .. } | Effect::ShowQuestion { replace: None, .. } => {
                    let id = self.new_prompt();
                    follow_ups.push(Event::PromptDisplayed { message_id: id });
                }
                Effect::ShowQuestion {
                    replace: Some(id), ..
                } => assert!(self.prompts.contains(&id), "edited a prompt that is gone"),
                Effect::DeleteMessage { message_id } => {
                    self.prompts.remove(&message_id);
                }
                Effect::Notify { .. } | Effect::DeliverResult { .. } | Effect::Transcribe { .. } => {}
            }
        }
        follow_ups
    }
}

/// Process one inbound event plus its follow-ups; errors leave the session as is
fn step(session: UserSession, catalog: &TestCatalog, chat: &mut Chat, event: Event) -> UserSession {
    let mut session = session;
    let mut pending = vec![event];
    while let Some(event) = pending.pop() {
        if let Ok(result) = transition(&session, catalog, event) {
            session = result.new_session;
            pending.extend(chat.execute(result.effects));
        }
    }
    session
}

fn check_invariants(session: &UserSession, catalog: &TestCatalog, chat: &Chat) {
    match &session.state {
        SessionState::AwaitingAnswer { test, index } => {
            let def = catalog.lookup(test).unwrap();
            assert!(session.answers.len() <= *index);
            assert!(*index < def.question_count(), "completion must fold back to idle");
            for (q, _) in session.answers.iter() {
                assert!(def.questions.iter().any(|d| d == q));
            }
        }
        SessionState::Idle => {
            assert!(session.answers.is_empty());
            assert_eq!(session.active_message, None);
        }
        SessionState::AwaitingSelection => assert!(session.answers.is_empty()),
    }

    assert!(chat.prompts.len() <= 1, "more than one prompt visible");
    let tracked: HashSet<MessageId> = session.active_message.into_iter().collect();
    assert_eq!(chat.prompts, tracked, "visible prompt must be the tracked one");
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

/// User message ids live far away from prompt ids
fn arb_user_message_id() -> impl Strategy<Value = MessageId> {
    (1_000_000i64..2_000_000).prop_map(MessageId)
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("T1".to_string()),
        Just("T2".to_string()),
        Just("T3".to_string()),
        "[a-z0-9 ]{0,12}",
    ]
}

fn arb_transcription_error() -> impl Strategy<Value = TranscriptionError> {
    prop_oneof![
        Just(TranscriptionError::SpeechUnrecognized),
        "[a-z]{1,8}".prop_map(TranscriptionError::AudioConversion),
        "[a-z]{1,8}".prop_map(TranscriptionError::Backend),
        "[a-z]{1,8}".prop_map(TranscriptionError::Download),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        1 => Just(Event::Start),
        4 => (arb_user_message_id(), arb_text())
            .prop_map(|(message_id, text)| Event::Text { message_id, text }),
        2 => arb_user_message_id().prop_map(|message_id| Event::Voice {
            message_id,
            voice: VoiceNote {
                file_id: "f".to_string(),
                mime_type: None,
            },
        }),
        2 => Just(Event::Skip),
        2 => (
            prop_oneof![Just("T1".to_string()), Just("T2".to_string())],
            0usize..3,
            0u64..6,
            prop_oneof![
                "[a-z]{1,6}".prop_map(Ok::<String, TranscriptionError>),
                arb_transcription_error().prop_map(Err::<String, TranscriptionError>),
            ],
        )
            .prop_map(|(test, question_index, generation, outcome)| Event::TranscriptionFinished {
                test,
                question_index,
                generation,
                outcome,
            }),
    ]
}

fn arb_answering_session() -> impl Strategy<Value = UserSession> {
    (0usize..3, proptest::option::of(1i64..100), 0u64..10).prop_map(|(index, active, generation)| {
        UserSession {
            state: SessionState::AwaitingAnswer {
                test: "T2".to_string(),
                index,
            },
            active_message: active.map(MessageId),
            generation,
            ..UserSession::new(USER)
        }
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Session and chat invariants hold after every processed event
    #[test]
    fn prop_invariants_hold_for_any_sequence(events in proptest::collection::vec(arb_event(), 1..40)) {
        let catalog = test_catalog();
        let mut chat = Chat::default();
        let mut session = UserSession::new(USER);
        for event in events {
            let before_index = session.current_question_index();
            let before_test = session.active_test().map(str::to_string);
            session = step(session, &catalog, &mut chat, event);
            check_invariants(&session, &catalog, &chat);

            // Index never goes backwards while the same test stays active
            if before_test.is_some() && session.active_test().map(str::to_string) == before_test {
                prop_assert!(session.current_question_index() >= before_index);
            }
        }
    }

    /// Skip advances without recording
    #[test]
    fn prop_skip_never_records(session in arb_answering_session()) {
        let catalog = test_catalog();
        let result = transition(&session, &catalog, Event::Skip).unwrap();
        prop_assert_eq!(result.new_session.answers.len(), session.answers.len());

        let index = session.current_question_index();
        if index + 1 < 3 {
            prop_assert_eq!(result.new_session.current_question_index(), index + 1);
        } else {
            prop_assert_eq!(result.new_session.state, SessionState::Idle);
        }
    }

    /// Failed transcription changes nothing about the session
    #[test]
    fn prop_failed_transcription_is_inert(
        session in arb_answering_session(),
        error in arb_transcription_error(),
        question_index in 0usize..3,
    ) {
        let catalog = test_catalog();
        let result = transition(&session, &catalog, Event::TranscriptionFinished {
            test: "T2".to_string(),
            question_index,
            generation: session.generation,
            outcome: Err(error.clone()),
        }).unwrap();

        prop_assert_eq!(&result.new_session, &session);
        prop_assert_eq!(result.effects, vec![Effect::notify(error.user_notice())]);
    }

    /// A transcript from another run never becomes an answer
    #[test]
    fn prop_transcript_from_other_run_is_discarded(
        session in arb_answering_session(),
        other in 0u64..100,
        text in "[a-z]{1,6}",
    ) {
        prop_assume!(other != session.generation);
        let catalog = test_catalog();
        let result = transition(&session, &catalog, Event::TranscriptionFinished {
            test: "T2".to_string(),
            question_index: session.current_question_index(),
            generation: other,
            outcome: Ok(text),
        }).unwrap();

        prop_assert_eq!(&result.new_session, &session);
        prop_assert_eq!(result.effects, vec![Effect::notify(STALE_VOICE_NOTICE)]);
    }

    /// Start from any state lands on the menu with a clean slate
    #[test]
    fn prop_start_resets(session in arb_answering_session()) {
        let catalog = test_catalog();
        let result = transition(&session, &catalog, Event::Start).unwrap();
        prop_assert_eq!(&result.new_session.state, &SessionState::AwaitingSelection);
        prop_assert!(result.new_session.answers.is_empty());
        prop_assert_eq!(result.new_session.active_message, None);
        prop_assert_eq!(result.new_session.generation, session.generation + 1);
        let deletes = result.effects.iter().filter(|e| matches!(e, Effect::DeleteMessage { .. })).count();
        prop_assert_eq!(deletes, usize::from(session.active_message.is_some()));
    }
}
