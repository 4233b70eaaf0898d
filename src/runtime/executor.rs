//! User session runtime executor

use crate::catalog::TestCatalog;
use crate::controller::{transition, Effect, Event, TransitionError};
use crate::gateway::{ChatGateway, Controls};
use crate::session::{SessionStore, UserId};
use crate::transcription::{AudioFormat, Transcriber, TranscriptionError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Applies one user's events in order and executes the resulting effects
pub struct UserRuntime<G, T>
where
    G: ChatGateway + 'static,
    T: Transcriber + 'static,
{
    user_id: UserId,
    catalog: Arc<TestCatalog>,
    store: SessionStore,
    gateway: Arc<G>,
    transcriber: Arc<T>,
    language: String,
    event_rx: mpsc::Receiver<Event>,
    /// Handed to transcription tasks so their outcome re-enters the queue
    event_tx: mpsc::Sender<Event>,
}

impl<G, T> UserRuntime<G, T>
where
    G: ChatGateway + 'static,
    T: Transcriber + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        catalog: Arc<TestCatalog>,
        store: SessionStore,
        gateway: Arc<G>,
        transcriber: Arc<T>,
        language: String,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            user_id,
            catalog,
            store,
            gateway,
            transcriber,
            language,
            event_rx,
            event_tx,
        }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.event_rx.recv().await {
            self.process_event(event).await;
        }
        tracing::debug!(user_id = %self.user_id, "User runtime stopped");
    }

    async fn process_event(&mut self, event: Event) {
        // Follow-up events are applied before the next queued event
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let event_name = current_event.name();
            let catalog = &self.catalog;
            let outcome = self.store.mutate(self.user_id, |session| {
                let from = session.state.name();
                let result = transition(session, catalog, current_event)?;
                *session = result.new_session;
                Ok::<_, TransitionError>((from, session.clone(), result.effects))
            });

            let effects = match outcome {
                Ok((from, session, effects)) => {
                    tracing::debug!(
                        user_id = %self.user_id,
                        event = event_name,
                        from,
                        to = session.state.name(),
                        test = ?session.active_test(),
                        answers = session.answers.len(),
                        effects = effects.len(),
                        "Applied transition"
                    );
                    effects
                }
                Err(e) => {
                    if matches!(e, TransitionError::InvalidTransition(_)) {
                        tracing::error!(user_id = %self.user_id, event = event_name, error = %e, "Invalid transition");
                    } else {
                        tracing::debug!(user_id = %self.user_id, event = event_name, error = %e, "Event rejected");
                    }
                    self.send_plain(&e.to_string()).await;
                    continue;
                }
            };

            for effect in effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }
    }

    async fn execute_effect(&self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::ShowMenu { text, choices } => {
                self.send_prompt(&text, &Controls::Choices(choices)).await
            }

            Effect::ShowQuestion { text, replace } => {
                if let Some(message_id) = replace {
                    match self
                        .gateway
                        .edit_message(self.user_id, message_id, &text, Some(&Controls::Skip))
                        .await
                    {
                        Ok(()) => return None,
                        // The replacement reports back and the old handle gets deleted
                        Err(e) => tracing::warn!(
                            user_id = %self.user_id,
                            message_id = %message_id,
                            error = %e,
                            "Editing question failed, sending a new one"
                        ),
                    }
                }
                self.send_prompt(&text, &Controls::Skip).await
            }

            Effect::DeleteMessage { message_id } => {
                if let Err(e) = self.gateway.delete_message(self.user_id, message_id).await {
                    tracing::warn!(
                        user_id = %self.user_id,
                        message_id = %message_id,
                        error = %e,
                        "Failed to delete message"
                    );
                }
                None
            }

            Effect::Notify { text } => {
                self.send_plain(&text).await;
                None
            }

            Effect::DeliverResult { text } => {
                tracing::info!(user_id = %self.user_id, "Delivering test result");
                self.send_plain(&text).await;
                None
            }

            Effect::Transcribe {
                voice,
                test,
                question_index,
                generation,
            } => {
                let gateway = self.gateway.clone();
                let transcriber = self.transcriber.clone();
                let language = self.language.clone();
                let event_tx = self.event_tx.clone();
                let user_id = self.user_id;

                // Only the I/O runs off the queue; the outcome is applied in order with other events
                tokio::spawn(
                    async move {
                        let outcome = match gateway.download_voice(&voice).await {
                            Ok(audio) => {
                                let format = AudioFormat::from_mime(voice.mime_type.as_deref());
                                transcriber.transcribe(&audio, format, &language).await
                            }
                            Err(e) => Err(TranscriptionError::Download(e.to_string())),
                        };

                        match &outcome {
                            Ok(text) => tracing::info!(chars = text.chars().count(), "Voice answer transcribed"),
                            Err(e) => tracing::warn!(error = %e, "Transcription failed"),
                        }

                        let finished = Event::TranscriptionFinished {
                            test,
                            question_index,
                            generation,
                            outcome,
                        };
                        if event_tx.send(finished).await.is_err() {
                            tracing::warn!("User runtime gone before transcription finished");
                        }
                    }
                    .instrument(tracing::info_span!("transcription", user_id = %user_id)),
                );
                None
            }
        }
    }

    /// Send a tracked prompt; its handle comes back as `PromptDisplayed`
    async fn send_prompt(&self, text: &str, controls: &Controls) -> Option<Event> {
        match self
            .gateway
            .send_message(self.user_id, text, Some(controls))
            .await
        {
            Ok(message_id) => Some(Event::PromptDisplayed { message_id }),
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "Failed to send prompt");
                None
            }
        }
    }

    async fn send_plain(&self, text: &str) {
        if let Err(e) = self.gateway.send_message(self.user_id, text, None).await {
            tracing::warn!(user_id = %self.user_id, error = %e, "Failed to send message");
        }
    }
}
