//! Runtime for executing user sessions
//!
//! One `UserRuntime` task per user consumes that user's events strictly in
//! arrival order; different users proceed in parallel. The only state shared
//! between users is the immutable catalog and the session store.

mod executor;


pub use executor::UserRuntime;

use crate::catalog::TestCatalog;
use crate::config::AccessList;
use crate::controller::Event;
use crate::gateway::{ChatGateway, Inbound, InboundKind};
use crate::session::{SessionStore, UserId};
use crate::transcription::Transcriber;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::Instrument;

pub const ACCESS_DENIED: &str = "You do not have access to this bot.";
pub const QUEUE_FULL_NOTICE: &str = "Too many messages at once. Please wait for the bot to catch up.";
const USER_QUEUE_CAPACITY: usize = 32;

/// Routes inbound events to per-user runtimes after the access check
pub struct Dispatcher<G, T>
where
    G: ChatGateway + 'static,
    T: Transcriber + 'static,
{
    catalog: Arc<TestCatalog>,
    store: SessionStore,
    gateway: Arc<G>,
    transcriber: Arc<T>,
    access: AccessList,
    language: String,
    runtimes: RwLock<HashMap<UserId, mpsc::Sender<Event>>>,
}

impl<G, T> Dispatcher<G, T>
where
    G: ChatGateway + 'static,
    T: Transcriber + 'static,
{
    pub fn new(
        catalog: Arc<TestCatalog>,
        store: SessionStore,
        gateway: Arc<G>,
        transcriber: Arc<T>,
        access: AccessList,
        language: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            store,
            gateway,
            transcriber,
            access,
            language: language.into(),
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Check access and enqueue the event on the user's runtime
    ///
    /// Never waits on a user's queue or on the gateway, so one slow chat
    /// cannot hold up the updates of everyone else.
    pub async fn dispatch(&self, inbound: Inbound) {
        let Inbound { user_id, kind } = inbound;

        if !self.access.allows(user_id.0) {
            tracing::info!(user_id = %user_id, "Rejecting unauthorized user");
            self.send_detached(user_id, ACCESS_DENIED);
            return;
        }

        let mut event = match kind {
            InboundKind::StartCommand => Event::Start,
            InboundKind::Text { message_id, text } => Event::Text { message_id, text },
            InboundKind::Voice { message_id, voice } => Event::Voice { message_id, voice },
            InboundKind::Skip => Event::Skip,
        };

        // A closed queue means the runtime died; replace it once
        for _ in 0..2 {
            let event_tx = self.runtime_for(user_id).await;
            match event_tx.try_send(event) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    tracing::warn!(user_id = %user_id, event = dropped.name(), "User queue full, dropping event");
                    self.send_detached(user_id, QUEUE_FULL_NOTICE);
                    return;
                }
                Err(mpsc::error::TrySendError::Closed(returned)) => {
                    tracing::error!(user_id = %user_id, "User runtime stopped, restarting");
                    self.discard_runtime(user_id).await;
                    event = returned;
                }
            }
        }
        tracing::error!(user_id = %user_id, "Dropping event, user runtime keeps failing");
    }

    /// Send a plain notice without holding up the caller
    fn send_detached(&self, user_id: UserId, text: &'static str) {
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.send_message(user_id, text, None).await {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to send notice");
            }
        });
    }

    async fn runtime_for(&self, user_id: UserId) -> mpsc::Sender<Event> {
        if let Some(event_tx) = self.runtimes.read().await.get(&user_id) {
            return event_tx.clone();
        }

        self.runtimes
            .write()
            .await
            .entry(user_id)
            .or_insert_with(|| self.spawn_runtime(user_id))
            .clone()
    }

    fn spawn_runtime(&self, user_id: UserId) -> mpsc::Sender<Event> {
        let (event_tx, event_rx) = mpsc::channel(USER_QUEUE_CAPACITY);
        let runtime = UserRuntime::new(
            user_id,
            self.catalog.clone(),
            self.store.clone(),
            self.gateway.clone(),
            self.transcriber.clone(),
            self.language.clone(),
            event_rx,
            event_tx.clone(),
        );

        tracing::debug!(user_id = %user_id, "Starting user runtime");
        tokio::spawn(
            runtime
                .run()
                .instrument(tracing::info_span!("user", user_id = %user_id)),
        );
        event_tx
    }

    /// Forget a dead runtime; its session restarts from scratch without a stray prompt
    async fn discard_runtime(&self, user_id: UserId) {
        self.runtimes.write().await.remove(&user_id);
        let stale_prompt = self.store.get(user_id).and_then(|s| s.active_message);
        self.store.reset(user_id);

        if let Some(message_id) = stale_prompt {
            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.delete_message(user_id, message_id).await {
                    tracing::warn!(user_id = %user_id, error = %e, "Failed to delete stale prompt");
                }
            });
        }
    }
}
