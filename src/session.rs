//! Per-user conversation state and the store that owns it

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Chat user identity (also the chat the bot talks to)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a chat message owned by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Captured answers keyed by question text, in the order they were given
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answers(Vec<(String, String)>);

impl Answers {
    /// Record an answer, replacing a previous one for the same question
    pub fn record(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        let question = question.into();
        let answer = answer.into();
        match self.0.iter_mut().find(|(q, _)| *q == question) {
            Some(entry) => entry.1 = answer,
            None => self.0.push((question, answer)),
        }
    }

    pub fn get(&self, question: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(q, _)| q == question)
            .map(|(_, a)| a.as_str())
    }

    #[cfg(test)]
    pub fn contains(&self, question: &str) -> bool {
        self.get(question).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(q, a)| (q.as_str(), a.as_str()))
    }
}

/// Where a session is in the questionnaire flow
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No active test
    #[default]
    Idle,
    /// The test menu is displayed
    AwaitingSelection,
    /// Question `index` of `test` is displayed
    AwaitingAnswer { test: String, index: usize },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingSelection => "awaiting_selection",
            SessionState::AwaitingAnswer { .. } => "awaiting_answer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: UserId,
    pub state: SessionState,
    pub answers: Answers,
    /// The single outstanding prompt (menu or question) shown to this user
    pub active_message: Option<MessageId>,
    /// Bumped whenever a run starts or ends; late results from an earlier
    /// run carry an older value
    pub generation: u64,
}

impl UserSession {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            state: SessionState::Idle,
            answers: Answers::default(),
            active_message: None,
            generation: 0,
        }
    }

    /// Fresh session in `state` that starts a new run
    pub fn next_run(&self, state: SessionState) -> Self {
        Self {
            state,
            generation: self.generation.wrapping_add(1),
            ..Self::new(self.user_id)
        }
    }

    pub fn active_test(&self) -> Option<&str> {
        match &self.state {
            SessionState::AwaitingAnswer { test, .. } => Some(test),
            _ => None,
        }
    }

    /// Index of the displayed question; 0 when no test is active
    pub fn current_question_index(&self) -> usize {
        match &self.state {
            SessionState::AwaitingAnswer { index, .. } => *index,
            _ => 0,
        }
    }
}

/// Owner of all user sessions
///
/// `mutate` gives exclusive access to one session for the duration of a
/// closure. Closures must stay synchronous; ordering between transitions of
/// the same user is provided by that user's runtime queue.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<UserId, UserSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, UserSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, user_id: UserId) -> Option<UserSession> {
        self.lock().get(&user_id).cloned()
    }

    #[cfg(test)]
    pub fn contains(&self, user_id: UserId) -> bool {
        self.lock().contains_key(&user_id)
    }

    /// Return the user's session to its default state
    pub fn reset(&self, user_id: UserId) {
        self.lock().insert(user_id, UserSession::new(user_id));
    }

    pub fn mutate<R>(&self, user_id: UserId, f: impl FnOnce(&mut UserSession) -> R) -> R {
        let mut sessions = self.lock();
        let session = sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id));
        f(session)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
