use std::sync::Arc;

use shared::{
    domain::{Turn, TurnBody},
    protocol::{extract_answer, QueryRequest, DEFAULT_ANSWER_FIELDS},
};
use tokio::{
    runtime::Handle,
    sync::{broadcast, Mutex},
};
use tracing::{debug, error, info, warn};

use crate::{error::ClientError, session::SessionScope, transport::DocumentApi, ClientEvent};

/// Shown in place of an answer whenever a query cannot be completed.
pub const RECOVERY_MESSAGE: &str = "Sorry, I couldn't get a response. Please try again.";

pub const SUGGESTED_QUESTIONS: [&str; 3] = [
    "What is this document about?",
    "Summarize the main points",
    "Extract key information",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationPhase {
    #[default]
    Idle,
    /// Exactly one query is outstanding.
    Awaiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty question or a query already in flight; nothing changed.
    Ignored,
    Answered,
    /// The placeholder was replaced with the recovery message.
    Recovered,
}

/// Everything a renderer needs to draw the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub turns: Vec<Turn>,
    pub pending: bool,
    pub draft: String,
}

#[derive(Default)]
struct ConversationState {
    turns: Vec<Turn>,
    phase: ConversationPhase,
    draft: String,
}

impl ConversationState {
    /// `Idle -> Awaiting`. Returns the accepted question.
    fn begin(&mut self, question: &str) -> Option<String> {
        let question = question.trim();
        if question.is_empty() || self.phase == ConversationPhase::Awaiting {
            return None;
        }

        self.turns.push(Turn::user(question));
        self.turns.push(Turn::pending_assistant());
        self.draft.clear();
        self.phase = ConversationPhase::Awaiting;
        Some(question.to_string())
    }

    /// `Awaiting -> Idle`, filling the placeholder appended by `begin`.
    fn settle(&mut self, body: TurnBody) {
        match self.turns.last_mut() {
            Some(turn) if turn.is_pending() => turn.body = body,
            _ => error!("conversation: no pending placeholder to settle"),
        }
        self.phase = ConversationPhase::Idle;
    }

    fn event(&self) -> ClientEvent {
        ClientEvent::TranscriptUpdated {
            turns: self.turns.len(),
            pending: self.phase == ConversationPhase::Awaiting,
        }
    }
}

/// Settles the placeholder with the recovery message if `submit` is dropped
/// before its answer arrives.
struct PendingQuery {
    state: Arc<Mutex<ConversationState>>,
    events: broadcast::Sender<ClientEvent>,
    armed: bool,
}

impl PendingQuery {
    fn new(state: Arc<Mutex<ConversationState>>, events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            state,
            events,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    fn abandon(state: &mut ConversationState, events: &broadcast::Sender<ClientEvent>) {
        if state.phase != ConversationPhase::Awaiting {
            return;
        }
        let _ = events.send(ClientEvent::QueryRecovered {
            reason: "query abandoned before an answer arrived".into(),
        });
        state.settle(TurnBody::Failed(RECOVERY_MESSAGE.to_string()));
        let _ = events.send(state.event());
    }
}

impl Drop for PendingQuery {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("conversation: query dropped before completion, showing recovery message");
        if let Ok(mut state) = self.state.try_lock() {
            Self::abandon(&mut state, &self.events);
            return;
        }

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut state = state.lock().await;
                    Self::abandon(&mut state, &events);
                });
            }
            Err(_) => error!("conversation: no runtime to settle abandoned query"),
        }
    }
}

pub struct ConversationController {
    api: Arc<dyn DocumentApi>,
    session: Arc<SessionScope>,
    answer_fields: Vec<String>,
    inner: Arc<Mutex<ConversationState>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ConversationController {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        session: Arc<SessionScope>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            api,
            session,
            answer_fields: DEFAULT_ANSWER_FIELDS.iter().map(|f| f.to_string()).collect(),
            inner: Arc::new(Mutex::new(ConversationState::default())),
            events,
        }
    }

    /// Overrides the ordered list of response fields the answer is read from.
    pub fn with_answer_fields(mut self, answer_fields: Vec<String>) -> Self {
        if !answer_fields.is_empty() {
            self.answer_fields = answer_fields;
        }
        self
    }

    pub async fn submit(&self, question: &str) -> SubmitOutcome {
        let (question, event) = {
            let mut guard = self.inner.lock().await;
            let Some(question) = guard.begin(question) else {
                debug!(phase = ?guard.phase, "conversation: submit ignored");
                return SubmitOutcome::Ignored;
            };
            (question, guard.event())
        };
        let pending = PendingQuery::new(Arc::clone(&self.inner), self.events.clone());
        let _ = self.events.send(event);

        let result = self.ask(&question).await;

        let (outcome, event) = {
            let mut guard = self.inner.lock().await;
            let outcome = match result {
                Ok(answer) => {
                    guard.settle(TurnBody::Resolved(answer));
                    SubmitOutcome::Answered
                }
                Err(err) => {
                    warn!(error = %err, "query: answer unavailable, showing recovery message");
                    let _ = self.events.send(ClientEvent::QueryRecovered {
                        reason: err.to_string(),
                    });
                    guard.settle(TurnBody::Failed(RECOVERY_MESSAGE.to_string()));
                    SubmitOutcome::Recovered
                }
            };
            pending.disarm();
            (outcome, guard.event())
        };
        let _ = self.events.send(event);
        outcome
    }

    /// Submits whatever is currently in the draft input.
    pub async fn submit_draft(&self) -> SubmitOutcome {
        let draft = self.inner.lock().await.draft.clone();
        self.submit(&draft).await
    }

    async fn ask(&self, question: &str) -> Result<String, ClientError> {
        let session_id = self
            .session
            .token()
            .await?
            .ok_or(ClientError::NoActiveSession)?;

        info!(
            scope = self.session.name(),
            question_len = question.len(),
            "query: sending question"
        );
        let body = self
            .api
            .query(&QueryRequest {
                session_id,
                question: question.to_string(),
            })
            .await
            .map_err(|err| ClientError::QueryFailed(err.to_string()))?;

        Ok(extract_answer(&body, self.answer_fields.as_slice()))
    }

    pub async fn turns(&self) -> Vec<Turn> {
        self.inner.lock().await.turns.clone()
    }

    pub async fn phase(&self) -> ConversationPhase {
        self.inner.lock().await.phase
    }

    pub async fn is_pending(&self) -> bool {
        self.phase().await == ConversationPhase::Awaiting
    }

    pub async fn draft(&self) -> String {
        self.inner.lock().await.draft.clone()
    }

    pub async fn set_draft(&self, draft: impl Into<String>) {
        self.inner.lock().await.draft = draft.into();
    }

    /// Copies one of [`SUGGESTED_QUESTIONS`] into the draft.
    pub async fn apply_suggestion(&self, index: usize) -> bool {
        let Some(suggestion) = SUGGESTED_QUESTIONS.get(index) else {
            return false;
        };
        self.set_draft(*suggestion).await;
        true
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        let guard = self.inner.lock().await;
        ConversationSnapshot {
            turns: guard.turns.clone(),
            pending: guard.phase == ConversationPhase::Awaiting,
            draft: guard.draft.clone(),
        }
    }

    /// Starts over for a new document. Refused while a query is outstanding.
    pub async fn reset(&self) -> bool {
        let event = {
            let mut guard = self.inner.lock().await;
            if guard.phase == ConversationPhase::Awaiting {
                warn!("conversation: reset refused while a query is outstanding");
                return false;
            }
            guard.turns.clear();
            guard.draft.clear();
            guard.event()
        };
        let _ = self.events.send(event);
        true
    }
}

#[cfg(test)]
#[path = "tests/conversation_tests.rs"]
mod tests;
