use std::{sync::Arc, time::Duration};

use shared::{
    domain::SessionToken,
    protocol::{StatusResponse, UploadResponse, DEFAULT_ANSWER_FIELDS},
};
use tokio::sync::broadcast;
use tracing::{info, warn};

pub mod conversation;
pub mod error;
pub mod session;
pub mod transport;
pub mod upload;

pub use conversation::{
    ConversationController, ConversationPhase, ConversationSnapshot, SubmitOutcome,
    RECOVERY_MESSAGE, SUGGESTED_QUESTIONS,
};
pub use error::{ClientError, TransportError};
pub use session::{SessionScope, DEFAULT_SESSION_SCOPE};
pub use transport::{DocumentApi, HttpDocumentApi};
pub use upload::{PdfFile, UploadController};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    UploadStateChanged { uploading: bool },
    SessionEstablished { session_id: SessionToken },
    TranscriptUpdated { turns: usize, pending: bool },
    QueryRecovered { reason: String },
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_url: String,
    /// Ordered; the first populated field of a query response is the answer.
    pub answer_fields: Vec<String>,
    pub max_upload_bytes: Option<u64>,
    /// `None` waits on the server indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            answer_fields: DEFAULT_ANSWER_FIELDS.iter().map(|f| f.to_string()).collect(),
            max_upload_bytes: None,
            request_timeout: None,
        }
    }
}

/// Upload and conversation controllers bound to one session scope.
pub struct DocumentChatClient {
    api: Arc<dyn DocumentApi>,
    session: Arc<SessionScope>,
    upload: UploadController,
    conversation: ConversationController,
    events: broadcast::Sender<ClientEvent>,
}

impl DocumentChatClient {
    pub fn new(options: ClientOptions, session: SessionScope) -> Result<Self, ClientError> {
        let api = HttpDocumentApi::new(&options.api_url, options.request_timeout)?;
        Ok(Self::new_with_api(Arc::new(api), options, session))
    }

    pub fn new_with_api(
        api: Arc<dyn DocumentApi>,
        options: ClientOptions,
        session: SessionScope,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session = Arc::new(session);
        let upload = UploadController::new(Arc::clone(&api), Arc::clone(&session), events.clone())
            .with_max_upload_bytes(options.max_upload_bytes);
        let conversation =
            ConversationController::new(Arc::clone(&api), Arc::clone(&session), events.clone())
                .with_answer_fields(options.answer_fields);
        Self {
            api,
            session,
            upload,
            conversation,
            events,
        }
    }

    pub fn upload(&self) -> &UploadController {
        &self.upload
    }

    pub fn conversation(&self) -> &ConversationController {
        &self.conversation
    }

    pub fn session(&self) -> &SessionScope {
        &self.session
    }

    /// Uploads a new document and clears the transcript of the previous one.
    ///
    /// Refused while a question is outstanding, so an answer never lands in
    /// the transcript of a different document.
    pub async fn start_document(&self, file: &PdfFile) -> Result<UploadResponse, ClientError> {
        if self.conversation.is_pending().await {
            return Err(ClientError::QueryInProgress);
        }
        let response = self.upload.submit(file).await?;
        if self.conversation.reset().await {
            info!(scope = self.session.name(), "conversation: reset for new document");
        } else {
            warn!(
                scope = self.session.name(),
                "conversation: question sent during upload, transcript kept"
            );
        }
        Ok(response)
    }

    pub async fn check_status(&self) -> Result<StatusResponse, ClientError> {
        self.api
            .status()
            .await
            .map_err(|err| ClientError::Status(err.to_string()))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
