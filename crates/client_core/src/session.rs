use std::sync::Arc;

use shared::domain::SessionToken;
use storage::{MemorySessionStore, SessionStore};

use crate::error::ClientError;

pub const DEFAULT_SESSION_SCOPE: &str = "default";

/// Owns the session token shared by the upload and conversation controllers.
///
/// Only the upload path writes the token; conversations read it per query.
pub struct SessionScope {
    scope: String,
    store: Arc<dyn SessionStore>,
}

impl SessionScope {
    pub fn new(scope: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            scope: scope.into(),
            store,
        }
    }

    pub fn in_memory(scope: impl Into<String>) -> Self {
        Self::new(scope, Arc::new(MemorySessionStore::new()))
    }

    pub fn name(&self) -> &str {
        &self.scope
    }

    pub async fn token(&self) -> Result<Option<SessionToken>, ClientError> {
        let stored = self
            .store
            .load_token(&self.scope)
            .await
            .map_err(|err| ClientError::Storage(format!("{err:#}")))?;
        Ok(stored.map(|stored| stored.token))
    }

    pub(crate) async fn establish(&self, token: &SessionToken) -> Result<(), ClientError> {
        self.store
            .save_token(&self.scope, token)
            .await
            .map_err(|err| ClientError::Storage(format!("{err:#}")))
    }

    /// Verifies the backing store can still be read and written.
    pub async fn check_store(&self) -> Result<(), ClientError> {
        self.store
            .health_check()
            .await
            .map_err(|err| ClientError::Storage(format!("{err:#}")))
    }

    /// Forgets the current document. Returns whether a token was stored.
    pub async fn clear(&self) -> Result<bool, ClientError> {
        self.store
            .clear_token(&self.scope)
            .await
            .map_err(|err| ClientError::Storage(format!("{err:#}")))
    }
}
