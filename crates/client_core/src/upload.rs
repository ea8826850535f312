use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use shared::protocol::{UploadResponse, PDF_MEDIA_TYPE};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{error::ClientError, session::SessionScope, transport::DocumentApi, ClientEvent};

/// A document the user picked for upload.
#[derive(Debug, Clone)]
pub struct PdfFile {
    pub filename: String,
    /// Declared media type; guessed from the file name when absent.
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl PdfFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            media_type: None,
            bytes,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(filename, bytes))
    }

    pub fn effective_media_type(&self) -> Option<String> {
        match self.media_type.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() => Some(declared.to_string()),
            _ => mime_guess::from_path(&self.filename)
                .first()
                .map(|mime| mime.essence_str().to_string()),
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.effective_media_type().is_some_and(|media_type| {
            media_type
                .split(';')
                .next()
                .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_MEDIA_TYPE))
        })
    }

    fn validate(&self, max_upload_bytes: Option<u64>) -> Result<(), ClientError> {
        if self.filename.trim().is_empty() {
            return Err(ClientError::InvalidFileKind("no file selected".into()));
        }
        if !self.is_pdf() {
            let found = self
                .effective_media_type()
                .unwrap_or_else(|| "unknown media type".into());
            return Err(ClientError::InvalidFileKind(format!(
                "expected {PDF_MEDIA_TYPE}, got {found}"
            )));
        }
        if let Some(limit) = max_upload_bytes {
            let size = self.bytes.len() as u64;
            if size > limit {
                return Err(ClientError::FileTooLarge { size, limit });
            }
        }
        Ok(())
    }
}

pub struct UploadController {
    api: Arc<dyn DocumentApi>,
    session: Arc<SessionScope>,
    uploading: AtomicBool,
    max_upload_bytes: Option<u64>,
    events: broadcast::Sender<ClientEvent>,
}

/// Clears the in-flight flag on every exit path of `submit`.
struct UploadingGuard<'a> {
    controller: &'a UploadController,
}

impl Drop for UploadingGuard<'_> {
    fn drop(&mut self) {
        self.controller.uploading.store(false, Ordering::Release);
        let _ = self
            .controller
            .events
            .send(ClientEvent::UploadStateChanged { uploading: false });
    }
}

impl UploadController {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        session: Arc<SessionScope>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            api,
            session,
            uploading: AtomicBool::new(false),
            max_upload_bytes: None,
            events,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: Option<u64>) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::Acquire)
    }

    pub async fn submit(&self, file: &PdfFile) -> Result<UploadResponse, ClientError> {
        if self.is_uploading() {
            warn!(filename = %file.filename, "upload: rejected, another upload is in flight");
            return Err(ClientError::AlreadyInProgress);
        }
        file.validate(self.max_upload_bytes)?;

        if self
            .uploading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(filename = %file.filename, "upload: rejected, another upload is in flight");
            return Err(ClientError::AlreadyInProgress);
        }
        let _guard = UploadingGuard { controller: self };
        let _ = self
            .events
            .send(ClientEvent::UploadStateChanged { uploading: true });

        info!(
            filename = %file.filename,
            size = file.bytes.len(),
            scope = self.session.name(),
            "upload: sending document"
        );
        let body = self
            .api
            .upload_document(file)
            .await
            .map_err(|err| upload_failed(err.to_string()))?;

        let response: UploadResponse = serde_json::from_value(body)
            .map_err(|err| upload_failed(format!("response has no session identifier: {err}")))?;
        if response.session_id.as_str().trim().is_empty() {
            return Err(upload_failed("response has an empty session identifier"));
        }

        self.session
            .establish(&response.session_id)
            .await
            .map_err(|err| upload_failed(format!("failed to persist session token: {err}")))?;

        info!(
            session_id = %response.session_id,
            scope = self.session.name(),
            "upload: session established"
        );
        let _ = self.events.send(ClientEvent::SessionEstablished {
            session_id: response.session_id.clone(),
        });
        Ok(response)
    }
}

fn upload_failed(reason: impl Into<String>) -> ClientError {
    let reason = reason.into();
    warn!(%reason, "upload: failed");
    ClientError::UploadFailed(reason)
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
