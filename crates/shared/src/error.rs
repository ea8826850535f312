use serde::{Deserialize, Serialize};

/// Error body the backend returns alongside non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
}

impl ApiErrorBody {
    /// Returns the server supplied detail, if the body has one.
    pub fn detail_from(raw: &str) -> Option<String> {
        serde_json::from_str::<Self>(raw)
            .ok()
            .map(|body| body.detail)
            .filter(|detail| !detail.trim().is_empty())
    }
}
