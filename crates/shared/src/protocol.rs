use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::SessionToken;

/// Multipart field the backend reads the uploaded document from.
pub const UPLOAD_FILE_FIELD: &str = "file";
pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const DEFAULT_ANSWER_FIELDS: [&str; 3] = ["answer", "reply", "response"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: SessionToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub session_id: SessionToken,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// Pulls the answer text out of a query response body.
///
/// The first populated entry of `fields` wins. A bare JSON string is taken
/// as-is; anything else falls back to the serialized body.
pub fn extract_answer<S: AsRef<str>>(body: &Value, fields: &[S]) -> String {
    if let Value::String(text) = body {
        return text.clone();
    }

    if let Value::Object(map) = body {
        for field in fields {
            match map.get(field.as_ref()) {
                None | Some(Value::Null) | Some(Value::Bool(false)) => continue,
                Some(Value::String(text)) if text.is_empty() => continue,
                Some(Value::String(text)) => return text.clone(),
                Some(other) => return other.to_string(),
            }
        }
    }

    body.to_string()
}
