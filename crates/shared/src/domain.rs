use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque capability issued by the backend for one uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum TurnBody {
    /// Answer not available yet; renderers show a loading affordance.
    Pending,
    Resolved(String),
    /// Scripted recovery text shown in place of an answer.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub body: TurnBody,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            body: TurnBody::Resolved(text.into()),
        }
    }

    pub fn pending_assistant() -> Self {
        Self {
            role: Role::Assistant,
            body: TurnBody::Pending,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            body: TurnBody::Resolved(text.into()),
        }
    }

    pub fn failed_assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            body: TurnBody::Failed(text.into()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.body, TurnBody::Pending)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            TurnBody::Pending => None,
            TurnBody::Resolved(text) | TurnBody::Failed(text) => Some(text),
        }
    }
}
