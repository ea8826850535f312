use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::SessionToken;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use tokio::sync::RwLock;

pub const MEMORY_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSessionToken {
    pub scope: String,
    pub token: SessionToken,
    pub updated_at: DateTime<Utc>,
}

/// Durable home of the session token, keyed by session scope.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_token(&self, scope: &str) -> Result<Option<StoredSessionToken>>;
    /// Replaces whatever token the scope held before.
    async fn save_token(&self, scope: &str, token: &SessionToken) -> Result<()>;
    async fn clear_token(&self, scope: &str) -> Result<bool>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Lives as long as the process, like a browser tab's session storage.
#[derive(Default)]
pub struct MemorySessionStore {
    tokens: RwLock<HashMap<String, StoredSessionToken>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_token(&self, scope: &str) -> Result<Option<StoredSessionToken>> {
        Ok(self.tokens.read().await.get(scope).cloned())
    }

    async fn save_token(&self, scope: &str, token: &SessionToken) -> Result<()> {
        self.tokens.write().await.insert(
            scope.to_string(),
            StoredSessionToken {
                scope: scope.to_string(),
                token: token.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn clear_token(&self, scope: &str) -> Result<bool> {
        Ok(self.tokens.write().await.remove(scope).is_some())
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite database url '{database_url}'"))?
            .create_if_missing(true);
        // An in-memory database is dropped with its last connection, so keep one open for good.
        let pool_options = if database_url.starts_with(MEMORY_DATABASE_URL) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;

        let storage = Self { pool };
        storage.ensure_session_tokens_table().await?;
        Ok(storage)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_session_tokens_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_tokens (
                scope      TEXT PRIMARY KEY NOT NULL,
                token      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure session_tokens table exists")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Storage {
    async fn load_token(&self, scope: &str) -> Result<Option<StoredSessionToken>> {
        let row = sqlx::query("SELECT token, updated_at FROM session_tokens WHERE scope = ?")
            .bind(scope)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load session token for scope '{scope}'"))?;

        row.map(|row| -> Result<StoredSessionToken> {
            Ok(StoredSessionToken {
                scope: scope.to_string(),
                token: SessionToken(row.try_get("token")?),
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn save_token(&self, scope: &str, token: &SessionToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_tokens (scope, token, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(scope) DO UPDATE SET
                token = excluded.token,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(scope)
        .bind(token.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save session token for scope '{scope}'"))?;
        Ok(())
    }

    async fn clear_token(&self, scope: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE scope = ?")
            .bind(scope)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear session token for scope '{scope}'"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with(MEMORY_DATABASE_URL) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
