use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};
use tracing::debug;

const MEMORY_DATABASE_URL: &str = "sqlite::memory:";

/// String key/value storage with browser-storage semantics: reads of a
/// missing key return `None`, removing a missing key is not an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    /// Survives logout; holds drafts.
    Local,
    /// Holds credentials; wiped on logout.
    Session,
}

impl StorageScope {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageScope::Local => "local",
            StorageScope::Session => "session",
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // every connection to an in-memory url opens its own empty database
        let max_connections = if database_url.starts_with(MEMORY_DATABASE_URL) {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open storage at '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub fn scoped(&self, scope: StorageScope) -> ScopedStore {
        ScopedStore {
            pool: self.pool.clone(),
            scope,
        }
    }

    pub fn local(&self) -> ScopedStore {
        self.scoped(StorageScope::Local)
    }

    pub fn session(&self) -> ScopedStore {
        self.scoped(StorageScope::Session)
    }

    pub async fn clear_scope(&self, scope: StorageScope) -> Result<u64> {
        let result = sqlx::query("DELETE FROM key_value_entries WHERE scope = ?")
            .bind(scope.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear {} storage", scope.as_str()))?;
        Ok(result.rows_affected())
    }
}

/// One storage scope of a [`Storage`] database.
#[derive(Clone)]
pub struct ScopedStore {
    pool: Pool<Sqlite>,
    scope: StorageScope,
}

#[async_trait]
impl KeyValueStore for ScopedStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM key_value_entries WHERE scope = ? AND key = ?")
            .bind(self.scope.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read '{key}' from {} storage", self.scope.as_str()))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO key_value_entries (scope, key, value) VALUES (?, ?, ?)
             ON CONFLICT(scope, key) DO UPDATE SET value = excluded.value,
                 updated_at = CURRENT_TIMESTAMP",
        )
        .bind(self.scope.as_str())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write '{key}' to {} storage", self.scope.as_str()))?;
        debug!(scope = self.scope.as_str(), key, bytes = value.len(), "stored item");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM key_value_entries WHERE scope = ? AND key = ?")
            .bind(self.scope.as_str())
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| {
                format!("failed to remove '{key}' from {} storage", self.scope.as_str())
            })?;
        debug!(scope = self.scope.as_str(), key, "removed item");
        Ok(())
    }
}

/// Process-local store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(key: &str, value: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.to_string(), value.to_string());
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
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
    if database_url == MEMORY_DATABASE_URL || !database_url.starts_with("sqlite:") {
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
