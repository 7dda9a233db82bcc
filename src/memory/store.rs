//! Memory persistence layer
//!
//! A minimal key-value port the memory manager persists through, with
//! in-memory, JSON-file and Postgres backends. Single writer assumed:
//! the last `set` wins.

use crate::error::MemoryError;
use crate::Result;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

/// Trait for memory persistence
#[async_trait::async_trait]
pub trait MemoryStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory storage for development and tests
pub struct InMemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MemoryStorage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');

        if !valid {
            return Err(MemoryError::Storage(format!(
                "Invalid storage key for file backend: {:?}",
                key
            )));
        }

        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait::async_trait]
impl MemoryStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Readers never observe a partially written blob
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Key-value table in Postgres
pub struct PostgresStorage {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_memory_kv (
                      key TEXT PRIMARY KEY,
                      value TEXT NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                MemoryError::Database(format!(
                    "Failed to initialize memory schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl MemoryStorage for PostgresStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT value FROM chat_memory_kv WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::Database(format!("Failed to load memory: {}", e)))?;

        match row {
            Some(row) => {
                let value: String = row
                    .try_get("value")
                    .map_err(|e| MemoryError::Database(format!("Malformed memory row: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO chat_memory_kv (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Database(format!("Failed to save memory: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM chat_memory_kv WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Database(format!("Failed to delete memory: {}", e)))?;

        Ok(())
    }
}

/// Pick a storage backend from the environment.
///
/// `POSTGRES_URL` / `DATABASE_URL` select Postgres, `CHAT_MEMORY_DIR` selects
/// file storage, otherwise memory lives only for the process.
pub fn build_storage() -> Arc<dyn MemoryStorage> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&url)
        {
            Ok(pool) => {
                info!("Memory storage backend: postgres");
                return Arc::new(PostgresStorage::new(pool));
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres memory backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    if let Ok(dir) = env::var("CHAT_MEMORY_DIR") {
        if !dir.trim().is_empty() {
            info!("Memory storage backend: files under {}", dir);
            return Arc::new(FileStorage::new(dir));
        }
    }

    info!("Memory storage backend: in-memory");
    Arc::new(InMemoryStorage::new())
}
