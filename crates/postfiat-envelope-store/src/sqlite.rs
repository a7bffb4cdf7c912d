//! SQLite implementation of the ContentStorage trait.
//!
//! The persistent backend. It uses rusqlite with bundled SQLite, wrapped in
//! async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use postfiat_envelope_core::ContentDescriptor;

use crate::error::{Result, StoreError};
use crate::migration::{self, unix_millis};
use crate::traits::{locate, verify_blob, ContentStorage, StoreRequest};

/// URI scheme for SQLite blobs.
pub const SQLITE_SCHEME: &str = "sqlite";

/// Configuration for [`SqliteStorage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteStorageConfig {
    /// Largest blob accepted, in bytes.
    pub max_blob_size: u64,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            max_blob_size: 64 * 1024 * 1024,
        }
    }
}

/// SQLite-based content storage.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    config: SqliteStorageConfig,
}

impl SqliteStorage {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: SqliteStorageConfig::default(),
        })
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: SqliteStorageConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of stored blobs.
    pub async fn blob_count(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| StoreError::Unavailable {
                backend: SQLITE_SCHEME.into(),
                reason: format!("mutex poisoned: {}", e),
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable {
            backend: SQLITE_SCHEME.into(),
            reason: format!("spawn_blocking failed: {}", e),
        })?
    }
}

#[async_trait]
impl ContentStorage for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn can_handle(&self, size_hint: u64, _content_type: &str) -> bool {
        size_hint <= self.config.max_blob_size
    }

    async fn store(&self, request: StoreRequest<'_>) -> Result<ContentDescriptor> {
        if request.size() > self.config.max_blob_size {
            return Err(StoreError::Rejected {
                backend: self.name().to_owned(),
                reason: format!(
                    "{} bytes exceeds limit of {}",
                    request.size(),
                    self.config.max_blob_size
                ),
            });
        }

        let blob = request.blob_hash();
        let bytes = request.bytes.to_vec();
        let inserted = self
            .run(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO blobs (blob_hash, bytes, size, stored_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        blob.as_bytes().as_slice(),
                        bytes,
                        bytes.len() as i64,
                        unix_millis()
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;

        if !inserted {
            tracing::debug!(blob = %blob, "sqlite storage dedup hit");
        }

        Ok(request.descriptor(SQLITE_SCHEME))
    }

    async fn retrieve(&self, descriptor: &ContentDescriptor) -> Result<Bytes> {
        let blob = locate(descriptor, SQLITE_SCHEME)?;
        let bytes: Option<Vec<u8>> = self
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT bytes FROM blobs WHERE blob_hash = ?1",
                        params![blob.as_bytes().as_slice()],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        let bytes = bytes.ok_or_else(|| StoreError::NotFound(descriptor.uri.clone()))?;
        verify_blob(descriptor, &blob, Bytes::from(bytes))
    }
}
