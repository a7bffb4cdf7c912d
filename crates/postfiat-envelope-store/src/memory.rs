//! In-memory implementation of the ContentStorage trait.
//!
//! Has the same addressing and verification semantics as SQLite but keeps
//! everything in memory with no persistence. Availability can be toggled to
//! exercise fallback paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use postfiat_envelope_core::{Blake3Hash, ContentDescriptor};

use crate::error::{Result, StoreError};
use crate::traits::{locate, verify_blob, ContentStorage, StoreRequest};

/// URI scheme for in-memory blobs.
pub const MEMORY_SCHEME: &str = "mem";

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStorageConfig {
    /// Largest object `can_handle` accepts, in bytes.
    pub max_object_size: u64,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_object_size: 16 * 1024 * 1024,
        }
    }
}

/// In-memory content storage.
///
/// All data is lost when the storage is dropped. Thread-safe via RwLock.
pub struct MemoryStorage {
    config: MemoryStorageConfig,
    blobs: RwLock<HashMap<Blake3Hash, Bytes>>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStorage {
    /// Create an empty storage with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryStorageConfig::default())
    }

    /// Create an empty storage with the given configuration.
    pub fn with_config(config: MemoryStorageConfig) -> Self {
        Self {
            config,
            blobs: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Mark the backend available or unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of blobs actually written (dedup hits excluded).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of blobs held.
    pub fn len(&self) -> usize {
        self.read().map(|blobs| blobs.len()).unwrap_or(0)
    }

    /// Whether no blobs are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Place raw bytes under a blob hash without verification.
    ///
    /// For fault-injection tests.
    pub fn insert_raw(&self, blob: Blake3Hash, bytes: Bytes) -> Result<()> {
        self.write()?.insert(blob, bytes);
        Ok(())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                backend: self.name().to_owned(),
                reason: "backend marked unavailable".into(),
            })
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Blake3Hash, Bytes>>> {
        self.blobs.read().map_err(|_| self.poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Blake3Hash, Bytes>>> {
        self.blobs.write().map_err(|_| self.poisoned())
    }

    fn poisoned(&self) -> StoreError {
        StoreError::Unavailable {
            backend: self.name().to_owned(),
            reason: "lock poisoned".into(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn can_handle(&self, size_hint: u64, _content_type: &str) -> bool {
        self.available.load(Ordering::SeqCst) && size_hint <= self.config.max_object_size
    }

    async fn store(&self, request: StoreRequest<'_>) -> Result<ContentDescriptor> {
        self.ensure_available()?;
        if request.size() > self.config.max_object_size {
            return Err(StoreError::Rejected {
                backend: self.name().to_owned(),
                reason: format!(
                    "{} bytes exceeds limit of {}",
                    request.size(),
                    self.config.max_object_size
                ),
            });
        }

        let blob = request.blob_hash();
        let mut blobs = self.write()?;
        if blobs.contains_key(&blob) {
            tracing::debug!(blob = %blob, "memory storage dedup hit");
        } else {
            blobs.insert(blob, Bytes::copy_from_slice(request.bytes));
            self.writes.fetch_add(1, Ordering::SeqCst);
        }

        Ok(request.descriptor(MEMORY_SCHEME))
    }

    async fn retrieve(&self, descriptor: &ContentDescriptor) -> Result<Bytes> {
        let blob = locate(descriptor, MEMORY_SCHEME)?;
        self.ensure_available()?;
        let bytes = self
            .read()?
            .get(&blob)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(descriptor.uri.clone()))?;
        verify_blob(descriptor, &blob, bytes)
    }
}
