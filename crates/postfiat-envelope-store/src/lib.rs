//! # PostFiat Envelope Store
//!
//! Storage backends for envelope content that is too large to travel inline.
//!
//! ## Key Types
//!
//! - [`ContentStorage`] - The async trait every backend implements
//! - [`SqliteStorage`] - SQLite-based persistent storage
//! - [`MemoryStorage`] - In-memory storage for tests and caches
//! - [`CompositeStorage`] - Ordered fallback across several backends
//! - [`StoreRequest`] - Bytes to store plus the plaintext hash they carry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use postfiat_envelope_core::ContentHash;
//! use postfiat_envelope_store::{ContentStorage, SqliteStorage, StoreRequest};
//!
//! async fn example() {
//!     let storage = SqliteStorage::open("content.db").unwrap();
//!
//!     let request = StoreRequest::new(ContentHash::hash(b"plain"), "text/plain", b"sealed");
//!     let descriptor = storage.store(request).await.unwrap();
//!     let bytes = storage.retrieve(&descriptor).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Content addressing**: blob keys are the Blake3 hash of the stored bytes
//! - **Idempotent stores**: identical bytes are written once
//! - **Verified reads**: retrieved bytes are rehashed before being returned

pub mod composite;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use composite::CompositeStorage;
pub use error::{Result, StoreError};
pub use memory::{MemoryStorage, MemoryStorageConfig, MEMORY_SCHEME};
pub use sqlite::{SqliteStorage, SqliteStorageConfig, SQLITE_SCHEME};
pub use traits::{ContentStorage, StoreRequest};
