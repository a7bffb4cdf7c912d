//! Composite storage: several backends tried in a fixed preference order.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use postfiat_envelope_core::ContentDescriptor;

use crate::error::{Result, StoreError};
use crate::traits::{ContentStorage, StoreRequest};

/// Tries backends in the order given.
///
/// `store` skips backends that cannot handle the request and falls through
/// to the next one on failure. `retrieve` asks each backend in turn. When
/// every attempt fails, the last error from a backend serving the
/// descriptor's scheme is returned; `UnsupportedUri` only when none does.
pub struct CompositeStorage {
    backends: Vec<Arc<dyn ContentStorage>>,
}

impl CompositeStorage {
    /// Create from backends in preference order.
    pub fn new(backends: Vec<Arc<dyn ContentStorage>>) -> Self {
        Self { backends }
    }

    /// Append a backend with the lowest preference.
    pub fn with_backend(mut self, backend: Arc<dyn ContentStorage>) -> Self {
        self.backends.push(backend);
        self
    }

    /// The backends in preference order.
    pub fn backends(&self) -> &[Arc<dyn ContentStorage>] {
        &self.backends
    }

    fn no_backend(&self, reason: String) -> StoreError {
        StoreError::Unavailable {
            backend: self.name().to_owned(),
            reason,
        }
    }
}

#[async_trait]
impl ContentStorage for CompositeStorage {
    fn name(&self) -> &str {
        "composite"
    }

    fn can_handle(&self, size_hint: u64, content_type: &str) -> bool {
        self.backends
            .iter()
            .any(|b| b.can_handle(size_hint, content_type))
    }

    async fn store(&self, request: StoreRequest<'_>) -> Result<ContentDescriptor> {
        let mut last_error = None;

        for backend in &self.backends {
            if !backend.can_handle(request.size(), request.content_type) {
                continue;
            }
            match backend.store(request).await {
                Ok(descriptor) => return Ok(descriptor),
                Err(e) => {
                    tracing::warn!(
                        backend = backend.name(),
                        error = %e,
                        "store failed, trying next backend"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            self.no_backend(format!(
                "no backend can handle {} bytes of {}",
                request.size(),
                request.content_type
            ))
        }))
    }

    async fn retrieve(&self, descriptor: &ContentDescriptor) -> Result<Bytes> {
        let mut failure = None;
        let mut unsupported = None;

        for backend in &self.backends {
            match backend.retrieve(descriptor).await {
                Ok(bytes) => return Ok(bytes),
                Err(e @ StoreError::UnsupportedUri(_)) => unsupported = Some(e),
                Err(e) => {
                    tracing::warn!(
                        backend = backend.name(),
                        uri = %descriptor.uri,
                        error = %e,
                        "retrieve failed, trying next backend"
                    );
                    failure = Some(e);
                }
            }
        }

        // A backend that serves the scheme outranks those that do not.
        Err(failure
            .or(unsupported)
            .unwrap_or_else(|| self.no_backend("no backends configured".into())))
    }
}
