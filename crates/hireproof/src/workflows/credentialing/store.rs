use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::domain::{ApplicationId, CredentialDocument};

/// Storage abstraction for credential documents.
///
/// `save` is optimistic-concurrency-safe: the document carries the version it
/// was loaded at, and a stale write is rejected with [`StoreError::Conflict`]
/// instead of silently overwriting. Two orchestrator runs racing on the same
/// application id fail one of them cleanly.
pub trait DocumentStore: Send + Sync {
    fn insert(&self, document: CredentialDocument) -> Result<CredentialDocument, StoreError>;
    fn load(&self, id: &ApplicationId) -> Result<Option<CredentialDocument>, StoreError>;
    /// Persist the document, returning it with the bumped version on success.
    fn save(&self, document: CredentialDocument) -> Result<CredentialDocument, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document already exists")]
    AlreadyExists,
    #[error("concurrent write conflict: expected version {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },
    #[error("document not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// In-memory reference store backing tests, the demo, and the dev server.
#[derive(Default, Clone)]
pub struct InMemoryDocumentStore {
    documents: Arc<Mutex<HashMap<ApplicationId, CredentialDocument>>>,
}

impl DocumentStore for InMemoryDocumentStore {
    fn insert(&self, mut document: CredentialDocument) -> Result<CredentialDocument, StoreError> {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        if guard.contains_key(&document.application_id) {
            return Err(StoreError::AlreadyExists);
        }
        document.version = 1;
        guard.insert(document.application_id.clone(), document.clone());
        Ok(document)
    }

    fn load(&self, id: &ApplicationId) -> Result<Option<CredentialDocument>, StoreError> {
        let guard = self.documents.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn save(&self, mut document: CredentialDocument) -> Result<CredentialDocument, StoreError> {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        let current = guard
            .get(&document.application_id)
            .ok_or(StoreError::NotFound)?;

        if current.version != document.version {
            return Err(StoreError::Conflict {
                expected: current.version,
                found: document.version,
            });
        }

        document.version += 1;
        guard.insert(document.application_id.clone(), document.clone());
        Ok(document)
    }
}
