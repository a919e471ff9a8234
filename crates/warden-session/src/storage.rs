//! Persistent key/value storage supplied by the host.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;
use warden_protocol::{Codec, JsonCodec, StoredCredential};

use crate::StorageError;

/// Host storage (browser local storage, a file, a keychain).
///
/// Object safe and synchronous: storage adapters on every host Warden
/// targets answer immediately.
pub trait StorageBackend: Send + Sync + 'static {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Infallible view over a [`StorageBackend`].
///
/// Storage is best-effort for the session core: a failing backend must
/// never block a sign-in or a sign-out. Every error is logged at `warn`
/// and turned into "nothing stored" / "not written".
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
}

impl Storage {
    pub fn new(backend: impl StorageBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// In-memory storage. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self.backend.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "storage read failed");
                None
            }
        }
    }

    /// Returns whether the write succeeded.
    pub fn set(&self, key: &str, value: &str) -> bool {
        match self.backend.set_item(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "storage write failed");
                false
            }
        }
    }

    /// Returns whether the removal succeeded.
    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove_item(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "storage remove failed");
                false
            }
        }
    }

    // -- Credential helpers --------------------------------------------------

    /// Reads the persisted credential. A corrupt entry is removed so the
    /// next start doesn't trip over it again.
    pub fn load_credential(&self) -> Option<StoredCredential> {
        let text = self.get(StoredCredential::STORAGE_KEY)?;
        match StoredCredential::decode_with(&JsonCodec, &text) {
            Ok(credential) => Some(credential),
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored credential");
                self.remove(StoredCredential::STORAGE_KEY);
                None
            }
        }
    }

    pub fn save_credential(&self, credential: &StoredCredential) -> bool {
        match JsonCodec.encode(credential) {
            Ok(text) => self.set(StoredCredential::STORAGE_KEY, &text),
            Err(e) => {
                warn!(user = %credential.user, error = %e, "credential encode failed");
                false
            }
        }
    }

    pub fn clear_credential(&self) -> bool {
        self.remove(StoredCredential::STORAGE_KEY)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

/// A [`StorageBackend`] backed by a `HashMap`. Never fails.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

// Lets tests keep a handle on the backend they hand to the controller.
impl<T: StorageBackend> StorageBackend for Arc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}
