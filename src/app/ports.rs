//! Port traits — the boundary between the control plane and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ stores / managers (domain)
//! ```
//!
//! The persistence backend and the northbound event consumer implement these
//! traits. Domain code only ever sees the trait, so the whole control plane
//! runs against in-memory backends on the host.

// ───────────────────────────────────────────────────────────────
// Storage port (domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Namespaced key-value blob storage.
///
/// Namespaces and keys are limited to 15 bytes by the NVS backend; callers
/// keep their key schemes compact (see the hourly log store). Writes MUST be
/// atomic at the record level — no partial blobs on power loss. The ESP-IDF
/// NVS API guarantees this natively; the in-memory simulation trivially so.
pub trait StoragePort: Send + Sync {
    /// Write a blob, replacing any existing value.
    fn put_bytes(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Read a blob. Returns [`StorageError::NotFound`] for absent keys.
    fn get_bytes(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete a key. `Ok(())` even if the key did not exist.
    fn remove(&self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Erase every key in a namespace.
    fn clear(&self, namespace: &str) -> Result<(), StorageError>;

    /// List the keys currently present in a namespace.
    fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.get_bytes(namespace, key).is_ok()
    }
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Stored blob failed deserialization.
    Corrupted,
    /// Generic I/O error from the backend.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::Corrupted => write!(f, "blob corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → northbound transport)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`AppEvent`](super::events::AppEvent)s through
/// this port. The northbound adapter decides where they go — the WebSocket
/// broadcast in production, a channel or a log in tests. Sinks are shared
/// across tasks, so `emit` takes `&self`.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &super::events::AppEvent);
}
