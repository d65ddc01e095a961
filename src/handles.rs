//! Ephemeral reference handles bound to binary buffers.
//!
//! A handle is what a display surface or a download uses to reach the bytes
//! of an asset. Every held handle pins its buffer, so a handle that is never
//! revoked is a leak for the life of the registry. Only [`HandleRegistry`]
//! creates or revokes handles.

use crate::constants::HANDLE_SCHEME;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// An opaque, revocable pointer to a buffer held by a [`HandleRegistry`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceHandle(String);

impl ReferenceHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct Entry {
    bytes: Arc<[u8]>,
    mime: String,
}

/// The handle table for one session.
///
/// Cloning the registry shares the table, so a caller can keep a clone to
/// observe live handles after the session that owns it is gone, or hand
/// clones to several sessions.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    table: Arc<Mutex<HashMap<ReferenceHandle, Entry>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ReferenceHandle, Entry>> {
        // A poisoned table is still consistent: every mutation is a single insert/remove.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pins `bytes` and returns a fresh handle for them
    pub fn allocate(&self, bytes: Arc<[u8]>, mime: &str) -> ReferenceHandle {
        let handle = ReferenceHandle(format!("{}{}", HANDLE_SCHEME, Uuid::new_v4()));
        debug!(handle = %handle, mime, size = bytes.len(), "allocated handle");
        self.table().insert(
            handle.clone(),
            Entry {
                bytes,
                mime: mime.to_string(),
            },
        );
        handle
    }

    /// Releases a handle. Returns false if it was not live.
    pub fn revoke(&self, handle: &ReferenceHandle) -> bool {
        let removed = self.table().remove(handle).is_some();
        if removed {
            debug!(handle = %handle, "revoked handle");
        } else {
            warn!(handle = %handle, "revoke of a handle that is not live");
        }
        removed
    }

    /// Allocates a handle for a slot, revoking whatever the slot held before
    pub fn replace(
        &self,
        previous: Option<&ReferenceHandle>,
        bytes: Arc<[u8]>,
        mime: &str,
    ) -> ReferenceHandle {
        let handle = self.allocate(bytes, mime);
        if let Some(old) = previous {
            self.revoke(old);
        }
        handle
    }

    /// The bytes and MIME type a live handle points at
    pub fn resolve(&self, handle: &ReferenceHandle) -> Option<(Arc<[u8]>, String)> {
        self.table()
            .get(handle)
            .map(|entry| (Arc::clone(&entry.bytes), entry.mime.clone()))
    }

    pub fn is_live(&self, handle: &ReferenceHandle) -> bool {
        self.table().contains_key(handle)
    }

    pub fn live_count(&self) -> usize {
        self.table().len()
    }

    /// True while another clone still points at this table
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.table) > 1
    }

    /// Revokes every live handle, returning how many there were
    pub fn revoke_all(&self) -> usize {
        let mut table = self.table();
        let count = table.len();
        table.clear();
        count
    }
}
