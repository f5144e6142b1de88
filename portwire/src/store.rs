//! External byte store used to move binary buffers out of band.
//!
//! Producers publish bytes and embed the returned [`StoreHandle`] in a buffer
//! marker; consumers fetch the bytes back by handle.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::error::{PortalError, PortalResult};

/// Addressable handle returned by [`ByteStore::publish`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreHandle(String);

impl StoreHandle {
    /// Wrap a handle string.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The handle as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Externally addressable byte store.
///
/// A published handle must stay valid for at least one subsequent fetch.
#[async_trait(?Send)]
pub trait ByteStore {
    /// Publish bytes and return a handle to them.
    fn publish(&self, bytes: Vec<u8>) -> PortalResult<StoreHandle>;

    /// Retrieve the exact bytes behind a handle.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::HandleNotFound`] for unknown or already
    /// consumed handles.
    async fn fetch(&self, handle: &StoreHandle) -> PortalResult<Vec<u8>>;
}

/// In-memory store: publish once, fetch once.
///
/// Entries are removed when fetched so nothing outlives its single consumer.
#[derive(Debug, Default)]
pub struct MemoryByteStore {
    entries: RefCell<HashMap<StoreHandle, Vec<u8>>>,
    next_handle: Cell<u64>,
}

impl MemoryByteStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries not yet fetched.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether every published entry has been fetched.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[async_trait(?Send)]
impl ByteStore for MemoryByteStore {
    fn publish(&self, bytes: Vec<u8>) -> PortalResult<StoreHandle> {
        let id = self.next_handle.get() + 1;
        self.next_handle.set(id);

        let handle = StoreHandle(format!("mem:{id}"));
        tracing::trace!(handle = %handle, len = bytes.len(), "published buffer");
        self.entries.borrow_mut().insert(handle.clone(), bytes);
        Ok(handle)
    }

    async fn fetch(&self, handle: &StoreHandle) -> PortalResult<Vec<u8>> {
        self.entries
            .borrow_mut()
            .remove(handle)
            .ok_or_else(|| PortalError::HandleNotFound {
                handle: handle.to_string(),
            })
    }
}
