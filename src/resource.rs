//! Embedded resource storage with explicit release.
//!
//! Adapters acquire a [`DisplayHandle`] for every image they keep; the
//! handle is what preview markup refers to. The owner of the book releases
//! the handles when it discards the book.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to a stored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisplayHandle(u32);

impl DisplayHandle {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res-{}", self.0)
    }
}

/// A binary payload with its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Handle-indexed resource slots.
#[derive(Debug, Default)]
pub struct ResourceStore {
    slots: Vec<Option<Resource>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload and hand out its handle.
    pub fn acquire(&mut self, media_type: impl Into<String>, data: Vec<u8>) -> DisplayHandle {
        let handle = DisplayHandle(self.slots.len() as u32);
        self.slots.push(Some(Resource {
            media_type: media_type.into(),
            data,
        }));
        handle
    }

    pub fn get(&self, handle: DisplayHandle) -> Option<&Resource> {
        self.slots.get(handle.0 as usize).and_then(Option::as_ref)
    }

    /// Free one resource. Returns `false` if it was already released.
    pub fn release(&mut self, handle: DisplayHandle) -> bool {
        self.slots
            .get_mut(handle.0 as usize)
            .and_then(Option::take)
            .is_some()
    }

    /// Free everything still held, returning how many were live.
    pub fn release_all(&mut self) -> usize {
        let live = self.live();
        self.slots.clear();
        live
    }

    /// Number of resources not yet released.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.live() == 0
    }
}

impl Drop for ResourceStore {
    fn drop(&mut self) {
        let live = self.live();
        if live > 0 {
            log::warn!("{live} display handle(s) dropped without release");
        }
    }
}
