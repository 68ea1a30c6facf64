//! Single-slot versioned topic cells.
//!
//! A [`TopicCell`] holds at most one value. Publishing replaces the value
//! and bumps the version; readers always receive a complete
//! [`Versioned`] snapshot behind an `Arc`, or nothing. There is no queue:
//! a reader that is slow simply misses intermediate values.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A published value tagged with the cell version it was published at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    version: u64,
    value: T,
}

impl<T> Versioned<T> {
    /// Version assigned at publication (starts at 1).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The published value.
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Versioned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Overwrite-on-publish cell with a monotonically increasing version.
///
/// The slot lock is held only to swap or clone an `Arc`, never while a
/// reader inspects the value, so publishing never waits on a slow reader.
#[derive(Debug)]
pub struct TopicCell<T> {
    slot: RwLock<Option<Arc<Versioned<T>>>>,
    version: AtomicU64,
}

impl<T> Default for TopicCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TopicCell<T> {
    /// Create an empty cell (version 0).
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Replace the current value. Returns the new version.
    pub fn publish(&self, value: T) -> u64 {
        // The slot only ever holds a fully built Arc, so a panic elsewhere
        // cannot leave it half-written; recover from poisoning.
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let version = self.version.load(Ordering::Relaxed) + 1;
        *slot = Some(Arc::new(Versioned { version, value }));
        self.version.store(version, Ordering::Release);
        version
    }

    /// The most recently published value, if any.
    pub fn latest(&self) -> Option<Arc<Versioned<T>>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current version without taking the slot lock (0 when empty).
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// A subscriber cursor over one cell.
///
/// [`poll`](Self::poll) yields a value only when it is newer than the last
/// one this inbox returned, so a reader never observes a value older than
/// one it has already seen.
#[derive(Debug)]
pub struct Inbox<T> {
    cell: Arc<TopicCell<T>>,
    seen: u64,
}

impl<T> Inbox<T> {
    pub(crate) fn new(cell: Arc<TopicCell<T>>) -> Self {
        Self { cell, seen: 0 }
    }

    /// The latest value if it has not been returned by this inbox before.
    pub fn poll(&mut self) -> Option<Arc<Versioned<T>>> {
        if self.cell.version() <= self.seen {
            return None;
        }
        let latest = self.cell.latest()?;
        if latest.version <= self.seen {
            return None;
        }
        self.seen = latest.version;
        Some(latest)
    }

    /// The latest value regardless of what has been seen.
    pub fn peek(&self) -> Option<Arc<Versioned<T>>> {
        self.cell.latest()
    }

    /// Whether a value newer than the last returned one is available.
    pub fn has_new(&self) -> bool {
        self.cell.version() > self.seen
    }

    /// Version of the last value returned by [`poll`](Self::poll).
    pub fn seen_version(&self) -> u64 {
        self.seen
    }
}
