//! Versioned in-memory registry with compare-and-swap semantics.
//!
//! Every entity the engine mutates is stored as a [`Versioned`] record.
//! Writers read a snapshot, compute the next state as a pure function,
//! and commit with [`Registry::compare_and_swap`]; a version mismatch
//! means another writer committed first and the caller must re-read.
//!
//! The same shape maps onto any persistence substrate that offers
//! per-entity read and compare-and-swap-by-version.

use std::hash::Hash;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

/// A record paired with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The stored record.
    pub record: T,
    /// Monotonically increasing version, starting at 1.
    pub version: u64,
}

impl<T> Versioned<T> {
    /// Wraps a fresh record at version 1.
    #[must_use]
    pub const fn initial(record: T) -> Self {
        Self { record, version: 1 }
    }
}

/// Why a compare-and-swap attempt did not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CasError {
    /// No record is stored under the key.
    #[error("record not found")]
    Missing,
    /// The stored version no longer matches the expected version.
    #[error("version conflict: stored version is {actual}")]
    Conflict {
        /// Version currently stored.
        actual: u64,
    },
}

/// Concurrent map of versioned records.
///
/// Entry-level locking comes from the underlying shard map; there is no
/// lock spanning multiple entries.
#[derive(Debug)]
pub struct Registry<K: Eq + Hash, V: Clone> {
    entries: DashMap<K, Versioned<V>>,
}

impl<K: Eq + Hash, V: Clone> Registry<K, V> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Inserts a fresh record at version 1.
    ///
    /// Returns false (without overwriting) if the key is already taken.
    pub fn insert(&self, key: K, record: V) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Versioned::initial(record));
                true
            }
        }
    }

    /// Returns a snapshot of the record and its version.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Versioned<V>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Replaces the record only if the stored version still matches.
    ///
    /// Returns the new version on success.
    pub fn compare_and_swap(
        &self,
        key: &K,
        expected_version: u64,
        record: V,
    ) -> Result<u64, CasError> {
        let mut slot = self.entries.get_mut(key).ok_or(CasError::Missing)?;
        if slot.version != expected_version {
            return Err(CasError::Conflict {
                actual: slot.version,
            });
        }
        slot.record = record;
        slot.version += 1;
        Ok(slot.version)
    }

    /// Applies an unconditional in-place update under the entry lock.
    ///
    /// This is the compensation path: once a posting must be rolled back,
    /// the inverse delta may not fail on a version conflict. The version
    /// still advances so concurrent compare-and-swap writers observe the
    /// change.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut slot = self.entries.get_mut(key)?;
        slot.version += 1;
        Some(f(&mut slot.record))
    }

    /// Removes the record under the key, returning it.
    pub fn remove(&self, key: &K) -> Option<Versioned<V>> {
        self.entries.remove(key).map(|(_, stored)| stored)
    }

    /// Returns true if a record is stored under the key.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Visits a snapshot of every stored record.
    pub fn for_each(&self, mut f: impl FnMut(&K, &Versioned<V>)) {
        for entry in &self.entries {
            f(entry.key(), entry.value());
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> Default for Registry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
