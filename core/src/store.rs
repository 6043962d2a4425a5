//! Process-lifetime shared state.
//!
//! Every request context receives a handle to the same [`Store`]. Each
//! individual operation is atomic, but there is no transactional
//! discipline across operations: a handler that reads a key and then writes
//! it back races with concurrent handlers doing the same. Handlers that need
//! exclusive read-modify-write use [`Store::update`] or their own
//! synchronization.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared, mutable key/value state with a stable identity.
///
/// Cloning a `Store` clones the handle, not the data.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl Store {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `entries`.
    #[must_use]
    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(entries)),
        }
    }

    /// Read a value (cloned out of the store).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read(|map| map.get(key).cloned())
    }

    /// Write a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.write(|map| map.insert(key.into(), value.into()))
    }

    /// Remove a value, returning it.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write(|map| map.remove(key))
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.read(|map| map.contains_key(key))
    }

    /// Atomically replace the value under `key` with `f(current)`.
    ///
    /// Returns the new value. The write lock is held while `f` runs, so `f`
    /// must not touch the store itself.
    pub fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        self.write(|map| {
            let next = f(map.get(key));
            map.insert(key.to_string(), next.clone());
            next
        })
    }

    /// Names of every stored key.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.read(|map| map.keys().cloned().collect())
    }

    /// Point-in-time copy of the whole store.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.read(Clone::clone)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read(Map::len)
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read(Map::is_empty)
    }

    /// Whether both handles point at the same underlying store.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy every key of `other` that this store does not have yet.
    ///
    /// Keys already present here are left untouched.
    pub(crate) fn absorb(&self, other: &Self) {
        if self.ptr_eq(other) {
            return;
        }
        let incoming = other.snapshot();
        self.write(|map| {
            for (key, value) in incoming {
                map.entry(key).or_insert(value);
            }
        });
    }

    fn read<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> R {
        // A panicking writer cannot leave a half-applied entry behind, so a
        // poisoned lock still guards a consistent map.
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("keys", &self.keys()).finish()
    }
}
