//! Conditional concurrent map.
//!
//! A `HashMap` behind a single reader/writer lock, with check-then-act
//! operations that stay atomic under concurrent use.
//!
//! # Conditional mutation
//!
//! [`ConditionalMap::set_if`] and [`ConditionalMap::delete_if`] run in two
//! phases:
//!
//! 1. Speculative check: take the shared lock and evaluate the predicate
//!    against the current snapshot. If it fails, return without ever touching
//!    the exclusive lock.
//! 2. Authoritative check: take the exclusive lock and evaluate the predicate
//!    again, since the entry may have changed between the two acquisitions.
//!    Only if it still holds is the mutation applied.
//!
//! Predicates and value builders run while a lock is held. They must be pure
//! and fast: no I/O, no blocking, no calls back into the same map. A
//! predicate may be invoked once or twice per call, a value builder at most
//! once.

use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Outcome of [`ConditionalMap::set_if`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<V> {
    /// The predicate held under the exclusive lock; carries the stored value.
    Applied(V),
    /// The predicate failed; carries the value that was current at the time
    /// of the failing check, if any.
    Rejected(Option<V>),
}

impl<V> Update<V> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The final value for the key as seen by this call.
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Rejected(value) => value,
        }
    }
}

/// Thread-safe map with predicate-guarded mutation.
pub struct ConditionalMap<K, V> {
    data: RwLock<HashMap<K, V>>,
}

impl<K, V> ConditionalMap<K, V>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a map with room for `capacity` entries before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.data.read().contains_key(key)
    }

    /// Get a clone of the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.data.read().get(key).cloned()
    }

    /// Unconditionally store `value`, returning the value it replaced.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        self.data.write().insert(key, value)
    }

    /// Store `compute(current)` under `key` only if `predicate(current)` holds.
    ///
    /// An absent key is passed to both closures as `None`. See the module
    /// docs for the purity contract.
    pub fn set_if<P, C>(&self, key: K, predicate: P, compute: C) -> Update<V>
    where
        P: Fn(Option<&V>) -> bool,
        C: FnOnce(Option<&V>) -> V,
        V: Clone,
    {
        {
            let data = self.data.read();
            let current = data.get(&key);
            if !predicate(current) {
                return Update::Rejected(current.cloned());
            }
        }

        let mut data = self.data.write();
        let current = data.get(&key);
        if !predicate(current) {
            return Update::Rejected(current.cloned());
        }

        let value = compute(current);
        data.insert(key, value.clone());
        Update::Applied(value)
    }

    /// Remove the entry under `key`, returning it.
    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.data.write().remove(key)
    }

    /// Remove the entry under `key` only if `predicate(value)` holds.
    ///
    /// Absent keys are never deleted and the predicate is not called for
    /// them. Returns true if an entry was removed.
    pub fn delete_if<Q, P>(&self, key: &Q, predicate: P) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        P: Fn(&V) -> bool,
    {
        if !self.data.read().get(key).is_some_and(&predicate) {
            return false;
        }

        let mut data = self.data.write();
        if !data.get(key).is_some_and(&predicate) {
            return false;
        }

        data.remove(key);
        true
    }

    /// Remove all entries, keeping the allocated capacity.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Visit every entry under the shared lock.
    ///
    /// Stops as soon as `visit` returns false. Returns false if the
    /// traversal was stopped early.
    ///
    /// `visit` must not call back into this map: the lock is not reentrant
    /// and doing so can deadlock.
    pub fn for_each<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        let data = self.data.read();
        data.iter().all(|(key, value)| visit(key, value))
    }
}

impl<K, V> Default for ConditionalMap<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ConditionalMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalMap")
            .field("len", &self.data.read().len())
            .finish_non_exhaustive()
    }
}
