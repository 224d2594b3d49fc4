//! Insertion-ordered deduplicating pools.

use indexmap::IndexSet;
use std::hash::Hash;

/// An ordered set mapping each distinct value to a stable integer id.
///
/// Ids are assigned first-seen-wins, 0-based, and enumeration order is
/// insertion order — which is also the order entries are written to the
/// stream, so a decode-time index `i` always means "the i-th value inserted
/// during encoding". Deduplication uses the value's `Eq` implementation;
/// the type pool narrows it to name+qualifier identity (see
/// [`crate::TypeDescriptor`]).
#[derive(Debug, Default)]
pub struct Pool<T> {
    entries: IndexSet<T>,
}

impl<T: Eq + Hash> Pool<T> {
    pub fn new() -> Self {
        Pool {
            entries: IndexSet::new(),
        }
    }

    /// Inserts `value` if absent and returns its stable id.
    pub fn get_or_insert(&mut self, value: T) -> u32 {
        self.entries.insert_full(value).0 as u32
    }

    /// Looks up the id of `value` without inserting.
    pub fn lookup(&self, value: &T) -> Option<u32> {
        self.entries.get_index_of(value).map(|i| i as u32)
    }

    /// Returns the value with the given id.
    pub fn get(&self, id: u32) -> Option<&T> {
        self.entries.get_index(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}
