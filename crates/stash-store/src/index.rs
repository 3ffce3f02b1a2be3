//! The in-memory name → [`Object`] mapping of a store.
//!
//! An [`Index`] is either rebuilt wholesale from a backend scan
//! ([`Index::from_entries`]) or updated one entry at a time by the store's
//! mutating operations. There is no partial merge.

use std::collections::btree_map::{self, BTreeMap};
use std::path::Path;

use tracing::warn;

use crate::object::{Object, StoreId};
use crate::traits::Entry;

/// Name-keyed view of a store's artifacts. Exactly one object per name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<String, Object>,
}

impl Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh index from scanned entries.
    ///
    /// When two artifacts map to the same name (`a.json` and `a.txt`), the
    /// one carrying `preferred_extension` wins; otherwise the first locator
    /// in lexical order is kept.
    pub fn from_entries(
        store: &StoreId,
        entries: Vec<Entry>,
        preferred_extension: &str,
    ) -> Self {
        let mut sorted = entries;
        sorted.sort_by(|a, b| a.locator.cmp(&b.locator));

        let mut index = Self::new();
        for entry in sorted {
            match index.entries.entry(entry.name.clone()) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(Object::scanned(store.clone(), entry));
                }
                btree_map::Entry::Occupied(mut slot) => {
                    let preferred = has_extension(&entry.locator, preferred_extension)
                        && !has_extension(slot.get().locator(), preferred_extension);
                    let (kept, dropped) = if preferred {
                        (entry.locator.clone(), slot.get().locator().to_string())
                    } else {
                        (slot.get().locator().to_string(), entry.locator.clone())
                    };
                    warn!(name = %entry.name, %kept, %dropped, "duplicate object name");
                    if preferred {
                        slot.insert(Object::scanned(store.clone(), entry));
                    }
                }
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Object> {
        self.entries.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Object> {
        self.entries.get_mut(name)
    }

    /// Insert or replace, returning the stored object.
    pub(crate) fn put(&mut self, object: Object) -> &mut Object {
        match self.entries.entry(object.name().to_string()) {
            btree_map::Entry::Vacant(slot) => slot.insert(object),
            btree_map::Entry::Occupied(mut slot) => {
                slot.insert(object);
                slot.into_mut()
            }
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Object> {
        self.entries.remove(name)
    }

    /// Object names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterate over `(name, object)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Object)> {
        self.entries.iter().map(|(name, obj)| (name.as_str(), obj))
    }

    pub(crate) fn objects_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.entries.values_mut()
    }

    /// Objects whose name satisfies `predicate`, in name order.
    pub fn filter<F>(&self, mut predicate: F) -> Vec<&Object>
    where
        F: FnMut(&str) -> bool,
    {
        self.entries
            .iter()
            .filter(|(name, _)| predicate(name))
            .map(|(_, obj)| obj)
            .collect()
    }

    /// Total size in bytes across all indexed objects.
    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(Object::size).sum()
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = (&'a String, &'a Object);
    type IntoIter = btree_map::Iter<'a, String, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

pub(crate) fn has_extension(locator: &str, extension: &str) -> bool {
    Path::new(locator)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
