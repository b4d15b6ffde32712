use std::collections::HashMap;
use std::hash::Hash;

use anyhow::Result;
use log::{debug, warn};

use crate::record::FileRecord;

/// Ordered multimap: buckets iterate in first-seen key order, members in
/// insertion order.
#[derive(Debug, Clone)]
pub struct Buckets<K, T> {
    index: HashMap<K, usize>,
    buckets: Vec<(K, Vec<T>)>,
}

impl<K, T> Default for Buckets<K, T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            buckets: Vec::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, T> Buckets<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: K, item: T) {
        match self.index.get(&key) {
            Some(&slot) => self.buckets[slot].1.push(item),
            None => {
                self.index.insert(key.clone(), self.buckets.len());
                self.buckets.push((key, vec![item]));
            }
        }
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of items across all buckets.
    pub fn file_count(&self) -> usize {
        self.buckets.iter().map(|(_, items)| items.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &[T])> {
        self.buckets
            .iter()
            .map(|(key, items)| (key, items.as_slice()))
    }

    /// Drops every bucket with fewer than two members.
    pub fn retain_candidates(&mut self) {
        self.buckets.retain(|(_, items)| items.len() >= 2);
        self.index = self
            .buckets
            .iter()
            .enumerate()
            .map(|(slot, (key, _))| (key.clone(), slot))
            .collect();
    }

    /// Consumes the buckets, keeping only those with at least two members.
    pub fn into_candidates(self) -> Vec<(K, Vec<T>)> {
        self.buckets
            .into_iter()
            .filter(|(_, items)| items.len() >= 2)
            .collect()
    }
}

impl<K, T> IntoIterator for Buckets<K, T> {
    type Item = (K, Vec<T>);
    type IntoIter = std::vec::IntoIter<(K, Vec<T>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

/// Partitions `records` by the key `key_fn` produces for each of them.
///
/// A record whose key function fails, or yields no key, is left out of every
/// bucket and logged; it never aborts the grouping.
pub fn group<'a, K, I, F>(records: I, mut key_fn: F) -> Buckets<K, &'a FileRecord>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = &'a FileRecord>,
    F: FnMut(&FileRecord) -> Result<Option<K>>,
{
    let mut buckets = Buckets::new();
    for record in records {
        match key_fn(record) {
            Ok(Some(key)) => buckets.push(key, record),
            Ok(None) => debug!("No key for '{}', skipping", record.path.display()),
            Err(e) => warn!("Skipping '{}': {:#}", record.path.display(), e),
        }
    }
    buckets
}

/// Partitions `records` by their catalogued size. No I/O.
pub fn group_by_size<'a, I>(records: I) -> Buckets<u64, &'a FileRecord>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let mut buckets = Buckets::new();
    for record in records {
        buckets.push(record.size, record);
    }
    buckets
}
