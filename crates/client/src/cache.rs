// TTD - Time-Travel Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Three-state cache for data fetched from a collaborator

use std::{
    collections::HashMap,
    hash::Hash,
    ops::{Deref, DerefMut},
};

/// A cache map that tracks three states for each key:
/// 1. Key not in map = Not fetched
/// 2. Key maps to Some(V) = Fetched with valid value
/// 3. Key maps to None = Fetched but no valid value
#[derive(Debug, Clone)]
pub struct FetchCache<K, V> {
    data: HashMap<K, Option<V>>,
}

impl<K, V> Deref for FetchCache<K, V> {
    type Target = HashMap<K, Option<V>>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<K, V> DerefMut for FetchCache<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<K, V> Default for FetchCache<K, V> {
    fn default() -> Self {
        Self { data: HashMap::new() }
    }
}

impl<K, V> FetchCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the cache has an entry for the given key
    pub fn has_cached(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    /// Look up a key.
    ///
    /// Returns `None` when the key was never fetched and `Some(None)` when it was
    /// fetched without producing a usable value.
    pub fn cached(&self, key: &K) -> Option<Option<V>> {
        self.data.get(key).cloned()
    }

    /// Record the result of a fetch
    pub fn record(&mut self, key: K, value: Option<V>) {
        self.data.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinguishes_not_fetched_from_fetched_empty() {
        let mut cache: FetchCache<&str, u32> = FetchCache::new();
        assert!(!cache.has_cached(&"a"));
        assert_eq!(cache.cached(&"a"), None);

        cache.record("a", None);
        assert!(cache.has_cached(&"a"));
        assert_eq!(cache.cached(&"a"), Some(None));

        cache.record("b", Some(7));
        assert_eq!(cache.cached(&"b"), Some(Some(7)));
        assert_eq!(cache.len(), 2);
    }
}
