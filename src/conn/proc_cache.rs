// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::collections::{HashMap, VecDeque};

use log::trace;
use twox_hash::XxHash64;

use crate::value::Value;

/// Cached stored procedure metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcMetadata {
    /// Fully qualified `schema.name`.
    pub name: String,
    /// One row per parameter as reported by
    /// `information_schema.parameters`, in ordinal order: parameter name,
    /// mode and declared type.
    pub params: Vec<Vec<Value>>,
}

/// FIFO bounded map from the xxhash of a fully qualified procedure name to
/// its parameter metadata. The insertion queue drives eviction, so the
/// oldest entry goes first regardless of how often it was read. Hits and
/// misses are logged and never change the outcome of a lookup.
#[derive(Debug)]
pub struct ProcCache {
    cap: usize,
    map: HashMap<u64, ProcMetadata>,
    order: VecDeque<u64>,
}

impl ProcCache {
    pub fn new(cap: usize) -> ProcCache {
        ProcCache {
            cap,
            map: HashMap::with_capacity(cap),
            order: VecDeque::with_capacity(cap),
        }
    }

    fn key_for(name: &str) -> u64 {
        XxHash64::oneshot(0, name.as_bytes())
    }

    pub fn get(&self, name: &str) -> Option<&ProcMetadata> {
        let entry = self.map.get(&Self::key_for(name));
        match entry {
            Some(_) => trace!("procedure cache hit for `{}'", name),
            None => trace!("procedure cache miss for `{}'", name),
        }
        entry
    }

    pub fn put(&mut self, name: &str, metadata: ProcMetadata) {
        if self.cap == 0 {
            return;
        }
        let key = Self::key_for(name);
        if self.map.insert(key, metadata).is_some() {
            // Refreshed in place, insertion order is left alone.
            return;
        }
        self.order.push_back(key);
        if self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::{ProcCache, ProcMetadata};

    fn meta(name: &str) -> ProcMetadata {
        ProcMetadata {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    #[test]
    fn evicts_oldest_entry_first() {
        let mut cache = ProcCache::new(2);
        cache.put("db.first", meta("db.first"));
        cache.put("db.second", meta("db.second"));
        cache.put("db.third", meta("db.third"));
        assert!(cache.get("db.first").is_none());
        assert!(cache.get("db.second").is_some());
        assert!(cache.get("db.third").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reads_do_not_change_eviction_order() {
        let mut cache = ProcCache::new(2);
        cache.put("db.first", meta("db.first"));
        cache.put("db.second", meta("db.second"));
        // A hit on the oldest entry must not save it, this is FIFO.
        assert!(cache.get("db.first").is_some());
        cache.put("db.third", meta("db.third"));
        assert!(cache.get("db.first").is_none());
        assert!(cache.get("db.second").is_some());
    }

    #[test]
    fn refresh_keeps_insertion_slot() {
        let mut cache = ProcCache::new(2);
        cache.put("db.first", meta("db.first"));
        cache.put("db.second", meta("db.second"));
        cache.put("db.first", meta("db.first"));
        cache.put("db.third", meta("db.third"));
        assert!(cache.get("db.first").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let mut cache = ProcCache::new(0);
        cache.put("db.first", meta("db.first"));
        assert!(cache.get("db.first").is_none());
        assert!(cache.is_empty());
    }
}
