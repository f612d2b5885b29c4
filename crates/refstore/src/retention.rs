//! Retention policies deciding which reference blobs survive.
//!
//! A policy only tracks identifiers and sizes, never blob content. Store
//! backends act on the eviction lists returned from [`RetentionPolicy::prime`]
//! and [`RetentionPolicy::add`] and delete the referenced files themselves.

use lru::LruCache;
use platen_core::Identifier;
use std::sync::Mutex;
use thiserror::Error;

/// A reference file: enough metadata to locate the blob (by id) and make
/// eviction decisions (by size).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub id: Identifier,
    pub size: u64,
}

/// The closed set of retention disciplines.
#[derive(Debug)]
pub enum RetentionPolicy {
    /// Never evict anything.
    KeepForever,
    /// Evict everything present at startup, then never again.
    PurgeOnStart,
    /// Bounded LRU access list.
    AccessList(AccessList),
}

impl RetentionPolicy {
    /// Fill the policy with the refs present at startup, oldest first.
    /// Returns the refs the store must delete.
    pub fn prime(&self, refs: Vec<FileRef>) -> Vec<FileRef> {
        match self {
            RetentionPolicy::KeepForever => Vec::new(),
            RetentionPolicy::PurgeOnStart => refs,
            RetentionPolicy::AccessList(list) => list.prime(refs),
        }
    }

    /// Register a newly stored ref. Returns the refs the store must delete.
    pub fn add(&self, file: FileRef) -> Vec<FileRef> {
        match self {
            RetentionPolicy::KeepForever | RetentionPolicy::PurgeOnStart => Vec::new(),
            RetentionPolicy::AccessList(list) => list.add(file),
        }
    }

    /// Mark an identifier as recently used.
    pub fn touch(&self, id: &Identifier) {
        if let RetentionPolicy::AccessList(list) = self {
            list.touch(id);
        }
    }

    /// Side-effect-free lookup; no recency update.
    pub fn peek(&self, id: &Identifier) -> Option<FileRef> {
        match self {
            RetentionPolicy::KeepForever | RetentionPolicy::PurgeOnStart => None,
            RetentionPolicy::AccessList(list) => list.peek(id),
        }
    }
}

/// Error for an access list where both quotas are unlimited.
#[derive(Debug, Error)]
#[error("invalid access list configuration, max. item count and file size can't both be infinite")]
pub struct InvalidAccessListConfig;

#[derive(Clone, Copy, Debug)]
struct Quota {
    cur: u64,
    max: Option<u64>, // None = unlimited
}

impl Quota {
    fn new(max: i64) -> Self {
        Self {
            cur: 0,
            max: u64::try_from(max).ok().filter(|m| *m > 0),
        }
    }

    fn satisfied(&self) -> bool {
        self.max.is_none_or(|max| self.cur <= max)
    }
}

#[derive(Debug)]
struct AccessListInner {
    // front = most recently used
    items: LruCache<Identifier, u64>,
    count: Quota,
    total_size: Quota,
}

/// An LRU access list bounded by item count and/or total byte size.
///
/// Usage (`touch`, re-`add`) moves entries to the front; adding may evict
/// entries from the back until both quotas are satisfied again. Eviction
/// never empties the list: a single oversized blob is kept.
#[derive(Debug)]
pub struct AccessList {
    inner: Mutex<AccessListInner>,
}

impl AccessList {
    /// Build an access list. At least one quota must be finite; values <= 0
    /// mean unlimited.
    pub fn new(max_items: i64, max_total_size: i64) -> Result<Self, InvalidAccessListConfig> {
        let count = Quota::new(max_items);
        let total_size = Quota::new(max_total_size);
        if count.max.is_none() && total_size.max.is_none() {
            return Err(InvalidAccessListConfig);
        }
        Ok(Self {
            inner: Mutex::new(AccessListInner {
                items: LruCache::unbounded(),
                count,
                total_size,
            }),
        })
    }

    pub fn prime(&self, refs: Vec<FileRef>) -> Vec<FileRef> {
        let mut inner = self.inner.lock().expect("access list poisoned");
        let mut evicted = Vec::new();
        for file in refs {
            evicted.extend(inner.add(file));
        }
        evicted
    }

    pub fn add(&self, file: FileRef) -> Vec<FileRef> {
        self.inner.lock().expect("access list poisoned").add(file)
    }

    pub fn touch(&self, id: &Identifier) {
        self.inner.lock().expect("access list poisoned").items.promote(id);
    }

    pub fn peek(&self, id: &Identifier) -> Option<FileRef> {
        let inner = self.inner.lock().expect("access list poisoned");
        inner.items.peek(id).map(|size| FileRef { id: *id, size: *size })
    }

    #[cfg(test)]
    fn snapshot(&self) -> (usize, u64) {
        let inner = self.inner.lock().unwrap();
        (inner.items.len(), inner.total_size.cur)
    }
}

impl AccessListInner {
    fn add(&mut self, file: FileRef) -> Vec<FileRef> {
        if self.items.contains(&file.id) {
            self.items.promote(&file.id);
            return Vec::new();
        }

        self.items.push(file.id, file.size);
        self.count.cur += 1;
        self.total_size.cur += file.size;

        let mut evicted = Vec::new();
        while !self.total_size.satisfied() {
            match self.truncate_one() {
                Some(ev) => evicted.push(ev),
                None => break,
            }
        }
        while !self.count.satisfied() {
            match self.truncate_one() {
                Some(ev) => evicted.push(ev),
                None => break,
            }
        }
        evicted
    }

    /// Remove one entry from the back, unless it is the only one left.
    fn truncate_one(&mut self) -> Option<FileRef> {
        if self.items.len() <= 1 {
            return None;
        }
        let (id, size) = self.items.pop_lru()?;
        self.count.cur -= 1;
        self.total_size.cur -= size;
        Some(FileRef { id, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(tag: u8, size: u64) -> FileRef {
        FileRef {
            id: Identifier::digest(&[tag]),
            size,
        }
    }

    #[test]
    fn both_quotas_unlimited_is_invalid() {
        assert!(AccessList::new(0, 0).is_err());
        assert!(AccessList::new(-1, 0).is_err());
        assert!(AccessList::new(2, 0).is_ok());
        assert!(AccessList::new(0, 1024).is_ok());
    }

    #[test]
    fn item_quota_evicts_oldest_first() {
        let list = AccessList::new(2, 0).unwrap();
        let (a, b, c) = (file(1, 10), file(2, 10), file(3, 10));

        assert!(list.add(a).is_empty());
        assert!(list.add(b).is_empty());
        assert_eq!(list.add(c), vec![a]);
        assert_eq!(list.snapshot(), (2, 20));
    }

    #[test]
    fn size_quota_may_evict_several() {
        let list = AccessList::new(0, 100).unwrap();
        let (a, b, c) = (file(1, 40), file(2, 40), file(3, 90));

        assert!(list.add(a).is_empty());
        assert!(list.add(b).is_empty());
        assert_eq!(list.add(c), vec![a, b]);
        assert_eq!(list.snapshot(), (1, 90));
    }

    #[test]
    fn single_oversized_blob_is_kept() {
        let list = AccessList::new(0, 100).unwrap();
        let huge = file(1, 5000);
        assert!(list.add(huge).is_empty());
        assert_eq!(list.peek(&huge.id), Some(huge));
    }

    #[test]
    fn eviction_never_empties_the_list() {
        let list = AccessList::new(0, 100).unwrap();
        let (a, b) = (file(1, 60), file(2, 90));
        assert!(list.add(a).is_empty());
        // b alone violates the quota, so everything older goes, but b stays
        assert_eq!(list.add(b), vec![a]);
        assert_eq!(list.snapshot(), (1, 90));
    }

    #[test]
    fn re_adding_promotes_without_eviction() {
        let list = AccessList::new(2, 0).unwrap();
        let (a, b, c) = (file(1, 10), file(2, 10), file(3, 10));

        list.add(a);
        list.add(b);
        assert!(list.add(a).is_empty()); // a is now most recent
        assert_eq!(list.add(c), vec![b]);
        assert_eq!(list.peek(&a.id), Some(a));
    }

    #[test]
    fn touch_moves_to_front_and_ignores_unknown() {
        let list = AccessList::new(2, 0).unwrap();
        let (a, b, c) = (file(1, 10), file(2, 10), file(3, 10));

        list.add(a);
        list.add(b);
        list.touch(&a.id);
        list.touch(&c.id); // unknown, no-op
        assert_eq!(list.add(c), vec![b]);
    }

    #[test]
    fn peek_has_no_side_effects() {
        let list = AccessList::new(2, 0).unwrap();
        let (a, b, c) = (file(1, 10), file(2, 10), file(3, 10));

        list.add(a);
        list.add(b);
        // a stays oldest even after peeking at it
        assert_eq!(list.peek(&a.id), Some(a));
        assert_eq!(list.add(c), vec![a]);
        assert_eq!(list.peek(&a.id), None);
    }

    #[test]
    fn prime_equals_batched_add() {
        let list = AccessList::new(2, 0).unwrap();
        let refs = vec![file(1, 10), file(2, 10), file(3, 10), file(4, 10)];
        let evicted = list.prime(refs.clone());
        assert_eq!(evicted, vec![refs[0], refs[1]]);
        assert_eq!(list.snapshot(), (2, 20));
    }

    #[test]
    fn purge_on_start_returns_all_primed_refs() {
        let policy = RetentionPolicy::PurgeOnStart;
        let refs = vec![file(1, 1), file(2, 2)];
        assert_eq!(policy.prime(refs.clone()), refs);
        assert!(policy.add(file(3, 3)).is_empty());
        assert_eq!(policy.peek(&refs[0].id), None);
    }

    #[test]
    fn keep_forever_is_inert() {
        let policy = RetentionPolicy::KeepForever;
        assert!(policy.prime(vec![file(1, 1)]).is_empty());
        assert!(policy.add(file(2, 2)).is_empty());
        policy.touch(&file(2, 2).id);
        assert_eq!(policy.peek(&file(2, 2).id), None);
    }
}
