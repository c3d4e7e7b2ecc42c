//! Key index over a recency queue, shared by the LRU and FIFO policies.
//!
//! Owns the byte accounting and ttl bookkeeping; the policies only decide
//! whether a hit promotes the entry.

use rustc_hash::FxHashMap;

use crate::ds::{IntrusiveList, SlotId};
use crate::request::{ObjKey, Request};
use crate::traits::CommonCacheParams;

#[derive(Debug, Clone)]
struct Entry {
    key: ObjKey,
    charged: u64,
    expire_at: Option<u64>,
}

#[derive(Debug, Clone)]
pub(crate) struct KeyedQueue {
    index: FxHashMap<ObjKey, SlotId>,
    list: IntrusiveList<Entry>,
    occupied: u64,
}

impl KeyedQueue {
    pub fn new(params: &CommonCacheParams) -> Self {
        Self {
            index: FxHashMap::with_capacity_and_hasher(params.index_capacity(), Default::default()),
            list: IntrusiveList::new(),
            occupied: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, key: &ObjKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn occupied(&self) -> u64 {
        self.occupied
    }

    /// Key at the eviction end.
    pub fn back_key(&self) -> Option<&ObjKey> {
        self.list.back().map(|entry| &entry.key)
    }

    /// Position from the front, 0 being the most recent admission or touch.
    pub fn position(&self, key: &ObjKey) -> Option<usize> {
        if !self.index.contains_key(key) {
            return None;
        }
        self.list.iter().position(|entry| &entry.key == key)
    }

    /// Pushes `req` at the front, replacing any resident copy. Entries only
    /// carry an expiry when `use_ttl` is set.
    pub fn admit(&mut self, req: &Request, params: &CommonCacheParams) {
        self.remove(&req.key);
        let charged = params.charged_size(req.size);
        let expire_at = if params.use_ttl {
            req.ttl.map(|ttl| req.timestamp + u64::from(ttl))
        } else {
            None
        };
        let id = self.list.push_front(Entry {
            key: req.key.clone(),
            charged,
            expire_at,
        });
        self.index.insert(req.key.clone(), id);
        self.occupied += charged;
    }

    /// Moves a resident key to the front.
    pub fn promote(&mut self, key: &ObjKey) -> bool {
        match self.index.get(key) {
            Some(&id) => self.list.move_to_front(id),
            None => false,
        }
    }

    /// Drops `key` if its ttl has elapsed at `now`.
    pub fn remove_expired(&mut self, key: &ObjKey, now: u64) -> bool {
        let expired = self
            .index
            .get(key)
            .and_then(|&id| self.list.get(id))
            .and_then(|entry| entry.expire_at)
            .is_some_and(|expire_at| now >= expire_at);
        if expired {
            self.remove(key);
        }
        expired
    }

    /// Unlinks the back entry and returns its charged size.
    pub fn pop_back(&mut self) -> Option<u64> {
        let id = self.list.back_id()?;
        self.unlink(id)
    }

    /// Returns the charged size of the removed entry.
    pub fn remove(&mut self, key: &ObjKey) -> Option<u64> {
        let id = *self.index.get(key)?;
        self.unlink(id)
    }

    fn unlink(&mut self, id: SlotId) -> Option<u64> {
        let entry = self.list.remove(id)?;
        self.index.remove(&entry.key);
        self.occupied -= entry.charged;
        Some(entry.charged)
    }

    /// Index and list agree and the byte count matches the entries.
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        self.list.links_are_consistent()
            && self.list.len() == self.index.len()
            && self.list.iter().map(|entry| entry.charged).sum::<u64>() == self.occupied
            && self.list.iter().all(|entry| self.index.contains_key(&entry.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(use_ttl: bool) -> CommonCacheParams {
        let mut params = CommonCacheParams::new(1 << 10);
        params.use_ttl = use_ttl;
        params
    }

    #[test]
    fn readmission_replaces_the_resident_copy() {
        let params = params(false);
        let mut queue = KeyedQueue::new(&params);
        queue.admit(&Request::new(1u64, 10, 0), &params);
        queue.admit(&Request::new(2u64, 20, 1), &params);
        queue.admit(&Request::new(1u64, 30, 2), &params);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.occupied(), 50);
        assert_eq!(queue.position(&1u64.into()), Some(0));
        assert_eq!(queue.back_key(), Some(&ObjKey::Num(2)));
        assert!(queue.is_consistent());
    }

    #[test]
    fn pop_and_remove_release_bytes() {
        let params = params(false);
        let mut queue = KeyedQueue::new(&params);
        for key in 1..=3u64 {
            queue.admit(&Request::new(key, key, key), &params);
        }
        assert!(queue.promote(&1u64.into()));
        assert_eq!(queue.pop_back(), Some(2));
        assert_eq!(queue.remove(&3u64.into()), Some(3));
        assert_eq!(queue.remove(&3u64.into()), None);
        assert!(!queue.promote(&3u64.into()));
        assert_eq!(queue.occupied(), 1);
        assert_eq!(queue.pop_back(), Some(1));
        assert_eq!(queue.pop_back(), None);
        assert!(queue.is_consistent());
    }

    #[test]
    fn expiry_is_only_recorded_with_use_ttl() {
        let req = Request::new(1u64, 10, 0).with_ttl(5);

        let with_ttl = params(true);
        let mut queue = KeyedQueue::new(&with_ttl);
        queue.admit(&req, &with_ttl);
        assert!(!queue.remove_expired(&1u64.into(), 4));
        assert!(queue.remove_expired(&1u64.into(), 5));
        assert!(!queue.contains(&1u64.into()));
        assert_eq!(queue.occupied(), 0);

        let without_ttl = params(false);
        let mut queue = KeyedQueue::new(&without_ttl);
        queue.admit(&req, &without_ttl);
        assert!(!queue.remove_expired(&1u64.into(), 1_000));
        assert!(queue.is_consistent());
    }
}
