//! Recency queue for the classic policies.
//!
//! Entries live in a [`SlotArena`] and are chained by [`SlotId`], so a policy
//! can keep the handle in its key index and unlink or promote an entry in
//! O(1). The front is the most recently admitted (or, for LRU, touched)
//! entry; the back is the next eviction candidate.
//!
//! ```text
//!   front ─► [k7] ◄──► [k3] ◄──► [k9] ◄── back (victim)
//! ```

use crate::ds::slot_arena::{SlotArena, SlotId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Links {
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    links: Links,
}

#[derive(Debug, Clone)]
pub struct IntrusiveList<T> {
    entries: SlotArena<Entry<T>>,
    front: Option<SlotId>,
    back: Option<SlotId>,
}

impl<T> IntrusiveList<T> {
    pub fn new() -> Self {
        Self {
            entries: SlotArena::new(),
            front: None,
            back: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handle of the eviction candidate.
    pub fn back_id(&self) -> Option<SlotId> {
        self.back
    }

    pub fn back(&self) -> Option<&T> {
        self.get(self.back?)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.entries.get(id).map(|e| &e.value)
    }

    /// Front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.front,
        }
    }

    pub fn push_front(&mut self, value: T) -> SlotId {
        let id = self.entries.insert(Entry {
            value,
            links: Links::default(),
        });
        self.link_front(id);
        id
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.unlink(id)?;
        self.entries.remove(id).map(|e| e.value)
    }

    /// Returns `false` for a stale handle.
    pub fn move_to_front(&mut self, id: SlotId) -> bool {
        if self.front == Some(id) {
            return self.entries.contains(id);
        }
        if self.unlink(id).is_none() {
            return false;
        }
        self.link_front(id);
        true
    }

    fn set_links(&mut self, id: Option<SlotId>, f: impl FnOnce(&mut Links)) {
        if let Some(entry) = id.and_then(|id| self.entries.get_mut(id)) {
            f(&mut entry.links);
        }
    }

    fn unlink(&mut self, id: SlotId) -> Option<()> {
        let Links { prev, next } = std::mem::take(&mut self.entries.get_mut(id)?.links);
        match prev {
            Some(_) => self.set_links(prev, |l| l.next = next),
            None => self.front = next,
        }
        match next {
            Some(_) => self.set_links(next, |l| l.prev = prev),
            None => self.back = prev,
        }
        Some(())
    }

    fn link_front(&mut self, id: SlotId) {
        let old_front = self.front.replace(id);
        self.set_links(Some(id), |l| {
            l.prev = None;
            l.next = old_front;
        });
        match old_front {
            Some(_) => self.set_links(old_front, |l| l.prev = Some(id)),
            None => self.back = Some(id),
        }
    }

    /// Walks the chain and checks back-links, the back pointer, and the
    /// entry count.
    pub fn links_are_consistent(&self) -> bool {
        let mut prev = None;
        let mut cursor = self.front;
        let mut walked = 0;
        while let Some(id) = cursor {
            let Some(entry) = self.entries.get(id) else {
                return false;
            };
            if entry.links.prev != prev || walked >= self.len() {
                return false;
            }
            walked += 1;
            prev = Some(id);
            cursor = entry.links.next;
        }
        prev == self.back && walked == self.len()
    }
}

impl<T> Default for IntrusiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, T> {
    list: &'a IntrusiveList<T>,
    cursor: Option<SlotId>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let entry = self.list.entries.get(self.cursor?)?;
        self.cursor = entry.links.next;
        Some(&entry.value)
    }
}
