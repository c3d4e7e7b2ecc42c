//! Buckets: ordered segment chains sharing a partition key.
//!
//! ```text
//!   Bucket
//!   ┌────────────────────────────────────────────────────────────┐
//!   │ head ─► [seg] ◄─► [seg] ◄─► [merged seg] ◄─► [open seg] ◄─ tail
//!   │                     ▲                                      │
//!   │          next_seg_to_evict (round-robin sweep)             │
//!   │ hit_prob: Option<HitProbTable>, built on first use         │
//!   └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the tail may be open; merged segments are linked in place of their
//! victims and are always closed.

use crate::ds::SlotArena;

use super::hit_prob::HitProbTable;
use super::segment::{SegId, Segment};

#[derive(Debug, Clone, Default)]
pub struct Bucket {
    pub head: Option<SegId>,
    pub tail: Option<SegId>,
    pub n_segs: usize,
    pub next_seg_to_evict: Option<SegId>,
    /// Allocated only when something records into it.
    pub hit_prob: Option<HitProbTable>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit_prob_mut(&mut self) -> &mut HitProbTable {
        self.hit_prob.get_or_insert_with(HitProbTable::new)
    }

    /// Tail segment if it is still accepting objects.
    pub fn open_segment(&self, segs: &SlotArena<Segment>, segment_size: usize) -> Option<SegId> {
        let tail = self.tail?;
        let seg = segs.get(tail)?;
        (!seg.closed && seg.objs.len() < segment_size).then_some(tail)
    }

    pub fn push_back(&mut self, segs: &mut SlotArena<Segment>, id: SegId) {
        let old_tail = self.tail;
        if let Some(seg) = segs.get_mut(id) {
            seg.prev = old_tail;
            seg.next = None;
        }
        match old_tail.and_then(|t| segs.get_mut(t)) {
            Some(tail) => tail.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.n_segs += 1;
    }

    /// Links `id` directly in front of `at`.
    pub fn insert_before(&mut self, segs: &mut SlotArena<Segment>, at: SegId, id: SegId) {
        let prev = segs.get(at).and_then(|s| s.prev);
        if let Some(seg) = segs.get_mut(id) {
            seg.prev = prev;
            seg.next = Some(at);
        }
        if let Some(seg) = segs.get_mut(at) {
            seg.prev = Some(id);
        }
        match prev.and_then(|p| segs.get_mut(p)) {
            Some(p) => p.next = Some(id),
            None => self.head = Some(id),
        }
        self.n_segs += 1;
    }

    pub fn unlink(&mut self, segs: &mut SlotArena<Segment>, id: SegId) {
        let Some(seg) = segs.get_mut(id) else {
            return;
        };
        let (prev, next) = (seg.prev.take(), seg.next.take());
        match prev.and_then(|p| segs.get_mut(p)) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| segs.get_mut(n)) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }
        if self.next_seg_to_evict == Some(id) {
            self.next_seg_to_evict = next;
        }
        self.n_segs -= 1;
    }

    pub fn iter<'a>(&self, segs: &'a SlotArena<Segment>) -> BucketIter<'a> {
        BucketIter {
            segs,
            current: self.head,
        }
    }
}

pub struct BucketIter<'a> {
    segs: &'a SlotArena<Segment>,
    current: Option<SegId>,
}

impl<'a> Iterator for BucketIter<'a> {
    type Item = (SegId, &'a Segment);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let seg = self.segs.get(id)?;
        self.current = seg.next;
        Some((id, seg))
    }
}
