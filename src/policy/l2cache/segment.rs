//! Segments and the objects they hold.
//!
//! ```text
//!   Segment lifecycle
//!
//!     Open ──(segment_size objects)──► Closed ──(victim)──┬──► freed
//!       │                                 ▲               ├──► merged survivors
//!       └──(no closed segment anywhere)───┘               └──► training bucket
//! ```
//!
//! A segment's `objs` keeps one slot per admitted object in admission order.
//! Removed or evicted objects leave a `None` tombstone so surviving objects
//! keep their slot index.

use crate::ds::SlotId;
use crate::request::ObjKey;

use super::feature::{CacheStateSnapshot, SegmentWindows};
use super::learner::RowHandle;

pub type ObjId = SlotId;
pub type SegId = SlotId;

#[derive(Debug, Clone)]
pub struct CachedObject {
    pub key: ObjKey,
    /// Charged size in bytes.
    pub size: u64,
    pub seg: SegId,
    pub slot: usize,
    pub freq: u32,
    pub create_vtime: u64,
    pub last_access_vtime: u64,
}

impl CachedObject {
    pub fn age(&self, vtime: u64) -> u64 {
        vtime.saturating_sub(self.last_access_vtime)
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub objs: Vec<Option<ObjId>>,
    pub bucket_idx: usize,
    pub prev: Option<SegId>,
    pub next: Option<SegId>,

    /// Bytes ever admitted into the segment.
    pub total_bytes: u64,
    /// Bytes of currently active objects.
    pub active_bytes: u64,
    pub n_total_obj: u32,
    pub n_total_hit: u32,
    pub n_active: u32,
    pub n_merge: u32,

    pub closed: bool,
    pub create_rtime: u64,
    pub create_vtime: u64,
    pub state: CacheStateSnapshot,
    pub windows: SegmentWindows,

    pub is_training: bool,
    pub training_row: Option<RowHandle>,
}

impl Segment {
    pub fn open(bucket_idx: usize, rtime: u64, vtime: u64, capacity: usize) -> Self {
        Self {
            objs: Vec::with_capacity(capacity),
            bucket_idx,
            prev: None,
            next: None,
            total_bytes: 0,
            active_bytes: 0,
            n_total_obj: 0,
            n_total_hit: 0,
            n_active: 0,
            n_merge: 0,
            closed: false,
            create_rtime: rtime,
            create_vtime: vtime,
            state: CacheStateSnapshot::default(),
            windows: SegmentWindows::new(rtime),
            is_training: false,
            training_row: None,
        }
    }

    /// Stamps the segment as closed at the given clock.
    pub fn close(&mut self, rtime: u64, vtime: u64, state: CacheStateSnapshot) {
        self.closed = true;
        self.create_rtime = rtime;
        self.create_vtime = vtime;
        self.state = state;
        self.windows = SegmentWindows::new(rtime);
    }

    pub fn push(&mut self, id: ObjId, size: u64) -> usize {
        self.objs.push(Some(id));
        self.total_bytes += size;
        self.active_bytes += size;
        self.n_total_obj += 1;
        self.n_active += 1;
        self.objs.len() - 1
    }

    /// Tombstones `slot`, returning the object id it held.
    pub fn take(&mut self, slot: usize, size: u64) -> Option<ObjId> {
        let id = self.objs.get_mut(slot)?.take()?;
        self.n_active -= 1;
        self.active_bytes -= size;
        Some(id)
    }

    pub fn active(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.objs.iter().flatten().copied()
    }

    pub fn is_evictable(&self) -> bool {
        self.closed && !self.is_training
    }
}
