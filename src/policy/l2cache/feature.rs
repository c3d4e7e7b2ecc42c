//! Segment features and the rolling cache state they are stamped with.
//!
//! ## Feature vector
//!
//! ```text
//!   ┌────────┬─────┬──────────┬────────────┬─────────────┬─────────────────┐
//!   │ bucket │ age │ req_rate │ write_rate │ write_ratio │ cold_miss_ratio │
//!   ├────────┴─────┼──────────┴─┬──────────┴┬────────────┴─────────────────┤
//!   │ mean_obj_sz  │ n_hit      │ n_active  │ n_merge                      │
//!   ├──────────────┴────────────┴───────────┴──────────────────────────────┤
//!   │ hits per minute      x N_FEATURE_TIME_WINDOW  (most recent first)    │
//!   │ hits per ten minutes x N_FEATURE_TIME_WINDOW                         │
//!   │ hits per hour        x N_FEATURE_TIME_WINDOW                         │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```

use rustc_hash::FxHashSet;

use crate::request::ObjKey;

use super::segment::Segment;

/// Slots in each rolling hit window.
pub const N_FEATURE_TIME_WINDOW: usize = 8;

const N_SCALAR_FEATURES: usize = 10;

/// Length of a segment feature row.
pub const N_FEATURES: usize = N_SCALAR_FEATURES + 3 * N_FEATURE_TIME_WINDOW;

const STATE_REFRESH_SECS: u64 = 60;
const STATE_REFRESH_REQUESTS: u64 = 10_000;

/// Ring of saturating hit counters, one slot per `width` seconds.
#[derive(Debug, Clone)]
pub struct HitWindow {
    counts: [u32; N_FEATURE_TIME_WINDOW],
    width: u64,
    window_start: u64,
    pos: usize,
}

impl HitWindow {
    pub fn new(width: u64, now: u64) -> Self {
        Self {
            counts: [0; N_FEATURE_TIME_WINDOW],
            width: width.max(1),
            window_start: now,
            pos: 0,
        }
    }

    pub fn record_hit(&mut self, now: u64) {
        self.roll(now);
        self.counts[self.pos] = self.counts[self.pos].saturating_add(1);
    }

    /// Counts from the current slot backwards.
    pub fn recent(&self) -> impl Iterator<Item = u32> + '_ {
        (0..N_FEATURE_TIME_WINDOW)
            .map(move |back| self.counts[(self.pos + N_FEATURE_TIME_WINDOW - back) % N_FEATURE_TIME_WINDOW])
    }

    fn roll(&mut self, now: u64) {
        if now < self.window_start + self.width {
            return;
        }
        let elapsed = (now - self.window_start) / self.width;
        let steps = elapsed.min(N_FEATURE_TIME_WINDOW as u64) as usize;
        for _ in 0..steps {
            self.pos = (self.pos + 1) % N_FEATURE_TIME_WINDOW;
            self.counts[self.pos] = 0;
        }
        self.window_start += elapsed * self.width;
    }
}

/// Minute, ten-minute, and hour hit windows of one segment.
#[derive(Debug, Clone)]
pub struct SegmentWindows {
    pub per_min: HitWindow,
    pub per_ten_min: HitWindow,
    pub per_hour: HitWindow,
}

impl SegmentWindows {
    pub fn new(now: u64) -> Self {
        Self {
            per_min: HitWindow::new(60, now),
            per_ten_min: HitWindow::new(600, now),
            per_hour: HitWindow::new(3600, now),
        }
    }

    pub fn record_hit(&mut self, now: u64) {
        self.per_min.record_hit(now);
        self.per_ten_min.record_hit(now);
        self.per_hour.record_hit(now);
    }
}

/// Cache-wide rates copied into a segment when it closes.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CacheStateSnapshot {
    pub req_rate: f64,
    pub write_rate: f64,
    pub write_ratio: f64,
    pub cold_miss_ratio: f64,
}

/// Rolling request/write rates, refreshed every minute of trace time (or
/// every 10,000 requests while the trace clock stands still).
///
/// The cold-miss ratio needs every key ever written, so that set grows with
/// the number of distinct keys and never shrinks. It is only kept when
/// requested; without it `cold_miss_ratio` stays 0.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    current: CacheStateSnapshot,
    last_update_rtime: u64,
    last_update_vtime: u64,
    n_req: u64,
    n_miss: u64,
    n_cold_miss: u64,
    seen: Option<FxHashSet<ObjKey>>,
}

impl CacheState {
    pub fn new(track_cold_misses: bool) -> Self {
        Self {
            seen: track_cold_misses.then(FxHashSet::default),
            ..Self::default()
        }
    }

    pub fn reset_clock(&mut self, rtime: u64, vtime: u64) {
        self.last_update_rtime = rtime;
        self.last_update_vtime = vtime;
    }

    pub fn on_request(&mut self, rtime: u64, vtime: u64) {
        self.n_req += 1;
        let elapsed_rt = rtime.saturating_sub(self.last_update_rtime);
        let elapsed_vt = vtime.saturating_sub(self.last_update_vtime);
        if elapsed_rt >= STATE_REFRESH_SECS || (elapsed_rt == 0 && elapsed_vt >= STATE_REFRESH_REQUESTS) {
            let secs = elapsed_rt.max(1) as f64;
            self.current = CacheStateSnapshot {
                req_rate: self.n_req as f64 / secs,
                write_rate: self.n_miss as f64 / secs,
                write_ratio: crate::metrics::ratio(self.n_miss, self.n_req),
                cold_miss_ratio: crate::metrics::ratio(self.n_cold_miss, self.n_miss),
            };
            self.n_req = 0;
            self.n_miss = 0;
            self.n_cold_miss = 0;
            self.reset_clock(rtime, vtime);
        }
    }

    pub fn on_write(&mut self, key: &ObjKey) {
        self.n_miss += 1;
        if let Some(seen) = self.seen.as_mut() {
            if seen.insert(key.clone()) {
                self.n_cold_miss += 1;
            }
        }
    }

    pub fn snapshot(&self) -> CacheStateSnapshot {
        self.current
    }
}

/// Appends the feature row of `seg` as seen at `rtime`.
pub(crate) fn push_segment_features(seg: &Segment, rtime: u64, out: &mut Vec<f32>) {
    let state = &seg.state;
    let mean_obj_size = if seg.n_total_obj == 0 {
        0.0
    } else {
        seg.total_bytes as f64 / seg.n_total_obj as f64
    };
    out.extend_from_slice(&[
        seg.bucket_idx as f32,
        rtime.saturating_sub(seg.create_rtime) as f32,
        state.req_rate as f32,
        state.write_rate as f32,
        state.write_ratio as f32,
        state.cold_miss_ratio as f32,
        mean_obj_size as f32,
        seg.n_total_hit as f32,
        seg.n_active as f32,
        seg.n_merge as f32,
    ]);
    let windows = &seg.windows;
    for window in [&windows.per_min, &windows.per_ten_min, &windows.per_hour] {
        out.extend(window.recent().map(|c| c as f32));
    }
}
