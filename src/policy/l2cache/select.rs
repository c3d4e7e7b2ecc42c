//! Victim selection, merge, and retention.
//!
//! ```text
//!   select_victims
//!     ├─ RoundRobin:  bucket cursor ─► next_seg_to_evict (or head)
//!     ├─ Heuristic ┐
//!     │  Learned   ┴► ranked[pos] (re-rank every rank_interval evictions
//!     │               or when exhausted; stale handles skipped)
//!     └─ nothing closed anywhere ─► close the fullest open segment
//!          │
//!          ▼
//!   start + up to merge_factor - 1 closed successors in the same bucket
//! ```

use super::feature::{push_segment_features, N_FEATURES};
use super::model::FeatureMatrix;
use super::params::ScoringPolicy;
use super::segment::{ObjId, SegId, Segment};
use super::L2Cache;

#[derive(Debug, Default, Clone)]
pub(super) struct Selector {
    ranked: Vec<SegId>,
    pos: usize,
    evictions_since_rank: u64,
    rr_bucket: usize,
}

struct VictimPlan {
    seg: SegId,
    keep: Vec<ObjId>,
    drop: Vec<ObjId>,
}

impl L2Cache {
    pub(super) fn select_victims(&mut self) -> Option<Vec<SegId>> {
        self.n_evictions += 1;
        let start = match self.params.scoring {
            ScoringPolicy::RoundRobin => self.next_round_robin(),
            ScoringPolicy::Heuristic | ScoringPolicy::Learned => self.next_ranked(),
        };
        let start = match start {
            Some(id) => id,
            None => self.close_fullest_open()?,
        };

        let mut victims = vec![start];
        let mut cursor = self.segments.get(start).and_then(|s| s.next);
        while victims.len() < self.params.merge_factor {
            let Some(id) = cursor else { break };
            match self.segments.get(id) {
                Some(seg) if seg.is_evictable() => {
                    victims.push(id);
                    cursor = seg.next;
                },
                _ => break,
            }
        }
        Some(victims)
    }

    fn next_round_robin(&mut self) -> Option<SegId> {
        let n = self.buckets.len();
        for step in 0..n {
            let b = (self.selector.rr_bucket + step) % n;
            let bucket = &self.buckets[b];
            let evictable = |id: &SegId| self.segments.get(*id).is_some_and(Segment::is_evictable);
            let candidate = bucket
                .next_seg_to_evict
                .filter(evictable)
                .or_else(|| bucket.head.filter(evictable));
            if let Some(id) = candidate {
                self.selector.rr_bucket = (b + 1) % n;
                return Some(id);
            }
        }
        None
    }

    fn next_ranked(&mut self) -> Option<SegId> {
        let exhausted = self.selector.pos >= self.selector.ranked.len();
        let mut ranked_now = false;
        if exhausted || self.selector.evictions_since_rank >= self.params.rank_interval {
            self.rank_segments();
            ranked_now = true;
        }
        self.selector.evictions_since_rank += 1;

        if let Some(id) = self.consume_ranked() {
            return Some(id);
        }
        if ranked_now {
            return None;
        }
        self.rank_segments();
        self.consume_ranked()
    }

    fn consume_ranked(&mut self) -> Option<SegId> {
        while let Some(&id) = self.selector.ranked.get(self.selector.pos) {
            self.selector.pos += 1;
            if self.segments.get(id).is_some_and(Segment::is_evictable) {
                return Some(id);
            }
        }
        None
    }

    fn rank_segments(&mut self) {
        let candidates: Vec<SegId> = self
            .buckets
            .iter()
            .flat_map(|bucket| bucket.iter(&self.segments))
            .filter(|(_, seg)| seg.is_evictable())
            .map(|(id, _)| id)
            .collect();

        let learned = self.learned_utilities(&candidates);
        let is_learned = learned.is_some();
        let utilities = match learned {
            Some(utilities) => utilities,
            None => candidates
                .iter()
                .map(|&id| self.heuristic_utility(id))
                .collect(),
        };

        let mut scored: Vec<(f64, u64, SegId)> = candidates
            .iter()
            .zip(utilities)
            .map(|(&id, utility)| {
                let create_vtime = self.segments.get(id).map_or(0, |s| s.create_vtime);
                (utility, create_vtime, id)
            })
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        tracing::debug!(
            segments = scored.len(),
            learned = is_learned,
            evictions = self.n_evictions,
            "segments ranked"
        );
        self.selector.ranked = scored.into_iter().map(|(_, _, id)| id).collect();
        self.selector.pos = 0;
        self.selector.evictions_since_rank = 0;
    }

    fn heuristic_utility(&self, id: SegId) -> f64 {
        self.segments
            .get(id)
            .map(|seg| seg.active().filter_map(|obj| self.obj_score(obj)).sum())
            .unwrap_or(0.0)
    }

    // `None` falls back to the heuristic.
    fn learned_utilities(&mut self, candidates: &[SegId]) -> Option<Vec<f64>> {
        if self.params.scoring != ScoringPolicy::Learned || candidates.is_empty() {
            return None;
        }
        let rtime = self.clock.rtime;
        let learner = self.learner.as_mut()?;
        let model = learner.model()?;

        let mut features = FeatureMatrix::with_capacity(N_FEATURES, candidates.len());
        for seg in candidates.iter().filter_map(|&id| self.segments.get(id)) {
            push_segment_features(seg, rtime, features.data_mut());
        }
        let result = match model.predict(&features) {
            Ok(pred) if pred.len() == candidates.len() => Ok(pred),
            Ok(pred) => Err(format!(
                "model returned {} predictions for {} segments",
                pred.len(),
                candidates.len()
            )),
            Err(err) => Err(err.to_string()),
        };
        learner.record_inference(result.is_ok());
        match result {
            Ok(pred) => Some(pred.into_iter().map(f64::from).collect()),
            Err(error) => {
                tracing::warn!(%error, "inference failed, ranking with heuristic");
                None
            },
        }
    }

    fn close_fullest_open(&mut self) -> Option<SegId> {
        let (_, id) = self
            .buckets
            .iter()
            .filter_map(|bucket| {
                let tail = bucket.tail?;
                let seg = self.segments.get(tail)?;
                (!seg.closed && seg.n_active > 0).then_some((seg.n_active, tail))
            })
            .max_by_key(|&(n_active, _)| n_active)?;

        let (rtime, vtime) = (self.clock.rtime, self.clock.vtime);
        let snapshot = self.state.snapshot();
        self.segments.get_mut(id)?.close(rtime, vtime, snapshot);
        Some(id)
    }

    /// Merges `victims`, keeping the best `retain_per_seg` objects of each.
    /// Returns the bytes freed.
    pub(super) fn evict_segments(&mut self, victims: &[SegId]) -> u64 {
        let k = self.params.retain_per_seg;
        let mut plans = Vec::with_capacity(victims.len());
        for &seg_id in victims {
            let Some(seg) = self.segments.get(seg_id) else {
                continue;
            };
            let mut scored: Vec<(f64, ObjId)> = seg
                .active()
                .map(|id| (self.obj_score(id).unwrap_or(0.0), id))
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));
            let split = k.min(scored.len());
            let ids: Vec<ObjId> = scored.into_iter().map(|(_, id)| id).collect();
            plans.push(VictimPlan {
                seg: seg_id,
                keep: ids[..split].to_vec(),
                drop: ids[split..].to_vec(),
            });
        }

        // retention that frees nothing evicts everything instead
        if plans.iter().all(|p| p.drop.is_empty()) {
            for plan in &mut plans {
                let keep = std::mem::take(&mut plan.keep);
                plan.drop.extend(keep);
            }
        }

        let Some(first) = plans.first().map(|p| p.seg) else {
            return 0;
        };
        let Some(bucket_idx) = self.segments.get(first).map(|s| s.bucket_idx) else {
            return 0;
        };
        let resume_at = plans
            .last()
            .and_then(|p| self.segments.get(p.seg))
            .and_then(|s| s.next);
        let (rtime, vtime) = (self.clock.rtime, self.clock.vtime);

        let training_rows: Vec<_> = plans
            .iter()
            .map(|plan| self.divert_to_training(plan, rtime))
            .collect();

        if plans.iter().any(|p| !p.keep.is_empty()) {
            let n_merge = plans
                .iter()
                .filter_map(|p| self.segments.get(p.seg))
                .map(|s| s.n_merge)
                .max()
                .unwrap_or(0)
                + 1;
            let mut merged = Segment::open(bucket_idx, rtime, vtime, self.params.segment_size);
            merged.close(rtime, vtime, self.state.snapshot());
            merged.n_merge = n_merge;
            let merged_id = self.segments.insert(merged);
            self.buckets[bucket_idx].insert_before(&mut self.segments, first, merged_id);
            for plan in &plans {
                for &id in &plan.keep {
                    self.move_object(id, merged_id);
                }
            }
        }

        let track_hit_prob = self.tracks_hit_prob();
        let mut freed = 0;
        for (plan, row) in plans.iter().zip(training_rows) {
            for &id in &plan.drop {
                let Some(obj) = self.detach_object(id) else {
                    continue;
                };
                if track_hit_prob {
                    self.buckets[bucket_idx].hit_prob_mut().record_evict(obj.age(vtime));
                }
                self.metrics.record_eviction(obj.size);
                freed += obj.size;
                if row.is_some() {
                    self.ghosts.insert(obj.key, plan.seg);
                }
            }

            self.buckets[bucket_idx].unlink(&mut self.segments, plan.seg);
            match row {
                Some(handle) => {
                    if let Some(seg) = self.segments.get_mut(plan.seg) {
                        seg.is_training = true;
                        seg.training_row = Some(handle);
                    }
                    self.training_bucket.push_back(&mut self.segments, plan.seg);
                },
                None => {
                    self.segments.remove(plan.seg);
                },
            }
        }
        self.buckets[bucket_idx].next_seg_to_evict = resume_at;
        freed
    }

    fn divert_to_training(&mut self, plan: &VictimPlan, rtime: u64) -> Option<super::learner::RowHandle> {
        let learner = self.learner.as_mut()?;
        let bytes: u64 = plan
            .drop
            .iter()
            .filter_map(|&id| self.objects.get(id))
            .map(|obj| obj.size)
            .sum();
        if bytes == 0 || !learner.sample_evicted(bytes) {
            return None;
        }
        let seg = self.segments.get(plan.seg)?;
        learner.add_row(bytes, |out| push_segment_features(seg, rtime, out))
    }

    fn move_object(&mut self, id: ObjId, to: SegId) {
        let Some(obj) = self.objects.get_mut(id) else {
            return;
        };
        if let Some(from) = self.segments.get_mut(obj.seg) {
            from.take(obj.slot, obj.size);
        }
        if let Some(dest) = self.segments.get_mut(to) {
            obj.slot = dest.push(id, obj.size);
            obj.seg = to;
        }
    }
}
