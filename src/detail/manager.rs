use super::Detailed;
use crate::{
    config::{DetailConfig, DetailPrefs},
    types::Projection,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

/// Depth of the table of coarser alternatives kept per instance
pub const MAX_BUMP: usize = 4;

/// Bias towards keeping the level chosen last frame
const MATCH_PREVIOUS_REWARD: f32 = 0.99;
const NOT_MATCH_PREVIOUS_PENALTY: f32 = 1.01;

static NEXT_MANAGER: AtomicU32 = AtomicU32::new(1);

/// Handle from an instance to its record in a `DetailManager`. A record is
/// retired when its instance is not selected for a frame, after which the
/// handle no longer matches. A handle only matches in the manager that
/// issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DetailSlot {
    manager: u32,
    index: u32,
    generation: u32,
}

/// Shapes how many times each kind of level is repeated in the table of
/// coarser alternatives, delaying the step away from it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailProfile {
    pub skip_first: u32,
    pub skip_middle: u32,
    pub skip_last: u32,
}

impl Default for DetailProfile {
    fn default() -> Self {
        Self {
            skip_first: 0,
            skip_middle: 0,
            skip_last: 2,
        }
    }
}

/// Numbers from the last completed frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetailStats {
    pub records: usize,
    pub polys_tried: u32,
    pub polys_rendered: u32,
    pub poly_limit: u32,
}

#[derive(Clone, Debug, Default)]
struct Record {
    generation: u32,
    live: bool,
    tag: u32,
    dl: usize,
    intra: f32,
    /// `None` when the instance was not drawn last frame
    prev_dl: Option<usize>,
    pixel_size: f32,
    polys: i64,
    size: f32,
    coarsest: usize,
    coarsest_polys: i64,
    coarsest_size: f32,
    /// Level after each step coarser
    dls: [usize; MAX_BUMP],
    /// Polygons saved by each step relative to the current level
    bump: [i64; MAX_BUMP],
    sizes: [f32; MAX_BUMP],
}

/// Chooses detail levels for all visible instances of a frame so the total
/// polygon count stays within a budget.
///
/// Call `begin`, then `select_potential` for each visible instance, then
/// `end` which runs the budget pass. Afterwards `select_current` gives each
/// instance its final level.
#[derive(Debug)]
pub struct DetailManager {
    id: u32,
    config: DetailConfig,
    records: Vec<Record>,
    free: Vec<u32>,
    tag: u32,
    in_prep: bool,
    poly_count: i64,
    poly_limit: i64,
    bump_poly_count: [i64; MAX_BUMP],
    stats: DetailStats,
}

impl Default for DetailManager {
    fn default() -> Self {
        Self::new(DetailConfig::default())
    }
}

impl DetailManager {
    #[must_use]
    pub fn new(config: DetailConfig) -> Self {
        Self {
            id: NEXT_MANAGER.fetch_add(1, Ordering::Relaxed),
            config,
            records: Vec::new(),
            free: Vec::new(),
            tag: 0,
            in_prep: false,
            poly_count: 0,
            poly_limit: 0,
            bump_poly_count: [0; MAX_BUMP],
            stats: DetailStats::default(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DetailConfig {
        &self.config
    }

    /// Takes effect at the next `begin`
    pub fn set_config(&mut self, config: DetailConfig) {
        self.config = config;
    }

    #[must_use]
    pub const fn stats(&self) -> DetailStats {
        self.stats
    }

    #[must_use]
    pub const fn in_prep(&self) -> bool {
        self.in_prep
    }

    /// Starts a frame
    ///
    /// # Panics
    /// Will panic if the previous frame was not ended
    pub fn begin(&mut self) {
        assert!(!self.in_prep, "DetailManager::begin inside a frame");
        self.in_prep = true;
        self.tag = self.tag.wrapping_add(1);
        self.poly_count = 0;
        self.poly_limit = i64::from(self.config.poly_limit());
        self.bump_poly_count = [0; MAX_BUMP];
    }

    /// Picks the preferred level of `inst` for a view distance and records
    /// the polygons that stepping coarser would save. `inv_scale` undoes the
    /// instance's scale. Returns `None` if the instance is not drawn.
    ///
    /// # Panics
    /// Will panic if called outside `begin` and `end`
    pub fn select_potential<D: Detailed>(
        &mut self,
        inst: &mut D,
        dist: f32,
        inv_scale: f32,
        profile: &DetailProfile,
        projection: &Projection,
        prefs: &DetailPrefs,
    ) -> Option<usize> {
        assert!(self.in_prep, "DetailManager::select_potential outside a frame");
        let dist = dist * inv_scale;
        let Some(dl) = inst.select_detail_2(dist, projection, prefs) else {
            self.drop_selection(inst);
            return None;
        };
        let coarsest = inst.coarsest_detail().map_or(dl, |c| c.max(dl));

        let index = match inst.detail_slot().and_then(|s| self.live_index(s)) {
            Some(index) => index,
            None => {
                let slot = self.alloc();
                inst.set_detail_slot(Some(slot));
                slot.index as usize
            }
        };

        let prev_dl = {
            let rec = &self.records[index];
            if rec.tag == self.tag {
                // Selected twice in one frame, replace the earlier choice
                self.poly_count -= rec.polys;
                for (total, bump) in self.bump_poly_count.iter_mut().zip(rec.bump) {
                    *total -= bump;
                }
                rec.prev_dl
            } else if rec.live {
                Some(rec.dl)
            } else {
                None
            }
        };

        let polys = i64::from(inst.detail_poly_count(dl));
        self.poly_count += polys;

        let rec = &mut self.records[index];
        rec.live = true;
        rec.tag = self.tag;
        rec.dl = dl;
        rec.intra = inst.intra_detail();
        rec.prev_dl = prev_dl;
        rec.pixel_size = inst.pixel_size(dist, projection, prefs);
        rec.polys = polys;
        rec.size = inst.detail_size(dl);
        rec.coarsest = coarsest;
        rec.coarsest_polys = i64::from(inst.detail_poly_count(coarsest));
        rec.coarsest_size = inst.detail_size(coarsest);

        let (mut count_first, mut count_middle, mut count_last) = (0, 0, 0);
        let mut step = dl;
        for i in 0..MAX_BUMP {
            let mut dup = false;
            if step == 0 && count_first < profile.skip_first {
                count_first += 1;
                dup = true;
            }
            if step == coarsest && count_last < profile.skip_last {
                count_last += 1;
                dup = true;
            }
            if count_middle < profile.skip_middle {
                count_middle += 1;
                dup = true;
            } else {
                count_middle = 0;
            }
            // Stepping never goes past the coarsest drawn level
            if !dup && step < coarsest {
                step += 1;
            }
            rec.dls[i] = step;
            rec.bump[i] = polys - i64::from(inst.detail_poly_count(step));
            rec.sizes[i] = inst.detail_size(step);
            self.bump_poly_count[i] += rec.bump[i];
        }
        Some(dl)
    }

    /// Gives `inst` the level decided for this frame. Returns `false` if the
    /// instance was not selected this frame and should not be drawn.
    pub fn select_current<D: Detailed>(&self, inst: &mut D) -> bool {
        let Some(index) = inst.detail_slot().and_then(|s| self.live_index(s)) else {
            return false;
        };
        let rec = &self.records[index];
        if rec.tag != self.tag {
            return false;
        }
        inst.set_current_detail(Some(rec.dl), rec.intra);
        true
    }

    /// Ends a frame. Records of instances not selected this frame are
    /// retired, then levels are stepped coarser until the polygon count
    /// fits the limit or every instance is at its coarsest level.
    ///
    /// # Panics
    /// Will panic if `begin` was not called
    pub fn end(&mut self) {
        assert!(self.in_prep, "DetailManager::end outside a frame");
        self.in_prep = false;
        self.retire_unseen();

        let polys_tried = self.poly_count;
        if self.poly_count > self.poly_limit {
            self.reduce();
        }
        if self.poly_count > self.poly_limit {
            debug!(
                "Over polygon limit at coarsest details {} > {}",
                self.poly_count, self.poly_limit
            );
        }

        let clamp = |n: i64| u32::try_from(n.max(0)).unwrap_or(u32::MAX);
        self.stats = DetailStats {
            records: self.records.iter().filter(|r| r.live).count(),
            polys_tried: clamp(polys_tried),
            polys_rendered: clamp(self.poly_count),
            poly_limit: clamp(self.poly_limit),
        };
        trace!("Detail stats {:?}", self.stats);
    }

    fn live_index(&self, slot: DetailSlot) -> Option<usize> {
        if slot.manager != self.id {
            return None;
        }
        let index = slot.index as usize;
        self.records
            .get(index)
            .filter(|r| r.live && r.generation == slot.generation)
            .map(|_| index)
    }

    /// Takes back this frame's choice for an instance that is now culled
    fn drop_selection<D: Detailed>(&mut self, inst: &mut D) {
        let Some(index) = inst.detail_slot().and_then(|s| self.live_index(s)) else {
            return;
        };
        let rec = &self.records[index];
        if rec.tag != self.tag {
            return;
        }
        self.poly_count -= rec.polys;
        for (total, bump) in self.bump_poly_count.iter_mut().zip(rec.bump) {
            *total -= bump;
        }
        self.retire(index);
        inst.set_detail_slot(None);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn retire(&mut self, index: usize) {
        let stale = self.tag.wrapping_sub(1);
        let rec = &mut self.records[index];
        rec.live = false;
        // Reuse within the frame must not look like a second selection
        rec.tag = stale;
        rec.generation = rec.generation.wrapping_add(1);
        self.free.push(index as u32);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn alloc(&mut self) -> DetailSlot {
        let index = if let Some(index) = self.free.pop() {
            index
        } else {
            self.records.push(Record::default());
            (self.records.len() - 1) as u32
        };
        DetailSlot {
            manager: self.id,
            index,
            generation: self.records[index as usize].generation,
        }
    }

    fn retire_unseen(&mut self) {
        let unseen: Vec<usize> = self
            .live_records()
            .filter(|i| self.records[*i].tag != self.tag)
            .collect();
        for i in unseen {
            self.retire(i);
        }
    }

    fn live_records(&self) -> impl Iterator<Item = usize> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.live)
            .map(|(i, _)| i)
    }

    /// Budget pass, only run when over the limit
    fn reduce(&mut self) {
        // Shallowest step that gets under the limit if everyone takes it
        let full = (0..MAX_BUMP)
            .find(|b| self.poly_count - self.bump_poly_count[*b] <= self.poly_limit);
        match full {
            Some(b) => {
                if b > 0 {
                    self.bump_all(b - 1);
                }
                self.targeted_bump(b);
            }
            None => self.bump_all(MAX_BUMP - 1),
        }
        if self.poly_count > self.poly_limit {
            self.demote_to_coarsest();
        }
    }

    fn bump_all(&mut self, b: usize) {
        let live: Vec<usize> = self.live_records().collect();
        for i in live {
            self.bump_one(i, b);
        }
    }

    fn bump_one(&mut self, i: usize, b: usize) {
        let rec = &mut self.records[i];
        let saved = rec.bump[b];
        rec.dl = rec.dls[b];
        rec.intra = 1.0;
        rec.polys -= saved;
        rec.size = rec.sizes[b];
        for bump in &mut rec.bump {
            *bump -= saved;
        }
        self.poly_count -= saved;
    }

    /// Steps single instances at step `b`, least noticeable first. The first
    /// sweep avoids dropping far below the limit, the second takes whatever
    /// is left.
    fn targeted_bump(&mut self, b: usize) {
        let order = self.priority_order(b);
        let floor = self.poly_limit - i64::from(self.config.limit_range);
        for &i in &order {
            if self.poly_count <= self.poly_limit {
                return;
            }
            let bump = self.records[i].bump[b];
            if bump > 0 && self.poly_count - bump > floor {
                self.bump_one(i, b);
            }
        }
        for &i in &order {
            if self.poly_count <= self.poly_limit {
                return;
            }
            if self.records[i].bump[b] > 0 {
                self.bump_one(i, b);
            }
        }
    }

    fn demote_to_coarsest(&mut self) {
        for i in self.priority_order(MAX_BUMP - 1) {
            if self.poly_count <= self.poly_limit {
                return;
            }
            let rec = &mut self.records[i];
            let saved = rec.polys - rec.coarsest_polys;
            if saved > 0 {
                rec.dl = rec.coarsest;
                rec.intra = 1.0;
                rec.polys = rec.coarsest_polys;
                rec.size = rec.coarsest_size;
                self.poly_count -= saved;
            }
        }
    }

    /// Live records by ascending priority, ties going to the larger drop in
    /// size
    fn priority_order(&self, b: usize) -> Vec<usize> {
        let mut ranked: Vec<(usize, f32, f32)> = self
            .live_records()
            .map(|i| {
                let (priority, delta) = priority(&self.records[i], b);
                (i, priority, delta)
            })
            .collect();
        ranked.sort_by(|x, y| x.1.total_cmp(&y.1).then_with(|| y.2.total_cmp(&x.2)));
        ranked.into_iter().map(|(i, _, _)| i).collect()
    }
}

/// Cost of stepping a record to step `b` and the size it drops by. Small
/// costs are stepped first.
fn priority(rec: &Record, b: usize) -> (f32, f32) {
    let old = if b > 0 { rec.size } else { rec.pixel_size };
    let new = rec.sizes[b];
    let mut p = 0.5f32.mul_add(rec.pixel_size - old, old - new);
    if let Some(prev) = rec.prev_dl {
        // Finer than last frame so stepping back is less noticeable
        p *= if rec.dl < prev {
            MATCH_PREVIOUS_REWARD
        } else {
            NOT_MATCH_PREVIOUS_PENALTY
        };
    }
    (p, old - new)
}

#[cfg(test)]
mod tests {
    use super::{DetailManager, DetailProfile, MAX_BUMP};
    use crate::{
        anim::ShapeInstance,
        config::{DetailConfig, DetailPrefs},
        detail::{Detailed, PartInstance},
        shape::{Detail, Mesh, Node, Object, ShapeBuilder},
        types::Projection,
    };
    use std::sync::Arc;

    fn instances(n: usize) -> Vec<ShapeInstance> {
        let mut b = ShapeBuilder::new("tree");
        b.add_node(Node::new("root", None));
        b.add_object(Object {
            name: "tree".to_string(),
            node: Some(0),
            meshes: [1000, 400, 100]
                .into_iter()
                .map(|poly_count| {
                    Some(Mesh {
                        poly_count,
                        ..Default::default()
                    })
                })
                .collect(),
        });
        b.add_detail(Detail::new("high", 0, 0, 100.0));
        b.add_detail(Detail::new("mid", 0, 1, 50.0));
        b.add_detail(Detail::new("low", 0, 2, 20.0));
        let shape = Arc::new(b.build().unwrap());
        (0..n).map(|_| ShapeInstance::new(Arc::clone(&shape))).collect()
    }

    fn manager(limit: u32) -> DetailManager {
        DetailManager::new(DetailConfig {
            detail_scale: 0.0,
            min_poly_limit: limit,
            max_poly_limit: 20000,
            limit_range: 1000,
        })
    }

    /// Runs one frame with every instance at the paired distance
    fn frame(mgr: &mut DetailManager, insts: &mut [ShapeInstance], dists: &[f32]) {
        let projection = Projection::default();
        let prefs = DetailPrefs::default();
        let profile = DetailProfile::default();
        mgr.begin();
        for (inst, dist) in insts.iter_mut().zip(dists) {
            mgr.select_potential(inst, *dist, 1.0, &profile, &projection, &prefs);
        }
        mgr.end();
        for inst in insts.iter_mut() {
            assert!(mgr.select_current(inst));
        }
    }

    #[test]
    fn under_limit_keeps_preferred() {
        let mut insts = instances(2);
        let mut mgr = manager(5000);
        frame(&mut mgr, &mut insts, &[2.0, 2.0]);
        assert!(insts.iter().all(|i| i.current_detail() == Some(0)));
        assert_eq!(mgr.stats().polys_rendered, 2000);
        assert_eq!(mgr.stats().records, 2);
    }

    #[test]
    fn lookahead_table() {
        let mut insts = instances(1);
        let mut mgr = manager(5000);
        frame(&mut mgr, &mut insts, &[2.0]);
        let rec = &mgr.records[0];
        // Default profile repeats the coarsest level twice
        assert_eq!(rec.dls, [1, 2, 2, 2]);
        assert_eq!(rec.bump, [600, 900, 900, 900]);
        assert_eq!(mgr.bump_poly_count, [600, 900, 900, 900]);
    }

    #[test]
    fn targeted_bumps_meet_limit() {
        let mut insts = instances(4);
        let mut mgr = manager(2500);
        frame(&mut mgr, &mut insts, &[2.0; 4]);
        let stats = mgr.stats();
        assert_eq!(stats.polys_tried, 4000);
        assert_eq!(stats.polys_rendered, 2200);
        let mid = insts
            .iter()
            .filter(|i| i.current_detail() == Some(1))
            .count();
        assert_eq!(mid, 3);
    }

    #[test]
    fn demotion_never_culls() {
        let mut insts = instances(4);
        let mut mgr = manager(10);
        frame(&mut mgr, &mut insts, &[2.0; 4]);
        assert!(insts.iter().all(|i| i.current_detail() == Some(2)));
        assert_eq!(mgr.stats().polys_rendered, 400);
        assert!(insts.iter().all(|i| (i.intra_detail() - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn previous_level_is_preferred() {
        let mut insts = instances(4);
        let mut mgr = manager(3400);
        frame(&mut mgr, &mut insts, &[2.0; 4]);
        assert_eq!(insts[0].current_detail(), Some(1));

        // The first instance is now the closest and would be kept fine if
        // not for having been coarse last frame
        frame(&mut mgr, &mut insts, &[2.0, 2.01, 2.01, 2.01]);
        assert_eq!(insts[0].current_detail(), Some(1));
        assert!(insts[1..].iter().all(|i| i.current_detail() == Some(0)));
    }

    #[test]
    fn skipped_instance_is_fresh() {
        let mut insts = instances(1);
        let mut mgr = manager(5000);
        frame(&mut mgr, &mut insts, &[2.0]);
        frame(&mut mgr, &mut insts, &[2.0]);
        assert_eq!(mgr.records[0].prev_dl, Some(0));

        mgr.begin();
        mgr.end();
        assert!(!mgr.select_current(&mut insts[0]));
        assert_eq!(mgr.stats().records, 0);

        frame(&mut mgr, &mut insts, &[2.0]);
        assert_eq!(mgr.records[0].prev_dl, None);
    }

    #[test]
    fn selecting_twice_counts_once() {
        let mut insts = instances(1);
        let mut mgr = manager(5000);
        let projection = Projection::default();
        let prefs = DetailPrefs::default();
        let profile = DetailProfile::default();
        mgr.begin();
        for _ in 0..2 {
            let dl = mgr.select_potential(
                &mut insts[0],
                2.0,
                1.0,
                &profile,
                &projection,
                &prefs,
            );
            assert_eq!(dl, Some(0));
            assert!(mgr.select_current(&mut insts[0]));
            assert_eq!(insts[0].current_detail(), dl);
        }
        mgr.end();
        assert_eq!(mgr.stats().polys_tried, 1000);
        assert_eq!(mgr.bump_poly_count[MAX_BUMP - 1], 900);
    }

    #[test]
    fn culled_part_takes_back_its_selection() {
        let mut insts = instances(1);
        let mut part = PartInstance::new(&insts[0]);
        assert!(part.add_object(&insts[0], 0));
        let mut mgr = manager(5000);
        let projection = Projection::default();
        let prefs = DetailPrefs::default();
        let profile = DetailProfile::default();
        mgr.begin();
        let near = mgr.select_potential(&mut part, 2.0, 1.0, &profile, &projection, &prefs);
        assert_eq!(near, Some(0));
        let far =
            mgr.select_potential(&mut part, 100_000.0, 1.0, &profile, &projection, &prefs);
        assert_eq!(far, None);
        assert!(!mgr.select_current(&mut part));
        assert_eq!(mgr.bump_poly_count, [0; MAX_BUMP]);

        // The freed record is reused by the next instance of the frame
        mgr.select_potential(&mut insts[0], 2.0, 1.0, &profile, &projection, &prefs);
        mgr.end();
        assert!(!mgr.select_current(&mut part));
        assert!(mgr.select_current(&mut insts[0]));
        assert_eq!(mgr.stats().polys_tried, 1000);
        assert_eq!(mgr.stats().records, 1);
    }

    #[test]
    fn slots_belong_to_one_manager() {
        let mut insts = instances(2);
        let mut main = manager(5000);
        let mut reflection = manager(5000);
        frame(&mut main, &mut insts[..1], &[2.0]);

        let projection = Projection::default();
        let prefs = DetailPrefs::default();
        let profile = DetailProfile::default();
        reflection.begin();
        reflection.select_potential(&mut insts[1], 2.0, 1.0, &profile, &projection, &prefs);
        reflection.select_potential(&mut insts[0], 50.0, 1.0, &profile, &projection, &prefs);
        reflection.end();
        assert_eq!(reflection.stats().records, 2);
        assert_eq!(reflection.stats().polys_tried, 1100);
        assert!(reflection.select_current(&mut insts[1]));
        assert_eq!(insts[1].current_detail(), Some(0));
        assert!(reflection.select_current(&mut insts[0]));
        assert_eq!(insts[0].current_detail(), Some(2));
    }

    #[test]
    fn inv_scale_shrinks_distance() {
        let mut insts = instances(1);
        let mut mgr = manager(5000);
        let projection = Projection::default();
        let prefs = DetailPrefs::default();
        mgr.begin();
        // 20 units away at half scale looks like 10 units: 51.2 pixels
        let dl = mgr.select_potential(
            &mut insts[0],
            20.0,
            0.5,
            &DetailProfile::default(),
            &projection,
            &prefs,
        );
        mgr.end();
        assert_eq!(dl, Some(1));
        assert_eq!(insts[0].coarsest_detail(), Some(2));
    }

    #[test]
    #[should_panic(expected = "inside a frame")]
    fn nested_begin() {
        let mut mgr = manager(5000);
        mgr.begin();
        mgr.begin();
    }

    #[test]
    #[should_panic(expected = "outside a frame")]
    fn select_outside_frame() {
        let mut insts = instances(1);
        let mut mgr = manager(5000);
        mgr.select_potential(
            &mut insts[0],
            2.0,
            1.0,
            &DetailProfile::default(),
            &Projection::default(),
            &DetailPrefs::default(),
        );
    }
}
