use super::{select_by_size, DetailSlot, Detailed};
use crate::{anim::ShapeInstance, config::DetailPrefs, shape::Shape, types::Projection};
use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

/// Objects this faint are not worth drawing as a part
const MIN_PART_VIS: f32 = 0.01;

/// A subset of a shape's objects drawn on its own, such as debris broken
/// off an instance. Levels come either from explicit size cutoffs or from
/// the shape's own details.
#[derive(Debug)]
pub struct PartInstance {
    shape: Arc<Shape>,
    objects: Vec<usize>,
    size_cutoffs: Option<Vec<f32>>,
    poly_counts: Vec<u32>,
    radius: f32,
    current_detail: Option<usize>,
    intra_detail: f32,
    detail_slot: Option<DetailSlot>,
}

impl PartInstance {
    /// Creates an empty part sharing the shape of `source`
    #[must_use]
    pub fn new(source: &ShapeInstance) -> Self {
        let shape = Arc::clone(source.shape());
        let mut part = Self {
            radius: shape.radius(),
            shape,
            objects: Vec::new(),
            size_cutoffs: None,
            poly_counts: Vec::new(),
            current_detail: Some(0),
            intra_detail: 1.0,
            detail_slot: None,
        };
        part.compute_poly_counts();
        part
    }

    /// Adds an object of `source` to the part. Objects that are currently
    /// invisible are skipped and `false` is returned.
    pub fn add_object(&mut self, source: &ShapeInstance, object: usize) -> bool {
        if source.object_state(object).vis < MIN_PART_VIS {
            return false;
        }
        self.objects.push(object);
        self.compute_poly_counts();
        true
    }

    /// Uses explicit size cutoffs, finest first, instead of the shape's
    /// details. Level `i` draws object detail `i`.
    pub fn set_detail_data(&mut self, size_cutoffs: Vec<f32>) {
        debug_assert!(size_cutoffs.windows(2).all(|w| w[0] >= w[1]));
        self.size_cutoffs = Some(size_cutoffs);
        self.compute_poly_counts();
    }

    /// Radius used for projection, defaults to the shape radius
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    #[must_use]
    pub fn objects(&self) -> &[usize] {
        &self.objects
    }

    #[must_use]
    pub fn num_details(&self) -> usize {
        self.size_cutoffs.as_ref().map_or_else(
            || self.shape.smallest_visible_dl().map_or(0, |dl| dl + 1),
            Vec::len,
        )
    }

    /// Polygons drawn at level `dl`
    #[must_use]
    pub fn poly_count(&self, dl: usize) -> u32 {
        self.poly_counts.get(dl).copied().unwrap_or(0)
    }

    /// Size threshold of level `dl`
    #[must_use]
    pub fn detail_size(&self, dl: usize) -> f32 {
        if dl >= self.num_details() {
            return 0.0;
        }
        self.size_cutoffs
            .as_ref()
            .map_or_else(|| self.shape.details()[dl].size, |cutoffs| cutoffs[dl])
    }

    /// Object detail drawn at the current level
    #[must_use]
    pub fn object_detail(&self) -> Option<usize> {
        let dl = self.current_detail?;
        Some(if self.size_cutoffs.is_some() {
            dl
        } else {
            self.shape.details()[dl].object_detail
        })
    }

    /// Selects the level for a projected size in pixels
    pub fn select_current_detail(&mut self, size: f32) -> Option<usize> {
        let (dl, intra) = match &self.size_cutoffs {
            Some(cutoffs) => (cutoffs.iter().position(|c| size > *c), 1.0),
            None => select_by_size(
                self.shape.details(),
                self.shape.smallest_visible_dl(),
                size,
            ),
        };
        self.current_detail = dl;
        self.intra_detail = if dl.is_some() { intra } else { 0.0 };
        dl
    }

    fn compute_poly_counts(&mut self) {
        let levels = self.num_details();
        self.poly_counts = (0..levels)
            .map(|dl| {
                let od = if self.size_cutoffs.is_some() {
                    dl
                } else {
                    self.shape.details()[dl].object_detail
                };
                self.shape.poly_count(self.objects.iter().copied(), od)
            })
            .collect();
    }
}

impl Detailed for PartInstance {
    fn select_detail_2(
        &mut self,
        dist: f32,
        projection: &Projection,
        prefs: &DetailPrefs,
    ) -> Option<usize> {
        let size = self.pixel_size(dist, projection, prefs);
        self.select_current_detail(size)
    }

    fn pixel_size(&self, dist: f32, projection: &Projection, prefs: &DetailPrefs) -> f32 {
        projection.project_radius(dist, self.radius)
            * projection.pixel_scale()
            * prefs.detail_adjust
    }

    fn current_detail(&self) -> Option<usize> {
        self.current_detail
    }

    fn intra_detail(&self) -> f32 {
        self.intra_detail
    }

    fn set_current_detail(&mut self, dl: Option<usize>, intra: f32) {
        if let Some(dl) = dl {
            assert!(dl < self.num_details(), "detail {dl} out of range");
        }
        self.current_detail = dl;
        self.intra_detail = intra;
    }

    fn coarsest_detail(&self) -> Option<usize> {
        self.num_details().checked_sub(1)
    }

    fn detail_poly_count(&self, dl: usize) -> u32 {
        self.poly_count(dl)
    }

    fn detail_size(&self, dl: usize) -> f32 {
        Self::detail_size(self, dl)
    }

    fn detail_slot(&self) -> Option<DetailSlot> {
        self.detail_slot
    }

    fn set_detail_slot(&mut self, slot: Option<DetailSlot>) {
        self.detail_slot = slot;
    }
}
