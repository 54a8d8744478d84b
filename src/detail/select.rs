use super::{DetailSlot, Detailed};
use crate::{anim::ShapeInstance, config::DetailPrefs, shape::Detail, types::Projection};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

/// Screen error tolerated when fog exemption is on
const FOG_EXEMPT_ERROR: f32 = 0.001;

/// Sizes closer than this are treated as the same threshold
const MIN_SIZE_GAP: f32 = 0.01;

/// Finest renderable detail whose size threshold is at or below `size`,
/// with the fraction of the way from that threshold to the next finer one.
/// Returns `None` when `size` is below the threshold of the coarsest
/// visible detail `smallest_visible`.
#[must_use]
pub fn select_by_size(
    details: &[Detail],
    smallest_visible: Option<usize>,
    size: f32,
) -> (Option<usize>, f32) {
    let Some(last) = smallest_visible else {
        return (None, 0.0);
    };
    if size < details[last].size {
        return (None, 0.0);
    }
    let dl = details[..=last]
        .iter()
        .position(|d| d.is_renderable() && d.size <= size)
        .unwrap_or(last);

    let cur = details[dl].size;
    let next = if dl == 0 { 2.0 * cur } else { details[dl - 1].size };
    let intra = if next - cur > MIN_SIZE_GAP {
        ((size - cur) / (next - cur)).clamp(0.0, 1.0)
    } else {
        1.0
    };
    (Some(dl), intra)
}

impl ShapeInstance {
    /// Selects the detail for a projected size in pixels. Details finer than
    /// `prefs.num_skip_render_details` are replaced by that detail.
    pub fn select_current_detail(
        &mut self,
        size: f32,
        prefs: &DetailPrefs,
    ) -> Option<usize> {
        let last = self.shape.smallest_visible_dl();
        let (mut dl, mut intra) = select_by_size(self.shape.details(), last, size);
        if let (Some(d), Some(last)) = (dl, last) {
            let cutoff = prefs.num_skip_render_details.min(last);
            if d < cutoff {
                dl = Some(cutoff);
                intra = 1.0;
            }
        }
        self.set_current_detail(dl, intra);
        dl
    }

    /// Selects the detail for a scale adjusted distance from the camera.
    /// Shapes carrying error metrics are selected by screen error, others by
    /// projected size. Either way a shape with a visible detail is never
    /// culled here.
    pub fn select_current_detail_2(
        &mut self,
        dist: f32,
        projection: &Projection,
        prefs: &DetailPrefs,
    ) -> Option<usize> {
        let has_error_metric = self.shape.smallest_visible_dl().is_some()
            && self.shape.details().first().is_some_and(|d| d.max_error >= 0.0);
        if has_error_metric {
            // Pixels covered by one world unit at this distance
            let proj = (projection.project_radius(dist, 1.0)
                * projection.pixel_scale())
            .max(f32::EPSILON);
            let tolerance = if prefs.fog_exemption_on {
                FOG_EXEMPT_ERROR
            } else {
                prefs.screen_error
            };
            return self.select_current_detail_ex(tolerance / proj);
        }

        let size = self
            .pixel_size(dist, projection, prefs)
            .max(self.shape.smallest_visible_size() + MIN_SIZE_GAP);
        self.select_current_detail(size, prefs)
    }

    /// Selects the detail by tolerated error in world units. The pair of
    /// details whose errors bracket the tolerance is found and the intra
    /// detail fraction tweens between them: 1 is fully the finer detail.
    pub fn select_current_detail_ex(&mut self, error_tolerance: f32) -> Option<usize> {
        let Some(last) = self.shape.smallest_visible_dl() else {
            self.set_current_detail(None, 0.0);
            return None;
        };
        let details = self.shape.details();

        // Average error scaled up to the range of the maximum error
        let mut prev_err = 10.0 * details[last].average_error * 20.0;
        if prev_err < error_tolerance {
            self.set_current_detail(Some(last), 0.0);
            return Some(last);
        }
        for i in (0..=last).rev() {
            let err0 = 10.0 * details[i].average_error;
            if err0 < error_tolerance {
                let intra = 1.0 - (error_tolerance - err0) / (prev_err - err0);
                self.set_current_detail(Some(i), intra.clamp(0.0, 1.0));
                return Some(i);
            }
            prev_err = err0;
        }
        self.set_current_detail(Some(0), 1.0);
        Some(0)
    }

    /// # Panics
    /// Will panic if `dl` is not a detail of the shape
    pub fn set_current_detail(&mut self, dl: Option<usize>, intra: f32) {
        if let Some(dl) = dl {
            assert!(
                dl < self.shape.details().len(),
                "detail {dl} out of range"
            );
        }
        self.current_detail = dl;
        self.intra_detail = intra;
    }

    #[must_use]
    pub const fn current_detail(&self) -> Option<usize> {
        self.current_detail
    }

    #[must_use]
    pub const fn intra_detail(&self) -> f32 {
        self.intra_detail
    }

    /// Polygons drawn at detail `dl`
    #[must_use]
    pub fn poly_count(&self, dl: usize) -> u32 {
        self.shape.details().get(dl).map_or(0, |d| d.poly_count)
    }
}

impl Detailed for ShapeInstance {
    fn select_detail_2(
        &mut self,
        dist: f32,
        projection: &Projection,
        prefs: &DetailPrefs,
    ) -> Option<usize> {
        self.select_current_detail_2(dist, projection, prefs)
    }

    fn pixel_size(&self, dist: f32, projection: &Projection, prefs: &DetailPrefs) -> f32 {
        projection.project_radius(dist, self.shape.radius())
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
        Self::set_current_detail(self, dl, intra);
    }

    fn coarsest_detail(&self) -> Option<usize> {
        self.shape.smallest_visible_dl()
    }

    fn detail_poly_count(&self, dl: usize) -> u32 {
        self.poly_count(dl)
    }

    fn detail_size(&self, dl: usize) -> f32 {
        self.shape.details().get(dl).map_or(0.0, |d| d.size)
    }

    fn detail_slot(&self) -> Option<DetailSlot> {
        self.detail_slot
    }

    fn set_detail_slot(&mut self, slot: Option<DetailSlot>) {
        self.detail_slot = slot;
    }
}

#[cfg(test)]
mod tests {
    use super::select_by_size;
    use crate::{
        anim::ShapeInstance,
        config::DetailPrefs,
        shape::{Detail, Mesh, Node, Object, Shape, ShapeBuilder},
        types::Projection,
    };
    use std::sync::Arc;

    const EPSILON: f32 = 0.0001;

    fn shape(errors: Option<[f32; 3]>) -> Arc<Shape> {
        let mut b = ShapeBuilder::new("rock");
        b.add_node(Node::new("root", None));
        b.add_object(Object {
            name: "rock".to_string(),
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
        for (i, size) in [100.0, 50.0, 20.0].into_iter().enumerate() {
            let mut detail = Detail::new(&format!("detail{size}"), 0, i, size);
            if let Some(errors) = errors {
                detail.average_error = errors[i];
                detail.max_error = 1.0;
            }
            b.add_detail(detail);
        }
        b.add_detail(Detail::new("collision", 0, 2, -1.0));
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn finest_detail_at_or_below_size() {
        let shape = shape(None);
        let details = shape.details();
        let visible = shape.smallest_visible_dl();
        assert_eq!(visible, Some(2));

        let (dl, intra) = select_by_size(details, visible, 150.0);
        assert_eq!(dl, Some(0));
        assert!((intra - 0.5).abs() < EPSILON);

        let (dl, intra) = select_by_size(details, visible, 60.0);
        assert_eq!(dl, Some(1));
        assert!((intra - 0.2).abs() < EPSILON);

        let (dl, intra) = select_by_size(details, visible, 20.0);
        assert_eq!(dl, Some(2));
        assert!(intra.abs() < EPSILON);

        assert_eq!(select_by_size(details, visible, 19.0).0, None);
    }

    #[test]
    fn skipped_details_are_replaced() {
        let mut si = ShapeInstance::new(shape(None));
        let prefs = DetailPrefs {
            num_skip_render_details: 1,
            ..Default::default()
        };
        assert_eq!(si.select_current_detail(150.0, &prefs), Some(1));
        assert!((si.intra_detail() - 1.0).abs() < EPSILON);
        assert_eq!(si.poly_count(1), 400);
    }

    #[test]
    fn distance_never_culls() {
        let mut si = ShapeInstance::new(shape(None));
        let projection = Projection::default();
        let prefs = DetailPrefs::default();
        assert_eq!(
            si.select_current_detail_2(10_000.0, &projection, &prefs),
            Some(2)
        );
        // 1 unit radius at 2 units is 160 pixels, then 256 after pixel scale
        assert_eq!(si.select_current_detail_2(2.0, &projection, &prefs), Some(0));
        assert_eq!(si.current_detail(), Some(0));
    }

    #[test]
    fn error_metric_selection() {
        let mut si = ShapeInstance::new(shape(Some([0.1, 0.5, 2.0])));
        assert_eq!(si.select_current_detail_ex(500.0), Some(2));
        assert!(si.intra_detail().abs() < EPSILON);

        assert_eq!(si.select_current_detail_ex(10.0), Some(1));
        assert!((si.intra_detail() - 2.0 / 3.0).abs() < EPSILON);

        assert_eq!(si.select_current_detail_ex(0.5), Some(0));
        assert!((si.intra_detail() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn error_metric_used_by_distance() {
        let mut si = ShapeInstance::new(shape(Some([0.1, 0.5, 2.0])));
        let projection = Projection::default();
        // Far away everything is within tolerance
        let prefs = DetailPrefs::default();
        assert_eq!(
            si.select_current_detail_2(100_000.0, &projection, &prefs),
            Some(2)
        );
        // No tolerance at all needs the finest detail
        let prefs = DetailPrefs {
            fog_exemption_on: true,
            ..Default::default()
        };
        assert_eq!(
            si.select_current_detail_2(100_000.0, &projection, &prefs),
            Some(0)
        );
    }
}
