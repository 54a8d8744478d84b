mod manager;
mod part;
mod select;

// Re-export
pub use manager::{DetailManager, DetailProfile, DetailSlot, DetailStats, MAX_BUMP};
pub use part::PartInstance;
pub use select::select_by_size;

use crate::{config::DetailPrefs, types::Projection};

/// Something with detail levels that `DetailManager` can budget. Levels are
/// numbered from the finest (0) to the coarsest drawn level.
pub trait Detailed {
    /// Picks a level for a scale adjusted view distance and makes it current.
    /// `None` means the instance is not drawn.
    fn select_detail_2(
        &mut self,
        dist: f32,
        projection: &Projection,
        prefs: &DetailPrefs,
    ) -> Option<usize>;

    /// Projected radius in pixels at `dist`
    fn pixel_size(&self, dist: f32, projection: &Projection, prefs: &DetailPrefs) -> f32;

    fn current_detail(&self) -> Option<usize>;
    fn intra_detail(&self) -> f32;
    fn set_current_detail(&mut self, dl: Option<usize>, intra: f32);

    /// Coarsest level that is still drawn
    fn coarsest_detail(&self) -> Option<usize>;

    /// Polygons drawn at level `dl`, zero for a level that does not exist
    fn detail_poly_count(&self, dl: usize) -> u32;

    /// Size threshold of level `dl` in pixels
    fn detail_size(&self, dl: usize) -> f32;

    fn detail_slot(&self) -> Option<DetailSlot>;
    fn set_detail_slot(&mut self, slot: Option<DetailSlot>);
}
