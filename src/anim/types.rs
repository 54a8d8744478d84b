use bitflags::bitflags;
use nalgebra_glm as glm;

bitflags! {
    /// What has to be recomputed for a sub-shape the next time it animates
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u32 {
        const TRANSFORM = 0x0001;
        const VIS = 0x0002;
        const FRAME = 0x0004;
        const MAT_FRAME = 0x0008;
        const DECAL = 0x0010;
        const IFL = 0x0020;
        /// Thread list needs sorting
        const THREAD = 0x0040;
    }
}

bitflags! {
    /// Per node overrides of normal animation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeAnimationState: u32 {
        /// Node keeps its default rotation
        const ROTATION = 0x0001;
        /// Node keeps the default translation on these axes
        const POS_X = 0x0002;
        const POS_Y = 0x0004;
        const POS_Z = 0x0008;
        /// Blend threads do not affect the node
        const NO_BLEND = 0x0010;
        /// Local transform is set by the application
        const HANDS_OFF = 0x0020;
        /// Local transform is passed to the instance's `NodeCallback`
        const CALLBACK = 0x0040;
    }
}

/// Handle to a thread owned by one `ShapeInstance`. Handles are checked
/// against the owning instance and the slot generation on every use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadId {
    pub(crate) instance: u32,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Hook for nodes marked `NodeAnimationState::CALLBACK`. Receives the local
/// transform computed from the animation and may replace it.
pub trait NodeCallback: Send {
    fn node_transform(&mut self, node: usize, local: &mut glm::Mat4);
}

impl<F> NodeCallback for F
where
    F: FnMut(usize, &mut glm::Mat4) + Send,
{
    fn node_transform(&mut self, node: usize, local: &mut glm::Mat4) {
        self(node, local);
    }
}
