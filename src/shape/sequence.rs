use super::types::{DecalState, ObjectState, Trigger};
use crate::{
    anim::DirtyFlags,
    node_set::NodeSet,
    transform::{ArbitraryScale, ScaleKind, ScaleValue},
};
use bitflags::bitflags;
use nalgebra_glm as glm;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SequenceFlags: u32 {
        /// Loops, with position 1 the same as position 0
        const CYCLIC = 0x0001;
        /// Composed on top of base pose threads instead of competing for nodes
        const BLEND = 0x0002;
        /// Records the path travelled for ground transforms and triggers
        const MAKE_PATH = 0x0004;
    }
}

/// Scale keyframes in the representation used by the sequence
#[derive(Clone, Debug, Default)]
pub enum ScaleKeys {
    #[default]
    None,
    Uniform(Vec<f32>),
    Aligned(Vec<glm::Vec3>),
    Arbitrary(Vec<ArbitraryScale>),
}

impl ScaleKeys {
    #[must_use]
    pub const fn kind(&self) -> ScaleKind {
        match self {
            Self::None => ScaleKind::None,
            Self::Uniform(_) => ScaleKind::Uniform,
            Self::Aligned(_) => ScaleKind::Aligned,
            Self::Arbitrary(_) => ScaleKind::Arbitrary,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Uniform(v) => v.len(),
            Self::Aligned(v) => v.len(),
            Self::Arbitrary(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, i: usize) -> ScaleValue {
        match self {
            Self::None => ScaleValue::default(),
            Self::Uniform(v) => ScaleValue::Uniform(v[i]),
            Self::Aligned(v) => ScaleValue::Aligned(v[i]),
            Self::Arbitrary(v) => ScaleValue::Arbitrary(v[i]),
        }
    }
}

/// Keyframe payload of a sequence. Each array is laid out keyframe major:
/// entry `keyframe * count + rank` where `count` is the size of the matching
/// matters set and `rank` is the position of the node within it.
#[derive(Clone, Debug, Default)]
pub struct SequenceKeys {
    pub rotations: Vec<glm::Quat>,
    pub translations: Vec<glm::Vec3>,
    pub scales: ScaleKeys,
    /// Indexed by rank in the union of vis, frame and material frame sets
    pub object_states: Vec<ObjectState>,
    pub decal_states: Vec<DecalState>,
    pub ground_rotations: Vec<glm::Quat>,
    pub ground_translations: Vec<glm::Vec3>,
}

/// A named animation clip
#[derive(Clone, Debug)]
pub struct Sequence {
    pub name: String,
    pub flags: SequenceFlags,
    /// Higher priority threads win nodes over lower ones
    pub priority: i32,
    /// Seconds
    pub duration: f32,
    pub num_keyframes: usize,
    pub rotation_matters: NodeSet,
    pub translation_matters: NodeSet,
    pub scale_matters: NodeSet,
    /// Object indices
    pub vis_matters: NodeSet,
    pub frame_matters: NodeSet,
    pub mat_frame_matters: NodeSet,
    /// Decal indices
    pub decal_matters: NodeSet,
    /// IFL material indices
    pub ifl_matters: NodeSet,
    pub keys: SequenceKeys,
    /// Ordered by position
    pub triggers: Vec<Trigger>,
    pub(crate) dirty: DirtyFlags,
}

impl Sequence {
    /// Creates an empty sequence that affects nothing
    #[must_use]
    pub fn new(name: &str, num_keyframes: usize, duration: f32) -> Self {
        Self {
            name: name.to_string(),
            flags: SequenceFlags::empty(),
            priority: 0,
            duration,
            num_keyframes,
            rotation_matters: NodeSet::new(),
            translation_matters: NodeSet::new(),
            scale_matters: NodeSet::new(),
            vis_matters: NodeSet::new(),
            frame_matters: NodeSet::new(),
            mat_frame_matters: NodeSet::new(),
            decal_matters: NodeSet::new(),
            ifl_matters: NodeSet::new(),
            keys: SequenceKeys::default(),
            triggers: Vec::new(),
            dirty: DirtyFlags::empty(),
        }
    }

    #[must_use]
    pub const fn is_cyclic(&self) -> bool {
        self.flags.contains(SequenceFlags::CYCLIC)
    }

    #[must_use]
    pub const fn is_blend(&self) -> bool {
        self.flags.contains(SequenceFlags::BLEND)
    }

    #[must_use]
    pub const fn makes_path(&self) -> bool {
        self.flags.contains(SequenceFlags::MAKE_PATH)
    }

    #[must_use]
    pub const fn scale_kind(&self) -> ScaleKind {
        self.keys.scales.kind()
    }

    #[must_use]
    pub fn animates_scale(&self) -> bool {
        self.scale_kind() != ScaleKind::None && !self.scale_matters.is_empty()
    }

    /// What an instance has to recompute when a thread on this sequence moves
    #[must_use]
    pub const fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    #[must_use]
    pub fn num_ground_frames(&self) -> usize {
        self.keys.ground_rotations.len()
    }

    /// Objects with any animated state. Object state keys are stored by rank
    /// in this set.
    #[must_use]
    pub fn object_matters(&self) -> NodeSet {
        let mut set = self.vis_matters.clone();
        set.overlap(&self.frame_matters);
        set.overlap(&self.mat_frame_matters);
        set
    }

    /// Matters sets that take part in transitions
    #[must_use]
    pub fn transform_matters(&self) -> NodeSet {
        let mut set = self.rotation_matters.clone();
        set.overlap(&self.translation_matters);
        set.overlap(&self.scale_matters);
        set
    }

    /// # Panics
    /// Will panic if the keyframe or rank is out of range
    #[must_use]
    pub fn rotation(&self, keyframe: usize, rank: usize) -> glm::Quat {
        let count = self.rotation_matters.count();
        assert!(keyframe < self.num_keyframes && rank < count);
        self.keys.rotations[keyframe * count + rank]
    }

    /// # Panics
    /// Will panic if the keyframe or rank is out of range
    #[must_use]
    pub fn translation(&self, keyframe: usize, rank: usize) -> glm::Vec3 {
        let count = self.translation_matters.count();
        assert!(keyframe < self.num_keyframes && rank < count);
        self.keys.translations[keyframe * count + rank]
    }

    /// # Panics
    /// Will panic if the keyframe or rank is out of range
    #[must_use]
    pub fn scale(&self, keyframe: usize, rank: usize) -> ScaleValue {
        let count = self.scale_matters.count();
        assert!(keyframe < self.num_keyframes && rank < count);
        self.keys.scales.get(keyframe * count + rank)
    }

    /// `count` is the size of `object_matters()`, passed in because callers
    /// walk many objects per keyframe.
    ///
    /// # Panics
    /// Will panic if the keyframe or rank is out of range
    #[must_use]
    pub fn object_state(
        &self,
        keyframe: usize,
        rank: usize,
        count: usize,
    ) -> ObjectState {
        assert!(keyframe < self.num_keyframes && rank < count);
        self.keys.object_states[keyframe * count + rank]
    }

    /// # Panics
    /// Will panic if the keyframe or rank is out of range
    #[must_use]
    pub fn decal_state(&self, keyframe: usize, rank: usize) -> DecalState {
        let count = self.decal_matters.count();
        assert!(keyframe < self.num_keyframes && rank < count);
        self.keys.decal_states[keyframe * count + rank]
    }

    /// Rotation and translation of ground frame `frame`
    ///
    /// # Panics
    /// Will panic if the frame is out of range
    #[must_use]
    pub fn ground_frame(&self, frame: usize) -> (glm::Quat, glm::Vec3) {
        (
            self.keys.ground_rotations[frame],
            self.keys.ground_translations[frame],
        )
    }

    pub(crate) fn compute_dirty(&mut self) {
        let mut dirty = DirtyFlags::empty();
        if !self.transform_matters().is_empty() {
            dirty |= DirtyFlags::TRANSFORM;
        }
        if !self.vis_matters.is_empty() {
            dirty |= DirtyFlags::VIS;
        }
        if !self.frame_matters.is_empty() {
            dirty |= DirtyFlags::FRAME;
        }
        if !self.mat_frame_matters.is_empty() {
            dirty |= DirtyFlags::MAT_FRAME;
        }
        if !self.decal_matters.is_empty() {
            dirty |= DirtyFlags::DECAL;
        }
        if !self.ifl_matters.is_empty() {
            dirty |= DirtyFlags::IFL;
        }
        self.dirty = dirty;
    }
}
