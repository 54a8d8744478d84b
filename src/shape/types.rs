use crate::types::{PrimitiveBufferHandle, PrimitiveRange, VertexBufferHandle};
use nalgebra_glm as glm;
use std::ops::Range;

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    /// Always lower than the node's own index. `None` for a root.
    pub parent: Option<usize>,
    pub default_rotation: glm::Quat,
    pub default_translation: glm::Vec3,
}

impl Node {
    /// Creates a node with an identity default pose
    #[must_use]
    pub fn new(name: &str, parent: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            default_rotation: glm::Quat::identity(),
            default_translation: glm::Vec3::zeros(),
        }
    }
}

/// Part of a mesh drawn with one material
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Primitive {
    pub range: PrimitiveRange,
    /// Material slot in the shape's material list
    pub material: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertex_buffer: VertexBufferHandle,
    pub primitive_buffer: PrimitiveBufferHandle,
    pub primitives: Vec<Primitive>,
    pub poly_count: u32,
}

/// A mesh object attached to a node with one mesh per object detail. Any of
/// the meshes may be missing, so an object can drop out at lower details.
#[derive(Clone, Debug, Default)]
pub struct Object {
    pub name: String,
    pub node: Option<usize>,
    pub meshes: Vec<Option<Mesh>>,
}

impl Object {
    #[must_use]
    pub fn mesh(&self, object_detail: usize) -> Option<&Mesh> {
        self.meshes.get(object_detail).and_then(Option::as_ref)
    }
}

/// Decal projected on a mesh object, keyed by object detail like the object
#[derive(Clone, Debug, Default)]
pub struct Decal {
    pub name: String,
    pub object: usize,
    pub meshes: Vec<Option<Mesh>>,
}

impl Decal {
    #[must_use]
    pub fn mesh(&self, object_detail: usize) -> Option<&Mesh> {
        self.meshes.get(object_detail).and_then(Option::as_ref)
    }
}

/// Independent subtree of the shape. Nodes, objects and decals of a
/// sub-shape are contiguous.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubShape {
    pub nodes: Range<usize>,
    pub objects: Range<usize>,
    pub decals: Range<usize>,
}

/// One level of detail. Details are ordered from the largest (finest) size
/// to the smallest. A negative size marks a utility detail which is never
/// rendered.
#[derive(Clone, Debug)]
pub struct Detail {
    pub name: String,
    /// `None` for a detail with no geometry of its own
    pub sub_shape: Option<usize>,
    pub object_detail: usize,
    pub size: f32,
    /// Filled in when the shape is built
    pub poly_count: u32,
    pub average_error: f32,
    /// Negative when the error metric is not available
    pub max_error: f32,
}

impl Detail {
    #[must_use]
    pub fn new(name: &str, sub_shape: usize, object_detail: usize, size: f32) -> Self {
        Self {
            name: name.to_string(),
            sub_shape: Some(sub_shape),
            object_detail,
            size,
            poly_count: 0,
            average_error: -1.0,
            max_error: -1.0,
        }
    }

    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.size >= 0.0
    }
}

/// Per object animated state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectState {
    pub vis: f32,
    pub frame: u32,
    pub mat_frame: u32,
}

impl Default for ObjectState {
    fn default() -> Self {
        Self {
            vis: 1.0,
            frame: 0,
            mat_frame: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecalState {
    pub frame: u32,
}

/// Material that flips through frames over time ("image file list")
#[derive(Clone, Debug, Default)]
pub struct IflMaterial {
    pub name: String,
    /// Slot in the shape's material list that this replaces
    pub slot: usize,
    pub first_frame: u32,
    /// Time at which each frame ends. The last entry is the cycle length.
    pub frame_times: Vec<f32>,
}

impl IflMaterial {
    /// Frame showing at time `t`, cycling
    #[must_use]
    pub fn frame_at(&self, t: f32) -> u32 {
        let Some(&total) = self.frame_times.last() else {
            return self.first_frame;
        };
        if total <= 0.0 {
            return self.first_frame;
        }
        let t = t.rem_euclid(total);
        let i = self
            .frame_times
            .iter()
            .position(|end| t < *end)
            .unwrap_or(self.frame_times.len() - 1);
        #[allow(clippy::cast_possible_truncation)]
        let i = i as u32; // Frame lists are tiny
        self.first_frame + i
    }
}

/// State bit change at a position in a sequence
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trigger {
    pub pos: f32,
    pub state: u32,
}

impl Trigger {
    pub const STATE_ON: u32 = 1 << 31;
    pub const INVERT_ON_REVERSE: u32 = 1 << 30;
    pub const STATE_MASK: u32 = (1 << 30) - 1;
    /// Trigger states are numbered from 1
    pub const MAX_STATE: u32 = 30;

    /// Creates a trigger that sets (`on`) or clears state number `state_num`
    /// when playback passes `pos`.
    ///
    /// # Panics
    /// Will panic if `state_num` is not in `1..=MAX_STATE`
    #[must_use]
    pub fn new(pos: f32, state_num: u32, on: bool, invert_on_reverse: bool) -> Self {
        assert!((1..=Self::MAX_STATE).contains(&state_num));
        let mut state = 1 << (state_num - 1);
        if on {
            state |= Self::STATE_ON;
        }
        if invert_on_reverse {
            state |= Self::INVERT_ON_REVERSE;
        }
        Self { pos, state }
    }

    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.state & Self::STATE_ON != 0
    }

    #[must_use]
    pub const fn inverts_on_reverse(&self) -> bool {
        self.state & Self::INVERT_ON_REVERSE != 0
    }

    /// The state bit this trigger changes
    #[must_use]
    pub const fn state_bit(&self) -> u32 {
        self.state & Self::STATE_MASK
    }
}
