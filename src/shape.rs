mod builder;
mod sequence;
mod types;

// Re-export
pub use builder::ShapeBuilder;
pub use sequence::{ScaleKeys, Sequence, SequenceFlags, SequenceKeys};
pub use types::{
    Decal, DecalState, Detail, IflMaterial, Mesh, Node, Object, ObjectState,
    Primitive, SubShape, Trigger,
};

use crate::{mw_error::MwError, transform::ScaleKind};
use ahash::AHashMap;
use nalgebra_glm as glm;

/// Skeleton, meshes, sequences and detail levels. Built once with
/// `ShapeBuilder` and then shared through an `Arc`; nothing mutates a shape
/// after it is built.
#[derive(Debug)]
pub struct Shape {
    name: String,
    nodes: Vec<Node>,
    objects: Vec<Object>,
    decals: Vec<Decal>,
    sub_shapes: Vec<SubShape>,
    details: Vec<Detail>,
    sequences: Vec<Sequence>,
    materials: Vec<String>,
    ifl_materials: Vec<IflMaterial>,
    default_object_states: Vec<ObjectState>,
    radius: f32,
    center: glm::Vec3,
    scale_kind: ScaleKind,
    smallest_visible_dl: Option<usize>,
    smallest_visible_size: f32,
    sequence_names: AHashMap<String, usize>,
    node_names: AHashMap<String, usize>,
}

impl Shape {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    #[must_use]
    pub fn decals(&self) -> &[Decal] {
        &self.decals
    }

    #[must_use]
    pub fn sub_shapes(&self) -> &[SubShape] {
        &self.sub_shapes
    }

    #[must_use]
    pub fn details(&self) -> &[Detail] {
        &self.details
    }

    #[must_use]
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Names of the material slots used by mesh primitives
    #[must_use]
    pub fn materials(&self) -> &[String] {
        &self.materials
    }

    #[must_use]
    pub fn ifl_materials(&self) -> &[IflMaterial] {
        &self.ifl_materials
    }

    #[must_use]
    pub fn default_object_states(&self) -> &[ObjectState] {
        &self.default_object_states
    }

    /// Bounding sphere radius used for detail selection
    #[must_use]
    pub const fn radius(&self) -> f32 {
        self.radius
    }

    #[must_use]
    pub const fn center(&self) -> glm::Vec3 {
        self.center
    }

    /// Largest scale representation used by any sequence. Instances keep
    /// node scales in this representation.
    #[must_use]
    pub const fn scale_kind(&self) -> ScaleKind {
        self.scale_kind
    }

    /// Coarsest detail that is ever rendered
    #[must_use]
    pub const fn smallest_visible_dl(&self) -> Option<usize> {
        self.smallest_visible_dl
    }

    /// Projected sizes at or below this are not rendered
    #[must_use]
    pub const fn smallest_visible_size(&self) -> f32 {
        self.smallest_visible_size
    }

    /// # Errors
    /// May return `MwError`
    pub fn find_sequence(&self, name: &str) -> Result<usize, MwError> {
        self.sequence_names
            .get(name)
            .copied()
            .ok_or_else(|| MwError::UnknownSequence(name.to_string()))
    }

    /// # Errors
    /// May return `MwError`
    pub fn find_node(&self, name: &str) -> Result<usize, MwError> {
        self.node_names
            .get(name)
            .copied()
            .ok_or_else(|| MwError::UnknownNode(name.to_string()))
    }

    /// # Errors
    /// May return `MwError`
    pub fn find_object(&self, name: &str) -> Result<usize, MwError> {
        self.objects
            .iter()
            .position(|o| o.name == name)
            .ok_or_else(|| MwError::UnknownObject(name.to_string()))
    }

    #[must_use]
    pub fn find_detail(&self, name: &str) -> Option<usize> {
        self.details.iter().position(|d| d.name == name)
    }

    /// Polygons drawn at object detail `object_detail` for the objects in
    /// `objects`
    #[must_use]
    pub fn poly_count(
        &self,
        objects: impl Iterator<Item = usize>,
        object_detail: usize,
    ) -> u32 {
        objects
            .filter_map(|i| self.objects[i].mesh(object_detail))
            .map(|m| m.poly_count)
            .sum()
    }

    /// Sub-shape whose node range contains `node`
    #[must_use]
    pub fn sub_shape_of_node(&self, node: usize) -> Option<usize> {
        self.sub_shapes.iter().position(|ss| ss.nodes.contains(&node))
    }
}
