use super::Material;
use crate::types::{
    LightId, PrimitiveBufferHandle, PrimitiveRange, TextureHandle, VertexBufferHandle,
};
use nalgebra_glm as glm;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

/// What produced a render instance. Decides the default bin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderInstType {
    Begin,
    Sky,
    Interior,
    InteriorDynamicLighting,
    Mesh,
    Shadow,
    Decal,
    Water,
    Foliage,
    Object,
    ObjectTranslucent,
}

/// Handle to a render instance allocated this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderInstKey {
    pub(crate) index: u32,
    pub(crate) frame: u32,
}

/// Handle to a transform allocated this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct XformKey {
    pub(crate) index: u32,
    pub(crate) frame: u32,
}

/// One draw: a primitive range of a buffer pair with a material and
/// transform. Lives until the manager is cleared for the next frame.
#[derive(Clone, Debug)]
pub struct RenderInst {
    pub kind: RenderInstType,
    /// `None` draws with the warning material
    pub material: Option<Arc<Material>>,
    pub world_xform: XformKey,
    /// Object to world transform, used for the eye position
    pub obj_xform: XformKey,
    pub vertex_buffer: VertexBufferHandle,
    pub primitive_buffer: PrimitiveBufferHandle,
    pub range: PrimitiveRange,
    /// World position used for distance sorting
    pub sort_point: glm::Vec3,
    pub translucent: bool,
    pub visibility: f32,
    /// Drawn by its owner through `DrawSink::draw_object` instead of the
    /// material passes
    pub object_rendered: bool,
    pub lightmap: Option<TextureHandle>,
    pub normal_lightmap: Option<TextureHandle>,
    pub cubemap: Option<TextureHandle>,
    pub dynamic_light: bool,
    pub lights: SmallVec<[LightId; 4]>,
}

impl RenderInst {
    /// Instance drawn with `world_xform` for both transforms
    #[must_use]
    pub fn new(kind: RenderInstType, world_xform: XformKey) -> Self {
        Self {
            kind,
            material: None,
            world_xform,
            obj_xform: world_xform,
            vertex_buffer: VertexBufferHandle::default(),
            primitive_buffer: PrimitiveBufferHandle::default(),
            range: PrimitiveRange::default(),
            sort_point: glm::Vec3::zeros(),
            translucent: false,
            visibility: 1.0,
            object_rendered: false,
            lightmap: None,
            normal_lightmap: None,
            cubemap: None,
            dynamic_light: false,
            lights: SmallVec::new(),
        }
    }

    /// Translucent through the instance flag, its material or partial
    /// visibility
    #[must_use]
    pub fn is_translucent(&self) -> bool {
        self.translucent
            || self.visibility < 1.0
            || self.material.as_ref().is_some_and(|m| m.translucent)
    }
}
