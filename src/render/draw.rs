use super::{
    bin::{BinStrategy, SortElem},
    BinKind, Material, MaterialId, RenderInst, RenderInstType, XformKey,
};
use crate::{
    transform,
    types::{
        LightId, PrimitiveBufferHandle, PrimitiveRange, TextureHandle,
        VertexBufferHandle,
    },
};
use bytemuck::{Pod, Zeroable};
use itertools::Itertools;
use nalgebra_glm as glm;
use smallvec::SmallVec;
use std::sync::Arc;

/// Per draw shader constants
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
pub struct DrawConstants {
    pub world: [[f32; 4]; 4],
    /// Camera position in object space, w is 1
    pub eye: [f32; 4],
}

/// Receives the draw stream. Implemented by the GPU layer, which owns every
/// buffer and texture behind the opaque handles.
pub trait DrawSink {
    /// Bin wide state such as blending, culling and depth writes
    fn begin_bin(&mut self, _kind: BinKind) {}
    fn end_bin(&mut self, _kind: BinKind) {}
    fn set_material_pass(&mut self, material: &Material, pass: u32);
    fn set_constants(&mut self, constants: &DrawConstants);
    fn set_buffers(
        &mut self,
        vertex_buffer: VertexBufferHandle,
        primitive_buffer: PrimitiveBufferHandle,
    );
    fn set_lightmaps(
        &mut self,
        _lightmap: Option<TextureHandle>,
        _normal_lightmap: Option<TextureHandle>,
    ) {
    }
    fn set_cubemap(&mut self, _cubemap: Option<TextureHandle>) {}
    fn set_lights(&mut self, _lights: &[LightId]) {}
    /// Called before refraction draws that sample what is behind them
    fn capture_back_buffer(&mut self) {}
    fn set_color_writes(&mut self, _enabled: bool) {}
    fn draw(&mut self, range: PrimitiveRange);
    /// Draws an instance its owner renders by itself
    fn draw_object(&mut self, inst: &RenderInst);
}

/// Last values sent to a `DrawSink` so unchanged state is not sent again
#[derive(Debug, Default)]
pub(crate) struct StateCache {
    material: Option<(MaterialId, u32)>,
    constants: Option<DrawConstants>,
    buffers: Option<(VertexBufferHandle, PrimitiveBufferHandle)>,
    lightmaps: Option<(Option<TextureHandle>, Option<TextureHandle>)>,
    cubemap: Option<Option<TextureHandle>>,
    lights: Option<SmallVec<[LightId; 4]>>,
}

impl StateCache {
    /// Forget everything, for when something else touched the sink
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn material_pass(
        &mut self,
        sink: &mut impl DrawSink,
        material: &Material,
        pass: u32,
    ) {
        if self.material != Some((material.id, pass)) {
            sink.set_material_pass(material, pass);
            self.material = Some((material.id, pass));
            // A new pass rebinds its textures
            self.lightmaps = None;
            self.cubemap = None;
        }
    }

    fn constants(&mut self, sink: &mut impl DrawSink, constants: DrawConstants) {
        if self.constants != Some(constants) {
            sink.set_constants(&constants);
            self.constants = Some(constants);
        }
    }

    fn buffers(&mut self, sink: &mut impl DrawSink, inst: &RenderInst) {
        let buffers = (inst.vertex_buffer, inst.primitive_buffer);
        if self.buffers != Some(buffers) {
            sink.set_buffers(buffers.0, buffers.1);
            self.buffers = Some(buffers);
        }
    }

    fn lightmaps(
        &mut self,
        sink: &mut impl DrawSink,
        lightmap: Option<TextureHandle>,
        normal_lightmap: Option<TextureHandle>,
    ) {
        if self.lightmaps != Some((lightmap, normal_lightmap)) {
            sink.set_lightmaps(lightmap, normal_lightmap);
            self.lightmaps = Some((lightmap, normal_lightmap));
        }
    }

    fn cubemap(&mut self, sink: &mut impl DrawSink, cubemap: Option<TextureHandle>) {
        if self.cubemap != Some(cubemap) {
            sink.set_cubemap(cubemap);
            self.cubemap = Some(cubemap);
        }
    }

    fn lights(&mut self, sink: &mut impl DrawSink, lights: &[LightId]) {
        if self.lights.as_deref() != Some(lights) {
            sink.set_lights(lights);
            self.lights = Some(SmallVec::from_slice(lights));
        }
    }
}

/// Read only view of a frame's instances while drawing
pub(crate) struct FrameView<'a> {
    pub(crate) insts: &'a [RenderInst],
    pub(crate) xforms: &'a [glm::Mat4],
    pub(crate) warning: &'a Arc<Material>,
    pub(crate) cam_pos: glm::Vec3,
}

impl FrameView<'_> {
    fn xform(&self, key: XformKey) -> &glm::Mat4 {
        &self.xforms[key.index as usize]
    }

    fn material<'m>(&'m self, inst: &'m RenderInst) -> &'m Material {
        inst.material.as_deref().unwrap_or_else(|| self.warning.as_ref())
    }

    fn constants(&self, inst: &RenderInst) -> DrawConstants {
        let world = self.xform(inst.world_xform);
        let obj = self.xform(inst.obj_xform);
        let cam = &self.cam_pos;
        let eye = glm::inverse(obj) * glm::vec4(cam.x, cam.y, cam.z, 1.0);
        DrawConstants {
            world: transform::to_array(world),
            eye: [eye.x, eye.y, eye.z, 1.0],
        }
    }

    /// Instances are drawn together while these match
    fn group_key(
        &self,
        index: usize,
    ) -> (bool, MaterialId, VertexBufferHandle, PrimitiveBufferHandle) {
        let inst = &self.insts[index];
        (
            inst.object_rendered,
            self.material(inst).id,
            inst.vertex_buffer,
            inst.primitive_buffer,
        )
    }
}

/// Draws one sorted bin. Consecutive instances sharing a material and
/// buffers form a pass group which is drawn once per material pass.
pub(crate) fn render_bin(
    view: &FrameView,
    kind: BinKind,
    elements: &[SortElem],
    sink: &mut impl DrawSink,
    cache: &mut StateCache,
) {
    if elements.is_empty() {
        return;
    }
    let strategy = kind.strategy();
    sink.begin_bin(kind);
    // Each bin sets up its own passes
    cache.reset();
    if strategy == BinStrategy::Refract {
        sink.capture_back_buffer();
    }

    let groups = elements
        .iter()
        .map(|e| e.inst as usize)
        .group_by(|i| view.group_key(*i));
    for (_, group) in &groups {
        let group: SmallVec<[usize; 16]> = group.collect();
        let first = &view.insts[group[0]];
        if first.object_rendered {
            for i in group {
                sink.draw_object(&view.insts[i]);
            }
            cache.reset();
            continue;
        }

        let material = view.material(first);
        for pass in 0..material.passes {
            cache.material_pass(sink, material, pass);
            for &i in &group {
                let inst = &view.insts[i];
                // Glowing passes do not take dynamic lights
                if strategy == BinStrategy::Interior
                    && inst.dynamic_light
                    && material.glow
                {
                    continue;
                }
                cache.constants(sink, view.constants(inst));
                cache.buffers(sink, inst);
                if strategy == BinStrategy::Translucent {
                    cache.lightmaps(sink, None, None);
                    cache.cubemap(sink, None);
                } else {
                    cache.lightmaps(sink, inst.lightmap, inst.normal_lightmap);
                    cache.cubemap(sink, inst.cubemap);
                }
                if inst.kind == RenderInstType::InteriorDynamicLighting {
                    cache.lights(sink, &inst.lights);
                }
                sink.draw(inst.range);
            }
        }
    }
    sink.end_bin(kind);
}

/// Depth only pass with colour writes off
pub(crate) fn render_z_only(
    view: &FrameView,
    elements: &[SortElem],
    sink: &mut impl DrawSink,
    cache: &mut StateCache,
) {
    if elements.is_empty() {
        return;
    }
    sink.set_color_writes(false);
    for e in elements {
        let inst = &view.insts[e.inst as usize];
        cache.constants(sink, view.constants(inst));
        cache.buffers(sink, inst);
        sink.draw(inst.range);
    }
    sink.set_color_writes(true);
}
