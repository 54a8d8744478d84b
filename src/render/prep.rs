use super::{MaterialLibrary, RenderInst, RenderInstManager, RenderInstType, XformKey};
use crate::{anim::ShapeInstance, shape::Mesh};
use nalgebra_glm as glm;
use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

impl ShapeInstance {
    /// Submits the visible meshes and decals of the current detail to `mgr`.
    /// Returns the number of render instances added, 0 when culled.
    pub fn prep_render(
        &self,
        mgr: &mut RenderInstManager,
        materials: &MaterialLibrary,
        world: &glm::Mat4,
    ) -> usize {
        let Some(dl) = self.current_detail else {
            return 0;
        };
        let shape = Arc::clone(self.shape());
        let detail = &shape.details()[dl];
        let Some(ss) = detail.sub_shape else {
            return 0;
        };
        let od = detail.object_detail;
        let sub_shape = &shape.sub_shapes()[ss];

        let mut count = 0;
        let mut xforms: Vec<Option<(XformKey, f32)>> =
            vec![None; shape.objects().len()];
        for i in sub_shape.objects.clone() {
            let object = &shape.objects()[i];
            let vis = self.object_state(i).vis;
            if vis <= 0.0 {
                continue;
            }
            let Some(mesh) = object.mesh(od) else {
                continue;
            };
            let xform = mgr.alloc_xform(self.object_xform(world, object.node));
            xforms[i] = Some((xform, vis));
            count += self.submit_mesh(
                mgr,
                materials,
                mesh,
                xform,
                vis,
                RenderInstType::Mesh,
            );
        }

        for decal in &shape.decals()[sub_shape.decals.clone()] {
            let Some((xform, vis)) = xforms.get(decal.object).copied().flatten() else {
                continue;
            };
            if let Some(mesh) = decal.mesh(od) {
                count += self.submit_mesh(
                    mgr,
                    materials,
                    mesh,
                    xform,
                    vis,
                    RenderInstType::Decal,
                );
            }
        }
        trace!(
            "{} submitted {count} render instances at detail {dl}",
            shape.name()
        );
        count
    }

    fn object_xform(&self, world: &glm::Mat4, node: Option<usize>) -> glm::Mat4 {
        node.map_or(*world, |n| world * self.node_transform(n))
    }

    fn submit_mesh(
        &self,
        mgr: &mut RenderInstManager,
        materials: &MaterialLibrary,
        mesh: &Mesh,
        xform: XformKey,
        vis: f32,
        kind: RenderInstType,
    ) -> usize {
        let m = mgr.xform(xform);
        let sort_point = glm::vec3(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        for primitive in &mesh.primitives {
            let mut inst = RenderInst::new(kind, xform);
            inst.material = primitive
                .material
                .and_then(|slot| self.material_name(slot))
                .map(|name| materials.resolve(name));
            inst.vertex_buffer = mesh.vertex_buffer;
            inst.primitive_buffer = mesh.primitive_buffer;
            inst.range = primitive.range;
            inst.sort_point = sort_point;
            inst.visibility = vis;
            inst.translucent = vis < 1.0;
            let key = mgr.alloc_inst(inst);
            mgr.add_inst(key);
        }
        mesh.primitives.len()
    }

    /// Name of the material in `slot`, following any IFL material that
    /// replaces it
    fn material_name(&self, slot: usize) -> Option<&str> {
        let shape = self.shape();
        let slot = shape
            .ifl_materials()
            .iter()
            .position(|ifl| ifl.slot == slot)
            .map_or(slot, |ifl| self.ifl_frame(ifl) as usize);
        shape.materials().get(slot).map(String::as_str)
    }
}
