use super::{
    sequence::Sequence,
    types::{Decal, Detail, IflMaterial, Node, Object, ObjectState, SubShape},
    Shape,
};
use crate::{
    mw_error::{MwError, ShapeError},
    node_set::NodeSet,
    transform::ScaleKind,
};
use ahash::AHashMap;
use nalgebra_glm as glm;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

/// Everything needed to build a `Shape`. The fields are filled in by the
/// caller (usually a loader) and checked by `build`.
#[derive(Clone, Debug, Default)]
pub struct ShapeBuilder {
    pub name: String,
    pub nodes: Vec<Node>,
    pub objects: Vec<Object>,
    pub decals: Vec<Decal>,
    /// When empty a single sub-shape covering everything is used
    pub sub_shapes: Vec<SubShape>,
    pub details: Vec<Detail>,
    pub sequences: Vec<Sequence>,
    pub materials: Vec<String>,
    pub ifl_materials: Vec<IflMaterial>,
    /// When empty every object starts fully visible on frame 0
    pub default_object_states: Vec<ObjectState>,
    pub radius: f32,
    pub center: glm::Vec3,
}

impl ShapeBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            radius: 1.0,
            ..Default::default()
        }
    }

    /// Adds a node and returns its index
    pub fn add_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Adds an object and returns its index
    pub fn add_object(&mut self, object: Object) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    /// Adds a sequence and returns its index
    pub fn add_sequence(&mut self, sequence: Sequence) -> usize {
        self.sequences.push(sequence);
        self.sequences.len() - 1
    }

    /// Adds a detail level and returns its index
    pub fn add_detail(&mut self, detail: Detail) -> usize {
        self.details.push(detail);
        self.details.len() - 1
    }

    /// Validates the data and computes derived values
    ///
    /// # Errors
    /// May return `MwError`
    pub fn build(mut self) -> Result<Shape, MwError> {
        self.check_nodes()?;
        if self.sub_shapes.is_empty() {
            self.sub_shapes.push(SubShape {
                nodes: 0..self.nodes.len(),
                objects: 0..self.objects.len(),
                decals: 0..self.decals.len(),
            });
        }
        self.check_sub_shapes()?;
        self.check_meshes()?;
        for seq in &mut self.sequences {
            check_sequence(
                seq,
                self.nodes.len(),
                self.objects.len(),
                self.decals.len(),
                self.ifl_materials.len(),
            )?;
            seq.compute_dirty();
        }
        self.compute_details()?;
        if self.default_object_states.len() != self.objects.len() {
            self.default_object_states =
                vec![ObjectState::default(); self.objects.len()];
        }

        let scale_kind = self
            .sequences
            .iter()
            .filter(|s| !s.scale_matters.is_empty())
            .map(Sequence::scale_kind)
            .max()
            .unwrap_or(ScaleKind::None);
        let smallest_visible_dl =
            self.details.iter().rposition(Detail::is_renderable);
        let smallest_visible_size =
            smallest_visible_dl.map_or(f32::MAX, |dl| self.details[dl].size);
        let sequence_names = self
            .sequences
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect::<AHashMap<_, _>>();
        let node_names = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect::<AHashMap<_, _>>();

        info!(
            "Shape {} built: {} nodes, {} objects, {} sequences, {} details",
            self.name,
            self.nodes.len(),
            self.objects.len(),
            self.sequences.len(),
            self.details.len()
        );
        debug!(
            "Shape {} scale_kind={:?} smallest_visible_dl={:?}",
            self.name, scale_kind, smallest_visible_dl
        );

        Ok(Shape {
            name: self.name,
            nodes: self.nodes,
            objects: self.objects,
            decals: self.decals,
            sub_shapes: self.sub_shapes,
            details: self.details,
            sequences: self.sequences,
            materials: self.materials,
            ifl_materials: self.ifl_materials,
            default_object_states: self.default_object_states,
            radius: self.radius,
            center: self.center,
            scale_kind,
            smallest_visible_dl,
            smallest_visible_size,
            sequence_names,
            node_names,
        })
    }

    fn check_nodes(&self) -> Result<(), ShapeError> {
        if self.nodes.is_empty() {
            return Err(ShapeError::NoNodes);
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if node.parent.is_some_and(|p| p >= i) {
                return Err(ShapeError::ParentOrder(i));
            }
        }
        for (i, object) in self.objects.iter().enumerate() {
            if object.node.is_some_and(|n| n >= self.nodes.len()) {
                return Err(ShapeError::ObjectNode(i));
            }
        }
        for (i, decal) in self.decals.iter().enumerate() {
            if decal.object >= self.objects.len() {
                return Err(ShapeError::DecalObject(i));
            }
        }
        Ok(())
    }

    fn check_sub_shapes(&self) -> Result<(), ShapeError> {
        for (i, ss) in self.sub_shapes.iter().enumerate() {
            if ss.nodes.end > self.nodes.len()
                || ss.objects.end > self.objects.len()
                || ss.decals.end > self.decals.len()
            {
                return Err(ShapeError::SubShapeRange(i));
            }
            // A child must be in the same sub-shape as its parent
            for n in ss.nodes.clone() {
                if let Some(p) = self.nodes[n].parent {
                    if !ss.nodes.contains(&p) {
                        return Err(ShapeError::SubShapeRange(i));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_meshes(&self) -> Result<(), ShapeError> {
        let meshes = self
            .objects
            .iter()
            .flat_map(|o| o.meshes.iter())
            .chain(self.decals.iter().flat_map(|d| d.meshes.iter()))
            .flatten();
        for mesh in meshes {
            for prim in &mesh.primitives {
                if let Some(slot) = prim.material {
                    if slot >= self.materials.len() {
                        return Err(ShapeError::MaterialSlot(slot));
                    }
                }
            }
        }
        for (i, ifl) in self.ifl_materials.iter().enumerate() {
            if ifl.slot >= self.materials.len() {
                return Err(ShapeError::IflMaterial(i));
            }
        }
        Ok(())
    }

    fn compute_details(&mut self) -> Result<(), ShapeError> {
        let mut last_size = f32::MAX;
        for i in 0..self.details.len() {
            let size = self.details[i].size;
            if size >= 0.0 {
                if size > last_size {
                    return Err(ShapeError::DetailOrder(i));
                }
                last_size = size;
            }
            let polys = match self.details[i].sub_shape {
                Some(ss) => {
                    let Some(sub) = self.sub_shapes.get(ss) else {
                        return Err(ShapeError::DetailSubShape(i));
                    };
                    let od = self.details[i].object_detail;
                    sub.objects
                        .clone()
                        .filter_map(|o| self.objects[o].mesh(od))
                        .map(|m| m.poly_count)
                        .sum()
                }
                None => 0,
            };
            self.details[i].poly_count = polys;
        }
        Ok(())
    }
}

fn check_sequence(
    seq: &Sequence,
    num_nodes: usize,
    num_objects: usize,
    num_decals: usize,
    num_ifls: usize,
) -> Result<(), ShapeError> {
    let name = || seq.name.clone();
    if seq.num_keyframes == 0 {
        return Err(ShapeError::NoKeyframes(name()));
    }
    if seq.duration <= 0.0 || !seq.duration.is_finite() {
        return Err(ShapeError::BadDuration(name()));
    }

    let in_range = |set: &NodeSet, n: usize| set.end() <= n;
    if !in_range(&seq.rotation_matters, num_nodes)
        || !in_range(&seq.translation_matters, num_nodes)
        || !in_range(&seq.scale_matters, num_nodes)
        || !in_range(&seq.vis_matters, num_objects)
        || !in_range(&seq.frame_matters, num_objects)
        || !in_range(&seq.mat_frame_matters, num_objects)
        || !in_range(&seq.decal_matters, num_decals)
        || !in_range(&seq.ifl_matters, num_ifls)
    {
        return Err(ShapeError::MattersRange(name()));
    }

    let k = seq.num_keyframes;
    let keys = &seq.keys;
    if keys.rotations.len() != k * seq.rotation_matters.count()
        || keys.translations.len() != k * seq.translation_matters.count()
        || keys.object_states.len() != k * seq.object_matters().count()
        || keys.decal_states.len() != k * seq.decal_matters.count()
    {
        return Err(ShapeError::KeyCountMismatch(name()));
    }
    let scale_count = seq.scale_matters.count();
    if scale_count > 0 && seq.scale_kind() == ScaleKind::None {
        return Err(ShapeError::ScaleKindMismatch(name()));
    }
    if keys.scales.len() != k * scale_count {
        return Err(ShapeError::KeyCountMismatch(name()));
    }
    if keys.ground_rotations.len() != keys.ground_translations.len() {
        return Err(ShapeError::GroundCountMismatch(name()));
    }

    let mut last = 0.0;
    for t in &seq.triggers {
        if t.pos < last || t.pos > 1.0 {
            return Err(ShapeError::TriggerOrder(name()));
        }
        last = t.pos;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ShapeBuilder;
    use crate::{
        mw_error::{MwError, ShapeError},
        shape::{Detail, Mesh, Node, Object, Sequence},
    };

    fn two_nodes() -> ShapeBuilder {
        let mut b = ShapeBuilder::new("test");
        b.add_node(Node::new("root", None));
        b.add_node(Node::new("child", Some(0)));
        b
    }

    #[test]
    fn rejects_parent_after_child() {
        let mut b = ShapeBuilder::new("bad");
        b.add_node(Node::new("a", Some(1)));
        b.add_node(Node::new("b", None));
        assert!(matches!(
            b.build(),
            Err(MwError::InvalidShape(ShapeError::ParentOrder(0)))
        ));
    }

    #[test]
    fn rejects_missing_keys() {
        let mut b = two_nodes();
        let mut seq = Sequence::new("walk", 2, 1.0);
        seq.rotation_matters.set(1);
        b.add_sequence(seq);
        assert!(matches!(
            b.build(),
            Err(MwError::InvalidShape(ShapeError::KeyCountMismatch(_)))
        ));
    }

    #[test]
    fn rejects_unsorted_details() {
        let mut b = two_nodes();
        b.add_detail(Detail::new("small", 0, 0, 10.0));
        b.add_detail(Detail::new("big", 0, 1, 100.0));
        assert!(matches!(
            b.build(),
            Err(MwError::InvalidShape(ShapeError::DetailOrder(1)))
        ));
    }

    #[test]
    fn detail_polys_and_visibility() {
        let mut b = two_nodes();
        let mesh = |poly_count| {
            Some(Mesh {
                poly_count,
                ..Default::default()
            })
        };
        b.add_object(Object {
            name: "body".to_string(),
            node: Some(1),
            meshes: vec![mesh(500), mesh(100)],
        });
        b.add_detail(Detail::new("high", 0, 0, 100.0));
        b.add_detail(Detail::new("low", 0, 1, 20.0));
        b.add_detail(Detail::new("collision", 0, 1, -1.0));
        let shape = b.build().unwrap();
        assert_eq!(shape.details()[0].poly_count, 500);
        assert_eq!(shape.details()[1].poly_count, 100);
        assert_eq!(shape.smallest_visible_dl(), Some(1));
        assert!((shape.smallest_visible_size() - 20.0).abs() < f32::EPSILON);
        assert_eq!(shape.find_node("child").unwrap(), 1);
        assert!(shape.find_sequence("run").is_err());
    }
}
