use super::instance::ShapeInstance;
use crate::{
    node_set::NodeSet,
    shape::{ObjectState, Sequence},
};
use std::sync::Arc;

/// Squared visibility change treated as an on/off switch instead of a fade
const VIS_JUMP: f32 = 0.99;

impl ShapeInstance {
    pub(crate) fn animate_visibility(&mut self, ss: usize) {
        self.animate_object_states(
            ss,
            |seq| &seq.vis_matters,
            |out, default| out.vis = default.vis,
            |out, s1, s2, key_pos| {
                let (v1, v2) = (s1.vis, s2.vis);
                out.vis = if (v1 - v2) * (v1 - v2) > VIS_JUMP {
                    if key_pos < 0.5 {
                        v1
                    } else {
                        v2
                    }
                } else {
                    (v2 - v1).mul_add(key_pos, v1)
                };
            },
        );
    }

    pub(crate) fn animate_frame(&mut self, ss: usize) {
        self.animate_object_states(
            ss,
            |seq| &seq.frame_matters,
            |out, default| out.frame = default.frame,
            |out, s1, s2, key_pos| {
                out.frame = if key_pos < 0.5 { s1.frame } else { s2.frame };
            },
        );
    }

    pub(crate) fn animate_mat_frame(&mut self, ss: usize) {
        self.animate_object_states(
            ss,
            |seq| &seq.mat_frame_matters,
            |out, default| out.mat_frame = default.mat_frame,
            |out, s1, s2, key_pos| {
                out.mat_frame =
                    if key_pos < 0.5 { s1.mat_frame } else { s2.mat_frame };
            },
        );
    }

    /// Shared walk for the three object state fields. Objects that no
    /// thread animates get their default; otherwise the first thread in
    /// evaluation order wins. Keys are stored by rank in the union of the
    /// object matters sets.
    fn animate_object_states(
        &mut self,
        ss: usize,
        matters: impl Fn(&Sequence) -> &NodeSet,
        reset: impl Fn(&mut ObjectState, &ObjectState),
        apply: impl Fn(&mut ObjectState, &ObjectState, &ObjectState, f32),
    ) {
        let shape = Arc::clone(&self.shape);
        let objects = shape.sub_shapes()[ss].objects.clone();
        if objects.is_empty() {
            return;
        }
        let sequences = shape.sequences();

        let mut been_set = NodeSet::with_all(shape.objects().len());
        for id in &self.order {
            been_set.take_away(matters(&sequences[self.threads.get(*id).sequence]));
        }
        let defaults = shape.default_object_states();
        for i in been_set.iter_range(objects.clone()) {
            reset(&mut self.object_states[i], &defaults[i]);
        }

        for id in &self.order {
            let thread = self.threads.get(*id);
            let seq = &sequences[thread.sequence];
            let field_matters = matters(seq);
            let object_matters = seq.object_matters();
            let count = object_matters.count();
            let b = thread.bracket;
            for (j, i) in object_matters.iter().enumerate() {
                if !objects.contains(&i)
                    || been_set.test(i)
                    || !field_matters.test(i)
                {
                    continue;
                }
                let s1 = seq.object_state(b.key1, j, count);
                let s2 = seq.object_state(b.key2, j, count);
                apply(&mut self.object_states[i], &s1, &s2, b.key_pos);
                been_set.set(i);
            }
        }
    }

    pub(crate) fn animate_decals(&mut self, ss: usize) {
        let shape = Arc::clone(&self.shape);
        let decals = shape.sub_shapes()[ss].decals.clone();
        if decals.is_empty() {
            return;
        }
        let sequences = shape.sequences();

        let mut been_set = NodeSet::with_all(shape.decals().len());
        for id in &self.order {
            been_set.take_away(&sequences[self.threads.get(*id).sequence].decal_matters);
        }
        for i in been_set.iter_range(decals.clone()) {
            self.decal_frames[i] = 0;
        }

        for id in &self.order {
            let thread = self.threads.get(*id);
            let seq = &sequences[thread.sequence];
            let b = thread.bracket;
            let key = if b.key_pos < 0.5 { b.key1 } else { b.key2 };
            for (j, i) in seq.decal_matters.iter().enumerate() {
                if !decals.contains(&i) || been_set.test(i) {
                    continue;
                }
                self.decal_frames[i] = seq.decal_state(key, j).frame;
                been_set.set(i);
            }
        }
    }

    /// IFL materials follow the time of the first thread that animates them
    pub(crate) fn animate_ifls(&mut self) {
        let shape = Arc::clone(&self.shape);
        let sequences = shape.sequences();
        for (i, ifl) in shape.ifl_materials().iter().enumerate() {
            self.ifl_frames[i] = self
                .order
                .iter()
                .map(|id| self.threads.get(*id))
                .find_map(|thread| {
                    let seq = &sequences[thread.sequence];
                    seq.ifl_matters
                        .test(i)
                        .then(|| ifl.frame_at(thread.sequence_pos() * seq.duration))
                })
                .unwrap_or(ifl.first_frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        anim::ShapeInstance,
        shape::{
            IflMaterial, Node, Object, ObjectState, Sequence, Shape, ShapeBuilder,
        },
    };
    use std::sync::Arc;

    const EPSILON: f32 = 0.0001;

    fn state(vis: f32, frame: u32) -> ObjectState {
        ObjectState {
            vis,
            frame,
            mat_frame: 0,
        }
    }

    fn shape(sequences: Vec<Sequence>) -> Arc<Shape> {
        let mut b = ShapeBuilder::new("objects");
        b.add_node(Node::new("root", None));
        for name in ["a", "b"] {
            b.add_object(Object {
                name: name.to_string(),
                node: Some(0),
                meshes: Vec::new(),
            });
        }
        b.materials = vec!["flame".to_string(); 4];
        b.ifl_materials.push(IflMaterial {
            name: "flame".to_string(),
            slot: 0,
            first_frame: 1,
            frame_times: vec![0.25, 0.5, 1.0],
        });
        b.sequences = sequences;
        Arc::new(b.build().unwrap())
    }

    /// Object 1 fades from `from` to `to` over two keyframes
    fn fade(name: &str, from: f32, to: f32) -> Sequence {
        let mut seq = Sequence::new(name, 2, 1.0);
        seq.vis_matters.set(1);
        seq.frame_matters.set(1);
        seq.keys.object_states = vec![state(from, 3), state(to, 4)];
        seq
    }

    #[test]
    fn gradual_visibility_interpolates() {
        let mut si = ShapeInstance::new(shape(vec![fade("fade", 0.2, 0.6)]));
        let t = si.add_thread().unwrap();
        si.set_pos(t, 0.25);
        si.animate_sub_shape(0);
        assert!((si.object_state(1).vis - 0.3).abs() < EPSILON);
        assert_eq!(si.object_state(1).frame, 3);
        // Object 0 is not animated
        assert!((si.object_state(0).vis - 1.0).abs() < EPSILON);
    }

    #[test]
    fn visibility_switch_snaps() {
        let mut si = ShapeInstance::new(shape(vec![fade("pop", 0.0, 1.0)]));
        let t = si.add_thread().unwrap();
        si.set_pos(t, 0.4);
        si.animate_sub_shape(0);
        assert!(si.object_state(1).vis.abs() < EPSILON);
        si.set_pos(t, 0.6);
        si.animate_sub_shape(0);
        assert!((si.object_state(1).vis - 1.0).abs() < EPSILON);
        assert_eq!(si.object_state(1).frame, 4);
    }

    #[test]
    fn first_thread_wins_objects() {
        let mut high = fade("high", 0.5, 0.5);
        high.priority = 2;
        let mut si = ShapeInstance::new(shape(vec![fade("low", 0.1, 0.1), high]));
        let low = si.add_thread().unwrap();
        let high = si.add_thread().unwrap();
        si.set_sequence(high, 1, 0.0);
        si.set_pos(low, 0.5);
        si.animate_sub_shape(0);
        assert!((si.object_state(1).vis - 0.5).abs() < EPSILON);
    }

    #[test]
    fn ifl_follows_thread_time() {
        let mut flicker = Sequence::new("flicker", 2, 1.0);
        flicker.ifl_matters.set(0);
        let mut si = ShapeInstance::new(shape(vec![flicker]));
        si.animate_sub_shape(0);
        assert_eq!(si.ifl_frame(0), 1);
        let t = si.add_thread().unwrap();
        si.set_pos(t, 0.3);
        si.animate_sub_shape(0);
        assert_eq!(si.ifl_frame(0), 2);
        si.set_pos(t, 0.9);
        si.animate_sub_shape(0);
        assert_eq!(si.ifl_frame(0), 3);
    }
}
