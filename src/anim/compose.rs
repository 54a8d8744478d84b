use super::{
    instance::{ShapeInstance, ThreadArena},
    thread::{Thread, Transition},
    types::{DirtyFlags, ThreadId},
    util::Bracket,
};
use crate::{
    node_set::NodeSet,
    shape::{Sequence, Shape},
    transform::{self, ScaleValue},
};
use nalgebra_glm as glm;
use std::{ops::Range, sync::Arc};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

impl ShapeInstance {
    /// Animates whatever is dirty for the current detail level
    pub fn animate(&mut self) {
        self.animate_detail(self.current_detail);
    }

    /// Animates whatever is dirty for the sub-shape of detail `dl`. Nothing
    /// happens for a culled detail or one without geometry.
    pub fn animate_detail(&mut self, dl: Option<usize>) {
        let Some(dl) = dl else {
            return;
        };
        if let Some(ss) = self.shape.details()[dl].sub_shape {
            self.animate_sub_shape(ss);
        }
    }

    /// Brings a sub-shape up to date and clears its dirty flags
    ///
    /// # Panics
    /// Will panic if `ss` is out of range
    pub fn animate_sub_shape(&mut self, ss: usize) {
        let dirty = self.dirty[ss];
        if dirty.contains(DirtyFlags::THREAD) {
            self.sort_threads();
        }
        if dirty.contains(DirtyFlags::IFL) {
            self.animate_ifls();
        }
        if dirty.contains(DirtyFlags::TRANSFORM) {
            self.animate_nodes(ss);
        }
        if dirty.contains(DirtyFlags::VIS) {
            self.animate_visibility(ss);
        }
        if dirty.contains(DirtyFlags::FRAME) {
            self.animate_frame(ss);
        }
        if dirty.contains(DirtyFlags::MAT_FRAME) {
            self.animate_mat_frame(ss);
        }
        if dirty.contains(DirtyFlags::DECAL) {
            self.animate_decals(ss);
        }
        self.dirty[ss] = DirtyFlags::empty();
    }

    /// Recomputes node transforms of every sub-shape whose transforms are
    /// dirty, or of all of them when `force_full` is set
    pub fn animate_node_subtrees(&mut self, force_full: bool) {
        if force_full {
            self.set_dirty(DirtyFlags::TRANSFORM);
        }
        if self.dirty.iter().any(|d| d.contains(DirtyFlags::THREAD)) {
            self.sort_threads();
        }
        for ss in 0..self.dirty.len() {
            if self.dirty[ss].contains(DirtyFlags::TRANSFORM) {
                self.animate_nodes(ss);
                self.dirty[ss].remove(DirtyFlags::TRANSFORM);
            }
        }
    }

    /// Resolves every node of sub-shape `ss` and rebuilds its local and
    /// world transforms. Threads must already be sorted.
    ///
    /// Base pose threads claim node components in priority order and the
    /// first claim wins. Transitions then fade claimed components from the
    /// reference pose. Blend threads are multiplied on top of the local
    /// matrices and world transforms are accumulated parent first.
    pub(crate) fn animate_nodes(&mut self, ss: usize) {
        let shape = Arc::clone(&self.shape);
        let range = shape.sub_shapes()[ss].nodes.clone();
        if range.is_empty() {
            return;
        }
        let num_nodes = shape.nodes().len();

        // Nodes no base pose thread will set
        let mut rot_set = NodeSet::with_all(num_nodes);
        let mut tran_set = rot_set.clone();
        let mut scale_set = rot_set.clone();
        for seq in self.base_sequences(&shape) {
            rot_set.take_away(&seq.rotation_matters);
            tran_set.take_away(&seq.translation_matters);
            scale_set.take_away(&seq.scale_matters);
        }

        let external = self.masks.external();
        let masked_pos = self.masks.position();
        rot_set.take_away(&external);
        rot_set.overlap(&self.masks.rotation);
        tran_set.overlap(&masked_pos);
        tran_set.take_away(&external);

        // Seed defaults
        let nodes = shape.nodes();
        for i in rot_set.iter_range(range.clone()) {
            self.pose.rotations[i] = nodes[i].default_rotation;
            self.owners.rotation[i] = None;
        }
        for i in tran_set.iter_range(range.clone()) {
            self.pose.translations[i] = nodes[i].default_translation;
            self.owners.translation[i] = None;
        }

        // From here on the sets hold nodes that are already resolved.
        // Masked translations stay open so threads can fill unmasked axes.
        rot_set.overlap(&external);
        tran_set.take_away(&masked_pos);
        tran_set.overlap(&external);

        if self.scale_currently_animated {
            scale_set.take_away(&external);
            let identity = ScaleValue::identity(shape.scale_kind());
            for i in scale_set.iter_range(range.clone()) {
                self.pose.scales[i] = identity;
                self.owners.scale[i] = None;
            }
            scale_set.overlap(&external);
        }

        let order = self.order.clone();
        for id in &order {
            let thread = self.threads.get(*id);
            let bracket = thread.bracket;
            let seq = &shape.sequences()[thread.sequence];
            if seq.is_blend() {
                break;
            }
            self.claim_rotations(*id, bracket, seq, &range, &mut rot_set);
            self.claim_translations(
                *id,
                bracket,
                seq,
                &range,
                &mut tran_set,
                &masked_pos,
            );
            if self.scale_currently_animated && seq.animates_scale() {
                let kind = shape.scale_kind();
                for (j, i) in seq.scale_matters.iter().enumerate() {
                    if !range.contains(&i) || scale_set.test(i) {
                        continue;
                    }
                    let s1 = seq.scale(bracket.key1, j);
                    let s2 = seq.scale(bracket.key2, j);
                    self.pose.scales[i] =
                        s1.interpolate(&s2, bracket.key_pos).convert(kind);
                    self.owners.scale[i] = Some(*id);
                    scale_set.set(i);
                }
            }
        }

        if !self.transition_threads.is_empty() {
            self.blend_transitions(&shape, &range);
        }

        // Local transforms
        for i in range.clone() {
            if self.masks.hands_off.test(i) {
                continue;
            }
            let mut local = transform::set_matrix(
                &self.pose.rotations[i],
                &self.pose.translations[i],
            );
            if self.scale_currently_animated {
                self.pose.scales[i].apply(&mut local);
            }
            self.local_transforms[i] = local;
        }

        if let Some(callback) = self.callback.as_mut() {
            for i in self.masks.callback.iter_range(range.clone()) {
                callback.node_transform(i, &mut self.local_transforms[i]);
            }
        }

        for id in &order {
            let thread = self.threads.get(*id);
            let seq = &shape.sequences()[thread.sequence];
            if !seq.is_blend() || thread.blend_disabled {
                continue;
            }
            let bracket = thread.bracket;
            apply_blend(
                seq,
                bracket.key1,
                bracket.key2,
                bracket.key_pos,
                &range,
                &self.masks.no_blend,
                &mut self.local_transforms,
            );
        }

        // World transforms, parents always come first
        for i in range {
            self.node_transforms[i] = match nodes[i].parent {
                Some(p) => self.node_transforms[p] * self.local_transforms[i],
                None => self.local_transforms[i],
            };
        }
    }

    /// Sequences of the leading base pose threads
    fn base_sequences<'a>(
        &'a self,
        shape: &'a Shape,
    ) -> impl Iterator<Item = &'a Sequence> + 'a {
        self.order
            .iter()
            .map(|id| &shape.sequences()[self.threads.get(*id).sequence])
            .take_while(|seq| !seq.is_blend())
    }

    fn claim_rotations(
        &mut self,
        id: ThreadId,
        b: Bracket,
        seq: &Sequence,
        range: &Range<usize>,
        been_set: &mut NodeSet,
    ) {
        for (j, i) in seq.rotation_matters.iter().enumerate() {
            if !range.contains(&i) || been_set.test(i) {
                continue;
            }
            let q1 = seq.rotation(b.key1, j);
            let q2 = seq.rotation(b.key2, j);
            self.pose.rotations[i] = transform::slerp(&q1, &q2, b.key_pos);
            self.owners.rotation[i] = Some(id);
            been_set.set(i);
        }
    }

    fn claim_translations(
        &mut self,
        id: ThreadId,
        b: Bracket,
        seq: &Sequence,
        range: &Range<usize>,
        been_set: &mut NodeSet,
        masked_pos: &NodeSet,
    ) {
        for (j, i) in seq.translation_matters.iter().enumerate() {
            if !range.contains(&i) || been_set.test(i) {
                continue;
            }
            let v1 = seq.translation(b.key1, j);
            let v2 = seq.translation(b.key2, j);
            let v = transform::lerp_vec3(&v1, &v2, b.key_pos);
            let t = &mut self.pose.translations[i];
            if masked_pos.test(i) {
                if !self.masks.pos_x.test(i) {
                    t.x = v.x;
                }
                if !self.masks.pos_y.test(i) {
                    t.y = v.y;
                }
                if !self.masks.pos_z.test(i) {
                    t.z = v.z;
                }
            } else {
                *t = v;
            }
            self.owners.translation[i] = Some(id);
            been_set.set(i);
        }
    }

    /// Fades nodes of transitioning threads from the reference pose
    fn blend_transitions(&mut self, shape: &Shape, range: &Range<usize>) {
        let threads = &self.threads;
        let transitioning = self.transition_threads.as_slice();
        let sequences = shape.sequences();

        for i in self.transition_nodes.rotation.iter_range(range.clone()) {
            let pos = transition_pos(
                threads,
                transitioning,
                self.owners.rotation[i],
                |t, thread| {
                    t.old_rotation_nodes.test(i)
                        || sequences[thread.sequence].rotation_matters.test(i)
                },
            );
            self.pose.rotations[i] = transform::slerp(
                &self.reference.rotations[i],
                &self.pose.rotations[i],
                pos,
            );
        }

        for i in self.transition_nodes.translation.iter_range(range.clone()) {
            let pos = transition_pos(
                threads,
                transitioning,
                self.owners.translation[i],
                |t, thread| {
                    t.old_translation_nodes.test(i)
                        || sequences[thread.sequence].translation_matters.test(i)
                },
            );
            self.pose.translations[i] = transform::lerp_vec3(
                &self.reference.translations[i],
                &self.pose.translations[i],
                pos,
            );
        }

        if !self.scale_currently_animated {
            return;
        }
        for i in self.transition_nodes.scale.iter_range(range.clone()) {
            let pos = transition_pos(
                threads,
                transitioning,
                self.owners.scale[i],
                |t, thread| {
                    t.old_scale_nodes.test(i)
                        || sequences[thread.sequence].scale_matters.test(i)
                },
            );
            self.pose.scales[i] =
                self.reference.scales[i].interpolate(&self.pose.scales[i], pos);
        }
    }
}

/// Transition position to fade a node component with. The thread that set
/// the component is used when it is transitioning, otherwise the first
/// transitioning thread that controls or controlled the node.
///
/// # Panics
/// Will panic if no transitioning thread claims the node
fn transition_pos(
    threads: &ThreadArena,
    transitioning: &[ThreadId],
    owner: Option<ThreadId>,
    claims: impl Fn(&Transition, &Thread) -> bool,
) -> f32 {
    let owner = owner
        .filter(|id| threads.try_get(*id).is_some_and(Thread::is_in_transition))
        .or_else(|| {
            transitioning.iter().copied().find(|id| {
                let thread = threads.get(*id);
                thread.transition().is_some_and(|t| claims(t, thread))
            })
        });
    assert!(owner.is_some(), "transition node not claimed by any thread");
    owner
        .and_then(|id| threads.get(id).transition())
        .map_or(1.0, Transition::pos)
}

/// Next rank in `set` when `i` is a member
fn next_rank(set: &NodeSet, i: usize, rank: &mut usize) -> Option<usize> {
    set.test(i).then(|| {
        *rank += 1;
        *rank - 1
    })
}

/// Multiplies a blend sequence's transforms onto the local transforms.
/// Ranks advance over every node the sequence touches even outside `range`.
fn apply_blend(
    seq: &Sequence,
    key1: usize,
    key2: usize,
    key_pos: f32,
    range: &Range<usize>,
    no_blend: &NodeSet,
    local_transforms: &mut [glm::Mat4],
) {
    let (mut rot_rank, mut tran_rank, mut scale_rank) = (0, 0, 0);
    for i in seq.transform_matters().iter() {
        let rot = next_rank(&seq.rotation_matters, i, &mut rot_rank);
        let tran = next_rank(&seq.translation_matters, i, &mut tran_rank);
        let scale = next_rank(&seq.scale_matters, i, &mut scale_rank);
        if !range.contains(&i) || no_blend.test(i) {
            continue;
        }

        let mut mat = rot.map_or_else(glm::Mat4::identity, |j| {
            let q = transform::slerp(
                &seq.rotation(key1, j),
                &seq.rotation(key2, j),
                key_pos,
            );
            glm::quat_to_mat4(&q)
        });
        if let Some(j) = tran {
            let v = transform::lerp_vec3(
                &seq.translation(key1, j),
                &seq.translation(key2, j),
                key_pos,
            );
            mat.set_column(3, &glm::vec4(v.x, v.y, v.z, 1.0));
        }
        if let Some(j) = scale {
            seq.scale(key1, j)
                .interpolate(&seq.scale(key2, j), key_pos)
                .apply(&mut mat);
        }
        local_transforms[i] *= mat;
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        anim::{NodeAnimationState, ShapeInstance},
        shape::{Node, ScaleKeys, Sequence, SequenceFlags, Shape, ShapeBuilder},
        transform::{ArbitraryScale, ScaleKind, ScaleValue},
    };
    use nalgebra_glm as glm;
    use std::sync::Arc;

    const EPSILON: f32 = 0.0001;

    fn z_rot(angle: f32) -> glm::Quat {
        glm::quat_angle_axis(angle, &glm::vec3(0.0, 0.0, 1.0))
    }

    fn mat_eq(m1: &glm::Mat4, m2: &glm::Mat4) -> bool {
        let c = glm::equal_columns_eps(m1, m2, EPSILON);
        c.x && c.y && c.z && c.w
    }

    fn rig(sequences: Vec<Sequence>) -> Arc<Shape> {
        let mut b = ShapeBuilder::new("rig");
        b.add_node(Node::new("root", None));
        let mut arm = Node::new("arm", Some(0));
        arm.default_translation = glm::vec3(0.0, 1.0, 0.0);
        b.add_node(arm);
        b.sequences = sequences;
        Arc::new(b.build().unwrap())
    }

    fn slide(name: &str, priority: i32, x: f32) -> Sequence {
        let mut seq = Sequence::new(name, 2, 1.0);
        seq.priority = priority;
        seq.translation_matters.set(1);
        seq.keys.translations = vec![glm::vec3(x, 0.0, 0.0), glm::vec3(x, 0.0, 0.0)];
        seq
    }

    #[test]
    fn untouched_node_keeps_default() {
        let mut si = ShapeInstance::new(rig(vec![slide("s", 0, 3.0)]));
        let _ = si.add_thread().unwrap();
        si.animate_node_subtrees(true);
        let expected = glm::translation(&glm::vec3(3.0, 0.0, 0.0));
        assert!(mat_eq(si.local_transform(1), &expected));
        assert!(mat_eq(si.local_transform(0), &glm::Mat4::identity()));
    }

    #[test]
    fn masked_axis_keeps_default() {
        let mut si = ShapeInstance::new(rig(vec![slide("s", 0, 3.0)]));
        let _ = si.add_thread().unwrap();
        si.set_node_animation_state(1, NodeAnimationState::POS_X);
        si.animate_node_subtrees(true);
        // x keeps the default, y and z come from the thread
        let t = si.node_translation(1);
        assert!(t.x.abs() < EPSILON);
        assert!(t.y.abs() < EPSILON);
    }

    #[test]
    fn hands_off_node_uses_given_transform() {
        let mut si = ShapeInstance::new(rig(vec![slide("s", 0, 3.0)]));
        let _ = si.add_thread().unwrap();
        si.set_node_animation_state(1, NodeAnimationState::HANDS_OFF);
        let local = glm::translation(&glm::vec3(0.0, 0.0, 7.0));
        si.set_node_local_transform(1, local);
        si.animate_node_subtrees(false);
        assert!(mat_eq(si.node_transform(1), &local));
    }

    #[test]
    fn callback_overrides_local() {
        let mut si = ShapeInstance::new(rig(vec![slide("s", 0, 3.0)]));
        let _ = si.add_thread().unwrap();
        si.set_node_animation_state(1, NodeAnimationState::CALLBACK);
        si.set_node_callback(Some(Box::new(|_node: usize, m: &mut glm::Mat4| {
            *m = glm::scale(m, &glm::vec3(2.0, 2.0, 2.0));
        })));
        si.animate_node_subtrees(true);
        let expected = glm::scale(
            &glm::translation(&glm::vec3(3.0, 0.0, 0.0)),
            &glm::vec3(2.0, 2.0, 2.0),
        );
        assert!(mat_eq(si.local_transform(1), &expected));
    }

    #[test]
    fn blend_multiplies_on_top() {
        let mut base = Sequence::new("base", 1, 1.0);
        base.rotation_matters.set(1);
        base.keys.rotations = vec![z_rot(0.5)];
        let mut wave = Sequence::new("wave", 1, 1.0);
        wave.flags = SequenceFlags::BLEND;
        wave.rotation_matters.set(1);
        wave.keys.rotations = vec![z_rot(0.25)];

        let mut si = ShapeInstance::new(rig(vec![base, wave]));
        let _ = si.add_thread().unwrap();
        let t = si.add_thread().unwrap();
        si.set_sequence(t, 1, 0.0);
        si.animate_node_subtrees(false);
        let expected = glm::translation(&glm::vec3(0.0, 1.0, 0.0))
            * glm::quat_to_mat4(&z_rot(0.75));
        assert!(mat_eq(si.local_transform(1), &expected));

        si.set_blend_enabled(t, false);
        si.animate_node_subtrees(false);
        let expected = glm::translation(&glm::vec3(0.0, 1.0, 0.0))
            * glm::quat_to_mat4(&z_rot(0.5));
        assert!(mat_eq(si.local_transform(1), &expected));
    }

    #[test]
    fn uniform_scale_applied() {
        let mut grow = Sequence::new("grow", 2, 1.0);
        grow.scale_matters.set(1);
        grow.keys.scales = ScaleKeys::Uniform(vec![1.0, 3.0]);
        let mut si = ShapeInstance::new(rig(vec![grow]));
        let t = si.add_thread().unwrap();
        si.set_pos(t, 0.5);
        si.animate_node_subtrees(false);
        assert!(si.scale_currently_animated());
        assert_eq!(si.node_scale(1), ScaleValue::Uniform(2.0));
        let expected = glm::scale(
            &glm::translation(&glm::vec3(0.0, 1.0, 0.0)),
            &glm::vec3(2.0, 2.0, 2.0),
        );
        assert!(mat_eq(si.local_transform(1), &expected));
    }

    /// Arm scaled by `scale` along its own y axis, held on both keyframes
    fn twist(scale: f32) -> Sequence {
        let mut seq = Sequence::new("twist", 2, 1.0);
        seq.flags = SequenceFlags::CYCLIC;
        seq.scale_matters.set(1);
        let key = ArbitraryScale {
            rotate: z_rot(std::f32::consts::FRAC_PI_2),
            scale: glm::vec3(scale, 1.0, 1.0),
        };
        seq.keys.scales = ScaleKeys::Arbitrary(vec![key, key]);
        seq
    }

    #[test]
    fn uniform_promoted_to_aligned() {
        let mut grow = Sequence::new("grow", 2, 1.0);
        grow.scale_matters.set(1);
        grow.keys.scales = ScaleKeys::Uniform(vec![1.0, 3.0]);
        let mut stretch = Sequence::new("stretch", 1, 1.0);
        stretch.scale_matters.set(1);
        stretch.keys.scales = ScaleKeys::Aligned(vec![glm::vec3(1.0, 2.0, 1.0)]);
        let shape = rig(vec![grow, stretch]);
        assert_eq!(shape.scale_kind(), ScaleKind::Aligned);

        let mut si = ShapeInstance::new(shape);
        let t = si.add_thread().unwrap();
        si.set_pos(t, 0.5);
        si.animate_node_subtrees(false);
        assert_eq!(si.node_scale(1), ScaleValue::Aligned(glm::vec3(2.0, 2.0, 2.0)));
        // Nodes no sequence scales get the identity of the shape's kind
        assert_eq!(si.node_scale(0), ScaleValue::Aligned(glm::vec3(1.0, 1.0, 1.0)));

        si.set_sequence(t, 1, 0.0);
        si.animate_node_subtrees(false);
        let expected = glm::scale(
            &glm::translation(&glm::vec3(0.0, 1.0, 0.0)),
            &glm::vec3(1.0, 2.0, 1.0),
        );
        assert!(mat_eq(si.local_transform(1), &expected));
    }

    #[test]
    fn arbitrary_scale_applied_and_cross_faded() {
        let mut idle = Sequence::new("idle", 2, 1.0);
        idle.flags = SequenceFlags::CYCLIC;
        idle.scale_matters.set(1);
        idle.keys.scales = ScaleKeys::Uniform(vec![1.0, 1.0]);
        let shape = rig(vec![idle, twist(2.0)]);
        assert_eq!(shape.scale_kind(), ScaleKind::Arbitrary);
        let offset = glm::translation(&glm::vec3(0.0, 1.0, 0.0));

        // Stretching x of a frame turned a quarter turn stretches y
        let mut steady = ShapeInstance::new(Arc::clone(&shape));
        let s = steady.add_thread().unwrap();
        steady.set_sequence(s, 1, 0.0);
        steady.animate_node_subtrees(false);
        let expected = glm::scale(&offset, &glm::vec3(1.0, 2.0, 1.0));
        assert!(mat_eq(steady.local_transform(1), &expected));

        let mut si = ShapeInstance::new(shape);
        let t = si.add_thread().unwrap();
        si.animate_node_subtrees(false);
        si.transition_to_sequence(t, 1, 0.0, 1.0, true);
        si.advance_time(t, 0.5);
        si.animate_node_subtrees(false);
        assert!(si.thread(t).is_in_transition());
        // Half way: an eighth turn and half the stretch
        let r = glm::quat_to_mat4(&z_rot(std::f32::consts::FRAC_PI_4));
        let expected =
            offset * r * glm::scaling(&glm::vec3(1.5, 1.0, 1.0)) * glm::transpose(&r);
        assert!(mat_eq(si.local_transform(1), &expected));

        si.advance_time(t, 0.5);
        si.animate_node_subtrees(false);
        assert!(!si.thread(t).is_in_transition());
        assert!(mat_eq(si.local_transform(1), steady.local_transform(1)));
    }
}
