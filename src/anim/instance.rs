use super::{
    thread::{Thread, TransitionStep},
    types::{DirtyFlags, NodeAnimationState, NodeCallback, ThreadId},
};
use crate::{
    detail::DetailSlot,
    node_set::NodeSet,
    shape::{ObjectState, Shape, Trigger},
    transform::{self, ScaleValue},
};
use nalgebra_glm as glm;
use std::{
    cmp::Reverse,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

/// Position changes smaller than this do not dirty anything
const MIN_DELTA: f32 = 0.000_01;

static NEXT_INSTANCE: AtomicU32 = AtomicU32::new(1);

/// Per node rotation, translation and scale
#[derive(Clone, Debug, Default)]
pub(crate) struct Pose {
    pub(crate) rotations: Vec<glm::Quat>,
    pub(crate) translations: Vec<glm::Vec3>,
    /// Always in the shape's scale kind
    pub(crate) scales: Vec<ScaleValue>,
}

impl Pose {
    fn from_shape(shape: &Shape) -> Self {
        let identity = ScaleValue::identity(shape.scale_kind());
        Self {
            rotations: shape.nodes().iter().map(|n| n.default_rotation).collect(),
            translations: shape
                .nodes()
                .iter()
                .map(|n| n.default_translation)
                .collect(),
            scales: vec![identity; shape.nodes().len()],
        }
    }
}

/// Which thread set each node component during the last composition.
/// `None` means the shape default.
#[derive(Clone, Debug, Default)]
pub(crate) struct Owners {
    pub(crate) rotation: Vec<Option<ThreadId>>,
    pub(crate) translation: Vec<Option<ThreadId>>,
    pub(crate) scale: Vec<Option<ThreadId>>,
}

/// Nodes being cross faded by at least one transitioning thread
#[derive(Clone, Debug, Default)]
pub(crate) struct TransitionNodes {
    pub(crate) rotation: NodeSet,
    pub(crate) translation: NodeSet,
    pub(crate) scale: NodeSet,
}

/// Node sets built from `NodeAnimationState`
#[derive(Clone, Debug, Default)]
pub(crate) struct NodeMasks {
    pub(crate) rotation: NodeSet,
    pub(crate) pos_x: NodeSet,
    pub(crate) pos_y: NodeSet,
    pub(crate) pos_z: NodeSet,
    pub(crate) no_blend: NodeSet,
    pub(crate) hands_off: NodeSet,
    pub(crate) callback: NodeSet,
}

impl NodeMasks {
    /// Nodes with any masked translation axis
    pub(crate) fn position(&self) -> NodeSet {
        let mut set = self.pos_x.clone();
        set.overlap(&self.pos_y);
        set.overlap(&self.pos_z);
        set
    }

    /// Nodes whose local transform does not come from composition
    pub(crate) fn external(&self) -> NodeSet {
        let mut set = self.hands_off.clone();
        set.overlap(&self.callback);
        set
    }
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    /// Add order, used to keep blend threads in the order they were added
    serial: u64,
    live: bool,
    thread: Thread,
}

/// Generation checked storage for the threads of one instance
#[derive(Clone, Debug)]
pub(crate) struct ThreadArena {
    instance: u32,
    slots: Vec<Slot>,
    next_serial: u64,
}

impl ThreadArena {
    fn new(instance: u32) -> Self {
        Self {
            instance,
            slots: Vec::new(),
            next_serial: 0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn insert(&mut self, thread: Thread) -> ThreadId {
        let serial = self.next_serial;
        self.next_serial += 1;
        let index = if let Some(i) = self.slots.iter().position(|s| !s.live) {
            let slot = &mut self.slots[i];
            slot.serial = serial;
            slot.live = true;
            slot.thread = thread;
            i
        } else {
            self.slots.push(Slot {
                generation: 0,
                serial,
                live: true,
                thread,
            });
            self.slots.len() - 1
        };
        ThreadId {
            instance: self.instance,
            index: index as u32, // Thread counts are tiny
            generation: self.slots[index].generation,
        }
    }

    fn remove(&mut self, id: ThreadId) {
        self.check(id);
        let slot = &mut self.slots[id.index as usize];
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
    }

    fn is_valid(&self, id: ThreadId) -> bool {
        id.instance == self.instance
            && self
                .slots
                .get(id.index as usize)
                .is_some_and(|s| s.live && s.generation == id.generation)
    }

    fn check(&self, id: ThreadId) {
        assert!(self.is_valid(id), "stale or foreign thread id {id:?}");
    }

    pub(crate) fn try_get(&self, id: ThreadId) -> Option<&Thread> {
        self.is_valid(id)
            .then(|| &self.slots[id.index as usize].thread)
    }

    pub(crate) fn get(&self, id: ThreadId) -> &Thread {
        self.check(id);
        &self.slots[id.index as usize].thread
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> &mut Thread {
        self.check(id);
        &mut self.slots[id.index as usize].thread
    }

    fn serial(&self, id: ThreadId) -> u64 {
        self.slots[id.index as usize].serial
    }
}

/// One animated copy of a shape. Owns its threads, pose, node transforms
/// and detail state. The shape itself is shared.
pub struct ShapeInstance {
    pub(crate) shape: Arc<Shape>,
    pub(crate) threads: ThreadArena,
    /// Base pose threads by descending priority, then blend threads in add
    /// order. Only guaranteed sorted after `DirtyFlags::THREAD` is handled.
    pub(crate) order: Vec<ThreadId>,
    pub(crate) transition_threads: Vec<ThreadId>,
    pub(crate) pose: Pose,
    /// Pose captured when the current transitions (re)started
    pub(crate) reference: Pose,
    pub(crate) owners: Owners,
    pub(crate) transition_nodes: TransitionNodes,
    pub(crate) masks: NodeMasks,
    pub(crate) callback: Option<Box<dyn NodeCallback>>,
    pub(crate) local_transforms: Vec<glm::Mat4>,
    pub(crate) node_transforms: Vec<glm::Mat4>,
    /// One entry per sub-shape
    pub(crate) dirty: Vec<DirtyFlags>,
    pub(crate) trigger_states: u32,
    pub(crate) scale_currently_animated: bool,
    pub(crate) ground_thread: Option<ThreadId>,
    pub(crate) ground_transform: glm::Mat4,
    pub(crate) object_states: Vec<ObjectState>,
    pub(crate) decal_frames: Vec<u32>,
    /// Material index showing for each IFL material
    pub(crate) ifl_frames: Vec<u32>,
    pub(crate) current_detail: Option<usize>,
    pub(crate) intra_detail: f32,
    pub(crate) detail_slot: Option<DetailSlot>,
}

impl ShapeInstance {
    #[must_use]
    pub fn new(shape: Arc<Shape>) -> Self {
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let num_nodes = shape.nodes().len();
        let pose = Pose::from_shape(&shape);
        let local_transforms = shape
            .nodes()
            .iter()
            .map(|n| {
                transform::set_matrix(&n.default_rotation, &n.default_translation)
            })
            .collect::<Vec<_>>();
        let owners = Owners {
            rotation: vec![None; num_nodes],
            translation: vec![None; num_nodes],
            scale: vec![None; num_nodes],
        };
        let mut si = Self {
            threads: ThreadArena::new(instance),
            order: Vec::new(),
            transition_threads: Vec::new(),
            reference: pose.clone(),
            pose,
            owners,
            transition_nodes: TransitionNodes::default(),
            masks: NodeMasks::default(),
            callback: None,
            node_transforms: local_transforms.clone(),
            local_transforms,
            dirty: vec![DirtyFlags::all(); shape.sub_shapes().len()],
            trigger_states: 0,
            scale_currently_animated: false,
            ground_thread: None,
            ground_transform: glm::Mat4::identity(),
            object_states: shape.default_object_states().to_vec(),
            decal_frames: vec![0; shape.decals().len()],
            ifl_frames: shape
                .ifl_materials()
                .iter()
                .map(|ifl| ifl.first_frame)
                .collect(),
            current_detail: (!shape.details().is_empty()).then_some(0),
            intra_detail: 1.0,
            detail_slot: None,
            shape,
        };
        si.animate_node_subtrees(true);
        debug!(
            "Created instance {} of shape {}",
            instance,
            si.shape.name()
        );
        si
    }

    #[must_use]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    // ----- Threads -----

    /// Adds a thread playing sequence 0 from the start. Returns `None` when
    /// the shape has no sequences.
    pub fn add_thread(&mut self) -> Option<ThreadId> {
        if self.shape.sequences().is_empty() {
            return None;
        }
        let id = self.threads.insert(Thread::new(&self.shape));
        self.order.push(id);
        self.set_dirty(DirtyFlags::all());
        self.check_scale_currently_animated();
        trace!("Added thread {id:?}");
        Some(id)
    }

    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn destroy_thread(&mut self, id: ThreadId) {
        self.threads.check(id);
        self.clear_transition(id);
        self.threads.remove(id);
        self.order.retain(|t| *t != id);
        if self.ground_thread == Some(id) {
            self.ground_thread = None;
        }
        self.set_dirty(DirtyFlags::all());
        self.check_scale_currently_animated();
        trace!("Destroyed thread {id:?}");
    }

    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    #[must_use]
    pub fn thread(&self, id: ThreadId) -> &Thread {
        self.threads.get(id)
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.order.len()
    }

    /// Thread handles in evaluation order as of the last composition
    pub fn thread_ids(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.order.iter().copied()
    }

    #[must_use]
    pub fn is_thread_valid(&self, id: ThreadId) -> bool {
        self.threads.is_valid(id)
    }

    /// Switches the thread's sequence immediately, dropping any transition
    /// the thread was in.
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance or `seq` is
    /// out of range
    pub fn set_sequence(&mut self, id: ThreadId, seq: usize, pos: f32) {
        self.threads.check(id);
        if !self.transition_threads.is_empty() {
            self.animate_node_subtrees(false);
        }
        if self.threads.get(id).is_in_transition() {
            self.threads.get_mut(id).end_transition();
            self.transition_threads.retain(|t| *t != id);
            self.recompute_transition_nodes();
        }
        let shape = Arc::clone(&self.shape);
        self.threads.get_mut(id).set_sequence(&shape, seq, pos);
        self.set_dirty(DirtyFlags::all());
        self.ground_thread = None;
        self.check_scale_currently_animated();
        self.update_transitions();
    }

    /// Cross fades the thread from the pose it shows now to sequence `seq`
    /// starting at `pos` over `duration` seconds. When `continue_play` is
    /// false the new sequence holds at `pos` until the fade is done. A
    /// duration of zero or less switches immediately.
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance or `seq` is
    /// out of range
    pub fn transition_to_sequence(
        &mut self,
        id: ThreadId,
        seq: usize,
        pos: f32,
        duration: f32,
        continue_play: bool,
    ) {
        if duration <= 0.0 {
            self.set_sequence(id, seq, pos);
            return;
        }
        self.threads.check(id);
        // The reference pose is whatever shows right now
        self.animate_node_subtrees(false);

        let shape = Arc::clone(&self.shape);
        self.threads.get_mut(id).transition_to_sequence(
            &shape,
            seq,
            pos,
            duration,
            continue_play,
        );
        self.set_dirty(DirtyFlags::all());
        self.ground_thread = None;
        self.check_scale_currently_animated();

        let thread = self.threads.get(id);
        let sequence = &shape.sequences()[thread.sequence];
        if let Some(t) = thread.transition() {
            let nodes = &mut self.transition_nodes;
            nodes.rotation.overlap(&t.old_rotation_nodes);
            nodes.rotation.overlap(&sequence.rotation_matters);
            nodes.translation.overlap(&t.old_translation_nodes);
            nodes.translation.overlap(&sequence.translation_matters);
            nodes.scale.overlap(&t.old_scale_nodes);
            nodes.scale.overlap(&sequence.scale_matters);
        }
        if !self.transition_threads.contains(&id) {
            self.transition_threads.push(id);
        }
        debug!(
            "Thread {:?} transitioning to {} over {}s",
            id, sequence.name, duration
        );
        self.update_transitions();
    }

    /// Ends the thread's transition, leaving it on its new sequence
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn clear_transition(&mut self, id: ThreadId) {
        if !self.threads.get(id).is_in_transition() {
            return;
        }
        // Remaining transitions restart from the pose showing now
        if self.transition_threads.len() > 1 {
            self.animate_node_subtrees(false);
        }
        self.threads.get_mut(id).end_transition();
        self.transition_threads.retain(|t| *t != id);
        self.recompute_transition_nodes();
        self.set_dirty(DirtyFlags::THREAD);
        self.update_transitions();
    }

    /// Captures the current pose of all transitioning nodes as the new
    /// reference and restarts running transitions for the time they had
    /// left.
    pub(crate) fn update_transitions(&mut self) {
        if self.transition_threads.is_empty() {
            return;
        }
        let nodes = &self.transition_nodes;
        for i in nodes.rotation.iter() {
            self.reference.rotations[i] = self.pose.rotations[i];
        }
        for i in nodes.translation.iter() {
            self.reference.translations[i] = self.pose.translations[i];
        }
        for i in nodes.scale.iter() {
            self.reference.scales[i] = self.pose.scales[i];
        }
        for id in &self.transition_threads {
            if let Some(t) = self.threads.get_mut(*id).transition_mut() {
                t.duration *= 1.0 - t.pos;
                t.pos = 0.0;
            }
        }
    }

    fn recompute_transition_nodes(&mut self) {
        let nodes = &mut self.transition_nodes;
        nodes.rotation.clear_all();
        nodes.translation.clear_all();
        nodes.scale.clear_all();
        for id in &self.transition_threads {
            let thread = self.threads.get(*id);
            let Some(t) = thread.transition() else {
                continue;
            };
            let sequence = &self.shape.sequences()[thread.sequence];
            nodes.rotation.overlap(&t.old_rotation_nodes);
            nodes.rotation.overlap(&sequence.rotation_matters);
            nodes.translation.overlap(&t.old_translation_nodes);
            nodes.translation.overlap(&sequence.translation_matters);
            nodes.scale.overlap(&t.old_scale_nodes);
            nodes.scale.overlap(&sequence.scale_matters);
        }
    }

    /// Moves the thread by `delta` in normalized position. While a
    /// transition runs the delta moves the transition and the sequence moves
    /// in proportion, or not at all when it was started without
    /// `continue_play`.
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn advance_pos(&mut self, id: ThreadId, delta: f32) {
        let shape = Arc::clone(&self.shape);
        let thread = self.threads.get(id);
        if delta.abs() > MIN_DELTA {
            let mut flags = shape.sequences()[thread.sequence].dirty_flags();
            if thread.is_in_transition() {
                flags |= DirtyFlags::TRANSFORM;
            }
            self.set_dirty(flags);
        }

        let (step, factor) = self.threads.get_mut(id).advance_transition(delta);
        match step {
            TransitionStep::Finished => self.clear_transition(id),
            TransitionStep::Reversed { sequence, pos } => {
                // Back exactly where the transition started
                self.clear_transition(id);
                self.set_sequence(id, sequence, pos);
                return;
            }
            TransitionStep::Steady | TransitionStep::Running => {}
        }

        let mut delta = delta;
        let sequence = &shape.sequences()[self.threads.get(id).sequence];
        if let Some(factor) = factor {
            delta *= factor / sequence.duration;
        }
        if let Some(path) = self.threads.get_mut(id).step_position(sequence, delta)
        {
            Thread::animate_triggers(sequence, path, &mut self.trigger_states);
        }
    }

    /// Moves the thread by `delta` seconds scaled by its time scale
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn advance_time(&mut self, id: ThreadId, delta: f32) {
        let thread = self.threads.get(id);
        let duration = thread.duration(&self.shape).max(f32::EPSILON);
        let pos_delta = thread.time_scale * delta / duration;
        self.advance_pos(id, pos_delta);
    }

    /// Advances every thread by `delta` seconds
    pub fn advance_all(&mut self, delta: f32) {
        let ids = self.order.clone();
        for id in ids {
            // A reversed transition on one thread never removes another
            if self.threads.is_valid(id) {
                self.advance_time(id, delta);
            }
        }
    }

    /// Moves the thread to position `pos`, passing triggers on the way.
    /// While a transition runs this sets the transition position.
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn set_pos(&mut self, id: ThreadId, pos: f32) {
        let current = self.threads.get(id).pos();
        self.advance_pos(id, pos - current);
    }

    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn set_time(&mut self, id: ThreadId, time: f32) {
        let thread = self.threads.get(id);
        let duration = thread.duration(&self.shape).max(f32::EPSILON);
        let pos = thread.time_scale * time / duration;
        self.set_pos(id, pos);
    }

    /// Negative scales play backwards
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn set_time_scale(&mut self, id: ThreadId, scale: f32) {
        self.threads.get_mut(id).time_scale = scale;
    }

    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn set_blend_enabled(&mut self, id: ThreadId, enabled: bool) {
        self.threads.get_mut(id).blend_disabled = !enabled;
        self.set_dirty(DirtyFlags::TRANSFORM);
    }

    /// Overrides the priority copied from the sequence until the next
    /// sequence change
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    pub fn set_priority(&mut self, id: ThreadId, priority: i32) {
        self.threads.get_mut(id).priority = priority;
        self.set_dirty(DirtyFlags::THREAD | DirtyFlags::TRANSFORM);
    }

    /// Jumps exactly onto keyframe `keyframe`
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance, the thread
    /// is in a transition or the keyframe is out of range
    #[allow(clippy::cast_precision_loss)]
    pub fn set_keyframe_number(&mut self, id: ThreadId, keyframe: usize) {
        let shape = Arc::clone(&self.shape);
        let thread = self.threads.get_mut(id);
        assert!(!thread.is_in_transition(), "set keyframe during transition");
        let sequence = &shape.sequences()[thread.sequence];
        let n = sequence.num_keyframes;
        assert!(keyframe < n, "keyframe out of range");
        thread.pos = if sequence.is_cyclic() {
            keyframe as f32 / n as f32
        } else if n > 1 {
            keyframe as f32 / (n - 1) as f32
        } else {
            0.0
        };
        thread.bracket.key1 = keyframe;
        thread.bracket.key2 = keyframe;
        thread.bracket.key_pos = 0.0;
        self.set_dirty(DirtyFlags::all());
    }

    /// Orders threads for composition and clears `DirtyFlags::THREAD`
    pub(crate) fn sort_threads(&mut self) {
        let threads = &self.threads;
        let sequences = self.shape.sequences();
        self.order.sort_by_key(|id| {
            let thread = threads.get(*id);
            if sequences[thread.sequence].is_blend() {
                (true, Reverse(0), threads.serial(*id))
            } else {
                (false, Reverse(thread.priority), threads.serial(*id))
            }
        });
        for flags in &mut self.dirty {
            flags.remove(DirtyFlags::THREAD);
        }
    }

    fn check_scale_currently_animated(&mut self) {
        let sequences = self.shape.sequences();
        self.scale_currently_animated = self
            .order
            .iter()
            .any(|id| sequences[self.threads.get(*id).sequence].animates_scale());
    }

    #[must_use]
    pub const fn scale_currently_animated(&self) -> bool {
        self.scale_currently_animated
    }

    #[must_use]
    pub fn in_transition(&self) -> bool {
        !self.transition_threads.is_empty()
    }

    // ----- Dirty flags -----

    /// Marks every sub-shape
    pub fn set_dirty(&mut self, flags: DirtyFlags) {
        for d in &mut self.dirty {
            *d |= flags;
        }
    }

    #[must_use]
    pub fn dirty(&self, sub_shape: usize) -> DirtyFlags {
        self.dirty[sub_shape]
    }

    // ----- Triggers -----

    /// State of trigger `state_num`, optionally clearing it
    ///
    /// # Panics
    /// Will panic if `state_num` is not in `1..=Trigger::MAX_STATE`
    pub fn trigger_state(&mut self, state_num: u32, clear_on_read: bool) -> bool {
        let bit = trigger_bit(state_num);
        let on = self.trigger_states & bit != 0;
        if clear_on_read {
            self.trigger_states &= !bit;
        }
        on
    }

    /// # Panics
    /// Will panic if `state_num` is not in `1..=Trigger::MAX_STATE`
    pub fn set_trigger_state(&mut self, state_num: u32, on: bool) {
        let bit = trigger_bit(state_num);
        if on {
            self.trigger_states |= bit;
        } else {
            self.trigger_states &= !bit;
        }
    }

    // ----- Node control -----

    /// Changes how a node is animated. `HANDS_OFF` and `CALLBACK` each
    /// override every other flag and imply `NO_BLEND`.
    ///
    /// # Panics
    /// Will panic if `node` is out of range
    pub fn set_node_animation_state(
        &mut self,
        node: usize,
        state: NodeAnimationState,
    ) {
        assert!(node < self.shape.nodes().len(), "node out of range");
        let state = if state.contains(NodeAnimationState::HANDS_OFF) {
            NodeAnimationState::HANDS_OFF | NodeAnimationState::NO_BLEND
        } else if state.contains(NodeAnimationState::CALLBACK) {
            NodeAnimationState::CALLBACK | NodeAnimationState::NO_BLEND
        } else {
            state
        };
        if state == self.node_animation_state(node) {
            return;
        }
        self.set_dirty(DirtyFlags::all());

        let m = &mut self.masks;
        let update = |set: &mut NodeSet, flag: NodeAnimationState| {
            if state.contains(flag) {
                set.set(node);
            } else {
                set.clear(node);
            }
        };
        update(&mut m.rotation, NodeAnimationState::ROTATION);
        update(&mut m.pos_x, NodeAnimationState::POS_X);
        update(&mut m.pos_y, NodeAnimationState::POS_Y);
        update(&mut m.pos_z, NodeAnimationState::POS_Z);
        update(&mut m.no_blend, NodeAnimationState::NO_BLEND);
        update(&mut m.hands_off, NodeAnimationState::HANDS_OFF);
        update(&mut m.callback, NodeAnimationState::CALLBACK);
    }

    #[must_use]
    pub fn node_animation_state(&self, node: usize) -> NodeAnimationState {
        let m = &self.masks;
        [
            (&m.rotation, NodeAnimationState::ROTATION),
            (&m.pos_x, NodeAnimationState::POS_X),
            (&m.pos_y, NodeAnimationState::POS_Y),
            (&m.pos_z, NodeAnimationState::POS_Z),
            (&m.no_blend, NodeAnimationState::NO_BLEND),
            (&m.hands_off, NodeAnimationState::HANDS_OFF),
            (&m.callback, NodeAnimationState::CALLBACK),
        ]
        .into_iter()
        .filter(|(set, _)| set.test(node))
        .fold(NodeAnimationState::empty(), |acc, (_, flag)| acc | flag)
    }

    /// Hook called for nodes marked `NodeAnimationState::CALLBACK`
    pub fn set_node_callback(&mut self, callback: Option<Box<dyn NodeCallback>>) {
        self.callback = callback;
        self.set_dirty(DirtyFlags::TRANSFORM);
    }

    /// Sets the local transform of a hands-off node. It is used as is by
    /// the next composition.
    ///
    /// # Panics
    /// Will panic if `node` is out of range
    pub fn set_node_local_transform(&mut self, node: usize, local: glm::Mat4) {
        debug_assert!(
            self.masks.hands_off.test(node),
            "node {node} is not hands-off"
        );
        self.local_transforms[node] = local;
        if let Some(ss) = self.shape.sub_shape_of_node(node) {
            self.dirty[ss] |= DirtyFlags::TRANSFORM;
        }
    }

    // ----- Pose access -----

    /// World transform of every node as of the last composition
    #[must_use]
    pub fn node_transforms(&self) -> &[glm::Mat4] {
        &self.node_transforms
    }

    #[must_use]
    pub fn node_transform(&self, node: usize) -> &glm::Mat4 {
        &self.node_transforms[node]
    }

    /// Node transforms as a flat column major array for upload
    #[must_use]
    pub fn node_transforms_raw(&self) -> &[f32] {
        bytemuck::cast_slice(self.node_transforms.as_slice())
    }

    #[must_use]
    pub fn local_transform(&self, node: usize) -> &glm::Mat4 {
        &self.local_transforms[node]
    }

    /// Resolved local rotation of a node before matrix composition
    #[must_use]
    pub fn node_rotation(&self, node: usize) -> glm::Quat {
        self.pose.rotations[node]
    }

    #[must_use]
    pub fn node_translation(&self, node: usize) -> glm::Vec3 {
        self.pose.translations[node]
    }

    #[must_use]
    pub fn node_scale(&self, node: usize) -> ScaleValue {
        self.pose.scales[node]
    }

    #[must_use]
    pub fn object_state(&self, object: usize) -> ObjectState {
        self.object_states[object]
    }

    #[must_use]
    pub fn decal_frame(&self, decal: usize) -> u32 {
        self.decal_frames[decal]
    }

    /// Material index showing for IFL material `ifl`
    #[must_use]
    pub fn ifl_frame(&self, ifl: usize) -> u32 {
        self.ifl_frames[ifl]
    }
}

fn trigger_bit(state_num: u32) -> u32 {
    assert!(
        (1..=Trigger::MAX_STATE).contains(&state_num),
        "trigger state out of range"
    );
    1 << (state_num - 1)
}
