use super::util::{self, Bracket};
use crate::{
    node_set::NodeSet,
    shape::{Sequence, Shape},
};

/// Cross fade from the pose a thread had towards its new sequence
#[derive(Clone, Debug)]
pub struct Transition {
    /// Seconds
    pub(crate) duration: f32,
    /// 0 at the reference pose, 1 at the new sequence's pose
    pub(crate) pos: f32,
    /// Sign of the time scale when the transition started
    pub(crate) direction: f32,
    /// 1 if the new sequence keeps playing during the transition, else 0
    pub(crate) target_scale: f32,
    pub(crate) old_rotation_nodes: NodeSet,
    pub(crate) old_translation_nodes: NodeSet,
    pub(crate) old_scale_nodes: NodeSet,
    pub(crate) old_sequence: usize,
    pub(crate) old_pos: f32,
}

impl Transition {
    #[must_use]
    pub const fn duration(&self) -> f32 {
        self.duration
    }

    #[must_use]
    pub const fn pos(&self) -> f32 {
        self.pos
    }
}

#[derive(Clone, Debug, Default)]
pub enum PlayState {
    #[default]
    Steady,
    Transitioning(Box<Transition>),
}

/// Stretch of the sequence covered by the last position change, used for
/// ground transforms and triggers
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Path {
    pub start: f32,
    pub end: f32,
    /// Whole loops crossed, negative when playing backwards
    pub loops: i32,
}

/// What happened to a transition when the thread moved
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum TransitionStep {
    Steady,
    Running,
    Finished,
    /// Played backwards past the start, go back to the old sequence
    Reversed { sequence: usize, pos: f32 },
}

/// A cursor playing one sequence on one shape instance
#[derive(Clone, Debug)]
pub struct Thread {
    pub(crate) sequence: usize,
    pub(crate) priority: i32,
    pub(crate) pos: f32,
    pub(crate) time_scale: f32,
    pub(crate) bracket: Bracket,
    pub(crate) blend_disabled: bool,
    pub(crate) state: PlayState,
    pub(crate) path: Path,
}

impl Thread {
    pub(crate) fn new(shape: &Shape) -> Self {
        let mut thread = Self {
            sequence: 0,
            priority: 0,
            pos: 0.0,
            time_scale: 1.0,
            bracket: Bracket::default(),
            blend_disabled: false,
            state: PlayState::Steady,
            path: Path::default(),
        };
        thread.set_sequence(shape, 0, 0.0);
        thread
    }

    /// Switches immediately, dropping any transition
    ///
    /// # Panics
    /// Will panic if `seq` is not a sequence of `shape`
    pub(crate) fn set_sequence(&mut self, shape: &Shape, seq: usize, pos: f32) {
        assert!(seq < shape.sequences().len(), "sequence out of range");
        let sequence = &shape.sequences()[seq];
        self.state = PlayState::Steady;
        self.sequence = seq;
        self.priority = sequence.priority;
        self.pos = util::clamp_set_pos(pos, sequence.is_cyclic());
        self.path = Path {
            start: self.pos,
            end: self.pos,
            loops: 0,
        };
        self.select_keyframes(sequence);
    }

    /// Records the nodes the current sequence controls as the "old" sets and
    /// then switches sequence. A transition already running is chained by
    /// keeping its old sets too.
    pub(crate) fn transition_to_sequence(
        &mut self,
        shape: &Shape,
        seq: usize,
        pos: f32,
        duration: f32,
        continue_play: bool,
    ) {
        debug_assert!(duration >= 0.0, "negative transition duration");
        let current = &shape.sequences()[self.sequence];
        let mut old_rotation_nodes = current.rotation_matters.clone();
        let mut old_translation_nodes = current.translation_matters.clone();
        let mut old_scale_nodes = current.scale_matters.clone();
        if let PlayState::Transitioning(t) = &self.state {
            old_rotation_nodes.overlap(&t.old_rotation_nodes);
            old_translation_nodes.overlap(&t.old_translation_nodes);
            old_scale_nodes.overlap(&t.old_scale_nodes);
        }
        let transition = Transition {
            duration,
            pos: 0.0,
            direction: if self.time_scale < 0.0 { -1.0 } else { 1.0 },
            target_scale: if continue_play { 1.0 } else { 0.0 },
            old_rotation_nodes,
            old_translation_nodes,
            old_scale_nodes,
            old_sequence: self.sequence,
            old_pos: self.pos,
        };
        self.set_sequence(shape, seq, pos);
        self.state = PlayState::Transitioning(Box::new(transition));
    }

    /// Moves the transition on. Returns the outcome and the factor to apply
    /// to the sequence position delta while the transition runs.
    pub(crate) fn advance_transition(
        &mut self,
        delta: f32,
    ) -> (TransitionStep, Option<f32>) {
        let PlayState::Transitioning(t) = &mut self.state else {
            return (TransitionStep::Steady, None);
        };
        t.pos += t.direction * delta;
        let factor = t.target_scale * t.duration;
        let step = if t.pos < 0.0 {
            TransitionStep::Reversed {
                sequence: t.old_sequence,
                pos: t.old_pos,
            }
        } else if t.pos >= 1.0 {
            TransitionStep::Finished
        } else {
            TransitionStep::Running
        };
        (step, Some(factor))
    }

    /// Moves the sequence position. Cyclic sequences wrap and one-shot
    /// sequences stop at the ends. Returns the path when the sequence records
    /// one.
    pub(crate) fn step_position(
        &mut self,
        sequence: &Sequence,
        delta: f32,
    ) -> Option<Path> {
        let start = self.pos;
        let moved = self.pos + delta;
        let (pos, loops) = if sequence.is_cyclic() {
            util::wrap_cyclic(moved)
        } else {
            (moved.clamp(0.0, 1.0), 0)
        };
        self.pos = pos;
        self.select_keyframes(sequence);
        if sequence.makes_path() {
            self.path = Path {
                start,
                end: pos,
                loops,
            };
            Some(self.path)
        } else {
            None
        }
    }

    pub(crate) fn select_keyframes(&mut self, sequence: &Sequence) {
        self.bracket = util::select_keyframes(
            self.pos,
            sequence.num_keyframes,
            sequence.is_cyclic(),
        );
    }

    /// Drops the transition without touching the sequence
    pub(crate) fn end_transition(&mut self) -> Option<Box<Transition>> {
        match std::mem::take(&mut self.state) {
            PlayState::Steady => None,
            PlayState::Transitioning(t) => Some(t),
        }
    }

    pub(crate) fn transition_mut(&mut self) -> Option<&mut Transition> {
        match &mut self.state {
            PlayState::Steady => None,
            PlayState::Transitioning(t) => Some(t),
        }
    }

    #[must_use]
    pub fn transition(&self) -> Option<&Transition> {
        match &self.state {
            PlayState::Steady => None,
            PlayState::Transitioning(t) => Some(t),
        }
    }

    #[must_use]
    pub const fn is_in_transition(&self) -> bool {
        matches!(self.state, PlayState::Transitioning(_))
    }

    #[must_use]
    pub const fn sequence(&self) -> usize {
        self.sequence
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Position in the sequence, or in the transition while one runs
    #[must_use]
    pub fn pos(&self) -> f32 {
        self.transition().map_or(self.pos, |t| t.pos)
    }

    /// Position in the sequence even while a transition runs
    #[must_use]
    pub const fn sequence_pos(&self) -> f32 {
        self.pos
    }

    /// Seconds into the sequence, or into the transition while one runs
    #[must_use]
    pub fn time(&self, shape: &Shape) -> f32 {
        self.pos() * self.duration(shape)
    }

    /// Seconds for the sequence, or for the transition while one runs
    #[must_use]
    pub fn duration(&self, shape: &Shape) -> f32 {
        self.transition()
            .map_or(shape.sequences()[self.sequence].duration, |t| t.duration)
    }

    /// Seconds taken at the current time scale
    #[must_use]
    pub fn scaled_duration(&self, shape: &Shape) -> f32 {
        let scale = self.time_scale.abs();
        if scale > 0.0 {
            self.duration(shape) / scale
        } else {
            f32::INFINITY
        }
    }

    #[must_use]
    pub const fn time_scale(&self) -> f32 {
        self.time_scale
    }

    #[must_use]
    pub const fn blend_disabled(&self) -> bool {
        self.blend_disabled
    }

    /// Bracketing keyframes at the current position
    #[must_use]
    pub const fn bracket(&self) -> Bracket {
        self.bracket
    }

    /// Nearest keyframe at or before the current position
    #[must_use]
    pub const fn keyframe_number(&self) -> usize {
        self.bracket.key1
    }

    #[must_use]
    pub fn keyframe_count(&self, shape: &Shape) -> usize {
        shape.sequences()[self.sequence].num_keyframes
    }

    #[must_use]
    pub const fn path(&self) -> Path {
        self.path
    }

    /// Sets the trigger state bits passed over by `path`
    pub(crate) fn animate_triggers(
        sequence: &Sequence,
        path: Path,
        states: &mut u32,
    ) {
        if sequence.triggers.is_empty() {
            return;
        }
        match path.loops {
            -1 => {
                activate_triggers(sequence, path.start, 0.0, states);
                activate_triggers(sequence, 1.0, path.end, states);
            }
            0 => activate_triggers(sequence, path.start, path.end, states),
            1 => {
                activate_triggers(sequence, path.start, 1.0, states);
                activate_triggers(sequence, 0.0, path.end, states);
            }
            l if l > 0 => {
                // Several loops in one step. Only the final state matters.
                activate_triggers(sequence, path.end, 1.0, states);
                activate_triggers(sequence, 0.0, path.end, states);
            }
            _ => {
                activate_triggers(sequence, path.end, 0.0, states);
                activate_triggers(sequence, 1.0, path.end, states);
            }
        }
    }
}

/// Applies the triggers between positions `a` and `b`. Moving backwards
/// applies them in reverse order and inverts the ones marked for it.
fn activate_triggers(sequence: &Sequence, a: f32, b: f32, states: &mut u32) {
    let triggers = &sequence.triggers;
    // There are never many triggers, so a linear scan is fine
    let mut last_pos = -1.0;
    let mut a_index = triggers.len();
    let mut b_index = triggers.len();
    for (i, t) in triggers.iter().enumerate() {
        if a > last_pos && a <= t.pos {
            a_index = i;
        }
        if b > last_pos && b <= t.pos {
            b_index = i;
        }
        last_pos = t.pos;
    }

    let mut set_bit = |bit: u32, on: bool| {
        if on {
            *states |= bit;
        } else {
            *states &= !bit;
        }
    };
    if a_index <= b_index {
        for t in &triggers[a_index..b_index] {
            set_bit(t.state_bit(), t.is_on());
        }
    } else {
        for t in triggers[b_index..a_index].iter().rev() {
            set_bit(t.state_bit(), t.is_on() != t.inverts_on_reverse());
        }
    }
}
