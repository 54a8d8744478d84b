use super::{instance::ShapeInstance, thread::Thread, types::ThreadId};
use crate::{shape::Shape, transform};
use nalgebra_glm as glm;

/// Keeps `t == 1` strictly below the last ground frame
const GROUND_EDGE: f32 = 0.999_999;

impl Thread {
    /// Ground transform at normalized position `t`. Position 0 is the
    /// identity and the stored ground frames are positions `1/N ..= N/N`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn ground(&self, shape: &Shape, t: f32) -> glm::Mat4 {
        let seq = &shape.sequences()[self.sequence];
        let n = seq.num_ground_frames();
        if n == 0 {
            return glm::Mat4::identity();
        }
        let kf = GROUND_EDGE * t.clamp(0.0, 1.0) * n as f32;
        let frame = (kf as usize).min(n - 1);
        let key_pos = kf - frame as f32;

        let (q1, p1) = if frame == 0 {
            (glm::Quat::identity(), glm::Vec3::zeros())
        } else {
            seq.ground_frame(frame - 1)
        };
        let (q2, p2) = seq.ground_frame(frame);
        transform::set_matrix(
            &transform::slerp(&q1, &q2, key_pos),
            &transform::lerp_vec3(&p1, &p2, key_pos),
        )
    }

    /// Accumulates the ground movement from `start` to `end` onto `mat`
    fn add_path(&self, shape: &Shape, start: f32, end: f32, mat: &mut glm::Mat4) {
        let start_inv = glm::inverse(&self.ground(shape, start));
        *mat = self.ground(shape, end) * start_inv * *mat;
    }

    /// Ground movement over `loops` whole loops ending at `end`
    fn add_looped_path(
        &self,
        shape: &Shape,
        start: f32,
        end: f32,
        loops: i32,
        mat: &mut glm::Mat4,
    ) {
        match loops {
            0 => self.add_path(shape, start, end, mat),
            l if l > 0 => {
                self.add_path(shape, start, 1.0, mat);
                for _ in 1..l {
                    self.add_path(shape, 0.0, 1.0, mat);
                }
                self.add_path(shape, 0.0, end, mat);
            }
            l => {
                self.add_path(shape, start, 0.0, mat);
                for _ in 1..-l {
                    self.add_path(shape, 1.0, 0.0, mat);
                }
                self.add_path(shape, 1.0, end, mat);
            }
        }
    }
}

impl ShapeInstance {
    /// Ground movement since the last call, taken from the path of the
    /// thread that drives the ground. The thread is the last one in
    /// evaluation order with ground frames and is picked again after any
    /// sequence change.
    pub fn animate_ground(&mut self) -> glm::Mat4 {
        self.ground_transform = glm::Mat4::identity();
        if self.ground_thread.is_none() {
            self.ground_thread = self
                .order
                .iter()
                .rev()
                .copied()
                .find(|id| {
                    let thread = self.threads.get(*id);
                    self.shape.sequences()[thread.sequence].num_ground_frames() > 0
                });
        }
        let Some(id) = self.ground_thread else {
            return self.ground_transform;
        };

        let thread = self.threads.get(id);
        let path = thread.path;
        let mut mat = glm::Mat4::identity();
        thread.add_looped_path(&self.shape, path.start, path.end, path.loops, &mut mat);
        self.ground_transform = mat;

        // A second call in the same frame adds nothing
        let thread = self.threads.get_mut(id);
        thread.path.start = path.end;
        thread.path.loops = 0;
        self.ground_transform
    }

    /// Result of the last `animate_ground`
    #[must_use]
    pub const fn ground_transform(&self) -> glm::Mat4 {
        self.ground_transform
    }

    /// Ground movement of a thread between two times in seconds. Identity
    /// while the thread is in a transition.
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    #[must_use]
    pub fn delta_ground(&self, id: ThreadId, start: f32, end: f32) -> glm::Mat4 {
        let thread = self.threads.get(id);
        let duration = thread.duration(&self.shape).max(f32::EPSILON);
        self.delta_ground_pos(id, start / duration, end / duration)
    }

    /// Ground movement of a thread between two normalized positions
    ///
    /// # Panics
    /// Will panic if `id` is not a live thread of this instance
    #[must_use]
    pub fn delta_ground_pos(&self, id: ThreadId, start: f32, end: f32) -> glm::Mat4 {
        let thread = self.threads.get(id);
        let mut mat = glm::Mat4::identity();
        if !thread.is_in_transition() {
            thread.add_path(&self.shape, start, end, &mut mat);
        }
        mat
    }
}
