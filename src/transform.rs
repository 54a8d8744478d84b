use nalgebra_glm as glm;
use serde::{Deserialize, Serialize};

/// How a sequence (or a whole shape) represents node scale. Ordered so that
/// a shape's kind is the largest kind used by any of its sequences.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum ScaleKind {
    #[default]
    None,
    Uniform,
    Aligned,
    Arbitrary,
}

/// Scale along axes given by a rotation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArbitraryScale {
    pub rotate: glm::Quat,
    pub scale: glm::Vec3,
}

impl Default for ArbitraryScale {
    fn default() -> Self {
        Self {
            rotate: glm::Quat::identity(),
            scale: glm::vec3(1.0, 1.0, 1.0),
        }
    }
}

/// A node scale in one of the three representations
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScaleValue {
    Uniform(f32),
    Aligned(glm::Vec3),
    Arbitrary(ArbitraryScale),
}

impl Default for ScaleValue {
    fn default() -> Self {
        Self::Uniform(1.0)
    }
}

impl ScaleValue {
    /// Identity scale in the representation used by `kind`
    #[must_use]
    pub fn identity(kind: ScaleKind) -> Self {
        match kind {
            ScaleKind::None | ScaleKind::Uniform => Self::Uniform(1.0),
            ScaleKind::Aligned => Self::Aligned(glm::vec3(1.0, 1.0, 1.0)),
            ScaleKind::Arbitrary => Self::Arbitrary(ArbitraryScale::default()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ScaleKind {
        match self {
            Self::Uniform(_) => ScaleKind::Uniform,
            Self::Aligned(_) => ScaleKind::Aligned,
            Self::Arbitrary(_) => ScaleKind::Arbitrary,
        }
    }

    /// Converts to another representation. Promotion is exact. Demotion from
    /// aligned to uniform averages the axes and demotion from arbitrary drops
    /// the scale rotation.
    #[must_use]
    pub fn convert(self, to: ScaleKind) -> Self {
        match (self, to) {
            (Self::Uniform(s), ScaleKind::Aligned) => {
                Self::Aligned(glm::vec3(s, s, s))
            }
            (Self::Uniform(s), ScaleKind::Arbitrary) => {
                Self::Arbitrary(ArbitraryScale {
                    rotate: glm::Quat::identity(),
                    scale: glm::vec3(s, s, s),
                })
            }
            (Self::Aligned(v), ScaleKind::None | ScaleKind::Uniform) => {
                Self::Uniform((v.x + v.y + v.z) / 3.0)
            }
            (Self::Aligned(v), ScaleKind::Arbitrary) => {
                Self::Arbitrary(ArbitraryScale {
                    rotate: glm::Quat::identity(),
                    scale: v,
                })
            }
            (Self::Arbitrary(a), ScaleKind::None | ScaleKind::Uniform) => {
                let v = a.scale;
                Self::Uniform((v.x + v.y + v.z) / 3.0)
            }
            (Self::Arbitrary(a), ScaleKind::Aligned) => Self::Aligned(a.scale),
            (v, _) => v, // Already the right kind
        }
    }

    /// Interpolates from `self` towards `other`. Values of different kinds
    /// are first promoted to the larger kind.
    #[must_use]
    pub fn interpolate(&self, other: &Self, t: f32) -> Self {
        let kind = self.kind().max(other.kind());
        match (self.convert(kind), other.convert(kind)) {
            (Self::Uniform(a), Self::Uniform(b)) => Self::Uniform(a + (b - a) * t),
            (Self::Aligned(a), Self::Aligned(b)) => {
                Self::Aligned(glm::lerp(&a, &b, t))
            }
            (Self::Arbitrary(a), Self::Arbitrary(b)) => {
                Self::Arbitrary(ArbitraryScale {
                    rotate: slerp(&a.rotate, &b.rotate, t),
                    scale: glm::lerp(&a.scale, &b.scale, t),
                })
            }
            (a, _) => a, // Not reachable after conversion
        }
    }

    /// Right multiplies the scale onto a node matrix
    pub fn apply(&self, m: &mut glm::Mat4) {
        match self {
            Self::Uniform(s) => *m = glm::scale(m, &glm::vec3(*s, *s, *s)),
            Self::Aligned(v) => *m = glm::scale(m, v),
            Self::Arbitrary(a) => {
                let rot = glm::quat_to_mat4(&a.rotate);
                let inv = glm::quat_to_mat4(&glm::quat_conjugate(&a.rotate));
                *m = *m * glm::scale(&rot, &a.scale) * inv;
            }
        }
    }
}

/// Shortest arc spherical interpolation. Falls back to normalized linear
/// interpolation when the inputs are nearly parallel. glm's own slerp
/// refuses some antipodal inputs.
#[must_use]
pub fn slerp(q1: &glm::Quat, q2: &glm::Quat, t: f32) -> glm::Quat {
    const PARALLEL: f32 = 0.9995;
    let mut cos = glm::quat_dot(q1, q2);
    let mut end = *q2;
    if cos < 0.0 {
        cos = -cos;
        end = -end;
    }
    let (s1, s2) = if cos > PARALLEL {
        (1.0 - t, t)
    } else {
        let theta = cos.acos();
        let sin = theta.sin();
        (((1.0 - t) * theta).sin() / sin, (t * theta).sin() / sin)
    };
    glm::quat_normalize(&(*q1 * s1 + end * s2))
}

#[must_use]
pub fn lerp_vec3(v1: &glm::Vec3, v2: &glm::Vec3, t: f32) -> glm::Vec3 {
    glm::lerp(v1, v2, t)
}

/// Rotation followed by translation as a single matrix
#[must_use]
pub fn set_matrix(rot: &glm::Quat, trans: &glm::Vec3) -> glm::Mat4 {
    glm::translation(trans) * glm::quat_to_mat4(rot)
}

/// Conversion to a shader friendly column major array
#[must_use]
pub fn to_array(m: &glm::Mat4) -> [[f32; 4]; 4] {
    (*m).into()
}

/// Angle in radians between two rotations
#[must_use]
pub fn angle_between(q1: &glm::Quat, q2: &glm::Quat) -> f32 {
    let d = glm::quat_dot(q1, q2).abs().min(1.0);
    2.0 * d.acos()
}
