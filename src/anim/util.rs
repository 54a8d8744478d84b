/// Keyframes on either side of a position and how far between them it is
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bracket {
    pub key1: usize,
    pub key2: usize,
    pub key_pos: f32,
}

/// Finds the keyframes bracketing normalized position `pos`.
///
/// Cyclic sequences spread `n` keyframes evenly over [0,1) and the last one
/// interpolates back to the first. One-shot sequences spread them over [0,1]
/// with the last keyframe exactly at 1.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn select_keyframes(pos: f32, n: usize, cyclic: bool) -> Bracket {
    if n <= 1 {
        return Bracket::default();
    }
    if cyclic {
        let kf = pos.max(0.0) * n as f32;
        // Round off can land exactly on n for positions just below 1
        let key1 = (kf as usize).min(n - 1);
        let key2 = if key1 == n - 1 { 0 } else { key1 + 1 };
        Bracket {
            key1,
            key2,
            key_pos: (kf - key1 as f32).clamp(0.0, 1.0),
        }
    } else {
        if pos >= 1.0 {
            return Bracket {
                key1: n - 1,
                key2: n - 1,
                key_pos: 0.0,
            };
        }
        let kf = pos.max(0.0) * (n - 1) as f32;
        let key1 = (kf as usize).min(n - 2);
        Bracket {
            key1,
            key2: key1 + 1,
            key_pos: (kf - key1 as f32).clamp(0.0, 1.0),
        }
    }
}

/// Wraps an unbounded position into [0,1), returning the new position and
/// how many whole loops were crossed (negative when moving backwards)
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn wrap_cyclic(pos: f32) -> (f32, i32) {
    let loops = pos.floor();
    let mut wrapped = pos - loops;
    // Floating point round off
    if wrapped < 0.0 {
        wrapped += 1.0;
    }
    if wrapped >= 1.0 {
        wrapped -= 1.0;
    }
    (wrapped, loops as i32)
}

/// Largest position a cyclic thread may be set to
pub const CYCLIC_MAX_POS: f32 = 0.9999;

/// Clamps a position for a direct set. Cyclic sequences never sit exactly on
/// 1 since that is the same place as 0.
#[must_use]
pub fn clamp_set_pos(pos: f32, cyclic: bool) -> f32 {
    let pos = pos.clamp(0.0, 1.0);
    if cyclic && pos > CYCLIC_MAX_POS {
        CYCLIC_MAX_POS
    } else {
        pos
    }
}
