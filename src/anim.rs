mod compose;
mod ground;
mod instance;
mod objects;
mod thread;
mod types;
mod util;

// Re-export
pub use instance::ShapeInstance;
pub use thread::{Path, PlayState, Thread, Transition};
pub use types::{DirtyFlags, NodeAnimationState, NodeCallback, ThreadId};
pub use util::{select_keyframes, Bracket};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Animates every instance at its current detail level. Instances are
/// independent so with the `rayon` feature they are animated in parallel.
pub fn animate_all(instances: &mut [ShapeInstance]) {
    #[cfg(feature = "rayon")]
    instances.par_iter_mut().for_each(ShapeInstance::animate);

    #[cfg(not(feature = "rayon"))]
    instances.iter_mut().for_each(ShapeInstance::animate);
}
