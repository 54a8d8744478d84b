use nalgebra_glm as glm;
use serde::{Deserialize, Serialize};

/// Opaque vertex buffer identity owned by the GPU layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexBufferHandle(pub u32);

/// Opaque index/primitive buffer identity owned by the GPU layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveBufferHandle(pub u32);

/// Opaque texture identity, used for lightmaps and cubemaps
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(pub u32);

/// Light supplied by the scene graph
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightId(pub u32);

/// Range of indices drawn by one call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PrimitiveRange {
    pub first_index: u32,
    pub index_count: u32,
}

/// Trait for camera matrices, the same as the ones used for rendering
pub trait CameraTrait {
    fn view_matrix(&self) -> glm::Mat4;
    fn proj_matrix(&self) -> glm::Mat4;
}

/// What the detail selector needs to know about the camera to turn a
/// distance into a size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Pixels covered by one world unit at a distance of one world unit
    pub world_to_screen_scale: f32,
    pub viewport_width: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self::perspective(std::f32::consts::FRAC_PI_2, 640.0)
    }
}

impl Projection {
    /// Perspective projection with horizontal field of view `fov_x`
    #[must_use]
    pub fn perspective(fov_x: f32, viewport_width: f32) -> Self {
        Self {
            world_to_screen_scale: viewport_width / (2.0 * (fov_x * 0.5).tan()),
            viewport_width,
        }
    }

    /// Reads the horizontal focal length out of a camera projection matrix
    #[must_use]
    pub fn from_camera<C: CameraTrait>(camera: &C, viewport_width: f32) -> Self {
        let proj = camera.proj_matrix();
        Self {
            world_to_screen_scale: 0.5 * viewport_width * proj[(0, 0)].abs(),
            viewport_width,
        }
    }

    /// Size in pixels of `radius` at distance `dist`
    #[must_use]
    pub fn project_radius(&self, dist: f32, radius: f32) -> f32 {
        // Avoid dividing by zero for objects at the camera
        (radius / dist.max(f32::EPSILON)) * self.world_to_screen_scale
    }

    /// Detail sizes were authored against a 640 pixel wide viewport
    #[must_use]
    pub fn pixel_scale(&self) -> f32 {
        self.viewport_width * 1.6 / 640.0
    }
}
