//! Math utilities
//!
//! Re-exports from glam and the bounding volume used to anchor light quantization.

pub use glam::{Mat4, Quat, UVec3, Vec3, Vec4};

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create an empty AABB
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create an AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from center and half-extents
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Get the full size of the AABB
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Size with every axis at least `min_extent`.
    ///
    /// Quantization divides by the extent, so flat or empty boxes must not
    /// produce a zero divisor.
    pub fn safe_size(&self, min_extent: f32) -> Vec3 {
        if self.is_empty() {
            return Vec3::splat(min_extent);
        }
        self.size().max(Vec3::splat(min_extent))
    }

    /// Check if the AABB is empty
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand the AABB to include a sphere
    pub fn expand_to_include_sphere(&mut self, center: Vec3, radius: f32) {
        let radius = Vec3::splat(radius.max(0.0));
        self.min = self.min.min(center - radius);
        self.max = self.max.max(center + radius);
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
