//! Math types.
//!
//! Only what spawn placement needs; physics belongs to the game engine.

use serde::{Deserialize, Serialize};

/// 3D position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_display_is_two_decimals() {
        assert_eq!(Vec3::new(1.0, -2.5, 0.25).to_string(), "(1.00, -2.50, 0.25)");
    }

    #[test]
    fn vec3_default_is_origin() {
        assert_eq!(Vec3::default(), Vec3::ZERO);
    }
}
