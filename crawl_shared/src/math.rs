//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! Everything the presentation layer needs is 2D.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Linear interpolation `a + (b - a) * t`.
///
/// `t` is not clamped; callers that need clamping do it themselves.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    // The affine form can land an ulp away from `b` at t == 1.
    if t == 1.0 {
        return b;
    }
    a + (b - a) * t
}

/// 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).len_sq().sqrt()
    }

    /// Per-axis [`lerp`]; `t` is not clamped.
    pub fn lerp(self, to: Self, t: f32) -> Self {
        Self::new(lerp(self.x, to.x, t), lerp(self.y, to.y, t))
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s)
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        self.scale(rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Integer room coordinates on the dungeon grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RoomCoords {
    pub x: i32,
    pub y: i32,
}

impl RoomCoords {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for RoomCoords {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

/// Unit step between two rooms: each axis is -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Direction {
    pub x: i8,
    pub y: i8,
}

impl Direction {
    pub const NONE: Self = Self { x: 0, y: 0 };

    /// Sign of each axis of `to - from`.
    pub fn between(from: RoomCoords, to: RoomCoords) -> Self {
        Self {
            x: (to.x - from.x).signum() as i8,
            y: (to.y - from.y).signum() as i8,
        }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }

    pub fn as_vec2(self) -> Vec2 {
        Vec2::new(f32::from(self.x), f32::from(self.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_endpoints_are_exact() {
        for (a, b) in [(0.0, 1.0), (-3.25, 17.5), (1e6, -1e6), (0.1, 0.7)] {
            assert_eq!(lerp(a, b, 0.0), a);
            assert_eq!(lerp(a, b, 1.0), b);
        }
    }

    #[test]
    fn lerp_is_affine_and_unclamped() {
        assert_eq!(lerp(0.0, 10.0, 0.25), 2.5);
        assert_eq!(lerp(0.0, 10.0, 1.5), 15.0);
        assert_eq!(lerp(4.0, 2.0, -1.0), 6.0);
    }

    #[test]
    fn vec2_lerp_midpoint() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(2.0, 4.0);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn direction_is_sign_of_delta() {
        let d = Direction::between(RoomCoords::new(3, 3), RoomCoords::new(7, 1));
        assert_eq!(d, Direction { x: 1, y: -1 });
        assert!(Direction::between(RoomCoords::new(2, 2), RoomCoords::new(2, 2)).is_zero());
        assert_eq!(d.as_vec2(), Vec2::new(1.0, -1.0));
    }
}
