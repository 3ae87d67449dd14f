use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Per-axis tolerance used when comparing positions reported by clients
pub const POSITION_TOLERANCE: f32 = 0.1;

/// 2D position or offset in map units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };
    pub const UP: Vector2 = Vector2 { x: 0.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// True if both axes differ by at most `tolerance`
    pub fn approx_eq(&self, other: &Vector2, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    /// Approximate equality with the default client position tolerance
    pub fn approximately(&self, other: &Vector2) -> bool {
        self.approx_eq(other, POSITION_TOLERANCE)
    }

    /// Rotates counter-clockwise by `degrees`
    pub fn rotate(&self, degrees: f32) -> Vector2 {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Vector2 {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vector2 {
    type Output = Vector2;

    fn mul(self, rhs: f32) -> Vector2 {
        Vector2::new(self.x * rhs, self.y * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_approximately_within_tolerance() {
        let a = Vector2::new(10.0, 5.0);
        assert!(a.approximately(&Vector2::new(10.05, 4.95)));
        assert!(!a.approximately(&Vector2::new(10.11, 5.0)));
        assert!(!a.approximately(&Vector2::new(10.0, 4.89)));
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let rotated = Vector2::UP.rotate(90.0);
        assert_approx_eq!(rotated.x, -1.0, 1e-5);
        assert_approx_eq!(rotated.y, 0.0, 1e-5);
    }

    #[test]
    fn test_arithmetic() {
        let a = Vector2::new(1.0, 2.0);
        let b = Vector2::new(0.5, -0.25);
        assert_eq!(a + b, Vector2::new(1.5, 1.75));
        assert_eq!(a - b, Vector2::new(0.5, 2.25));
        assert_eq!(a * 2.0, Vector2::new(2.0, 4.0));
    }
}
