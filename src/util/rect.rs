//! Axis-aligned rectangles for viewports, object ranges and the world border

use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;

/// Axis-aligned rectangle stored as its min/max corners.
///
/// `top` is the smaller y (screen coordinates grow downwards).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Rectangle of the given size centred on `center`
    pub fn centered(center: Vec2, width: f32, height: f32) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self {
            left: center.x - hw,
            top: center.y - hh,
            right: center.x + hw,
            bottom: center.y + hh,
        }
    }

    /// Square bounding box of a circle
    pub fn around(center: Vec2, radius: f32) -> Self {
        Self::centered(center, radius * 2.0, radius * 2.0)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Overlap test; touching edges count as intersecting
    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }

    /// Component-wise clamp of a point into this rectangle
    pub fn clamp_point(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            point.x.max(self.left).min(self.right),
            point.y.max(self.top).min(self.bottom),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered() {
        let r = Rect::centered(Vec2::new(100.0, 50.0), 20.0, 10.0);
        assert_eq!(r, Rect::new(90.0, 45.0, 110.0, 55.0));
        assert_eq!(r.width(), 20.0);
        assert_eq!(r.height(), 10.0);
        assert_eq!(r.center(), Vec2::new(100.0, 50.0));
    }

    #[test]
    fn test_intersects() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 15.0, 15.0)));
        assert!(a.intersects(&Rect::new(10.0, 0.0, 20.0, 10.0)), "touching edge");
        assert!(!a.intersects(&Rect::new(10.5, 0.0, 20.0, 10.0)));
        assert!(!a.intersects(&Rect::new(0.0, -20.0, 10.0, -0.1)));
    }

    #[test]
    fn test_clamp_point() {
        let border = Rect::new(0.0, 0.0, 6000.0, 6000.0);
        assert_eq!(border.clamp_point(Vec2::new(-5.0, 7000.0)), Vec2::new(0.0, 6000.0));
        assert_eq!(border.clamp_point(Vec2::new(10.0, 20.0)), Vec2::new(10.0, 20.0));
        assert!(border.contains(border.clamp_point(Vec2::new(1e9, -1e9))));
    }

    #[test]
    fn test_around() {
        let r = Rect::around(Vec2::new(0.0, 0.0), 5.0);
        assert_eq!(r, Rect::new(-5.0, -5.0, 5.0, 5.0));
    }
}
