use serde::{Deserialize, Serialize};

use super::point::{Point2d, Point3d};
use super::vector::Vec3;

/// Axis-aligned bounding box. The empty box has `min > max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3d,
    pub max: Point3d,
}

impl BoundingBox {
    pub fn new(min: Point3d, max: Point3d) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Point3d::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3d::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Point3d]) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.add_point(p);
        }
        bb
    }

    pub fn add_point(&mut self, p: &Point3d) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn add_box(&mut self, other: &Self) {
        if other.is_valid() {
            self.add_point(&other.min);
            self.add_point(&other.max);
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.add_box(other);
        out
    }

    /// Closed-interval overlap test; touching boxes intersect.
    pub fn intersects(&self, other: &Self) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: &Point3d) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn center(&self) -> Point3d {
        self.min.midpoint(&self.max)
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn diagonal(&self) -> f64 {
        if self.is_valid() { self.size().length() } else { 0.0 }
    }

    /// Index of the longest axis (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        let s = self.size();
        if s.x >= s.y && s.x >= s.z {
            0
        } else if s.y >= s.z {
            1
        } else {
            2
        }
    }

    pub fn axis_center(&self, axis: usize) -> f64 {
        let c = self.center();
        match axis {
            0 => c.x,
            1 => c.y,
            _ => c.z,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x
            && self.min.y <= self.max.y
            && self.min.z <= self.max.z
            && self.min.is_finite()
            && self.max.is_finite()
    }

    /// Box grown by `margin` on every side; this is how shape tolerances enlarge boxes.
    pub fn enlarged(&self, margin: f64) -> Self {
        if !self.is_valid() {
            return *self;
        }
        let m = Vec3::new(margin, margin, margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// Rectangle in a surface parameter plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvBox {
    pub u_min: f64,
    pub u_max: f64,
    pub v_min: f64,
    pub v_max: f64,
}

impl UvBox {
    pub fn new(u_min: f64, u_max: f64, v_min: f64, v_max: f64) -> Self {
        Self { u_min, u_max, v_min, v_max }
    }

    pub fn empty() -> Self {
        Self::new(f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY)
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2d>) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.add_point(p);
        }
        b
    }

    pub fn add_point(&mut self, p: &Point2d) {
        self.u_min = self.u_min.min(p.x);
        self.u_max = self.u_max.max(p.x);
        self.v_min = self.v_min.min(p.y);
        self.v_max = self.v_max.max(p.y);
    }

    pub fn is_valid(&self) -> bool {
        self.u_min <= self.u_max && self.v_min <= self.v_max
    }

    pub fn width(&self) -> f64 {
        self.u_max - self.u_min
    }

    pub fn height(&self) -> f64 {
        self.v_max - self.v_min
    }

    pub fn center(&self) -> Point2d {
        Point2d::new(0.5 * (self.u_min + self.u_max), 0.5 * (self.v_min + self.v_max))
    }

    pub fn diagonal(&self) -> f64 {
        if self.is_valid() { self.width().hypot(self.height()) } else { 0.0 }
    }

    pub fn contains(&self, p: &Point2d, margin: f64) -> bool {
        p.x >= self.u_min - margin
            && p.x <= self.u_max + margin
            && p.y >= self.v_min - margin
            && p.y <= self.v_max + margin
    }

    pub fn enlarged(&self, du: f64, dv: f64) -> Self {
        Self::new(self.u_min - du, self.u_max + du, self.v_min - dv, self.v_max + dv)
    }

    /// Point at fractional position `(fu, fv)` inside the rectangle.
    pub fn at(&self, fu: f64, fv: f64) -> Point2d {
        Point2d::new(
            self.u_min + fu * self.width(),
            self.v_min + fv * self.height(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touching_boxes_intersect() {
        let a = BoundingBox::new(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let b = BoundingBox::new(Point3d::new(1.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0));
        let c = BoundingBox::new(Point3d::new(1.5, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.enlarged(0.6).intersects(&c));
    }

    #[test]
    fn test_empty_box_never_intersects() {
        let e = BoundingBox::empty();
        let a = BoundingBox::new(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        assert!(!e.intersects(&a));
        assert!(!e.is_valid());
        assert_eq!(e.union(&a), a);
    }

    #[test]
    fn test_longest_axis() {
        let b = BoundingBox::new(Point3d::ORIGIN, Point3d::new(1.0, 5.0, 2.0));
        assert_eq!(b.longest_axis(), 1);
    }

    #[test]
    fn test_uv_box() {
        let pts = [Point2d::new(0.0, 1.0), Point2d::new(2.0, -1.0)];
        let b = UvBox::from_points(pts.iter());
        assert!(b.contains(&Point2d::new(1.0, 0.0), 0.0));
        assert!(!b.contains(&Point2d::new(3.0, 0.0), 0.5));
        assert!((b.diagonal() - 8f64.sqrt()).abs() < 1e-12);
    }
}
