use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use super::nurbs::{BezierCurve, NurbsCurve};
use super::point::Point3d;
use super::vector::Vec3;

/// Analytic and parametric curve representations.
///
/// One variant per curve family; every algorithm in the kernel dispatches on
/// this enum once per call instead of through trait objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Curve {
    Line(Line3d),
    Circle(Circle3d),
    Ellipse(Ellipse3d),
    Parabola(Parabola3d),
    Hyperbola(Hyperbola3d),
    BSpline(NurbsCurve),
    Bezier(BezierCurve),
}

/// An infinite line, parametrized by arc length from `origin`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Line3d {
    pub origin: Point3d,
    pub direction: Vec3,
}

impl Line3d {
    pub fn new(origin: Point3d, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn from_points(a: Point3d, b: Point3d) -> Self {
        Self::new(a, b - a)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }

    pub fn closest_point(&self, p: &Point3d) -> (Point3d, f64) {
        let t = (*p - self.origin).dot(&self.direction);
        (self.evaluate(t), t)
    }

    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        let (closest, _) = self.closest_point(p);
        p.distance_to(&closest)
    }
}

/// A circle in 3D space; parameter is the angle from `x_axis` around `normal`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Circle3d {
    pub center: Point3d,
    pub normal: Vec3,
    pub radius: f64,
    pub x_axis: Vec3,
}

impl Circle3d {
    pub fn new(center: Point3d, normal: Vec3, radius: f64) -> Self {
        let normal = normal.normalize();
        Self {
            center,
            normal,
            radius,
            x_axis: normal.any_perpendicular(),
        }
    }

    pub fn with_axes(center: Point3d, normal: Vec3, x_axis: Vec3, radius: f64) -> Self {
        let normal = normal.normalize();
        // Re-orthogonalize so that callers may pass an approximate reference direction.
        let x_axis = (x_axis - normal * x_axis.dot(&normal))
            .normalized()
            .unwrap_or_else(|| normal.any_perpendicular());
        Self {
            center,
            normal,
            x_axis,
            radius,
        }
    }

    pub fn y_axis(&self) -> Vec3 {
        self.normal.cross(&self.x_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.center + self.x_axis * (self.radius * t.cos()) + self.y_axis() * (self.radius * t.sin())
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.x_axis * (-self.radius * t.sin()) + self.y_axis() * (self.radius * t.cos())
    }

    /// Angle of the projection of `p` onto the circle plane, in `[0, 2π)`.
    pub fn angle_of(&self, p: &Point3d) -> f64 {
        let v = *p - self.center;
        let a = v.dot(&self.y_axis()).atan2(v.dot(&self.x_axis));
        if a < 0.0 { a + TAU } else { a }
    }
}

/// An ellipse in 3D space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ellipse3d {
    pub center: Point3d,
    pub normal: Vec3,
    pub major_axis: Vec3,
    pub major_radius: f64,
    pub minor_radius: f64,
}

impl Ellipse3d {
    pub fn new(
        center: Point3d,
        normal: Vec3,
        major_axis: Vec3,
        major_radius: f64,
        minor_radius: f64,
    ) -> Self {
        Self {
            center,
            normal: normal.normalize(),
            major_axis: major_axis.normalize(),
            major_radius,
            minor_radius,
        }
    }

    fn minor_axis(&self) -> Vec3 {
        self.normal.cross(&self.major_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.center
            + self.major_axis * (self.major_radius * t.cos())
            + self.minor_axis() * (self.minor_radius * t.sin())
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.major_axis * (-self.major_radius * t.sin())
            + self.minor_axis() * (self.minor_radius * t.cos())
    }
}

/// `P(t) = vertex + x_axis * t² / (4 focal) + y_axis * t`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Parabola3d {
    pub vertex: Point3d,
    pub normal: Vec3,
    /// Symmetry axis, pointing into the parabola.
    pub x_axis: Vec3,
    pub focal: f64,
}

impl Parabola3d {
    pub fn new(vertex: Point3d, normal: Vec3, x_axis: Vec3, focal: f64) -> Self {
        Self {
            vertex,
            normal: normal.normalize(),
            x_axis: x_axis.normalize(),
            focal,
        }
    }

    fn y_axis(&self) -> Vec3 {
        self.normal.cross(&self.x_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.vertex + self.x_axis * (t * t / (4.0 * self.focal)) + self.y_axis() * t
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.x_axis * (t / (2.0 * self.focal)) + self.y_axis()
    }
}

/// Right branch of a hyperbola: `P(t) = center + x a cosh t + y b sinh t`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Hyperbola3d {
    pub center: Point3d,
    pub normal: Vec3,
    pub x_axis: Vec3,
    pub major_radius: f64,
    pub minor_radius: f64,
}

impl Hyperbola3d {
    pub fn new(center: Point3d, normal: Vec3, x_axis: Vec3, major_radius: f64, minor_radius: f64) -> Self {
        Self {
            center,
            normal: normal.normalize(),
            x_axis: x_axis.normalize(),
            major_radius,
            minor_radius,
        }
    }

    fn y_axis(&self) -> Vec3 {
        self.normal.cross(&self.x_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.center
            + self.x_axis * (self.major_radius * t.cosh())
            + self.y_axis() * (self.minor_radius * t.sinh())
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.x_axis * (self.major_radius * t.sinh()) + self.y_axis() * (self.minor_radius * t.cosh())
    }
}

/// Closest point on a curve within a parameter range.
#[derive(Debug, Clone, Copy)]
pub struct CurveProjection {
    pub t: f64,
    pub point: Point3d,
    pub distance: f64,
}

impl Curve {
    pub fn evaluate(&self, t: f64) -> Point3d {
        match self {
            Curve::Line(l) => l.evaluate(t),
            Curve::Circle(c) => c.evaluate(t),
            Curve::Ellipse(e) => e.evaluate(t),
            Curve::Parabola(p) => p.evaluate(t),
            Curve::Hyperbola(h) => h.evaluate(t),
            Curve::BSpline(n) => n.evaluate(t),
            Curve::Bezier(b) => b.evaluate(t),
        }
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        match self {
            Curve::Line(l) => l.direction,
            Curve::Circle(c) => c.derivative(t),
            Curve::Ellipse(e) => e.derivative(t),
            Curve::Parabola(p) => p.derivative(t),
            Curve::Hyperbola(h) => h.derivative(t),
            Curve::BSpline(n) => n.derivative(t),
            Curve::Bezier(b) => b.derivative(t),
        }
    }

    /// Unit tangent, falling back to a finite-difference chord at singular points.
    pub fn tangent(&self, t: f64) -> Vec3 {
        let d = self.derivative(t);
        match d.normalized() {
            Some(n) => n,
            None => (self.evaluate(t + 1e-6) - self.evaluate(t - 1e-6)).normalize(),
        }
    }

    pub fn period(&self) -> Option<f64> {
        match self {
            Curve::Circle(_) | Curve::Ellipse(_) => Some(TAU),
            _ => None,
        }
    }

    /// Parameter range outside which the curve is undefined.
    pub fn natural_domain(&self) -> Option<(f64, f64)> {
        match self {
            Curve::BSpline(n) => Some(n.domain()),
            Curve::Bezier(_) => Some((0.0, 1.0)),
            _ => None,
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, Curve::Line(_))
    }

    /// Structural and numeric sanity of the curve definition.
    pub fn is_valid(&self) -> bool {
        match self {
            Curve::Line(l) => l.origin.is_finite() && (l.direction.length() - 1.0).abs() < 1e-6,
            Curve::Circle(c) => c.center.is_finite() && c.radius > 0.0 && c.radius.is_finite(),
            Curve::Ellipse(e) => e.major_radius > 0.0 && e.minor_radius > 0.0 && e.center.is_finite(),
            Curve::Parabola(p) => p.focal.abs() > 1e-12 && p.vertex.is_finite(),
            Curve::Hyperbola(h) => h.major_radius > 0.0 && h.minor_radius > 0.0 && h.center.is_finite(),
            Curve::BSpline(n) => n.is_valid(),
            Curve::Bezier(b) => b.control_points.len() >= 2,
        }
    }

    /// Number of samples that resolves the shape of the curve over `range`.
    pub fn sample_count(&self, range: (f64, f64), base: usize) -> usize {
        let span = (range.1 - range.0).abs();
        let n = match self {
            Curve::Line(_) => 2,
            Curve::Circle(_) | Curve::Ellipse(_) => ((span / TAU) * base as f64 * 2.0).ceil() as usize,
            Curve::Parabola(_) | Curve::Hyperbola(_) => base,
            Curve::BSpline(n) if n.degree == 1 => n.control_points.len() * 2,
            Curve::BSpline(n) => base.max(n.control_points.len() * 4),
            Curve::Bezier(b) => base.max(4 * b.degree()),
        };
        n.clamp(2, 4096)
    }

    /// `n + 1` evenly spaced `(t, point)` samples over `range`.
    pub fn sample(&self, range: (f64, f64), n: usize) -> Vec<(f64, Point3d)> {
        let n = n.max(1);
        (0..=n)
            .map(|i| {
                let t = range.0 + (range.1 - range.0) * (i as f64 / n as f64);
                (t, self.evaluate(t))
            })
            .collect()
    }

    pub fn approximate_length(&self, range: (f64, f64), num_samples: usize) -> f64 {
        self.sample(range, num_samples)
            .windows(2)
            .map(|w| w[0].1.distance_to(&w[1].1))
            .sum()
    }

    pub fn is_closed(&self, range: (f64, f64), tol: f64) -> bool {
        self.evaluate(range.0).distance_to(&self.evaluate(range.1)) <= tol
    }

    /// Closest point to `p` with parameter inside `range`.
    pub fn project(&self, p: &Point3d, range: (f64, f64), max_iterations: usize) -> CurveProjection {
        let (t0, t1) = if range.0 <= range.1 { range } else { (range.1, range.0) };
        let candidate = match self {
            Curve::Line(l) => {
                let (_, t) = l.closest_point(p);
                t.clamp(t0, t1)
            }
            Curve::Circle(c) => {
                let a = c.angle_of(p);
                let mut best: Option<f64> = None;
                let k_min = ((t0 - a) / TAU).floor() as i64;
                let k_max = ((t1 - a) / TAU).ceil() as i64;
                for k in k_min..=k_max {
                    let t = a + k as f64 * TAU;
                    if t >= t0 - 1e-12 && t <= t1 + 1e-12 {
                        best = Some(t.clamp(t0, t1));
                        break;
                    }
                }
                match best {
                    Some(t) => t,
                    None => self.closest_end(p, t0, t1),
                }
            }
            _ => self.project_numeric(p, t0, t1, max_iterations),
        };
        let mut t = candidate;
        let mut point = self.evaluate(t);
        let mut distance = point.distance_to(p);
        for end in [t0, t1] {
            let q = self.evaluate(end);
            let d = q.distance_to(p);
            if d < distance - 1e-15 {
                t = end;
                point = q;
                distance = d;
            }
        }
        CurveProjection { t, point, distance }
    }

    fn closest_end(&self, p: &Point3d, t0: f64, t1: f64) -> f64 {
        if self.evaluate(t0).distance_to(p) <= self.evaluate(t1).distance_to(p) { t0 } else { t1 }
    }

    /// Sampling seed plus Newton on `(C(t) - p) . C'(t) = 0`.
    fn project_numeric(&self, p: &Point3d, t0: f64, t1: f64, max_iterations: usize) -> f64 {
        let n = self.sample_count((t0, t1), 24);
        let samples = self.sample((t0, t1), n);
        let mut best_t = t0;
        let mut best_d = f64::INFINITY;
        for (t, q) in &samples {
            let d = q.distance_squared_to(p);
            if d < best_d {
                best_d = d;
                best_t = *t;
            }
        }
        let step = (t1 - t0) / n.max(1) as f64;
        let (lo, hi) = ((best_t - step).max(t0), (best_t + step).min(t1));
        let mut t = best_t;
        for _ in 0..max_iterations {
            let c = self.evaluate(t);
            let d1 = self.derivative(t);
            let h = 1e-6 * (t1 - t0).abs().max(1e-9);
            let d2 = (self.derivative((t + h).min(t1)) - self.derivative((t - h).max(t0))) / (2.0 * h);
            let r = c - *p;
            let f = r.dot(&d1);
            let df = d1.dot(&d1) + r.dot(&d2);
            if df.abs() < 1e-300 {
                break;
            }
            let next = (t - f / df).clamp(lo, hi);
            if (next - t).abs() < 1e-14 * (1.0 + t.abs()) {
                t = next;
                break;
            }
            t = next;
        }
        if self.evaluate(t).distance_squared_to(p) <= best_d { t } else { best_t }
    }

    pub fn curve_type_name(&self) -> &'static str {
        match self {
            Curve::Line(_) => "Line",
            Curve::Circle(_) => "Circle",
            Curve::Ellipse(_) => "Ellipse",
            Curve::Parabola(_) => "Parabola",
            Curve::Hyperbola(_) => "Hyperbola",
            Curve::BSpline(_) => "BSpline",
            Curve::Bezier(_) => "Bezier",
        }
    }
}

/// A half-line used by the classifier and the curve/surface intersectors.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point3d,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Point3d, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn at(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_line_projection_clamps_to_range() {
        let c = Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X));
        let pr = c.project(&Point3d::new(5.0, 1.0, 0.0), (0.0, 2.0), 20);
        assert!((pr.t - 2.0).abs() < 1e-12);
        assert!((pr.distance - (9.0f64 + 1.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_circle_projection_respects_range() {
        let c = Curve::Circle(Circle3d::new(Point3d::ORIGIN, Vec3::Z, 2.0));
        let p = c.evaluate(1.0) + Vec3::Z * 0.5;
        let pr = c.project(&p, (0.0, TAU), 20);
        assert!((pr.t - 1.0).abs() < 1e-9);
        assert!((pr.distance - 0.5).abs() < 1e-9);

        // Same point, range shifted by a full turn.
        let pr = c.project(&p, (TAU, 2.0 * TAU), 20);
        assert!((pr.t - (1.0 + TAU)).abs() < 1e-9);

        // Outside a partial arc: the nearer end wins.
        let pr = c.project(&c.evaluate(3.0), (0.0, PI / 2.0), 20);
        assert!((pr.t - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_numeric_projection_on_ellipse() {
        let e = Curve::Ellipse(Ellipse3d::new(Point3d::ORIGIN, Vec3::Z, Vec3::X, 4.0, 2.0));
        let target = e.evaluate(0.7);
        let pr = e.project(&(target + Vec3::Z * 0.1), (0.0, TAU), 30);
        assert!((pr.t - 0.7).abs() < 1e-6, "t = {}", pr.t);
    }

    #[test]
    fn test_parabola_and_hyperbola_tangents() {
        let p = Curve::Parabola(Parabola3d::new(Point3d::ORIGIN, Vec3::Z, Vec3::X, 0.5));
        assert!(p.evaluate(2.0).distance_to(&Point3d::new(2.0, 2.0, 0.0)) < 1e-12);
        assert!(p.tangent(0.0).dot(&Vec3::Y) > 0.999);

        let h = Curve::Hyperbola(Hyperbola3d::new(Point3d::ORIGIN, Vec3::Z, Vec3::X, 1.0, 1.0));
        let q = h.evaluate(0.5);
        assert!((q.x * q.x - q.y * q.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_validity_and_periodicity() {
        assert!(!Curve::Circle(Circle3d::new(Point3d::ORIGIN, Vec3::Z, 0.0)).is_valid());
        let c = Curve::Circle(Circle3d::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        assert_eq!(c.period(), Some(TAU));
        assert!(c.is_closed((0.0, TAU), 1e-9));
        assert!(Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X)).period().is_none());
    }
}
