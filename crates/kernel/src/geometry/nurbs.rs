use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::vector::Vec3;

/// A NURBS (Non-Uniform Rational B-Spline) curve in 3D.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurbsCurve {
    pub degree: usize,
    pub control_points: Vec<Point3d>,
    /// Weights for rational curves. If empty, treated as all 1.0 (non-rational).
    pub weights: Vec<f64>,
    /// Knot vector, `len = control_points.len() + degree + 1`.
    pub knots: Vec<f64>,
}

impl NurbsCurve {
    pub fn new(degree: usize, control_points: Vec<Point3d>, weights: Vec<f64>, knots: Vec<f64>) -> Self {
        Self {
            degree,
            control_points,
            weights,
            knots,
        }
    }

    /// Non-rational B-spline curve.
    pub fn bspline(degree: usize, control_points: Vec<Point3d>, knots: Vec<f64>) -> Self {
        Self::new(degree, control_points, vec![], knots)
    }

    /// Degree-1 curve through `points`, parametrized by cumulative chord length.
    /// Walking lines from the surface marcher are stored this way.
    pub fn polyline(points: &[Point3d]) -> Self {
        let mut knots = Vec::with_capacity(points.len() + 2);
        knots.push(0.0);
        let mut acc = 0.0;
        knots.push(acc);
        for w in points.windows(2) {
            acc += w[0].distance_to(&w[1]);
            knots.push(acc);
        }
        knots.push(acc);
        Self::bspline(1, points.to_vec(), knots)
    }

    /// Structural validity: knot count, weight count, non-decreasing knots.
    pub fn is_valid(&self) -> bool {
        let n = self.control_points.len();
        n > self.degree
            && self.knots.len() == n + self.degree + 1
            && (self.weights.is_empty() || self.weights.len() == n)
            && self.knots.windows(2).all(|w| w[0] <= w[1])
            && self.domain().1 > self.domain().0
    }

    fn weight(&self, i: usize) -> f64 {
        self.weights.get(i).copied().unwrap_or(1.0)
    }

    pub fn domain(&self) -> (f64, f64) {
        if self.knots.len() < 2 * self.degree + 2 {
            return (0.0, 0.0);
        }
        (self.knots[self.degree], self.knots[self.knots.len() - self.degree - 1])
    }

    pub fn is_closed(&self, tol: f64) -> bool {
        let (t0, t1) = self.domain();
        self.evaluate(t0).distance_to(&self.evaluate(t1)) <= tol
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        if !self.is_valid() {
            return self.control_points.first().copied().unwrap_or(Point3d::ORIGIN);
        }
        let (t0, t1) = self.domain();
        let t = t.clamp(t0, t1);
        let span = find_span(&self.knots, self.control_points.len(), self.degree, t);
        let basis = basis_functions(&self.knots, span, t, self.degree);
        let p = self.degree;

        let mut acc = Vec3::ZERO;
        let mut w_sum = 0.0;
        for (i, b) in basis.iter().enumerate() {
            let idx = span - p + i;
            let w = self.weight(idx) * b;
            acc = acc + self.control_points[idx].to_vec3() * w;
            w_sum += w;
        }
        if w_sum.abs() < 1e-300 {
            return self.control_points[span - p];
        }
        Point3d::ORIGIN + acc / w_sum
    }

    /// First derivative by central differences, one-sided at the domain ends.
    pub fn derivative(&self, t: f64) -> Vec3 {
        let (tmin, tmax) = self.domain();
        let dt = 1e-7 * (tmax - tmin).abs().max(1e-9);
        let t0 = (t - dt).max(tmin);
        let t1 = (t + dt).min(tmax);
        if (t1 - t0).abs() < 1e-300 {
            return Vec3::ZERO;
        }
        (self.evaluate(t1) - self.evaluate(t0)) / (t1 - t0)
    }
}

/// A rational Bezier curve on `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BezierCurve {
    pub control_points: Vec<Point3d>,
    pub weights: Vec<f64>,
}

impl BezierCurve {
    pub fn new(control_points: Vec<Point3d>) -> Self {
        Self { control_points, weights: vec![] }
    }

    pub fn rational(control_points: Vec<Point3d>, weights: Vec<f64>) -> Self {
        Self { control_points, weights }
    }

    pub fn degree(&self) -> usize {
        self.control_points.len().saturating_sub(1)
    }

    /// De Casteljau in homogeneous coordinates.
    pub fn evaluate(&self, t: f64) -> Point3d {
        if self.control_points.is_empty() {
            return Point3d::ORIGIN;
        }
        let mut pts: Vec<(Vec3, f64)> = self
            .control_points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let w = self.weights.get(i).copied().unwrap_or(1.0);
                (p.to_vec3() * w, w)
            })
            .collect();
        let n = pts.len();
        for r in 1..n {
            for i in 0..n - r {
                let (a, wa) = pts[i];
                let (b, wb) = pts[i + 1];
                pts[i] = (a * (1.0 - t) + b * t, wa * (1.0 - t) + wb * t);
            }
        }
        let (p, w) = pts[0];
        if w.abs() < 1e-300 {
            return self.control_points[0];
        }
        Point3d::ORIGIN + p / w
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        let dt = 1e-7;
        let t0 = (t - dt).max(0.0);
        let t1 = (t + dt).min(1.0);
        (self.evaluate(t1) - self.evaluate(t0)) / (t1 - t0)
    }
}

/// A tensor-product NURBS surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurbsSurface {
    pub degree_u: usize,
    pub degree_v: usize,
    /// Control points grid: `[u_index * num_v + v_index]`.
    pub control_points: Vec<Point3d>,
    pub weights: Vec<f64>,
    pub knots_u: Vec<f64>,
    pub knots_v: Vec<f64>,
    pub num_u: usize,
    pub num_v: usize,
}

impl NurbsSurface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        control_points: Vec<Point3d>,
        weights: Vec<f64>,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        num_u: usize,
        num_v: usize,
    ) -> Self {
        Self {
            degree_u,
            degree_v,
            control_points,
            weights,
            knots_u,
            knots_v,
            num_u,
            num_v,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.num_u > self.degree_u
            && self.num_v > self.degree_v
            && self.control_points.len() == self.num_u * self.num_v
            && self.knots_u.len() == self.num_u + self.degree_u + 1
            && self.knots_v.len() == self.num_v + self.degree_v + 1
            && (self.weights.is_empty() || self.weights.len() == self.control_points.len())
    }

    pub fn domain_u(&self) -> (f64, f64) {
        (
            self.knots_u[self.degree_u],
            self.knots_u[self.knots_u.len() - self.degree_u - 1],
        )
    }

    pub fn domain_v(&self) -> (f64, f64) {
        (
            self.knots_v[self.degree_v],
            self.knots_v[self.knots_v.len() - self.degree_v - 1],
        )
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        if !self.is_valid() {
            return Point3d::ORIGIN;
        }
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        let u = u.clamp(u0, u1);
        let v = v.clamp(v0, v1);
        let span_u = find_span(&self.knots_u, self.num_u, self.degree_u, u);
        let span_v = find_span(&self.knots_v, self.num_v, self.degree_v, v);
        let basis_u = basis_functions(&self.knots_u, span_u, u, self.degree_u);
        let basis_v = basis_functions(&self.knots_v, span_v, v, self.degree_v);

        let mut acc = Vec3::ZERO;
        let mut w_sum = 0.0;
        for (i, bu) in basis_u.iter().enumerate() {
            let u_idx = span_u - self.degree_u + i;
            for (j, bv) in basis_v.iter().enumerate() {
                let idx = u_idx * self.num_v + span_v - self.degree_v + j;
                let w = self.weights.get(idx).copied().unwrap_or(1.0) * bu * bv;
                acc = acc + self.control_points[idx].to_vec3() * w;
                w_sum += w;
            }
        }
        if w_sum.abs() < 1e-300 {
            return self.control_points[0];
        }
        Point3d::ORIGIN + acc / w_sum
    }
}

/// Knot span containing `t` (binary search), for `n` control points.
fn find_span(knots: &[f64], n: usize, p: usize, t: f64) -> usize {
    let last = n - 1;
    if t >= knots[last + 1] {
        return last;
    }
    if t <= knots[p] {
        return p;
    }
    let mut low = p;
    let mut high = last + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Non-vanishing B-spline basis functions at `t` (Cox–de Boor triangle).
fn basis_functions(knots: &[f64], span: usize, t: f64, p: usize) -> Vec<f64> {
    let mut n_vals = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    n_vals[0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom.abs() < 1e-300 { 0.0 } else { n_vals[r] / denom };
            n_vals[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n_vals[j] = saved;
    }
    n_vals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bspline_midpoint() {
        let c = NurbsCurve::bspline(
            2,
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(5.0, 10.0, 0.0),
                Point3d::new(10.0, 0.0, 0.0),
            ],
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        );
        assert!(c.is_valid());
        let mid = c.evaluate(0.5);
        assert!((mid.x - 5.0).abs() < 1e-10);
        assert!((mid.y - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_rational_quarter_circle() {
        let w = std::f64::consts::FRAC_1_SQRT_2;
        let c = NurbsCurve::new(
            2,
            vec![
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(1.0, 1.0, 0.0),
                Point3d::new(0.0, 1.0, 0.0),
            ],
            vec![1.0, w, 1.0],
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        );
        for i in 0..=20 {
            let p = c.evaluate(i as f64 / 20.0);
            assert!(((p.x * p.x + p.y * p.y).sqrt() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_polyline_chord_parametrization() {
        let c = NurbsCurve::polyline(&[
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(3.0, 0.0, 0.0),
            Point3d::new(3.0, 4.0, 0.0),
        ]);
        assert!(c.is_valid());
        assert_eq!(c.domain(), (0.0, 7.0));
        assert!(c.evaluate(5.0).distance_to(&Point3d::new(3.0, 2.0, 0.0)) < 1e-12);
        assert!(!c.is_closed(1e-9));
    }

    #[test]
    fn test_bezier_matches_bspline() {
        let pts = vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 2.0, 0.0),
            Point3d::new(3.0, 2.0, 1.0),
            Point3d::new(4.0, 0.0, 0.0),
        ];
        let bez = BezierCurve::new(pts.clone());
        let bsp = NurbsCurve::bspline(3, pts, vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert!(bez.evaluate(t).distance_to(&bsp.evaluate(t)) < 1e-10);
        }
        assert_eq!(bez.degree(), 3);
    }

    #[test]
    fn test_bilinear_surface() {
        let s = NurbsSurface::new(
            1,
            1,
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(0.0, 1.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(1.0, 1.0, 1.0),
            ],
            vec![],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
            2,
            2,
        );
        assert!(s.is_valid());
        let p = s.evaluate(0.5, 0.5);
        assert!(p.distance_to(&Point3d::new(0.5, 0.5, 0.25)) < 1e-12);
    }
}
