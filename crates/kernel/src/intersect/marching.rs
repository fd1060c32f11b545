//! Surface/surface marching for pairs without a closed-form intersection.
//!
//! Seeds come from face boundaries crossing the other surface and from
//! interior near-contacts. From each seed the curve is traced in both
//! directions with a predictor step along `n1 × n2` and a three-plane Newton
//! corrector, until it leaves a trimmed domain, closes on itself, runs into a
//! tangency or exhausts the step budget.

use tracing::debug;

use crate::geometry::point::Point3d;
use crate::geometry::solve::{bisect, newton_step_3};
use crate::geometry::vector::Vec3;
use crate::topology::face_domain::{DomainPosition, FaceDomain};

use super::SolverSettings;

/// A traced intersection polyline.
#[derive(Debug, Clone)]
pub struct MarchedCurve {
    pub points: Vec<Point3d>,
    pub closed: bool,
    /// Tracing stopped at a point where the surfaces touch tangentially.
    pub tangential: bool,
    pub converged: bool,
}

impl MarchedCurve {
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
    }
}

struct Marcher<'a> {
    d1: &'a FaceDomain,
    d2: &'a FaceDomain,
    tol: f64,
    step: f64,
    settings: &'a SolverSettings,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stop {
    Boundary,
    Closed,
    Tangent,
    Exhausted,
}

/// Trace all intersection branches of two trimmed faces.
///
/// `step` is the nominal predictor length in model units.
pub fn march(d1: &FaceDomain, d2: &FaceDomain, tol: f64, step: f64, settings: &SolverSettings) -> Vec<MarchedCurve> {
    let marcher = Marcher {
        d1,
        d2,
        tol,
        step: step.max(10.0 * tol),
        settings,
    };
    let seeds = marcher.seeds();
    debug!(seeds = seeds.len(), "marching seeds");

    let mut curves: Vec<MarchedCurve> = Vec::new();
    for seed in seeds {
        let near_existing = curves
            .iter()
            .any(|c| polyline_distance(&c.points, &seed) < 0.5 * marcher.step);
        if near_existing {
            continue;
        }
        if let Some(curve) = marcher.trace(seed) {
            curves.push(curve);
        }
    }
    curves
}

impl Marcher<'_> {
    fn inside_both(&self, p: &Point3d) -> bool {
        self.d1.classify_point(p, self.tol) != DomainPosition::Outside
            && self.d2.classify_point(p, self.tol) != DomainPosition::Outside
    }

    /// Surface point and unit normal of `p` projected onto `d`.
    fn foot(&self, d: &FaceDomain, p: &Point3d) -> (Point3d, Vec3) {
        let uv = d.surface.project(p, Some(&d.bbox), self.settings.max_iterations);
        (d.surface.evaluate_uv(&uv), d.surface.normal_at(uv.x, uv.y))
    }

    /// Unit tangent `n1 × n2`, or `None` at a tangency.
    fn direction(&self, p: &Point3d) -> Option<Vec3> {
        let (_, n1) = self.foot(self.d1, p);
        let (_, n2) = self.foot(self.d2, p);
        let t = n1.cross(&n2);
        if t.length() < 1e-6 { None } else { t.normalized() }
    }

    /// Move `x` onto both surfaces while staying in the plane through
    /// `anchor` perpendicular to `along`.
    fn correct(&self, x: Point3d, anchor: Point3d, along: Vec3) -> Option<Point3d> {
        let mut x = x;
        for _ in 0..self.settings.max_iterations {
            let (p1, n1) = self.foot(self.d1, &x);
            let (p2, n2) = self.foot(self.d2, &x);
            let gap = x.distance_to(&p1).max(x.distance_to(&p2));
            if gap <= 0.05 * self.tol {
                return Some(x);
            }
            let jacobian = [
                [n1.x, n1.y, n1.z],
                [n2.x, n2.y, n2.z],
                [along.x, along.y, along.z],
            ];
            let residual = [n1.dot(&(x - p1)), n2.dot(&(x - p2)), along.dot(&(x - anchor))];
            let delta = newton_step_3(jacobian, residual)?;
            x = x + Vec3::new(delta[0], delta[1], delta[2]);
        }
        let (p1, _) = self.foot(self.d1, &x);
        let (p2, _) = self.foot(self.d2, &x);
        (x.distance_to(&p1).max(x.distance_to(&p2)) <= self.tol).then_some(x)
    }

    // ─── Seeds ───

    fn seeds(&self) -> Vec<Point3d> {
        let mut seeds = Vec::new();
        self.boundary_seeds(self.d1, self.d2, &mut seeds);
        self.boundary_seeds(self.d2, self.d1, &mut seeds);
        self.interior_seeds(&mut seeds);
        seeds
    }

    /// Points where the boundary edges of `face` cross the surface of `other`.
    fn boundary_seeds(&self, face: &FaceDomain, other: &FaceDomain, out: &mut Vec<Point3d>) {
        let iters = self.settings.max_iterations;
        let signed = |p: &Point3d| {
            let uv = other.surface.project(p, Some(&other.bbox), iters);
            (*p - other.surface.evaluate_uv(&uv)).dot(&other.surface.normal_at(uv.x, uv.y))
        };
        for u in face.edge_uses() {
            for i in 1..u.params.len() {
                let (t0, t1) = (u.params[i - 1], u.params[i]);
                let (f0, f1) = (signed(&u.points[i - 1]), signed(&u.points[i]));
                if (f0 < 0.0) == (f1 < 0.0) {
                    continue;
                }
                let t = bisect(t0, t1, |t| signed(&u.curve.evaluate(t)), 60);
                let p = u.curve.evaluate(t);
                if other.surface.distance_to(&p, Some(&other.bbox), iters) <= self.tol && self.inside_both(&p) {
                    out.push(p);
                }
            }
        }
    }

    /// Interior grid points of the first face that are close to the second
    /// surface and correct onto both.
    fn interior_seeds(&self, out: &mut Vec<Point3d>) {
        const GRID: usize = 8;
        let bx = self.d1.bbox;
        for i in 0..GRID {
            for j in 0..GRID {
                let uv = bx.at((i as f64 + 0.5) / GRID as f64, (j as f64 + 0.5) / GRID as f64);
                if !self.d1.contains_uv(&uv) {
                    continue;
                }
                let p = self.d1.surface.evaluate_uv(&uv);
                let (q, _) = self.foot(self.d2, &p);
                if p.distance_to(&q) > 2.0 * self.step {
                    continue;
                }
                let Some(along) = self.direction(&p) else {
                    continue;
                };
                if let Some(x) = self.correct(p.midpoint(&q), p.midpoint(&q), along) {
                    if self.inside_both(&x) {
                        out.push(x);
                    }
                }
            }
        }
    }

    // ─── Tracing ───

    fn trace(&self, seed: Point3d) -> Option<MarchedCurve> {
        let Some(start_dir) = self.direction(&seed) else {
            return Some(MarchedCurve {
                points: vec![seed],
                closed: false,
                tangential: true,
                converged: true,
            });
        };
        let mut steps = 0;
        let (forward, stop_f) = self.walk(seed, start_dir, &mut steps);
        let mut converged = stop_f != Stop::Exhausted;
        let mut tangential = stop_f == Stop::Tangent;
        if stop_f == Stop::Closed {
            let mut points = vec![seed];
            points.extend(forward);
            return Some(MarchedCurve {
                points,
                closed: true,
                tangential,
                converged,
            });
        }
        let (backward, stop_b) = self.walk(seed, -start_dir, &mut steps);
        converged &= stop_b != Stop::Exhausted;
        tangential |= stop_b == Stop::Tangent;

        let mut points: Vec<Point3d> = backward.into_iter().rev().collect();
        points.push(seed);
        points.extend(forward);
        if points.len() < 2 {
            return None;
        }
        Some(MarchedCurve {
            points,
            closed: false,
            tangential,
            converged,
        })
    }

    /// Step away from `start` along `dir` until a stop condition.
    fn walk(&self, start: Point3d, dir: Vec3, steps: &mut usize) -> (Vec<Point3d>, Stop) {
        let mut out = Vec::new();
        let mut x = start;
        let mut heading = dir;
        let mut travelled = 0.0;
        loop {
            if *steps >= self.settings.marching_max_steps {
                return (out, Stop::Exhausted);
            }
            *steps += 1;

            let Some(t) = self.direction(&x) else {
                return (out, Stop::Tangent);
            };
            let t = if t.dot(&heading) < 0.0 { -t } else { t };

            let mut h = self.step;
            let next = loop {
                let predicted = x + t * h;
                if let Some(y) = self.correct(predicted, predicted, t) {
                    // Reject jumps onto another branch.
                    if y.distance_to(&x) < 2.0 * h {
                        break Some(y);
                    }
                }
                h *= 0.5;
                if h < 1e-3 * self.step {
                    break None;
                }
            };
            let Some(y) = next else {
                return (out, Stop::Exhausted);
            };

            if !self.inside_both(&y) {
                if let Some(b) = self.boundary_between(x, t, h) {
                    out.push(b);
                }
                return (out, Stop::Boundary);
            }
            travelled += x.distance_to(&y);
            if travelled > 2.0 * self.step && y.distance_to(&start) < 0.75 * h {
                out.push(start);
                return (out, Stop::Closed);
            }
            out.push(y);
            heading = y - x;
            x = y;
        }
    }

    /// Last point inside both domains on the way from `x` along `t`.
    fn boundary_between(&self, x: Point3d, t: Vec3, h: f64) -> Option<Point3d> {
        let (mut lo, mut hi) = (0.0, h);
        let mut best = None;
        for _ in 0..40 {
            let mid = 0.5 * (lo + hi);
            let predicted = x + t * mid;
            match self.correct(predicted, predicted, t) {
                Some(y) if self.inside_both(&y) => {
                    best = Some(y);
                    lo = mid;
                }
                _ => hi = mid,
            }
            if hi - lo < 0.1 * self.tol {
                break;
            }
        }
        best.filter(|b| b.distance_to(&x) > self.tol)
    }
}

fn polyline_distance(points: &[Point3d], p: &Point3d) -> f64 {
    if points.len() == 1 {
        return points[0].distance_to(p);
    }
    points
        .windows(2)
        .map(|w| {
            let d = w[1] - w[0];
            let len2 = d.length_squared();
            let s = if len2 > 0.0 { ((*p - w[0]).dot(&d) / len2).clamp(0.0, 1.0) } else { 0.0 };
            (w[0] + d * s).distance_to(p)
        })
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::curves::{Circle3d, Curve};
    use crate::geometry::surfaces::{ExtrusionSurface, Plane, Surface};
    use crate::topology::shape::{ShapeRef, ShapeStore};
    use std::f64::consts::TAU;

    /// Square planar face `[-2, 2]²` at height `z`.
    fn square_face(store: &mut ShapeStore, z: f64) -> FaceDomain {
        let corners = [(-2.0, -2.0), (2.0, -2.0), (2.0, 2.0), (-2.0, 2.0)];
        let vs: Vec<_> = corners
            .iter()
            .map(|(x, y)| store.add_vertex(Point3d::new(*x, *y, z), 1e-7))
            .collect();
        let mut edges = Vec::new();
        for i in 0..4 {
            let (a, b) = (vs[i], vs[(i + 1) % 4]);
            let (pa, pb) = (store.point(a).unwrap(), store.point(b).unwrap());
            let line = crate::geometry::curves::Line3d::from_points(pa, pb);
            edges.push(ShapeRef::forward(store.add_edge(Curve::Line(line), (0.0, pa.distance_to(&pb)), a, b, 1e-7)));
        }
        let wire = store.add_wire(edges);
        let face = store.add_face(
            Surface::Plane(Plane::new(Point3d::new(0.0, 0.0, z), Vec3::Z)),
            vec![ShapeRef::forward(wire)],
            1e-7,
        );
        FaceDomain::build(store, face, 16, 30).unwrap()
    }

    /// Extruded circle (a cylinder without analytic treatment), `z ∈ [-1, 1]`.
    fn tube(store: &mut ShapeStore) -> FaceDomain {
        let circle = Circle3d::with_axes(Point3d::new(0.0, 0.0, -1.0), Vec3::Z, Vec3::X, 1.0);
        let top = Circle3d::with_axes(Point3d::new(0.0, 0.0, 1.0), Vec3::Z, Vec3::X, 1.0);
        let vb = store.add_vertex(circle.evaluate(0.0), 1e-7);
        let vt = store.add_vertex(top.evaluate(0.0), 1e-7);
        let eb = store.add_edge(Curve::Circle(circle), (0.0, TAU), vb, vb, 1e-7);
        let et = store.add_edge(Curve::Circle(top), (0.0, TAU), vt, vt, 1e-7);
        let seam = store.add_edge(
            Curve::Line(crate::geometry::curves::Line3d::from_points(circle.evaluate(0.0), top.evaluate(0.0))),
            (0.0, 2.0),
            vb,
            vt,
            1e-7,
        );
        let wire = store.add_wire(vec![
            ShapeRef::forward(eb),
            ShapeRef::forward(seam),
            ShapeRef::reversed(et),
            ShapeRef::reversed(seam),
        ]);
        let surface = Surface::Extrusion(ExtrusionSurface::new(Curve::Circle(circle), Vec3::Z));
        let face = store.add_face(surface, vec![ShapeRef::forward(wire)], 1e-7);
        FaceDomain::build(store, face, 32, 30).unwrap()
    }

    #[test]
    fn test_march_plane_through_extruded_circle() {
        let mut store = ShapeStore::new();
        let plane = square_face(&mut store, 0.25);
        let tube = tube(&mut store);
        let curves = march(&plane, &tube, 1e-6, 0.05, &SolverSettings::default());
        assert_eq!(curves.len(), 1);
        let c = &curves[0];
        assert!(c.converged);
        for p in &c.points {
            assert!((p.z - 0.25).abs() < 1e-5);
            assert!(((p.x * p.x + p.y * p.y).sqrt() - 1.0).abs() < 1e-5);
        }
        assert!((c.length() - TAU).abs() < 0.01);
    }

    #[test]
    fn test_disjoint_faces_have_no_seeds() {
        let mut store = ShapeStore::new();
        let plane = square_face(&mut store, 5.0);
        let tube = tube(&mut store);
        assert!(march(&plane, &tube, 1e-6, 0.05, &SolverSettings::default()).is_empty());
    }
}
