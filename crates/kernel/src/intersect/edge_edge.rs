//! Edge/edge intersection: crossings and overlaps of two bounded curves.

use crate::geometry::curves::{Circle3d, Curve, Line3d};
use crate::geometry::intersection::line_line_closest;
use crate::geometry::point::Point3d;
use crate::geometry::solve::{newton_step_2, solve_quadratic};

use super::{runs_where, Hits, IntersectError, SolverSettings};

#[derive(Debug, Clone, PartialEq)]
pub enum EeHit {
    Point { t1: f64, t2: f64, point: Point3d, distance: f64 },
    /// Overlap; `r2.0` corresponds to `r1.0`.
    Common { r1: (f64, f64), r2: (f64, f64) },
}

/// A bounded curve: geometry plus parameter range.
#[derive(Debug, Clone, Copy)]
pub struct CurveSpan<'a> {
    pub curve: &'a Curve,
    pub range: (f64, f64),
}

impl<'a> CurveSpan<'a> {
    pub fn new(curve: &'a Curve, range: (f64, f64)) -> Self {
        Self { curve, range }
    }

    fn contains(&self, t: f64, slack: f64) -> bool {
        t >= self.range.0 - slack && t <= self.range.1 + slack
    }

    fn clamp(&self, t: f64) -> f64 {
        t.clamp(self.range.0, self.range.1)
    }
}

/// Intersect two bounded curves within distance `tol`.
pub fn intersect_edges(a: CurveSpan<'_>, b: CurveSpan<'_>, tol: f64, settings: &SolverSettings) -> Result<Hits<EeHit>, IntersectError> {
    if !a.curve.is_valid() || !b.curve.is_valid() {
        return Err(IntersectError::Unsupported("degenerate curve".into()));
    }
    match (a.curve, b.curve) {
        (Curve::Line(l1), Curve::Line(l2)) => Ok(line_line(l1, a, l2, b, tol)),
        (Curve::Line(l), Curve::Circle(c)) => Ok(line_circle(l, a, c, b, tol, false)),
        (Curve::Circle(c), Curve::Line(l)) => Ok(line_circle(l, b, c, a, tol, true)),
        _ => Ok(generic(a, b, tol, settings)),
    }
}

// ─── Line–Line ──────────────────────────────────────────────────────────────

fn line_line(l1: &Line3d, a: CurveSpan<'_>, l2: &Line3d, b: CurveSpan<'_>, tol: f64) -> Hits<EeHit> {
    let parallel = l1.direction.cross(&l2.direction).length() < 1e-12;
    if parallel || line_line_closest(l1, l2).is_none() {
        if l1.distance_to_point(&l2.origin) > tol {
            return Hits::none();
        }
        // Collinear: map the second range onto the first line.
        let (_, s0) = l1.closest_point(&l2.evaluate(b.range.0));
        let (_, s1) = l1.closest_point(&l2.evaluate(b.range.1));
        let lo = a.range.0.max(s0.min(s1));
        let hi = a.range.1.min(s0.max(s1));
        if hi - lo > tol {
            let map = |t: f64| l2.closest_point(&l1.evaluate(t)).1;
            return Hits::exact(vec![EeHit::Common {
                r1: (lo, hi),
                r2: (map(lo), map(hi)),
            }]);
        }
        if hi - lo >= -tol {
            let t1 = a.clamp(0.5 * (lo + hi));
            let p1 = l1.evaluate(t1);
            let (p2, t2) = l2.closest_point(&p1);
            let t2 = b.clamp(t2);
            let distance = p1.distance_to(&l2.evaluate(t2));
            if distance <= tol {
                return Hits::exact(vec![EeHit::Point {
                    t1,
                    t2,
                    point: p1.midpoint(&p2),
                    distance,
                }]);
            }
        }
        return Hits::none();
    }

    let Some((_, t1, _, t2, _)) = line_line_closest(l1, l2) else {
        return Hits::none();
    };
    if !a.contains(t1, tol) || !b.contains(t2, tol) {
        return Hits::none();
    }
    let (t1, t2) = (a.clamp(t1), b.clamp(t2));
    let (p1, p2) = (l1.evaluate(t1), l2.evaluate(t2));
    let distance = p1.distance_to(&p2);
    if distance > tol {
        return Hits::none();
    }
    Hits::exact(vec![EeHit::Point {
        t1,
        t2,
        point: p1.midpoint(&p2),
        distance,
    }])
}

// ─── Line–Circle ────────────────────────────────────────────────────────────

/// Angle parameter of `p` on `circle` shifted into `span` when possible.
fn circle_param(circle: &Circle3d, span: CurveSpan<'_>, p: &Point3d) -> f64 {
    let a = circle.angle_of(p);
    let tau = std::f64::consts::TAU;
    let k = ((span.range.0 - a) / tau).ceil();
    let t = a + k * tau;
    if span.contains(t, 1e-12) { t } else { a }
}

fn line_circle(
    line: &Line3d,
    ls: CurveSpan<'_>,
    circle: &Circle3d,
    cs: CurveSpan<'_>,
    tol: f64,
    swapped: bool,
) -> Hits<EeHit> {
    let denom = line.direction.dot(&circle.normal);
    let mut candidates: Vec<f64> = Vec::new();
    if denom.abs() > 1e-9 {
        // Line pierces the circle plane once.
        candidates.push((circle.center - line.origin).dot(&circle.normal) / denom);
    } else {
        let off_plane = (line.origin - circle.center).dot(&circle.normal).abs();
        if off_plane > tol {
            return Hits::none();
        }
        let w = line.origin - circle.center;
        candidates.extend(solve_quadratic(1.0, 2.0 * w.dot(&line.direction), w.dot(&w) - circle.radius * circle.radius));
        if candidates.is_empty() {
            // Near-tangent line: closest approach.
            candidates.push(-w.dot(&line.direction));
        }
    }

    let mut items = Vec::new();
    for tl in candidates {
        if !ls.contains(tl, tol) {
            continue;
        }
        let tl = ls.clamp(tl);
        let pl = line.evaluate(tl);
        let tc = cs.clamp(circle_param(circle, cs, &pl));
        let pc = circle.evaluate(tc);
        let distance = pl.distance_to(&pc);
        if distance > tol {
            continue;
        }
        let (t1, t2) = if swapped { (tc, tl) } else { (tl, tc) };
        let hit = EeHit::Point {
            t1,
            t2,
            point: pl.midpoint(&pc),
            distance,
        };
        if !items.contains(&hit) {
            items.push(hit);
        }
    }
    dedup_points(&mut items, tol);
    Hits::exact(items)
}

// ─── Generic ────────────────────────────────────────────────────────────────

fn generic(a: CurveSpan<'_>, b: CurveSpan<'_>, tol: f64, settings: &SolverSettings) -> Hits<EeHit> {
    let mut items = Vec::new();
    let mut converged = true;

    // Overlaps first: runs of the first curve lying within tolerance of the second.
    let n1 = a.curve.sample_count(a.range, settings.samples).max(8);
    let on_b = |t: f64| {
        let p = a.curve.evaluate(t);
        b.curve.project(&p, b.range, settings.max_iterations).distance <= tol
    };
    let mut overlaps = runs_where(a.range.0, a.range.1, n1, on_b, tol);
    // A transversal crossing also leaves a short run; real overlaps are tangent.
    overlaps.retain(|(lo, hi)| {
        let mid = 0.5 * (lo + hi);
        let tb = b.curve.project(&a.curve.evaluate(mid), b.range, settings.max_iterations).t;
        let sin = a.curve.tangent(mid).cross(&b.curve.tangent(tb)).length();
        a.curve.evaluate(*lo).distance_to(&a.curve.evaluate(*hi)) > 2.0 * tol && sin < 1e-3
    });
    for (lo, hi) in &overlaps {
        let map = |t: f64| b.curve.project(&a.curve.evaluate(t), b.range, settings.max_iterations).t;
        items.push(EeHit::Common {
            r1: (*lo, *hi),
            r2: (map(*lo), map(*hi)),
        });
    }
    let in_overlap = |t: f64| overlaps.iter().any(|(lo, hi)| t >= lo - tol && t <= hi + tol);

    // Crossings: closest segment pairs seed a Gauss–Newton solve.
    let s1 = a.curve.sample(a.range, n1);
    let n2 = b.curve.sample_count(b.range, settings.samples).max(8);
    let s2 = b.curve.sample(b.range, n2);
    let sag = |s: &[(f64, Point3d)]| s.windows(2).map(|w| w[0].1.distance_to(&w[1].1)).fold(0.0, f64::max);
    let window = tol + 0.5 * (sag(&s1) + sag(&s2));

    for w1 in s1.windows(2) {
        for w2 in s2.windows(2) {
            let (f1, f2, d) = segment_closest(&w1[0].1, &w1[1].1, &w2[0].1, &w2[1].1);
            if d > window {
                continue;
            }
            let seed = (w1[0].0 + f1 * (w1[1].0 - w1[0].0), w2[0].0 + f2 * (w2[1].0 - w2[0].0));
            if in_overlap(seed.0) {
                continue;
            }
            let (t1, t2, ok) = refine_pair(a, b, seed, settings.max_iterations);
            let (p1, p2) = (a.curve.evaluate(t1), b.curve.evaluate(t2));
            let distance = p1.distance_to(&p2);
            if distance <= tol && !in_overlap(t1) {
                items.push(EeHit::Point {
                    t1,
                    t2,
                    point: p1.midpoint(&p2),
                    distance,
                });
            } else if !ok && d <= 2.0 * tol {
                // Coarse fallback from the sampled seed.
                converged = false;
                let (q1, q2) = (a.curve.evaluate(seed.0), b.curve.evaluate(seed.1));
                items.push(EeHit::Point {
                    t1: seed.0,
                    t2: seed.1,
                    point: q1.midpoint(&q2),
                    distance: q1.distance_to(&q2),
                });
            }
        }
    }
    dedup_points(&mut items, tol);
    Hits { items, converged }
}

/// Gauss–Newton on `|C1(t1) - C2(t2)|²`, clamped to both ranges.
fn refine_pair(a: CurveSpan<'_>, b: CurveSpan<'_>, seed: (f64, f64), max_iterations: usize) -> (f64, f64, bool) {
    let (mut t1, mut t2) = seed;
    for _ in 0..max_iterations {
        let r = a.curve.evaluate(t1) - b.curve.evaluate(t2);
        let d1 = a.curve.derivative(t1);
        let d2 = b.curve.derivative(t2) * -1.0;
        let jtj = [[d1.dot(&d1), d1.dot(&d2)], [d1.dot(&d2), d2.dot(&d2)]];
        let g = [d1.dot(&r), d2.dot(&r)];
        let Some((dt1, dt2)) = newton_step_2(jtj, g) else {
            return (t1, t2, false);
        };
        let (n1, n2) = (a.clamp(t1 + dt1), b.clamp(t2 + dt2));
        let moved = (n1 - t1).abs() + (n2 - t2).abs();
        t1 = n1;
        t2 = n2;
        if moved < 1e-14 * (1.0 + t1.abs() + t2.abs()) {
            return (t1, t2, true);
        }
    }
    (t1, t2, false)
}

/// Closest points of two segments as fractions along each, plus the distance.
fn segment_closest(p0: &Point3d, p1: &Point3d, q0: &Point3d, q1: &Point3d) -> (f64, f64, f64) {
    let d1 = *p1 - *p0;
    let d2 = *q1 - *q0;
    let r = *p0 - *q0;
    let a = d1.dot(&d1);
    let e = d2.dot(&d2);
    let f = d2.dot(&r);
    let (s, t);
    if a <= 1e-300 && e <= 1e-300 {
        return (0.0, 0.0, p0.distance_to(q0));
    }
    if a <= 1e-300 {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(&r);
        if e <= 1e-300 {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s0 = if denom > 1e-300 { ((b * f - c * e) / denom).clamp(0.0, 1.0) } else { 0.0 };
            let mut t0 = (b * s0 + f) / e;
            if t0 < 0.0 {
                t0 = 0.0;
                s0 = (-c / a).clamp(0.0, 1.0);
            } else if t0 > 1.0 {
                t0 = 1.0;
                s0 = ((b - c) / a).clamp(0.0, 1.0);
            }
            s = s0;
            t = t0;
        }
    }
    let c1 = *p0 + d1 * s;
    let c2 = *q0 + d2 * t;
    (s, t, c1.distance_to(&c2))
}

fn dedup_points(items: &mut Vec<EeHit>, tol: f64) {
    let mut kept: Vec<EeHit> = Vec::with_capacity(items.len());
    for hit in items.drain(..) {
        let duplicate = match &hit {
            EeHit::Point { point, .. } => kept.iter().any(|k| match k {
                EeHit::Point { point: q, .. } => q.distance_to(point) <= tol,
                EeHit::Common { .. } => false,
            }),
            EeHit::Common { .. } => false,
        };
        if !duplicate {
            kept.push(hit);
        }
    }
    kept.sort_by(|a, b| first_param(a).total_cmp(&first_param(b)));
    *items = kept;
}

fn first_param(hit: &EeHit) -> f64 {
    match hit {
        EeHit::Point { t1, .. } => *t1,
        EeHit::Common { r1, .. } => r1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::nurbs::NurbsCurve;
    use crate::geometry::vector::Vec3;
    use std::f64::consts::TAU;

    fn settings() -> SolverSettings {
        SolverSettings::default()
    }

    #[test]
    fn test_crossing_lines() {
        let l1 = Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X));
        let l2 = Curve::Line(Line3d::new(Point3d::new(0.5, -1.0, 0.0), Vec3::Y));
        let hits = intersect_edges(CurveSpan::new(&l1, (0.0, 1.0)), CurveSpan::new(&l2, (0.0, 2.0)), 1e-7, &settings()).unwrap();
        assert_eq!(hits.items.len(), 1);
        match hits.items[0] {
            EeHit::Point { t1, t2, .. } => {
                assert!((t1 - 0.5).abs() < 1e-12);
                assert!((t2 - 1.0).abs() < 1e-12);
            }
            _ => panic!("expected a crossing"),
        }
    }

    #[test]
    fn test_collinear_overlap() {
        let l1 = Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X));
        let l2 = Curve::Line(Line3d::new(Point3d::new(2.0, 0.0, 0.0), -Vec3::X));
        let hits = intersect_edges(CurveSpan::new(&l1, (0.0, 1.5)), CurveSpan::new(&l2, (0.0, 1.0)), 1e-7, &settings()).unwrap();
        match hits.items.as_slice() {
            [EeHit::Common { r1, r2 }] => {
                assert!((r1.0 - 1.0).abs() < 1e-12 && (r1.1 - 1.5).abs() < 1e-12);
                assert!((r2.0 - 1.0).abs() < 1e-12 && (r2.1 - 0.5).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_touching_collinear_lines_give_a_point() {
        let l1 = Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X));
        let l2 = Curve::Line(Line3d::new(Point3d::new(1.0, 0.0, 0.0), Vec3::X));
        let hits = intersect_edges(CurveSpan::new(&l1, (0.0, 1.0)), CurveSpan::new(&l2, (0.0, 1.0)), 1e-7, &settings()).unwrap();
        assert!(matches!(hits.items.as_slice(), [EeHit::Point { .. }]));
    }

    #[test]
    fn test_line_through_circle() {
        let circle = Curve::Circle(Circle3d::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        let line = Curve::Line(Line3d::new(Point3d::new(-2.0, 0.0, 0.0), Vec3::X));
        let hits = intersect_edges(CurveSpan::new(&line, (0.0, 4.0)), CurveSpan::new(&circle, (0.0, TAU)), 1e-7, &settings()).unwrap();
        assert_eq!(hits.items.len(), 2);
        for hit in &hits.items {
            if let EeHit::Point { point, .. } = hit {
                assert!((point.x.abs() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_generic_polyline_crossing() {
        let a = Curve::BSpline(NurbsCurve::polyline(&[
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
            Point3d::new(2.0, 0.0, 0.0),
        ]));
        let b = Curve::BSpline(NurbsCurve::polyline(&[Point3d::new(0.0, 0.5, 0.0), Point3d::new(2.0, 0.5, 0.0)]));
        let (ra, rb) = (a.natural_domain().unwrap(), b.natural_domain().unwrap());
        let hits = intersect_edges(CurveSpan::new(&a, ra), CurveSpan::new(&b, rb), 1e-7, &settings()).unwrap();
        assert_eq!(hits.items.len(), 2);
        assert!(hits.converged);
    }
}
