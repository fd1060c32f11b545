//! Edge/face intersection: piercings and in-face overlaps of a bounded curve
//! with a trimmed face.

use crate::geometry::curves::{Curve, Ray};
use crate::geometry::intersection::ray_surface;
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::solve::{bisect, newton_step_3};
use crate::geometry::surfaces::Surface;
use crate::topology::face_domain::{DomainPosition, FaceDomain};

use super::edge_edge::CurveSpan;
use super::{runs_where, Hits, IntersectError, SolverSettings};

#[derive(Debug, Clone, PartialEq)]
pub enum EfHit {
    /// The curve meets the face at an isolated parameter.
    Point {
        t: f64,
        uv: Point2d,
        point: Point3d,
        distance: f64,
        position: DomainPosition,
    },
    /// The curve lies on the face over `range`.
    Common { range: (f64, f64) },
}

/// Intersect a bounded curve with a trimmed face within distance `tol`.
///
/// Points outside the trimmed domain are dropped; points on its boundary are
/// reported with [`DomainPosition::OnBoundary`] so callers can defer them to
/// the edge/edge stage.
pub fn intersect_edge_face(
    edge: CurveSpan<'_>,
    domain: &FaceDomain,
    tol: f64,
    settings: &SolverSettings,
) -> Result<Hits<EfHit>, IntersectError> {
    if !edge.curve.is_valid() || !domain.surface.is_valid() {
        return Err(IntersectError::Unsupported("degenerate edge or face geometry".into()));
    }
    let surface = &domain.surface;
    let n = edge.curve.sample_count(edge.range, settings.samples).max(settings.samples);
    let hint = Some(&domain.bbox);
    let mut items = Vec::new();

    // ─── Overlaps ───
    let on_surface = |t: f64| surface.distance_to(&edge.curve.evaluate(t), hint, settings.max_iterations) <= tol;
    let mut runs = runs_where(edge.range.0, edge.range.1, n, on_surface, tol);
    runs.retain(|(lo, hi)| {
        let mid = 0.5 * (lo + hi);
        let p = edge.curve.evaluate(mid);
        let uv = surface.project(&p, hint, settings.max_iterations);
        let across = edge.curve.tangent(mid).dot(&surface.normal_at(uv.x, uv.y)).abs();
        edge.curve.evaluate(*lo).distance_to(&edge.curve.evaluate(*hi)) > 2.0 * tol && across < 1e-3
    });
    let mut commons = Vec::new();
    for (lo, hi) in runs {
        let in_face = |t: f64| domain.classify_point(&edge.curve.evaluate(t), tol) != DomainPosition::Outside;
        for clipped in runs_where(lo, hi, n, in_face, tol) {
            commons.push(clipped);
            items.push(EfHit::Common { range: clipped });
        }
    }
    let in_common = |t: f64| commons.iter().any(|(lo, hi)| t >= lo - tol && t <= hi + tol);

    // ─── Piercings ───
    let (candidates, converged) = match (edge.curve, surface) {
        (Curve::Line(line), Surface::Plane(_) | Surface::Cylinder(_) | Surface::Cone(_) | Surface::Sphere(_) | Surface::Torus(_)) => {
            let ray = Ray::new(line.evaluate(edge.range.0), line.direction);
            let t_max = edge.range.1 - edge.range.0;
            let ts = ray_surface(&ray, surface, t_max, hint, settings.samples, settings.max_iterations)
                .into_iter()
                .map(|h| edge.range.0 + h.t)
                .collect();
            (ts, true)
        }
        _ => numeric_roots(edge, domain, tol, n, settings),
    };

    for t in candidates {
        if in_common(t) {
            continue;
        }
        let t = t.clamp(edge.range.0, edge.range.1);
        let p = edge.curve.evaluate(t);
        let uv = domain.project(&p);
        let distance = surface.evaluate_uv(&uv).distance_to(&p);
        if distance > tol {
            continue;
        }
        let position = domain.classify_point(&p, tol);
        if position == DomainPosition::Outside {
            continue;
        }
        let duplicate = items.iter().any(|h| matches!(h, EfHit::Point { point, .. } if point.distance_to(&p) <= tol));
        if !duplicate {
            items.push(EfHit::Point {
                t,
                uv,
                point: p,
                distance,
                position,
            });
        }
    }
    items.sort_by(|a, b| start_param(a).total_cmp(&start_param(b)));
    Ok(Hits { items, converged })
}

fn start_param(hit: &EfHit) -> f64 {
    match hit {
        EfHit::Point { t, .. } => *t,
        EfHit::Common { range } => range.0,
    }
}

/// Sign changes of the signed normal distance, bisected and polished, plus
/// tangential minima of its magnitude.
fn numeric_roots(
    edge: CurveSpan<'_>,
    domain: &FaceDomain,
    tol: f64,
    n: usize,
    settings: &SolverSettings,
) -> (Vec<f64>, bool) {
    let surface = &domain.surface;
    let hint = Some(&domain.bbox);
    let signed = |t: f64| {
        let p = edge.curve.evaluate(t);
        let uv = surface.project(&p, hint, settings.max_iterations);
        (p - surface.evaluate_uv(&uv)).dot(&surface.normal_at(uv.x, uv.y))
    };
    let samples: Vec<(f64, f64)> = (0..=n)
        .map(|i| {
            let t = edge.range.0 + (edge.range.1 - edge.range.0) * i as f64 / n as f64;
            (t, signed(t))
        })
        .collect();

    let mut roots = Vec::new();
    let mut converged = true;
    for w in samples.windows(2) {
        let ((t0, f0), (t1, f1)) = (w[0], w[1]);
        if f0 == 0.0 {
            roots.push(t0);
            continue;
        }
        if (f0 < 0.0) != (f1 < 0.0) && f1 != 0.0 {
            let t = bisect(t0, t1, &signed, 60);
            let (t, ok) = polish(edge, surface, domain, t, settings.max_iterations);
            converged &= ok;
            roots.push(t);
        }
    }
    if let Some((t, f)) = samples.last() {
        if *f == 0.0 {
            roots.push(*t);
        }
    }

    // Touching without crossing.
    for i in 1..samples.len().saturating_sub(1) {
        let (a, b, c) = (samples[i - 1].1, samples[i].1, samples[i + 1].1);
        let same_side = (a < 0.0) == (b < 0.0) && (b < 0.0) == (c < 0.0);
        if same_side && b.abs() <= a.abs() && b.abs() <= c.abs() {
            let (mut lo, mut hi) = (samples[i - 1].0, samples[i + 1].0);
            for _ in 0..80 {
                let m1 = lo + (hi - lo) / 3.0;
                let m2 = hi - (hi - lo) / 3.0;
                if signed(m1).abs() < signed(m2).abs() {
                    hi = m2;
                } else {
                    lo = m1;
                }
            }
            let t = 0.5 * (lo + hi);
            if signed(t).abs() <= tol {
                roots.push(t);
            }
        }
    }
    roots.sort_by(f64::total_cmp);
    (roots, converged)
}

/// Newton polish of `C(t) - S(u, v) = 0` from a bracketed root.
fn polish(edge: CurveSpan<'_>, surface: &Surface, domain: &FaceDomain, t: f64, max_iterations: usize) -> (f64, bool) {
    let mut uv = domain.project(&edge.curve.evaluate(t));
    let mut t = t;
    for _ in 0..max_iterations {
        let r = edge.curve.evaluate(t) - surface.evaluate_uv(&uv);
        if r.length() < 1e-14 {
            return (t, true);
        }
        let dc = edge.curve.derivative(t);
        let (su, sv) = surface.partials(uv.x, uv.y);
        let jacobian = [
            [dc.x, -su.x, -sv.x],
            [dc.y, -su.y, -sv.y],
            [dc.z, -su.z, -sv.z],
        ];
        let Some(step) = newton_step_3(jacobian, [r.x, r.y, r.z]) else {
            return (t, false);
        };
        t = (t + step[0]).clamp(edge.range.0, edge.range.1);
        uv = Point2d::new(uv.x + step[1], uv.y + step[2]);
        if step.iter().map(|s| s.abs()).sum::<f64>() < 1e-14 {
            return (t, true);
        }
    }
    (t, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::curves::{Circle3d, Line3d};
    use crate::geometry::vector::Vec3;
    use crate::topology::explore::subshapes;
    use crate::topology::primitives::{make_box, make_cylinder};
    use crate::topology::shape::{ShapeKind, ShapeStore};
    use std::f64::consts::TAU;

    fn box_top() -> (ShapeStore, FaceDomain) {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let top = subshapes(&store, solid, ShapeKind::Face).unwrap()[1];
        let domain = FaceDomain::build(&store, top, 16, 30).unwrap();
        (store, domain)
    }

    #[test]
    fn test_line_pierces_face_interior() {
        let (_store, domain) = box_top();
        let line = Curve::Line(Line3d::new(Point3d::new(0.5, 0.5, 0.0), Vec3::Z));
        let hits = intersect_edge_face(CurveSpan::new(&line, (0.0, 2.0)), &domain, 1e-7, &SolverSettings::default()).unwrap();
        match hits.items.as_slice() {
            [EfHit::Point { t, position, .. }] => {
                assert!((t - 1.0).abs() < 1e-12);
                assert_eq!(*position, DomainPosition::Inside);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_line_outside_trimmed_region_misses() {
        let (_store, domain) = box_top();
        let line = Curve::Line(Line3d::new(Point3d::new(3.0, 0.5, 0.0), Vec3::Z));
        let hits = intersect_edge_face(CurveSpan::new(&line, (0.0, 2.0)), &domain, 1e-7, &SolverSettings::default()).unwrap();
        assert!(hits.items.is_empty());
    }

    #[test]
    fn test_line_in_face_plane_is_clipped_to_domain() {
        let (_store, domain) = box_top();
        let line = Curve::Line(Line3d::new(Point3d::new(-1.0, 0.5, 1.0), Vec3::X));
        let hits = intersect_edge_face(CurveSpan::new(&line, (0.0, 3.0)), &domain, 1e-7, &SolverSettings::default()).unwrap();
        match hits.items.as_slice() {
            [EfHit::Common { range }] => {
                assert!((range.0 - 1.0).abs() < 1e-6);
                assert!((range.1 - 2.0).abs() < 1e-6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_circle_crosses_cylinder_wall() {
        let mut store = ShapeStore::new();
        let solid = make_cylinder(&mut store, Point3d::ORIGIN, Vec3::Z, 1.0, 2.0);
        let lateral = subshapes(&store, solid, ShapeKind::Face).unwrap()[0];
        let domain = FaceDomain::build(&store, lateral, 16, 30).unwrap();
        // Vertical circle through the axis, crossing the wall at x = ±1.
        let circle = Curve::Circle(Circle3d::with_axes(Point3d::new(0.0, 0.0, 1.0), Vec3::Y, Vec3::X, 1.2));
        let hits = intersect_edge_face(CurveSpan::new(&circle, (0.0, TAU)), &domain, 1e-7, &SolverSettings::default()).unwrap();
        let points: Vec<_> = hits
            .items
            .iter()
            .filter_map(|h| match h {
                EfHit::Point { point, .. } => Some(*point),
                _ => None,
            })
            .collect();
        assert_eq!(points.len(), 4);
        for p in points {
            assert!(((p.x * p.x + p.y * p.y).sqrt() - 1.0).abs() < 1e-7);
        }
    }
}
