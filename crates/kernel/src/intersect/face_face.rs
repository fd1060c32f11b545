//! Face/face intersection: raw section curves and tangent points of two
//! trimmed faces.

use tracing::trace;

use crate::geometry::bounds::BoundingBox;
use crate::geometry::curves::{Curve, Line3d};
use crate::geometry::nurbs::NurbsCurve;
use crate::geometry::point::Point3d;
use crate::geometry::surface_intersection::{intersect_analytic, SurfaceIntersection};
use crate::topology::face_domain::{DomainPosition, FaceDomain};
use crate::Tolerance;

use super::marching::march;
use super::{IntersectError, SolverSettings};

/// A section curve before it is split by vertices.
#[derive(Debug, Clone)]
pub struct RawSection {
    pub curve: Curve,
    pub range: (f64, f64),
    pub tolerance: f64,
    pub tangential: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FaceFaceResult {
    /// The two surfaces share the same locus.
    pub coincident: bool,
    pub curves: Vec<RawSection>,
    /// Isolated tangent contacts.
    pub points: Vec<Point3d>,
    pub converged: bool,
}

/// A trimmed face with its model-space bounds.
#[derive(Debug, Clone, Copy)]
pub struct FaceSpan<'a> {
    pub domain: &'a FaceDomain,
    pub bbox: &'a BoundingBox,
}

impl<'a> FaceSpan<'a> {
    pub fn new(domain: &'a FaceDomain, bbox: &'a BoundingBox) -> Self {
        Self { domain, bbox }
    }
}

/// Intersect two trimmed faces within distance `tol`.
///
/// Analytic pairs produce exact curves spanning the overlap of the two face
/// boxes; splitting them at the face boundaries is left to the caller.
/// Everything else is traced by [`march`].
pub fn intersect_faces(a: FaceSpan<'_>, b: FaceSpan<'_>, tol: f64, settings: &SolverSettings) -> Result<FaceFaceResult, IntersectError> {
    let (s1, s2) = (&a.domain.surface, &b.domain.surface);
    if !s1.is_valid() || !s2.is_valid() {
        return Err(IntersectError::Unsupported(format!(
            "{} / {}",
            s1.surface_type_name(),
            s2.surface_type_name()
        )));
    }
    let overlap = overlap_box(a.bbox, b.bbox, tol);
    if !overlap.is_valid() {
        return Ok(FaceFaceResult {
            converged: true,
            ..Default::default()
        });
    }

    let tolerance = Tolerance::with_distance(tol, settings.angular);
    match intersect_analytic(s1, s2, &tolerance) {
        Some(SurfaceIntersection::None) => Ok(FaceFaceResult {
            converged: true,
            ..Default::default()
        }),
        Some(SurfaceIntersection::Coincident) => Ok(FaceFaceResult {
            coincident: true,
            converged: true,
            ..Default::default()
        }),
        Some(SurfaceIntersection::Point(p)) => {
            let touching = a.domain.classify_point(&p, tol) != DomainPosition::Outside
                && b.domain.classify_point(&p, tol) != DomainPosition::Outside;
            Ok(FaceFaceResult {
                points: if touching { vec![p] } else { Vec::new() },
                converged: true,
                ..Default::default()
            })
        }
        Some(found) => {
            let curves = found.into_curves();
            if curves.iter().any(|c| matches!(c, Curve::Parabola(_) | Curve::Hyperbola(_))) {
                return Ok(marched(a, b, tol, settings));
            }
            let mut result = FaceFaceResult {
                converged: true,
                ..Default::default()
            };
            for curve in curves {
                let range = match &curve {
                    Curve::Line(line) => match clip_line(line, &overlap) {
                        Some(r) => r,
                        None => continue,
                    },
                    _ => curve.natural_domain().unwrap_or((0.0, std::f64::consts::TAU)),
                };
                let tangential = is_tangential(a.domain, b.domain, &curve.evaluate(0.5 * (range.0 + range.1)), settings);
                result.curves.push(RawSection {
                    curve,
                    range,
                    tolerance: tol,
                    tangential,
                });
            }
            Ok(result)
        }
        None => Ok(marched(a, b, tol, settings)),
    }
}

fn marched(a: FaceSpan<'_>, b: FaceSpan<'_>, tol: f64, settings: &SolverSettings) -> FaceFaceResult {
    let step = settings.marching_step_ratio * a.bbox.diagonal().min(b.bbox.diagonal());
    let mut result = FaceFaceResult {
        converged: true,
        ..Default::default()
    };
    for traced in march(a.domain, b.domain, tol, step, settings) {
        result.converged &= traced.converged;
        if traced.points.len() < 2 || traced.length() <= tol {
            if let Some(p) = traced.points.first() {
                result.points.push(*p);
            }
            continue;
        }
        let curve = NurbsCurve::polyline(&traced.points);
        let range = curve.domain();
        let curve = Curve::BSpline(curve);
        let deviation = max_deviation(a.domain, b.domain, &traced.points, settings);
        trace!(points = traced.points.len(), deviation, "marched section");
        result.curves.push(RawSection {
            curve,
            range,
            tolerance: tol.max(deviation),
            tangential: traced.tangential,
        });
    }
    result
}

/// Largest distance from a chord midpoint to either surface.
fn max_deviation(d1: &FaceDomain, d2: &FaceDomain, points: &[Point3d], settings: &SolverSettings) -> f64 {
    points
        .windows(2)
        .map(|w| {
            let m = w[0].midpoint(&w[1]);
            let e1 = d1.surface.distance_to(&m, Some(&d1.bbox), settings.max_iterations);
            let e2 = d2.surface.distance_to(&m, Some(&d2.bbox), settings.max_iterations);
            e1.max(e2)
        })
        .fold(0.0, f64::max)
}

fn is_tangential(d1: &FaceDomain, d2: &FaceDomain, p: &Point3d, settings: &SolverSettings) -> bool {
    let uv1 = d1.surface.project(p, Some(&d1.bbox), settings.max_iterations);
    let uv2 = d2.surface.project(p, Some(&d2.bbox), settings.max_iterations);
    let n1 = d1.surface.normal_at(uv1.x, uv1.y);
    let n2 = d2.surface.normal_at(uv2.x, uv2.y);
    n1.cross(&n2).length() < 1e-6
}

fn overlap_box(a: &BoundingBox, b: &BoundingBox, tol: f64) -> BoundingBox {
    let min = Point3d::new(a.min.x.max(b.min.x), a.min.y.max(b.min.y), a.min.z.max(b.min.z));
    let max = Point3d::new(a.max.x.min(b.max.x), a.max.y.min(b.max.y), a.max.z.min(b.max.z));
    BoundingBox::new(min, max).enlarged(tol)
}

/// Parameter interval of `line` inside `bbox` (slab method).
fn clip_line(line: &Line3d, bbox: &BoundingBox) -> Option<(f64, f64)> {
    let o = line.origin.to_array();
    let d = line.direction.to_array();
    let lo = bbox.min.to_array();
    let hi = bbox.max.to_array();
    let (mut t0, mut t1) = (f64::NEG_INFINITY, f64::INFINITY);
    for axis in 0..3 {
        if d[axis].abs() < 1e-15 {
            if o[axis] < lo[axis] || o[axis] > hi[axis] {
                return None;
            }
            continue;
        }
        let a = (lo[axis] - o[axis]) / d[axis];
        let b = (hi[axis] - o[axis]) / d[axis];
        t0 = t0.max(a.min(b));
        t1 = t1.min(a.max(b));
    }
    (t1 > t0).then_some((t0, t1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::vector::Vec3;
    use crate::topology::explore::subshapes;
    use crate::topology::primitives::{make_box, make_cylinder};
    use crate::topology::shape::{ShapeId, ShapeKind, ShapeStore};

    fn face_boxes(store: &ShapeStore, solid: ShapeId) -> Vec<(FaceDomain, BoundingBox)> {
        subshapes(store, solid, ShapeKind::Face)
            .unwrap()
            .into_iter()
            .map(|f| {
                let d = FaceDomain::build(store, f, 16, 30).unwrap();
                let mut bb = BoundingBox::empty();
                for u in d.edge_uses() {
                    bb.add_box(&u.bbox);
                }
                (d, bb)
            })
            .collect()
    }

    #[test]
    fn test_perpendicular_box_faces_meet_in_clipped_line() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0));
        let b = make_box(&mut store, Point3d::new(1.0, 1.0, 1.0), Point3d::new(3.0, 3.0, 3.0));
        let fa = face_boxes(&store, a);
        let fb = face_boxes(&store, b);
        // Top of A (z = 2) against the x = 1 side of B.
        let top = &fa[1];
        let side = fb
            .iter()
            .find(|(d, _)| d.surface.as_plane().is_some_and(|p| p.normal.dot(&Vec3::X) < -0.9))
            .unwrap();
        let result = intersect_faces(FaceSpan::new(&top.0, &top.1), FaceSpan::new(&side.0, &side.1), 1e-7, &SolverSettings::default()).unwrap();
        assert!(!result.coincident);
        assert_eq!(result.curves.len(), 1);
        let section = &result.curves[0];
        let (p0, p1) = (section.curve.evaluate(section.range.0), section.curve.evaluate(section.range.1));
        assert!((p0.distance_to(&p1) - 1.0).abs() < 1e-6);
        assert!(!section.tangential);
    }

    #[test]
    fn test_coplanar_faces_are_coincident() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let b = make_box(&mut store, Point3d::new(0.5, 0.5, 0.0), Point3d::new(1.5, 1.5, 1.0));
        let fa = face_boxes(&store, a);
        let fb = face_boxes(&store, b);
        let result = intersect_faces(FaceSpan::new(&fa[0].0, &fa[0].1), FaceSpan::new(&fb[0].0, &fb[0].1), 1e-7, &SolverSettings::default()).unwrap();
        assert!(result.coincident);
        assert!(result.curves.is_empty());
    }

    #[test]
    fn test_plane_cuts_cylinder_in_circle() {
        let mut store = ShapeStore::new();
        let cyl = make_cylinder(&mut store, Point3d::ORIGIN, Vec3::Z, 1.0, 2.0);
        let slab = make_box(&mut store, Point3d::new(-2.0, -2.0, 1.0), Point3d::new(2.0, 2.0, 3.0));
        let fc = face_boxes(&store, cyl);
        let fs = face_boxes(&store, slab);
        let result = intersect_faces(FaceSpan::new(&fs[0].0, &fs[0].1), FaceSpan::new(&fc[0].0, &fc[0].1), 1e-7, &SolverSettings::default()).unwrap();
        assert_eq!(result.curves.len(), 1);
        assert!(matches!(result.curves[0].curve, Curve::Circle(_)));
    }

    #[test]
    fn test_clip_line_to_box() {
        let line = Line3d::new(Point3d::new(-5.0, 0.5, 0.5), Vec3::X);
        let bbox = BoundingBox::new(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let (t0, t1) = clip_line(&line, &bbox).unwrap();
        assert!((t0 - 5.0).abs() < 1e-12 && (t1 - 6.0).abs() < 1e-12);
        let outside = Line3d::new(Point3d::new(-5.0, 2.0, 0.5), Vec3::X);
        assert!(clip_line(&outside, &bbox).is_none());
    }
}
