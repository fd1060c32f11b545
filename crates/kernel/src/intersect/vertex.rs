//! Vertex/vertex, vertex/edge and vertex/face tests.

use crate::geometry::curves::Curve;
use crate::geometry::point::{Point2d, Point3d};
use crate::topology::face_domain::FaceDomain;

/// Distance between two vertex points when within `tol`.
pub fn vertex_vertex(p1: &Point3d, p2: &Point3d, tol: f64) -> Option<f64> {
    let d = p1.distance_to(p2);
    (d <= tol).then_some(d)
}

/// Parameter and distance of `p` on `curve` within `range`, when within `tol`.
pub fn vertex_edge(p: &Point3d, curve: &Curve, range: (f64, f64), tol: f64, max_iterations: usize) -> Option<(f64, f64)> {
    let proj = curve.project(p, range, max_iterations);
    (proj.distance <= tol).then_some((proj.t, proj.distance))
}

/// Parameters and distance of `p` on the face surface when within `tol` of
/// the surface and strictly inside the trimmed domain.
pub fn vertex_face(p: &Point3d, domain: &FaceDomain, tol: f64) -> Option<(Point2d, f64)> {
    let uv = domain.project(p);
    let d = domain.surface.evaluate_uv(&uv).distance_to(p);
    if d > tol || domain.on_boundary(p, tol) || !domain.contains_uv(&uv) {
        return None;
    }
    Some((uv, d))
}
