use std::f64::consts::TAU;

use tracing::{info, instrument};

use super::shape::{ShapeId, ShapeRef, ShapeStore};
use crate::geometry::curves::{Circle3d, Curve, Line3d};
use crate::geometry::point::Point3d;
use crate::geometry::surfaces::{Cylinder, Plane, Surface};
use crate::geometry::vector::Vec3;

fn line_edge(store: &mut ShapeStore, a: ShapeId, b: ShapeId, tol: f64) -> ShapeId {
    let (pa, pb) = match (store.point(a), store.point(b)) {
        (Ok(pa), Ok(pb)) => (pa, pb),
        _ => (Point3d::ORIGIN, Point3d::ORIGIN),
    };
    let length = pa.distance_to(&pb);
    store.add_edge(Curve::Line(Line3d::from_points(pa, pb)), (0.0, length), a, b, tol)
}

/// Newell normal of a closed polygon (not normalized).
fn polygon_normal(points: &[Point3d]) -> Vec3 {
    let mut n = Vec3::ZERO;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        n = n + Vec3::new(
            (a.y - b.y) * (a.z + b.z),
            (a.z - b.z) * (a.x + b.x),
            (a.x - b.x) * (a.y + b.y),
        );
    }
    n
}

/// Extrude a planar polygon along `direction` into a closed solid.
///
/// The profile may be given in either winding; faces come out with outward
/// normals and counter-clockwise outer wires.
#[instrument(skip(store, profile))]
pub fn make_prism(store: &mut ShapeStore, profile: &[Point3d], direction: Vec3) -> ShapeId {
    info!(vertices = profile.len(), direction = ?direction.to_array(), "creating prism primitive");
    let tol = crate::default_tolerance().coincidence;

    let mut base: Vec<Point3d> = profile.to_vec();
    if polygon_normal(&base).dot(&direction) < 0.0 {
        base.reverse();
    }
    let n = base.len();

    let bottom_v: Vec<ShapeId> = base.iter().map(|p| store.add_vertex(*p, tol)).collect();
    let top_v: Vec<ShapeId> = base.iter().map(|p| store.add_vertex(*p + direction, tol)).collect();

    let bottom_e: Vec<ShapeId> = (0..n).map(|i| line_edge(store, bottom_v[i], bottom_v[(i + 1) % n], tol)).collect();
    let top_e: Vec<ShapeId> = (0..n).map(|i| line_edge(store, top_v[i], top_v[(i + 1) % n], tol)).collect();
    let vertical_e: Vec<ShapeId> = (0..n).map(|i| line_edge(store, bottom_v[i], top_v[i], tol)).collect();

    let mut faces = Vec::with_capacity(n + 2);

    // Bottom: reversed edges in reverse order, normal against the extrusion.
    let wire = store.add_wire(bottom_e.iter().rev().map(|e| ShapeRef::reversed(*e)).collect());
    let centroid = Point3d::centroid(&base).unwrap_or(Point3d::ORIGIN);
    let plane = Plane::new(centroid, -direction);
    faces.push(store.add_face(Surface::Plane(plane), vec![ShapeRef::forward(wire)], tol));

    let wire = store.add_wire(top_e.iter().map(|e| ShapeRef::forward(*e)).collect());
    let plane = Plane::new(centroid + direction, direction);
    faces.push(store.add_face(Surface::Plane(plane), vec![ShapeRef::forward(wire)], tol));

    for i in 0..n {
        let j = (i + 1) % n;
        let wire = store.add_wire(vec![
            ShapeRef::forward(bottom_e[i]),
            ShapeRef::forward(vertical_e[j]),
            ShapeRef::reversed(top_e[i]),
            ShapeRef::reversed(vertical_e[i]),
        ]);
        let normal = (base[j] - base[i]).cross(&direction);
        let plane = Plane::new(base[i].midpoint(&base[j]), normal);
        faces.push(store.add_face(Surface::Plane(plane), vec![ShapeRef::forward(wire)], tol));
    }

    let shell = store.add_shell(faces.into_iter().map(ShapeRef::forward).collect());
    store.add_solid(vec![ShapeRef::forward(shell)])
}

/// Axis-aligned box spanning `min`..`max`.
#[instrument(skip(store))]
pub fn make_box(store: &mut ShapeStore, min: Point3d, max: Point3d) -> ShapeId {
    info!(min = ?min.to_array(), max = ?max.to_array(), "creating box primitive");
    let profile = [
        Point3d::new(min.x, min.y, min.z),
        Point3d::new(max.x, min.y, min.z),
        Point3d::new(max.x, max.y, min.z),
        Point3d::new(min.x, max.y, min.z),
    ];
    make_prism(store, &profile, Vec3::new(0.0, 0.0, max.z - min.z))
}

/// Closed right circular cylinder with a single seam edge.
#[instrument(skip(store))]
pub fn make_cylinder(store: &mut ShapeStore, base: Point3d, axis: Vec3, radius: f64, height: f64) -> ShapeId {
    info!(radius, height, "creating cylinder primitive");
    let tol = crate::default_tolerance().coincidence;
    let cylinder = Cylinder::new(base, axis, radius);
    let axis = cylinder.axis;
    let top = base + axis * height;

    let bottom_circle = Circle3d::with_axes(base, axis, cylinder.ref_dir, radius);
    let top_circle = Circle3d::with_axes(top, axis, cylinder.ref_dir, radius);
    let vb = store.add_vertex(bottom_circle.evaluate(0.0), tol);
    let vt = store.add_vertex(top_circle.evaluate(0.0), tol);

    let bottom = store.add_edge(Curve::Circle(bottom_circle), (0.0, TAU), vb, vb, tol);
    let top_edge = store.add_edge(Curve::Circle(top_circle), (0.0, TAU), vt, vt, tol);
    let seam = line_edge(store, vb, vt, tol);

    let lateral_wire = store.add_wire(vec![
        ShapeRef::forward(bottom),
        ShapeRef::forward(seam),
        ShapeRef::reversed(top_edge),
        ShapeRef::reversed(seam),
    ]);
    let lateral = store.add_face(Surface::Cylinder(cylinder), vec![ShapeRef::forward(lateral_wire)], tol);

    let bottom_wire = store.add_wire(vec![ShapeRef::reversed(bottom)]);
    let bottom_cap = store.add_face(Surface::Plane(Plane::new(base, -axis)), vec![ShapeRef::forward(bottom_wire)], tol);

    let top_wire = store.add_wire(vec![ShapeRef::forward(top_edge)]);
    let top_cap = store.add_face(Surface::Plane(Plane::new(top, axis)), vec![ShapeRef::forward(top_wire)], tol);

    let shell = store.add_shell(vec![
        ShapeRef::forward(lateral),
        ShapeRef::forward(bottom_cap),
        ShapeRef::forward(top_cap),
    ]);
    store.add_solid(vec![ShapeRef::forward(shell)])
}
