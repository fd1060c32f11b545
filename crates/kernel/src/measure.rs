//! Areas and enclosed volumes of B-Rep shapes.
//!
//! Volumes use the divergence theorem, `V = 1/3 Σ ∫∫ p · n dA`, summed over
//! the oriented faces. Planar faces are integrated exactly from their
//! parameter polygon; other faces use Green's theorem over the trimmed
//! parameter domain with Gauss–Legendre quadrature.

use tracing::instrument;

use crate::geometry::point::Point2d;
use crate::geometry::surfaces::Surface;
use crate::topology::explore::oriented_subshapes;
use crate::topology::face_domain::{polygon_area, FaceDomain};
use crate::topology::{ShapeId, ShapeKind, ShapeRef, ShapeStore, TopologyError};

/// Boundary sampling used for measurement; finer than the intersection default.
const MEASURE_SAMPLES: usize = 256;
const MEASURE_ITERATIONS: usize = 50;

const GAUSS_5: [(f64, f64); 5] = [
    (0.0, 0.568_888_888_888_888_9),
    (-0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
    (0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
    (-0.906_179_845_938_664, 0.236_926_885_056_189_1),
    (0.906_179_845_938_664, 0.236_926_885_056_189_1),
];

/// Area of a face.
pub fn face_area(store: &ShapeStore, face: ShapeId) -> Result<f64, TopologyError> {
    let domain = FaceDomain::build(store, face, MEASURE_SAMPLES, MEASURE_ITERATIONS)?;
    if domain.surface.as_plane().is_some() {
        return Ok(domain.loops.iter().map(|l| l.signed_area()).sum::<f64>().abs());
    }
    let surface = &domain.surface;
    Ok(domain_integral(&domain, |u, v| {
        let (su, sv) = surface.partials(u, v);
        su.cross(&sv).length()
    })
    .abs())
}

/// Signed volume enclosed by the faces of `shape`, counting each face with
/// the orientation it has inside `shape`. Positive for outward-oriented
/// closed shells.
#[instrument(skip(store))]
pub fn solid_volume(store: &ShapeStore, shape: ShapeId) -> Result<f64, TopologyError> {
    oriented_volume(store, ShapeRef::forward(shape))
}

/// Signed volume of an oriented shape reference.
pub fn oriented_volume(store: &ShapeStore, shape: ShapeRef) -> Result<f64, TopologyError> {
    let mut volume = 0.0;
    for face in oriented_subshapes(store, shape, ShapeKind::Face)? {
        volume += face.orientation.sign() * flux_integral(store, face.id)?;
    }
    Ok(volume / 3.0)
}

/// `∫∫ p · (∂u × ∂v) du dv` over the trimmed domain of a face.
fn flux_integral(store: &ShapeStore, face: ShapeId) -> Result<f64, TopologyError> {
    let domain = FaceDomain::build(store, face, MEASURE_SAMPLES, MEASURE_ITERATIONS)?;
    if let Surface::Plane(plane) = &domain.surface {
        // p · n is constant over the plane.
        let area: f64 = domain.loops.iter().map(|l| polygon_area(&l.polygon)).sum();
        return Ok(plane.origin.to_vec3().dot(&plane.normal) * area);
    }
    let surface = &domain.surface;
    Ok(domain_integral(&domain, |u, v| {
        let (su, sv) = surface.partials(u, v);
        surface.evaluate(u, v).to_vec3().dot(&su.cross(&sv))
    }))
}

/// `∫∫_D f du dv` via Green's theorem: `∮ F dv` with `F(u, v) = ∫ f(s, v) ds`
/// from the left edge of the domain box. Loop orientation carries the sign
/// of holes.
fn domain_integral(domain: &FaceDomain, f: impl Fn(f64, f64) -> f64) -> f64 {
    let u0 = domain.bbox.u_min;
    let panel = (domain.bbox.width() / 16.0).max(1e-9);
    let antiderivative = |u: f64, v: f64| -> f64 {
        let span = u - u0;
        if span.abs() < 1e-300 {
            return 0.0;
        }
        let panels = (span.abs() / panel).ceil().max(1.0) as usize;
        let h = span / panels as f64;
        let mut sum = 0.0;
        for k in 0..panels {
            let a = u0 + h * k as f64;
            for (x, w) in GAUSS_5 {
                sum += w * f(a + 0.5 * h * (x + 1.0), v);
            }
        }
        0.5 * h * sum
    };

    let mut total = 0.0;
    for l in &domain.loops {
        let n = l.polygon.len();
        for i in 0..n {
            let (a, b): (Point2d, Point2d) = (l.polygon[i], l.polygon[(i + 1) % n]);
            let dv = b.y - a.y;
            if dv.abs() < 1e-300 {
                continue;
            }
            let mut seg = 0.0;
            for (x, w) in GAUSS_5 {
                let q = a.lerp(&b, 0.5 * (x + 1.0));
                seg += w * antiderivative(q.x, q.y);
            }
            total += 0.5 * seg * dv;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::geometry::vector::Vec3;
    use crate::topology::explore::subshapes;
    use crate::topology::primitives::{make_box, make_cylinder, make_prism};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_box_volume_and_area() {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::new(1.0, -2.0, 0.5), Point3d::new(3.0, 1.0, 1.5));
        assert_relative_eq!(solid_volume(&store, solid).unwrap(), 6.0, epsilon = 1e-9);
        let total: f64 = subshapes(&store, solid, ShapeKind::Face)
            .unwrap()
            .into_iter()
            .map(|f| face_area(&store, f).unwrap())
            .sum();
        assert_relative_eq!(total, 2.0 * (6.0 + 2.0 + 3.0), epsilon = 1e-9);
    }

    #[test]
    fn test_reversed_solid_has_negative_volume() {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let v = oriented_volume(&store, ShapeRef::reversed(solid)).unwrap();
        assert_relative_eq!(v, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cylinder_volume() {
        let mut store = ShapeStore::new();
        let solid = make_cylinder(&mut store, Point3d::new(0.5, 0.0, -1.0), Vec3::Z, 1.5, 2.0);
        let expected = PI * 1.5 * 1.5 * 2.0;
        assert_relative_eq!(solid_volume(&store, solid).unwrap(), expected, max_relative = 1e-3);
    }

    #[test]
    fn test_prism_volume() {
        let mut store = ShapeStore::new();
        let profile = [Point3d::ORIGIN, Point3d::new(2.0, 0.0, 0.0), Point3d::new(0.0, 2.0, 0.0)];
        let solid = make_prism(&mut store, &profile, Vec3::new(0.0, 0.0, 3.0));
        assert_relative_eq!(solid_volume(&store, solid).unwrap(), 6.0, epsilon = 1e-9);
    }
}
