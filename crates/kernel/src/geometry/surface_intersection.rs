use crate::Tolerance;

use super::curves::{Circle3d, Curve, Ellipse3d, Line3d};
use super::point::Point3d;
use super::surfaces::{Cone, Cylinder, Plane, Sphere, Surface};

/// Result of intersecting two untrimmed surfaces in closed form.
#[derive(Debug, Clone)]
pub enum SurfaceIntersection {
    /// Surfaces do not meet.
    None,
    /// Tangent contact at a single point.
    Point(Point3d),
    /// A single intersection curve.
    Curve(Curve),
    /// Two separate curves (plane along a cylinder, parallel cylinders).
    TwoCurves(Curve, Curve),
    /// The surfaces share the same locus.
    Coincident,
}

impl SurfaceIntersection {
    pub fn into_curves(self) -> Vec<Curve> {
        match self {
            SurfaceIntersection::Curve(c) => vec![c],
            SurfaceIntersection::TwoCurves(a, b) => vec![a, b],
            _ => vec![],
        }
    }
}

/// Closed-form intersection for the surface pairs that have one.
///
/// `None` means the pair has no analytic treatment and must be marched.
/// `tol.coincidence` is the linear threshold of the pair.
pub fn intersect_analytic(s1: &Surface, s2: &Surface, tol: &Tolerance) -> Option<SurfaceIntersection> {
    use Surface::*;
    let result = match (s1, s2) {
        (Plane(a), Plane(b)) => plane_plane(a, b, tol),
        (Plane(p), Cylinder(c)) | (Cylinder(c), Plane(p)) => plane_cylinder(p, c, tol),
        (Plane(p), Sphere(s)) | (Sphere(s), Plane(p)) => plane_sphere(p, s, tol),
        (Plane(p), Cone(c)) | (Cone(c), Plane(p)) => plane_cone(p, c, tol)?,
        (Sphere(a), Sphere(b)) => sphere_sphere(a, b, tol),
        (Cylinder(a), Cylinder(b)) => cylinder_cylinder(a, b, tol)?,
        _ => return None,
    };
    Some(result)
}

// ─── Plane–Plane ─────────────────────────────────────────────────────────────

/// Transverse planes meet in a line; parallel planes are coincident or disjoint.
pub fn plane_plane(p1: &Plane, p2: &Plane, tol: &Tolerance) -> SurfaceIntersection {
    let cross = p1.normal.cross(&p2.normal);
    let cross_len = cross.length();

    if cross_len < tol.angular {
        if p1.distance_to_point(&p2.origin).abs() < tol.coincidence {
            return SurfaceIntersection::Coincident;
        }
        return SurfaceIntersection::None;
    }

    let dir = cross / cross_len;
    let d1 = p1.origin.to_vec3().dot(&p1.normal);
    let d2 = p2.origin.to_vec3().dot(&p2.normal);
    let n1n2 = p1.normal.dot(&p2.normal);
    let denom = 1.0 - n1n2 * n1n2;
    let c1 = (d1 - d2 * n1n2) / denom;
    let c2 = (d2 - d1 * n1n2) / denom;
    let origin = Point3d::ORIGIN + p1.normal * c1 + p2.normal * c2;

    SurfaceIntersection::Curve(Curve::Line(Line3d { origin, direction: dir }))
}

// ─── Plane–Cylinder ──────────────────────────────────────────────────────────

/// Plane across the axis gives a circle framed like the cylinder, so the
/// circle parameter equals the cylinder's `u`. A plane along the axis gives
/// zero, one or two rulings; anything else an ellipse.
pub fn plane_cylinder(plane: &Plane, cyl: &Cylinder, tol: &Tolerance) -> SurfaceIntersection {
    let cos_theta = plane.normal.dot(&cyl.axis).abs();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    if sin_theta < tol.angular {
        let t = (plane.origin - cyl.origin).dot(&cyl.axis);
        let center = cyl.origin + cyl.axis * t;
        let circle = Circle3d::with_axes(center, cyl.axis, cyl.ref_dir, cyl.radius);
        return SurfaceIntersection::Curve(Curve::Circle(circle));
    }

    if cos_theta < tol.angular {
        let dist = plane.distance_to_point(&cyl.origin).abs();
        if dist > cyl.radius + tol.coincidence {
            return SurfaceIntersection::None;
        }
        let foot = plane.project_point(&cyl.origin);
        if (dist - cyl.radius).abs() < tol.coincidence {
            return SurfaceIntersection::Curve(Curve::Line(Line3d {
                origin: foot,
                direction: cyl.axis,
            }));
        }
        let half_chord = (cyl.radius * cyl.radius - dist * dist).max(0.0).sqrt();
        let lateral = cyl.axis.cross(&plane.normal).normalize();
        return SurfaceIntersection::TwoCurves(
            Curve::Line(Line3d {
                origin: foot + lateral * half_chord,
                direction: cyl.axis,
            }),
            Curve::Line(Line3d {
                origin: foot - lateral * half_chord,
                direction: cyl.axis,
            }),
        );
    }

    // Oblique: minor radius R, major radius R / cos(theta), centered where
    // the axis pierces the plane.
    let denom = plane.normal.dot(&cyl.axis);
    let t = (plane.origin - cyl.origin).dot(&plane.normal) / denom;
    let center = cyl.origin + cyl.axis * t;
    let axis_in_plane = cyl.axis - plane.normal * plane.normal.dot(&cyl.axis);
    let Some(major_axis) = axis_in_plane.normalized() else {
        return SurfaceIntersection::None;
    };
    let ellipse = Ellipse3d::new(center, plane.normal, major_axis, cyl.radius / cos_theta, cyl.radius);
    SurfaceIntersection::Curve(Curve::Ellipse(ellipse))
}

// ─── Plane–Sphere ────────────────────────────────────────────────────────────

pub fn plane_sphere(plane: &Plane, sphere: &Sphere, tol: &Tolerance) -> SurfaceIntersection {
    let signed_dist = plane.distance_to_point(&sphere.center);
    let dist = signed_dist.abs();
    if dist > sphere.radius + tol.coincidence {
        return SurfaceIntersection::None;
    }
    let center = sphere.center - plane.normal * signed_dist;
    if (dist - sphere.radius).abs() < tol.coincidence {
        return SurfaceIntersection::Point(center);
    }
    let radius = (sphere.radius * sphere.radius - dist * dist).max(0.0).sqrt();
    SurfaceIntersection::Curve(Curve::Circle(Circle3d::new(center, plane.normal, radius)))
}

// ─── Plane–Cone ──────────────────────────────────────────────────────────────

/// Only the section across the axis is handled in closed form.
pub fn plane_cone(plane: &Plane, cone: &Cone, tol: &Tolerance) -> Option<SurfaceIntersection> {
    let sin_theta = plane.normal.cross(&cone.axis).length();
    if sin_theta >= tol.angular {
        return None;
    }
    let v = (plane.origin - cone.apex).dot(&cone.axis);
    let center = cone.apex + cone.axis * v;
    let radius = v.abs() * cone.half_angle.tan();
    if radius < tol.coincidence {
        return Some(SurfaceIntersection::Point(center));
    }
    let circle = Circle3d::with_axes(center, cone.axis, cone.ref_dir, radius);
    Some(SurfaceIntersection::Curve(Curve::Circle(circle)))
}

// ─── Sphere–Sphere ───────────────────────────────────────────────────────────

pub fn sphere_sphere(a: &Sphere, b: &Sphere, tol: &Tolerance) -> SurfaceIntersection {
    let axis = b.center - a.center;
    let d = axis.length();
    if d < tol.coincidence {
        if (a.radius - b.radius).abs() < tol.coincidence {
            return SurfaceIntersection::Coincident;
        }
        return SurfaceIntersection::None;
    }
    let n = axis / d;
    if d > a.radius + b.radius + tol.coincidence || d < (a.radius - b.radius).abs() - tol.coincidence {
        return SurfaceIntersection::None;
    }
    let along = (d * d + a.radius * a.radius - b.radius * b.radius) / (2.0 * d);
    let center = a.center + n * along;
    let r2 = a.radius * a.radius - along * along;
    if r2 <= tol.coincidence * tol.coincidence {
        return SurfaceIntersection::Point(center);
    }
    SurfaceIntersection::Curve(Curve::Circle(Circle3d::new(center, n, r2.sqrt())))
}

// ─── Cylinder–Cylinder ───────────────────────────────────────────────────────

/// Parallel cylinders only; skew axes are marched.
pub fn cylinder_cylinder(a: &Cylinder, b: &Cylinder, tol: &Tolerance) -> Option<SurfaceIntersection> {
    if a.axis.cross(&b.axis).length() >= tol.angular {
        return None;
    }
    let offset = b.origin - a.origin;
    let radial = offset - a.axis * offset.dot(&a.axis);
    let d = radial.length();
    if d < tol.coincidence {
        if (a.radius - b.radius).abs() < tol.coincidence {
            return Some(SurfaceIntersection::Coincident);
        }
        return Some(SurfaceIntersection::None);
    }
    if d > a.radius + b.radius + tol.coincidence || d < (a.radius - b.radius).abs() - tol.coincidence {
        return Some(SurfaceIntersection::None);
    }
    let e = radial / d;
    let along = (d * d + a.radius * a.radius - b.radius * b.radius) / (2.0 * d);
    let foot = a.origin + e * along;
    let h2 = a.radius * a.radius - along * along;
    if h2 <= tol.coincidence * tol.coincidence {
        return Some(SurfaceIntersection::Curve(Curve::Line(Line3d {
            origin: foot,
            direction: a.axis,
        })));
    }
    let side = a.axis.cross(&e) * h2.sqrt();
    Some(SurfaceIntersection::TwoCurves(
        Curve::Line(Line3d {
            origin: foot + side,
            direction: a.axis,
        }),
        Curve::Line(Line3d {
            origin: foot - side,
            direction: a.axis,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::vector::Vec3;
    use std::f64::consts::{FRAC_PI_4, PI};

    fn tol() -> Tolerance {
        Tolerance::default()
    }

    fn assert_on(surface: &Surface, p: &Point3d) {
        let d = surface.distance_to(p, None, 30);
        assert!(d < 1e-7, "{:?} is {:.2e} off {}", p, d, surface.surface_type_name());
    }

    fn check_curves_on_both(a: &Surface, b: &Surface, result: SurfaceIntersection) -> usize {
        let curves = result.into_curves();
        for c in &curves {
            let range = c.natural_domain().or_else(|| c.period().map(|p| (0.0, p))).unwrap_or((-5.0, 5.0));
            for (_, p) in c.sample(range, 16) {
                assert_on(a, &p);
                assert_on(b, &p);
            }
        }
        curves.len()
    }

    #[test]
    fn plane_plane_cases() {
        let xy = Plane::xy();
        let tilted = Plane::new(Point3d::ORIGIN, Vec3::new(0.0, -FRAC_PI_4.sin(), FRAC_PI_4.cos()));
        let r = plane_plane(&xy, &tilted, &tol());
        assert_eq!(check_curves_on_both(&Surface::Plane(xy), &Surface::Plane(tilted), r), 1);

        let lifted = Plane::new(Point3d::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(matches!(plane_plane(&xy, &lifted, &tol()), SurfaceIntersection::None));

        let flipped = Plane::new(Point3d::new(1.0, 2.0, 0.0), -Vec3::Z);
        assert!(matches!(plane_plane(&xy, &flipped, &tol()), SurfaceIntersection::Coincident));
    }

    #[test]
    fn plane_cylinder_circle_shares_cylinder_frame() {
        let plane = Plane::new(Point3d::new(0.0, 0.0, 5.0), Vec3::Z);
        let cyl = Cylinder::new(Point3d::ORIGIN, Vec3::Z, 3.0);
        let SurfaceIntersection::Curve(Curve::Circle(c)) = plane_cylinder(&plane, &cyl, &tol()) else {
            panic!("expected a circle");
        };
        for t in [0.0, 1.0, 2.5, 5.0] {
            let on_cyl = Surface::Cylinder(cyl).evaluate(t, 5.0);
            assert!(c.evaluate(t).distance_to(&on_cyl) < 1e-12);
        }
    }

    #[test]
    fn plane_cylinder_along_axis() {
        let cyl = Cylinder::new(Point3d::ORIGIN, Vec3::Z, 3.0);
        let two = plane_cylinder(&Plane::new(Point3d::new(0.0, 2.0, 0.0), Vec3::Y), &cyl, &tol());
        let sp = Surface::Plane(Plane::new(Point3d::new(0.0, 2.0, 0.0), Vec3::Y));
        assert_eq!(check_curves_on_both(&sp, &Surface::Cylinder(cyl), two), 2);

        let tangent = plane_cylinder(&Plane::new(Point3d::new(0.0, 3.0, 0.0), Vec3::Y), &cyl, &tol());
        assert!(matches!(tangent, SurfaceIntersection::Curve(Curve::Line(_))));

        let miss = plane_cylinder(&Plane::new(Point3d::new(0.0, 5.0, 0.0), Vec3::Y), &cyl, &tol());
        assert!(matches!(miss, SurfaceIntersection::None));
    }

    #[test]
    fn plane_cylinder_oblique_ellipse() {
        let cyl = Cylinder::new(Point3d::new(1.0, -2.0, 0.5), Vec3::new(1.0, 1.0, 1.0), 2.0);
        for angle in [0.2_f64, 0.6, 1.0, 1.3] {
            let normal = (cyl.axis * angle.cos() + cyl.ref_dir * angle.sin()).normalize();
            let plane = Plane::new(cyl.origin, normal);
            let r = plane_cylinder(&plane, &cyl, &tol());
            assert!(matches!(r, SurfaceIntersection::Curve(Curve::Ellipse(_))));
            assert_eq!(check_curves_on_both(&Surface::Plane(plane), &Surface::Cylinder(cyl), r), 1);
        }
    }

    #[test]
    fn plane_sphere_cases() {
        let sphere = Sphere::new(Point3d::ORIGIN, 5.0);
        let cut = Plane::new(Point3d::new(0.0, 0.0, 3.0), Vec3::Z);
        match plane_sphere(&cut, &sphere, &tol()) {
            SurfaceIntersection::Curve(Curve::Circle(c)) => assert!((c.radius - 4.0).abs() < 1e-12),
            other => panic!("expected circle, got {other:?}"),
        }
        let touch = Plane::new(Point3d::new(0.0, 0.0, -5.0), Vec3::Z);
        assert!(matches!(plane_sphere(&touch, &sphere, &tol()), SurfaceIntersection::Point(_)));
        let near_miss = Plane::new(Point3d::new(0.0, 0.0, 5.001), Vec3::Z);
        assert!(matches!(plane_sphere(&near_miss, &sphere, &tol()), SurfaceIntersection::None));
    }

    #[test]
    fn plane_cone_across_axis() {
        let cone = Cone::new(Point3d::ORIGIN, Vec3::Z, PI / 6.0);
        let plane = Plane::new(Point3d::new(0.0, 0.0, 3.0), Vec3::Z);
        let r = plane_cone(&plane, &cone, &tol()).expect("analytic");
        assert_eq!(check_curves_on_both(&Surface::Plane(plane), &Surface::Cone(cone), r), 1);
        let oblique = Plane::new(Point3d::ORIGIN, Vec3::new(0.0, 1.0, 1.0));
        assert!(plane_cone(&oblique, &cone, &tol()).is_none());
    }

    #[test]
    fn sphere_sphere_cases() {
        let a = Sphere::new(Point3d::ORIGIN, 2.0);
        let b = Sphere::new(Point3d::new(3.0, 0.0, 0.0), 2.0);
        let r = sphere_sphere(&a, &b, &tol());
        assert_eq!(check_curves_on_both(&Surface::Sphere(a), &Surface::Sphere(b), r), 1);
        assert!(matches!(sphere_sphere(&a, &a, &tol()), SurfaceIntersection::Coincident));
        let touching = Sphere::new(Point3d::new(4.0, 0.0, 0.0), 2.0);
        assert!(matches!(sphere_sphere(&a, &touching, &tol()), SurfaceIntersection::Point(_)));
    }

    #[test]
    fn cylinder_cylinder_cases() {
        let a = Cylinder::new(Point3d::ORIGIN, Vec3::Z, 1.0);
        let b = Cylinder::new(Point3d::new(1.0, 0.0, 0.0), Vec3::Z, 1.0);
        let r = cylinder_cylinder(&a, &b, &tol()).expect("parallel");
        assert_eq!(check_curves_on_both(&Surface::Cylinder(a), &Surface::Cylinder(b), r), 2);
        let same = Cylinder::new(Point3d::new(0.0, 0.0, 7.0), -Vec3::Z, 1.0);
        assert!(matches!(cylinder_cylinder(&a, &same, &tol()), Some(SurfaceIntersection::Coincident)));
        let skew = Cylinder::new(Point3d::ORIGIN, Vec3::X, 0.5);
        assert!(cylinder_cylinder(&a, &skew, &tol()).is_none());
    }

    #[test]
    fn dispatcher_is_symmetric() {
        let p = Surface::Plane(Plane::new(Point3d::new(0.0, 0.0, 1.0), Vec3::Z));
        let c = Surface::Cylinder(Cylinder::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        assert!(intersect_analytic(&p, &c, &tol()).is_some());
        assert!(intersect_analytic(&c, &p, &tol()).is_some());
        let t = Surface::Torus(crate::geometry::surfaces::Torus::new(Point3d::ORIGIN, Vec3::Z, 3.0, 1.0));
        assert!(intersect_analytic(&p, &t, &tol()).is_none());
    }
}
