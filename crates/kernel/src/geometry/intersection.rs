use super::bounds::{BoundingBox, UvBox};
use super::curves::{Line3d, Ray};
use super::point::Point3d;
use super::solve::{bisect, solve_quadratic, solve_quartic};
use super::surfaces::{Cone, Cylinder, Plane, Sphere, Surface, Torus};

/// A ray crossing of an untrimmed surface.
#[derive(Debug, Clone, Copy)]
pub struct RaySurfaceHit {
    pub point: Point3d,
    pub t: f64,
}

fn sorted_hits(ray: &Ray, ts: impl IntoIterator<Item = f64>) -> Vec<RaySurfaceHit> {
    let mut hits: Vec<RaySurfaceHit> = ts
        .into_iter()
        .filter(|t| t.is_finite() && *t >= 0.0)
        .map(|t| RaySurfaceHit { point: ray.at(t), t })
        .collect();
    hits.sort_by(|a, b| a.t.total_cmp(&b.t));
    hits.dedup_by(|a, b| (a.t - b.t).abs() < 1e-10);
    hits
}

// ─── Line-Line ──────────────────────────────────────────────────────────────

/// Closest points between two infinite lines, or `None` when parallel.
/// Returns `(point_on_l1, t1, point_on_l2, t2, distance)`.
pub fn line_line_closest(l1: &Line3d, l2: &Line3d) -> Option<(Point3d, f64, Point3d, f64, f64)> {
    let w = l1.origin - l2.origin;
    let a = l1.direction.dot(&l1.direction);
    let b = l1.direction.dot(&l2.direction);
    let c = l2.direction.dot(&l2.direction);
    let d = l1.direction.dot(&w);
    let e = l2.direction.dot(&w);

    let denom = a * c - b * b;
    if denom.abs() < 1e-15 * a * c {
        return None;
    }
    let t1 = (b * e - c * d) / denom;
    let t2 = (a * e - b * d) / denom;
    let p1 = l1.evaluate(t1);
    let p2 = l2.evaluate(t2);
    Some((p1, t1, p2, t2, p1.distance_to(&p2)))
}

// ─── Ray casts ──────────────────────────────────────────────────────────────

pub fn ray_plane(ray: &Ray, plane: &Plane) -> Option<RaySurfaceHit> {
    let denom = ray.direction.dot(&plane.normal);
    if denom.abs() < 1e-15 {
        return None;
    }
    let t = (plane.origin - ray.origin).dot(&plane.normal) / denom;
    if t < 0.0 {
        return None;
    }
    Some(RaySurfaceHit { point: ray.at(t), t })
}

pub fn ray_sphere(ray: &Ray, sphere: &Sphere) -> Vec<RaySurfaceHit> {
    let oc = ray.origin - sphere.center;
    let a = ray.direction.dot(&ray.direction);
    let b = 2.0 * oc.dot(&ray.direction);
    let c = oc.dot(&oc) - sphere.radius * sphere.radius;
    sorted_hits(ray, solve_quadratic(a, b, c))
}

/// Ray against the infinite cylinder.
pub fn ray_cylinder(ray: &Ray, cyl: &Cylinder) -> Vec<RaySurfaceHit> {
    let oc = ray.origin - cyl.origin;
    let d_proj = ray.direction - cyl.axis * ray.direction.dot(&cyl.axis);
    let oc_proj = oc - cyl.axis * oc.dot(&cyl.axis);

    let a = d_proj.dot(&d_proj);
    if a < 1e-15 {
        // Ray parallel to the axis never crosses the wall.
        return vec![];
    }
    let b = 2.0 * d_proj.dot(&oc_proj);
    let c = oc_proj.dot(&oc_proj) - cyl.radius * cyl.radius;
    sorted_hits(ray, solve_quadratic(a, b, c))
}

/// Ray against the infinite double cone:
/// `((P - apex)·axis)² = |P - apex|² cos²(half_angle)`.
pub fn ray_cone(ray: &Ray, cone: &Cone) -> Vec<RaySurfaceHit> {
    let co = ray.origin - cone.apex;
    let cos2 = cone.half_angle.cos().powi(2);
    let d_dot_a = ray.direction.dot(&cone.axis);
    let co_dot_a = co.dot(&cone.axis);

    let a = d_dot_a * d_dot_a - cos2 * ray.direction.dot(&ray.direction);
    let b = 2.0 * (d_dot_a * co_dot_a - cos2 * co.dot(&ray.direction));
    let c = co_dot_a * co_dot_a - cos2 * co.dot(&co);
    sorted_hits(ray, solve_quadratic(a, b, c))
}

/// Ray against a torus by solving the quartic in the torus local frame,
/// where `(x² + y² + z² + R² - r²)² = 4R²(x² + y²)`.
pub fn ray_torus(ray: &Ray, torus: &Torus) -> Vec<RaySurfaceHit> {
    let (x_axis, y_axis) = torus.frame();
    let rel = ray.origin - torus.center;
    let (ox, oy, oz) = (rel.dot(&x_axis), rel.dot(&y_axis), rel.dot(&torus.axis));
    let (dx, dy, dz) = (
        ray.direction.dot(&x_axis),
        ray.direction.dot(&y_axis),
        ray.direction.dot(&torus.axis),
    );

    let sum_d2 = dx * dx + dy * dy + dz * dz;
    let sum_od = ox * dx + oy * dy + oz * dz;
    let sum_o2 = ox * ox + oy * oy + oz * oz;
    let r2 = torus.major_radius * torus.major_radius;
    let s2 = torus.minor_radius * torus.minor_radius;
    let k = sum_o2 - r2 - s2;

    let a4 = sum_d2 * sum_d2;
    let a3 = 4.0 * sum_d2 * sum_od;
    let a2 = 2.0 * sum_d2 * k + 4.0 * sum_od * sum_od + 4.0 * r2 * dz * dz;
    let a1 = 4.0 * k * sum_od + 8.0 * r2 * oz * dz;
    let a0 = k * k - 4.0 * r2 * (s2 - oz * oz);

    sorted_hits(ray, solve_quartic(a4, a3, a2, a1, a0))
}

/// Slab test. Returns the entry parameter, clamped to 0 for rays starting inside.
pub fn ray_aabb(ray: &Ray, bbox: &BoundingBox) -> Option<f64> {
    if !bbox.is_valid() {
        return None;
    }
    let mut tmin = f64::NEG_INFINITY;
    let mut tmax = f64::INFINITY;
    let origin = ray.origin.to_array();
    let dir = ray.direction.to_array();
    let min = bbox.min.to_array();
    let max = bbox.max.to_array();

    for i in 0..3 {
        if dir[i].abs() < 1e-15 {
            if origin[i] < min[i] || origin[i] > max[i] {
                return None;
            }
        } else {
            let inv_d = 1.0 / dir[i];
            let mut t0 = (min[i] - origin[i]) * inv_d;
            let mut t1 = (max[i] - origin[i]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmax < tmin {
                return None;
            }
        }
    }
    if tmax < 0.0 { None } else { Some(tmin.max(0.0)) }
}

/// All crossings of `ray` with `surface` for `t` in `[0, t_max]`.
///
/// Quadrics are solved in closed form. Other surfaces are sampled along the
/// ray on the signed normal distance, then each sign change is bisected and
/// kept only if the refined point lies on the surface.
pub fn ray_surface(
    ray: &Ray,
    surface: &Surface,
    t_max: f64,
    hint: Option<&UvBox>,
    samples: usize,
    max_iterations: usize,
) -> Vec<RaySurfaceHit> {
    let mut hits = match surface {
        Surface::Plane(p) => ray_plane(ray, p).into_iter().collect(),
        Surface::Sphere(s) => ray_sphere(ray, s),
        Surface::Cylinder(c) => ray_cylinder(ray, c),
        Surface::Cone(c) => ray_cone(ray, c),
        Surface::Torus(t) => ray_torus(ray, t),
        _ => ray_surface_numeric(ray, surface, t_max, hint, samples.max(8), max_iterations),
    };
    hits.retain(|h| h.t <= t_max);
    hits
}

fn ray_surface_numeric(
    ray: &Ray,
    surface: &Surface,
    t_max: f64,
    hint: Option<&UvBox>,
    samples: usize,
    max_iterations: usize,
) -> Vec<RaySurfaceHit> {
    let signed = |t: f64| {
        let p = ray.at(t);
        let uv = surface.project(&p, hint, max_iterations);
        (p - surface.evaluate_uv(&uv)).dot(&surface.normal_at(uv.x, uv.y))
    };
    let on_surface_tol = 1e-7 * (1.0 + t_max);
    let mut ts = Vec::new();
    let mut t_prev = 0.0;
    let mut f_prev = signed(0.0);
    for i in 1..=samples {
        let t = t_max * i as f64 / samples as f64;
        let f = signed(t);
        if (f < 0.0) != (f_prev < 0.0) {
            let root = bisect(t_prev, t, &signed, 60);
            let p = ray.at(root);
            if surface.distance_to(&p, hint, max_iterations) < on_surface_tol {
                ts.push(root);
            }
        }
        t_prev = t;
        f_prev = f;
    }
    sorted_hits(ray, ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::curves::Curve;
    use crate::geometry::surfaces::ExtrusionSurface;
    use crate::geometry::vector::Vec3;
    use crate::geometry::curves::Circle3d;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn test_line_line_closest() {
        let l1 = Line3d::new(Point3d::ORIGIN, Vec3::X);
        let l2 = Line3d::new(Point3d::new(0.0, 0.0, 5.0), Vec3::Y);
        let (_, t1, _, t2, d) = line_line_closest(&l1, &l2).unwrap();
        assert!(t1.abs() < 1e-12 && t2.abs() < 1e-12);
        assert!((d - 5.0).abs() < 1e-12);
        let l3 = Line3d::new(Point3d::new(0.0, 1.0, 0.0), Vec3::X);
        assert!(line_line_closest(&l1, &l3).is_none());
    }

    #[test]
    fn test_ray_plane() {
        let ray = Ray::new(Point3d::new(0.0, 0.0, 10.0), -Vec3::Z);
        let hit = ray_plane(&ray, &Plane::xy()).unwrap();
        assert!((hit.t - 10.0).abs() < 1e-12);
        let away = Ray::new(Point3d::new(0.0, 0.0, 10.0), Vec3::Z);
        assert!(ray_plane(&away, &Plane::xy()).is_none());
    }

    #[test]
    fn test_ray_sphere() {
        let ray = Ray::new(Point3d::new(0.0, 0.0, 10.0), -Vec3::Z);
        let hits = ray_sphere(&ray, &Sphere::new(Point3d::ORIGIN, 1.0));
        assert_eq!(hits.len(), 2);
        assert!((hits[0].point.z - 1.0).abs() < 1e-10);
        assert!((hits[1].point.z + 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_ray_cylinder_from_inside() {
        let ray = Ray::new(Point3d::ORIGIN, Vec3::X);
        let hits = ray_cylinder(&ray, &Cylinder::new(Point3d::ORIGIN, Vec3::Z, 3.0));
        assert_eq!(hits.len(), 1);
        assert!((hits[0].t - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_ray_cone_double_nappe() {
        let cone = Cone::new(Point3d::new(0.0, 0.0, 5.0), Vec3::Z, FRAC_PI_4);
        let ray = Ray::new(Point3d::new(1.0, 0.0, -10.0), Vec3::Z);
        let hits = ray_cone(&ray, &cone);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].point.z - 4.0).abs() < 1e-6);
        assert!((hits[1].point.z - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_ray_torus_four_hits() {
        let torus = Torus::new(Point3d::new(10.0, 0.0, 0.0), Vec3::Z, 3.0, 0.5);
        let hits = ray_torus(&Ray::new(Point3d::ORIGIN, Vec3::X), &torus);
        assert_eq!(hits.len(), 4);
        for (hit, x) in hits.iter().zip([6.5, 7.5, 12.5, 13.5]) {
            assert!((hit.point.x - x).abs() < 1e-6, "{} vs {}", hit.point.x, x);
        }
    }

    #[test]
    fn test_ray_aabb() {
        let bb = BoundingBox::new(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let hit = ray_aabb(&Ray::new(Point3d::new(-5.0, 0.5, 0.5), Vec3::X), &bb);
        assert!((hit.unwrap() - 5.0).abs() < 1e-10);
        assert!(ray_aabb(&Ray::new(Point3d::new(-5.0, 5.0, 5.0), Vec3::X), &bb).is_none());
    }

    #[test]
    fn test_numeric_ray_against_extruded_circle() {
        let circle = Curve::Circle(Circle3d::new(Point3d::ORIGIN, Vec3::Z, 2.0));
        let surface = Surface::Extrusion(ExtrusionSurface::new(circle, Vec3::Z));
        let hint = UvBox::new(0.0, std::f64::consts::TAU, -1.0, 1.0);
        let ray = Ray::new(Point3d::new(-5.0, 0.1, 0.0), Vec3::X);
        let hits = ray_surface(&ray, &surface, 10.0, Some(&hint), 64, 30);
        assert_eq!(hits.len(), 2);
        let expected = (4.0f64 - 0.01).sqrt();
        assert!((hits[0].point.x + expected).abs() < 1e-6);
        assert!((hits[1].point.x - expected).abs() < 1e-6);
    }
}
