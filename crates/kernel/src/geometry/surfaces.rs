use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};

use super::bounds::UvBox;
use super::curves::Curve;
use super::nurbs::NurbsSurface;
use super::point::{Point2d, Point3d};
use super::vector::Vec3;

/// All surface types supported by the kernel.
///
/// The parametrization of every variant is right-handed: `∂u × ∂v` is the
/// surface normal. Face orientation is expressed on top of that normal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Surface {
    Plane(Plane),
    Cylinder(Cylinder),
    Cone(Cone),
    Sphere(Sphere),
    Torus(Torus),
    Nurbs(NurbsSurface),
    Revolution(RevolutionSurface),
    Extrusion(ExtrusionSurface),
    Offset(OffsetSurface),
}

/// An infinite plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Plane {
    pub origin: Point3d,
    pub normal: Vec3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl Plane {
    pub fn new(origin: Point3d, normal: Vec3) -> Self {
        let normal = normal.normalize();
        let u_axis = normal.any_perpendicular();
        let v_axis = normal.cross(&u_axis);
        Self {
            origin,
            normal,
            u_axis,
            v_axis,
        }
    }

    pub fn xy() -> Self {
        Self {
            origin: Point3d::ORIGIN,
            normal: Vec3::Z,
            u_axis: Vec3::X,
            v_axis: Vec3::Y,
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin + self.u_axis * u + self.v_axis * v
    }

    /// Signed distance along the plane normal.
    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        (*p - self.origin).dot(&self.normal)
    }

    pub fn project_point(&self, p: &Point3d) -> Point3d {
        *p - self.normal * self.distance_to_point(p)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let v = *p - self.origin;
        (v.dot(&self.u_axis), v.dot(&self.v_axis))
    }
}

/// A cylinder surface, infinite along its axis. `u` is the angle from
/// `ref_dir`, `v` the height along `axis`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cylinder {
    pub origin: Point3d,
    pub axis: Vec3,
    pub radius: f64,
    pub ref_dir: Vec3,
}

impl Cylinder {
    pub fn new(origin: Point3d, axis: Vec3, radius: f64) -> Self {
        let axis = axis.normalize();
        Self {
            origin,
            axis,
            radius,
            ref_dir: axis.any_perpendicular(),
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.cross(&self.ref_dir)
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin
            + self.ref_dir * (self.radius * u.cos())
            + self.y_dir() * (self.radius * u.sin())
            + self.axis * v
    }

    pub fn normal_at(&self, u: f64) -> Vec3 {
        self.ref_dir * u.cos() + self.y_dir() * u.sin()
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let d = *p - self.origin;
        let u = d.dot(&self.y_dir()).atan2(d.dot(&self.ref_dir));
        (wrap_angle(u), d.dot(&self.axis))
    }
}

/// A cone surface. `u` is the angle, `v` the distance from the apex along the axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cone {
    pub apex: Point3d,
    pub axis: Vec3,
    pub half_angle: f64,
    pub ref_dir: Vec3,
}

impl Cone {
    pub fn new(apex: Point3d, axis: Vec3, half_angle: f64) -> Self {
        let axis = axis.normalize();
        Self {
            apex,
            axis,
            half_angle,
            ref_dir: axis.any_perpendicular(),
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.cross(&self.ref_dir)
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let r = v * self.half_angle.tan();
        self.apex + self.axis * v + self.ref_dir * (r * u.cos()) + self.y_dir() * (r * u.sin())
    }

    pub fn normal_at(&self, u: f64) -> Vec3 {
        let radial = self.ref_dir * u.cos() + self.y_dir() * u.sin();
        (radial * self.half_angle.cos() - self.axis * self.half_angle.sin()).normalize()
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let d = *p - self.apex;
        let u = wrap_angle(d.dot(&self.y_dir()).atan2(d.dot(&self.ref_dir)));
        let radial = self.ref_dir * u.cos() + self.y_dir() * u.sin();
        // Closest point on the generator line through angle u.
        let generator = (self.axis + radial * self.half_angle.tan()).normalize();
        let s = d.dot(&generator);
        (u, s * self.half_angle.cos())
    }
}

/// A sphere with world-aligned poles. `u` is the longitude, `v` the latitude.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point3d,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: Point3d, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let cos_v = v.cos();
        Point3d::new(
            self.center.x + self.radius * cos_v * u.cos(),
            self.center.y + self.radius * cos_v * u.sin(),
            self.center.z + self.radius * v.sin(),
        )
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let d = *p - self.center;
        let len = d.length();
        if len < 1e-300 {
            return (0.0, 0.0);
        }
        let u = wrap_angle(d.y.atan2(d.x));
        let v = (d.z / len).clamp(-1.0, 1.0).asin();
        (u, v)
    }
}

/// A torus. `u` is the angle around the axis, `v` the angle around the tube.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Torus {
    pub center: Point3d,
    pub axis: Vec3,
    pub major_radius: f64,
    pub minor_radius: f64,
}

impl Torus {
    pub fn new(center: Point3d, axis: Vec3, major_radius: f64, minor_radius: f64) -> Self {
        Self {
            center,
            axis: axis.normalize(),
            major_radius,
            minor_radius,
        }
    }

    /// `(ref_dir, y_dir)` of the equatorial frame.
    pub fn frame(&self) -> (Vec3, Vec3) {
        let ref_dir = self.axis.any_perpendicular();
        (ref_dir, self.axis.cross(&ref_dir))
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let (ref_dir, y_dir) = self.frame();
        let radial = ref_dir * u.cos() + y_dir * u.sin();
        self.center
            + radial * (self.major_radius + self.minor_radius * v.cos())
            + self.axis * (self.minor_radius * v.sin())
    }

    pub fn normal_at(&self, u: f64, v: f64) -> Vec3 {
        let (ref_dir, y_dir) = self.frame();
        let radial = ref_dir * u.cos() + y_dir * u.sin();
        radial * v.cos() + self.axis * v.sin()
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let (ref_dir, y_dir) = self.frame();
        let d = *p - self.center;
        let u = wrap_angle(d.dot(&y_dir).atan2(d.dot(&ref_dir)));
        let h = d.dot(&self.axis);
        let rho = (d - self.axis * h).length() - self.major_radius;
        (u, wrap_angle(h.atan2(rho)))
    }
}

/// Surface swept by rotating `curve` about the axis through `origin`.
/// `u` is the rotation angle, `v` the curve parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevolutionSurface {
    pub curve: Box<Curve>,
    pub origin: Point3d,
    pub axis: Vec3,
}

impl RevolutionSurface {
    pub fn new(curve: Curve, origin: Point3d, axis: Vec3) -> Self {
        Self {
            curve: Box::new(curve),
            origin,
            axis: axis.normalize(),
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        // Rodrigues rotation of the profile point.
        let r = self.curve.evaluate(v) - self.origin;
        let k = self.axis;
        let rotated = r * u.cos() + k.cross(&r) * u.sin() + k * (k.dot(&r) * (1.0 - u.cos()));
        self.origin + rotated
    }
}

/// Surface swept by translating `curve` along `direction`.
/// `u` is the curve parameter, `v` the distance along the unit direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtrusionSurface {
    pub curve: Box<Curve>,
    pub direction: Vec3,
}

impl ExtrusionSurface {
    pub fn new(curve: Curve, direction: Vec3) -> Self {
        Self {
            curve: Box::new(curve),
            direction: direction.normalize(),
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.curve.evaluate(u) + self.direction * v
    }
}

/// Surface at constant signed distance along the normal of `basis`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetSurface {
    pub basis: Box<Surface>,
    pub distance: f64,
}

impl OffsetSurface {
    pub fn new(basis: Surface, distance: f64) -> Self {
        Self {
            basis: Box::new(basis),
            distance,
        }
    }
}

/// Normalize an angle into `[0, 2π)`.
pub fn wrap_angle(a: f64) -> f64 {
    let w = a.rem_euclid(TAU);
    if w >= TAU { 0.0 } else { w }
}

/// Shift `value` by whole periods so that it lands as close as possible to `reference`.
pub fn unwrap_near(value: f64, reference: f64, period: f64) -> f64 {
    value + ((reference - value) / period).round() * period
}

impl Surface {
    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        match self {
            Surface::Plane(p) => p.evaluate(u, v),
            Surface::Cylinder(c) => c.evaluate(u, v),
            Surface::Cone(c) => c.evaluate(u, v),
            Surface::Sphere(s) => s.evaluate(u, v),
            Surface::Torus(t) => t.evaluate(u, v),
            Surface::Nurbs(n) => n.evaluate(u, v),
            Surface::Revolution(r) => r.evaluate(u, v),
            Surface::Extrusion(e) => e.evaluate(u, v),
            Surface::Offset(o) => {
                o.basis.evaluate(u, v) + o.basis.normal_at(u, v) * o.distance
            }
        }
    }

    pub fn evaluate_uv(&self, uv: &Point2d) -> Point3d {
        self.evaluate(uv.x, uv.y)
    }

    /// First partial derivatives `(∂S/∂u, ∂S/∂v)`.
    pub fn partials(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        match self {
            Surface::Plane(p) => (p.u_axis, p.v_axis),
            Surface::Cylinder(c) => {
                let y = c.y_dir();
                (
                    (c.ref_dir * (-u.sin()) + y * u.cos()) * c.radius,
                    c.axis,
                )
            }
            Surface::Sphere(s) => {
                let (su, cu, sv, cv) = (u.sin(), u.cos(), v.sin(), v.cos());
                (
                    Vec3::new(-cv * su, cv * cu, 0.0) * s.radius,
                    Vec3::new(-sv * cu, -sv * su, cv) * s.radius,
                )
            }
            _ => {
                let h = 1e-6;
                let du = (self.evaluate(u + h, v) - self.evaluate(u - h, v)) / (2.0 * h);
                let dv = (self.evaluate(u, v + h) - self.evaluate(u, v - h)) / (2.0 * h);
                (du, dv)
            }
        }
    }

    /// Unit normal `∂u × ∂v`, with analytic forms where the cross product degenerates.
    pub fn normal_at(&self, u: f64, v: f64) -> Vec3 {
        match self {
            Surface::Plane(p) => p.normal,
            Surface::Cylinder(c) => c.normal_at(u),
            Surface::Cone(c) => c.normal_at(u),
            Surface::Sphere(s) => (s.evaluate(u, v) - s.center).normalize(),
            Surface::Torus(t) => t.normal_at(u, v),
            Surface::Offset(o) => o.basis.normal_at(u, v),
            _ => {
                let (du, dv) = self.partials(u, v);
                match du.cross(&dv).normalized() {
                    Some(n) => n,
                    None => {
                        // Singular point: nudge into the interior.
                        let (du, dv) = self.partials(u + 1e-5, v + 1e-5);
                        du.cross(&dv).normalize()
                    }
                }
            }
        }
    }

    pub fn u_period(&self) -> Option<f64> {
        match self {
            Surface::Cylinder(_) | Surface::Cone(_) | Surface::Sphere(_) | Surface::Torus(_) => Some(TAU),
            Surface::Revolution(_) => Some(TAU),
            Surface::Extrusion(e) => e.curve.period(),
            Surface::Offset(o) => o.basis.u_period(),
            _ => None,
        }
    }

    pub fn v_period(&self) -> Option<f64> {
        match self {
            Surface::Torus(_) => Some(TAU),
            Surface::Revolution(r) => r.curve.period(),
            Surface::Offset(o) => o.basis.v_period(),
            _ => None,
        }
    }

    /// Parameter box outside which the surface is undefined, if bounded.
    pub fn natural_domain(&self) -> Option<UvBox> {
        match self {
            Surface::Nurbs(n) => {
                let (u0, u1) = n.domain_u();
                let (v0, v1) = n.domain_v();
                Some(UvBox::new(u0, u1, v0, v1))
            }
            Surface::Sphere(_) => Some(UvBox::new(0.0, TAU, -FRAC_PI_2, FRAC_PI_2)),
            Surface::Offset(o) => o.basis.natural_domain(),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Surface::Plane(p) => p.origin.is_finite() && (p.normal.length() - 1.0).abs() < 1e-6,
            Surface::Cylinder(c) => c.radius > 0.0 && c.origin.is_finite(),
            Surface::Cone(c) => c.half_angle > 0.0 && c.half_angle < FRAC_PI_2 && c.apex.is_finite(),
            Surface::Sphere(s) => s.radius > 0.0 && s.center.is_finite(),
            Surface::Torus(t) => t.minor_radius > 0.0 && t.major_radius > t.minor_radius,
            Surface::Nurbs(n) => n.is_valid(),
            Surface::Revolution(r) => r.curve.is_valid() && r.axis.length() > 0.5,
            Surface::Extrusion(e) => e.curve.is_valid() && e.direction.length() > 0.5,
            Surface::Offset(o) => o.basis.is_valid() && o.distance.is_finite(),
        }
    }

    pub fn as_plane(&self) -> Option<&Plane> {
        match self {
            Surface::Plane(p) => Some(p),
            _ => None,
        }
    }

    /// Parameters of the closest surface point to `p`.
    ///
    /// Analytic surfaces return canonical angles in `[0, 2π)`; callers that
    /// need a particular period unwrap with [`Surface::unwrap_to`]. `hint`
    /// bounds the seed search of the numeric projection.
    pub fn project(&self, p: &Point3d, hint: Option<&UvBox>, max_iterations: usize) -> Point2d {
        let (u, v) = match self {
            Surface::Plane(pl) => pl.parameters_of(p),
            Surface::Cylinder(c) => c.parameters_of(p),
            Surface::Cone(c) => c.parameters_of(p),
            Surface::Sphere(s) => s.parameters_of(p),
            Surface::Torus(t) => t.parameters_of(p),
            Surface::Offset(o) => {
                let uv = o.basis.project(p, hint, max_iterations);
                (uv.x, uv.y)
            }
            _ => {
                let uv = self.project_numeric(p, hint, max_iterations);
                (uv.x, uv.y)
            }
        };
        Point2d::new(u, v)
    }

    /// Shift periodic parameters of `uv` to the period nearest `reference`.
    pub fn unwrap_to(&self, uv: Point2d, reference: &Point2d) -> Point2d {
        let u = match self.u_period() {
            Some(p) => unwrap_near(uv.x, reference.x, p),
            None => uv.x,
        };
        let v = match self.v_period() {
            Some(p) => unwrap_near(uv.y, reference.y, p),
            None => uv.y,
        };
        Point2d::new(u, v)
    }

    fn seed_box(&self, p: &Point3d, hint: Option<&UvBox>) -> UvBox {
        if let Some(h) = hint.filter(|h| h.is_valid()) {
            return *h;
        }
        if let Some(d) = self.natural_domain() {
            return d;
        }
        match self {
            Surface::Revolution(r) => {
                let (v0, v1) = r.curve.natural_domain().unwrap_or((-100.0, 100.0));
                UvBox::new(0.0, TAU, v0, v1)
            }
            Surface::Extrusion(e) => {
                let (u0, u1) = e
                    .curve
                    .natural_domain()
                    .or_else(|| e.curve.period().map(|per| (0.0, per)))
                    .unwrap_or((-100.0, 100.0));
                let mid = e.curve.evaluate(0.5 * (u0 + u1));
                let v = (*p - mid).dot(&e.direction);
                UvBox::new(u0, u1, v - 100.0, v + 100.0)
            }
            _ => UvBox::new(-100.0, 100.0, -100.0, 100.0),
        }
    }

    /// Grid seed followed by Gauss–Newton on `|S(u, v) - p|²`.
    fn project_numeric(&self, p: &Point3d, hint: Option<&UvBox>, max_iterations: usize) -> Point2d {
        let bx = self.seed_box(p, hint);
        let clamp_box = self.natural_domain();
        let n = 12;
        let mut best = bx.center();
        let mut best_d = f64::INFINITY;
        for i in 0..=n {
            for j in 0..=n {
                let uv = bx.at(i as f64 / n as f64, j as f64 / n as f64);
                let d = self.evaluate_uv(&uv).distance_squared_to(p);
                if d < best_d {
                    best_d = d;
                    best = uv;
                }
            }
        }
        let mut uv = best;
        for _ in 0..max_iterations {
            let s = self.evaluate_uv(&uv);
            let (su, sv) = self.partials(uv.x, uv.y);
            let r = s - *p;
            let jtj = Matrix2::new(su.dot(&su), su.dot(&sv), su.dot(&sv), sv.dot(&sv));
            let g = Vector2::new(su.dot(&r), sv.dot(&r));
            let Some(delta) = jtj.lu().solve(&(-g)) else {
                break;
            };
            let mut next = uv.offset(delta.x, delta.y);
            if let Some(c) = clamp_box {
                next.x = next.x.clamp(c.u_min, c.u_max);
                next.y = next.y.clamp(c.v_min, c.v_max);
            }
            let moved = next.distance_to(&uv);
            uv = next;
            if moved < 1e-13 * (1.0 + bx.diagonal()) {
                break;
            }
        }
        if self.evaluate_uv(&uv).distance_squared_to(p) <= best_d { uv } else { best }
    }

    /// Distance from `p` to the untrimmed surface.
    pub fn distance_to(&self, p: &Point3d, hint: Option<&UvBox>, max_iterations: usize) -> f64 {
        match self {
            Surface::Plane(pl) => pl.distance_to_point(p).abs(),
            _ => {
                let uv = self.project(p, hint, max_iterations);
                self.evaluate_uv(&uv).distance_to(p)
            }
        }
    }

    pub fn surface_type_name(&self) -> &'static str {
        match self {
            Surface::Plane(_) => "Plane",
            Surface::Cylinder(_) => "Cylinder",
            Surface::Cone(_) => "Cone",
            Surface::Sphere(_) => "Sphere",
            Surface::Torus(_) => "Torus",
            Surface::Nurbs(_) => "Nurbs",
            Surface::Revolution(_) => "Revolution",
            Surface::Extrusion(_) => "Extrusion",
            Surface::Offset(_) => "Offset",
        }
    }
}
