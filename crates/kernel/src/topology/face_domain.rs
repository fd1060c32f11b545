//! Parameter-space description of a trimmed face.
//!
//! Each wire of a face is sampled along its edges, projected onto the face
//! surface and unwrapped so that consecutive samples stay in the same period.
//! The resulting polygons drive point containment, interior probing and the
//! face splitter.

use crate::geometry::bounds::{BoundingBox, UvBox};
use crate::geometry::curves::Curve;
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::surfaces::Surface;

use super::explore::wire_edges;
use super::shape::{Orientation, ShapeId, ShapeStore, TopologyError};

/// Where a point lies relative to a trimmed face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainPosition {
    Inside,
    Outside,
    OnBoundary,
}

/// One oriented occurrence of an edge in a face wire.
#[derive(Debug, Clone)]
pub struct EdgeUse {
    pub edge: ShapeId,
    pub orientation: Orientation,
    pub curve: Curve,
    pub range: (f64, f64),
    /// Curve parameters in traversal order.
    pub params: Vec<f64>,
    /// Unwrapped parameter-space samples, parallel to `params`.
    pub uv: Vec<Point2d>,
    pub points: Vec<Point3d>,
    pub bbox: BoundingBox,
}

impl EdgeUse {
    pub fn first_uv(&self) -> Point2d {
        self.uv.first().copied().unwrap_or(Point2d::ORIGIN)
    }

    pub fn last_uv(&self) -> Point2d {
        self.uv.last().copied().unwrap_or(Point2d::ORIGIN)
    }

    /// Parameter-space position of curve parameter `t` along this occurrence,
    /// in the same period as the sampled polygon.
    pub fn uv_at(&self, surface: &Surface, t: f64, max_iterations: usize) -> Point2d {
        let guess = self.interpolate(t);
        let p = self.curve.evaluate(t);
        let hint = UvBox::from_points(self.uv.iter()).enlarged(1e-3, 1e-3);
        let uv = surface.project(&p, Some(&hint), max_iterations);
        surface.unwrap_to(uv, &guess)
    }

    fn interpolate(&self, t: f64) -> Point2d {
        let n = self.params.len();
        if n == 0 {
            return Point2d::ORIGIN;
        }
        for i in 0..n.saturating_sub(1) {
            let (a, b) = (self.params[i], self.params[i + 1]);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if t >= lo - 1e-12 && t <= hi + 1e-12 {
                let span = b - a;
                let f = if span.abs() < 1e-300 { 0.0 } else { (t - a) / span };
                return self.uv[i].lerp(&self.uv[i + 1], f.clamp(0.0, 1.0));
            }
        }
        // Outside the sampled range: nearest end.
        if (t - self.params[0]).abs() <= (t - self.params[n - 1]).abs() {
            self.uv[0]
        } else {
            self.uv[n - 1]
        }
    }

    /// Distance from `p` to the edge curve restricted to its range.
    pub fn distance_to(&self, p: &Point3d, max_iterations: usize) -> f64 {
        self.curve.project(p, self.range, max_iterations).distance
    }

    /// Slack to add to `bbox` so that the sampled box covers the true curve.
    fn sag(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .fold(0.0, f64::max)
            * 0.25
    }
}

/// A closed boundary loop in parameter space.
#[derive(Debug, Clone)]
pub struct UvLoop {
    pub wire: ShapeId,
    pub uses: Vec<EdgeUse>,
    pub polygon: Vec<Point2d>,
}

impl UvLoop {
    /// Shoelace area; positive for counter-clockwise loops.
    pub fn signed_area(&self) -> f64 {
        polygon_area(&self.polygon)
    }
}

/// Trimmed parameter domain of a face.
#[derive(Debug, Clone)]
pub struct FaceDomain {
    pub face: ShapeId,
    pub surface: Surface,
    pub loops: Vec<UvLoop>,
    pub bbox: UvBox,
    pub tolerance: f64,
    max_iterations: usize,
}

impl FaceDomain {
    /// Sample and unwrap every wire of `face`. `samples` is the base sample
    /// count handed to [`Curve::sample_count`].
    pub fn build(store: &ShapeStore, face: ShapeId, samples: usize, max_iterations: usize) -> Result<Self, TopologyError> {
        let surface = store.face_surface(face)?.clone();
        let tolerance = store.tolerance(face)?;
        let mut loops = Vec::new();
        let mut anchor: Option<Point2d> = None;

        for wire_ref in store.children(face)? {
            let mut uses = Vec::new();
            let mut prev: Option<Point2d> = None;
            for edge in wire_edges(store, wire_ref.id, wire_ref.orientation)? {
                let (curve, range) = store.edge_curve(edge.id)?;
                let n = curve.sample_count(range, samples);
                let mut samples_fwd = curve.sample(range, n);
                if edge.orientation.is_reversed() {
                    samples_fwd.reverse();
                }
                let mut params = Vec::with_capacity(samples_fwd.len());
                let mut uv = Vec::with_capacity(samples_fwd.len());
                let mut points = Vec::with_capacity(samples_fwd.len());
                for (t, p) in samples_fwd {
                    let raw = surface.project(&p, None, max_iterations);
                    let reference = match (prev, anchor) {
                        (Some(r), _) => Some(r),
                        // A new wire starts in the period of the outer loop.
                        (None, Some(a)) => Some(a),
                        (None, None) => None,
                    };
                    let q = match reference {
                        Some(r) => surface.unwrap_to(raw, &r),
                        None => raw,
                    };
                    prev = Some(q);
                    params.push(t);
                    uv.push(q);
                    points.push(p);
                }
                let bbox = BoundingBox::from_points(&points);
                uses.push(EdgeUse {
                    edge: edge.id,
                    orientation: edge.orientation,
                    curve: curve.clone(),
                    range,
                    params,
                    uv,
                    points,
                    bbox,
                });
            }
            let polygon = loop_polygon(&uses);
            if anchor.is_none() {
                anchor = Some(UvBox::from_points(polygon.iter()).center());
            }
            loops.push(UvLoop {
                wire: wire_ref.id,
                uses,
                polygon,
            });
        }

        let bbox = UvBox::from_points(loops.iter().flat_map(|l| l.polygon.iter()));
        Ok(Self {
            face,
            surface,
            loops,
            bbox,
            tolerance,
            max_iterations,
        })
    }

    pub fn edge_uses(&self) -> impl Iterator<Item = &EdgeUse> {
        self.loops.iter().flat_map(|l| l.uses.iter())
    }

    /// Winding-number containment of a parameter point, trying the periodic
    /// images of `uv` that fall inside the domain box.
    pub fn contains_uv(&self, uv: &Point2d) -> bool {
        self.periodic_images(uv).iter().any(|q| {
            self.loops.iter().map(|l| winding_number(&l.polygon, q)).sum::<i32>() != 0
        })
    }

    fn periodic_images(&self, uv: &Point2d) -> Vec<Point2d> {
        let shifts = |period: Option<f64>| -> Vec<f64> {
            match period {
                Some(p) => vec![0.0, -p, p],
                None => vec![0.0],
            }
        };
        let margin = 1e-9 * (1.0 + self.bbox.diagonal());
        let mut out = Vec::new();
        for du in shifts(self.surface.u_period()) {
            for dv in shifts(self.surface.v_period()) {
                let q = uv.offset(du, dv);
                if self.bbox.contains(&q, margin) {
                    out.push(q);
                }
            }
        }
        out
    }

    /// Parameter point of the closest surface point to `p`, shifted into the
    /// domain box when the surface is periodic.
    pub fn project(&self, p: &Point3d) -> Point2d {
        let uv = self.surface.project(p, Some(&self.bbox), self.max_iterations);
        let centered = self.surface.unwrap_to(uv, &self.bbox.center());
        self.periodic_images(&centered).first().copied().unwrap_or(centered)
    }

    /// Whether `p` lies on the face boundary within `tol`.
    pub fn on_boundary(&self, p: &Point3d, tol: f64) -> bool {
        self.edge_uses().any(|u| {
            u.bbox.enlarged(tol + u.sag()).contains_point(p) && u.distance_to(p, self.max_iterations) <= tol
        })
    }

    /// Position of a 3D point assumed to lie on the surface.
    pub fn classify_point(&self, p: &Point3d, tol: f64) -> DomainPosition {
        if self.on_boundary(p, tol) {
            return DomainPosition::OnBoundary;
        }
        let uv = self.surface.project(p, Some(&self.bbox), self.max_iterations);
        if self.contains_uv(&uv) {
            DomainPosition::Inside
        } else {
            DomainPosition::Outside
        }
    }

    /// Distance from `p` to the trimmed face.
    pub fn face_distance(&self, p: &Point3d) -> f64 {
        let uv = self.surface.project(p, Some(&self.bbox), self.max_iterations);
        if self.contains_uv(&uv) {
            return self.surface.evaluate_uv(&uv).distance_to(p);
        }
        self.edge_uses()
            .map(|u| u.distance_to(p, self.max_iterations))
            .fold(f64::INFINITY, f64::min)
    }

    /// A parameter point well inside the domain: among the midpoints of the
    /// interior spans of a few horizontal scanlines, the one farthest from
    /// every boundary loop. A scanline running along a boundary segment can
    /// put a span midpoint on a vertex; the clearance rules it out.
    pub fn interior_uv(&self) -> Option<Point2d> {
        if !self.bbox.is_valid() {
            return None;
        }
        let mut best: Option<(f64, Point2d)> = None;
        for f in [0.5, 0.31, 0.69, 0.17, 0.83, 0.43, 0.57, 0.11, 0.89] {
            let v = self.bbox.v_min + self.bbox.height() * f;
            let mut xs: Vec<f64> = Vec::new();
            for l in &self.loops {
                scanline_crossings(&l.polygon, v, &mut xs);
            }
            xs.sort_by(f64::total_cmp);
            for pair in xs.chunks_exact(2) {
                let mid = Point2d::new(0.5 * (pair[0] + pair[1]), v);
                let clearance = self.boundary_clearance(&mid);
                if clearance > best.map_or(0.0, |b| b.0) && self.contains_uv(&mid) {
                    best = Some((clearance, mid));
                }
            }
        }
        best.map(|(_, uv)| uv)
    }

    /// Parameter-space distance from `uv` to the nearest boundary segment.
    fn boundary_clearance(&self, uv: &Point2d) -> f64 {
        self.loops
            .iter()
            .flat_map(|l| {
                let n = l.polygon.len();
                (0..n).map(move |i| uv.distance_to_segment(&l.polygon[i], &l.polygon[(i + 1) % n]))
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Interior 3D point of the face with its parameters.
    pub fn interior_point(&self) -> Option<(Point3d, Point2d)> {
        self.interior_uv().map(|uv| (self.surface.evaluate_uv(&uv), uv))
    }
}

fn loop_polygon(uses: &[EdgeUse]) -> Vec<Point2d> {
    let mut polygon: Vec<Point2d> = Vec::new();
    for u in uses {
        for q in &u.uv {
            if polygon.last().is_none_or(|last| last.distance_to(q) > 1e-14) {
                polygon.push(*q);
            }
        }
    }
    if polygon.len() > 1 && polygon[0].distance_to(&polygon[polygon.len() - 1]) < 1e-12 {
        polygon.pop();
    }
    polygon
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(polygon: &[Point2d]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        area += a.x * b.y - b.x * a.y;
    }
    0.5 * area
}

/// Winding number of a closed polygon around `p`.
pub fn winding_number(polygon: &[Point2d], p: &Point2d) -> i32 {
    let n = polygon.len();
    let mut wn = 0;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if a.y <= p.y {
            if b.y > p.y && a.orient(&b, p) > 0.0 {
                wn += 1;
            }
        } else if b.y <= p.y && a.orient(&b, p) < 0.0 {
            wn -= 1;
        }
    }
    wn
}

fn scanline_crossings(polygon: &[Point2d], v: f64, out: &mut Vec<f64>) {
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if (a.y <= v) != (b.y <= v) {
            let f = (v - a.y) / (b.y - a.y);
            out.push(a.x + (b.x - a.x) * f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::vector::Vec3;
    use crate::topology::explore::subshapes;
    use crate::topology::primitives::{make_box, make_cylinder, make_prism};
    use crate::topology::shape::ShapeKind;

    fn domains(store: &ShapeStore, solid: ShapeId) -> Vec<FaceDomain> {
        subshapes(store, solid, ShapeKind::Face)
            .unwrap()
            .into_iter()
            .map(|f| FaceDomain::build(store, f, 16, 20).unwrap())
            .collect()
    }

    #[test]
    fn test_polygon_helpers() {
        let square = vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(1.0, 0.0),
            Point2d::new(1.0, 1.0),
            Point2d::new(0.0, 1.0),
        ];
        assert!((polygon_area(&square) - 1.0).abs() < 1e-12);
        assert_eq!(winding_number(&square, &Point2d::new(0.5, 0.5)), 1);
        assert_eq!(winding_number(&square, &Point2d::new(1.5, 0.5)), 0);
    }

    #[test]
    fn test_box_faces_are_counter_clockwise() {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 2.0, 3.0));
        for d in domains(&store, solid) {
            assert_eq!(d.loops.len(), 1);
            assert!(d.loops[0].signed_area() > 0.0, "face loop must be CCW");
        }
    }

    #[test]
    fn test_box_face_classification() {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let top = domains(&store, solid)
            .into_iter()
            .find(|d| d.surface.as_plane().is_some_and(|p| p.normal.z > 0.9))
            .unwrap();
        assert_eq!(top.classify_point(&Point3d::new(0.5, 0.5, 1.0), 1e-7), DomainPosition::Inside);
        assert_eq!(top.classify_point(&Point3d::new(1.5, 0.5, 1.0), 1e-7), DomainPosition::Outside);
        assert_eq!(top.classify_point(&Point3d::new(1.0, 0.5, 1.0), 1e-7), DomainPosition::OnBoundary);
        assert!((top.face_distance(&Point3d::new(0.5, 0.5, 3.0)) - 2.0).abs() < 1e-9);
        assert!((top.face_distance(&Point3d::new(2.0, 0.5, 1.0)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cylinder_lateral_face_unwraps_across_seam() {
        let mut store = ShapeStore::new();
        let solid = make_cylinder(&mut store, Point3d::ORIGIN, Vec3::Z, 1.0, 2.0);
        let lateral = domains(&store, solid)
            .into_iter()
            .find(|d| matches!(d.surface, Surface::Cylinder(_)))
            .unwrap();
        let area = lateral.loops[0].signed_area();
        assert!((area - 2.0 * std::f64::consts::TAU).abs() < 1e-6, "area {area}");
        let (p, _) = lateral.interior_point().unwrap();
        assert!((p.z - 1.0).abs() < 0.5);
        assert_eq!(lateral.classify_point(&Point3d::new(-1.0, 0.0, 1.0), 1e-7), DomainPosition::Inside);
        assert_eq!(lateral.classify_point(&Point3d::new(-1.0, 0.0, 3.0), 1e-7), DomainPosition::Outside);
    }

    #[test]
    fn test_interior_point_of_planar_face() {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::ORIGIN, Point3d::new(4.0, 4.0, 4.0));
        for d in domains(&store, solid) {
            let (p, uv) = d.interior_point().unwrap();
            assert!(d.contains_uv(&uv));
            assert!(!d.on_boundary(&p, 1e-3));
        }
    }

    #[test]
    fn test_interior_point_avoids_notch_vertex() {
        // L-shaped caps whose notch corner is the centre of their bounding box,
        // once with the missing quadrant below the centre line and once above.
        for profile in [
            [(0.0, 0.0), (0.5, 0.0), (0.5, 0.5), (1.0, 0.5), (1.0, 1.0), (0.0, 1.0)],
            [(0.0, 0.0), (1.0, 0.0), (1.0, 0.5), (0.5, 0.5), (0.5, 1.0), (0.0, 1.0)],
        ] {
            let mut store = ShapeStore::new();
            let points: Vec<Point3d> = profile.iter().map(|(x, y)| Point3d::new(*x, *y, 0.0)).collect();
            let solid = make_prism(&mut store, &points, Vec3::Z);
            for d in domains(&store, solid) {
                let (p, uv) = d.interior_point().unwrap();
                assert!(d.contains_uv(&uv));
                assert!(!d.on_boundary(&p, 0.1), "interior point {p:?} too close to the boundary");
            }
        }
    }
}
