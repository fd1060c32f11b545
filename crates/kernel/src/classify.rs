//! Point and face classification against a reference shape.
//!
//! A point is ON when it lies within tolerance of a face of the reference.
//! Otherwise rays are cast in a fixed sequence of directions and the face
//! crossings are counted. A ray is only trusted when no hit grazes a face,
//! no hit lands on a face boundary and the crossing parity agrees with the
//! signed crossing sum; when every ray is rejected the point is UNKNOWN.

use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::config::BooleanOptions;
use crate::geometry::bounds::BoundingBox;
use crate::geometry::curves::Ray;
use crate::geometry::intersection::{ray_aabb, ray_surface};
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;
use crate::topology::explore::{oriented_subshapes, subshapes};
use crate::topology::face_domain::{DomainPosition, FaceDomain};
use crate::topology::{ShapeId, ShapeKind, ShapeRef, ShapeStore, TopologyError};
use crate::Tolerance;

/// Position of a point relative to a reference shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    In,
    Out,
    On,
    Unknown,
}

/// Position of a face relative to a reference shape. ON is refined by the
/// relative direction of the two effective normals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceState {
    In,
    Out,
    OnSame,
    OnOpposite,
    Unknown,
}

impl FaceState {
    pub fn is_on(self) -> bool {
        matches!(self, FaceState::OnSame | FaceState::OnOpposite)
    }
}

/// Result of classifying one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceClass {
    pub state: FaceState,
    /// Reference face the probe lies on, for ON states.
    pub on_face: Option<ShapeId>,
}

/// Cosine below which a ray is considered to graze a face.
const GRAZE_COSINE: f64 = 1e-3;

/// Well-spread directions without symmetry relative to the coordinate axes.
const RAY_DIRECTIONS: [[f64; 3]; 10] = [
    [0.193, 0.437, 0.878],
    [-0.712, 0.271, 0.648],
    [0.531, -0.809, 0.252],
    [0.374, 0.613, -0.697],
    [-0.483, -0.521, -0.703],
    [0.911, 0.127, -0.392],
    [-0.291, 0.939, 0.167],
    [0.053, -0.331, 0.942],
    [-0.857, -0.409, 0.313],
    [0.617, 0.223, 0.754],
];

struct ReferenceFace {
    face: ShapeRef,
    domain: FaceDomain,
    bbox: BoundingBox,
}

/// Pre-sampled reference shape, reusable for many queries.
pub struct Classifier {
    reference: ShapeId,
    faces: Vec<ReferenceFace>,
    bbox: BoundingBox,
    closed: bool,
    tolerance: f64,
    max_rays: usize,
    samples: usize,
    max_iterations: usize,
}

impl Classifier {
    /// Sample every face of `reference`. Only shapes containing solids are
    /// closed; other references report ON or OUT.
    #[instrument(skip(store, options))]
    pub fn new(store: &ShapeStore, reference: ShapeId, options: &BooleanOptions) -> Result<Self, TopologyError> {
        let closed = !subshapes(store, reference, ShapeKind::Solid)?.is_empty();
        Self::build(store, reference, closed, options)
    }

    /// Classifier treating `shell` as the boundary of a volume. The caller
    /// guarantees the shell is closed.
    pub fn for_closed_shell(store: &ShapeStore, shell: ShapeId, options: &BooleanOptions) -> Result<Self, TopologyError> {
        Self::build(store, shell, true, options)
    }

    fn build(store: &ShapeStore, reference: ShapeId, closed: bool, options: &BooleanOptions) -> Result<Self, TopologyError> {
        let samples = options.curve_samples;
        let max_iterations = options.newton_max_iterations;
        let mut faces: Vec<ReferenceFace> = Vec::new();
        let mut bbox = BoundingBox::empty();
        let mut tolerance = Tolerance::default().coincidence;
        for face in oriented_subshapes(store, ShapeRef::forward(reference), ShapeKind::Face)? {
            if faces.iter().any(|f| f.face.id == face.id) {
                continue;
            }
            let domain = FaceDomain::build(store, face.id, samples, max_iterations)?;
            let mut face_box = BoundingBox::empty();
            for u in domain.edge_uses() {
                face_box.add_box(&u.bbox);
            }
            for uv in sample_grid(&domain) {
                face_box.add_point(&domain.surface.evaluate_uv(&uv));
            }
            let face_box = face_box.enlarged(domain.tolerance);
            tolerance = tolerance.max(domain.tolerance);
            bbox.add_box(&face_box);
            faces.push(ReferenceFace {
                face,
                domain,
                bbox: face_box,
            });
        }
        Ok(Self {
            reference,
            faces,
            bbox,
            closed,
            tolerance: tolerance + options.fuzzy_value,
            max_rays: options.classifier_max_rays.clamp(1, RAY_DIRECTIONS.len()),
            samples,
            max_iterations,
        })
    }

    pub fn reference(&self) -> ShapeId {
        self.reference
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn classify_point(&self, point: &Point3d) -> State {
        self.locate(point, 0.0).0
    }

    /// State of `point` and, when ON, the index of the reference face it lies on.
    fn locate(&self, point: &Point3d, extra_tol: f64) -> (State, Option<usize>) {
        let tol = self.tolerance + extra_tol;
        let on = self
            .faces
            .iter()
            .enumerate()
            .filter(|(_, f)| f.bbox.enlarged(tol).contains_point(point))
            .map(|(i, f)| (i, f.domain.face_distance(point)))
            .filter(|(_, d)| *d <= tol)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((i, _)) = on {
            return (State::On, Some(i));
        }
        if !self.closed || !self.bbox.enlarged(tol).contains_point(point) {
            return (State::Out, None);
        }
        let t_max = point.distance_to(&self.bbox.center()) + self.bbox.diagonal() + 1.0;
        for (attempt, d) in RAY_DIRECTIONS.iter().take(self.max_rays).enumerate() {
            let ray = Ray::new(*point, Vec3::new(d[0], d[1], d[2]));
            match self.cast(&ray, t_max, tol) {
                Some(state) => return (state, None),
                None => trace!(attempt, "inconclusive ray"),
            }
        }
        (State::Unknown, None)
    }

    /// Count face crossings along `ray`; `None` when the ray is inconclusive.
    fn cast(&self, ray: &Ray, t_max: f64, tol: f64) -> Option<State> {
        let mut crossings = 0usize;
        let mut signed = 0i32;
        for f in &self.faces {
            if ray_aabb(ray, &f.bbox.enlarged(tol)).is_none() {
                continue;
            }
            let surface = &f.domain.surface;
            for hit in ray_surface(ray, surface, t_max, Some(&f.domain.bbox), self.samples, self.max_iterations) {
                match f.domain.classify_point(&hit.point, tol) {
                    DomainPosition::Outside => continue,
                    DomainPosition::OnBoundary => return None,
                    DomainPosition::Inside => {}
                }
                let uv = f.domain.project(&hit.point);
                let normal = surface.normal_at(uv.x, uv.y) * f.face.orientation.sign();
                let cos = normal.dot(&ray.direction);
                if cos.abs() < GRAZE_COSINE {
                    return None;
                }
                crossings += 1;
                signed += if cos > 0.0 { 1 } else { -1 };
            }
        }
        match (crossings % 2, signed) {
            (1, 1) => Some(State::In),
            (0, 0) => Some(State::Out),
            _ => None,
        }
    }

    /// Classify `face` (with the orientation it has in its own shape) by an
    /// interior probe point.
    pub fn classify_face(&self, store: &ShapeStore, face: ShapeRef) -> Result<FaceClass, TopologyError> {
        let domain = FaceDomain::build(store, face.id, self.samples, self.max_iterations)?;
        let Some((probe, uv)) = domain.interior_point() else {
            return Ok(FaceClass {
                state: FaceState::Unknown,
                on_face: None,
            });
        };
        let (state, on) = self.locate(&probe, domain.tolerance);
        let state = match (state, on) {
            (State::On, Some(i)) => {
                let other = &self.faces[i];
                let ouv = other.domain.project(&probe);
                let n_other = other.domain.surface.normal_at(ouv.x, ouv.y) * other.face.orientation.sign();
                let n_self = domain.surface.normal_at(uv.x, uv.y) * face.orientation.sign();
                if n_self.dot(&n_other) > 0.0 {
                    FaceState::OnSame
                } else {
                    FaceState::OnOpposite
                }
            }
            (State::In, _) => FaceState::In,
            (State::Out, _) => FaceState::Out,
            _ => FaceState::Unknown,
        };
        Ok(FaceClass {
            state,
            on_face: on.map(|i| self.faces[i].face.id),
        })
    }
}

/// Interior parameter points used to bound curved faces.
fn sample_grid(domain: &FaceDomain) -> Vec<crate::geometry::point::Point2d> {
    if !domain.bbox.is_valid() || domain.surface.as_plane().is_some() {
        return Vec::new();
    }
    let n = 6;
    let mut out = Vec::with_capacity(n * n);
    for i in 0..=n {
        for j in 0..=n {
            let uv = domain.bbox.at(i as f64 / n as f64, j as f64 / n as f64);
            if domain.contains_uv(&uv) {
                out.push(uv);
            }
        }
    }
    out
}

/// State of `point` relative to `reference`.
pub fn classify_point(
    store: &ShapeStore,
    reference: ShapeId,
    point: &Point3d,
    options: &BooleanOptions,
) -> Result<State, TopologyError> {
    Ok(Classifier::new(store, reference, options)?.classify_point(point))
}

/// State of `face` relative to `reference`.
pub fn classify_face(
    store: &ShapeStore,
    face: ShapeRef,
    reference: ShapeId,
    options: &BooleanOptions,
) -> Result<FaceState, TopologyError> {
    Ok(Classifier::new(store, reference, options)?.classify_face(store, face)?.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::primitives::{make_box, make_cylinder};

    fn unit_box(store: &mut ShapeStore) -> ShapeId {
        make_box(store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_classify_point_box() {
        let mut store = ShapeStore::new();
        let solid = unit_box(&mut store);
        let c = Classifier::new(&store, solid, &BooleanOptions::default()).unwrap();
        assert_eq!(c.classify_point(&Point3d::new(0.5, 0.5, 0.5)), State::In);
        assert_eq!(c.classify_point(&Point3d::new(0.1, 0.9, 0.2)), State::In);
        assert_eq!(c.classify_point(&Point3d::new(1.5, 0.5, 0.5)), State::Out);
        assert_eq!(c.classify_point(&Point3d::new(-3.0, 7.0, 2.0)), State::Out);
        assert_eq!(c.classify_point(&Point3d::new(1.0, 0.5, 0.5)), State::On);
        assert_eq!(c.classify_point(&Point3d::new(0.0, 0.0, 0.0)), State::On);
    }

    #[test]
    fn test_classify_point_cylinder() {
        let mut store = ShapeStore::new();
        let solid = make_cylinder(&mut store, Point3d::ORIGIN, Vec3::Z, 1.0, 2.0);
        let options = BooleanOptions::default();
        assert_eq!(classify_point(&store, solid, &Point3d::new(0.3, -0.2, 1.0), &options).unwrap(), State::In);
        // Inside the bounding box but outside the lateral surface.
        assert_eq!(classify_point(&store, solid, &Point3d::new(0.9, 0.9, 1.0), &options).unwrap(), State::Out);
        assert_eq!(classify_point(&store, solid, &Point3d::new(1.0, 0.0, 0.5), &options).unwrap(), State::On);
    }

    #[test]
    fn test_open_reference_is_never_in() {
        let mut store = ShapeStore::new();
        let solid = unit_box(&mut store);
        let shell = store.children(solid).unwrap()[0].id;
        let c = Classifier::new(&store, shell, &BooleanOptions::default()).unwrap();
        assert!(!c.is_closed());
        assert_eq!(c.classify_point(&Point3d::new(0.5, 0.5, 0.5)), State::Out);
        assert_eq!(c.classify_point(&Point3d::new(0.5, 0.5, 1.0)), State::On);
    }

    #[test]
    fn test_classify_face_on_same_and_opposite() {
        let mut store = ShapeStore::new();
        let a = unit_box(&mut store);
        let b = make_box(&mut store, Point3d::new(0.0, 0.0, 1.0), Point3d::new(1.0, 1.0, 2.0));
        let c = make_box(&mut store, Point3d::new(0.0, 0.0, 0.0), Point3d::new(1.0, 1.0, 0.5));
        let options = BooleanOptions::default();

        // The top face of `a` touches the bottom face of `b` with opposite normals.
        let top_of_a = oriented_subshapes(&store, ShapeRef::forward(a), ShapeKind::Face)
            .unwrap()
            .into_iter()
            .find(|f| {
                let d = FaceDomain::build(&store, f.id, 16, 50).unwrap();
                d.interior_point().is_some_and(|(p, _)| (p.z - 1.0).abs() < 1e-9)
            })
            .unwrap();
        assert_eq!(classify_face(&store, top_of_a, b, &options).unwrap(), FaceState::OnOpposite);

        // The bottom faces of `a` and `c` coincide with the same normal.
        let bottom_of_a = oriented_subshapes(&store, ShapeRef::forward(a), ShapeKind::Face)
            .unwrap()
            .into_iter()
            .find(|f| {
                let d = FaceDomain::build(&store, f.id, 16, 50).unwrap();
                d.interior_point().is_some_and(|(p, _)| p.z.abs() < 1e-9)
            })
            .unwrap();
        let class = Classifier::new(&store, c, &options).unwrap().classify_face(&store, bottom_of_a).unwrap();
        assert_eq!(class.state, FaceState::OnSame);
        assert!(class.on_face.is_some());

        assert_eq!(classify_face(&store, top_of_a, c, &options).unwrap(), FaceState::Out);
    }
}
