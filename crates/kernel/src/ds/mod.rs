//! Shared intersection data structure of one Boolean run.
//!
//! Every distinct vertex, edge and face of the arguments receives a
//! [`ShapeIndex`]; shapes created during the run are appended after the
//! source range. All interferences, paves and blocks refer to these indices.

pub mod index;
pub mod interference;
pub mod pave;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, instrument};

use crate::config::BooleanOptions;
use crate::error::PreconditionError;
use crate::geometry::bounds::BoundingBox;
use crate::geometry::point::Point3d;
use crate::report::{AlertCode, Report};
use crate::topology::explore::subshapes;
use crate::topology::face_domain::FaceDomain;
use crate::topology::{Geometry, ShapeId, ShapeKind, ShapeStore, TopologyError};

use interference::Interferences;
use pave::{CommonBlock, CommonBlockId, Pave, PaveBlock, PaveBlockId};

/// Run-scoped handle of an indexed sub-shape.
pub type ShapeIndex = usize;

#[derive(Debug, Clone)]
pub struct ShapeInfo {
    pub shape: ShapeId,
    pub kind: ShapeKind,
    /// Position of the owning argument; `None` for shapes created by the run.
    pub rank: Option<usize>,
    /// Vertices of an edge, edges of a face.
    pub sub_shapes: Vec<ShapeIndex>,
    pub bbox: BoundingBox,
    pub tolerance: f64,
    pub invalid: bool,
}

/// Per-face results of the intersection stages.
#[derive(Debug, Clone, Default)]
pub struct FaceInfo {
    /// Vertices of other arguments lying inside the face.
    pub in_vertices: BTreeSet<ShapeIndex>,
    /// Vertices of section curves and tangency points.
    pub sc_vertices: BTreeSet<ShapeIndex>,
    /// Blocks of other arguments' edges lying inside the face.
    pub in_blocks: Vec<PaveBlockId>,
    /// Section blocks splitting the face.
    pub sc_blocks: Vec<PaveBlockId>,
}

/// Overlapping parameter ranges of two edges; `r2.0` corresponds to `r1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonRange {
    pub e1: ShapeIndex,
    pub r1: (f64, f64),
    pub e2: ShapeIndex,
    pub r2: (f64, f64),
}

#[derive(Debug, Clone)]
pub struct DataStructure {
    arguments: Vec<ShapeId>,
    shapes: Vec<ShapeInfo>,
    index_of: HashMap<ShapeId, ShapeIndex>,
    n_source: usize,
    domains: HashMap<ShapeIndex, FaceDomain>,
    same_domain: HashMap<ShapeIndex, ShapeIndex>,
    pave_blocks: Vec<PaveBlock>,
    edge_blocks: BTreeMap<ShapeIndex, Vec<PaveBlockId>>,
    common_blocks: Vec<CommonBlock>,
    face_info: BTreeMap<ShapeIndex, FaceInfo>,
    section_blocks: Vec<PaveBlockId>,
    pub interferences: Interferences,
    /// Paves found by the intersection stages, per edge.
    pub extra_paves: BTreeMap<ShapeIndex, Vec<Pave>>,
    pub common_ranges: Vec<CommonRange>,
    /// `(edge, face)` pairs where the edge lies on the face surface.
    pub edge_on_face: Vec<(ShapeIndex, ShapeIndex)>,
    pub fuzzy: f64,
    curve_samples: usize,
    max_iterations: usize,
}

impl DataStructure {
    /// Index the arguments and compute boxes and face domains. Shapes with
    /// unusable geometry are flagged invalid with a warning.
    #[instrument(skip_all, fields(arguments = arguments.len()))]
    pub fn build(
        store: &ShapeStore,
        arguments: &[ShapeId],
        options: &BooleanOptions,
        report: &mut Report,
    ) -> Result<Self, PreconditionError> {
        if arguments.is_empty() {
            return Err(PreconditionError::EmptyArguments);
        }
        let mut ds = Self {
            arguments: arguments.to_vec(),
            shapes: Vec::new(),
            index_of: HashMap::new(),
            n_source: 0,
            domains: HashMap::new(),
            same_domain: HashMap::new(),
            pave_blocks: Vec::new(),
            edge_blocks: BTreeMap::new(),
            common_blocks: Vec::new(),
            face_info: BTreeMap::new(),
            section_blocks: Vec::new(),
            interferences: Interferences::default(),
            extra_paves: BTreeMap::new(),
            common_ranges: Vec::new(),
            edge_on_face: Vec::new(),
            fuzzy: options.fuzzy_value,
            curve_samples: options.curve_samples,
            max_iterations: options.newton_max_iterations,
        };

        for (rank, &arg) in arguments.iter().enumerate() {
            let kind = store.kind(arg)?;
            let vertices = subshapes(store, arg, ShapeKind::Vertex)?;
            if vertices.is_empty() {
                return Err(PreconditionError::UnsupportedArgument { id: arg, kind });
            }
            for kind in [ShapeKind::Vertex, ShapeKind::Edge, ShapeKind::Face] {
                for id in subshapes(store, arg, kind)? {
                    if !ds.index_of.contains_key(&id) {
                        ds.register(id, kind, Some(rank));
                    }
                }
            }
        }
        ds.n_source = ds.shapes.len();

        for i in 0..ds.n_source {
            ds.fill_info(store, i, report)?;
        }
        debug!(shapes = ds.n_source, faces = ds.domains.len(), "data structure indexed");
        Ok(ds)
    }

    fn register(&mut self, id: ShapeId, kind: ShapeKind, rank: Option<usize>) -> ShapeIndex {
        let i = self.shapes.len();
        self.shapes.push(ShapeInfo {
            shape: id,
            kind,
            rank,
            sub_shapes: Vec::new(),
            bbox: BoundingBox::empty(),
            tolerance: 0.0,
            invalid: false,
        });
        self.index_of.insert(id, i);
        i
    }

    /// Register a shape created during the run.
    pub fn append(&mut self, store: &ShapeStore, id: ShapeId) -> Result<ShapeIndex, TopologyError> {
        if let Some(i) = self.index_of.get(&id) {
            return Ok(*i);
        }
        let kind = store.kind(id)?;
        let i = self.register(id, kind, None);
        let mut scratch = Report::new();
        self.fill_info(store, i, &mut scratch)?;
        Ok(i)
    }

    fn fill_info(&mut self, store: &ShapeStore, i: ShapeIndex, report: &mut Report) -> Result<(), TopologyError> {
        let id = self.shapes[i].shape;
        let shape = store.get(id)?;
        let tolerance = shape.tolerance;
        let margin = tolerance + 0.5 * self.fuzzy;
        let mut invalid = None;
        let mut sub_shapes = Vec::new();
        let mut bbox = BoundingBox::empty();

        match (&shape.kind, &shape.geometry) {
            (ShapeKind::Vertex, Geometry::Point(p)) => {
                if !p.is_finite() {
                    invalid = Some("vertex has non-finite coordinates");
                }
                bbox.add_point(p);
            }
            (ShapeKind::Edge, Geometry::Curve { curve, range }) => {
                let (a, b) = store.edge_vertices(id)?;
                sub_shapes = [a, b].iter().filter_map(|v| self.index_of.get(v).copied()).collect();
                if !curve.is_valid() || !range.0.is_finite() || !range.1.is_finite() {
                    invalid = Some("edge curve is invalid");
                } else if (range.1 - range.0).abs() < 1e-12 {
                    invalid = Some("edge has an empty parameter range");
                } else {
                    let n = curve.sample_count(*range, self.curve_samples);
                    let samples = curve.sample(*range, n);
                    let mut sag: f64 = 0.0;
                    for w in samples.windows(2) {
                        sag = sag.max(w[0].1.distance_to(&w[1].1));
                    }
                    for (_, p) in &samples {
                        bbox.add_point(p);
                    }
                    if !curve.is_linear() {
                        bbox = bbox.enlarged(0.25 * sag);
                    }
                    for v in [a, b] {
                        bbox.add_point(&store.point(v)?);
                    }
                }
            }
            (ShapeKind::Face, Geometry::Surface(surface)) => {
                let edges = subshapes(store, id, ShapeKind::Edge)?;
                sub_shapes = edges.iter().filter_map(|e| self.index_of.get(e).copied()).collect();
                if !surface.is_valid() {
                    invalid = Some("face surface is invalid");
                } else if shape.children.is_empty() {
                    invalid = Some("face has no boundary wire");
                } else {
                    let domain = FaceDomain::build(store, id, self.curve_samples, self.max_iterations)?;
                    if domain.loops.iter().any(|l| l.polygon.len() < 2) || !domain.bbox.is_valid() {
                        invalid = Some("face boundary is degenerate");
                    } else {
                        for u in domain.edge_uses() {
                            for p in &u.points {
                                bbox.add_point(p);
                            }
                        }
                        if surface.as_plane().is_none() {
                            let n = 8;
                            let mut sag: f64 = 0.0;
                            let mut prev: Option<Point3d> = None;
                            for iu in 0..=n {
                                for iv in 0..=n {
                                    let p = surface.evaluate_uv(&domain.bbox.at(iu as f64 / n as f64, iv as f64 / n as f64));
                                    if let Some(q) = prev {
                                        sag = sag.max(p.distance_to(&q));
                                    }
                                    prev = Some(p);
                                    bbox.add_point(&p);
                                }
                                prev = None;
                            }
                            bbox = bbox.enlarged(0.25 * sag);
                        }
                        self.domains.insert(i, domain);
                    }
                }
            }
            _ => invalid = Some("shape carries no geometry of its kind"),
        }

        if !bbox.is_valid() && invalid.is_none() {
            invalid = Some("shape has an empty bounding box");
        }
        if let Some(reason) = invalid {
            report.warning(AlertCode::InvalidGeometry, reason, vec![id]);
        }

        let info = &mut self.shapes[i];
        info.sub_shapes = sub_shapes;
        info.bbox = bbox.enlarged(margin);
        info.tolerance = tolerance;
        info.invalid = invalid.is_some();
        Ok(())
    }

    // ─── Lookups ─────────────────────────────────────────────────────────────

    pub fn arguments(&self) -> &[ShapeId] {
        &self.arguments
    }

    pub fn shapes(&self) -> &[ShapeInfo] {
        &self.shapes
    }

    pub fn info(&self, i: ShapeIndex) -> &ShapeInfo {
        &self.shapes[i]
    }

    pub fn shape_id(&self, i: ShapeIndex) -> ShapeId {
        self.shapes[i].shape
    }

    pub fn index_of(&self, id: ShapeId) -> Option<ShapeIndex> {
        self.index_of.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Number of indices assigned to argument sub-shapes.
    pub fn source_count(&self) -> usize {
        self.n_source
    }

    pub fn is_new(&self, i: ShapeIndex) -> bool {
        self.shapes[i].rank.is_none()
    }

    pub fn tolerance(&self, i: ShapeIndex) -> f64 {
        self.shapes[i].tolerance
    }

    /// Distance threshold for an interference between `a` and `b`.
    pub fn pair_tolerance(&self, a: ShapeIndex, b: ShapeIndex) -> f64 {
        self.tolerance(a).max(self.tolerance(b)) + self.fuzzy
    }

    pub fn domain(&self, face: ShapeIndex) -> Option<&FaceDomain> {
        self.domains.get(&face)
    }

    pub fn curve_samples(&self) -> usize {
        self.curve_samples
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Indices of a given kind, ascending.
    pub fn indices_of_kind(&self, kind: ShapeKind) -> impl Iterator<Item = ShapeIndex> + '_ {
        self.shapes
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.kind == kind)
            .map(|(i, _)| i)
    }

    // ─── Same-domain vertices ────────────────────────────────────────────────

    /// The vertex that replaces `v` in the result.
    pub fn real_vertex(&self, v: ShapeIndex) -> ShapeIndex {
        self.same_domain.get(&v).copied().unwrap_or(v)
    }

    pub fn has_same_domain(&self, v: ShapeIndex) -> bool {
        self.same_domain.contains_key(&v)
    }

    /// Record that `v` is replaced by `real`, redirecting earlier entries.
    pub fn set_same_domain(&mut self, v: ShapeIndex, real: ShapeIndex) {
        let real = self.real_vertex(real);
        if v == real {
            return;
        }
        for target in self.same_domain.values_mut() {
            if *target == v {
                *target = real;
            }
        }
        self.same_domain.insert(v, real);
    }

    pub fn same_domain_pairs(&self) -> impl Iterator<Item = (ShapeIndex, ShapeIndex)> + '_ {
        self.same_domain.iter().map(|(k, v)| (*k, *v))
    }

    pub fn vertex_point(&self, store: &ShapeStore, v: ShapeIndex) -> Result<Point3d, TopologyError> {
        store.point(self.shape_id(v))
    }

    /// Real vertex of `v` with a tolerance of at least `tolerance`.
    ///
    /// Vertices created by the run grow in place; argument vertices are
    /// replaced by a same-domain copy so the arguments stay untouched.
    pub fn ensure_tolerance(&mut self, store: &mut ShapeStore, v: ShapeIndex, tolerance: f64) -> Result<ShapeIndex, TopologyError> {
        let r = self.real_vertex(v);
        if self.tolerance(r) >= tolerance {
            return Ok(r);
        }
        if self.is_new(r) {
            store.grow_tolerance(self.shape_id(r), tolerance)?;
            self.refresh(store, r)?;
            return Ok(r);
        }
        let p = self.vertex_point(store, r)?;
        let copy = store.add_vertex(p, tolerance);
        let ci = self.append(store, copy)?;
        self.set_same_domain(r, ci);
        Ok(ci)
    }

    fn refresh(&mut self, store: &ShapeStore, i: ShapeIndex) -> Result<(), TopologyError> {
        let mut scratch = Report::new();
        self.fill_info(store, i, &mut scratch)
    }

    // ─── Paves & blocks ──────────────────────────────────────────────────────

    pub fn add_extra_pave(&mut self, edge: ShapeIndex, pave: Pave) {
        self.extra_paves.entry(edge).or_default().push(pave);
    }

    /// End paves plus intersection paves of an edge, vertices resolved.
    pub fn edge_paves(&self, store: &ShapeStore, edge: ShapeIndex) -> Result<Vec<Pave>, TopologyError> {
        let (_, range) = store.edge_curve(self.shape_id(edge))?;
        let info = self.info(edge);
        let mut paves = Vec::new();
        if let [a, b] = info.sub_shapes.as_slice() {
            paves.push(Pave::new(self.real_vertex(*a), range.0));
            paves.push(Pave::new(self.real_vertex(*b), range.1));
        }
        if let Some(extra) = self.extra_paves.get(&edge) {
            paves.extend(extra.iter().map(|p| Pave::new(self.real_vertex(p.vertex), p.t)));
        }
        Ok(paves)
    }

    pub fn add_pave_block(&mut self, block: PaveBlock) -> PaveBlockId {
        let id = PaveBlockId(self.pave_blocks.len());
        self.edge_blocks.entry(block.original_edge).or_default().push(id);
        self.pave_blocks.push(block);
        id
    }

    pub fn block(&self, id: PaveBlockId) -> &PaveBlock {
        &self.pave_blocks[id.0]
    }

    pub fn block_mut(&mut self, id: PaveBlockId) -> &mut PaveBlock {
        &mut self.pave_blocks[id.0]
    }

    pub fn pave_blocks(&self) -> &[PaveBlock] {
        &self.pave_blocks
    }

    /// Blocks of an edge in parameter order.
    pub fn edge_blocks(&self, edge: ShapeIndex) -> &[PaveBlockId] {
        self.edge_blocks.get(&edge).map_or(&[], |v| v.as_slice())
    }

    pub fn add_common_block(&mut self, cb: CommonBlock) -> CommonBlockId {
        let id = CommonBlockId(self.common_blocks.len());
        for pb in &cb.blocks {
            self.pave_blocks[pb.0].common_block = Some(id);
        }
        self.common_blocks.push(cb);
        id
    }

    pub fn common_block(&self, id: CommonBlockId) -> &CommonBlock {
        &self.common_blocks[id.0]
    }

    pub fn common_block_mut(&mut self, id: CommonBlockId) -> &mut CommonBlock {
        &mut self.common_blocks[id.0]
    }

    pub fn common_blocks(&self) -> &[CommonBlock] {
        &self.common_blocks
    }

    /// Edge materializing a block, following its common block.
    pub fn split_edge_of(&self, id: PaveBlockId) -> Option<ShapeIndex> {
        let pb = self.block(id);
        match pb.common_block {
            Some(cb) => self.common_block(cb).edge.or(pb.split_edge),
            None => pb.split_edge,
        }
    }

    pub fn add_section_block(&mut self, id: PaveBlockId) {
        if !self.section_blocks.contains(&id) {
            self.section_blocks.push(id);
        }
    }

    pub fn section_blocks(&self) -> &[PaveBlockId] {
        &self.section_blocks
    }

    // ─── Face info ───────────────────────────────────────────────────────────

    pub fn face_info(&self, face: ShapeIndex) -> Option<&FaceInfo> {
        self.face_info.get(&face)
    }

    pub fn face_info_mut(&mut self, face: ShapeIndex) -> &mut FaceInfo {
        self.face_info.entry(face).or_default()
    }

    /// Real vertices on the boundary of a face, including intersection paves
    /// on its edges.
    pub fn on_vertices(&self, face: ShapeIndex) -> BTreeSet<ShapeIndex> {
        let mut out = BTreeSet::new();
        for &e in &self.info(face).sub_shapes {
            for &v in &self.info(e).sub_shapes {
                out.insert(self.real_vertex(v));
            }
            if let Some(extra) = self.extra_paves.get(&e) {
                out.extend(extra.iter().map(|p| self.real_vertex(p.vertex)));
            }
            for pb in self.edge_blocks(e) {
                let b = self.block(*pb);
                out.insert(self.real_vertex(b.pave1.vertex));
                out.insert(self.real_vertex(b.pave2.vertex));
            }
        }
        out
    }

    /// On, in and section vertices of a face.
    pub fn face_vertices(&self, face: ShapeIndex) -> BTreeSet<ShapeIndex> {
        let mut out = self.on_vertices(face);
        if let Some(fi) = self.face_info(face) {
            out.extend(fi.in_vertices.iter().map(|v| self.real_vertex(*v)));
            out.extend(fi.sc_vertices.iter().map(|v| self.real_vertex(*v)));
        }
        out
    }

    /// Whether block `pb` (or one in its common block) belongs to an edge of `face`.
    pub fn is_on_face_boundary(&self, pb: PaveBlockId, face: ShapeIndex) -> bool {
        let edges = &self.info(face).sub_shapes;
        let block = self.block(pb);
        match block.common_block {
            Some(cb) => self
                .common_block(cb)
                .blocks
                .iter()
                .any(|m| edges.contains(&self.block(*m).original_edge)),
            None => edges.contains(&block.original_edge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::primitives::make_box;

    #[test]
    fn test_indices_are_shared_and_ranked() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let b = make_box(&mut store, Point3d::new(2.0, 0.0, 0.0), Point3d::new(3.0, 1.0, 1.0));
        let mut report = Report::new();
        let ds = DataStructure::build(&store, &[a, b], &BooleanOptions::default(), &mut report).unwrap();
        assert_eq!(ds.len(), 2 * (8 + 12 + 6));
        assert_eq!(ds.source_count(), ds.len());
        assert!(ds.shapes().iter().all(|s| !s.invalid && s.bbox.is_valid()));
        assert_eq!(ds.info(0).rank, Some(0));
        assert_eq!(ds.info(ds.len() - 1).rank, Some(1));
        assert_eq!(ds.indices_of_kind(ShapeKind::Face).count(), 12);
        assert!(!report.has_warnings());
    }

    #[test]
    fn test_empty_arguments_fail() {
        let store = ShapeStore::new();
        let mut report = Report::new();
        assert_eq!(
            DataStructure::build(&store, &[], &BooleanOptions::default(), &mut report).err(),
            Some(PreconditionError::EmptyArguments)
        );
    }

    #[test]
    fn test_invalid_edge_is_flagged() {
        use crate::geometry::curves::{Curve, Line3d};
        use crate::geometry::vector::Vec3;
        let mut store = ShapeStore::new();
        let v = store.add_vertex(Point3d::ORIGIN, 1e-7);
        let e = store.add_edge(Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X)), (0.0, 0.0), v, v, 1e-7);
        let mut report = Report::new();
        let ds = DataStructure::build(&store, &[e], &BooleanOptions::default(), &mut report).unwrap();
        let ei = ds.index_of(e).unwrap();
        assert!(ds.info(ei).invalid);
        assert!(report.has_code(AlertCode::InvalidGeometry));
    }

    #[test]
    fn test_ensure_tolerance_copies_argument_vertex() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let mut report = Report::new();
        let mut ds = DataStructure::build(&store, &[a], &BooleanOptions::default(), &mut report).unwrap();
        let v = 0;
        let grown = ds.ensure_tolerance(&mut store, v, 1e-3).unwrap();
        assert_ne!(grown, v);
        assert_eq!(ds.real_vertex(v), grown);
        assert!(ds.tolerance(grown) >= 1e-3);
        assert!(store.tolerance(ds.shape_id(v)).unwrap() < 1e-3);
        // A second growth of a run vertex happens in place.
        assert_eq!(ds.ensure_tolerance(&mut store, v, 1e-2).unwrap(), grown);
    }
}
