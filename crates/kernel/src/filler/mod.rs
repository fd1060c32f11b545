//! The pave filler: intersects every interfering pair of sub-shapes and
//! records the results in a [`DataStructure`].
//!
//! Stages run strictly in sequence. Inside a stage, pair computations are
//! pure and run on the [`Executor`]; their results are merged into the data
//! structure by a single writer in ascending index-pair order.

mod edges;
pub mod exec;
mod faces;
mod pavement;
mod vertices;

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::config::BooleanOptions;
use crate::ds::index::SpatialIndex;
use crate::ds::{DataStructure, ShapeIndex};
use crate::error::PreconditionError;
use crate::geometry::point::Point3d;
use crate::intersect::SolverSettings;
use crate::report::Report;
use crate::topology::{ShapeId, ShapeStore, TopologyError};

pub use exec::CancelToken;
use exec::Executor;

/// Progress of a filler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FillerState {
    NotStarted,
    Filtering,
    Intersecting,
    PavementBuilding,
    Done,
}

/// Entry point of the intersection part of a Boolean run.
#[derive(Debug)]
pub struct PaveFiller {
    options: BooleanOptions,
    cancel: CancelToken,
    state: FillerState,
}

impl PaveFiller {
    pub fn new(options: BooleanOptions) -> Self {
        Self {
            options,
            cancel: CancelToken::new(),
            state: FillerState::NotStarted,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> FillerState {
        self.state
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run every stage over `arguments`. New vertices and edges are added to
    /// `store`; argument shapes are never modified.
    #[instrument(skip_all, fields(arguments = arguments.len()))]
    pub fn perform(
        &mut self,
        store: &mut ShapeStore,
        arguments: &[ShapeId],
        report: &mut Report,
    ) -> Result<DataStructure, PreconditionError> {
        self.enter(FillerState::Filtering)?;
        for id in arguments {
            store.get(*id)?;
        }
        let ds = DataStructure::build(store, arguments, &self.options, report)?;
        let index = SpatialIndex::build(&ds);
        let executor = Executor::new(&self.options);
        debug!(workers = executor.workers(), "executor ready");

        let mut run = Filler {
            store,
            ds,
            index,
            report,
            settings: SolverSettings::from_options(&self.options),
            executor,
            cancel: self.cancel.clone(),
        };

        self.enter(FillerState::Intersecting)?;
        run.vertex_vertex()?;
        run.vertex_edge()?;
        run.edge_edge()?;
        run.vertex_face()?;
        run.edge_face()?;
        run.face_face()?;
        info!(
            stage = "intersecting",
            interferences = run.ds.interferences.len(),
            counts = ?run.ds.interferences.counts(),
            "intersection stages done"
        );

        self.enter(FillerState::PavementBuilding)?;
        run.build_pavements()?;
        run.build_common_blocks()?;
        run.build_section_edges()?;
        run.build_split_edges()?;

        self.enter(FillerState::Done)?;
        info!(
            stage = "done",
            blocks = run.ds.pave_blocks().len(),
            common_blocks = run.ds.common_blocks().len(),
            section_blocks = run.ds.section_blocks().len(),
            "pave filler finished"
        );
        Ok(run.ds)
    }

    fn enter(&mut self, state: FillerState) -> Result<(), PreconditionError> {
        self.cancel.check()?;
        debug!(from = ?self.state, to = ?state, "filler stage");
        self.state = state;
        Ok(())
    }
}

/// Mutable state of one filler run.
pub(crate) struct Filler<'a> {
    store: &'a mut ShapeStore,
    ds: DataStructure,
    index: SpatialIndex,
    report: &'a mut Report,
    settings: SolverSettings,
    executor: Executor,
    cancel: CancelToken,
}

impl Filler<'_> {
    /// Create a vertex owned by the run.
    fn make_vertex(&mut self, point: Point3d, tolerance: f64) -> Result<ShapeIndex, TopologyError> {
        let id = self.store.add_vertex(point, tolerance);
        self.ds.append(self.store, id)
    }

    /// Real vertices of the paves currently known on `edge`.
    fn pave_vertices(&self, edge: ShapeIndex) -> Result<Vec<ShapeIndex>, TopologyError> {
        Ok(self.ds.edge_paves(self.store, edge)?.into_iter().map(|p| p.vertex).collect())
    }

    /// Nearest real vertex among `candidates` whose tolerance sphere,
    /// widened by `tol`, contains `point`.
    fn vertex_near(
        &self,
        candidates: impl IntoIterator<Item = ShapeIndex>,
        point: &Point3d,
        tol: f64,
    ) -> Result<Option<(ShapeIndex, f64)>, TopologyError> {
        let mut best: Option<(ShapeIndex, f64)> = None;
        for v in candidates {
            let v = self.ds.real_vertex(v);
            let d = self.ds.vertex_point(self.store, v)?.distance_to(point);
            if d <= self.ds.tolerance(v) + tol && best.is_none_or(|(bv, bd)| d < bd || (d == bd && v < bv)) {
                best = Some((v, d));
            }
        }
        Ok(best)
    }

    /// Existing vertex near `point` or a new one, grown to cover `point`.
    fn vertex_at(
        &mut self,
        candidates: impl IntoIterator<Item = ShapeIndex>,
        point: Point3d,
        tol: f64,
        new_tolerance: f64,
    ) -> Result<ShapeIndex, TopologyError> {
        match self.vertex_near(candidates, &point, tol)? {
            Some((v, d)) => self.ds.ensure_tolerance(self.store, v, d),
            None => self.make_vertex(point, new_tolerance),
        }
    }

    /// Add a pave unless the edge already carries that vertex.
    fn add_pave_once(&mut self, edge: ShapeIndex, vertex: ShapeIndex, t: f64) -> Result<bool, TopologyError> {
        let real = self.ds.real_vertex(vertex);
        if self.pave_vertices(edge)?.contains(&real) {
            return Ok(false);
        }
        self.ds.add_extra_pave(edge, crate::ds::pave::Pave::new(real, t));
        Ok(true)
    }

    /// Merge vertex `absorbed` into `kept`, growing `kept` to cover it.
    fn merge_vertices(&mut self, absorbed: ShapeIndex, kept: ShapeIndex) -> Result<(), TopologyError> {
        let (a, k) = (self.ds.real_vertex(absorbed), self.ds.real_vertex(kept));
        if a == k {
            return Ok(());
        }
        let d = self.ds.vertex_point(self.store, a)?.distance_to(&self.ds.vertex_point(self.store, k)?);
        let k = self.ds.ensure_tolerance(self.store, k, d + self.ds.tolerance(a))?;
        self.ds.set_same_domain(a, k);
        Ok(())
    }
}

/// Union-find over indices with deterministic groups: each group is sorted
/// and groups are ordered by their smallest member.
#[derive(Debug, Default)]
pub(crate) struct UnionFind {
    parent: BTreeMap<usize, usize>,
}

impl UnionFind {
    fn find(&mut self, x: usize) -> usize {
        let p = *self.parent.entry(x).or_insert(x);
        if p == x {
            return x;
        }
        let root = self.find(p);
        self.parent.insert(x, root);
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent.insert(hi, lo);
        }
    }

    pub fn groups(mut self) -> Vec<Vec<usize>> {
        let keys: Vec<usize> = self.parent.keys().copied().collect();
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for k in keys {
            let root = self.find(k);
            groups.entry(root).or_default().push(k);
        }
        groups.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::primitives::make_box;
    use crate::topology::ShapeKind;

    fn fill(a_min: Point3d, a_max: Point3d, b_min: Point3d, b_max: Point3d, options: BooleanOptions) -> (ShapeStore, DataStructure, Report) {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, a_min, a_max);
        let b = make_box(&mut store, b_min, b_max);
        let mut report = Report::new();
        let mut filler = PaveFiller::new(options);
        let ds = filler.perform(&mut store, &[a, b], &mut report).unwrap();
        assert_eq!(filler.state(), FillerState::Done);
        (store, ds, report)
    }

    #[test]
    fn test_union_find_groups_are_sorted() {
        let mut uf = UnionFind::default();
        uf.union(7, 3);
        uf.union(3, 9);
        uf.union(1, 2);
        assert_eq!(uf.groups(), vec![vec![1, 2], vec![3, 7, 9]]);
    }

    #[test]
    fn test_disjoint_boxes_have_no_interferences() {
        let (_, ds, report) = fill(
            Point3d::ORIGIN,
            Point3d::new(1.0, 1.0, 1.0),
            Point3d::new(3.0, 0.0, 0.0),
            Point3d::new(4.0, 1.0, 1.0),
            BooleanOptions::sequential(),
        );
        assert!(ds.interferences.is_empty());
        assert!(ds.section_blocks().is_empty());
        assert!(!report.has_warnings());
    }

    #[test]
    fn test_touching_boxes_share_vertices_and_edges() {
        let (_, ds, _) = fill(
            Point3d::ORIGIN,
            Point3d::new(1.0, 1.0, 1.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(2.0, 1.0, 1.0),
            BooleanOptions::sequential(),
        );
        assert_eq!(ds.interferences.vv.len(), 4);
        // Exactly coincident corners resolve to the first box's vertices.
        assert_eq!(ds.same_domain_pairs().count(), 4);
        for (v, real) in ds.same_domain_pairs() {
            assert!(ds.has_same_domain(v));
            assert!(!ds.has_same_domain(real));
            assert_eq!(ds.info(v).rank, Some(1));
            assert_eq!(ds.info(real).rank, Some(0));
        }
        for vv in &ds.interferences.vv {
            assert_eq!(vv.new_vertex, vv.v1.min(vv.v2));
        }
        assert_eq!(ds.common_blocks().len(), 4);
        for cb in ds.common_blocks() {
            assert_eq!(cb.blocks.len(), 2);
            assert!(cb.edge.is_some());
        }
        let ff = &ds.interferences.ff;
        assert!(ff.iter().any(|f| f.coincident));
    }

    #[test]
    fn test_overlapping_boxes_produce_section_edges() {
        let (store, ds, report) = fill(
            Point3d::ORIGIN,
            Point3d::new(1.0, 1.0, 1.0),
            Point3d::new(0.5, 0.5, 0.5),
            Point3d::new(1.5, 1.5, 1.5),
            BooleanOptions::sequential(),
        );
        assert!(!report.has_errors());
        // Three faces of each box cross three faces of the other.
        assert_eq!(ds.section_blocks().len(), 6);
        for pb in ds.section_blocks() {
            let edge = ds.split_edge_of(*pb).unwrap();
            assert_eq!(ds.info(edge).kind, ShapeKind::Edge);
            let (curve, range) = store.edge_curve(ds.shape_id(edge)).unwrap();
            assert!((curve.approximate_length(range, 2) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_worker_count_does_not_change_the_result() {
        let run = |workers: usize| {
            let options = BooleanOptions {
                workers,
                ..BooleanOptions::default()
            };
            let (_, ds, _) = fill(
                Point3d::ORIGIN,
                Point3d::new(1.0, 1.0, 1.0),
                Point3d::new(0.5, 0.25, -0.5),
                Point3d::new(1.5, 0.75, 0.5),
                options,
            );
            (ds.interferences.counts(), ds.pave_blocks().to_vec(), ds.len())
        };
        assert_eq!(run(1), run(4));
    }

    #[test]
    fn test_cancelled_run_stops() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let token = CancelToken::new();
        token.cancel();
        let mut filler = PaveFiller::new(BooleanOptions::sequential()).with_cancel(token);
        let result = filler.perform(&mut store, &[a], &mut Report::new());
        assert_eq!(result.unwrap_err(), PreconditionError::Cancelled);
        assert_eq!(filler.state(), FillerState::NotStarted);
    }
}
