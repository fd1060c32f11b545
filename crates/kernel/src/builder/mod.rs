//! The builder: turns the intersection results of a filled
//! [`DataStructure`] into split images of the arguments.
//!
//! Edges are replaced by the split edges of their pave blocks, faces are cut
//! along their split boundaries, section edges and in-face edges. The result
//! is an [`Images`] table plus the list of split faces ([`Piece`]s) handed to
//! selection and shell assembly.

mod face_builder;
pub mod history;
pub mod selection;
pub mod shell_builder;

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::config::BooleanOptions;
use crate::ds::{DataStructure, ShapeIndex};
use crate::error::PreconditionError;
use crate::filler::exec::Executor;
use crate::filler::CancelToken;
use crate::report::{AlertCode, Report};
use crate::topology::explore::oriented_subshapes;
use crate::topology::{Orientation, ShapeId, ShapeKind, ShapeRef, ShapeStore, TopologyError};

use face_builder::SplitPlan;

pub use history::History;

/// One split edge replacing part of an original edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeImage {
    pub edge: ShapeId,
    /// Direction of the split edge relative to the original edge.
    pub orientation: Orientation,
    /// The split edge lies on the original edge's own curve.
    pub native: bool,
}

/// What every modified argument sub-shape was replaced with.
#[derive(Debug, Clone, Default)]
pub struct Images {
    pub vertices: BTreeMap<ShapeId, ShapeId>,
    /// Split edges in the parameter order of the original edge.
    pub edges: BTreeMap<ShapeId, Vec<EdgeImage>>,
    pub faces: BTreeMap<ShapeId, Vec<ShapeId>>,
}

impl Images {
    pub fn vertex(&self, v: ShapeId) -> ShapeId {
        self.vertices.get(&v).copied().unwrap_or(v)
    }

    /// Split edges of `e`; the edge itself when it was not split.
    pub fn edge_images(&self, e: ShapeId) -> Vec<EdgeImage> {
        match self.edges.get(&e) {
            Some(list) => list.clone(),
            None => vec![EdgeImage {
                edge: e,
                orientation: Orientation::Forward,
                native: true,
            }],
        }
    }

    /// Split faces of `f`; the face itself when it was not split.
    pub fn face_images(&self, f: ShapeId) -> Vec<ShapeId> {
        self.faces.get(&f).cloned().unwrap_or_else(|| vec![f])
    }

    pub fn is_modified(&self, s: ShapeId) -> bool {
        self.vertices.contains_key(&s) || self.edges.contains_key(&s) || self.faces.contains_key(&s)
    }
}

/// A split face together with where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub face: ShapeId,
    /// Argument face the piece was split from.
    pub origin: ShapeId,
    pub origin_index: ShapeIndex,
    /// Position of the owning argument.
    pub rank: usize,
    /// Orientation of the origin face inside its argument.
    pub orientation: Orientation,
}

impl Piece {
    pub fn oriented(&self) -> ShapeRef {
        ShapeRef::new(self.face, self.orientation)
    }
}

/// Output of the splitting stage.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub images: Images,
    pub pieces: Vec<Piece>,
}

/// Splits the arguments of a filled data structure.
pub struct Builder<'a> {
    store: &'a mut ShapeStore,
    ds: &'a DataStructure,
    options: &'a BooleanOptions,
    cancel: CancelToken,
}

impl<'a> Builder<'a> {
    pub fn new(store: &'a mut ShapeStore, ds: &'a DataStructure, options: &'a BooleanOptions) -> Self {
        Self {
            store,
            ds,
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[instrument(skip_all)]
    pub fn perform(self, report: &mut Report) -> Result<BuildOutput, PreconditionError> {
        let mut images = Images {
            vertices: vertex_images(self.ds),
            edges: edge_images(self.store, self.ds, self.options.newton_max_iterations)?,
            faces: BTreeMap::new(),
        };
        self.cancel.check()?;

        let mut to_split = Vec::new();
        let mut to_rebuild = Vec::new();
        for f in self.ds.indices_of_kind(ShapeKind::Face) {
            if f >= self.ds.source_count() || self.ds.domain(f).is_none() {
                continue;
            }
            let crossed = self
                .ds
                .face_info(f)
                .is_some_and(|fi| !fi.in_blocks.is_empty() || !fi.sc_blocks.is_empty());
            let boundary_changed = self
                .ds
                .info(f)
                .sub_shapes
                .iter()
                .any(|e| images.edges.contains_key(&self.ds.shape_id(*e)));
            if crossed {
                to_split.push(f);
            } else if boundary_changed {
                to_rebuild.push(f);
            }
        }

        let executor = Executor::new(self.options);
        let (store, ds, frozen) = (&*self.store, self.ds, &images);
        let (samples, iters) = (self.options.curve_samples, self.options.newton_max_iterations);
        let plans = executor.map(&to_split, &self.cancel, |&f| SplitPlan::compute(store, ds, frozen, f, samples, iters))?;

        let mut split_faces = 0;
        for plan in plans {
            let plan = plan?;
            let face = self.ds.shape_id(plan.face);
            let surface = self.store.face_surface(face)?.clone();
            let tolerance = self.store.tolerance(face)?;
            let faces = plan.emit(self.store, &surface, tolerance);
            if faces.is_empty() {
                report.warning(AlertCode::FaceSplitFailed, "no closed loop found; face kept with split boundary", vec![face]);
                let rebuilt = rebuild_face(self.store, &images, face)?;
                images.faces.insert(face, vec![rebuilt]);
                continue;
            }
            split_faces += 1;
            images.faces.insert(face, faces);
        }
        for f in to_rebuild {
            let face = self.ds.shape_id(f);
            let rebuilt = rebuild_face(self.store, &images, face)?;
            images.faces.insert(face, vec![rebuilt]);
        }

        let pieces = collect_pieces(self.store, self.ds, &images)?;
        info!(
            stage = "building",
            split_faces,
            rebuilt_faces = images.faces.len() - split_faces,
            pieces = pieces.len(),
            "arguments split"
        );
        Ok(BuildOutput { images, pieces })
    }
}

fn vertex_images(ds: &DataStructure) -> BTreeMap<ShapeId, ShapeId> {
    ds.indices_of_kind(ShapeKind::Vertex)
        .filter(|v| *v < ds.source_count())
        .filter_map(|v| {
            let real = ds.real_vertex(v);
            (real != v).then(|| (ds.shape_id(v), ds.shape_id(real)))
        })
        .collect()
}

/// Split edges of every argument edge that did not survive unchanged.
fn edge_images(
    store: &ShapeStore,
    ds: &DataStructure,
    max_iterations: usize,
) -> Result<BTreeMap<ShapeId, Vec<EdgeImage>>, TopologyError> {
    let mut map = BTreeMap::new();
    for e in ds.indices_of_kind(ShapeKind::Edge).filter(|e| *e < ds.source_count()) {
        let blocks = ds.edge_blocks(e);
        if blocks.is_empty() {
            continue;
        }
        let id = ds.shape_id(e);
        let (curve, _) = store.edge_curve(id)?;
        let mut list = Vec::with_capacity(blocks.len());
        for &pb in blocks {
            let Some(split) = ds.split_edge_of(pb) else {
                continue;
            };
            let split_id = ds.shape_id(split);
            let block = ds.block(pb);
            let native = block.common_block.is_none() || block.split_edge == Some(split);
            let orientation = if native {
                Orientation::Forward
            } else {
                let t = block.mid_parameter();
                let (split_curve, split_range) = store.edge_curve(split_id)?;
                let ts = split_curve.project(&curve.evaluate(t), split_range, max_iterations).t;
                if curve.tangent(t).dot(&split_curve.tangent(ts)) >= 0.0 {
                    Orientation::Forward
                } else {
                    Orientation::Reversed
                }
            };
            list.push(EdgeImage {
                edge: split_id,
                orientation,
                native,
            });
        }
        if !(list.len() == 1 && list[0].edge == id) {
            map.insert(id, list);
        }
    }
    debug!(split_edges = map.len(), "edge images");
    Ok(map)
}

/// Copy of `face` whose wires use the split images of their edges.
fn rebuild_face(store: &mut ShapeStore, images: &Images, face: ShapeId) -> Result<ShapeId, TopologyError> {
    let surface = store.face_surface(face)?.clone();
    let tolerance = store.tolerance(face)?;
    let wires = store.children(face)?.to_vec();
    let mut new_wires = Vec::with_capacity(wires.len());
    for wire in wires {
        let mut refs = Vec::new();
        for use_ in store.children(wire.id)?.to_vec() {
            let mut pieces = images.edge_images(use_.id);
            if use_.orientation.is_reversed() {
                pieces.reverse();
            }
            refs.extend(pieces.iter().map(|img| ShapeRef::new(img.edge, use_.orientation.compose(img.orientation))));
        }
        new_wires.push(ShapeRef::new(store.add_wire(refs), wire.orientation));
    }
    Ok(store.add_face(surface, new_wires, tolerance))
}

/// Split faces of every argument, argument by argument.
fn collect_pieces(store: &ShapeStore, ds: &DataStructure, images: &Images) -> Result<Vec<Piece>, TopologyError> {
    let mut pieces = Vec::new();
    for (rank, &arg) in ds.arguments().iter().enumerate() {
        let mut seen = Vec::new();
        for face in oriented_subshapes(store, ShapeRef::forward(arg), ShapeKind::Face)? {
            if seen.contains(&face.id) {
                continue;
            }
            seen.push(face.id);
            let Some(origin_index) = ds.index_of(face.id) else {
                continue;
            };
            for split in images.face_images(face.id) {
                pieces.push(Piece {
                    face: split,
                    origin: face.id,
                    origin_index,
                    rank,
                    orientation: face.orientation,
                });
            }
        }
    }
    Ok(pieces)
}

/// Rebuild `shape` from the images of its faces, edges and vertices.
///
/// Containers are copied only when something below them changed. Faces and
/// edges may expand into several references.
pub fn rebuild_shape(store: &mut ShapeStore, images: &Images, shape: ShapeRef) -> Result<Vec<ShapeRef>, TopologyError> {
    let kind = store.kind(shape.id)?;
    match kind {
        ShapeKind::Vertex => Ok(vec![ShapeRef::new(images.vertex(shape.id), shape.orientation)]),
        ShapeKind::Edge => {
            let mut pieces = images.edge_images(shape.id);
            if shape.orientation.is_reversed() {
                pieces.reverse();
            }
            Ok(pieces
                .iter()
                .map(|img| ShapeRef::new(img.edge, shape.orientation.compose(img.orientation)))
                .collect())
        }
        ShapeKind::Face => Ok(images
            .face_images(shape.id)
            .into_iter()
            .map(|f| ShapeRef::new(f, shape.orientation))
            .collect()),
        ShapeKind::Wire => Ok(vec![shape]),
        ShapeKind::Shell | ShapeKind::Solid | ShapeKind::CompSolid | ShapeKind::Compound => {
            let children = store.children(shape.id)?.to_vec();
            let mut rebuilt = Vec::with_capacity(children.len());
            for child in &children {
                rebuilt.extend(rebuild_shape(store, images, *child)?);
            }
            if rebuilt == children {
                return Ok(vec![shape]);
            }
            let id = match kind {
                ShapeKind::Shell => store.add_shell(rebuilt),
                ShapeKind::Solid => store.add_solid(rebuilt),
                ShapeKind::CompSolid => store.add_compsolid(rebuilt),
                _ => store.add_compound(rebuilt),
            };
            Ok(vec![ShapeRef::new(id, shape.orientation)])
        }
    }
}
