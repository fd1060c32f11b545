//! Evolution of argument sub-shapes into the result.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::ds::DataStructure;
use crate::topology::explore::subshapes;
use crate::topology::{ShapeId, ShapeKind, ShapeStore, TopologyError};

use super::Images;

/// Which result shapes replace or were created from each argument vertex,
/// edge and face.
#[derive(Debug, Clone, Default)]
pub struct History {
    modified: BTreeMap<ShapeId, Vec<ShapeId>>,
    generated: BTreeMap<ShapeId, Vec<ShapeId>>,
    deleted: BTreeSet<ShapeId>,
}

impl History {
    /// Compare the argument sub-shapes of `ds` with the shapes reachable
    /// from `result`.
    pub fn build(
        store: &ShapeStore,
        ds: &DataStructure,
        images: &Images,
        result: Option<ShapeId>,
    ) -> Result<Self, TopologyError> {
        let in_result = match result {
            Some(r) => reachable(store, r)?,
            None => HashSet::new(),
        };
        let mut history = History::default();
        let mut visited = HashSet::new();

        for &arg in ds.arguments() {
            for kind in [ShapeKind::Vertex, ShapeKind::Edge, ShapeKind::Face] {
                for s in subshapes(store, arg, kind)? {
                    if !visited.insert(s) {
                        continue;
                    }
                    let modified: Vec<ShapeId> = match kind {
                        ShapeKind::Vertex => vec![images.vertex(s)],
                        ShapeKind::Edge => images.edge_images(s).into_iter().map(|img| img.edge).collect(),
                        _ => images.face_images(s),
                    }
                    .into_iter()
                    .filter(|m| *m != s && in_result.contains(m))
                    .collect();

                    let generated = generated_from(store, ds, s, kind)?
                        .into_iter()
                        .filter(|g| in_result.contains(g))
                        .collect::<Vec<_>>();

                    if !in_result.contains(&s) && modified.is_empty() {
                        history.deleted.insert(s);
                    }
                    if !modified.is_empty() {
                        history.modified.insert(s, dedup(modified));
                    }
                    if !generated.is_empty() {
                        history.generated.insert(s, dedup(generated));
                    }
                }
            }
        }
        debug!(
            modified = history.modified.len(),
            generated = history.generated.len(),
            deleted = history.deleted.len(),
            "history built"
        );
        Ok(history)
    }

    /// Result shapes replacing `s`; empty when `s` survived unchanged or vanished.
    pub fn modified(&self, s: ShapeId) -> &[ShapeId] {
        self.modified.get(&s).map_or(&[], Vec::as_slice)
    }

    /// Result shapes created from `s` that are not images of it.
    pub fn generated(&self, s: ShapeId) -> &[ShapeId] {
        self.generated.get(&s).map_or(&[], Vec::as_slice)
    }

    pub fn is_deleted(&self, s: ShapeId) -> bool {
        self.deleted.contains(&s)
    }

    pub fn has_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    pub fn has_generated(&self) -> bool {
        !self.generated.is_empty()
    }

    pub fn has_deleted(&self) -> bool {
        !self.deleted.is_empty()
    }
}

/// Section edges and their vertices for faces, intersection vertices for edges.
fn generated_from(store: &ShapeStore, ds: &DataStructure, s: ShapeId, kind: ShapeKind) -> Result<Vec<ShapeId>, TopologyError> {
    let Some(i) = ds.index_of(s) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    match kind {
        ShapeKind::Face => {
            if let Some(info) = ds.face_info(i) {
                for &pb in &info.sc_blocks {
                    if let Some(e) = ds.split_edge_of(pb) {
                        let edge = ds.shape_id(e);
                        let (a, b) = store.edge_vertices(edge)?;
                        out.extend([edge, a, b]);
                    }
                }
            }
        }
        ShapeKind::Edge => {
            let own: Vec<ShapeId> = ds.info(i).sub_shapes.iter().map(|v| ds.shape_id(ds.real_vertex(*v))).collect();
            if let Some(paves) = ds.extra_paves.get(&i) {
                for pave in paves {
                    let v = ds.shape_id(ds.real_vertex(pave.vertex));
                    if !own.contains(&v) {
                        out.push(v);
                    }
                }
            }
        }
        _ => {}
    }
    Ok(out)
}

/// Every shape reachable from `root`, `root` included.
fn reachable(store: &ShapeStore, root: ShapeId) -> Result<HashSet<ShapeId>, TopologyError> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if seen.insert(id) {
            stack.extend(store.children(id)?.iter().map(|c| c.id));
        }
    }
    Ok(seen)
}

fn dedup(mut ids: Vec<ShapeId>) -> Vec<ShapeId> {
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(*id));
    ids
}
