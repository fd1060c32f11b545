//! Vertex/vertex, vertex/edge and vertex/face stages.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::ds::interference::{VertexEdge, VertexFace, VertexVertex};
use crate::ds::pave::Pave;
use crate::ds::ShapeIndex;
use crate::error::PreconditionError;
use crate::geometry::point::Point3d;
use crate::intersect::vertex::{vertex_edge, vertex_face};
use crate::topology::TopologyError;

use super::{Filler, UnionFind};

impl Filler<'_> {
    /// Merge chains of coincident vertices into one vertex per chain: the
    /// lowest-index member when its tolerance already covers the others,
    /// otherwise a new vertex at the chain centroid.
    #[instrument(skip_all)]
    pub(super) fn vertex_vertex(&mut self) -> Result<(), PreconditionError> {
        let pairs: Vec<(ShapeIndex, ShapeIndex)> = self.index.candidates(&self.ds, 0, 0).collect();
        let (store, ds) = (&*self.store, &self.ds);
        let results = self.executor.map(&pairs, &self.cancel, |&(a, b)| -> Result<bool, TopologyError> {
            let pa = ds.vertex_point(store, a)?;
            let pb = ds.vertex_point(store, b)?;
            Ok(crate::intersect::vertex::vertex_vertex(&pa, &pb, ds.pair_tolerance(a, b)).is_some())
        })?;

        let mut hits = Vec::new();
        let mut chains = UnionFind::default();
        for (&(a, b), hit) in pairs.iter().zip(results) {
            if hit? {
                chains.union(a, b);
                hits.push((a, b));
            }
        }
        let mut merged_into: BTreeMap<ShapeIndex, ShapeIndex> = BTreeMap::new();
        for group in chains.groups() {
            let points = group
                .iter()
                .map(|v| self.ds.vertex_point(self.store, *v))
                .collect::<Result<Vec<_>, _>>()?;
            let (Some(&first), Some(first_point)) = (group.first(), points.first()) else {
                continue;
            };
            let covers = group
                .iter()
                .zip(&points)
                .all(|(v, p)| p.distance_to(first_point) + self.ds.tolerance(*v) <= self.ds.tolerance(first));
            let merged = if covers {
                first
            } else {
                let Some(center) = Point3d::centroid(&points) else {
                    continue;
                };
                let tolerance = group
                    .iter()
                    .zip(&points)
                    .map(|(v, p)| p.distance_to(&center) + self.ds.tolerance(*v))
                    .fold(0.0, f64::max);
                self.make_vertex(center, tolerance)?
            };
            for v in &group {
                self.ds.set_same_domain(*v, merged);
                merged_into.insert(*v, merged);
            }
        }
        for (v1, v2) in hits {
            let new_vertex = merged_into.get(&v1).copied().unwrap_or(v1);
            self.ds.interferences.vv.push(VertexVertex { v1, v2, new_vertex });
        }
        debug!(pairs = pairs.len(), interferences = self.ds.interferences.vv.len(), "vertex/vertex");
        Ok(())
    }

    /// Vertices lying on edges of other arguments become extra paves.
    #[instrument(skip_all)]
    pub(super) fn vertex_edge(&mut self) -> Result<(), PreconditionError> {
        let pairs: Vec<(ShapeIndex, ShapeIndex)> = self
            .index
            .candidates(&self.ds, 0, 1)
            .filter(|&(v, e)| {
                let rv = self.ds.real_vertex(v);
                !self.ds.info(e).sub_shapes.iter().any(|w| self.ds.real_vertex(*w) == rv)
            })
            .collect();
        let (store, ds, settings) = (&*self.store, &self.ds, self.settings);
        let results = self.executor.map(&pairs, &self.cancel, |&(v, e)| -> Result<Option<(f64, f64)>, TopologyError> {
            let rv = ds.real_vertex(v);
            let p = ds.vertex_point(store, rv)?;
            let (curve, range) = store.edge_curve(ds.shape_id(e))?;
            Ok(vertex_edge(&p, curve, range, ds.pair_tolerance(rv, e), settings.max_iterations))
        })?;

        for (&(v, e), hit) in pairs.iter().zip(results) {
            let Some((t, d)) = hit? else {
                continue;
            };
            let rv = self.ds.real_vertex(v);
            if self.pave_vertices(e)?.contains(&rv) {
                continue;
            }
            let vertex = self.ds.ensure_tolerance(self.store, rv, d)?;
            self.ds.add_extra_pave(e, Pave::new(vertex, t));
            self.ds.interferences.ve.push(VertexEdge { vertex, edge: e, t });
        }
        debug!(pairs = pairs.len(), interferences = self.ds.interferences.ve.len(), "vertex/edge");
        Ok(())
    }

    /// Vertices lying inside faces of other arguments.
    #[instrument(skip_all)]
    pub(super) fn vertex_face(&mut self) -> Result<(), PreconditionError> {
        let pairs: Vec<(ShapeIndex, ShapeIndex)> = self
            .index
            .candidates(&self.ds, 0, 2)
            .filter(|&(v, f)| !self.ds.on_vertices(f).contains(&self.ds.real_vertex(v)))
            .collect();
        let (store, ds) = (&*self.store, &self.ds);
        let results = self.executor.map(&pairs, &self.cancel, |&(v, f)| -> Result<Option<(crate::geometry::point::Point2d, f64)>, TopologyError> {
            let Some(domain) = ds.domain(f) else {
                return Ok(None);
            };
            let rv = ds.real_vertex(v);
            let p = ds.vertex_point(store, rv)?;
            Ok(vertex_face(&p, domain, ds.pair_tolerance(rv, f)))
        })?;

        for (&(v, f), hit) in pairs.iter().zip(results) {
            let Some((uv, d)) = hit? else {
                continue;
            };
            let rv = self.ds.real_vertex(v);
            if self.ds.face_info(f).is_some_and(|fi| fi.in_vertices.contains(&rv)) {
                continue;
            }
            let vertex = self.ds.ensure_tolerance(self.store, rv, d)?;
            self.ds.face_info_mut(f).in_vertices.insert(vertex);
            self.ds.interferences.vf.push(VertexFace { vertex, face: f, uv });
        }
        debug!(pairs = pairs.len(), interferences = self.ds.interferences.vf.len(), "vertex/face");
        Ok(())
    }
}
