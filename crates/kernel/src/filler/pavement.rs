//! Pavement stages: split edges and section curves at their paves, group
//! coincident blocks and materialize split edges.

use tracing::{debug, instrument, warn};

use crate::ds::pave::{CommonBlock, CommonBlockId, Pave, PaveBlock, PaveBlockId, Pavement};
use crate::ds::ShapeIndex;
use crate::error::PreconditionError;
use crate::report::AlertCode;
use crate::topology::face_domain::DomainPosition;
use crate::topology::{ShapeKind, TopologyError};

use super::{Filler, UnionFind};

const MAX_MERGE_ROUNDS: usize = 4;
const MAX_TRANSFER_ROUNDS: usize = 8;

impl Filler<'_> {
    /// Sort the paves of every argument edge into pave blocks.
    #[instrument(skip_all)]
    pub(super) fn build_pavements(&mut self) -> Result<(), PreconditionError> {
        self.transfer_common_paves()?;
        let edges: Vec<ShapeIndex> = self
            .ds
            .indices_of_kind(ShapeKind::Edge)
            .filter(|e| *e < self.ds.source_count() && !self.ds.info(*e).invalid)
            .collect();

        let mut round = 0;
        let pavements = loop {
            let (store, ds) = (&*self.store, &self.ds);
            let pavements = self.executor.map(&edges, &self.cancel, |&e| -> Result<Pavement, TopologyError> {
                let paves = ds.edge_paves(store, e)?;
                let (curve, range) = store.edge_curve(ds.shape_id(e))?;
                Ok(Pavement::build(paves, curve, range, ds.tolerance(e) + ds.fuzzy, |v| ds.real_vertex(v)))
            })?;
            let pavements = pavements.into_iter().collect::<Result<Vec<_>, _>>()?;
            let merges: Vec<(ShapeIndex, ShapeIndex)> = pavements.iter().flat_map(|p| p.merges.iter().copied()).collect();
            round += 1;
            if merges.is_empty() {
                break pavements;
            }
            if round == MAX_MERGE_ROUNDS {
                warn!(merges = merges.len(), "vertex merging did not settle");
                self.report.warning(
                    AlertCode::IntersectionFailed,
                    "vertices on edges kept merging; pavement left as is",
                    Vec::new(),
                );
                break pavements;
            }
            for (absorbed, kept) in merges {
                self.merge_vertices(absorbed, kept)?;
            }
        };

        for (&e, pavement) in edges.iter().zip(pavements) {
            for (p1, p2) in pavement.blocks() {
                self.ds.add_pave_block(PaveBlock::new(e, p1, p2));
            }
        }
        debug!(rounds = round, blocks = self.ds.pave_blocks().len(), "pavements built");
        Ok(())
    }

    /// Paves found on one edge of a common range are copied onto the other
    /// until no edge gains a pave.
    fn transfer_common_paves(&mut self) -> Result<(), TopologyError> {
        let ranges = self.ds.common_ranges.clone();
        for _ in 0..MAX_TRANSFER_ROUNDS {
            let mut added = false;
            for cr in &ranges {
                for (from, from_range, to, to_range) in [(cr.e1, cr.r1, cr.e2, cr.r2), (cr.e2, cr.r2, cr.e1, cr.r1)] {
                    let (lo, hi) = (from_range.0.min(from_range.1), from_range.0.max(from_range.1));
                    let span = (to_range.0.min(to_range.1), to_range.0.max(to_range.1));
                    for pave in self.ds.edge_paves(self.store, from)? {
                        if pave.t < lo - 1e-12 || pave.t > hi + 1e-12 {
                            continue;
                        }
                        let p = self.ds.vertex_point(self.store, pave.vertex)?;
                        let (curve, _) = self.store.edge_curve(self.ds.shape_id(to))?;
                        let proj = curve.project(&p, span, self.settings.max_iterations);
                        if proj.distance > self.ds.tolerance(pave.vertex) + self.ds.pair_tolerance(from, to) {
                            continue;
                        }
                        let vertex = self.ds.ensure_tolerance(self.store, pave.vertex, proj.distance)?;
                        added |= self.add_pave_once(to, vertex, proj.t)?;
                    }
                }
            }
            if !added {
                break;
            }
        }
        Ok(())
    }

    /// Group blocks of overlapping edges and attach blocks lying on faces.
    #[instrument(skip_all)]
    pub(super) fn build_common_blocks(&mut self) -> Result<(), PreconditionError> {
        let mut groups = UnionFind::default();
        for cr in self.ds.common_ranges.clone() {
            let tol = self.ds.pair_tolerance(cr.e1, cr.e2);
            let (c1, _) = self.store.edge_curve(self.ds.shape_id(cr.e1))?;
            let (c2, _) = self.store.edge_curve(self.ds.shape_id(cr.e2))?;
            for &b1 in self.ds.edge_blocks(cr.e1) {
                for &b2 in self.ds.edge_blocks(cr.e2) {
                    let (pb1, pb2) = (self.ds.block(b1), self.ds.block(b2));
                    if self.real_key(pb1) != self.real_key(pb2) {
                        continue;
                    }
                    let mid = c1.evaluate(pb1.mid_parameter());
                    let (lo, hi) = ordered(pb2.range());
                    if c2.project(&mid, (lo, hi), self.settings.max_iterations).distance <= tol {
                        groups.union(b1.0, b2.0);
                    }
                }
            }
        }
        for group in groups.groups() {
            if group.len() < 2 {
                continue;
            }
            self.ds.add_common_block(CommonBlock {
                blocks: group.into_iter().map(PaveBlockId).collect(),
                faces: Vec::new(),
                edge: None,
            });
        }

        for (e, f) in self.ds.edge_on_face.clone() {
            let Some(domain) = self.ds.domain(f) else {
                continue;
            };
            let tol = self.ds.pair_tolerance(e, f);
            let (curve, _) = self.store.edge_curve(self.ds.shape_id(e))?;
            let inside: Vec<PaveBlockId> = self
                .ds
                .edge_blocks(e)
                .iter()
                .copied()
                .filter(|pb| domain.classify_point(&curve.evaluate(self.ds.block(*pb).mid_parameter()), tol) == DomainPosition::Inside)
                .collect();
            for pb in inside {
                let fi = self.ds.face_info_mut(f);
                if !fi.in_blocks.contains(&pb) {
                    fi.in_blocks.push(pb);
                }
                if let Some(cb) = self.ds.block(pb).common_block {
                    let faces = &mut self.ds.common_block_mut(cb).faces;
                    if !faces.contains(&f) {
                        faces.push(f);
                    }
                }
            }
        }
        debug!(common_blocks = self.ds.common_blocks().len(), "common blocks built");
        Ok(())
    }

    /// Split every section curve at its paves and turn the blocks lying on
    /// both faces into section edges.
    #[instrument(skip_all)]
    pub(super) fn build_section_edges(&mut self) -> Result<(), PreconditionError> {
        for i in 0..self.ds.interferences.ff.len() {
            let (f1, f2) = (self.ds.interferences.ff[i].f1, self.ds.interferences.ff[i].f2);
            for j in 0..self.ds.interferences.ff[i].curves.len() {
                self.cancel.check()?;
                let section = self.ds.interferences.ff[i].curves[j].clone();
                let pavement = {
                    let ds = &self.ds;
                    Pavement::build(section.paves.clone(), &section.curve, section.range, section.tolerance, |v| ds.real_vertex(v))
                };
                for (absorbed, kept) in &pavement.merges {
                    self.merge_vertices(*absorbed, *kept)?;
                }
                let paves: Vec<Pave> = pavement.paves.iter().map(|p| Pave::new(self.ds.real_vertex(p.vertex), p.t)).collect();
                self.ds.interferences.ff[i].curves[j].paves = paves.clone();

                for w in paves.windows(2) {
                    let (p1, p2) = (w[0], w[1]);
                    let tol = section.tolerance;
                    if section.curve.approximate_length((p1.t, p2.t), 4) <= tol {
                        continue;
                    }
                    let mid = section.curve.evaluate(0.5 * (p1.t + p2.t));
                    let on_both = [f1, f2].iter().all(|f| {
                        self.ds
                            .domain(*f)
                            .is_some_and(|d| d.classify_point(&mid, tol) != DomainPosition::Outside)
                    });
                    if !on_both {
                        continue;
                    }
                    if let Some(existing) = self.existing_block(f1, f2, p1.vertex, p2.vertex, &mid, tol)? {
                        self.ds.add_section_block(existing);
                        for f in [f1, f2] {
                            if !self.ds.is_on_face_boundary(existing, f) {
                                let fi = self.ds.face_info_mut(f);
                                if !fi.in_blocks.contains(&existing) {
                                    fi.in_blocks.push(existing);
                                }
                            }
                        }
                        continue;
                    }
                    let start = self.ds.shape_id(p1.vertex);
                    let end = self.ds.shape_id(p2.vertex);
                    let id = self.store.add_edge(section.curve.clone(), (p1.t, p2.t), start, end, tol);
                    let edge = self.ds.append(self.store, id)?;
                    let mut block = PaveBlock::new(edge, p1, p2);
                    block.split_edge = Some(edge);
                    let pb = self.ds.add_pave_block(block);
                    self.ds.add_section_block(pb);
                    self.ds.face_info_mut(f1).sc_blocks.push(pb);
                    self.ds.face_info_mut(f2).sc_blocks.push(pb);
                }
            }
        }
        debug!(section_blocks = self.ds.section_blocks().len(), "section edges built");
        Ok(())
    }

    /// A block already known to either face with the same end vertices and
    /// passing through `mid`.
    fn existing_block(
        &self,
        f1: ShapeIndex,
        f2: ShapeIndex,
        v1: ShapeIndex,
        v2: ShapeIndex,
        mid: &crate::geometry::point::Point3d,
        tol: f64,
    ) -> Result<Option<PaveBlockId>, TopologyError> {
        let key = if v1 <= v2 { (v1, v2) } else { (v2, v1) };
        let mut candidates: Vec<PaveBlockId> = Vec::new();
        for f in [f1, f2] {
            for &e in &self.ds.info(f).sub_shapes {
                candidates.extend_from_slice(self.ds.edge_blocks(e));
            }
            if let Some(fi) = self.ds.face_info(f) {
                candidates.extend(fi.in_blocks.iter().copied());
                candidates.extend(fi.sc_blocks.iter().copied());
            }
        }
        for pb in candidates {
            let block = self.ds.block(pb);
            if self.real_key(block) != key {
                continue;
            }
            let (curve, _) = self.store.edge_curve(self.ds.shape_id(block.original_edge))?;
            let d = curve.project(mid, ordered(block.range()), self.settings.max_iterations).distance;
            if d <= tol + self.ds.tolerance(block.original_edge) {
                return Ok(Some(pb));
            }
        }
        Ok(None)
    }

    /// Give every argument block an edge: unchanged edges are reused, split
    /// parts get a new edge on the same curve, and each common block shares
    /// one edge.
    #[instrument(skip_all)]
    pub(super) fn build_split_edges(&mut self) -> Result<(), PreconditionError> {
        for i in 0..self.ds.pave_blocks().len() {
            let pb = PaveBlockId(i);
            let block = self.ds.block(pb);
            if block.split_edge.is_some() || block.common_block.is_some() {
                continue;
            }
            let edge = self.split_edge_for(pb)?;
            self.ds.block_mut(pb).split_edge = Some(edge);
        }
        for c in 0..self.ds.common_blocks().len() {
            let cb = CommonBlockId(c);
            let Some(rep) = self
                .ds
                .common_block(cb)
                .blocks
                .iter()
                .copied()
                .min_by_key(|pb| (self.ds.block(*pb).original_edge, *pb))
            else {
                continue;
            };
            let edge = self.split_edge_for(rep)?;
            self.ds.block_mut(rep).split_edge = Some(edge);
            self.ds.common_block_mut(cb).edge = Some(edge);
        }
        debug!(shapes = self.ds.len(), "split edges built");
        Ok(())
    }

    fn split_edge_for(&mut self, pb: PaveBlockId) -> Result<ShapeIndex, TopologyError> {
        let block = self.ds.block(pb).clone();
        let e = block.original_edge;
        let id = self.ds.shape_id(e);
        let (curve, range) = self.store.edge_curve(id)?;
        let own = &self.ds.info(e).sub_shapes;
        let unchanged = self.ds.edge_blocks(e).len() == 1
            && own.first() == Some(&block.pave1.vertex)
            && own.last() == Some(&block.pave2.vertex)
            && block.range() == range;
        if unchanged {
            return Ok(e);
        }
        let curve = curve.clone();
        let start = self.ds.shape_id(self.ds.real_vertex(block.pave1.vertex));
        let end = self.ds.shape_id(self.ds.real_vertex(block.pave2.vertex));
        let split = self.store.add_edge(curve, block.range(), start, end, self.ds.tolerance(e));
        self.ds.append(self.store, split)
    }

    fn real_key(&self, block: &PaveBlock) -> (ShapeIndex, ShapeIndex) {
        let (a, b) = (self.ds.real_vertex(block.pave1.vertex), self.ds.real_vertex(block.pave2.vertex));
        if a <= b { (a, b) } else { (b, a) }
    }
}

fn ordered(r: (f64, f64)) -> (f64, f64) {
    if r.0 <= r.1 { r } else { (r.1, r.0) }
}
