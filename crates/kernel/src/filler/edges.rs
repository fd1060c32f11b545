//! Edge/edge and edge/face stages.

use tracing::{debug, instrument};

use crate::ds::interference::{EdgeEdge, EdgeEdgeKind, EdgeFace, EdgeFaceKind};
use crate::ds::{CommonRange, ShapeIndex};
use crate::error::PreconditionError;
use crate::intersect::edge_edge::{intersect_edges, CurveSpan, EeHit};
use crate::intersect::edge_face::{intersect_edge_face, EfHit};
use crate::intersect::{Hits, IntersectError};
use crate::report::AlertCode;
use crate::topology::face_domain::DomainPosition;
use crate::topology::TopologyError;

use super::Filler;

type PairResult<T> = Result<Result<Hits<T>, IntersectError>, TopologyError>;

impl Filler<'_> {
    /// Report an unusable pair result; `None` when the pair is skipped.
    fn accept<T>(&mut self, a: ShapeIndex, b: ShapeIndex, result: Result<Hits<T>, IntersectError>, what: &str) -> Option<Vec<T>> {
        let shapes = vec![self.ds.shape_id(a), self.ds.shape_id(b)];
        match result {
            Err(err) => {
                self.report.warning(AlertCode::UnsupportedGeometry, format!("{what}: {err}"), shapes);
                None
            }
            Ok(hits) => {
                if !hits.converged {
                    self.report.warning(AlertCode::IntersectionFailed, format!("{what}: solver did not converge, coarse result kept"), shapes);
                }
                Some(hits.items)
            }
        }
    }

    #[instrument(skip_all)]
    pub(super) fn edge_edge(&mut self) -> Result<(), PreconditionError> {
        let pairs: Vec<(ShapeIndex, ShapeIndex)> = self.index.candidates(&self.ds, 1, 1).collect();
        let (store, ds, settings) = (&*self.store, &self.ds, self.settings);
        let results = self.executor.map(&pairs, &self.cancel, |&(e1, e2)| -> PairResult<EeHit> {
            let (c1, r1) = store.edge_curve(ds.shape_id(e1))?;
            let (c2, r2) = store.edge_curve(ds.shape_id(e2))?;
            Ok(intersect_edges(CurveSpan::new(c1, r1), CurveSpan::new(c2, r2), ds.pair_tolerance(e1, e2), &settings))
        })?;

        for (&(e1, e2), result) in pairs.iter().zip(results) {
            let Some(hits) = self.accept(e1, e2, result?, "edge/edge") else {
                continue;
            };
            let tol = self.ds.pair_tolerance(e1, e2);
            let grown = self.ds.tolerance(e1).max(self.ds.tolerance(e2));
            for hit in hits {
                match hit {
                    EeHit::Point { t1, t2, point, distance } => {
                        let candidates = [self.pave_vertices(e1)?, self.pave_vertices(e2)?].concat();
                        let vertex = self.vertex_at(candidates, point, tol, grown + 0.5 * distance)?;
                        let ends_of = |e: ShapeIndex| self.ds.info(e).sub_shapes.iter().any(|w| self.ds.real_vertex(*w) == vertex);
                        if ends_of(e1) && ends_of(e2) {
                            continue;
                        }
                        self.add_pave_once(e1, vertex, t1)?;
                        self.add_pave_once(e2, vertex, t2)?;
                        self.ds.interferences.ee.push(EdgeEdge {
                            e1,
                            e2,
                            kind: EdgeEdgeKind::Point { t1, t2, vertex },
                        });
                    }
                    EeHit::Common { r1, r2 } => {
                        let (c1, _) = self.store.edge_curve(self.ds.shape_id(e1))?;
                        let ends = [(r1.0, r2.0, c1.evaluate(r1.0)), (r1.1, r2.1, c1.evaluate(r1.1))];
                        for (t1, t2, point) in ends {
                            let candidates = [self.pave_vertices(e1)?, self.pave_vertices(e2)?].concat();
                            let vertex = self.vertex_at(candidates, point, tol, grown)?;
                            self.add_pave_once(e1, vertex, t1)?;
                            self.add_pave_once(e2, vertex, t2)?;
                        }
                        self.ds.common_ranges.push(CommonRange { e1, r1, e2, r2 });
                        self.ds.interferences.ee.push(EdgeEdge {
                            e1,
                            e2,
                            kind: EdgeEdgeKind::Common { r1, r2 },
                        });
                    }
                }
            }
        }
        debug!(pairs = pairs.len(), interferences = self.ds.interferences.ee.len(), "edge/edge");
        Ok(())
    }

    #[instrument(skip_all)]
    pub(super) fn edge_face(&mut self) -> Result<(), PreconditionError> {
        let pairs: Vec<(ShapeIndex, ShapeIndex)> = self
            .index
            .candidates(&self.ds, 1, 2)
            .filter(|&(e, f)| !self.ds.info(f).sub_shapes.contains(&e) && self.ds.domain(f).is_some())
            .collect();
        let (store, ds, settings) = (&*self.store, &self.ds, self.settings);
        let results = self.executor.map(&pairs, &self.cancel, |&(e, f)| -> PairResult<EfHit> {
            let (curve, range) = store.edge_curve(ds.shape_id(e))?;
            let Some(domain) = ds.domain(f) else {
                return Ok(Ok(Hits::none()));
            };
            Ok(intersect_edge_face(CurveSpan::new(curve, range), domain, ds.pair_tolerance(e, f), &settings))
        })?;

        for (&(e, f), result) in pairs.iter().zip(results) {
            let Some(hits) = self.accept(e, f, result?, "edge/face") else {
                continue;
            };
            let tol = self.ds.pair_tolerance(e, f);
            let grown = self.ds.tolerance(e).max(self.ds.tolerance(f));
            for hit in hits {
                match hit {
                    EfHit::Point {
                        t,
                        uv,
                        point,
                        distance,
                        position: DomainPosition::Inside,
                    } => {
                        let candidates = self.pave_vertices(e)?;
                        let vertex = self.vertex_at(candidates, point, tol, grown + distance)?;
                        self.add_pave_once(e, vertex, t)?;
                        self.ds.face_info_mut(f).in_vertices.insert(vertex);
                        self.ds.interferences.ef.push(EdgeFace {
                            edge: e,
                            face: f,
                            kind: EdgeFaceKind::Point { t, uv, vertex },
                        });
                    }
                    // Boundary contacts are edge/edge or vertex/edge business.
                    EfHit::Point { .. } => {}
                    EfHit::Common { range } => {
                        if !self.ds.edge_on_face.contains(&(e, f)) {
                            self.ds.edge_on_face.push((e, f));
                        }
                        let (curve, _) = self.store.edge_curve(self.ds.shape_id(e))?;
                        let ends = [(range.0, curve.evaluate(range.0)), (range.1, curve.evaluate(range.1))];
                        for (t, point) in ends {
                            let candidates = [self.pave_vertices(e)?, self.ds.on_vertices(f).into_iter().collect()].concat();
                            let vertex = self.vertex_at(candidates, point, tol, grown)?;
                            self.add_pave_once(e, vertex, t)?;
                            let inside = self
                                .ds
                                .domain(f)
                                .is_some_and(|d| d.classify_point(&point, tol) == DomainPosition::Inside);
                            if inside {
                                self.ds.face_info_mut(f).in_vertices.insert(vertex);
                            }
                        }
                        self.ds.interferences.ef.push(EdgeFace {
                            edge: e,
                            face: f,
                            kind: EdgeFaceKind::Common { range },
                        });
                    }
                }
            }
        }
        debug!(pairs = pairs.len(), interferences = self.ds.interferences.ef.len(), "edge/face");
        Ok(())
    }
}
