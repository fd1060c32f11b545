//! Face/face stage: section curves, their paves and tangency vertices.

use std::collections::BTreeSet;

use tracing::{debug, instrument, trace};

use crate::ds::interference::{FaceFace, SectionCurve};
use crate::ds::pave::Pave;
use crate::ds::ShapeIndex;
use crate::error::PreconditionError;
use crate::geometry::curves::Curve;
use crate::intersect::face_face::{intersect_faces, FaceFaceResult, FaceSpan, RawSection};
use crate::report::AlertCode;
use crate::topology::face_domain::DomainPosition;
use crate::topology::TopologyError;

use super::Filler;

impl Filler<'_> {
    #[instrument(skip_all)]
    pub(super) fn face_face(&mut self) -> Result<(), PreconditionError> {
        let pairs: Vec<(ShapeIndex, ShapeIndex)> = self
            .index
            .candidates(&self.ds, 2, 2)
            .filter(|&(a, b)| self.ds.domain(a).is_some() && self.ds.domain(b).is_some())
            .collect();
        let (ds, settings) = (&self.ds, self.settings);
        let results = self.executor.map(&pairs, &self.cancel, |&(f1, f2)| match (ds.domain(f1), ds.domain(f2)) {
            (Some(d1), Some(d2)) => intersect_faces(
                FaceSpan::new(d1, &ds.info(f1).bbox),
                FaceSpan::new(d2, &ds.info(f2).bbox),
                ds.pair_tolerance(f1, f2),
                &settings,
            ),
            _ => Ok(FaceFaceResult {
                converged: true,
                ..Default::default()
            }),
        })?;

        for (&(f1, f2), result) in pairs.iter().zip(results) {
            let shapes = vec![self.ds.shape_id(f1), self.ds.shape_id(f2)];
            let result = match result {
                Ok(r) => r,
                Err(err) => {
                    self.report.warning(AlertCode::UnsupportedGeometry, format!("face/face: {err}"), shapes);
                    continue;
                }
            };
            if !result.converged {
                self.report
                    .warning(AlertCode::IntersectionFailed, "face/face: marching did not converge, coarse curve kept", shapes);
            }
            let mut ff = FaceFace {
                f1,
                f2,
                coincident: result.coincident,
                curves: Vec::new(),
                points: Vec::new(),
            };
            if result.coincident {
                self.ds.interferences.ff.push(ff);
                continue;
            }

            let tol = self.ds.pair_tolerance(f1, f2);
            let sticks: Vec<ShapeIndex> = self
                .ds
                .face_vertices(f1)
                .intersection(&self.ds.face_vertices(f2))
                .copied()
                .collect();
            for raw in result.curves {
                let Some(section) = self.section_curve(f1, f2, raw, &sticks)? else {
                    continue;
                };
                for p in &section.paves {
                    self.ds.face_info_mut(f1).sc_vertices.insert(p.vertex);
                    self.ds.face_info_mut(f2).sc_vertices.insert(p.vertex);
                }
                ff.curves.push(section);
            }
            for p in result.points {
                let v = self.vertex_at(sticks.iter().copied(), p, tol, tol)?;
                self.ds.face_info_mut(f1).sc_vertices.insert(v);
                self.ds.face_info_mut(f2).sc_vertices.insert(v);
                ff.points.push((p, v));
            }
            if !ff.curves.is_empty() || !ff.points.is_empty() {
                self.ds.interferences.ff.push(ff);
            }
        }
        debug!(pairs = pairs.len(), interferences = self.ds.interferences.ff.len(), "face/face");
        Ok(())
    }

    /// Place the paves of one raw section curve.
    ///
    /// Paves come from vertices shared by both faces that lie on the curve.
    /// Closed curves are bounded by one vertex at both ends so every block
    /// has two paves; curves lying outside either face are dropped.
    fn section_curve(
        &mut self,
        f1: ShapeIndex,
        f2: ShapeIndex,
        raw: RawSection,
        sticks: &[ShapeIndex],
    ) -> Result<Option<SectionCurve>, TopologyError> {
        let RawSection {
            curve,
            mut range,
            tolerance,
            tangential,
        } = raw;
        let iters = self.settings.max_iterations;

        let mut paves: Vec<Pave> = Vec::new();
        let mut seen = BTreeSet::new();
        for &v in sticks {
            let p = self.ds.vertex_point(self.store, v)?;
            let proj = curve.project(&p, range, iters);
            if proj.distance <= self.ds.tolerance(v) + tolerance {
                let v = self.ds.ensure_tolerance(self.store, v, proj.distance)?;
                if seen.insert(v) {
                    paves.push(Pave::new(v, proj.t));
                }
            }
        }
        paves.sort_by(|a, b| a.t.total_cmp(&b.t).then(a.vertex.cmp(&b.vertex)));

        let full_period = curve.period().filter(|p| (range.1 - range.0 - p).abs() < 1e-9);
        if let Some(period) = full_period {
            match paves.first().copied() {
                Some(first) => {
                    range = (first.t, first.t + period);
                    for p in paves.iter_mut() {
                        if p.t < first.t {
                            p.t += period;
                        }
                    }
                    paves.push(Pave::new(first.vertex, first.t + period));
                }
                None => {
                    if !self.inside_both(f1, f2, &curve, range, tolerance) {
                        return Ok(None);
                    }
                    let v = self.make_vertex(curve.evaluate(range.0), tolerance)?;
                    paves = vec![Pave::new(v, range.0), Pave::new(v, range.1)];
                }
            }
        } else if matches!(curve, Curve::BSpline(_)) {
            let closed = curve.is_closed(range, tolerance);
            let start = curve.evaluate(range.0);
            let v0 = self.vertex_at(sticks.iter().copied(), start, tolerance, tolerance)?;
            let v1 = if closed {
                v0
            } else {
                self.vertex_at(sticks.iter().copied(), curve.evaluate(range.1), tolerance, tolerance)?
            };
            for (v, t) in [(v0, range.0), (v1, range.1)] {
                let v = self.ds.real_vertex(v);
                if closed || !paves.iter().any(|p| p.vertex == v) {
                    paves.push(Pave::new(v, t));
                }
            }
        }

        if paves.len() < 2 {
            trace!(f1, f2, curve = curve.curve_type_name(), "section curve without paves");
        }
        Ok(Some(SectionCurve {
            curve,
            range,
            tolerance,
            tangential,
            paves,
        }))
    }

    fn inside_both(&self, f1: ShapeIndex, f2: ShapeIndex, curve: &Curve, range: (f64, f64), tol: f64) -> bool {
        let p = curve.evaluate(0.5 * (range.0 + range.1));
        [f1, f2].iter().all(|f| {
            self.ds
                .domain(*f)
                .is_some_and(|d| d.classify_point(&p, tol) != DomainPosition::Outside)
        })
    }
}
