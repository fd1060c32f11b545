//! Assembly of selected faces into shells and solids.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::f64::consts::TAU;

use tracing::{debug, instrument, warn};

use crate::classify::{Classifier, State};
use crate::config::BooleanOptions;
use crate::filler::UnionFind;
use crate::geometry::vector::Vec3;
use crate::measure::oriented_volume;
use crate::report::{AlertCode, Report};
use crate::topology::explore::oriented_subshapes;
use crate::topology::face_domain::FaceDomain;
use crate::topology::{Orientation, ShapeId, ShapeKind, ShapeRef, ShapeStore, TopologyError};

/// Closed shells enclosing less than this are treated as flat and kept as shells.
const VOLUME_EPSILON: f64 = 1e-12;

/// One use of an edge by a selected face.
#[derive(Debug, Clone, Copy)]
struct EdgeUse {
    face: usize,
    orientation: Orientation,
}

/// How a shell closes over its edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    Closed,
    Open,
    NonManifold,
    BadOrientation,
}

/// Groups `faces` into shells and closed shells into solids.
pub struct ShellBuilder<'a> {
    store: &'a mut ShapeStore,
    options: &'a BooleanOptions,
    /// Report open shells; off when the arguments were not all solids.
    expect_closed: bool,
}

impl<'a> ShellBuilder<'a> {
    pub fn new(store: &'a mut ShapeStore, options: &'a BooleanOptions, expect_closed: bool) -> Self {
        Self {
            store,
            options,
            expect_closed,
        }
    }

    /// Assemble `faces`. Returns `None` for an empty face list, the single
    /// shell or solid when there is exactly one, a compound otherwise.
    #[instrument(skip_all, fields(faces = faces.len()))]
    pub fn build(mut self, faces: &[ShapeRef], report: &mut Report) -> Result<Option<ShapeId>, TopologyError> {
        if faces.is_empty() {
            return Ok(None);
        }
        let shells = self.connect(faces)?;
        let mut closed = Vec::new();
        let mut items = Vec::new();
        for shell in shells {
            match closure(self.store, shell)? {
                Closure::Closed => closed.push(shell),
                state => {
                    self.report_closure(state, shell, report);
                    items.push(ShapeRef::forward(shell));
                }
            }
        }
        items.extend(self.solids(&closed, report)?);

        debug!(items = items.len(), "shells assembled");
        Ok(match items.as_slice() {
            [] => None,
            [single] if single.orientation.is_forward() => Some(single.id),
            _ => Some(self.store.add_compound(items)),
        })
    }

    fn report_closure(&self, state: Closure, shell: ShapeId, report: &mut Report) {
        match state {
            Closure::Closed => {}
            Closure::NonManifold => {
                report.warning(AlertCode::NonManifoldEdge, "shell has an edge shared by more than two faces", vec![shell])
            }
            Closure::BadOrientation => report.error(
                AlertCode::BadOrientation,
                "adjacent faces traverse a shared edge in the same direction",
                vec![shell],
            ),
            Closure::Open if self.expect_closed => {
                report.warning(AlertCode::OpenShell, "shell left open", vec![shell])
            }
            Closure::Open => {}
        }
    }

    /// Connected components of `faces` through shared edges, with
    /// non-manifold edges resolved by angular pairing.
    fn connect(&mut self, faces: &[ShapeRef]) -> Result<Vec<ShapeId>, TopologyError> {
        let mut uses: BTreeMap<ShapeId, Vec<EdgeUse>> = BTreeMap::new();
        for (i, face) in faces.iter().enumerate() {
            for e in oriented_subshapes(self.store, *face, ShapeKind::Edge)? {
                uses.entry(e.id).or_default().push(EdgeUse {
                    face: i,
                    orientation: e.orientation,
                });
            }
        }

        let mut components = UnionFind::default();
        for i in 0..faces.len() {
            components.union(i, i);
        }
        for (edge, list) in &uses {
            let mut distinct: Vec<usize> = list.iter().map(|u| u.face).collect();
            distinct.dedup();
            if list.len() <= 2 || distinct.len() <= 2 {
                for w in list.windows(2) {
                    components.union(w[0].face, w[1].face);
                }
                continue;
            }
            for (a, b) in self.pair_around(*edge, list, faces)? {
                components.union(a, b);
            }
        }

        let groups = components.groups();
        let mut shells = Vec::with_capacity(groups.len());
        for group in groups {
            let members = group.iter().map(|i| faces[*i]).collect();
            shells.push(self.store.add_shell(members));
        }
        Ok(shells)
    }

    /// Pair the faces around a non-manifold edge so that every pair bounds
    /// one wedge of material.
    fn pair_around(&self, edge: ShapeId, list: &[EdgeUse], faces: &[ShapeRef]) -> Result<Vec<(usize, usize)>, TopologyError> {
        let (curve, range) = self.store.edge_curve(edge)?;
        let t = 0.5 * (range.0 + range.1);
        let p = curve.evaluate(t);
        let tangent = curve.tangent(t);

        let mut around = Vec::with_capacity(list.len());
        for u in list {
            let face = faces[u.face];
            let surface = self.store.face_surface(face.id)?;
            let uv = surface.project(&p, None, self.options.newton_max_iterations);
            let normal = surface.normal_at(uv.x, uv.y) * face.orientation.sign();
            let direction = tangent * u.orientation.sign();
            let into = normal.cross(&direction).normalize();
            around.push((u.face, normal, into));
        }
        let x = around[0].2;
        let y = tangent.cross(&x);
        let angle = |v: &Vec3| v.dot(&y).atan2(v.dot(&x)).rem_euclid(TAU);
        around.sort_by(|a, b| angle(&a.2).partial_cmp(&angle(&b.2)).unwrap_or(Ordering::Equal));

        // Material lies on the side of increasing angle from this face.
        let opens = |(_, n, into): &(usize, Vec3, Vec3)| n.dot(&tangent.cross(into)) < 0.0;
        let Some(start) = around.iter().position(opens) else {
            warn!(?edge, "no face opens a wedge around non-manifold edge");
            return Ok(Vec::new());
        };
        let n = around.len();
        Ok((0..n / 2)
            .map(|k| (around[(start + 2 * k) % n].0, around[(start + 2 * k + 1) % n].0))
            .collect())
    }

    /// Outer shells become solids; each cavity joins the smallest outer shell
    /// containing it.
    fn solids(&mut self, closed: &[ShapeId], report: &mut Report) -> Result<Vec<ShapeRef>, TopologyError> {
        let mut outers = Vec::new();
        let mut cavities = Vec::new();
        let mut flat = Vec::new();
        for &shell in closed {
            let volume = oriented_volume(self.store, ShapeRef::forward(shell))?;
            if volume > VOLUME_EPSILON {
                outers.push((shell, volume));
            } else if volume < -VOLUME_EPSILON {
                cavities.push(shell);
            } else {
                flat.push(ShapeRef::forward(shell));
            }
        }
        outers.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        let mut holes: Vec<Vec<ShapeId>> = vec![Vec::new(); outers.len()];
        let mut loose = Vec::new();
        for cavity in cavities {
            match self.enclosing(cavity, &outers)? {
                Some(i) => holes[i].push(cavity),
                None => {
                    report.warning(AlertCode::UnassignedCavity, "no outer shell contains the cavity", vec![cavity]);
                    loose.push(ShapeRef::forward(cavity));
                }
            }
        }

        let mut out = Vec::with_capacity(outers.len() + loose.len() + flat.len());
        for ((outer, _), cavities) in outers.iter().zip(holes) {
            let mut shells = vec![ShapeRef::forward(*outer)];
            shells.extend(cavities.into_iter().map(ShapeRef::forward));
            out.push(ShapeRef::forward(self.store.add_solid(shells)));
        }
        out.extend(loose);
        out.extend(flat);
        Ok(out)
    }

    /// Index of the smallest outer shell containing `cavity`.
    fn enclosing(&self, cavity: ShapeId, outers: &[(ShapeId, f64)]) -> Result<Option<usize>, TopologyError> {
        let Some(face) = self.store.children(cavity)?.first().copied() else {
            return Ok(None);
        };
        let domain = FaceDomain::build(
            self.store,
            face.id,
            self.options.curve_samples,
            self.options.newton_max_iterations,
        )?;
        let Some((probe, _)) = domain.interior_point() else {
            return Ok(None);
        };
        for (i, (outer, _)) in outers.iter().enumerate() {
            let classifier = Classifier::for_closed_shell(self.store, *outer, self.options)?;
            if classifier.classify_point(&probe) == State::In {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

/// Check that every edge of `shell` is used once in each direction.
pub fn closure(store: &ShapeStore, shell: ShapeId) -> Result<Closure, TopologyError> {
    let mut counts: BTreeMap<ShapeId, (usize, usize)> = BTreeMap::new();
    for e in oriented_subshapes(store, ShapeRef::forward(shell), ShapeKind::Edge)? {
        let entry = counts.entry(e.id).or_default();
        if e.orientation.is_forward() {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }
    let mut state = Closure::Closed;
    for (forward, reversed) in counts.into_values() {
        let next = match (forward, reversed) {
            (1, 1) => continue,
            (f, r) if f + r > 2 => Closure::NonManifold,
            (2, 0) | (0, 2) => Closure::BadOrientation,
            _ => Closure::Open,
        };
        // Keep the most severe finding.
        state = match (state, next) {
            (Closure::NonManifold, _) | (_, Closure::NonManifold) => Closure::NonManifold,
            (Closure::BadOrientation, _) | (_, Closure::BadOrientation) => Closure::BadOrientation,
            _ => Closure::Open,
        };
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::measure::solid_volume;
    use crate::topology::primitives::make_box;
    use approx::assert_relative_eq;

    fn box_faces(store: &mut ShapeStore, min: Point3d, max: Point3d) -> Vec<ShapeRef> {
        let solid = make_box(store, min, max);
        oriented_subshapes(store, ShapeRef::forward(solid), ShapeKind::Face).unwrap()
    }

    #[test]
    fn test_box_faces_make_one_solid() {
        let mut store = ShapeStore::new();
        let faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 1.0, 1.0));
        let options = BooleanOptions::sequential();
        let mut report = Report::new();
        let result = ShellBuilder::new(&mut store, &options, true).build(&faces, &mut report).unwrap().unwrap();
        assert_eq!(store.kind(result).unwrap(), ShapeKind::Solid);
        assert_relative_eq!(solid_volume(&store, result).unwrap(), 2.0, epsilon = 1e-9);
        assert!(report.alerts().is_empty());
    }

    #[test]
    fn test_disjoint_boxes_make_compound() {
        let mut store = ShapeStore::new();
        let mut faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        faces.extend(box_faces(&mut store, Point3d::new(3.0, 0.0, 0.0), Point3d::new(4.0, 1.0, 1.0)));
        let options = BooleanOptions::sequential();
        let mut report = Report::new();
        let result = ShellBuilder::new(&mut store, &options, true).build(&faces, &mut report).unwrap().unwrap();
        assert_eq!(store.kind(result).unwrap(), ShapeKind::Compound);
        assert_eq!(store.children(result).unwrap().len(), 2);
        assert_relative_eq!(solid_volume(&store, result).unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cavity_joins_outer_shell() {
        let mut store = ShapeStore::new();
        let mut faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0));
        let inner = box_faces(&mut store, Point3d::new(0.5, 0.5, 0.5), Point3d::new(1.0, 1.0, 1.0));
        faces.extend(inner.into_iter().map(ShapeRef::flipped));
        let options = BooleanOptions::sequential();
        let mut report = Report::new();
        let result = ShellBuilder::new(&mut store, &options, true).build(&faces, &mut report).unwrap().unwrap();
        assert_eq!(store.kind(result).unwrap(), ShapeKind::Solid);
        assert_eq!(store.children(result).unwrap().len(), 2);
        assert_relative_eq!(solid_volume(&store, result).unwrap(), 8.0 - 0.125, epsilon = 1e-9);
        assert!(!report.has_code(AlertCode::UnassignedCavity));
    }

    #[test]
    fn test_missing_face_leaves_open_shell() {
        let mut store = ShapeStore::new();
        let mut faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        faces.pop();
        let options = BooleanOptions::sequential();
        let mut report = Report::new();
        let result = ShellBuilder::new(&mut store, &options, true).build(&faces, &mut report).unwrap().unwrap();
        assert_eq!(store.kind(result).unwrap(), ShapeKind::Shell);
        assert!(report.has_code(AlertCode::OpenShell));

        let mut quiet = Report::new();
        ShellBuilder::new(&mut store, &options, false).build(&faces, &mut quiet).unwrap();
        assert!(quiet.alerts().is_empty());
    }

    #[test]
    fn test_flipped_face_is_bad_orientation() {
        let mut store = ShapeStore::new();
        let mut faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        faces[0] = faces[0].flipped();
        let shell = store.add_shell(faces);
        assert_eq!(closure(&store, shell).unwrap(), Closure::BadOrientation);
    }
}
