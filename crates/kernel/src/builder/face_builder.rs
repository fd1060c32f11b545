//! Splitting of one face along its split boundary edges, the section edges
//! crossing it and the edges of other arguments lying inside it.
//!
//! Every edge is turned into half-edges carrying a parameter-space polyline
//! on the face surface: boundary pieces once, in wire direction, internal
//! edges once per direction. Loops are traced by always taking the smallest
//! clockwise turn, which leaves the material of every traced loop on its
//! left. Counter-clockwise loops bound new faces, clockwise loops are holes.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;

use tracing::trace;

use crate::ds::{DataStructure, ShapeIndex};
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::surfaces::Surface;
use crate::topology::explore::oriented_ends;
use crate::topology::face_domain::{polygon_area, winding_number, FaceDomain};
use crate::topology::{Orientation, ShapeId, ShapeRef, ShapeStore, TopologyError};

use super::Images;

/// An oriented edge inside the face being split.
#[derive(Debug, Clone)]
pub(crate) struct HalfEdge {
    pub edge: ShapeId,
    pub orientation: Orientation,
    pub start: ShapeId,
    pub end: ShapeId,
    /// Parameter-space polyline from `start` to `end`.
    pub uv: Vec<Point2d>,
    pub internal: bool,
}

impl HalfEdge {
    fn as_ref(&self) -> ShapeRef {
        ShapeRef::new(self.edge, self.orientation)
    }

    fn first_uv(&self) -> Point2d {
        self.uv.first().copied().unwrap_or(Point2d::ORIGIN)
    }

    fn last_uv(&self) -> Point2d {
        self.uv.last().copied().unwrap_or(Point2d::ORIGIN)
    }

    /// Direction leaving the start vertex.
    fn out_direction(&self) -> (f64, f64) {
        let first = self.first_uv();
        self.uv
            .iter()
            .skip(1)
            .find(|q| q.distance_to(&first) > 1e-12)
            .map_or((0.0, 0.0), |q| *q - first)
    }

    /// Direction arriving at the end vertex.
    fn in_direction(&self) -> (f64, f64) {
        let last = self.last_uv();
        self.uv
            .iter()
            .rev()
            .skip(1)
            .find(|q| q.distance_to(&last) > 1e-12)
            .map_or((0.0, 0.0), |q| last - *q)
    }

    fn is_twin_of(&self, other: &HalfEdge) -> bool {
        self.edge == other.edge && self.orientation != other.orientation
    }
}

/// One new face: an outer loop and its holes, as half-edge indices.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    pub outer: Vec<usize>,
    pub holes: Vec<Vec<usize>>,
}

/// Loops found in a face, ready to be turned into faces.
#[derive(Debug, Clone)]
pub(crate) struct SplitPlan {
    pub face: ShapeIndex,
    pub half_edges: Vec<HalfEdge>,
    pub regions: Vec<Region>,
}

impl SplitPlan {
    /// Compute the loops of `face`. An empty region list means the face
    /// could not be split.
    pub fn compute(
        store: &ShapeStore,
        ds: &DataStructure,
        images: &Images,
        face: ShapeIndex,
        samples: usize,
        max_iterations: usize,
    ) -> Result<Self, TopologyError> {
        let Some(domain) = ds.domain(face) else {
            return Ok(Self {
                face,
                half_edges: Vec::new(),
                regions: Vec::new(),
            });
        };
        let mut half_edges = boundary_half_edges(store, domain, images, samples, max_iterations)?;
        let boundary: BTreeSet<ShapeId> = half_edges.iter().map(|h| h.edge).collect();
        half_edges.extend(internal_half_edges(store, ds, domain, face, &boundary, samples, max_iterations)?);
        prune_dangling(&mut half_edges);

        let loops = trace_loops(&half_edges, &domain.surface);
        let regions = assemble_regions(&half_edges, loops, domain);
        trace!(face, half_edges = half_edges.len(), regions = regions.len(), "face split plan");
        Ok(Self {
            face,
            half_edges,
            regions,
        })
    }

    /// Create the wires and faces of every region.
    pub fn emit(&self, store: &mut ShapeStore, surface: &Surface, tolerance: f64) -> Vec<ShapeId> {
        let mut faces = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            let mut wires = vec![ShapeRef::forward(self.wire(store, &region.outer))];
            for hole in &region.holes {
                wires.push(ShapeRef::forward(self.wire(store, hole)));
            }
            faces.push(store.add_face(surface.clone(), wires, tolerance));
        }
        faces
    }

    fn wire(&self, store: &mut ShapeStore, lp: &[usize]) -> ShapeId {
        store.add_wire(lp.iter().map(|i| self.half_edges[*i].as_ref()).collect())
    }
}

// ─── Half-edges ──────────────────────────────────────────────────────────────

fn boundary_half_edges(
    store: &ShapeStore,
    domain: &FaceDomain,
    images: &Images,
    samples: usize,
    max_iterations: usize,
) -> Result<Vec<HalfEdge>, TopologyError> {
    let mut out = Vec::new();
    for l in &domain.loops {
        for u in &l.uses {
            let mut pieces = images.edge_images(u.edge);
            if u.orientation.is_reversed() {
                pieces.reverse();
            }
            for img in pieces {
                let orientation = u.orientation.compose(img.orientation);
                let (curve, range) = store.edge_curve(img.edge)?;
                let mut points = curve.sample(range, curve.sample_count(range, samples));
                if orientation.is_reversed() {
                    points.reverse();
                }
                let uv = points
                    .iter()
                    .map(|(t, p)| {
                        let t = if img.native { *t } else { u.curve.project(p, u.range, max_iterations).t };
                        u.uv_at(&domain.surface, t, max_iterations)
                    })
                    .collect();
                let (start, end) = oriented_ends(store, ShapeRef::new(img.edge, orientation))?;
                out.push(HalfEdge {
                    edge: img.edge,
                    orientation,
                    start,
                    end,
                    uv,
                    internal: false,
                });
            }
        }
    }
    Ok(out)
}

fn internal_half_edges(
    store: &ShapeStore,
    ds: &DataStructure,
    domain: &FaceDomain,
    face: ShapeIndex,
    boundary: &BTreeSet<ShapeId>,
    samples: usize,
    max_iterations: usize,
) -> Result<Vec<HalfEdge>, TopologyError> {
    let Some(fi) = ds.face_info(face) else {
        return Ok(Vec::new());
    };
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for pb in fi.in_blocks.iter().chain(&fi.sc_blocks) {
        let Some(split) = ds.split_edge_of(*pb) else {
            continue;
        };
        let edge = ds.shape_id(split);
        if boundary.contains(&edge) || !seen.insert(edge) {
            continue;
        }
        let (curve, range) = store.edge_curve(edge)?;
        let points: Vec<Point3d> = curve
            .sample(range, curve.sample_count(range, samples))
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        let uv = unwrapped_uv(domain, &points, max_iterations);
        let mut back = uv.clone();
        back.reverse();
        let (start, end) = store.edge_vertices(edge)?;
        out.push(HalfEdge {
            edge,
            orientation: Orientation::Forward,
            start,
            end,
            uv,
            internal: true,
        });
        out.push(HalfEdge {
            edge,
            orientation: Orientation::Reversed,
            start: end,
            end: start,
            uv: back,
            internal: true,
        });
    }
    Ok(out)
}

/// Continuous parameter polyline of `points`, shifted by whole periods so its
/// middle sample falls in the period of the face domain.
fn unwrapped_uv(domain: &FaceDomain, points: &[Point3d], max_iterations: usize) -> Vec<Point2d> {
    let surface = &domain.surface;
    let mut uv: Vec<Point2d> = Vec::with_capacity(points.len());
    for p in points {
        let q = match uv.last() {
            Some(prev) => surface.unwrap_to(surface.project(p, Some(&domain.bbox), max_iterations), prev),
            None => domain.project(p),
        };
        uv.push(q);
    }
    if let Some(mid) = uv.get(uv.len() / 2).copied() {
        let (du, dv) = surface.unwrap_to(mid, &domain.bbox.center()) - mid;
        if du != 0.0 || dv != 0.0 {
            for q in uv.iter_mut() {
                *q = q.offset(du, dv);
            }
        }
    }
    uv
}

/// Drop internal edges with an end vertex that no other half-edge leaves.
fn prune_dangling(half_edges: &mut Vec<HalfEdge>) {
    loop {
        let mut outgoing: BTreeMap<ShapeId, usize> = BTreeMap::new();
        for h in half_edges.iter() {
            *outgoing.entry(h.start).or_default() += 1;
        }
        let dangling: BTreeSet<ShapeId> = half_edges
            .iter()
            .filter(|h| h.internal && h.start != h.end && outgoing.get(&h.end).copied().unwrap_or(0) <= 1)
            .map(|h| h.edge)
            .collect();
        if dangling.is_empty() {
            return;
        }
        half_edges.retain(|h| !(h.internal && dangling.contains(&h.edge)));
    }
}

// ─── Loop tracing ────────────────────────────────────────────────────────────

/// Whether two parameter points may be the same node on `surface`.
fn same_node(surface: &Surface, a: &Point2d, b: &Point2d) -> bool {
    let (du, dv) = *a - *b;
    surface.u_period().is_none_or(|p| du.abs() < 0.25 * p) && surface.v_period().is_none_or(|p| dv.abs() < 0.25 * p)
}

/// Clockwise angle in `(0, 2π]` from `from` to `to`.
fn clockwise_angle(from: (f64, f64), to: (f64, f64)) -> f64 {
    let a = from.1.atan2(from.0) - to.1.atan2(to.0);
    let a = a.rem_euclid(TAU);
    if a < 1e-12 { TAU } else { a }
}

fn pick_next(half_edges: &[HalfEdge], current: usize, allowed: impl Fn(usize) -> bool, surface: &Surface) -> Option<usize> {
    let h = &half_edges[current];
    let end_uv = h.last_uv();
    let (ix, iy) = h.in_direction();
    let back = (-ix, -iy);
    half_edges
        .iter()
        .enumerate()
        .filter(|(i, c)| allowed(*i) && c.start == h.end && same_node(surface, &c.first_uv(), &end_uv))
        .map(|(i, c)| {
            // Going back along the same edge is the last resort.
            let turn = if c.is_twin_of(h) { 2.0 * TAU } else { clockwise_angle(back, c.out_direction()) };
            (i, turn)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(i, _)| i)
}

/// Closed loops of half-edge indices. Chains that run into a dead end are
/// discarded.
fn trace_loops(half_edges: &[HalfEdge], surface: &Surface) -> Vec<Vec<usize>> {
    let mut used = vec![false; half_edges.len()];
    let mut loops = Vec::new();
    let step_cap = 4 * half_edges.len() + 4;
    for first in 0..half_edges.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let mut chain = vec![first];
        let mut steps = 0;
        while let Some(&current) = chain.last() {
            steps += 1;
            if steps > step_cap {
                trace!(first, "loop tracing exceeded its step cap");
                break;
            }
            let Some(next) = pick_next(half_edges, current, |i| !used[i] || chain.contains(&i), surface) else {
                trace!(first, length = chain.len(), "dead end while tracing");
                break;
            };
            match chain.iter().position(|&c| c == next) {
                Some(k) => loops.push(chain.split_off(k)),
                None => {
                    used[next] = true;
                    chain.push(next);
                }
            }
        }
    }
    loops
}

fn loop_polygon(half_edges: &[HalfEdge], lp: &[usize]) -> Vec<Point2d> {
    let mut polygon: Vec<Point2d> = Vec::new();
    for i in lp {
        for q in &half_edges[*i].uv {
            if polygon.last().is_none_or(|last| last.distance_to(q) > 1e-14) {
                polygon.push(*q);
            }
        }
    }
    if polygon.len() > 1 && polygon[0].distance_to(&polygon[polygon.len() - 1]) < 1e-12 {
        polygon.pop();
    }
    polygon
}

// ─── Regions ─────────────────────────────────────────────────────────────────

struct TracedLoop {
    edges: Vec<usize>,
    polygon: Vec<Point2d>,
    area: f64,
}

fn assemble_regions(half_edges: &[HalfEdge], loops: Vec<Vec<usize>>, domain: &FaceDomain) -> Vec<Region> {
    let min_area = 1e-10 * (domain.bbox.width() * domain.bbox.height()).max(1e-12);
    let mut outers: Vec<TracedLoop> = Vec::new();
    let mut holes: Vec<TracedLoop> = Vec::new();
    for edges in loops {
        let polygon = loop_polygon(half_edges, &edges);
        let area = polygon_area(&polygon);
        let traced = TracedLoop { edges, polygon, area };
        if area > min_area {
            outers.push(traced);
        } else if area < -min_area {
            holes.push(traced);
        }
    }

    let mut by_size: Vec<usize> = (0..outers.len()).collect();
    by_size.sort_by(|a, b| outers[*a].area.total_cmp(&outers[*b].area).then(a.cmp(b)));
    let mut regions: Vec<Region> = outers
        .iter()
        .map(|o| Region {
            outer: o.edges.clone(),
            holes: Vec::new(),
        })
        .collect();
    for hole in holes {
        match by_size.iter().find(|&&o| encloses(&domain.surface, &outers[o].polygon, &hole.polygon)) {
            Some(&o) => regions[o].holes.push(hole.edges),
            None => trace!(area = hole.area, "hole without an enclosing loop dropped"),
        }
    }
    regions
}

/// Whether most segment midpoints of `inner` lie inside `outer`, trying the
/// periodic images of `inner`.
fn encloses(surface: &Surface, outer: &[Point2d], inner: &[Point2d]) -> bool {
    let n = inner.len();
    if n < 2 || outer.len() < 3 {
        return false;
    }
    let stride = (n / 16).max(1);
    let probes: Vec<Point2d> = (0..n)
        .step_by(stride)
        .map(|i| inner[i].lerp(&inner[(i + 1) % n], 0.5))
        .collect();
    let shifts_u = surface.u_period().map_or(vec![0.0], |p| vec![0.0, p, -p]);
    let shifts_v = surface.v_period().map_or(vec![0.0], |p| vec![0.0, p, -p]);
    for du in &shifts_u {
        for dv in &shifts_v {
            let inside = probes
                .iter()
                .filter(|q| winding_number(outer, &q.offset(*du, *dv)) != 0)
                .count();
            if 2 * inside > probes.len() {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half(edge: ShapeId, start: ShapeId, end: ShapeId, uv: &[(f64, f64)], internal: bool, orientation: Orientation) -> HalfEdge {
        HalfEdge {
            edge,
            orientation,
            start,
            end,
            uv: uv.iter().map(|(u, v)| Point2d::new(*u, *v)).collect(),
            internal,
        }
    }

    /// Unit square split by its diagonal from (0,0) to (1,1).
    fn square_with_diagonal(store: &mut ShapeStore) -> (Vec<HalfEdge>, Surface) {
        let v: Vec<ShapeId> = (0..4).map(|_| store.add_vertex(Point3d::ORIGIN, 1e-7)).collect();
        let e: Vec<ShapeId> = (0..5).map(|_| store.add_vertex(Point3d::ORIGIN, 1e-7)).collect();
        let f = Orientation::Forward;
        let halves = vec![
            half(e[0], v[0], v[1], &[(0.0, 0.0), (1.0, 0.0)], false, f),
            half(e[1], v[1], v[2], &[(1.0, 0.0), (1.0, 1.0)], false, f),
            half(e[2], v[2], v[3], &[(1.0, 1.0), (0.0, 1.0)], false, f),
            half(e[3], v[3], v[0], &[(0.0, 1.0), (0.0, 0.0)], false, f),
            half(e[4], v[0], v[2], &[(0.0, 0.0), (1.0, 1.0)], true, f),
            half(e[4], v[2], v[0], &[(1.0, 1.0), (0.0, 0.0)], true, Orientation::Reversed),
        ];
        (halves, Surface::Plane(crate::geometry::surfaces::Plane::xy()))
    }

    #[test]
    fn test_clockwise_angle() {
        assert!((clockwise_angle((0.0, -1.0), (-1.0, 0.0)) - TAU / 4.0).abs() < 1e-12);
        assert!((clockwise_angle((0.0, -1.0), (-1.0, -1.0)) - TAU / 8.0).abs() < 1e-12);
        assert!((clockwise_angle((1.0, 0.0), (1.0, 0.0)) - TAU).abs() < 1e-12);
    }

    #[test]
    fn test_diagonal_splits_square_into_two_triangles() {
        let mut store = ShapeStore::new();
        let (halves, surface) = square_with_diagonal(&mut store);
        let loops = trace_loops(&halves, &surface);
        assert_eq!(loops.len(), 2);
        for lp in &loops {
            assert_eq!(lp.len(), 3);
            let area = polygon_area(&loop_polygon(&halves, lp));
            assert!((area - 0.5).abs() < 1e-12, "area {area}");
        }
    }

    #[test]
    fn test_dangling_internal_edge_is_pruned() {
        let mut store = ShapeStore::new();
        let (mut halves, _) = square_with_diagonal(&mut store);
        let tip = store.add_vertex(Point3d::ORIGIN, 1e-7);
        let spur = store.add_vertex(Point3d::ORIGIN, 1e-7);
        let corner = halves[1].start;
        halves.push(half(spur, corner, tip, &[(1.0, 0.0), (0.7, 0.2)], true, Orientation::Forward));
        halves.push(half(spur, tip, corner, &[(0.7, 0.2), (1.0, 0.0)], true, Orientation::Reversed));
        prune_dangling(&mut halves);
        assert_eq!(halves.len(), 6);
        assert!(halves.iter().all(|h| h.edge != spur));
    }

    #[test]
    fn test_hole_is_assigned_to_enclosing_loop() {
        let square = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)];
        let hole = [(1.0, 1.0), (1.0, 2.0), (2.0, 2.0), (2.0, 1.0)];
        let outer: Vec<Point2d> = square.iter().map(|(u, v)| Point2d::new(*u, *v)).collect();
        let inner: Vec<Point2d> = hole.iter().map(|(u, v)| Point2d::new(*u, *v)).collect();
        let plane = Surface::Plane(crate::geometry::surfaces::Plane::xy());
        assert!(encloses(&plane, &outer, &inner));
        let far: Vec<Point2d> = inner.iter().map(|q| q.offset(10.0, 0.0)).collect();
        assert!(!encloses(&plane, &outer, &far));
    }
}
