use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::geometry::curves::Curve;
use crate::geometry::point::Point3d;
use crate::geometry::surfaces::Surface;

// ─── Keys & Tags ─────────────────────────────────────────────────────────────

new_key_type! {
    /// Stable handle of a shape in a [`ShapeStore`].
    pub struct ShapeId;
}

/// Shape kinds, ordered from the most complex to the simplest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeKind {
    Compound,
    CompSolid,
    Solid,
    Shell,
    Face,
    Wire,
    Edge,
    Vertex,
}

impl ShapeKind {
    /// Topological dimension of the boundary-carrying kinds; `None` for containers.
    pub fn dimension(self) -> Option<usize> {
        match self {
            ShapeKind::Vertex => Some(0),
            ShapeKind::Edge => Some(1),
            ShapeKind::Face => Some(2),
            ShapeKind::Solid => Some(3),
            _ => None,
        }
    }
}

/// Orientation of a reference to a sub-shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Forward,
    Reversed,
    Internal,
    External,
}

impl Orientation {
    pub fn reversed(self) -> Self {
        match self {
            Orientation::Forward => Orientation::Reversed,
            Orientation::Reversed => Orientation::Forward,
            other => other,
        }
    }

    /// Orientation of `child` seen through a parent referenced with `self`.
    pub fn compose(self, child: Orientation) -> Orientation {
        match self {
            Orientation::Forward => child,
            Orientation::Reversed => child.reversed(),
            Orientation::Internal | Orientation::External => self,
        }
    }

    pub fn is_forward(self) -> bool {
        self == Orientation::Forward
    }

    pub fn is_reversed(self) -> bool {
        self == Orientation::Reversed
    }

    /// `+1.0` unless the orientation is `Reversed`.
    pub fn sign(self) -> f64 {
        if self == Orientation::Reversed { -1.0 } else { 1.0 }
    }
}

/// An oriented reference from a parent shape to a child shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeRef {
    pub id: ShapeId,
    pub orientation: Orientation,
}

impl ShapeRef {
    pub fn new(id: ShapeId, orientation: Orientation) -> Self {
        Self { id, orientation }
    }

    pub fn forward(id: ShapeId) -> Self {
        Self::new(id, Orientation::Forward)
    }

    pub fn reversed(id: ShapeId) -> Self {
        Self::new(id, Orientation::Reversed)
    }

    pub fn flipped(self) -> Self {
        Self::new(self.id, self.orientation.reversed())
    }
}

// ─── Shapes ──────────────────────────────────────────────────────────────────

/// Geometry carried by a shape node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Geometry {
    None,
    Point(Point3d),
    Curve { curve: Curve, range: (f64, f64) },
    Surface(Surface),
}

/// A node of the shape graph. Orientation lives on the parent's references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub geometry: Geometry,
    pub children: Vec<ShapeRef>,
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("shape {0:?} is not in the store")]
    Missing(ShapeId),
    #[error("shape {id:?} is a {found:?}, expected {expected:?}")]
    WrongKind {
        id: ShapeId,
        expected: ShapeKind,
        found: ShapeKind,
    },
    #[error("shape {0:?} carries no usable geometry")]
    MissingGeometry(ShapeId),
    #[error("edge {0:?} must reference exactly two vertices")]
    MalformedEdge(ShapeId),
}

/// Arena owning every shape of a modeling session.
///
/// Shapes are immutable once referenced, except for their tolerance which the
/// Boolean engine may grow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeStore {
    shapes: SlotMap<ShapeId, Shape>,
}

impl ShapeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shape: Shape) -> ShapeId {
        self.shapes.insert(shape)
    }

    pub fn get(&self, id: ShapeId) -> Result<&Shape, TopologyError> {
        self.shapes.get(id).ok_or(TopologyError::Missing(id))
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.shapes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn kind(&self, id: ShapeId) -> Result<ShapeKind, TopologyError> {
        Ok(self.get(id)?.kind)
    }

    pub fn tolerance(&self, id: ShapeId) -> Result<f64, TopologyError> {
        Ok(self.get(id)?.tolerance)
    }

    pub fn children(&self, id: ShapeId) -> Result<&[ShapeRef], TopologyError> {
        Ok(&self.get(id)?.children)
    }

    /// Grow (never shrink) the tolerance of a shape.
    pub fn grow_tolerance(&mut self, id: ShapeId, tolerance: f64) -> Result<(), TopologyError> {
        let shape = self.shapes.get_mut(id).ok_or(TopologyError::Missing(id))?;
        if tolerance > shape.tolerance {
            shape.tolerance = tolerance;
        }
        Ok(())
    }

    fn expect_kind(&self, id: ShapeId, expected: ShapeKind) -> Result<&Shape, TopologyError> {
        let shape = self.get(id)?;
        if shape.kind != expected {
            return Err(TopologyError::WrongKind {
                id,
                expected,
                found: shape.kind,
            });
        }
        Ok(shape)
    }

    pub fn point(&self, vertex: ShapeId) -> Result<Point3d, TopologyError> {
        match &self.expect_kind(vertex, ShapeKind::Vertex)?.geometry {
            Geometry::Point(p) => Ok(*p),
            _ => Err(TopologyError::MissingGeometry(vertex)),
        }
    }

    /// Curve and parameter range of an edge.
    pub fn edge_curve(&self, edge: ShapeId) -> Result<(&Curve, (f64, f64)), TopologyError> {
        match &self.expect_kind(edge, ShapeKind::Edge)?.geometry {
            Geometry::Curve { curve, range } => Ok((curve, *range)),
            _ => Err(TopologyError::MissingGeometry(edge)),
        }
    }

    /// `(start, end)` vertices of an edge in curve direction.
    pub fn edge_vertices(&self, edge: ShapeId) -> Result<(ShapeId, ShapeId), TopologyError> {
        let shape = self.expect_kind(edge, ShapeKind::Edge)?;
        match shape.children.as_slice() {
            [a, b] => Ok((a.id, b.id)),
            _ => Err(TopologyError::MalformedEdge(edge)),
        }
    }

    pub fn face_surface(&self, face: ShapeId) -> Result<&Surface, TopologyError> {
        match &self.expect_kind(face, ShapeKind::Face)?.geometry {
            Geometry::Surface(s) => Ok(s),
            _ => Err(TopologyError::MissingGeometry(face)),
        }
    }

    // ─── Construction ────────────────────────────────────────────────────────

    pub fn add_vertex(&mut self, point: Point3d, tolerance: f64) -> ShapeId {
        self.insert(Shape {
            kind: ShapeKind::Vertex,
            geometry: Geometry::Point(point),
            children: Vec::new(),
            tolerance,
        })
    }

    /// Edge on `curve` over `range`, running from `start` to `end`.
    pub fn add_edge(&mut self, curve: Curve, range: (f64, f64), start: ShapeId, end: ShapeId, tolerance: f64) -> ShapeId {
        self.insert(Shape {
            kind: ShapeKind::Edge,
            geometry: Geometry::Curve { curve, range },
            children: vec![ShapeRef::forward(start), ShapeRef::reversed(end)],
            tolerance,
        })
    }

    fn add_container(&mut self, kind: ShapeKind, geometry: Geometry, children: Vec<ShapeRef>, tolerance: f64) -> ShapeId {
        self.insert(Shape {
            kind,
            geometry,
            children,
            tolerance,
        })
    }

    pub fn add_wire(&mut self, edges: Vec<ShapeRef>) -> ShapeId {
        self.add_container(ShapeKind::Wire, Geometry::None, edges, 0.0)
    }

    /// Face on `surface`; the first wire is the outer boundary.
    pub fn add_face(&mut self, surface: Surface, wires: Vec<ShapeRef>, tolerance: f64) -> ShapeId {
        self.add_container(ShapeKind::Face, Geometry::Surface(surface), wires, tolerance)
    }

    pub fn add_shell(&mut self, faces: Vec<ShapeRef>) -> ShapeId {
        self.add_container(ShapeKind::Shell, Geometry::None, faces, 0.0)
    }

    pub fn add_solid(&mut self, shells: Vec<ShapeRef>) -> ShapeId {
        self.add_container(ShapeKind::Solid, Geometry::None, shells, 0.0)
    }

    pub fn add_compsolid(&mut self, solids: Vec<ShapeRef>) -> ShapeId {
        self.add_container(ShapeKind::CompSolid, Geometry::None, solids, 0.0)
    }

    pub fn add_compound(&mut self, children: Vec<ShapeRef>) -> ShapeId {
        self.add_container(ShapeKind::Compound, Geometry::None, children, 0.0)
    }

    /// Copy `root` and everything below it into fresh shapes, keeping the
    /// sharing of sub-shapes inside the copy.
    pub fn deep_copy(&mut self, root: ShapeId) -> Result<ShapeId, TopologyError> {
        let mut copies = HashMap::new();
        self.copy_into(root, &mut copies)
    }

    fn copy_into(&mut self, id: ShapeId, copies: &mut HashMap<ShapeId, ShapeId>) -> Result<ShapeId, TopologyError> {
        if let Some(copy) = copies.get(&id) {
            return Ok(*copy);
        }
        let mut shape = self.get(id)?.clone();
        for child in &mut shape.children {
            child.id = self.copy_into(child.id, copies)?;
        }
        let copy = self.insert(shape);
        copies.insert(id, copy);
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::curves::Line3d;
    use crate::geometry::vector::Vec3;

    #[test]
    fn test_orientation_composition() {
        use Orientation::*;
        assert_eq!(Reversed.compose(Reversed), Forward);
        assert_eq!(Forward.compose(Reversed), Reversed);
        assert_eq!(Reversed.compose(Internal), Internal);
        assert_eq!(Internal.compose(Reversed), Internal);
        assert_eq!(Forward.reversed().reversed(), Forward);
    }

    #[test]
    fn test_edge_accessors() {
        let mut store = ShapeStore::new();
        let a = store.add_vertex(Point3d::ORIGIN, 1e-7);
        let b = store.add_vertex(Point3d::new(2.0, 0.0, 0.0), 1e-7);
        let line = Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X));
        let e = store.add_edge(line, (0.0, 2.0), a, b, 1e-7);

        assert_eq!(store.edge_vertices(e).unwrap(), (a, b));
        let (_, range) = store.edge_curve(e).unwrap();
        assert_eq!(range, (0.0, 2.0));
        assert!(matches!(
            store.point(e),
            Err(TopologyError::WrongKind { expected: ShapeKind::Vertex, .. })
        ));
    }

    #[test]
    fn test_grow_tolerance_never_shrinks() {
        let mut store = ShapeStore::new();
        let v = store.add_vertex(Point3d::ORIGIN, 1e-3);
        store.grow_tolerance(v, 1e-5).unwrap();
        assert_eq!(store.tolerance(v).unwrap(), 1e-3);
        store.grow_tolerance(v, 1e-2).unwrap();
        assert_eq!(store.tolerance(v).unwrap(), 1e-2);
    }

    #[test]
    fn test_deep_copy_keeps_sharing() {
        let mut store = ShapeStore::new();
        let a = store.add_vertex(Point3d::ORIGIN, 1e-7);
        let b = store.add_vertex(Point3d::new(1.0, 0.0, 0.0), 1e-7);
        let line = Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X));
        let e = store.add_edge(line, (0.0, 1.0), a, b, 1e-7);
        let wire = store.add_wire(vec![ShapeRef::forward(e), ShapeRef::reversed(e)]);

        let copy = store.deep_copy(wire).unwrap();
        assert_ne!(copy, wire);
        let children = store.children(copy).unwrap().to_vec();
        assert_eq!(children[0].id, children[1].id);
        assert_ne!(children[0].id, e);
        assert_eq!(children[1].orientation, Orientation::Reversed);
        let (ca, _) = store.edge_vertices(children[0].id).unwrap();
        assert_ne!(ca, a);
        assert_eq!(store.point(ca).unwrap(), Point3d::ORIGIN);
    }

    #[test]
    fn test_missing_shape() {
        let mut store = ShapeStore::new();
        let v = store.add_vertex(Point3d::ORIGIN, 0.0);
        let other = ShapeStore::new();
        assert_eq!(other.get(v).err(), Some(TopologyError::Missing(v)));
        assert!(store.contains(v));
    }
}
