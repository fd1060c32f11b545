//! Records of pairwise interferences between sub-shapes.

use crate::geometry::curves::Curve;
use crate::geometry::point::{Point2d, Point3d};

use super::ShapeIndex;
use super::pave::Pave;

/// Vertex/vertex: both vertices resolve to `new_vertex`, either one of the
/// chain or a vertex created for it.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexVertex {
    pub v1: ShapeIndex,
    pub v2: ShapeIndex,
    pub new_vertex: ShapeIndex,
}

/// Vertex lying on an edge at curve parameter `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexEdge {
    pub vertex: ShapeIndex,
    pub edge: ShapeIndex,
    pub t: f64,
}

/// Vertex lying inside a face at surface parameters `uv`.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexFace {
    pub vertex: ShapeIndex,
    pub face: ShapeIndex,
    pub uv: Point2d,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeEdgeKind {
    /// Crossing at `t1` on the first edge and `t2` on the second.
    Point { t1: f64, t2: f64, vertex: ShapeIndex },
    /// Overlap; `r2.0` corresponds to `r1.0`.
    Common { r1: (f64, f64), r2: (f64, f64) },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeEdge {
    pub e1: ShapeIndex,
    pub e2: ShapeIndex,
    pub kind: EdgeEdgeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeFaceKind {
    Point { t: f64, uv: Point2d, vertex: ShapeIndex },
    /// The edge lies on the face surface over `range`.
    Common { range: (f64, f64) },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeFace {
    pub edge: ShapeIndex,
    pub face: ShapeIndex,
    pub kind: EdgeFaceKind,
}

/// A face/face intersection curve bounded by its paves.
#[derive(Debug, Clone)]
pub struct SectionCurve {
    pub curve: Curve,
    pub range: (f64, f64),
    pub tolerance: f64,
    pub tangential: bool,
    pub paves: Vec<Pave>,
}

#[derive(Debug, Clone)]
pub struct FaceFace {
    pub f1: ShapeIndex,
    pub f2: ShapeIndex,
    /// The faces share their surface; nothing is computed between them.
    pub coincident: bool,
    pub curves: Vec<SectionCurve>,
    /// Isolated tangency points, as section vertices.
    pub points: Vec<(Point3d, ShapeIndex)>,
}

/// Every interference of one run, per kind, in canonical pair order.
#[derive(Debug, Clone, Default)]
pub struct Interferences {
    pub vv: Vec<VertexVertex>,
    pub ve: Vec<VertexEdge>,
    pub vf: Vec<VertexFace>,
    pub ee: Vec<EdgeEdge>,
    pub ef: Vec<EdgeFace>,
    pub ff: Vec<FaceFace>,
}

impl Interferences {
    pub fn len(&self) -> usize {
        self.vv.len() + self.ve.len() + self.vf.len() + self.ee.len() + self.ef.len() + self.ff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(vv, ve, vf, ee, ef, ff)` counts.
    pub fn counts(&self) -> [usize; 6] {
        [
            self.vv.len(),
            self.ve.len(),
            self.vf.len(),
            self.ee.len(),
            self.ef.len(),
            self.ff.len(),
        ]
    }
}
