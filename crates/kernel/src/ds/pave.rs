//! Paves, pave blocks and common blocks.

use serde::{Deserialize, Serialize};

use crate::geometry::curves::Curve;

use super::ShapeIndex;

/// A vertex placed on an edge (or section curve) at parameter `t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pave {
    pub vertex: ShapeIndex,
    pub t: f64,
}

impl Pave {
    pub fn new(vertex: ShapeIndex, t: f64) -> Self {
        Self { vertex, t }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaveBlockId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommonBlockId(pub usize);

/// The portion of an edge between two consecutive paves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaveBlock {
    /// Edge (or section edge) whose curve carries the block.
    pub original_edge: ShapeIndex,
    pub pave1: Pave,
    pub pave2: Pave,
    /// Edge materializing the block once splitting is done.
    pub split_edge: Option<ShapeIndex>,
    pub common_block: Option<CommonBlockId>,
}

impl PaveBlock {
    pub fn new(original_edge: ShapeIndex, pave1: Pave, pave2: Pave) -> Self {
        Self {
            original_edge,
            pave1,
            pave2,
            split_edge: None,
            common_block: None,
        }
    }

    pub fn range(&self) -> (f64, f64) {
        (self.pave1.t, self.pave2.t)
    }

    pub fn mid_parameter(&self) -> f64 {
        0.5 * (self.pave1.t + self.pave2.t)
    }
}

/// Geometrically coincident pave blocks of different edges, plus the faces
/// on which they lie.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommonBlock {
    pub blocks: Vec<PaveBlockId>,
    pub faces: Vec<ShapeIndex>,
    pub edge: Option<ShapeIndex>,
}

/// Outcome of sorting the paves of one edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pavement {
    pub paves: Vec<Pave>,
    /// `(absorbed, kept)` vertex pairs that landed too close to be distinct.
    pub merges: Vec<(ShapeIndex, ShapeIndex)>,
}

impl Pavement {
    /// Sort and deduplicate `paves` along `curve`.
    ///
    /// Two consecutive paves closer than `tolerance` along the curve collapse
    /// into one; when their vertices differ a merge is requested. Parameters
    /// equal to a range bound win over interior ones.
    pub fn build(
        mut paves: Vec<Pave>,
        curve: &Curve,
        range: (f64, f64),
        tolerance: f64,
        real: impl Fn(ShapeIndex) -> ShapeIndex,
    ) -> Self {
        for p in paves.iter_mut() {
            p.vertex = real(p.vertex);
        }
        paves.sort_by(|a, b| a.t.total_cmp(&b.t).then(a.vertex.cmp(&b.vertex)));

        let is_bound = |t: f64| t == range.0 || t == range.1;
        let mut out: Vec<Pave> = Vec::with_capacity(paves.len());
        let mut merges = Vec::new();
        for p in paves {
            let Some(last) = out.last_mut() else {
                out.push(p);
                continue;
            };
            let gap = if (p.t - last.t).abs() < 1e-15 {
                0.0
            } else {
                curve.approximate_length((last.t, p.t), 4)
            };
            if gap > tolerance {
                out.push(p);
                continue;
            }
            if p.vertex != last.vertex && !merges.contains(&(p.vertex, last.vertex)) {
                merges.push((p.vertex, last.vertex));
            }
            if is_bound(p.t) && !is_bound(last.t) {
                last.t = p.t;
            }
        }
        Self { paves: out, merges }
    }

    /// Consecutive pave pairs.
    pub fn blocks(&self) -> impl Iterator<Item = (Pave, Pave)> + '_ {
        self.paves.windows(2).map(|w| (w[0], w[1]))
    }
}
