//! Bounding-volume hierarchies over the indexed sub-shapes, one per dimension.

use crate::geometry::bounds::BoundingBox;

use super::{DataStructure, ShapeIndex};

const LEAF_SIZE: usize = 4;
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone)]
enum BvhNode {
    Leaf {
        bbox: BoundingBox,
        items: Vec<(ShapeIndex, BoundingBox)>,
    },
    Internal {
        bbox: BoundingBox,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bbox(&self) -> &BoundingBox {
        match self {
            BvhNode::Leaf { bbox, .. } | BvhNode::Internal { bbox, .. } => bbox,
        }
    }
}

/// Median-split BVH over `(index, box)` items.
#[derive(Debug, Clone)]
pub struct Bvh {
    root: Option<BvhNode>,
}

impl Bvh {
    pub fn build(items: Vec<(ShapeIndex, BoundingBox)>) -> Self {
        if items.is_empty() {
            return Self { root: None };
        }
        Self {
            root: Some(Self::build_recursive(items, 0)),
        }
    }

    fn build_recursive(mut items: Vec<(ShapeIndex, BoundingBox)>, depth: usize) -> BvhNode {
        let mut bbox = BoundingBox::empty();
        for (_, b) in &items {
            bbox.add_box(b);
        }
        if items.len() <= LEAF_SIZE || depth >= MAX_DEPTH {
            return BvhNode::Leaf { bbox, items };
        }
        let mut centers = BoundingBox::empty();
        for (_, b) in &items {
            centers.add_point(&b.center());
        }
        let axis = centers.longest_axis();
        items.sort_by(|(ia, a), (ib, b)| a.axis_center(axis).total_cmp(&b.axis_center(axis)).then(ia.cmp(ib)));
        let right_items = items.split_off(items.len() / 2);
        BvhNode::Internal {
            bbox,
            left: Box::new(Self::build_recursive(items, depth + 1)),
            right: Box::new(Self::build_recursive(right_items, depth + 1)),
        }
    }

    /// Indices whose boxes overlap `query`, unordered.
    pub fn query(&self, query: &BoundingBox, out: &mut Vec<ShapeIndex>) {
        let Some(root) = &self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !node.bbox().intersects(query) {
                continue;
            }
            match node {
                BvhNode::Leaf { items, .. } => {
                    out.extend(items.iter().filter(|(_, b)| b.intersects(query)).map(|(i, _)| *i));
                }
                BvhNode::Internal { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
    }
}

/// One BVH per topological dimension (vertices, edges, faces) over the valid
/// source shapes of a run.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    trees: [Bvh; 3],
    members: [Vec<ShapeIndex>; 3],
}

impl SpatialIndex {
    pub fn build(ds: &DataStructure) -> Self {
        let mut members: [Vec<ShapeIndex>; 3] = Default::default();
        for (i, info) in ds.shapes().iter().enumerate() {
            if info.invalid || info.rank.is_none() {
                continue;
            }
            if let Some(d) = info.kind.dimension().filter(|d| *d < 3) {
                members[d].push(i);
            }
        }
        let trees = [0, 1, 2].map(|d| Bvh::build(members[d].iter().map(|i| (*i, ds.info(*i).bbox)).collect()));
        Self { trees, members }
    }

    /// Lazily enumerate overlapping pairs `(a, b)` with `a` of dimension
    /// `dim_a` and `b` of dimension `dim_b`, from different arguments, in
    /// ascending order. When both dimensions agree only `a < b` is produced.
    pub fn candidates<'a>(&'a self, ds: &'a DataStructure, dim_a: usize, dim_b: usize) -> Candidates<'a> {
        Candidates {
            index: self,
            ds,
            dim_a: dim_a.min(2),
            dim_b: dim_b.min(2),
            cursor: 0,
            pending: Vec::new(),
        }
    }

    pub fn members(&self, dim: usize) -> &[ShapeIndex] {
        &self.members[dim.min(2)]
    }
}

/// Iterator returned by [`SpatialIndex::candidates`].
pub struct Candidates<'a> {
    index: &'a SpatialIndex,
    ds: &'a DataStructure,
    dim_a: usize,
    dim_b: usize,
    cursor: usize,
    /// Partners of the current `a`, sorted descending so `pop` yields ascending.
    pending: Vec<(ShapeIndex, ShapeIndex)>,
}

impl Iterator for Candidates<'_> {
    type Item = (ShapeIndex, ShapeIndex);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.pending.pop() {
                return Some(pair);
            }
            let a = *self.index.members[self.dim_a].get(self.cursor)?;
            self.cursor += 1;

            let info_a = self.ds.info(a);
            let mut hits = Vec::new();
            self.index.trees[self.dim_b].query(&info_a.bbox, &mut hits);
            hits.retain(|b| {
                let info_b = self.ds.info(*b);
                info_b.rank != info_a.rank && (self.dim_a != self.dim_b || *b > a)
            });
            hits.sort_unstable_by(|x, y| y.cmp(x));
            hits.dedup();
            self.pending = hits.into_iter().map(|b| (a, b)).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;

    fn unit_box_at(x: f64) -> BoundingBox {
        BoundingBox::new(Point3d::new(x, 0.0, 0.0), Point3d::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn test_bvh_query_matches_brute_force() {
        let items: Vec<_> = (0..40).map(|i| (i, unit_box_at(i as f64 * 0.75))).collect();
        let bvh = Bvh::build(items.clone());
        let query = BoundingBox::new(Point3d::new(10.0, 0.5, 0.5), Point3d::new(12.0, 0.6, 0.6));
        let mut hits = Vec::new();
        bvh.query(&query, &mut hits);
        hits.sort_unstable();
        let expected: Vec<_> = items.iter().filter(|(_, b)| b.intersects(&query)).map(|(i, _)| *i).collect();
        assert_eq!(hits, expected);
    }

    #[test]
    fn test_empty_bvh() {
        let bvh = Bvh::build(Vec::new());
        let mut hits = Vec::new();
        bvh.query(&unit_box_at(0.0), &mut hits);
        assert!(hits.is_empty());
    }
}
