//! Traversal helpers over the shape graph.

use std::collections::{HashMap, HashSet};

use super::shape::{Orientation, ShapeId, ShapeKind, ShapeRef, ShapeStore, TopologyError};

/// Distinct sub-shapes of `kind` below `root` (including `root` itself), in
/// depth-first first-visit order.
pub fn subshapes(store: &ShapeStore, root: ShapeId, kind: ShapeKind) -> Result<Vec<ShapeId>, TopologyError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    collect(store, root, kind, &mut seen, &mut out)?;
    Ok(out)
}

fn collect(
    store: &ShapeStore,
    id: ShapeId,
    kind: ShapeKind,
    seen: &mut HashSet<ShapeId>,
    out: &mut Vec<ShapeId>,
) -> Result<(), TopologyError> {
    if !seen.insert(id) {
        return Ok(());
    }
    let shape = store.get(id)?;
    if shape.kind == kind {
        out.push(id);
    }
    // Shapes never contain shapes of their own or a more complex kind, compounds aside.
    if shape.kind >= kind && shape.kind != ShapeKind::Compound {
        return Ok(());
    }
    for child in &shape.children {
        collect(store, child.id, kind, seen, out)?;
    }
    Ok(())
}

/// Every occurrence of a `kind` sub-shape below `root`, with the orientation
/// composed along the path from `root`.
pub fn oriented_subshapes(store: &ShapeStore, root: ShapeRef, kind: ShapeKind) -> Result<Vec<ShapeRef>, TopologyError> {
    let mut out = Vec::new();
    walk_oriented(store, root, kind, &mut out)?;
    Ok(out)
}

fn walk_oriented(store: &ShapeStore, at: ShapeRef, kind: ShapeKind, out: &mut Vec<ShapeRef>) -> Result<(), TopologyError> {
    let shape = store.get(at.id)?;
    if shape.kind == kind {
        out.push(at);
        return Ok(());
    }
    for child in &shape.children {
        let composed = ShapeRef::new(child.id, at.orientation.compose(child.orientation));
        walk_oriented(store, composed, kind, out)?;
    }
    Ok(())
}

/// Map from every `kind` sub-shape of `root` to the distinct `ancestor_kind`
/// shapes containing it, in first-visit order.
pub fn ancestor_map(
    store: &ShapeStore,
    root: ShapeId,
    kind: ShapeKind,
    ancestor_kind: ShapeKind,
) -> Result<HashMap<ShapeId, Vec<ShapeId>>, TopologyError> {
    let mut map: HashMap<ShapeId, Vec<ShapeId>> = HashMap::new();
    for ancestor in subshapes(store, root, ancestor_kind)? {
        for sub in subshapes(store, ancestor, kind)? {
            let list = map.entry(sub).or_default();
            if !list.contains(&ancestor) {
                list.push(ancestor);
            }
        }
    }
    Ok(map)
}

/// Oriented edges of a wire in traversal order.
pub fn wire_edges(store: &ShapeStore, wire: ShapeId, orientation: Orientation) -> Result<Vec<ShapeRef>, TopologyError> {
    let children = store.children(wire)?;
    Ok(children
        .iter()
        .map(|c| ShapeRef::new(c.id, orientation.compose(c.orientation)))
        .collect())
}

/// First and last vertex of an oriented edge, following its traversal direction.
pub fn oriented_ends(store: &ShapeStore, edge: ShapeRef) -> Result<(ShapeId, ShapeId), TopologyError> {
    let (a, b) = store.edge_vertices(edge.id)?;
    Ok(if edge.orientation.is_reversed() { (b, a) } else { (a, b) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::make_box;

    #[test]
    fn test_box_subshape_counts() {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        assert_eq!(subshapes(&store, solid, ShapeKind::Face).unwrap().len(), 6);
        assert_eq!(subshapes(&store, solid, ShapeKind::Edge).unwrap().len(), 12);
        assert_eq!(subshapes(&store, solid, ShapeKind::Vertex).unwrap().len(), 8);
        assert_eq!(subshapes(&store, solid, ShapeKind::Solid).unwrap(), vec![solid]);
    }

    #[test]
    fn test_every_box_edge_used_twice_with_opposite_orientation() {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 1.0, 1.0));
        let uses = oriented_subshapes(&store, ShapeRef::forward(solid), ShapeKind::Edge).unwrap();
        assert_eq!(uses.len(), 24);
        let mut balance: HashMap<ShapeId, i32> = HashMap::new();
        for u in uses {
            *balance.entry(u.id).or_default() += if u.orientation.is_forward() { 1 } else { -1 };
        }
        assert!(balance.values().all(|b| *b == 0));
    }

    #[test]
    fn test_edge_face_ancestors() {
        let mut store = ShapeStore::new();
        let solid = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let map = ancestor_map(&store, solid, ShapeKind::Edge, ShapeKind::Face).unwrap();
        assert_eq!(map.len(), 12);
        assert!(map.values().all(|faces| faces.len() == 2));
    }
}
