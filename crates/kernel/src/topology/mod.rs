pub mod explore;
pub mod face_domain;
pub mod primitives;
pub mod shape;

pub use shape::{Geometry, Orientation, Shape, ShapeId, ShapeKind, ShapeRef, ShapeStore, TopologyError};
