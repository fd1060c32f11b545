pub mod bounds;
pub mod curves;
pub mod intersection;
pub mod nurbs;
pub mod point;
pub mod solve;
pub mod surface_intersection;
pub mod surfaces;
pub mod vector;

pub use bounds::{BoundingBox, UvBox};
pub use curves::{Curve, Ray};
pub use point::{Point2d, Point3d};
pub use surfaces::Surface;
pub use vector::Vec3;
