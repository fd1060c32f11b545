//! General Boolean Operations on boundary-represented shapes.
//!
//! Pipeline: the [`filler`] intersects every pair of arguments and records
//! the result in a shared [`ds::DataStructure`]; the [`builder`] splits the
//! arguments along those intersections, classifies the pieces and assembles
//! the result selected by the [`boolean`] operation.

pub mod boolean;
pub mod builder;
pub mod classify;
pub mod config;
pub mod ds;
pub mod error;
pub mod filler;
pub mod geometry;
pub mod intersect;
pub mod measure;
pub mod report;
pub mod topology;
pub mod validation;

pub use boolean::{BooleanAlgo, BooleanEngine, BooleanOperation, BooleanOutcome, DefaultBooleanEngine, GeneralFuse};
pub use config::BooleanOptions;
pub use error::{BooleanFailure, OptionsError, PreconditionError};
pub use report::{Alert, AlertCode, AlertKind, Report};
pub use topology::{Orientation, ShapeId, ShapeKind, ShapeRef, ShapeStore};

/// Global tolerance configuration for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Points closer than this are considered coincident (meters).
    pub coincidence: f64,
    /// Angles smaller than this (radians) are considered zero.
    pub angular: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            coincidence: 1e-7,
            angular: 1e-10,
        }
    }
}

impl Tolerance {
    /// Tolerance set for a run with the given pair tolerance and angular threshold.
    pub fn with_distance(coincidence: f64, angular: f64) -> Self {
        Self { coincidence, angular }
    }
}


/// Default tolerance set.
pub fn default_tolerance() -> Tolerance {
    Tolerance::default()
}
