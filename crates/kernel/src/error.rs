use thiserror::Error;

use crate::report::AlertCode;
use crate::topology::{ShapeId, ShapeKind, TopologyError};

/// Conditions that stop a run before any result is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreconditionError {
    #[error("no arguments were given")]
    EmptyArguments,

    #[error("argument {id:?} of kind {kind:?} carries no boundary geometry")]
    UnsupportedArgument { id: ShapeId, kind: ShapeKind },

    #[error("the run was cancelled")]
    Cancelled,

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

impl PreconditionError {
    /// Alert code under which this failure is reported.
    pub fn alert_code(&self) -> AlertCode {
        match self {
            PreconditionError::EmptyArguments => AlertCode::NullInput,
            PreconditionError::Cancelled => AlertCode::Cancelled,
            PreconditionError::UnsupportedArgument { .. } | PreconditionError::Topology(_) => AlertCode::InvalidInput,
        }
    }
}

/// Typed failure of a Boolean operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BooleanFailure {
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("the operation produced an empty result")]
    EmptyResult,

    #[error("the run stopped with {count} error alert(s); first: {first}")]
    Aborted { count: usize, first: String },
}

/// Invalid [`BooleanOptions`](crate::config::BooleanOptions).
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("malformed options: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid option `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
