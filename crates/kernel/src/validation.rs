//! Topological checks of shells and solids.
//!
//! Used on Boolean results: free edges, non-manifold edges, faces traversing
//! a shared edge in the same direction, and the Euler characteristic of
//! every shell.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{info, instrument};

use crate::topology::explore::{oriented_subshapes, subshapes};
use crate::topology::{ShapeId, ShapeKind, ShapeRef, ShapeStore, TopologyError};

/// Kind of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Edge used by only one face of the shell.
    FreeEdge,
    /// Edge used by more than two faces.
    InvalidMultiConnexity,
    /// Two faces traverse a shared edge in the same direction.
    BadOrientationOfFaces,
    /// `V - E + F` differs from 2 for a closed shell.
    EulerPoincareViolation,
    /// Solid encloses a negative volume.
    NegativeVolume,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    /// May be intentional, e.g. a genus > 0 shell.
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub severity: Severity,
    /// Offending edge or shell.
    pub shape: ShapeId,
    pub message: String,
}

/// Counts and findings of one shell.
#[derive(Debug, Clone, Default)]
pub struct ShellAudit {
    pub vertices: usize,
    pub edges: usize,
    pub faces: usize,
    pub free_edges: Vec<ShapeId>,
    pub non_manifold_edges: Vec<ShapeId>,
    pub orientation_conflicts: Vec<ShapeId>,
}

impl ShellAudit {
    pub fn euler_characteristic(&self) -> i64 {
        self.vertices as i64 - self.edges as i64 + self.faces as i64
    }

    pub fn is_closed(&self) -> bool {
        self.free_edges.is_empty() && self.non_manifold_edges.is_empty() && self.orientation_conflicts.is_empty()
    }
}

/// Count the edge uses of every face of `shell`.
pub fn audit_shell(store: &ShapeStore, shell: ShapeId) -> Result<ShellAudit, TopologyError> {
    let mut uses: BTreeMap<ShapeId, (usize, usize)> = BTreeMap::new();
    for e in oriented_subshapes(store, ShapeRef::forward(shell), ShapeKind::Edge)? {
        let entry = uses.entry(e.id).or_default();
        if e.orientation.is_reversed() {
            entry.1 += 1;
        } else {
            entry.0 += 1;
        }
    }
    let mut audit = ShellAudit {
        vertices: subshapes(store, shell, ShapeKind::Vertex)?.len(),
        edges: uses.len(),
        faces: subshapes(store, shell, ShapeKind::Face)?.len(),
        ..ShellAudit::default()
    };
    for (edge, (forward, reversed)) in uses {
        match forward + reversed {
            1 => audit.free_edges.push(edge),
            2 if forward != 1 => audit.orientation_conflicts.push(edge),
            2 => {}
            _ => audit.non_manifold_edges.push(edge),
        }
    }
    Ok(audit)
}

/// Result of [`check_shape`].
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    pub shells: Vec<(ShapeId, ShellAudit)>,
}

/// Audit every shell below `shape`. Shells of solids must be closed; free
/// shells may be open.
#[instrument(skip(store))]
pub fn check_shape(store: &ShapeStore, shape: ShapeId) -> Result<ValidationReport, TopologyError> {
    let mut solid_shells = BTreeSet::new();
    let mut report = ValidationReport::default();
    for solid in subshapes(store, shape, ShapeKind::Solid)? {
        solid_shells.extend(subshapes(store, solid, ShapeKind::Shell)?);
        let volume = crate::measure::solid_volume(store, solid)?;
        if volume < 0.0 {
            report.errors.push(ValidationError {
                code: ErrorCode::NegativeVolume,
                severity: Severity::Error,
                shape: solid,
                message: format!("solid encloses volume {volume:.3e}"),
            });
        }
    }

    for shell in subshapes(store, shape, ShapeKind::Shell)? {
        let audit = audit_shell(store, shell)?;
        let in_solid = solid_shells.contains(&shell);
        let mut push = |code, severity, edge, message: &str| {
            let finding = ValidationError {
                code,
                severity,
                shape: edge,
                message: message.into(),
            };
            match severity {
                Severity::Error => report.errors.push(finding),
                Severity::Warning => report.warnings.push(finding),
            }
        };
        let open = if in_solid { Severity::Error } else { Severity::Warning };
        for &e in &audit.free_edges {
            push(ErrorCode::FreeEdge, open, e, "edge is used by only one face");
        }
        for &e in &audit.non_manifold_edges {
            push(ErrorCode::InvalidMultiConnexity, Severity::Error, e, "edge is used by more than two faces");
        }
        for &e in &audit.orientation_conflicts {
            push(
                ErrorCode::BadOrientationOfFaces,
                Severity::Error,
                e,
                "faces traverse the edge in the same direction",
            );
        }
        if audit.is_closed() && audit.euler_characteristic() != 2 {
            push(
                ErrorCode::EulerPoincareViolation,
                Severity::Warning,
                shell,
                &format!("V - E + F = {}", audit.euler_characteristic()),
            );
        }
        report.shells.push((shell, audit));
    }
    report.valid = report.errors.is_empty();

    info!(
        valid = report.valid,
        shells = report.shells.len(),
        error_count = report.errors.len(),
        warning_count = report.warnings.len(),
        "validation complete"
    );
    Ok(report)
}
