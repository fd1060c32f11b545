//! Alerts collected during a Boolean run.
//!
//! The report is passed explicitly through every stage. Each alert is also
//! mirrored to `tracing` at the matching level when it is added.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::topology::ShapeId;

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    Info,
    Warning,
    Error,
    /// The run was stopped and produced no result.
    AbortFatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertCode {
    // Filtering
    InvalidGeometry,
    // Intersection
    IntersectionFailed,
    UnsupportedGeometry,
    // Builder
    ClassificationAmbiguous,
    OpenShell,
    NonManifoldEdge,
    BadOrientation,
    UnassignedCavity,
    FaceSplitFailed,
    // Informational
    DuplicateArgument,
    EmptyResult,
    // Fatal
    NullInput,
    InvalidInput,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub code: AlertCode,
    pub context: String,
    pub shapes: Vec<ShapeId>,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {:?}: {}", self.kind, self.code, self.context)?;
        if !self.shapes.is_empty() {
            write!(f, " ({} shape(s))", self.shapes.len())?;
        }
        Ok(())
    }
}

/// Ordered, append-only list of alerts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    alerts: Vec<Alert>,
    done: bool,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, alert: Alert) {
        match alert.kind {
            AlertKind::Info => info!(code = ?alert.code, shapes = alert.shapes.len(), "{}", alert.context),
            AlertKind::Warning => warn!(code = ?alert.code, shapes = alert.shapes.len(), "{}", alert.context),
            AlertKind::Error | AlertKind::AbortFatal => {
                error!(code = ?alert.code, kind = ?alert.kind, shapes = alert.shapes.len(), "{}", alert.context)
            }
        }
        self.alerts.push(alert);
    }

    fn push(&mut self, kind: AlertKind, code: AlertCode, context: impl Into<String>, shapes: Vec<ShapeId>) {
        self.add(Alert {
            kind,
            code,
            context: context.into(),
            shapes,
        });
    }

    pub fn info(&mut self, code: AlertCode, context: impl Into<String>, shapes: Vec<ShapeId>) {
        self.push(AlertKind::Info, code, context, shapes);
    }

    pub fn warning(&mut self, code: AlertCode, context: impl Into<String>, shapes: Vec<ShapeId>) {
        self.push(AlertKind::Warning, code, context, shapes);
    }

    pub fn error(&mut self, code: AlertCode, context: impl Into<String>, shapes: Vec<ShapeId>) {
        self.push(AlertKind::Error, code, context, shapes);
    }

    pub fn fatal(&mut self, code: AlertCode, context: impl Into<String>, shapes: Vec<ShapeId>) {
        self.push(AlertKind::AbortFatal, code, context, shapes);
    }

    /// Append the alerts of another report, preserving their order.
    pub fn extend(&mut self, other: Report) {
        self.alerts.extend(other.alerts);
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn alerts_of(&self, kind: AlertKind) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(move |a| a.kind == kind)
    }

    pub fn has_code(&self, code: AlertCode) -> bool {
        self.alerts.iter().any(|a| a.code == code)
    }

    pub fn has_errors(&self) -> bool {
        self.alerts
            .iter()
            .any(|a| matches!(a.kind, AlertKind::Error | AlertKind::AbortFatal))
    }

    pub fn has_warnings(&self) -> bool {
        self.alerts.iter().any(|a| a.kind == AlertKind::Warning)
    }

    pub fn is_fatal(&self) -> bool {
        self.alerts.iter().any(|a| a.kind == AlertKind::AbortFatal)
    }

    pub(crate) fn mark_done(&mut self) {
        self.done = true;
    }

    /// The run reached its final stage without a fatal alert.
    pub fn is_done(&self) -> bool {
        self.done && !self.is_fatal()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Boolean report: {} alert(s), done = {}", self.alerts.len(), self.is_done())?;
        for alert in &self.alerts {
            writeln!(f, "  {alert}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_queries() {
        let mut report = Report::new();
        report.info(AlertCode::DuplicateArgument, "same shape twice", vec![]);
        assert!(!report.has_warnings() && !report.has_errors());
        report.warning(AlertCode::OpenShell, "shell left open", vec![]);
        assert!(report.has_warnings());
        assert!(!report.has_errors());
        report.mark_done();
        assert!(report.is_done());
        report.fatal(AlertCode::Cancelled, "stopped", vec![]);
        assert!(report.has_errors());
        assert!(!report.is_done());
        assert_eq!(report.alerts_of(AlertKind::Warning).count(), 1);
    }

    #[test]
    fn test_display_lists_every_alert() {
        let mut report = Report::new();
        report.warning(AlertCode::IntersectionFailed, "no convergence", vec![]);
        report.error(AlertCode::BadOrientation, "flipped face", vec![]);
        let text = report.to_string();
        assert!(text.contains("IntersectionFailed"));
        assert!(text.contains("BadOrientation"));
        assert_eq!(text.lines().count(), 3);
    }
}
