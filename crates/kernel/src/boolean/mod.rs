//! Boolean operations: Fuse, Common, Cut, Section and the General Fuse.
//!
//! [`BooleanAlgo`] runs the whole pipeline and always returns a
//! [`BooleanOutcome`] carrying the report; [`BooleanEngine`] wraps it for
//! callers that only want a result or a typed failure.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::builder::selection::Selector;
use crate::builder::shell_builder::ShellBuilder;
use crate::builder::{rebuild_shape, BuildOutput, Builder, History};
use crate::classify::FaceState;
use crate::config::BooleanOptions;
use crate::ds::{DataStructure, ShapeIndex};
use crate::error::{BooleanFailure, PreconditionError};
use crate::filler::{CancelToken, PaveFiller};
use crate::report::{AlertCode, AlertKind, Report};
use crate::topology::explore::subshapes;
use crate::topology::{ShapeId, ShapeKind, ShapeRef, ShapeStore};

/// The Boolean operation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BooleanOperation {
    Fuse,
    Common,
    Cut,
    Section,
}

/// Everything a Boolean run produced.
#[derive(Debug, Clone, Default)]
pub struct BooleanOutcome {
    /// `None` when the run aborted.
    pub result: Option<ShapeId>,
    pub report: Report,
    pub history: History,
    /// State of every split face relative to the opposite operand group.
    pub states: BTreeMap<ShapeId, FaceState>,
}

/// Builder-style front end of one Boolean operation.
#[derive(Debug, Clone)]
pub struct BooleanAlgo {
    operation: BooleanOperation,
    objects: Vec<ShapeId>,
    tools: Vec<ShapeId>,
    options: BooleanOptions,
    cancel: CancelToken,
}

impl BooleanAlgo {
    pub fn new(operation: BooleanOperation) -> Self {
        Self {
            operation,
            objects: Vec::new(),
            tools: Vec::new(),
            options: BooleanOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn objects(mut self, objects: Vec<ShapeId>) -> Self {
        self.objects = objects;
        self
    }

    pub fn tools(mut self, tools: Vec<ShapeId>) -> Self {
        self.tools = tools;
        self
    }

    pub fn options(mut self, options: BooleanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the operation. Argument shapes are never modified; new shapes are
    /// added to `store`.
    #[instrument(skip_all, fields(op = ?self.operation, objects = self.objects.len(), tools = self.tools.len()))]
    pub fn perform(&self, store: &mut ShapeStore) -> BooleanOutcome {
        let mut outcome = BooleanOutcome::default();
        if let Err(err) = self.options.validate() {
            outcome.report.fatal(AlertCode::InvalidInput, err.to_string(), vec![]);
            return outcome;
        }
        if self.objects.is_empty() {
            outcome.report.fatal(AlertCode::NullInput, "no object shapes were given", vec![]);
            return outcome;
        }
        if self.tools.is_empty() && self.operation != BooleanOperation::Fuse {
            outcome.report.fatal(AlertCode::NullInput, "no tool shapes were given", vec![]);
            return outcome;
        }

        let (arguments, object_count) = match self.arguments(store, &mut outcome.report) {
            Ok(args) => args,
            Err(err) => {
                outcome.report.fatal(err.alert_code(), err.to_string(), vec![]);
                return outcome;
            }
        };
        match self.run(store, &arguments, object_count, &mut outcome) {
            Ok(()) => outcome.report.mark_done(),
            Err(err) => {
                outcome.result = None;
                outcome.report.fatal(err.alert_code(), err.to_string(), vec![]);
            }
        }
        outcome
    }

    /// Objects followed by tools. Repeats inside a group are dropped; a shape
    /// given as both object and tool is copied on the tool side.
    fn arguments(&self, store: &mut ShapeStore, report: &mut Report) -> Result<(Vec<ShapeId>, usize), PreconditionError> {
        let mut objects: Vec<ShapeId> = Vec::with_capacity(self.objects.len());
        for &id in &self.objects {
            store.get(id)?;
            if objects.contains(&id) {
                report.info(AlertCode::DuplicateArgument, "object given twice; repeat ignored", vec![id]);
            } else {
                objects.push(id);
            }
        }
        let mut tools: Vec<ShapeId> = Vec::with_capacity(self.tools.len());
        for &id in &self.tools {
            store.get(id)?;
            if tools.contains(&id) {
                report.info(AlertCode::DuplicateArgument, "tool given twice; repeat ignored", vec![id]);
            } else if objects.contains(&id) {
                report.info(AlertCode::DuplicateArgument, "shape is both object and tool; tool copied", vec![id]);
                tools.push(store.deep_copy(id)?);
            } else {
                tools.push(id);
            }
        }
        let object_count = objects.len();
        objects.extend(tools);
        Ok((objects, object_count))
    }

    fn run(
        &self,
        store: &mut ShapeStore,
        arguments: &[ShapeId],
        object_count: usize,
        outcome: &mut BooleanOutcome,
    ) -> Result<(), PreconditionError> {
        let report = &mut outcome.report;
        let ds = PaveFiller::new(self.options.clone())
            .with_cancel(self.cancel.clone())
            .perform(store, arguments, report)?;
        let BuildOutput { images, pieces } = Builder::new(store, &ds, &self.options)
            .with_cancel(self.cancel.clone())
            .perform(report)?;
        self.cancel.check()?;

        let result = if self.operation == BooleanOperation::Section {
            section(store, &ds)?
        } else {
            let selection = Selector::new(store, &ds, &self.options, self.operation, object_count)
                .with_cancel(self.cancel.clone())
                .select(&pieces, report)?;
            outcome.states = selection.states;
            let expect_closed = all_solids(store, arguments)?;
            match ShellBuilder::new(store, &self.options, expect_closed).build(&selection.faces, report)? {
                Some(shape) => shape,
                None => store.add_compound(Vec::new()),
            }
        };
        if store.children(result)?.is_empty() {
            report.info(AlertCode::EmptyResult, "the operation produced no shape", vec![result]);
        }
        outcome.history = History::build(store, &ds, &images, Some(result))?;
        outcome.result = Some(result);
        info!(op = ?self.operation, faces = subshapes(store, result, ShapeKind::Face)?.len(), "boolean done");
        Ok(())
    }
}

fn all_solids(store: &ShapeStore, arguments: &[ShapeId]) -> Result<bool, PreconditionError> {
    for &arg in arguments {
        if subshapes(store, arg, ShapeKind::Solid)?.is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compound of every intersection between arguments: section edges, edges
/// lying inside faces of other arguments, shared edges and isolated
/// tangency points.
fn section(store: &mut ShapeStore, ds: &DataStructure) -> Result<ShapeId, PreconditionError> {
    let mut edges: BTreeSet<ShapeIndex> = BTreeSet::new();
    edges.extend(ds.section_blocks().iter().filter_map(|pb| ds.split_edge_of(*pb)));
    for f in ds.indices_of_kind(ShapeKind::Face) {
        if let Some(info) = ds.face_info(f) {
            edges.extend(info.in_blocks.iter().filter_map(|pb| ds.split_edge_of(*pb)));
        }
    }
    for cb in ds.common_blocks() {
        let ranks: BTreeSet<Option<usize>> = cb
            .blocks
            .iter()
            .map(|pb| ds.info(ds.block(*pb).original_edge).rank)
            .collect();
        if ranks.len() > 1 || !cb.faces.is_empty() {
            edges.extend(cb.edge);
        }
    }

    let mut touched = BTreeSet::new();
    let mut children = Vec::with_capacity(edges.len());
    for e in edges {
        let id = ds.shape_id(e);
        let (a, b) = store.edge_vertices(id)?;
        touched.extend([a, b]);
        children.push(ShapeRef::forward(id));
    }
    let mut points = BTreeSet::new();
    for ff in &ds.interferences.ff {
        for (_, v) in &ff.points {
            let id = ds.shape_id(ds.real_vertex(*v));
            if !touched.contains(&id) {
                points.insert(id);
            }
        }
    }
    children.extend(points.into_iter().map(ShapeRef::forward));
    Ok(store.add_compound(children))
}

// ─── General Fuse ────────────────────────────────────────────────────────────

/// Splits every argument by all the others without selecting anything.
///
/// The result is a compound holding one rebuilt copy of each argument, in
/// argument order; shared pieces are shared between the copies.
#[derive(Debug, Clone)]
pub struct GeneralFuse {
    arguments: Vec<ShapeId>,
    options: BooleanOptions,
    cancel: CancelToken,
}

impl GeneralFuse {
    pub fn new(arguments: Vec<ShapeId>) -> Self {
        Self {
            arguments,
            options: BooleanOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn options(mut self, options: BooleanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[instrument(skip_all, fields(arguments = self.arguments.len()))]
    pub fn perform(&self, store: &mut ShapeStore) -> BooleanOutcome {
        let mut outcome = BooleanOutcome::default();
        if let Err(err) = self.options.validate() {
            outcome.report.fatal(AlertCode::InvalidInput, err.to_string(), vec![]);
            return outcome;
        }
        let mut arguments = Vec::with_capacity(self.arguments.len());
        for &id in &self.arguments {
            if arguments.contains(&id) {
                outcome.report.info(AlertCode::DuplicateArgument, "argument given twice; repeat ignored", vec![id]);
            } else {
                arguments.push(id);
            }
        }
        match self.run(store, &arguments, &mut outcome) {
            Ok(()) => outcome.report.mark_done(),
            Err(err) => {
                outcome.result = None;
                outcome.report.fatal(err.alert_code(), err.to_string(), vec![]);
            }
        }
        outcome
    }

    fn run(&self, store: &mut ShapeStore, arguments: &[ShapeId], outcome: &mut BooleanOutcome) -> Result<(), PreconditionError> {
        let report = &mut outcome.report;
        let ds = PaveFiller::new(self.options.clone())
            .with_cancel(self.cancel.clone())
            .perform(store, arguments, report)?;
        let BuildOutput { images, .. } = Builder::new(store, &ds, &self.options)
            .with_cancel(self.cancel.clone())
            .perform(report)?;
        let mut children = Vec::with_capacity(arguments.len());
        for &arg in arguments {
            children.extend(rebuild_shape(store, &images, ShapeRef::forward(arg))?);
        }
        let result = store.add_compound(children);
        outcome.history = History::build(store, &ds, &images, Some(result))?;
        outcome.result = Some(result);
        Ok(())
    }
}

// ─── Engine trait ────────────────────────────────────────────────────────────

/// Boolean operations on two shapes returning either the result or a typed
/// failure. Implement this trait to provide alternative backends or mocks.
pub trait BooleanEngine {
    fn fuse(&self, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure>;

    /// Remove `b` from `a`.
    fn cut(&self, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure>;

    fn common(&self, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure>;

    fn section(&self, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure>;
}

/// Engine backed by [`BooleanAlgo`].
#[derive(Debug, Clone, Default)]
pub struct DefaultBooleanEngine {
    pub options: BooleanOptions,
}

impl DefaultBooleanEngine {
    pub fn new(options: BooleanOptions) -> Self {
        Self { options }
    }

    fn run(&self, op: BooleanOperation, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure> {
        let outcome = BooleanAlgo::new(op)
            .objects(vec![a])
            .tools(vec![b])
            .options(self.options.clone())
            .perform(store);
        if outcome.report.has_errors() {
            let errors: Vec<_> = outcome
                .report
                .alerts()
                .iter()
                .filter(|a| matches!(a.kind, AlertKind::Error | AlertKind::AbortFatal))
                .collect();
            return Err(BooleanFailure::Aborted {
                count: errors.len(),
                first: errors.first().map(|a| a.to_string()).unwrap_or_default(),
            });
        }
        match outcome.result {
            Some(_) if outcome.report.has_code(AlertCode::EmptyResult) => Err(BooleanFailure::EmptyResult),
            Some(result) => Ok(result),
            None => Err(BooleanFailure::EmptyResult),
        }
    }
}

impl BooleanEngine for DefaultBooleanEngine {
    fn fuse(&self, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure> {
        self.run(BooleanOperation::Fuse, store, a, b)
    }

    fn cut(&self, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure> {
        self.run(BooleanOperation::Cut, store, a, b)
    }

    fn common(&self, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure> {
        self.run(BooleanOperation::Common, store, a, b)
    }

    fn section(&self, store: &mut ShapeStore, a: ShapeId, b: ShapeId) -> Result<ShapeId, BooleanFailure> {
        self.run(BooleanOperation::Section, store, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::measure::solid_volume;
    use crate::topology::primitives::make_box;
    use approx::assert_relative_eq;

    fn boxes(store: &mut ShapeStore, offset: f64) -> (ShapeId, ShapeId) {
        let a = make_box(store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let b = make_box(store, Point3d::new(offset, offset, offset), Point3d::new(offset + 1.0, offset + 1.0, offset + 1.0));
        (a, b)
    }

    fn engine() -> DefaultBooleanEngine {
        DefaultBooleanEngine::new(BooleanOptions::sequential())
    }

    #[test]
    fn test_engine_common_of_overlapping_boxes() {
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store, 0.5);
        let result = engine().common(&mut store, a, b).unwrap();
        assert_relative_eq!(solid_volume(&store, result).unwrap(), 0.125, epsilon = 1e-7);
    }

    #[test]
    fn test_engine_cut_and_fuse_volumes() {
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store, 0.5);
        let cut = engine().cut(&mut store, a, b).unwrap();
        assert_relative_eq!(solid_volume(&store, cut).unwrap(), 0.875, epsilon = 1e-7);
        let fuse = engine().fuse(&mut store, a, b).unwrap();
        assert_relative_eq!(solid_volume(&store, fuse).unwrap(), 1.875, epsilon = 1e-7);
        assert_eq!(store.kind(fuse).unwrap(), ShapeKind::Solid);
    }

    #[test]
    fn test_engine_disjoint_common_is_empty() {
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store, 3.0);
        assert_eq!(engine().common(&mut store, a, b), Err(BooleanFailure::EmptyResult));
    }

    #[test]
    fn test_null_input_is_fatal() {
        let mut store = ShapeStore::new();
        let (a, _) = boxes(&mut store, 3.0);
        let outcome = BooleanAlgo::new(BooleanOperation::Cut).objects(vec![a]).perform(&mut store);
        assert!(outcome.result.is_none());
        assert!(outcome.report.has_code(AlertCode::NullInput));
        assert!(!outcome.report.is_done());
    }

    #[test]
    fn test_invalid_options_are_fatal() {
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store, 0.5);
        let options = BooleanOptions {
            fuzzy_value: -1.0,
            ..BooleanOptions::sequential()
        };
        let outcome = BooleanAlgo::new(BooleanOperation::Fuse)
            .objects(vec![a])
            .tools(vec![b])
            .options(options)
            .perform(&mut store);
        assert!(outcome.report.has_code(AlertCode::InvalidInput));
        assert!(outcome.report.is_fatal());
    }

    #[test]
    fn test_cancelled_run_reports_cancelled() {
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store, 0.5);
        let token = CancelToken::new();
        token.cancel();
        let outcome = BooleanAlgo::new(BooleanOperation::Fuse)
            .objects(vec![a])
            .tools(vec![b])
            .options(BooleanOptions::sequential())
            .cancel_token(token)
            .perform(&mut store);
        assert!(outcome.result.is_none());
        assert!(outcome.report.has_code(AlertCode::Cancelled));
    }

    #[test]
    fn test_same_shape_as_object_and_tool() {
        let mut store = ShapeStore::new();
        let (a, _) = boxes(&mut store, 3.0);
        let outcome = BooleanAlgo::new(BooleanOperation::Fuse)
            .objects(vec![a])
            .tools(vec![a])
            .options(BooleanOptions::sequential())
            .perform(&mut store);
        assert!(outcome.report.has_code(AlertCode::DuplicateArgument));
        let result = outcome.result.unwrap();
        assert_relative_eq!(solid_volume(&store, result).unwrap(), 1.0, epsilon = 1e-7);
        assert_eq!(subshapes(&store, result, ShapeKind::Face).unwrap().len(), 6);
    }

    #[test]
    fn test_section_of_overlapping_boxes() {
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store, 0.5);
        let section = engine().section(&mut store, a, b).unwrap();
        assert_eq!(store.kind(section).unwrap(), ShapeKind::Compound);
        // Six segments of length 0.5 where the two boundaries cross.
        let edges = subshapes(&store, section, ShapeKind::Edge).unwrap();
        assert_eq!(edges.len(), 6);
        assert!(subshapes(&store, section, ShapeKind::Face).unwrap().is_empty());
    }

    #[test]
    fn test_general_fuse_keeps_every_piece() {
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store, 0.5);
        let outcome = GeneralFuse::new(vec![a, b]).options(BooleanOptions::sequential()).perform(&mut store);
        assert!(outcome.report.is_done());
        let result = outcome.result.unwrap();
        assert_eq!(store.children(result).unwrap().len(), 2);
        assert_eq!(subshapes(&store, result, ShapeKind::Face).unwrap().len(), 18);
        assert_relative_eq!(solid_volume(&store, result).unwrap(), 2.0, epsilon = 1e-7);
    }
}
