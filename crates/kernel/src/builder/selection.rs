//! Selection of the split faces that bound the result of a Boolean operation.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::boolean::BooleanOperation;
use crate::classify::{Classifier, FaceClass, FaceState};
use crate::config::BooleanOptions;
use crate::ds::DataStructure;
use crate::error::PreconditionError;
use crate::filler::exec::Executor;
use crate::filler::CancelToken;
use crate::report::{AlertCode, Report};
use crate::topology::{ShapeId, ShapeRef, ShapeStore};

use super::Piece;

/// Faces kept for the result, oriented as they bound it.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub faces: Vec<ShapeRef>,
    /// State of every piece relative to the opposite group.
    pub states: BTreeMap<ShapeId, FaceState>,
}

/// Which operand group an argument belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Object,
    Tool,
}

/// What to do with a piece in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Drop,
    Keep,
    KeepReversed,
    /// Keep unless a coincident face with a lower index survives.
    KeepLowest,
}

fn verdict(op: BooleanOperation, group: Group, state: FaceState) -> Verdict {
    use FaceState::*;
    use Verdict::*;
    // UNKNOWN is resolved as OUT.
    let state = if state == Unknown { Out } else { state };
    match (op, group, state) {
        (BooleanOperation::Fuse, _, Out) => Keep,
        (BooleanOperation::Fuse, _, OnSame) => KeepLowest,
        (BooleanOperation::Common, _, In) => Keep,
        (BooleanOperation::Common, _, OnSame) => KeepLowest,
        (BooleanOperation::Cut, Group::Object, Out | OnOpposite) => Keep,
        (BooleanOperation::Cut, Group::Tool, In) => KeepReversed,
        _ => Drop,
    }
}

/// Fold the classifications against every member of a group into one state.
/// Inside any member wins, then the first coincidence in argument order.
fn group_state(classes: &[FaceClass]) -> FaceClass {
    if let Some(c) = classes.iter().find(|c| c.state == FaceState::In) {
        return *c;
    }
    if let Some(c) = classes.iter().find(|c| c.state.is_on()) {
        return *c;
    }
    if let Some(c) = classes.iter().find(|c| c.state == FaceState::Unknown) {
        return *c;
    }
    FaceClass {
        state: FaceState::Out,
        on_face: None,
    }
}

/// Picks the result faces of `op` among `pieces`. Arguments with rank below
/// `object_count` are objects, the rest are tools.
pub struct Selector<'a> {
    store: &'a ShapeStore,
    ds: &'a DataStructure,
    options: &'a BooleanOptions,
    op: BooleanOperation,
    object_count: usize,
    cancel: CancelToken,
}

impl<'a> Selector<'a> {
    pub fn new(
        store: &'a ShapeStore,
        ds: &'a DataStructure,
        options: &'a BooleanOptions,
        op: BooleanOperation,
        object_count: usize,
    ) -> Self {
        Self {
            store,
            ds,
            options,
            op,
            object_count,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn group(&self, rank: usize) -> Group {
        if rank < self.object_count { Group::Object } else { Group::Tool }
    }

    #[instrument(skip_all, fields(op = ?self.op, pieces = pieces.len()))]
    pub fn select(&self, pieces: &[Piece], report: &mut Report) -> Result<Selection, PreconditionError> {
        let executor = Executor::new(self.options);
        let arguments = self.ds.arguments();
        let classifiers = executor.map(arguments, &self.cancel, |arg| Classifier::new(self.store, *arg, self.options))?;
        let classifiers = classifiers.into_iter().collect::<Result<Vec<_>, _>>()?;

        // (against own group, against opposite group) per piece.
        let classified = executor.map(pieces, &self.cancel, |piece| {
            let mut own = Vec::new();
            let mut opposite = Vec::new();
            for (rank, classifier) in classifiers.iter().enumerate() {
                if rank == piece.rank {
                    continue;
                }
                let class = classifier.classify_face(self.store, piece.oriented())?;
                if self.group(rank) == self.group(piece.rank) {
                    own.push(class);
                } else {
                    opposite.push(class);
                }
            }
            Ok::<_, crate::topology::TopologyError>((group_state(&own), group_state(&opposite)))
        })?;

        let mut selection = Selection::default();
        for (piece, classes) in pieces.iter().zip(classified) {
            let (own, opposite) = classes?;
            selection.states.insert(piece.face, opposite.state);
            if own.state == FaceState::Unknown || opposite.state == FaceState::Unknown {
                report.warning(
                    AlertCode::ClassificationAmbiguous,
                    "every ray was inconclusive; piece treated as outside",
                    vec![piece.face],
                );
            }
            if !self.survives_own_group(piece, &own) {
                continue;
            }
            let keep = match verdict(self.op, self.group(piece.rank), opposite.state) {
                Verdict::Drop => None,
                Verdict::Keep => Some(piece.oriented()),
                Verdict::KeepReversed => Some(piece.oriented().flipped()),
                Verdict::KeepLowest => self.is_lowest(piece, &opposite).then(|| piece.oriented()),
            };
            if let Some(face) = keep {
                selection.faces.push(face);
            }
        }
        debug!(kept = selection.faces.len(), "faces selected");
        Ok(selection)
    }

    /// Pieces inside, or coincident with, another member of their own group
    /// are internal to the group and never bound the result.
    fn survives_own_group(&self, piece: &Piece, own: &FaceClass) -> bool {
        match own.state {
            FaceState::Out | FaceState::Unknown => true,
            FaceState::OnSame => self.is_lowest(piece, own),
            FaceState::In | FaceState::OnOpposite => false,
        }
    }

    fn is_lowest(&self, piece: &Piece, class: &FaceClass) -> bool {
        match class.on_face.and_then(|f| self.ds.index_of(f)) {
            Some(other) => piece.origin_index < other,
            None => true,
        }
    }
}
