//! Error guard between the pipelines and the fold.
//!
//! Every pipeline invocation ends in a [`PipelineOutcome`]. The guard turns
//! each outcome into what the fold should apply:
//!
//! | Outcome     | Folded              | Seen by single-event reducers |
//! |-------------|---------------------|-------------------------------|
//! | `Produced`  | the reducer         | yes                           |
//! | `Unchanged` | nothing             | no                            |
//! | `Failed`    | `Reducer::empty()`  | no                            |
//!
//! A failure is logged and replaced, never propagated: the state stream
//! outlives any number of failing pipelines.

use tracing::error;

use crate::core::{Reducer, StoreId};
use crate::error::PipelineError;

/// How one pipeline invocation (or one progress emission) ended.
#[derive(Debug)]
pub(crate) enum PipelineOutcome<R> {
    /// The pipeline described a state change.
    Produced(R),
    /// The pipeline finished without a state change.
    Unchanged,
    /// The pipeline's effect failed or panicked.
    Failed(PipelineError),
}

/// A reducer cleared for folding.
#[derive(Debug)]
pub(crate) enum Guarded<R> {
    /// Produced by a pipeline.
    Produced(R),
    /// The empty reducer standing in for a failure.
    Substituted(R),
}

impl<R> Guarded<R> {
    pub(crate) fn reducer(&self) -> &R {
        match self {
            Guarded::Produced(r) | Guarded::Substituted(r) => r,
        }
    }

    /// Whether single-event reducers should observe this reducer.
    pub(crate) fn is_produced(&self) -> bool {
        matches!(self, Guarded::Produced(_))
    }
}

/// Convert an outcome into something safe to fold.
pub(crate) fn guard<S, R: Reducer<S>>(store: StoreId, outcome: PipelineOutcome<R>) -> Option<Guarded<R>> {
    match outcome {
        PipelineOutcome::Produced(reducer) => Some(Guarded::Produced(reducer)),
        PipelineOutcome::Unchanged => None,
        PipelineOutcome::Failed(err) => {
            error!(
                store = %store,
                pipeline = err.pipeline(),
                error = %err,
                "pipeline failed, folding empty reducer"
            );
            Some(Guarded::Substituted(R::empty()))
        }
    }
}
