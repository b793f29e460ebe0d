//! Contracts: reusable store plugins.
//!
//! A contract bundles exactly one pipeline with an optional middleware and an
//! optional single-event reducer. Installing one with
//! [`StoreBuilder::add_contract`](crate::StoreBuilder::add_contract) is the
//! same as registering its parts one by one; contracts add no runtime
//! machinery of their own.
//!
//! [`RouterContract`](crate::router::RouterContract) is the worked example.

use std::sync::Arc;

use crate::core::Model;
use crate::event::SingleEventReducer;
use crate::middleware::Middleware;
use crate::pipeline::{OverlapPolicy, Pipeline};

/// A cross-cutting feature that can be composed into any store of model `M`.
///
/// # Example
///
/// ```ignore
/// struct AuditContract;
///
/// impl Contract<LoginModel> for AuditContract {
///     type Pipeline = AuditPipeline;
///
///     fn pipeline(&self) -> AuditPipeline {
///         AuditPipeline::default()
///     }
///
///     fn middleware(&self) -> Option<Arc<dyn Middleware<LoginModel>>> {
///         Some(Arc::new(AuditLog))
///     }
/// }
/// ```
pub trait Contract<M: Model>: Send + 'static {
    /// The pipeline this contract contributes.
    type Pipeline: Pipeline<M>;

    fn pipeline(&self) -> Self::Pipeline;

    /// Middleware appended to the store's chain, if any.
    fn middleware(&self) -> Option<Arc<dyn Middleware<M>>> {
        None
    }

    /// Single-event reducer appended to the store's extractors, if any.
    fn single_event_reducer(&self) -> Option<SingleEventReducer<M>> {
        None
    }

    /// How overlapping invocations of the pipeline are handled.
    fn overlap_policy(&self) -> OverlapPolicy {
        OverlapPolicy::Concurrent
    }

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
