//! Pipelines: action → async effect → reducer.
//!
//! A pipeline picks out one action variant with [`Pipeline::select`] and, for
//! every match, runs [`Pipeline::execute`] in its own task. The reducer it
//! returns is folded into the state; `Ok(None)` means "no state change" and an
//! `Err` (or a panic) is contained by the error guard.
//!
//! # Key Properties
//!
//! - **Compile-time filtering**: `select` is a `match` on the action enum
//! - **Independent**: a slow pipeline never delays another or a new dispatch
//! - **One reducer per match**: progress streams opt in through
//!   [`PipelineContext::emit`]
//! - **Overlap**: by default every invocation runs to completion and the
//!   reducers fold in completion order; see [`OverlapPolicy`]

use std::future::Future;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, trace};

use crate::core::Model;
use crate::error::{panic_message, PipelineError};
use crate::guard::PipelineOutcome;
use crate::scope::StoreScope;
use crate::store::StoreHandle;

/// What to do when a pipeline matches while a previous invocation still runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Run every invocation to completion; reducers fold in completion order.
    #[default]
    Concurrent,
    /// Abort the still-running previous invocation; only the newest completes.
    LatestWins,
}

/// An action → reducer transformation bound to one action variant.
///
/// # Example
///
/// ```ignore
/// struct LoginPipeline {
///     repository: Arc<dyn UserRepository>,
/// }
///
/// #[async_trait]
/// impl Pipeline<LoginModel> for LoginPipeline {
///     type Input = (String, String);
///
///     fn select(&self, action: &LoginAction) -> Option<(String, String)> {
///         match action {
///             LoginAction::RequestLogin { name, pass } => Some((name.clone(), pass.clone())),
///             _ => None,
///         }
///     }
///
///     async fn execute(
///         &self,
///         (name, pass): (String, String),
///         _ctx: PipelineContext<LoginModel>,
///     ) -> Result<Option<LoginReducer>> {
///         let resp = self.repository.login(&name, &pass).await?;
///         Ok(Some(LoginReducer::from_response(name, resp)))
///     }
/// }
/// ```
#[async_trait]
pub trait Pipeline<M: Model>: Send + Sync + 'static {
    /// The payload extracted from a matching action.
    type Input: Send + 'static;

    /// Match the action variant this pipeline handles.
    ///
    /// Called on the action loop for every action, so keep it cheap and
    /// free of IO.
    fn select(&self, action: &M::Action) -> Option<Self::Input>;

    /// Perform the effect and describe the resulting state change.
    async fn execute(&self, input: Self::Input, ctx: PipelineContext<M>) -> Result<Option<M::Reducer>>;
}

/// Context handed to every pipeline invocation.
pub struct PipelineContext<M: Model> {
    store: StoreHandle<M>,
    outcomes: mpsc::Sender<PipelineOutcome<M::Reducer>>,
    pipeline: &'static str,
}

impl<M: Model> PipelineContext<M> {
    pub(crate) fn new(
        store: StoreHandle<M>,
        outcomes: mpsc::Sender<PipelineOutcome<M::Reducer>>,
        pipeline: &'static str,
    ) -> Self {
        Self {
            store,
            outcomes,
            pipeline,
        }
    }

    /// The current state at the time of the call.
    pub fn state(&self) -> M::State {
        self.store.state()
    }

    /// The store this invocation belongs to.
    pub fn store(&self) -> &StoreHandle<M> {
        &self.store
    }

    /// Name of the pipeline running this invocation.
    pub fn pipeline(&self) -> &'static str {
        self.pipeline
    }

    /// Fold an intermediate reducer before the invocation finishes.
    ///
    /// This is how a progress stream emits more than one reducer per action.
    /// Suspends while the fold queue is full. Returns `false` if the store
    /// has been torn down.
    pub async fn emit(&self, reducer: M::Reducer) -> bool {
        self.outcomes
            .send(PipelineOutcome::Produced(reducer))
            .await
            .is_ok()
    }
}

impl<M: Model> Clone for PipelineContext<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            outcomes: self.outcomes.clone(),
            pipeline: self.pipeline,
        }
    }
}

impl<M: Model> std::fmt::Debug for PipelineContext<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("store", &self.store.id())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// A pipeline assembled from two closures. See [`pipeline_fn`].
pub struct FnPipeline<M, I, S, E> {
    select: S,
    execute: E,
    _marker: PhantomData<fn() -> (M, I)>,
}

/// Build a pipeline from a selector and an async effect.
///
/// ```ignore
/// let logout = pipeline_fn(
///     |action: &LoginAction| matches!(action, LoginAction::Logout).then_some(()),
///     |_, _ctx: PipelineContext<LoginModel>| async { Ok(Some(LoginReducer::Logout)) },
/// );
/// ```
pub fn pipeline_fn<M, I, S, E, Fut>(select: S, execute: E) -> FnPipeline<M, I, S, E>
where
    M: Model,
    I: Send + 'static,
    S: Fn(&M::Action) -> Option<I> + Send + Sync + 'static,
    E: Fn(I, PipelineContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<M::Reducer>>> + Send + 'static,
{
    FnPipeline {
        select,
        execute,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<M, I, S, E, Fut> Pipeline<M> for FnPipeline<M, I, S, E>
where
    M: Model,
    I: Send + 'static,
    S: Fn(&M::Action) -> Option<I> + Send + Sync + 'static,
    E: Fn(I, PipelineContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<M::Reducer>>> + Send + 'static,
{
    type Input = I;

    fn select(&self, action: &M::Action) -> Option<I> {
        (self.select)(action)
    }

    async fn execute(&self, input: I, ctx: PipelineContext<M>) -> Result<Option<M::Reducer>> {
        (self.execute)(input, ctx).await
    }
}

type Launch<M> = Box<
    dyn Fn(
            &<M as Model>::Action,
            PipelineContext<M>,
        ) -> Option<BoxFuture<'static, PipelineOutcome<<M as Model>::Reducer>>>
        + Send
        + Sync,
>;

/// Type-erased pipeline so one store can hold pipelines with different inputs.
pub(crate) struct PipelineRunner<M: Model> {
    launch: Launch<M>,
    name: &'static str,
    policy: OverlapPolicy,
    latest: Mutex<Option<AbortHandle>>,
}

impl<M: Model> PipelineRunner<M> {
    pub(crate) fn new<P: Pipeline<M>>(pipeline: P, policy: OverlapPolicy) -> Self {
        let pipeline = Arc::new(pipeline);
        let name = std::any::type_name::<P>();

        Self {
            name,
            policy,
            latest: Mutex::new(None),
            launch: Box::new(move |action: &M::Action, ctx: PipelineContext<M>| {
                let input = pipeline.select(action)?;
                let pipeline = pipeline.clone();

                Some(
                    async move {
                        // AssertUnwindSafe is required because pipeline/ctx are not UnwindSafe
                        match AssertUnwindSafe(pipeline.execute(input, ctx))
                            .catch_unwind()
                            .await
                        {
                            Ok(Ok(Some(reducer))) => PipelineOutcome::Produced(reducer),
                            Ok(Ok(None)) => PipelineOutcome::Unchanged,
                            Ok(Err(e)) => PipelineOutcome::Failed(PipelineError::failed(name, &e)),
                            Err(panic_info) => PipelineOutcome::Failed(PipelineError::Panicked {
                                pipeline: name,
                                message: panic_message(&panic_info),
                            }),
                        }
                    }
                    .boxed(),
                )
            }),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Start an invocation if this pipeline selects `action`.
    ///
    /// Returns whether an invocation was spawned.
    pub(crate) fn offer(
        &self,
        action: &M::Action,
        store: &StoreHandle<M>,
        outcomes: &mpsc::Sender<PipelineOutcome<M::Reducer>>,
        scope: &StoreScope,
    ) -> bool {
        let ctx = PipelineContext::new(store.clone(), outcomes.clone(), self.name);

        let invocation = match catch_unwind(AssertUnwindSafe(|| (self.launch)(action, ctx))) {
            Ok(Some(invocation)) => invocation,
            Ok(None) => return false,
            Err(panic_info) => {
                error!(
                    store = %store.id(),
                    pipeline = self.name,
                    panic = %panic_message(&panic_info),
                    "pipeline panicked in select()"
                );
                return false;
            }
        };

        let outcomes = outcomes.clone();
        let task = async move {
            let outcome = invocation.await;
            // A closed queue means the store is being torn down
            let _ = outcomes.send(outcome).await;
        };

        let Some(abort) = scope.spawn(task) else {
            debug!(store = %store.id(), pipeline = self.name, "scope cancelled, invocation dropped");
            return false;
        };
        trace!(store = %store.id(), pipeline = self.name, "pipeline invocation started");

        if self.policy == OverlapPolicy::LatestWins {
            let mut latest = self
                .latest
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(previous) = latest.replace(abort) {
                if !previous.is_finished() {
                    debug!(store = %store.id(), pipeline = self.name, "superseded invocation aborted");
                }
                previous.abort();
            }
        }
        true
    }
}

impl<M: Model> std::fmt::Debug for PipelineRunner<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
