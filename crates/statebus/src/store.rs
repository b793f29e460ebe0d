//! The store: one current state, fed by pipelines, folded in order.
//!
//! A running store is two long-lived tasks plus one task per pipeline
//! invocation, all bound to the store's [`StoreScope`]:
//!
//! - the **action loop** drains the action bus, runs the middleware
//!   chain once per action, and offers the result to every pipeline
//! - the **fold loop** receives pipeline outcomes in completion order, guards
//!   them, folds them into the state, and then runs the single-event reducers
//!
//! The fold loop is the only writer of the state, so transitions are totally
//! ordered without any locking on the caller's side.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace};

use crate::bus::ActionBus;
use crate::config::StoreConfig;
use crate::core::{Model, Reducer, StoreId};
use crate::error::{panic_message, StoreError};
use crate::event::{extract_events, EventChannel, EventStream, SingleEventReducer};
use crate::guard::{guard, PipelineOutcome};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::pipeline::PipelineRunner;
use crate::scope::StoreScope;

/// A cheap, cloneable view of a store.
///
/// Middlewares and pipelines receive one so they can read the current state
/// or dispatch follow-up actions. A handle does not keep the store alive:
/// once the store is destroyed, dispatching through the handle is a no-op.
pub struct StoreHandle<M: Model> {
    id: StoreId,
    bus: ActionBus<M::Action>,
    state: watch::Receiver<M::State>,
    destroyed: Arc<AtomicBool>,
}

impl<M: Model> StoreHandle<M> {
    pub(crate) fn new(
        id: StoreId,
        bus: ActionBus<M::Action>,
        state: watch::Receiver<M::State>,
        destroyed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            bus,
            state,
            destroyed,
        }
    }

    /// The store's ID.
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Enqueue an action. Never blocks and never waits for processing.
    ///
    /// Actions dispatched after the store was destroyed are dropped.
    pub fn dispatch(&self, action: M::Action) {
        if self.is_destroyed() {
            debug!(store = %self.id, ?action, "store destroyed, action dropped");
            return;
        }
        trace!(store = %self.id, ?action, "action dispatched");
        if !self.bus.dispatch(action) {
            debug!(store = %self.id, "action loop not listening, action dropped");
        }
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> M::State {
        self.state.borrow().clone()
    }

    /// Whether the store has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl<M: Model> Clone for StoreHandle<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            bus: self.bus.clone(),
            state: self.state.clone(),
            destroyed: self.destroyed.clone(),
        }
    }
}

impl<M: Model> std::fmt::Debug for StoreHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("id", &self.id)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

/// Everything a store needs to start, collected by the builder.
pub(crate) struct StoreParts<M: Model> {
    pub(crate) initial: M::State,
    pub(crate) config: StoreConfig,
    pub(crate) scope: StoreScope,
    pub(crate) middlewares: Vec<Arc<dyn Middleware<M>>>,
    pub(crate) pipelines: Vec<PipelineRunner<M>>,
    pub(crate) extractors: Vec<SingleEventReducer<M>>,
}

/// A running store.
///
/// Created by [`StoreBuilder::build`](crate::StoreBuilder::build). Dropping
/// the store destroys it.
///
/// # Example
///
/// ```ignore
/// let store = StoreBuilder::<LoginModel>::new(LoginState::default())
///     .add_contract(LoginContract::new(repository))
///     .build()?;
///
/// let mut events = store.single_event();
/// store.dispatch(LoginAction::RequestLogin { name: "admin".into(), pass: "admin".into() });
///
/// if let Some(LoginEvent::Success) = events.recv().await {
///     assert_eq!(store.state().token.as_deref(), Some("token"));
/// }
/// ```
pub struct Store<M: Model> {
    handle: StoreHandle<M>,
    events: Arc<EventChannel<M::Event>>,
    scope: StoreScope,
}

impl<M: Model> Store<M> {
    /// Start a builder with the given initial state.
    pub fn builder(initial: M::State) -> crate::StoreBuilder<M> {
        crate::StoreBuilder::new(initial)
    }

    /// Wire up the bus, the channels and both loops.
    pub(crate) fn launch(parts: StoreParts<M>) -> Result<Self, StoreError> {
        let StoreParts {
            initial,
            config,
            scope,
            middlewares,
            pipelines,
            extractors,
        } = parts;

        if scope.is_cancelled() {
            return Err(StoreError::ScopeCancelled);
        }

        let id = StoreId::new();
        let (bus, actions) = ActionBus::channel();
        let (state_tx, state_rx) = watch::channel(initial);
        let (outcomes_tx, outcomes_rx) = mpsc::channel(config.reducer_capacity);
        let events = Arc::new(EventChannel::new());
        let handle = StoreHandle::new(id, bus, state_rx, Arc::new(AtomicBool::new(false)));

        let pipeline_names: Vec<&'static str> = pipelines.iter().map(PipelineRunner::name).collect();
        let action_loop = ActionLoop {
            handle: handle.clone(),
            middlewares: MiddlewareChain::new(middlewares),
            pipelines,
            outcomes: outcomes_tx,
            scope: scope.clone(),
        };
        let fold_loop = FoldLoop::<M> {
            id,
            state: state_tx,
            extractors,
            events: events.clone(),
        };

        let middleware_count = action_loop.middlewares.len();
        let extractor_count = fold_loop.extractors.len();

        if scope.spawn(fold_loop.run(outcomes_rx)).is_none()
            || scope.spawn(action_loop.run(actions)).is_none()
        {
            scope.cancel();
            return Err(StoreError::ScopeCancelled);
        }

        info!(
            store = %id,
            pipelines = pipeline_names.len(),
            middlewares = middleware_count,
            single_event_reducers = extractor_count,
            "store started"
        );
        debug!(store = %id, ?pipeline_names, "pipelines registered");

        Ok(Self {
            handle,
            events,
            scope,
        })
    }

    /// The store's ID.
    pub fn id(&self) -> StoreId {
        self.handle.id
    }

    /// Enqueue an action. See [`StoreHandle::dispatch`].
    pub fn dispatch(&self, action: M::Action) {
        self.handle.dispatch(action);
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> M::State {
        self.handle.state()
    }

    /// A watch receiver for the current state.
    ///
    /// Intermediate states may be skipped by slow readers; the latest is
    /// always observable.
    pub fn watch_state(&self) -> watch::Receiver<M::State> {
        self.handle.state.clone()
    }

    /// The current state followed by every published change.
    ///
    /// Ends when the store is destroyed.
    pub fn state_stream(&self) -> BoxStream<'static, M::State> {
        let mut receiver = self.handle.state.clone();
        receiver.mark_changed();
        stream::unfold(receiver, |mut receiver| async move {
            receiver.changed().await.ok()?;
            let state = receiver.borrow_and_update().clone();
            Some((state, receiver))
        })
        .boxed()
    }

    /// A stream of `selector(state)` with consecutive duplicates removed.
    ///
    /// ```ignore
    /// let mut logged_in = store.select(|s: &LoginState| s.token.is_some());
    /// assert_eq!(logged_in.next().await, Some(false));
    /// ```
    pub fn select<T, F>(&self, selector: F) -> BoxStream<'static, T>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(&M::State) -> T + Send + 'static,
    {
        let mut last: Option<T> = None;
        self.state_stream()
            .filter_map(move |state| {
                let value = selector(&state);
                let next = if last.as_ref() == Some(&value) {
                    None
                } else {
                    last = Some(value.clone());
                    Some(value)
                };
                future::ready(next)
            })
            .boxed()
    }

    /// Subscribe to single events emitted from now on.
    pub fn single_event(&self) -> EventStream<M::Event> {
        self.events.subscribe()
    }

    /// A cloneable handle to this store.
    pub fn handle(&self) -> StoreHandle<M> {
        self.handle.clone()
    }

    /// The scope the store's tasks run in.
    pub fn scope(&self) -> &StoreScope {
        &self.scope
    }

    /// Tear the store down. Idempotent.
    ///
    /// Aborts the action loop, the fold loop and every in-flight pipeline
    /// invocation, and ends all event streams. The last state stays readable.
    pub fn destroy(&self) {
        if self.handle.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scope.cancel();
        self.events.close();
        info!(store = %self.handle.id, "store destroyed");
    }

    /// Whether [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.handle.is_destroyed()
    }
}

impl<M: Model> Drop for Store<M> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<M: Model> std::fmt::Debug for Store<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.handle.id)
            .field("destroyed", &self.is_destroyed())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

struct ActionLoop<M: Model> {
    handle: StoreHandle<M>,
    middlewares: MiddlewareChain<M>,
    pipelines: Vec<PipelineRunner<M>>,
    outcomes: mpsc::Sender<PipelineOutcome<M::Reducer>>,
    scope: StoreScope,
}

impl<M: Model> ActionLoop<M> {
    async fn run(self, mut actions: mpsc::UnboundedReceiver<M::Action>) {
        let id = self.handle.id;
        while let Some(action) = actions.recv().await {
            let action = self.middlewares.apply(&self.handle, action).await;

            let mut started = 0usize;
            for pipeline in &self.pipelines {
                if pipeline.offer(&action, &self.handle, &self.outcomes, &self.scope) {
                    started += 1;
                }
            }
            if started == 0 {
                trace!(store = %id, ?action, "no pipeline selected action");
            } else {
                trace!(store = %id, started, "pipelines started for action");
            }
        }
        debug!(store = %id, "action loop stopped");
    }
}

struct FoldLoop<M: Model> {
    id: StoreId,
    state: watch::Sender<M::State>,
    extractors: Vec<SingleEventReducer<M>>,
    events: Arc<EventChannel<M::Event>>,
}

impl<M: Model> FoldLoop<M> {
    async fn run(self, mut outcomes: mpsc::Receiver<PipelineOutcome<M::Reducer>>) {
        while let Some(outcome) = outcomes.recv().await {
            let Some(guarded) = guard::<M::State, M::Reducer>(self.id, outcome) else {
                continue;
            };

            let reduced = {
                let current = self.state.borrow();
                catch_unwind(AssertUnwindSafe(|| guarded.reducer().reduce(&current)))
            };
            let next = match reduced {
                Ok(next) => next,
                Err(panic_info) => {
                    error!(
                        store = %self.id,
                        panic = %panic_message(&panic_info),
                        "reducer panicked, state unchanged"
                    );
                    continue;
                }
            };

            let changed = self.state.send_if_modified(|state| {
                if *state == next {
                    false
                } else {
                    *state = next;
                    true
                }
            });
            trace!(store = %self.id, changed, "reducer folded");

            // Events observe the state they describe, so they go out after the fold
            if guarded.is_produced() {
                for event in extract_events::<M>(self.id, &self.extractors, guarded.reducer()) {
                    self.events.send(event);
                }
            }
        }
        debug!(store = %self.id, "fold loop stopped");
    }
}
