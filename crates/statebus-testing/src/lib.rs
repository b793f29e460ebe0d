//! Testing utilities for statebus stores.
//!
//! # Quick Start
//!
//! ## Waiting for a state
//!
//! ```ignore
//! use statebus_testing::wait_for_state;
//!
//! store.dispatch(LoginAction::RequestLogin { name: "admin".into(), pass: "admin".into() });
//!
//! let state = wait_for_state(&store, |s| s.token.is_some(), Duration::from_secs(2)).await?;
//! assert_eq!(state.name.as_deref(), Some("admin"));
//! ```
//!
//! ## Recording every published state
//!
//! ```ignore
//! let recorder = StateRecorder::start(&store);
//! store.dispatch(LoginAction::Logout);
//! recorder.wait_for(|s| s.token.is_none(), Duration::from_secs(1)).await?;
//! assert!(recorder.states().len() >= 1);
//! ```
//!
//! ## Scripting a pipeline
//!
//! ```ignore
//! let pipeline = ScriptedPipeline::<LoginModel>::new(|a| matches!(a, LoginAction::RequestLogin { .. }))
//!     .then_error("backend down")
//!     .then_reducer(LoginReducer::Success { name: "admin".into(), token: "t".into() });
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use statebus::{Event, Middleware, Model, Pipeline, PipelineContext, State, Store, StoreHandle};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Wait until the store's state satisfies `predicate`, returning that state.
///
/// Checks the current state first, so a state reached before the call is
/// still found.
pub async fn wait_for_state<M, F>(store: &Store<M>, predicate: F, timeout: Duration) -> Result<M::State>
where
    M: Model,
    F: Fn(&M::State) -> bool,
{
    let mut receiver = store.watch_state();
    let result = match tokio::time::timeout(timeout, receiver.wait_for(|s| predicate(s))).await {
        Ok(Ok(state)) => Ok(state.clone()),
        Ok(Err(_)) => anyhow::bail!("store {} was destroyed before the state matched", store.id()),
        Err(_) => anyhow::bail!("timed out after {timeout:?} waiting for state"),
    };
    result
}

/// Shared buffer filled by a background task and awaited by tests.
struct Recording<T> {
    items: Mutex<Vec<T>>,
    notify: Notify,
}

impl<T: Clone> Recording<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    fn push(&self, item: T) {
        lock(&self.items).push(item);
        self.notify.notify_waiters();
    }

    fn snapshot(&self) -> Vec<T> {
        lock(&self.items).clone()
    }

    async fn wait_until<F>(&self, mut done: F, timeout: Duration) -> Result<Vec<T>>
    where
        F: FnMut(&[T]) -> bool,
    {
        let wait = async {
            loop {
                // Register before checking so a push in between is not missed
                let notified = self.notify.notified();
                {
                    let items = lock(&self.items);
                    if done(&items) {
                        return items.clone();
                    }
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {timeout:?}"))
    }
}

/// Records every state a store publishes, starting with the current one.
///
/// Fast consecutive transitions may be conflated into their latest value.
pub struct StateRecorder<S> {
    recording: Arc<Recording<S>>,
    task: JoinHandle<()>,
}

impl<S: State> StateRecorder<S> {
    /// Start recording `store`'s states on the current runtime.
    pub fn start<M: Model<State = S>>(store: &Store<M>) -> Self {
        let recording = Recording::new();
        let mut states = store.state_stream();
        let sink = recording.clone();
        let task = tokio::spawn(async move {
            while let Some(state) = states.next().await {
                sink.push(state);
            }
        });
        Self { recording, task }
    }

    /// Every state recorded so far.
    pub fn states(&self) -> Vec<S> {
        self.recording.snapshot()
    }

    /// The most recently recorded state.
    pub fn last(&self) -> Option<S> {
        self.recording.snapshot().pop()
    }

    /// Wait until a recorded state satisfies `predicate` and return it.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Result<S>
    where
        F: Fn(&S) -> bool,
    {
        let states = self
            .recording
            .wait_until(|states| states.iter().any(&predicate), timeout)
            .await?;
        states
            .into_iter()
            .find(|s| predicate(s))
            .ok_or_else(|| anyhow::anyhow!("matching state disappeared"))
    }
}

impl<S> Drop for StateRecorder<S> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Collects every single event a store emits after the collector starts.
pub struct EventCollector<E> {
    recording: Arc<Recording<E>>,
    task: JoinHandle<()>,
}

impl<E: Event> EventCollector<E> {
    pub fn start<M: Model<Event = E>>(store: &Store<M>) -> Self {
        let recording = Recording::new();
        let mut events = store.single_event();
        let sink = recording.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                sink.push(event);
            }
        });
        Self { recording, task }
    }

    pub fn events(&self) -> Vec<E> {
        self.recording.snapshot()
    }

    /// Wait until at least `count` events arrived and return all of them.
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> Result<Vec<E>> {
        self.recording
            .wait_until(|events| events.len() >= count, timeout)
            .await
    }

    /// Whether the collection task has ended, which happens when the store is destroyed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<E> Drop for EventCollector<E> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A countdown that tests can await instead of sleeping.
///
/// ```ignore
/// let latch = shared_latch(2);
/// let store = builder
///     .add_single_event_reducer({
///         let latch = latch.clone();
///         move |r| { latch.dec(); None }
///     })
///     .build()?;
///
/// store.dispatch(a);
/// store.dispatch(b);
/// latch.await_zero().await;
/// ```
#[derive(Debug)]
pub struct EventLatch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl EventLatch {
    /// Create a latch expecting `expected` decrements.
    pub fn new(expected: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(expected),
            notify: Notify::new(),
        }
    }

    /// Decrement the remaining count, waking waiters when it reaches zero.
    ///
    /// # Panics
    ///
    /// Panics if called more times than expected.
    pub fn dec(&self) {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            panic!("EventLatch decremented below zero - more events than expected");
        }
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Wait for the count to reach zero. Returns immediately if it already has.
    pub async fn await_zero(&self) {
        loop {
            let notified = self.notify.notified();
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

/// Arc-wrapped [`EventLatch`] for sharing across closures.
pub type SharedEventLatch = Arc<EventLatch>;

/// Convenience for `Arc::new(EventLatch::new(expected))`.
pub fn shared_latch(expected: usize) -> SharedEventLatch {
    Arc::new(EventLatch::new(expected))
}

/// A pass-through middleware that remembers every action it saw.
pub struct RecordingMiddleware<M: Model> {
    actions: Arc<Mutex<Vec<M::Action>>>,
}

impl<M: Model> RecordingMiddleware<M> {
    pub fn new() -> Self {
        Self {
            actions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Actions seen so far, in the order they passed through.
    pub fn actions(&self) -> Vec<M::Action> {
        lock(&self.actions).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.actions).len()
    }
}

impl<M: Model> Default for RecordingMiddleware<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Clone for RecordingMiddleware<M> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
        }
    }
}

#[async_trait]
impl<M: Model> Middleware<M> for RecordingMiddleware<M> {
    async fn handle(&self, _store: &StoreHandle<M>, action: M::Action) -> M::Action {
        lock(&self.actions).push(action.clone());
        action
    }
}

enum Step<R> {
    Reducer(R),
    Error(String),
    Unchanged,
}

/// A pipeline that answers matching actions from a script.
///
/// Each invocation takes the next step; an exhausted script produces no
/// state change.
pub struct ScriptedPipeline<M: Model> {
    matches: Box<dyn Fn(&M::Action) -> bool + Send + Sync>,
    script: Mutex<VecDeque<Step<M::Reducer>>>,
    delay: Option<Duration>,
    invocations: Arc<AtomicUsize>,
}

impl<M: Model> ScriptedPipeline<M> {
    pub fn new<F>(matches: F) -> Self
    where
        F: Fn(&M::Action) -> bool + Send + Sync + 'static,
    {
        Self {
            matches: Box::new(matches),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then_reducer(self, reducer: M::Reducer) -> Self {
        self.push(Step::Reducer(reducer))
    }

    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.push(Step::Error(message.into()))
    }

    pub fn then_unchanged(self) -> Self {
        self.push(Step::Unchanged)
    }

    /// Sleep before answering each invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of started invocations; stays valid after the
    /// pipeline moves into a store.
    pub fn invocations(&self) -> Arc<AtomicUsize> {
        self.invocations.clone()
    }

    fn push(self, step: Step<M::Reducer>) -> Self {
        lock(&self.script).push_back(step);
        self
    }
}

#[async_trait]
impl<M: Model> Pipeline<M> for ScriptedPipeline<M> {
    type Input = ();

    fn select(&self, action: &M::Action) -> Option<()> {
        (self.matches)(action).then_some(())
    }

    async fn execute(&self, _input: (), _ctx: PipelineContext<M>) -> Result<Option<M::Reducer>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let step = lock(&self.script).pop_front();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match step {
            Some(Step::Reducer(reducer)) => Ok(Some(reducer)),
            Some(Step::Error(message)) => Err(anyhow::anyhow!(message)),
            Some(Step::Unchanged) | None => Ok(None),
        }
    }
}
