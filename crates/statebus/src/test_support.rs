//! A small counter model shared by the unit tests.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::bus::ActionBus;
use crate::builder::StoreBuilder;
use crate::core::{Model, Reducer, StoreId};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::router::{Navigate, RouteAction, RouteReducer, RouterEvent, RouterReducer};
use crate::store::StoreHandle;

pub struct Counter;

impl Model for Counter {
    type State = CounterState;
    type Action = CounterAction;
    type Reducer = CounterReducer;
    type Event = CounterEvent;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterState {
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Clone)]
pub enum CounterAction {
    Add(i64),
    AddAfter { amount: i64, delay_ms: u64 },
    Set(i64),
    Label(String),
    /// The effect returns an error.
    Fail,
    /// The effect panics.
    Panic,
    /// The produced reducer panics while folding.
    Explode,
    /// Matched, but produces no reducer.
    Ignored,
    Navigate(Navigate),
}

#[derive(Debug)]
pub enum CounterReducer {
    Add(i64),
    Set(i64),
    Label(String),
    Explode,
    Route(RouterReducer),
    Empty,
}

impl Reducer<CounterState> for CounterReducer {
    fn reduce(&self, state: &CounterState) -> CounterState {
        match self {
            CounterReducer::Add(n) => CounterState {
                value: state.value + n,
                ..state.clone()
            },
            CounterReducer::Set(n) => CounterState {
                value: *n,
                ..state.clone()
            },
            CounterReducer::Label(label) => CounterState {
                label: label.clone(),
                ..state.clone()
            },
            CounterReducer::Explode => panic!("reducer exploded"),
            CounterReducer::Route(router) => router.reduce(state),
            CounterReducer::Empty => state.clone(),
        }
    }

    fn empty() -> Self {
        CounterReducer::Empty
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CounterEvent {
    Reached(i64),
    Labeled(String),
    Router(RouterEvent),
}

impl RouteAction for CounterAction {
    fn as_navigate(&self) -> Option<&Navigate> {
        match self {
            CounterAction::Navigate(navigate) => Some(navigate),
            _ => None,
        }
    }
}

impl RouteReducer for CounterReducer {
    fn as_router(&self) -> Option<&RouterReducer> {
        match self {
            CounterReducer::Route(router) => Some(router),
            _ => None,
        }
    }
}

impl From<RouterReducer> for CounterReducer {
    fn from(router: RouterReducer) -> Self {
        CounterReducer::Route(router)
    }
}

impl From<RouterEvent> for CounterEvent {
    fn from(event: RouterEvent) -> Self {
        CounterEvent::Router(event)
    }
}

/// Handles every counter action except navigation.
struct CounterPipeline;

#[async_trait]
impl Pipeline<Counter> for CounterPipeline {
    type Input = CounterAction;

    fn select(&self, action: &CounterAction) -> Option<CounterAction> {
        match action {
            CounterAction::Navigate(_) => None,
            other => Some(other.clone()),
        }
    }

    async fn execute(&self, action: CounterAction, _ctx: PipelineContext<Counter>) -> Result<Option<CounterReducer>> {
        let reducer = match action {
            CounterAction::Add(n) => CounterReducer::Add(n),
            CounterAction::AddAfter { amount, delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                CounterReducer::Add(amount)
            }
            CounterAction::Set(n) => CounterReducer::Set(n),
            CounterAction::Label(label) => CounterReducer::Label(label),
            CounterAction::Fail => anyhow::bail!("counter backend unavailable"),
            CounterAction::Panic => panic!("counter effect panicked"),
            CounterAction::Explode => CounterReducer::Explode,
            CounterAction::Ignored | CounterAction::Navigate(_) => return Ok(None),
        };
        Ok(Some(reducer))
    }
}

/// Register the counter pipeline and its single-event reducer.
pub fn with_counter_pipelines(builder: StoreBuilder<Counter>) -> StoreBuilder<Counter> {
    builder
        .add_pipeline(CounterPipeline)
        .add_single_event_reducer(|reducer: &CounterReducer| match reducer {
            CounterReducer::Set(n) => Some(CounterEvent::Reached(*n)),
            CounterReducer::Label(label) => Some(CounterEvent::Labeled(label.clone())),
            _ => None,
        })
}

/// A builder for the counter store, starting at the default state.
pub fn counter_builder() -> StoreBuilder<Counter> {
    with_counter_pipelines(StoreBuilder::new(CounterState::default()))
}

/// A handle that belongs to no running store.
pub fn detached_handle() -> StoreHandle<Counter> {
    let (_state_tx, state_rx) = watch::channel(CounterState::default());
    let (bus, _actions) = ActionBus::channel();
    StoreHandle::new(
        StoreId::new(),
        bus,
        state_rx,
        Arc::new(AtomicBool::new(false)),
    )
}
