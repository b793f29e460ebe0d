//! # Statebus
//!
//! A unidirectional state store: actions describe what happened, pipelines
//! turn actions into reducers, and reducers fold into exactly one current
//! state.
//!
//! ## Core Concepts
//!
//! - [`Action`] = intent or fact ("the user asked to log in")
//! - [`Reducer`] = a pure description of a state transition
//! - [`State`] = the immutable snapshot every subscriber reads
//! - [`Event`] = a one-shot notification that is never replayed
//!
//! Side effects happen while *producing* a reducer, never while folding it.
//!
//! ## Architecture
//!
//! ```text
//! dispatch(action)
//!     │
//!     ▼
//! ActionBus ──► action loop ──► Middleware 1 ─► Middleware 2 ─► ...
//!                                                      │
//!                      ┌───────────────────────────────┤ select()
//!                      ▼                               ▼
//!              Pipeline A task                 Pipeline B task
//!              (async effect)                  (async effect)
//!                      │                               │
//!                      └──────────► outcomes ◄─────────┘
//!                                      │
//!                                      ▼
//!                               Error guard (failure ─► empty reducer)
//!                                      │
//!                                      ▼
//!                               fold: state[n] = reducer[n].reduce(state[n-1])
//!                                      │
//!                      ┌───────────────┴───────────────┐
//!                      ▼                               ▼
//!              watch (current state)        single-event reducers ─► EventStream
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One current state** - transitions are totally ordered per store
//! 2. **Strictly sequential fold** - a reducer is always applied to the latest state
//! 3. **Contained failures** - a failing pipeline folds the empty reducer, the stream lives on
//! 4. **At-most-once events** - delivered to subscribers present at emission, never replayed
//! 5. **Non-blocking dispatch** - dispatch only enqueues onto the bus
//!
//! ## Example
//!
//! ```ignore
//! use statebus::{pipeline_fn, Model, PipelineContext, Reducer, StoreBuilder};
//!
//! #[derive(Debug, Clone)]
//! enum CounterAction { Add(i64) }
//!
//! enum CounterReducer { Add(i64), Empty }
//!
//! impl Reducer<i64> for CounterReducer {
//!     fn reduce(&self, state: &i64) -> i64 {
//!         match self {
//!             CounterReducer::Add(n) => state + n,
//!             CounterReducer::Empty => *state,
//!         }
//!     }
//!
//!     fn empty() -> Self {
//!         CounterReducer::Empty
//!     }
//! }
//!
//! struct Counter;
//!
//! impl Model for Counter {
//!     type State = i64;
//!     type Action = CounterAction;
//!     type Reducer = CounterReducer;
//!     type Event = ();
//! }
//!
//! let store = StoreBuilder::<Counter>::new(0)
//!     .add_pipeline(pipeline_fn(
//!         |action: &CounterAction| match action {
//!             CounterAction::Add(n) => Some(*n),
//!         },
//!         |n, _ctx: PipelineContext<Counter>| async move { Ok(Some(CounterReducer::Add(n))) },
//!     ))
//!     .build()?;
//!
//! store.dispatch(CounterAction::Add(2));
//! ```

// Core modules
mod builder;
mod bus;
mod config;
mod contract;
mod core;
mod error;
mod event;
mod guard;
mod middleware;
mod pipeline;
mod scope;
mod store;

// Plugins and integration layers
pub mod mvi;
pub mod router;

// Shared fixtures for unit tests (test-only)
#[cfg(test)]
mod test_support;

// Re-export core traits
pub use crate::core::{Action, Event, Model, Reducer, State, StoreId};

// Re-export error types
pub use crate::error::{PipelineError, StoreError};

// Re-export configuration
pub use config::{StoreConfig, DEFAULT_REDUCER_CAPACITY};

// Re-export bus types
pub use bus::ActionBus;

// Re-export middleware types
pub use middleware::{Middleware, PassThrough};

// Re-export pipeline types
pub use pipeline::{pipeline_fn, FnPipeline, OverlapPolicy, Pipeline, PipelineContext};

// Re-export single-event types
pub use event::{EventStream, SingleEventReducer};

// Re-export contract types
pub use contract::Contract;

// Re-export scope types
pub use scope::StoreScope;

// Re-export store types (primary entry point)
pub use builder::StoreBuilder;
pub use store::{Store, StoreHandle};

// Re-export commonly used external types
pub use async_trait::async_trait;
