//! Navigation as a store plugin.
//!
//! The router is a [`Contract`] that any store can opt into with
//! [`StoreBuilder::with_router`](crate::StoreBuilder::with_router):
//!
//! 1. a [`Navigate`] action names a [`Destination`] and holds the UI's
//!    [`Navigator`] *weakly*
//! 2. the [`RouterPipeline`] turns it into a [`RouterReducer`], which leaves
//!    the state untouched
//! 3. after the fold, [`navigate_on_reduce`] performs the navigation and emits
//!    a [`RouterEvent`]
//!
//! Because the navigator is held weakly, a navigation still queued when the
//! screen goes away never keeps that screen alive. It is skipped instead.
//!
//! A model opts in by implementing the two bridge traits and converting
//! router events into its own event type:
//!
//! ```ignore
//! impl RouteAction for LoginAction {
//!     fn as_navigate(&self) -> Option<&Navigate> {
//!         match self {
//!             LoginAction::Navigate(navigate) => Some(navigate),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! impl RouteReducer for LoginReducer {
//!     fn as_router(&self) -> Option<&RouterReducer> {
//!         match self {
//!             LoginReducer::Route(router) => Some(router),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! impl From<RouterReducer> for LoginReducer { /* LoginReducer::Route */ }
//! impl From<RouterEvent> for LoginEvent { /* LoginEvent::Navigated */ }
//! ```

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::Contract;
use crate::core::Model;
use crate::event::SingleEventReducer;
use crate::middleware::Middleware;
use crate::pipeline::{Pipeline, PipelineContext};
use crate::store::StoreHandle;

/// The UI capability that actually changes screens.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, destination: &Destination) -> Result<()>;
}

/// Where to navigate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Route name understood by the navigator.
    pub route: String,
    /// Route parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Destination {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a route parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Payload of a navigation action.
#[derive(Clone)]
pub struct Navigate {
    navigator: Weak<dyn Navigator>,
    destination: Destination,
}

impl Navigate {
    /// Request navigation through `navigator` without keeping it alive.
    pub fn new<N: Navigator>(navigator: &Arc<N>, destination: Destination) -> Self {
        Self::from_weak(Arc::downgrade(navigator) as Weak<dyn Navigator>, destination)
    }

    pub fn from_weak(navigator: Weak<dyn Navigator>, destination: Destination) -> Self {
        Self {
            navigator,
            destination,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// The navigator, if it is still alive.
    pub fn navigator(&self) -> Option<Arc<dyn Navigator>> {
        self.navigator.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.navigator.strong_count() > 0
    }
}

impl std::fmt::Debug for Navigate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigate")
            .field("destination", &self.destination)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// The reducer produced for a navigation: the state does not change.
#[derive(Debug, Clone)]
pub struct RouterReducer {
    navigate: Navigate,
}

impl RouterReducer {
    /// Identity transition.
    pub fn reduce<S: Clone>(&self, state: &S) -> S {
        state.clone()
    }

    pub fn navigate(&self) -> &Navigate {
        &self.navigate
    }
}

impl From<Navigate> for RouterReducer {
    fn from(navigate: Navigate) -> Self {
        Self { navigate }
    }
}

/// How a navigation attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Completed,
    /// The navigator returned an error.
    Failed(String),
}

/// Emitted after the navigator was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterEvent {
    pub destination: Destination,
    pub outcome: NavigationOutcome,
}

impl RouterEvent {
    pub fn is_completed(&self) -> bool {
        self.outcome == NavigationOutcome::Completed
    }
}

/// Implemented by an action enum that can carry a navigation request.
pub trait RouteAction {
    fn as_navigate(&self) -> Option<&Navigate>;
}

/// Implemented by a reducer enum that can carry a [`RouterReducer`].
pub trait RouteReducer: From<RouterReducer> {
    fn as_router(&self) -> Option<&RouterReducer>;
}

/// Matches navigation actions and produces the identity [`RouterReducer`].
pub struct RouterPipeline<M> {
    _model: PhantomData<fn() -> M>,
}

impl<M> RouterPipeline<M> {
    pub fn new() -> Self {
        Self { _model: PhantomData }
    }
}

impl<M> Default for RouterPipeline<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M> Pipeline<M> for RouterPipeline<M>
where
    M: Model,
    M::Action: RouteAction,
    M::Reducer: RouteReducer,
{
    type Input = Navigate;

    fn select(&self, action: &M::Action) -> Option<Navigate> {
        action.as_navigate().cloned()
    }

    async fn execute(&self, navigate: Navigate, _ctx: PipelineContext<M>) -> Result<Option<M::Reducer>> {
        Ok(Some(M::Reducer::from(RouterReducer::from(navigate))))
    }
}

/// Passes every action through, logging navigation requests.
pub struct RouterMiddleware<M> {
    _model: PhantomData<fn() -> M>,
}

impl<M> RouterMiddleware<M> {
    pub fn new() -> Self {
        Self { _model: PhantomData }
    }
}

impl<M> Default for RouterMiddleware<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M> Middleware<M> for RouterMiddleware<M>
where
    M: Model,
    M::Action: RouteAction,
{
    async fn handle(&self, store: &StoreHandle<M>, action: M::Action) -> M::Action {
        if let Some(navigate) = action.as_navigate() {
            debug!(
                store = %store.id(),
                route = %navigate.destination().route,
                alive = navigate.is_alive(),
                "navigation requested"
            );
        }
        action
    }
}

/// Single-event reducer that performs the navigation carried by a
/// [`RouterReducer`] and reports it as a [`RouterEvent`].
///
/// A navigator that is already gone yields no event.
pub fn navigate_on_reduce<M>() -> SingleEventReducer<M>
where
    M: Model,
    M::Reducer: RouteReducer,
    M::Event: From<RouterEvent>,
{
    Arc::new(|reducer: &M::Reducer| {
        let navigate = reducer.as_router()?.navigate();
        let destination = navigate.destination();

        let Some(navigator) = navigate.navigator() else {
            debug!(route = %destination.route, "navigator dropped, navigation skipped");
            return None;
        };

        let outcome = match navigator.navigate(destination) {
            Ok(()) => {
                debug!(route = %destination.route, "navigation completed");
                NavigationOutcome::Completed
            }
            Err(e) => {
                warn!(route = %destination.route, error = %e, "navigation failed");
                NavigationOutcome::Failed(format!("{e:#}"))
            }
        };

        Some(M::Event::from(RouterEvent {
            destination: destination.clone(),
            outcome,
        }))
    })
}

/// The router plugin: [`RouterPipeline`], [`RouterMiddleware`] and
/// [`navigate_on_reduce`] installed together.
pub struct RouterContract<M> {
    _model: PhantomData<fn() -> M>,
}

impl<M> RouterContract<M> {
    pub fn new() -> Self {
        Self { _model: PhantomData }
    }
}

impl<M> Default for RouterContract<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Contract<M> for RouterContract<M>
where
    M: Model,
    M::Action: RouteAction,
    M::Reducer: RouteReducer,
    M::Event: From<RouterEvent>,
{
    type Pipeline = RouterPipeline<M>;

    fn pipeline(&self) -> RouterPipeline<M> {
        RouterPipeline::new()
    }

    fn middleware(&self) -> Option<Arc<dyn Middleware<M>>> {
        Some(Arc::new(RouterMiddleware::<M>::new()))
    }

    fn single_event_reducer(&self) -> Option<SingleEventReducer<M>> {
        Some(navigate_on_reduce::<M>())
    }
}
