//! Store construction.
//!
//! Registrations are kept in order: middlewares run in the order they were
//! added, and single-event reducers see each reducer in the order they were
//! added. Contracts are flattened into their parts at install time.

use std::sync::Arc;

use tracing::debug;

use crate::config::StoreConfig;
use crate::contract::Contract;
use crate::core::Model;
use crate::error::StoreError;
use crate::event::SingleEventReducer;
use crate::middleware::Middleware;
use crate::pipeline::{OverlapPolicy, Pipeline, PipelineRunner};
use crate::router::{RouteAction, RouteReducer, RouterContract, RouterEvent};
use crate::scope::StoreScope;
use crate::store::{Store, StoreParts};

/// Builder for a [`Store`].
///
/// # Example
///
/// ```ignore
/// let store = StoreBuilder::<LoginModel>::new(LoginState::default())
///     .add_pipeline(LoginPipeline::new(repository))
///     .add_pipeline(logout_pipeline())
///     .add_single_event_reducer(login_events)
///     .add_middleware(LoginMiddleware)
///     .with_router()
///     .build()?;
/// ```
pub struct StoreBuilder<M: Model> {
    initial: M::State,
    config: StoreConfig,
    scope: Option<StoreScope>,
    middlewares: Vec<Arc<dyn Middleware<M>>>,
    pipelines: Vec<PipelineRunner<M>>,
    extractors: Vec<SingleEventReducer<M>>,
    router_installed: bool,
}

impl<M: Model> StoreBuilder<M> {
    /// Start a builder with the store's initial state.
    pub fn new(initial: M::State) -> Self {
        Self {
            initial,
            config: StoreConfig::default(),
            scope: None,
            middlewares: Vec::new(),
            pipelines: Vec::new(),
            extractors: Vec::new(),
            router_installed: false,
        }
    }

    /// Register a pipeline with the default [`OverlapPolicy::Concurrent`].
    pub fn add_pipeline<P: Pipeline<M>>(self, pipeline: P) -> Self {
        self.add_pipeline_with_policy(pipeline, OverlapPolicy::Concurrent)
    }

    /// Register a pipeline with an explicit overlap policy.
    pub fn add_pipeline_with_policy<P: Pipeline<M>>(mut self, pipeline: P, policy: OverlapPolicy) -> Self {
        self.pipelines.push(PipelineRunner::new(pipeline, policy));
        self
    }

    /// Register several pipelines of one type.
    pub fn add_pipelines<P, I>(self, pipelines: I) -> Self
    where
        P: Pipeline<M>,
        I: IntoIterator<Item = P>,
    {
        pipelines
            .into_iter()
            .fold(self, |builder, pipeline| builder.add_pipeline(pipeline))
    }

    /// Register a single-event reducer.
    pub fn add_single_event_reducer<F>(mut self, extract: F) -> Self
    where
        F: Fn(&M::Reducer) -> Option<M::Event> + Send + Sync + 'static,
    {
        self.extractors.push(Arc::new(extract));
        self
    }

    /// Register several single-event reducers, keeping their order.
    pub fn add_single_event_reducers<I>(mut self, extractors: I) -> Self
    where
        I: IntoIterator<Item = SingleEventReducer<M>>,
    {
        self.extractors.extend(extractors);
        self
    }

    /// Append a middleware to the chain.
    pub fn add_middleware<W: Middleware<M>>(mut self, middleware: W) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append several middlewares to the chain, in iteration order.
    pub fn add_middlewares<I>(mut self, middlewares: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware<M>>>,
    {
        self.middlewares.extend(middlewares);
        self
    }

    /// Install a contract: its pipeline, then its middleware and
    /// single-event reducer if it has them.
    pub fn add_contract<C: Contract<M>>(mut self, contract: C) -> Self {
        debug!(contract = contract.name(), "installing contract");
        self = self.add_pipeline_with_policy(contract.pipeline(), contract.overlap_policy());
        if let Some(middleware) = contract.middleware() {
            self.middlewares.push(middleware);
        }
        if let Some(extract) = contract.single_event_reducer() {
            self.extractors.push(extract);
        }
        self
    }

    /// Install the [`RouterContract`]. Installing it twice is a no-op.
    pub fn with_router(mut self) -> Self
    where
        M::Action: RouteAction,
        M::Reducer: RouteReducer,
        M::Event: From<RouterEvent>,
    {
        if self.router_installed {
            debug!("router already installed");
            return self;
        }
        self.router_installed = true;
        self.add_contract(RouterContract::<M>::new())
    }

    /// Replace the default configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the store's tasks in `scope` instead of a fresh scope on the
    /// current runtime.
    pub fn with_scope(mut self, scope: StoreScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Validate the configuration and start the store.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidConfig`] if the reducer queue capacity is zero
    /// - [`StoreError::NoRuntime`] if no scope was given and no tokio runtime is running
    /// - [`StoreError::ScopeCancelled`] if the given scope was already cancelled
    pub fn build(self) -> Result<Store<M>, StoreError> {
        self.config.validate()?;
        let scope = match self.scope {
            Some(scope) => scope,
            None => StoreScope::current()?,
        };

        Store::launch(StoreParts {
            initial: self.initial,
            config: self.config,
            scope,
            middlewares: self.middlewares,
            pipelines: self.pipelines,
            extractors: self.extractors,
        })
    }
}

impl<M: Model> std::fmt::Debug for StoreBuilder<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("config", &self.config)
            .field("pipelines", &self.pipelines.len())
            .field("middlewares", &self.middlewares.len())
            .field("single_event_reducers", &self.extractors.len())
            .field("router", &self.router_installed)
            .finish_non_exhaustive()
    }
}
