//! Middleware: ordered interceptors between dispatch and the pipelines.
//!
//! Every action passes through every middleware exactly once, in the order
//! they were registered, before any pipeline sees it. A middleware may
//! rewrite the action or await async work, but it always returns an action:
//! the chain transforms, it never filters.
//!
//! ```text
//! dispatch(a) ─► M1.handle(a) ─► M2.handle(a') ─► pipelines see a''
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, trace};

use crate::core::Model;
use crate::error::panic_message;
use crate::store::StoreHandle;

/// An action interceptor.
///
/// # Example
///
/// ```ignore
/// struct TrimCredentials;
///
/// #[async_trait]
/// impl Middleware<LoginModel> for TrimCredentials {
///     async fn handle(&self, _store: &StoreHandle<LoginModel>, action: LoginAction) -> LoginAction {
///         match action {
///             LoginAction::RequestLogin { name, pass } => LoginAction::RequestLogin {
///                 name: name.trim().to_string(),
///                 pass,
///             },
///             other => other,
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware<M: Model>: Send + Sync + 'static {
    /// Transform an action on its way to the pipelines.
    ///
    /// The store handle can read the current state or dispatch follow-up
    /// actions; follow-ups go to the back of the bus.
    async fn handle(&self, store: &StoreHandle<M>, action: M::Action) -> M::Action;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A middleware that returns every action unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl<M: Model> Middleware<M> for PassThrough {
    async fn handle(&self, _store: &StoreHandle<M>, action: M::Action) -> M::Action {
        action
    }
}

/// The registered middlewares of one store, applied in order.
pub(crate) struct MiddlewareChain<M: Model> {
    middlewares: Vec<Arc<dyn Middleware<M>>>,
}

impl<M: Model> MiddlewareChain<M> {
    pub(crate) fn new(middlewares: Vec<Arc<dyn Middleware<M>>>) -> Self {
        Self { middlewares }
    }

    pub(crate) fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Run `action` through every middleware.
    ///
    /// A middleware that panics is skipped: the action it received continues
    /// down the chain unchanged.
    pub(crate) async fn apply(&self, store: &StoreHandle<M>, action: M::Action) -> M::Action {
        let mut action = action;
        for middleware in &self.middlewares {
            let input = action.clone();
            action = match AssertUnwindSafe(middleware.handle(store, action))
                .catch_unwind()
                .await
            {
                Ok(output) => output,
                Err(panic_info) => {
                    error!(
                        store = %store.id(),
                        middleware = middleware.name(),
                        panic = %panic_message(&panic_info),
                        "middleware panicked, passing action through"
                    );
                    input
                }
            };
            trace!(store = %store.id(), middleware = middleware.name(), ?action, "middleware applied");
        }
        action
    }
}

impl<M: Model> std::fmt::Debug for MiddlewareChain<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("middleware_count", &self.middlewares.len())
            .finish()
    }
}
