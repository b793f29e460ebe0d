//! View-model integration.
//!
//! A [`ViewModel`] describes how one screen's store is built. A
//! [`ViewModelHost`] owns the view model together with the store it built
//! and destroys the store when the screen is cleared.

use crate::builder::StoreBuilder;
use crate::config::StoreConfig;
use crate::core::Model;
use crate::error::StoreError;
use crate::scope::StoreScope;
use crate::store::Store;

/// The recipe for a screen's store.
///
/// # Example
///
/// ```ignore
/// impl ViewModel for LoginViewModel {
///     type Model = LoginModel;
///
///     fn initial_state(&self) -> LoginState {
///         LoginState::default()
///     }
///
///     fn build_store(&self, builder: StoreBuilder<LoginModel>) -> StoreBuilder<LoginModel> {
///         builder
///             .add_pipeline(LoginPipeline::new(self.repository.clone()))
///             .add_middleware(LoginMiddleware)
///     }
/// }
/// ```
pub trait ViewModel: Send + Sync + 'static {
    type Model: Model;

    /// State the store starts with.
    fn initial_state(&self) -> <Self::Model as Model>::State;

    /// Register the screen's pipelines, middlewares and contracts.
    fn build_store(&self, builder: StoreBuilder<Self::Model>) -> StoreBuilder<Self::Model>;

    /// Scope to run the store in. `None` uses the current runtime.
    fn scope(&self) -> Option<StoreScope> {
        None
    }

    fn config(&self) -> StoreConfig {
        StoreConfig::default()
    }

    /// Build the store this view model describes.
    fn create_store(&self) -> Result<Store<Self::Model>, StoreError> {
        let mut builder = StoreBuilder::new(self.initial_state()).with_config(self.config());
        if let Some(scope) = self.scope() {
            builder = builder.with_scope(scope);
        }
        self.build_store(builder).build()
    }
}

/// A view model bound to its running store.
pub struct ViewModelHost<V: ViewModel> {
    view_model: V,
    store: Store<V::Model>,
}

impl<V: ViewModel> ViewModelHost<V> {
    /// Build the view model's store and bind the two together.
    pub fn new(view_model: V) -> Result<Self, StoreError> {
        let store = view_model.create_store()?;
        Ok(Self { view_model, store })
    }

    pub fn view_model(&self) -> &V {
        &self.view_model
    }

    pub fn store(&self) -> &Store<V::Model> {
        &self.store
    }

    /// The screen is gone: destroy the store.
    pub fn clear(&self) {
        self.store.destroy();
    }
}

impl<V: ViewModel> std::fmt::Debug for ViewModelHost<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewModelHost")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
