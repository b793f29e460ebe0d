//! Core traits for the values that flow through a store.
//!
//! A store is parameterised by a single [`Model`], which names the four
//! value types of one feature: its state, the actions it accepts, the
//! reducers its pipelines produce, and the one-shot events it emits.

use std::fmt;

use uuid::Uuid;

/// Something that happened: a user intent, a system signal, a navigation request.
///
/// Actions are immutable and carry no identity beyond their variant and
/// payload. Model them as an enum and match on variants in
/// [`Pipeline::select`](crate::Pipeline::select).
///
/// This trait is auto-implemented for any type that satisfies the bounds.
pub trait Action: Clone + fmt::Debug + Send + Sync + 'static {}

// Blanket implementation for any type that meets the requirements
impl<T: Clone + fmt::Debug + Send + Sync + 'static> Action for T {}

/// The immutable snapshot of a feature.
///
/// `PartialEq` lets the store skip publishing a transition that left the
/// state unchanged.
pub trait State: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> State for T {}

/// A one-shot notification (toast, navigation confirmation).
///
/// Events are not part of state and are never replayed to late subscribers.
pub trait Event: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Event for T {}

/// A pure description of how to turn one state into the next.
///
/// Reducers must be side-effect free: all IO happens in the pipeline that
/// produces the reducer, before it reaches the fold.
///
/// # Example
///
/// ```ignore
/// enum LoginReducer {
///     Success { name: String, token: String },
///     Logout,
///     Empty,
/// }
///
/// impl Reducer<LoginState> for LoginReducer {
///     fn reduce(&self, state: &LoginState) -> LoginState {
///         match self {
///             LoginReducer::Success { name, token } => LoginState {
///                 name: Some(name.clone()),
///                 token: Some(token.clone()),
///             },
///             LoginReducer::Logout => LoginState::default(),
///             LoginReducer::Empty => state.clone(),
///         }
///     }
///
///     fn empty() -> Self {
///         LoginReducer::Empty
///     }
/// }
/// ```
pub trait Reducer<S>: Send + 'static {
    /// Produce the next state from the current one.
    fn reduce(&self, state: &S) -> S;

    /// The identity reducer.
    ///
    /// The store folds this in place of any pipeline invocation that failed,
    /// so `empty().reduce(s)` must equal `s`.
    fn empty() -> Self
    where
        Self: Sized;
}

/// The type bundle for one feature's store.
///
/// `Model` is a marker: implement it on a unit struct and point the
/// associated types at the feature's enums.
///
/// ```ignore
/// struct LoginModel;
///
/// impl Model for LoginModel {
///     type State = LoginState;
///     type Action = LoginAction;
///     type Reducer = LoginReducer;
///     type Event = LoginEvent;
/// }
/// ```
pub trait Model: Send + Sync + 'static {
    /// The snapshot type held as the store's current state.
    type State: State;

    /// The action enum accepted by `dispatch`.
    type Action: Action;

    /// The reducer enum produced by pipelines.
    type Reducer: Reducer<Self::State>;

    /// The one-shot event enum emitted by single-event reducers.
    type Event: Event;
}

/// Unique identifier of a store instance, attached to every log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(Uuid);

impl StoreId {
    /// Create a new random store ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value.
    pub fn into_inner(self) -> Uuid {
        self.0
    }

    /// Get a reference to the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for StoreId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
