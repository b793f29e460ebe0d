//! The action bus: many dispatchers, one action loop.
//!
//! # Guarantees
//!
//! - **Non-blocking**: `dispatch` only enqueues, it never waits for capacity
//! - **Lossless**: every action accepted while the action loop listens reaches it
//! - **Ordered**: actions from one dispatcher arrive in dispatch order
//! - **In-memory only**: Actions are not persisted
//!
//! The store's action loop is the only consumer. It runs the middleware chain
//! once per action and fans the result out to every pipeline, so pipelines
//! never read the bus themselves.

use tokio::sync::mpsc;

use crate::core::Action;

/// Sending half of a store's action queue.
///
/// # Example
///
/// ```ignore
/// let (bus, mut actions) = ActionBus::<LoginAction>::channel();
///
/// bus.dispatch(LoginAction::Logout);
///
/// let action = actions.recv().await;
/// ```
pub struct ActionBus<A> {
    sender: mpsc::UnboundedSender<A>,
}

impl<A: Action> ActionBus<A> {
    /// Create a bus and the receiver its consumer reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<A>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Enqueue an action for the consumer.
    ///
    /// Never blocks. Returns `false` when the consumer is gone and the action
    /// was dropped.
    pub fn dispatch(&self, action: A) -> bool {
        self.sender.send(action).is_ok()
    }

    /// Whether the consumer has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<A> Clone for ActionBus<A> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<A> std::fmt::Debug for ActionBus<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBus")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
