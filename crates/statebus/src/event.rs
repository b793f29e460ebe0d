//! Single events: one-shot notifications derived from reducers.
//!
//! After the fold applies a pipeline-produced reducer, every registered
//! [`SingleEventReducer`] looks at it and may return an event. This is a tap:
//! it never changes what is folded.
//!
//! # Guarantees
//!
//! - **At-most-once**: each subscriber present at emission sees an event once
//! - **No replay**: subscribers attached later never see it
//! - **Emission order**: events arrive in the order reducers were folded
//! - **Lossless**: a subscriber that reads late still gets every event emitted
//!   while it was subscribed
//! - **Closable**: after the store is destroyed, streams end and sends are dropped

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::core::{Event, Model, StoreId};
use crate::error::panic_message;

/// Derives an optional one-shot event from a folded reducer.
///
/// ```ignore
/// let to_event: SingleEventReducer<LoginModel> = Arc::new(|reducer: &LoginReducer| match reducer {
///     LoginReducer::Success { .. } => Some(LoginEvent::Success),
///     LoginReducer::Failure { message } => Some(LoginEvent::Failure(message.clone())),
///     _ => None,
/// });
/// ```
pub type SingleEventReducer<M> =
    Arc<dyn Fn(&<M as Model>::Reducer) -> Option<<M as Model>::Event> + Send + Sync>;

/// Run every single-event reducer against `reducer`, in registration order.
///
/// A single-event reducer that panics is logged and produces no event.
pub(crate) fn extract_events<M: Model>(
    store: StoreId,
    extractors: &[SingleEventReducer<M>],
    reducer: &M::Reducer,
) -> Vec<M::Event> {
    extractors
        .iter()
        .filter_map(|extract| {
            match catch_unwind(AssertUnwindSafe(|| extract(reducer))) {
                Ok(event) => event,
                Err(panic_info) => {
                    error!(
                        store = %store,
                        panic = %panic_message(&panic_info),
                        "single-event reducer panicked"
                    );
                    None
                }
            }
        })
        .collect()
}

/// The store's event channel.
///
/// Every subscriber owns an unbounded queue registered at subscribe time, so
/// a slow reader falls behind without losing events and never holds up the
/// fold.
pub(crate) struct EventChannel<E> {
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<E>>>>,
    closed: Arc<AtomicBool>,
}

impl<E: Event> EventChannel<E> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Some(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver `event` to current subscribers. Dropped after close or when
    /// nobody is listening.
    pub(crate) fn send(&self, event: E) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        let Some(subscribers) = subscribers.as_mut() else {
            trace!("event channel closed, event dropped");
            return;
        };
        // Streams that were dropped are pruned here
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            trace!("no event subscribers, event dropped");
        }
    }

    pub(crate) fn subscribe(&self) -> EventStream<E> {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        match subscribers.as_mut() {
            Some(subscribers) => {
                let (sender, receiver) = mpsc::unbounded_channel();
                subscribers.push(sender);
                EventStream::new(receiver, self.closed.clone())
            }
            None => EventStream::closed(),
        }
    }

    /// Close the channel. Idempotent.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the senders wakes every pending receiver
        self.subscribers.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map_or(0, Vec::len)
    }
}

/// A subscription to a store's single events.
///
/// Ends when the store is destroyed. Use it as a [`Stream`] or call
/// [`recv`](Self::recv).
pub struct EventStream<E> {
    inner: BoxStream<'static, E>,
}

impl<E: Event> EventStream<E> {
    fn new(receiver: mpsc::UnboundedReceiver<E>, closed: Arc<AtomicBool>) -> Self {
        let inner = stream::unfold((receiver, closed), |(mut receiver, closed)| async move {
            if closed.load(Ordering::Acquire) {
                return None;
            }
            let event = receiver.recv().await?;
            // Buffered events are discarded once the store is gone
            if closed.load(Ordering::Acquire) {
                return None;
            }
            Some((event, (receiver, closed)))
        });
        Self {
            inner: inner.boxed(),
        }
    }

    fn closed() -> Self {
        Self {
            inner: stream::empty().boxed(),
        }
    }

    /// Wait for the next event. Returns `None` once the store is destroyed.
    pub async fn recv(&mut self) -> Option<E> {
        self.inner.next().await
    }
}

impl<E> Stream for EventStream<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<E> std::fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Counter, CounterEvent, CounterReducer};
    use std::time::Duration;
    use tokio::time::timeout;

    fn milestone_extractor() -> SingleEventReducer<Counter> {
        Arc::new(|reducer: &CounterReducer| match reducer {
            CounterReducer::Set(n) => Some(CounterEvent::Reached(*n)),
            _ => None,
        })
    }

    #[test]
    fn test_extractors_run_in_order() {
        let label: SingleEventReducer<Counter> = Arc::new(|reducer: &CounterReducer| match reducer {
            CounterReducer::Set(n) => Some(CounterEvent::Labeled(format!("set {n}"))),
            _ => None,
        });
        let extractors = vec![milestone_extractor(), label];

        let events = extract_events::<Counter>(StoreId::new(), &extractors, &CounterReducer::Set(3));
        assert_eq!(
            events,
            vec![CounterEvent::Reached(3), CounterEvent::Labeled("set 3".into())]
        );

        let none = extract_events::<Counter>(StoreId::new(), &extractors, &CounterReducer::Add(1));
        assert!(none.is_empty());
    }

    #[test]
    fn test_panicking_extractor_is_contained() {
        let exploding: SingleEventReducer<Counter> = Arc::new(|_: &CounterReducer| panic!("bad extractor"));
        let extractors = vec![exploding, milestone_extractor()];

        let events = extract_events::<Counter>(StoreId::new(), &extractors, &CounterReducer::Set(1));
        assert_eq!(events, vec![CounterEvent::Reached(1)]);
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let channel = EventChannel::new();
        let mut events = channel.subscribe();

        channel.send(CounterEvent::Reached(1));
        channel.send(CounterEvent::Reached(2));

        assert_eq!(events.recv().await, Some(CounterEvent::Reached(1)));
        assert_eq!(events.recv().await, Some(CounterEvent::Reached(2)));
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_replay() {
        let channel = EventChannel::new();
        let mut early = channel.subscribe();

        channel.send(CounterEvent::Reached(1));
        let mut late = channel.subscribe();

        assert_eq!(early.recv().await, Some(CounterEvent::Reached(1)));
        let nothing = timeout(Duration::from_millis(50), late.recv()).await;
        assert!(nothing.is_err(), "late subscriber must not see earlier events");
    }

    #[tokio::test]
    async fn test_close_ends_streams_and_drops_sends() {
        let channel = EventChannel::new();
        let mut events = channel.subscribe();

        channel.send(CounterEvent::Reached(1));
        channel.close();
        channel.close();
        channel.send(CounterEvent::Reached(2));

        assert!(channel.is_closed());
        assert_eq!(events.recv().await, None);
        assert_eq!(channel.subscribe().recv().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receiver() {
        let channel = Arc::new(EventChannel::<CounterEvent>::new());
        let mut events = channel.subscribe();

        let waiter = tokio::spawn(async move { events.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.close();

        let received = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(received, None);
    }

    #[tokio::test]
    async fn test_stream_impl() {
        let channel = EventChannel::new();
        let events = channel.subscribe();

        channel.send(CounterEvent::Reached(1));
        channel.send(CounterEvent::Reached(2));
        channel.close();

        // closing discards what was still buffered
        let collected: Vec<_> = events.collect().await;
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn test_late_reader_receives_every_event() {
        let channel = EventChannel::new();
        let mut events = channel.subscribe();

        // far more than any subscriber would read between sends
        for n in 0..5_000 {
            channel.send(CounterEvent::Reached(n));
        }

        for n in 0..5_000 {
            assert_eq!(events.recv().await, Some(CounterEvent::Reached(n)));
        }
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let channel = EventChannel::new();
        let mut kept = channel.subscribe();
        let dropped = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        drop(dropped);
        channel.send(CounterEvent::Reached(1));

        assert_eq!(channel.subscriber_count(), 1);
        assert_eq!(kept.recv().await, Some(CounterEvent::Reached(1)));
    }
}
