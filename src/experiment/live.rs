//! Live update and status fan-out.
//!
//! Every subscriber gets its own unbounded queue, so emitting never blocks the loop and
//! never drops or coalesces items: each subscriber sees every update and every status
//! event of the scan, in the order they were emitted.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::trace;

use crate::data::{BackgroundFrame, Channel, StepIndex};
use crate::experiment::messages::StatusEvent;

/// Per-step result for live display and temporary storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    /// Linear step within the average
    pub step: usize,
    /// Average index
    pub average: usize,
    /// Grid location
    pub index: StepIndex,
    /// Selected channels with low enough dimensionality for live display
    pub data: Vec<Channel>,
    /// Reference frame, on capture steps only
    pub background: Option<BackgroundFrame>,
}

/// Ordered multi-subscriber dispatch.
///
/// Once closed, every existing receiver ends after draining and later subscribers get a
/// receiver that is already finished.
#[derive(Debug)]
pub struct Fanout<T> {
    inner: Mutex<FanoutState<T>>,
}

#[derive(Debug)]
struct FanoutState<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    closed: bool,
}

/// Fan-out of per-step [`LiveUpdate`]s
pub type LiveEmitter = Fanout<LiveUpdate>;

/// Fan-out of engine [`StatusEvent`]s
pub type StatusEmitter = Fanout<StatusEvent>;

impl<T> Default for Fanout<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(FanoutState {
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }
}

impl<T: Clone> Fanout<T> {
    /// Emitter without subscribers
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FanoutState<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a subscriber. It receives every item emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        if !state.closed {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Deliver `item` to every live subscriber, returning how many received it.
    ///
    /// Subscribers whose receiver was dropped are forgotten.
    pub fn emit(&self, item: T) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|tx| tx.send(item.clone()).is_ok());
        trace!(subscribers = state.subscribers.len(), "Fan-out delivered");
        state.subscribers.len()
    }

    /// Close every subscription; receivers end once drained.
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.subscribers.clear();
    }

    /// Whether [`Fanout::close`] was called
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(step: usize) -> LiveUpdate {
        LiveUpdate {
            step,
            average: 0,
            index: StepIndex::new(vec![step]),
            data: Vec::new(),
            background: None,
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_every_update_in_order() {
        let emitter = LiveEmitter::new();
        let mut a = emitter.subscribe();
        let mut b = emitter.subscribe();
        for step in 0..100 {
            assert_eq!(emitter.emit(update(step)), 2);
        }
        emitter.close();

        for rx in [&mut a, &mut b] {
            let mut steps = Vec::new();
            while let Some(u) = rx.recv().await {
                steps.push(u.step);
            }
            assert_eq!(steps, (0..100).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_forgotten() {
        let emitter = LiveEmitter::new();
        let rx = emitter.subscribe();
        let _keep = emitter.subscribe();
        drop(rx);
        assert_eq!(emitter.emit(update(0)), 1);
        assert_eq!(emitter.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_after_close_ends_immediately() {
        let emitter = LiveEmitter::new();
        emitter.emit(update(0));
        emitter.close();

        let mut late = emitter.subscribe();
        assert!(emitter.is_closed());
        assert_eq!(emitter.subscriber_count(), 0);
        assert!(late.recv().await.is_none());
        assert_eq!(emitter.emit(update(1)), 0);
    }
}
