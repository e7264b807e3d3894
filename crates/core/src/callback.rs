// Feeder event notification
// Events are raised on the consumer's callback thread, so progress updates are throttled

use crate::state::PlayerState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Feeder event types
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Player state changed
    StateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
    },

    /// More data was handed to the consumer
    Progress { bytes_fed: u64 },

    /// A rewind was honoured and the pool re-primed from the start
    Rewound,

    /// A rewind request was dropped because end of stream was already signalled
    RewindSuppressed,

    /// The EOS sentinel was enqueued
    EndOfStream,

    /// The consumer reported the EOS sentinel as processed
    EndOfStreamProcessed,

    /// A fault degraded playback
    Error { message: String },
}

/// Feeder callback trait
/// Implementations run on the consumer's thread and must return quickly
pub trait FeedCallback: Send + Sync {
    fn on_event(&self, event: FeedEvent);
}

/// Throttled callback wrapper
/// Limits the rate of progress events; every other event passes through
pub struct ThrottledCallback {
    inner: Arc<dyn FeedCallback>,
    last_progress: Mutex<Option<Instant>>,
    progress_interval: Duration,
}

impl ThrottledCallback {
    pub fn new(callback: Arc<dyn FeedCallback>, interval_ms: u64) -> Self {
        Self {
            inner: callback,
            last_progress: Mutex::new(None),
            progress_interval: Duration::from_millis(interval_ms),
        }
    }

    pub fn dispatch(&self, event: FeedEvent) {
        if let FeedEvent::Progress { .. } = event {
            let mut last = self.last_progress.lock();
            let due = last.map_or(true, |at| at.elapsed() >= self.progress_interval);
            if !due {
                return;
            }
            *last = Some(Instant::now());
        }
        self.inner.on_event(event);
    }
}

/// Fan-out of feeder events to registered callbacks
pub struct CallbackManager {
    callbacks: Mutex<Vec<Arc<ThrottledCallback>>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn add_callback(&self, callback: Arc<dyn FeedCallback>, throttle_ms: u64) {
        let throttled = Arc::new(ThrottledCallback::new(callback, throttle_ms));
        self.callbacks.lock().push(throttled);
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.lock().clear();
    }

    pub fn dispatch_event(&self, event: FeedEvent) {
        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks.iter() {
            callback.dispatch(event.clone());
        }
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Recording callback for tests
#[derive(Default)]
pub struct TestCallback {
    events: Mutex<Vec<FeedEvent>>,
}

impl TestCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_events(&self) -> Vec<FeedEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &FeedEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}

impl FeedCallback for TestCallback {
    fn on_event(&self, event: FeedEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_progress_is_throttled() {
        let test_callback = Arc::new(TestCallback::new());
        let throttled = ThrottledCallback::new(test_callback.clone(), 100);

        for i in 0..10 {
            throttled.dispatch(FeedEvent::Progress { bytes_fed: i * 1880 });
            thread::sleep(Duration::from_millis(5));
        }

        let events = test_callback.get_events();
        assert!(!events.is_empty());
        assert!(events.len() < 10);
        assert_eq!(events[0], FeedEvent::Progress { bytes_fed: 0 });
    }

    #[test]
    fn test_lifecycle_events_not_throttled() {
        let test_callback = Arc::new(TestCallback::new());
        let manager = CallbackManager::new();
        manager.add_callback(test_callback.clone(), 1000);

        manager.dispatch_event(FeedEvent::EndOfStream);
        manager.dispatch_event(FeedEvent::EndOfStreamProcessed);
        manager.dispatch_event(FeedEvent::StateChanged {
            old_state: PlayerState::Playing,
            new_state: PlayerState::Paused,
        });

        assert_eq!(test_callback.get_events().len(), 3);

        manager.clear_callbacks();
        manager.dispatch_event(FeedEvent::Rewound);
        assert_eq!(test_callback.get_events().len(), 3);
    }
}
