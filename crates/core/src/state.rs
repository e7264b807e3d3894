// Shared stream state and player lifecycle state

use crate::error::{FeedError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::sync::Arc;

/// Player lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No session exists
    Idle,
    /// Buffers are queued, consumer is paused
    Paused,
    /// Consumer is playing
    Playing,
    /// Playback was aborted after an unrecoverable source fault
    Error,
}

/// Play state forwarded to the playback consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Paused,
    Playing,
}

impl From<bool> for PlayState {
    fn from(playing: bool) -> Self {
        if playing {
            PlayState::Playing
        } else {
            PlayState::Paused
        }
    }
}

/// Thread-safe player state container
#[derive(Clone)]
pub struct PlayerStateContainer {
    state: Arc<RwLock<PlayerState>>,
}

impl PlayerStateContainer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PlayerState::Idle)),
        }
    }

    pub fn get_state(&self) -> PlayerState {
        *self.state.read()
    }

    /// Move to `to`, returning the previous state.
    pub fn transition(&self, to: PlayerState) -> Result<PlayerState> {
        let mut state = self.state.write();
        let from = *state;
        Self::validate_state_transition(from, to)?;
        *state = to;
        log::debug!("Player state changed: {:?} -> {:?}", from, to);
        Ok(from)
    }

    pub fn validate_state_transition(from: PlayerState, to: PlayerState) -> Result<()> {
        match (from, to) {
            (PlayerState::Idle, PlayerState::Paused) => Ok(()),

            (PlayerState::Paused, PlayerState::Playing) => Ok(()),
            (PlayerState::Playing, PlayerState::Paused) => Ok(()),
            // Re-issuing the current play state is allowed
            (PlayerState::Paused, PlayerState::Paused) => Ok(()),
            (PlayerState::Playing, PlayerState::Playing) => Ok(()),

            (PlayerState::Paused, PlayerState::Error) => Ok(()),
            (PlayerState::Playing, PlayerState::Error) => Ok(()),

            // Shutdown is always allowed
            (_, PlayerState::Idle) => Ok(()),

            _ => Err(FeedError::InvalidState(format!(
                "Invalid state transition from {:?} to {:?}",
                from, to
            ))),
        }
    }
}

impl Default for PlayerStateContainer {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-thread flags coordinating the control thread and the consumer's
/// callback thread. Only reachable through [`StreamState::lock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    /// The EOS sentinel has been enqueued; no further reads or rewinds
    pub reached_end_of_stream: bool,
    /// A rewind was requested and not yet observed by the callback
    pub discontinuity_requested: bool,
}

/// Everything guarded by the stream mutex: the flags plus the resources
/// that may only be touched while holding it (source handle, buffer pool).
pub struct Guarded<T> {
    pub flags: StreamFlags,
    pub resources: T,
}

/// Mutex/condition-variable rendezvous between the control thread and the
/// callback thread.
///
/// The condition is signalled whenever `discontinuity_requested` goes back
/// to false or end of stream is reached.
pub struct StreamState<T> {
    guarded: Mutex<Guarded<T>>,
    discontinuity_cleared: Condvar,
}

impl<T> StreamState<T> {
    pub fn new(resources: T) -> Self {
        Self {
            guarded: Mutex::new(Guarded {
                flags: StreamFlags::default(),
                resources,
            }),
            discontinuity_cleared: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Guarded<T>> {
        self.guarded.lock()
    }

    pub fn flags(&self) -> StreamFlags {
        self.guarded.lock().flags
    }

    /// Raise a discontinuity request and block until the callback thread
    /// has acknowledged it or end of stream makes it moot.
    ///
    /// Returns immediately when end of stream was already reached. A request
    /// overtaken by end of stream is cleared here before returning, so the
    /// flag is always false on return.
    ///
    /// Only a subsequent callback invocation can release the wait: if the
    /// consumer never calls back again this blocks forever.
    pub fn request_discontinuity(&self) {
        let mut guarded = self.guarded.lock();
        if guarded.flags.reached_end_of_stream {
            log::info!("Discontinuity ignored: end of stream already reached");
            return;
        }
        guarded.flags.discontinuity_requested = true;
        while guarded.flags.discontinuity_requested && !guarded.flags.reached_end_of_stream {
            self.discontinuity_cleared.wait(&mut guarded);
        }
        if guarded.flags.discontinuity_requested {
            log::info!("Discontinuity overtaken by end of stream");
            guarded.flags.discontinuity_requested = false;
        }
    }

    /// Clear a pending request and wake the waiter. The caller must hold
    /// the lock, which the `&mut Guarded` borrow enforces.
    pub fn acknowledge_discontinuity(&self, guarded: &mut Guarded<T>) {
        guarded.flags.discontinuity_requested = false;
        self.discontinuity_cleared.notify_all();
    }

    /// Mark end of stream and wake a waiter whose request can no longer
    /// be honoured.
    pub fn mark_end_of_stream(&self, guarded: &mut Guarded<T>) {
        guarded.flags.reached_end_of_stream = true;
        self.discontinuity_cleared.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn wait_for_request(state: &StreamState<u32>) {
        while !state.flags().discontinuity_requested {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_request_waits_for_acknowledgement() {
        let state = Arc::new(StreamState::new(0u32));
        let waiter = {
            let state = state.clone();
            thread::spawn(move || state.request_discontinuity())
        };

        wait_for_request(&state);
        {
            let mut guarded = state.lock();
            guarded.resources += 1;
            state.acknowledge_discontinuity(&mut guarded);
        }
        waiter.join().unwrap();

        let flags = state.flags();
        assert!(!flags.discontinuity_requested);
        assert!(!flags.reached_end_of_stream);
        assert_eq!(state.lock().resources, 1);
    }

    #[test]
    fn test_end_of_stream_releases_waiter() {
        let state = Arc::new(StreamState::new(0u32));
        let waiter = {
            let state = state.clone();
            thread::spawn(move || state.request_discontinuity())
        };

        wait_for_request(&state);
        {
            let mut guarded = state.lock();
            state.mark_end_of_stream(&mut guarded);
        }
        waiter.join().unwrap();

        let flags = state.flags();
        assert!(flags.reached_end_of_stream);
        assert!(!flags.discontinuity_requested);
    }

    #[test]
    fn test_request_after_end_of_stream_is_noop() {
        let state = StreamState::new(());
        {
            let mut guarded = state.lock();
            state.mark_end_of_stream(&mut guarded);
        }
        state.request_discontinuity();
        assert!(!state.flags().discontinuity_requested);
    }

    #[test]
    fn test_player_state_transitions() {
        let container = PlayerStateContainer::new();
        assert_eq!(container.get_state(), PlayerState::Idle);
        assert!(container.transition(PlayerState::Playing).is_err());

        assert_eq!(container.transition(PlayerState::Paused).unwrap(), PlayerState::Idle);
        container.transition(PlayerState::Playing).unwrap();
        container.transition(PlayerState::Error).unwrap();
        assert!(container.transition(PlayerState::Playing).is_err());
        container.transition(PlayerState::Idle).unwrap();
        assert_eq!(container.get_state(), PlayerState::Idle);
    }
}
