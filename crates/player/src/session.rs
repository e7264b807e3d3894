// One playback session: source, pool, feeder and consumer with a shared lifetime

use crate::feeder::{FeedStatus, Feeder, PrimeOutcome};
use crate::queue::BufferQueue;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tsfeed_core::{
    CallbackManager, FeedConfig, FeedError, FeedEvent, PlayState, PlayerState,
    PlayerStateContainer, Result, StreamFlags,
};
use tsfeed_source::PacketSource;

/// Owned playback session.
///
/// Created fully primed and playing; dropped or shut down as a unit.
pub struct Session<R> {
    queue: Arc<dyn BufferQueue>,
    feeder: Arc<Feeder<R>>,
    state: PlayerStateContainer,
    callbacks: Arc<CallbackManager>,
}

impl Session<File> {
    /// Open `path` and start feeding it into `queue`
    pub fn open(
        path: impl AsRef<Path>,
        queue: Arc<dyn BufferQueue>,
        config: FeedConfig,
        callbacks: Arc<CallbackManager>,
    ) -> Result<Self> {
        config.validate()?;
        let source = PacketSource::open(path, config.packet_size)?;
        Self::create(source, queue, config, callbacks)
    }
}

impl<R: Read + Seek + Send + 'static> Session<R> {
    /// Prime the pool from `source`, then move the consumer to paused and
    /// playing. On failure the consumer is released and nothing is kept.
    pub fn create(
        source: PacketSource<R>,
        queue: Arc<dyn BufferQueue>,
        config: FeedConfig,
        callbacks: Arc<CallbackManager>,
    ) -> Result<Self> {
        config.validate()?;
        if source.packet_size() != config.packet_size {
            return Err(FeedError::InvalidConfig(format!(
                "source packet size {} differs from configured {}",
                source.packet_size(),
                config.packet_size
            )));
        }

        let state = PlayerStateContainer::new();
        let feeder = Arc::new(Feeder::new(source, &config, callbacks.clone(), state.clone()));

        let session = Self {
            queue,
            feeder,
            state,
            callbacks,
        };
        // Dropping a half-started session releases the consumer and the source
        if let Err(e) = session.start() {
            log::error!("Session creation failed: {}", e);
            return Err(e);
        }
        Ok(session)
    }

    fn start(&self) -> Result<()> {
        self.queue.register_callback(self.feeder.clone())?;

        // Enqueue the content before starting to play, we don't want to starve the consumer
        match self.feeder.prime(self.queue.as_ref())? {
            PrimeOutcome::Primed { buffers, bytes } => {
                log::info!("Session primed: {} buffers, {} bytes", buffers, bytes);
            }
            PrimeOutcome::Exhausted => return Err(FeedError::NoContent),
        }

        self.queue.set_play_state(PlayState::Paused)?;
        self.change_state(PlayerState::Paused)?;
        self.queue.set_play_state(PlayState::Playing)?;
        self.change_state(PlayerState::Playing)?;
        Ok(())
    }

    fn change_state(&self, new_state: PlayerState) -> Result<()> {
        let old_state = self.state.transition(new_state)?;
        if old_state != new_state {
            self.callbacks.dispatch_event(FeedEvent::StateChanged {
                old_state,
                new_state,
            });
        }
        Ok(())
    }

    pub fn set_playing(&self, playing: bool) -> Result<()> {
        let play_state = PlayState::from(playing);
        let target = match play_state {
            PlayState::Playing => PlayerState::Playing,
            PlayState::Paused => PlayerState::Paused,
        };
        // the callback thread may have moved us to Error meanwhile
        self.change_state(target)?;
        self.queue.set_play_state(play_state)
    }

    /// Synchronous rewind to the first packet; see [`Feeder::request_rewind`]
    /// for the conditions under which this blocks.
    pub fn rewind(&self) {
        self.feeder.request_rewind();
    }

    pub fn status(&self) -> FeedStatus {
        self.feeder.status()
    }

    pub fn flags(&self) -> StreamFlags {
        self.feeder.flags()
    }

    pub fn state(&self) -> PlayerState {
        self.state.get_state()
    }

    /// Release the consumer and close the source.
    ///
    /// Must not be called while a `rewind` on this session is blocked.
    pub fn shutdown(self) {
        log::info!("Shutting down session");
        if let Ok(old_state) = self.state.transition(PlayerState::Idle) {
            if old_state != PlayerState::Idle {
                self.callbacks.dispatch_event(FeedEvent::StateChanged {
                    old_state,
                    new_state: PlayerState::Idle,
                });
            }
        }
    }
}

impl<R> Drop for Session<R> {
    fn drop(&mut self) {
        self.queue.release();
        self.feeder.close();
    }
}
