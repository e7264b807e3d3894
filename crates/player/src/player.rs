// Control API: create / play / pause / rewind / shutdown

use crate::feeder::FeedStatus;
use crate::queue::{BufferQueue, SurfaceHandle};
use crate::session::Session;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tsfeed_core::{
    CallbackManager, FeedCallback, FeedConfig, FeedError, PlayerState, Result,
};
use tsfeed_source::PacketSource;

/// Streaming media player facade.
///
/// Holds at most one session. Operations on a player that was never
/// created (or was shut down) are no-ops.
pub struct StreamingPlayer<R = File> {
    config: FeedConfig,
    session: Option<Session<R>>,
    surface: Option<Box<dyn SurfaceHandle>>,
    callbacks: Arc<CallbackManager>,
}

impl<R> StreamingPlayer<R> {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            session: None,
            surface: None,
            callbacks: Arc::new(CallbackManager::new()),
        }
    }

    pub fn add_callback(&self, callback: Arc<dyn FeedCallback>, throttle_ms: u64) {
        self.callbacks.add_callback(callback, throttle_ms);
    }

    /// Hand over the display surface; a previous one is released
    pub fn set_surface(&mut self, surface: Box<dyn SurfaceHandle>) {
        if let Some(mut old) = self.surface.replace(surface) {
            old.release();
        }
    }

    pub fn is_created(&self) -> bool {
        self.session.is_some()
    }
}

impl StreamingPlayer<File> {
    /// Open `path` and start playing it through `queue`
    pub fn create(&mut self, path: impl AsRef<Path>, queue: Arc<dyn BufferQueue>) -> Result<()> {
        self.ensure_not_created()?;
        let path = path.as_ref();
        log::info!("Creating streaming player for {}", path.display());
        let session = Session::open(path, queue, self.config, self.callbacks.clone())?;
        self.session = Some(session);
        Ok(())
    }
}

impl<R: Read + Seek + Send + 'static> StreamingPlayer<R> {
    /// Start playing an already opened source through `queue`
    pub fn create_with_source(
        &mut self,
        source: PacketSource<R>,
        queue: Arc<dyn BufferQueue>,
    ) -> Result<()> {
        self.ensure_not_created()?;
        let session = Session::create(source, queue, self.config, self.callbacks.clone())?;
        self.session = Some(session);
        Ok(())
    }

    fn ensure_not_created(&self) -> Result<()> {
        if self.session.is_some() {
            return Err(FeedError::InvalidState(
                "player already created".to_string(),
            ));
        }
        Ok(())
    }

    pub fn set_playing(&self, playing: bool) -> Result<()> {
        match &self.session {
            Some(session) => session.set_playing(playing),
            None => Ok(()),
        }
    }

    /// Restart from the first packet, returning once the consumer's callback
    /// has taken the request into account. A rewind after end of stream has
    /// no effect.
    ///
    /// Blocks until the consumer calls back again: if it never does, this
    /// never returns.
    pub fn rewind(&self) {
        if let Some(session) = &self.session {
            session.rewind();
        }
    }

    pub fn status(&self) -> Option<FeedStatus> {
        self.session.as_ref().map(Session::status)
    }

    pub fn state(&self) -> PlayerState {
        self.session
            .as_ref()
            .map_or(PlayerState::Idle, Session::state)
    }

    /// Tear down the session and release the display surface
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
        // make sure we don't leak the display surface
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
    }
}

impl<R> Drop for StreamingPlayer<R> {
    fn drop(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackQueue;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSurface(Arc<AtomicUsize>);

    impl SurfaceHandle for CountingSurface {
        fn release(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_operations_before_create_are_noops() {
        let mut player: StreamingPlayer = StreamingPlayer::new(FeedConfig::default());
        assert!(!player.is_created());
        assert!(player.set_playing(true).is_ok());
        player.rewind();
        assert!(player.status().is_none());
        assert_eq!(player.state(), PlayerState::Idle);
        player.shutdown();
    }

    #[test]
    fn test_create_from_file() {
        let path = std::env::temp_dir().join(format!("tsfeed_player_{}.ts", std::process::id()));
        std::fs::write(&path, vec![0x47u8; 188 * 25]).unwrap();

        let queue = Arc::new(LoopbackQueue::new());
        let mut player: StreamingPlayer = StreamingPlayer::new(FeedConfig::default());
        player.create(&path, queue.clone()).unwrap();

        assert!(player.is_created());
        assert_eq!(player.state(), PlayerState::Playing);
        // 25 packets fill two buffers and part of a third
        assert_eq!(queue.pending(), 3);
        assert_eq!(player.status().unwrap().bytes_fed, 188 * 25);

        assert!(matches!(
            player.create(&path, Arc::new(LoopbackQueue::new())),
            Err(FeedError::InvalidState(_))
        ));

        player.shutdown();
        assert!(!player.is_created());
        assert!(queue.is_released());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_failed_create_leaves_player_idle() {
        let mut player: StreamingPlayer<Cursor<Vec<u8>>> =
            StreamingPlayer::new(FeedConfig::default());
        let result = player.create_with_source(
            PacketSource::new(Cursor::new(vec![0u8; 100]), 188),
            Arc::new(LoopbackQueue::new()),
        );
        assert!(matches!(result, Err(FeedError::NoContent)));
        assert!(!player.is_created());
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn test_surface_released_on_replace_and_shutdown() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut player: StreamingPlayer = StreamingPlayer::new(FeedConfig::default());

        player.set_surface(Box::new(CountingSurface(released.clone())));
        player.set_surface(Box::new(CountingSurface(released.clone())));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        player.shutdown();
        assert_eq!(released.load(Ordering::SeqCst), 2);

        drop(player);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
