// Streaming buffer-queue player: feeds packet data to an asynchronous playback consumer

pub mod feeder;
pub mod loopback;
pub mod player;
pub mod queue;
pub mod session;

// Re-exports
pub use feeder::{FeedStatus, Feeder, PrimeOutcome};
pub use loopback::{Enqueued, LoopbackQueue};
pub use player::StreamingPlayer;
pub use queue::{
    BufferMessage, BufferQueue, Processed, ProcessedHandler, Rejected, SurfaceHandle, Transfer,
};
pub use session::Session;

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Install the platform log backend; later calls are no-ops
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag("TsFeed"),
            );
        }

        #[cfg(not(target_os = "android"))]
        {
            let _ = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("info"),
            )
            .try_init();
        }
    });
}
