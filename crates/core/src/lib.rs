// Core types shared by the packet feeder crates

pub mod callback;
pub mod config;
pub mod error;
pub mod state;

// Re-export commonly used types
pub use callback::{CallbackManager, FeedCallback, FeedEvent, TestCallback};
pub use config::FeedConfig;
pub use error::{FeedError, Result};
pub use state::{
    Guarded, PlayState, PlayerState, PlayerStateContainer, StreamFlags, StreamState,
};
