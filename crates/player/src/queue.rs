// Boundary with the playback consumer that drains pool buffers

use std::fmt;
use std::sync::Arc;
use tsfeed_core::{PlayState, Result};
use tsfeed_pool::PoolBuffer;

/// Item key of the end-of-stream message
pub const ITEMKEY_EOS: u32 = 0x1;

/// Item key of the discontinuity message
pub const ITEMKEY_DISCONTINUITY: u32 = 0x2;

/// Out-of-band message carried alongside a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMessage {
    /// The following data does not continue anything delivered before
    Discontinuity,
    /// No more data will ever be supplied
    EndOfStream,
}

impl BufferMessage {
    pub fn key(self) -> u32 {
        match self {
            BufferMessage::Discontinuity => ITEMKEY_DISCONTINUITY,
            BufferMessage::EndOfStream => ITEMKEY_EOS,
        }
    }

    /// Neither message has parameters
    pub fn value_size(self) -> u32 {
        0
    }

    /// Size of the message: key plus value size, both u32
    pub fn encoded_len(self) -> usize {
        2 * std::mem::size_of::<u32>()
    }

    /// Native-endian key/size pair as handed to the consumer
    pub fn encode(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.key().to_ne_bytes());
        out[4..].copy_from_slice(&self.value_size().to_ne_bytes());
        out
    }
}

/// One unit handed to the consumer
#[derive(Debug)]
pub enum Transfer {
    /// Packet data in a lent pool buffer
    Data {
        buffer: PoolBuffer,
        message: Option<BufferMessage>,
    },
    /// Zero-length EOS sentinel
    EndOfStream,
}

impl Transfer {
    pub fn message(&self) -> Option<BufferMessage> {
        match self {
            Transfer::Data { message, .. } => *message,
            Transfer::EndOfStream => Some(BufferMessage::EndOfStream),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Transfer::Data { buffer, .. } => buffer.len(),
            Transfer::EndOfStream => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// What the consumer reports once it is done with this transfer
    pub fn into_processed(self) -> Processed {
        match self {
            Transfer::Data { buffer, .. } => Processed::Buffer(buffer),
            Transfer::EndOfStream => Processed::EndOfStream,
        }
    }
}

/// Report of a drained transfer
#[derive(Debug)]
pub enum Processed {
    /// A data buffer came back and is free for refill
    Buffer(PoolBuffer),
    /// The EOS sentinel was consumed
    EndOfStream,
}

/// A transfer the consumer refused, handed back so no buffer is lost
#[derive(Debug)]
pub struct Rejected {
    pub transfer: Transfer,
    pub reason: String,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "transfer rejected: {}", self.reason)
    }
}

/// Receiver of "buffer processed" events.
/// Invoked on the consumer's thread, once per drained transfer; `queue` is
/// the consumer itself so the handler can enqueue refills.
pub trait ProcessedHandler: Send + Sync {
    fn on_processed(&self, queue: &dyn BufferQueue, item: Processed);
}

/// Playback consumer buffer queue
/// Platform-specific engines implement this trait
pub trait BufferQueue: Send + Sync {
    /// Append a transfer; custody of its buffer moves to the consumer
    fn enqueue(&self, transfer: Transfer) -> std::result::Result<(), Rejected>;

    /// Drop every queued transfer, handing their buffers back
    fn clear(&self) -> Result<Vec<PoolBuffer>>;

    /// Register the handler called for each processed transfer
    fn register_callback(&self, handler: Arc<dyn ProcessedHandler>) -> Result<()>;

    /// Transition between paused and playing
    fn set_play_state(&self, state: PlayState) -> Result<()>;

    /// Release consumer resources; no callbacks are made afterwards
    fn release(&self);
}

/// Externally owned display surface handed to the player
pub trait SurfaceHandle: Send {
    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_encoding() {
        let eos = BufferMessage::EndOfStream.encode();
        assert_eq!(u32::from_ne_bytes(eos[..4].try_into().unwrap()), ITEMKEY_EOS);
        assert_eq!(u32::from_ne_bytes(eos[4..].try_into().unwrap()), 0);
        assert_eq!(BufferMessage::Discontinuity.key(), ITEMKEY_DISCONTINUITY);
        assert_eq!(BufferMessage::Discontinuity.encoded_len(), 8);
    }

    #[test]
    fn test_end_of_stream_transfer_is_tagged_and_empty() {
        let transfer = Transfer::EndOfStream;
        assert!(transfer.is_empty());
        assert_eq!(transfer.message(), Some(BufferMessage::EndOfStream));
        assert!(matches!(transfer.into_processed(), Processed::EndOfStream));
    }
}
