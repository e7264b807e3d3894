// In-process buffer queue: the caller plays the consumer's callback thread

use crate::queue::{BufferMessage, BufferQueue, ProcessedHandler, Rejected, Transfer};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tsfeed_core::{PlayState, Result};
use tsfeed_pool::{PoolBuffer, SlotIndex};

/// Copy of an enqueued transfer, kept when history is enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    /// `None` for the EOS sentinel
    pub slot: Option<SlotIndex>,
    pub bytes: Vec<u8>,
    pub message: Option<BufferMessage>,
}

struct LoopbackInner {
    pending: VecDeque<Transfer>,
    handler: Option<Arc<dyn ProcessedHandler>>,
    play_state: PlayState,
    released: bool,
    clears: usize,
    history: Option<Vec<Enqueued>>,
}

/// FIFO consumer that reports a transfer processed when told to.
///
/// `complete_next` invokes the registered handler on the calling thread
/// with the internal lock released, so the handler may enqueue or clear.
pub struct LoopbackQueue {
    inner: Mutex<LoopbackInner>,
}

impl LoopbackQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LoopbackInner {
                pending: VecDeque::new(),
                handler: None,
                play_state: PlayState::Paused,
                released: false,
                clears: 0,
                history: None,
            }),
        }
    }

    /// Queue that also records a copy of every enqueued transfer
    pub fn with_history() -> Self {
        let queue = Self::new();
        queue.inner.lock().history = Some(Vec::new());
        queue
    }

    /// Consume the head transfer and report it as processed.
    /// Returns false when nothing was queued.
    pub fn complete_next(&self) -> bool {
        let (item, handler) = {
            let mut inner = self.inner.lock();
            match inner.pending.pop_front() {
                Some(transfer) => (transfer.into_processed(), inner.handler.clone()),
                None => return false,
            }
        };
        match handler {
            Some(handler) => handler.on_processed(self, item),
            None => log::warn!("Transfer processed with no callback registered"),
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Message of the head transfer, if any
    pub fn head_message(&self) -> Option<Option<BufferMessage>> {
        self.inner.lock().pending.front().map(Transfer::message)
    }

    pub fn play_state(&self) -> PlayState {
        self.inner.lock().play_state
    }

    pub fn clear_count(&self) -> usize {
        self.inner.lock().clears
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().released
    }

    pub fn history(&self) -> Vec<Enqueued> {
        self.inner.lock().history.clone().unwrap_or_default()
    }
}

impl Default for LoopbackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferQueue for LoopbackQueue {
    fn enqueue(&self, transfer: Transfer) -> std::result::Result<(), Rejected> {
        let mut inner = self.inner.lock();
        if inner.released {
            return Err(Rejected {
                transfer,
                reason: "queue released".to_string(),
            });
        }
        if let Some(history) = inner.history.as_mut() {
            let (slot, bytes) = match &transfer {
                Transfer::Data { buffer, .. } => (Some(buffer.slot()), buffer.as_bytes().to_vec()),
                Transfer::EndOfStream => (None, Vec::new()),
            };
            history.push(Enqueued {
                slot,
                bytes,
                message: transfer.message(),
            });
        }
        inner.pending.push_back(transfer);
        Ok(())
    }

    fn clear(&self) -> Result<Vec<PoolBuffer>> {
        let mut inner = self.inner.lock();
        inner.clears += 1;
        let buffers = inner
            .pending
            .drain(..)
            .filter_map(|transfer| match transfer {
                Transfer::Data { buffer, .. } => Some(buffer),
                Transfer::EndOfStream => None,
            })
            .collect();
        Ok(buffers)
    }

    fn register_callback(&self, handler: Arc<dyn ProcessedHandler>) -> Result<()> {
        self.inner.lock().handler = Some(handler);
        Ok(())
    }

    fn set_play_state(&self, state: PlayState) -> Result<()> {
        self.inner.lock().play_state = state;
        Ok(())
    }

    fn release(&self) {
        let mut inner = self.inner.lock();
        inner.released = true;
        inner.handler = None;
        inner.pending.clear();
        inner.play_state = PlayState::Paused;
    }
}
