// Buffer-processed callback: refills drained buffers, honours rewinds, signals EOS

use crate::queue::{BufferMessage, BufferQueue, Processed, ProcessedHandler, Transfer};
use std::io::{Read, Seek};
use std::sync::Arc;
use tsfeed_core::{
    CallbackManager, FeedConfig, FeedError, FeedEvent, Guarded, PlayerState,
    PlayerStateContainer, Result, StreamFlags, StreamState,
};
use tsfeed_pool::{BufferPool, PoolBuffer};
use tsfeed_source::PacketSource;

/// Result of filling the pool from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimeOutcome {
    Primed { buffers: usize, bytes: usize },
    /// The source delivered no whole packet
    Exhausted,
}

/// Snapshot of feeding progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStatus {
    /// Data bytes handed to the consumer, across rewinds
    pub bytes_fed: u64,
    /// Data transfers handed to the consumer
    pub buffers_enqueued: u64,
    /// Rewinds actually performed
    pub discontinuities: u64,
    /// Pool buffers currently held by the consumer
    pub lent_buffers: usize,
    pub reached_end_of_stream: bool,
    pub end_of_stream_processed: bool,
}

/// State only touched under the stream mutex
struct FeedResources<R> {
    /// `None` once the session closed the source
    source: Option<PacketSource<R>>,
    pool: BufferPool,
    packet_size: usize,
    bytes_fed: u64,
    buffers_enqueued: u64,
    discontinuities: u64,
    end_of_stream_processed: bool,
}

/// Feeds packet data into the consumer's buffer queue.
///
/// All reads of the source happen while holding the stream mutex, whether
/// they come from the control thread (initial priming) or the consumer's
/// callback thread, so the handle is never read concurrently.
pub struct Feeder<R> {
    state: StreamState<FeedResources<R>>,
    callbacks: Arc<CallbackManager>,
    player_state: PlayerStateContainer,
}

impl<R> Feeder<R> {
    /// Ask the callback thread to restart from the first packet and wait
    /// until it has done so, or until end of stream makes the request moot.
    ///
    /// The wait is released only by a later callback invocation. If the
    /// consumer never calls back again (for instance because it was paused
    /// for good) this never returns.
    pub fn request_rewind(&self) {
        self.state.request_discontinuity();
    }

    pub fn flags(&self) -> StreamFlags {
        self.state.flags()
    }

    pub fn status(&self) -> FeedStatus {
        let guarded = self.state.lock();
        let resources = &guarded.resources;
        FeedStatus {
            bytes_fed: resources.bytes_fed,
            buffers_enqueued: resources.buffers_enqueued,
            discontinuities: resources.discontinuities,
            lent_buffers: resources.pool.lent_count(),
            reached_end_of_stream: guarded.flags.reached_end_of_stream,
            end_of_stream_processed: resources.end_of_stream_processed,
        }
    }

    /// Close the source. Late callbacks see end of stream and stop feeding.
    pub fn close(&self) {
        let mut guarded = self.state.lock();
        if guarded.resources.source.take().is_some() {
            log::debug!("Packet source closed");
        }
        self.state.mark_end_of_stream(&mut guarded);
    }
}

impl<R: Read + Seek + Send> Feeder<R> {
    pub fn new(
        source: PacketSource<R>,
        config: &FeedConfig,
        callbacks: Arc<CallbackManager>,
        player_state: PlayerStateContainer,
    ) -> Self {
        let resources = FeedResources {
            packet_size: source.packet_size(),
            source: Some(source),
            pool: BufferPool::new(config),
            bytes_fed: 0,
            buffers_enqueued: 0,
            discontinuities: 0,
            end_of_stream_processed: false,
        };
        Self {
            state: StreamState::new(resources),
            callbacks,
            player_state,
        }
    }

    /// Enqueue the initial buffers before playback starts
    pub fn prime(&self, queue: &dyn BufferQueue) -> Result<PrimeOutcome> {
        let outcome = {
            let mut guarded = self.state.lock();
            Self::prime_locked(&mut guarded.resources, queue, false)?
        };
        if let PrimeOutcome::Primed { bytes, .. } = outcome {
            self.callbacks.dispatch_event(FeedEvent::Progress {
                bytes_fed: bytes as u64,
            });
        }
        Ok(outcome)
    }

    /// Fill free slots in source order and enqueue them. Slots are filled
    /// with whole reads of `C` bytes; the first short read ends priming,
    /// which matches splitting one read of the whole pool.
    fn prime_locked(
        resources: &mut FeedResources<R>,
        queue: &dyn BufferQueue,
        discontinuity: bool,
    ) -> Result<PrimeOutcome> {
        let source = match resources.source.as_mut() {
            Some(source) => source,
            None => return Ok(PrimeOutcome::Exhausted),
        };

        let mut primed = Vec::new();
        let mut bytes = 0;
        while let Some(mut buffer) = resources.pool.checkout() {
            let read = buffer.fill_with(|data| source.read_aligned(data));
            if read == 0 {
                resources.pool.restore(buffer);
                break;
            }
            bytes += read;
            let short = read < buffer.capacity();
            primed.push(buffer);
            if short {
                break;
            }
        }

        if primed.is_empty() {
            // could be premature EOF or I/O error
            return Ok(PrimeOutcome::Exhausted);
        }
        log::info!(
            "Initially queueing {} packets in {} buffers",
            bytes / resources.packet_size,
            primed.len()
        );

        let buffers = primed.len();
        let mut message = discontinuity.then_some(BufferMessage::Discontinuity);
        let mut pending = primed.into_iter();
        while let Some(buffer) = pending.next() {
            let len = buffer.len() as u64;
            let transfer = Transfer::Data {
                buffer,
                message: message.take(),
            };
            if let Err(rejected) = queue.enqueue(transfer) {
                log::error!("Initial enqueue failed: {}", rejected);
                if let Processed::Buffer(buffer) = rejected.transfer.into_processed() {
                    resources.pool.restore(buffer);
                }
                for buffer in pending {
                    resources.pool.restore(buffer);
                }
                return Err(FeedError::QueueError(rejected.reason));
            }
            resources.bytes_fed += len;
            resources.buffers_enqueued += 1;
        }

        Ok(PrimeOutcome::Primed { buffers, bytes })
    }

    /// Take back custody of whatever the consumer reported
    fn take_back(resources: &mut FeedResources<R>, item: Processed, events: &mut Vec<FeedEvent>) {
        match item {
            Processed::Buffer(buffer) => resources.pool.restore(buffer),
            Processed::EndOfStream => {
                log::info!("EOS was processed");
                resources.pool.release_end_of_stream();
                resources.end_of_stream_processed = true;
                events.push(FeedEvent::EndOfStreamProcessed);
            }
        }
    }

    /// Clear the consumer, rewind the source and re-prime with a
    /// discontinuity on the first buffer. A source that cannot be rewound
    /// or re-primed ends the stream instead.
    fn restart_locked(
        &self,
        guarded: &mut Guarded<FeedResources<R>>,
        queue: &dyn BufferQueue,
        events: &mut Vec<FeedEvent>,
    ) {
        let resources = &mut guarded.resources;
        match queue.clear() {
            Ok(buffers) => {
                for buffer in buffers {
                    resources.pool.restore(buffer);
                }
            }
            Err(e) => log::error!("Clearing the buffer queue failed: {}", e),
        }

        let rewound = match resources.source.as_mut() {
            Some(source) => source.rewind_to_start(),
            None => Err(FeedError::InvalidState("source closed".to_string())),
        };
        if let Err(e) = rewound {
            log::error!("Rewind failed, aborting playback: {}", e);
            events.push(FeedEvent::Error {
                message: format!("rewind failed: {}", e),
            });
            if let Ok(old_state) = self.player_state.transition(PlayerState::Error) {
                events.push(FeedEvent::StateChanged {
                    old_state,
                    new_state: PlayerState::Error,
                });
            }
            self.end_stream_locked(guarded, queue, None, events);
            return;
        }

        match Self::prime_locked(resources, queue, true) {
            Ok(PrimeOutcome::Primed { .. }) => {
                resources.discontinuities += 1;
                log::info!("Rewound to start, discontinuity signalled");
                events.push(FeedEvent::Rewound);
            }
            Ok(PrimeOutcome::Exhausted) => {
                log::warn!("Nothing to replay after rewind");
                self.end_stream_locked(guarded, queue, None, events);
            }
            Err(e) => {
                log::error!("Re-priming after rewind failed: {}", e);
                events.push(FeedEvent::Error {
                    message: e.to_string(),
                });
                self.end_stream_locked(guarded, queue, None, events);
            }
        }
    }

    /// Enqueue the EOS sentinel, parking `carrier` (or any free slot) as
    /// its pool slot, and mark end of stream.
    fn end_stream_locked(
        &self,
        guarded: &mut Guarded<FeedResources<R>>,
        queue: &dyn BufferQueue,
        carrier: Option<PoolBuffer>,
        events: &mut Vec<FeedEvent>,
    ) {
        let pool = &mut guarded.resources.pool;
        match carrier.or_else(|| pool.checkout()) {
            Some(buffer) => pool.park_end_of_stream(buffer),
            None => log::warn!("No free slot to carry the EOS sentinel"),
        }
        if let Err(rejected) = queue.enqueue(Transfer::EndOfStream) {
            log::error!("EOS enqueue failed: {}", rejected);
        }
        self.state.mark_end_of_stream(guarded);
        log::info!("End of stream reached, EOS enqueued");
        events.push(FeedEvent::EndOfStream);
    }

    /// Normal feeding: refill the returned buffer or emit EOS
    fn feed_locked(
        &self,
        guarded: &mut Guarded<FeedResources<R>>,
        queue: &dyn BufferQueue,
        item: Processed,
        events: &mut Vec<FeedEvent>,
    ) {
        let mut buffer = match item {
            Processed::Buffer(buffer) => buffer,
            eos @ Processed::EndOfStream => {
                // nothing to refill
                Self::take_back(&mut guarded.resources, eos, events);
                return;
            }
        };

        let resources = &mut guarded.resources;
        debug_assert!(
            !buffer.is_empty() && buffer.len() % resources.packet_size == 0,
            "returned buffer of {} bytes is not packet aligned",
            buffer.len()
        );
        if !resources.pool.is_lent(buffer.slot()) {
            log::error!("Processed buffer for slot {} was not lent", buffer.slot().get());
        }

        // don't bother trying to read more data once we've hit EOF
        if guarded.flags.reached_end_of_stream {
            resources.pool.restore(buffer);
            return;
        }

        let read = match resources.source.as_mut() {
            Some(source) => buffer.fill_with(|data| source.read_aligned(data)),
            None => 0,
        };
        if read == 0 {
            // EOF or I/O error, signal EOS
            self.end_stream_locked(guarded, queue, Some(buffer), events);
            return;
        }

        let transfer = Transfer::Data {
            buffer,
            message: None,
        };
        match queue.enqueue(transfer) {
            Ok(()) => {
                resources.bytes_fed += read as u64;
                resources.buffers_enqueued += 1;
                events.push(FeedEvent::Progress {
                    bytes_fed: resources.bytes_fed,
                });
            }
            Err(rejected) => {
                log::error!("Refill enqueue failed: {}", rejected);
                if let Processed::Buffer(buffer) = rejected.transfer.into_processed() {
                    resources.pool.restore(buffer);
                }
                events.push(FeedEvent::Error {
                    message: rejected.reason,
                });
            }
        }
    }
}

impl<R: Read + Seek + Send> ProcessedHandler for Feeder<R> {
    fn on_processed(&self, queue: &dyn BufferQueue, item: Processed) {
        let mut events = Vec::new();
        {
            let mut guarded = self.state.lock();
            if guarded.flags.discontinuity_requested {
                // A pending rewind preempts normal feeding
                Self::take_back(&mut guarded.resources, item, &mut events);
                if guarded.flags.reached_end_of_stream {
                    // can't rewind after EOS, the consumer was told playback is over
                    log::info!("Rewind suppressed, EOS already signalled");
                    events.push(FeedEvent::RewindSuppressed);
                } else {
                    self.restart_locked(&mut guarded, queue, &mut events);
                }
                self.state.acknowledge_discontinuity(&mut guarded);
            } else {
                self.feed_locked(&mut guarded, queue, item, &mut events);
            }
        }
        for event in events {
            self.callbacks.dispatch_event(event);
        }
    }
}
