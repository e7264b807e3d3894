// Every pool slot is held by exactly one party at a time

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tsfeed_core::{CallbackManager, FeedConfig, PlayState, Result};
use tsfeed_player::{BufferQueue, ProcessedHandler, Rejected, Session, Transfer};
use tsfeed_pool::{PoolBuffer, SlotIndex};
use tsfeed_source::PacketSource;

#[derive(Default)]
struct CustodyInner {
    pending: VecDeque<Transfer>,
    in_flight: HashSet<SlotIndex>,
    handler: Option<Arc<dyn ProcessedHandler>>,
    double_lends: usize,
    max_in_flight: usize,
    end_of_stream_done: bool,
}

/// Consumer that tracks which slots it currently holds
#[derive(Default)]
struct CustodyQueue {
    inner: Mutex<CustodyInner>,
}

impl CustodyQueue {
    fn complete_next(&self) -> bool {
        let (item, handler) = {
            let mut inner = self.inner.lock();
            let Some(transfer) = inner.pending.pop_front() else {
                return false;
            };
            match &transfer {
                Transfer::Data { buffer, .. } => {
                    inner.in_flight.remove(&buffer.slot());
                }
                Transfer::EndOfStream => inner.end_of_stream_done = true,
            }
            (transfer.into_processed(), inner.handler.clone())
        };
        if let Some(handler) = handler {
            handler.on_processed(self, item);
        }
        true
    }
}

impl BufferQueue for CustodyQueue {
    fn enqueue(&self, transfer: Transfer) -> std::result::Result<(), Rejected> {
        let mut inner = self.inner.lock();
        if let Transfer::Data { buffer, .. } = &transfer {
            if !inner.in_flight.insert(buffer.slot()) {
                inner.double_lends += 1;
            }
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight.len());
        }
        inner.pending.push_back(transfer);
        Ok(())
    }

    fn clear(&self) -> Result<Vec<PoolBuffer>> {
        let mut inner = self.inner.lock();
        inner.in_flight.clear();
        Ok(inner
            .pending
            .drain(..)
            .filter_map(|transfer| match transfer {
                Transfer::Data { buffer, .. } => Some(buffer),
                Transfer::EndOfStream => None,
            })
            .collect())
    }

    fn register_callback(&self, handler: Arc<dyn ProcessedHandler>) -> Result<()> {
        self.inner.lock().handler = Some(handler);
        Ok(())
    }

    fn set_play_state(&self, _state: PlayState) -> Result<()> {
        Ok(())
    }

    fn release(&self) {
        let mut inner = self.inner.lock();
        inner.handler = None;
        inner.pending.clear();
        inner.in_flight.clear();
    }
}

#[test]
fn slots_are_never_lent_twice_across_rewinds() {
    let config = FeedConfig::default();
    let data: Vec<u8> = (0..500u32).flat_map(|i| [(i % 256) as u8; 188]).collect();
    let queue = Arc::new(CustodyQueue::default());
    let session = Session::create(
        PacketSource::new(Cursor::new(data), config.packet_size),
        queue.clone(),
        config,
        Arc::new(CallbackManager::new()),
    )
    .unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            while queue.complete_next() {
                thread::sleep(Duration::from_micros(200));
            }
        });
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(2));
            session.rewind();
            let status = session.status();
            assert!(status.lent_buffers <= config.buffer_count);
        }
    });

    let inner = queue.inner.lock();
    assert!(inner.end_of_stream_done);
    assert_eq!(inner.double_lends, 0);
    assert!(inner.max_in_flight <= config.buffer_count);
    drop(inner);

    let status = session.status();
    assert!(status.end_of_stream_processed);
    assert_eq!(status.lent_buffers, 0);
}
