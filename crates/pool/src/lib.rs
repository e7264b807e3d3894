// Fixed pool of equally sized packet buffers lent to the playback consumer

use tsfeed_core::FeedConfig;

/// Identity of a pool slot. Buffers are tracked by index, never by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// A pool buffer in transit.
///
/// Owning a `PoolBuffer` is custody of the slot's memory: while the consumer
/// holds it the pool cannot touch the bytes, and the slot only becomes
/// reusable once the buffer is handed back to [`BufferPool::restore`].
#[derive(Debug)]
pub struct PoolBuffer {
    slot: SlotIndex,
    data: Box<[u8]>,
    len: usize,
}

impl PoolBuffer {
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Number of valid bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Refill the whole buffer through `fill`, which returns how many bytes
    /// it wrote. Previous contents are discarded.
    pub fn fill_with<F>(&mut self, fill: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let written = fill(&mut self.data);
        debug_assert!(written <= self.data.len());
        self.len = written.min(self.data.len());
        self.len
    }
}

#[derive(Debug)]
enum SlotState {
    /// Memory is home and may be filled
    Free(Box<[u8]>),
    /// Memory is with the consumer
    Lent,
    /// Slot stands for the EOS sentinel until the consumer processes it
    EndOfStream(Box<[u8]>),
}

/// Cyclic set of `N` buffers of capacity `C`, allocated once per session.
pub struct BufferPool {
    slots: Vec<SlotState>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(config: &FeedConfig) -> Self {
        let capacity = config.buffer_capacity();
        let slots = (0..config.buffer_count)
            .map(|_| SlotState::Free(vec![0u8; capacity].into_boxed_slice()))
            .collect();
        log::debug!(
            "Buffer pool allocated: {} x {} bytes",
            config.buffer_count,
            capacity
        );
        Self { slots, capacity }
    }

    /// Number of slots (N)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Capacity of each buffer (C)
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotState::Free(_)))
            .count()
    }

    pub fn lent_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotState::Lent))
            .count()
    }

    pub fn is_lent(&self, slot: SlotIndex) -> bool {
        matches!(self.slots.get(slot.0), Some(SlotState::Lent))
    }

    pub fn holds_end_of_stream(&self) -> bool {
        self.slots
            .iter()
            .any(|s| matches!(s, SlotState::EndOfStream(_)))
    }

    /// Take custody of the lowest free slot, or `None` when every slot is out.
    pub fn checkout(&mut self) -> Option<PoolBuffer> {
        let index = self
            .slots
            .iter()
            .position(|s| matches!(s, SlotState::Free(_)))?;
        match std::mem::replace(&mut self.slots[index], SlotState::Lent) {
            SlotState::Free(data) => Some(PoolBuffer {
                slot: SlotIndex(index),
                data,
                len: 0,
            }),
            _ => unreachable!("slot {} was checked to be free", index),
        }
    }

    /// Return a buffer to its slot, making it free for reuse.
    ///
    /// A buffer that does not belong to a lent slot of this pool is an
    /// internal bug: it asserts in debug builds and is logged and dropped in
    /// release builds.
    pub fn restore(&mut self, buffer: PoolBuffer) {
        if let Some((index, data)) = self.admit(buffer) {
            self.slots[index] = SlotState::Free(data);
        }
    }

    /// Park a buffer in its slot as the carrier of the EOS sentinel.
    pub fn park_end_of_stream(&mut self, buffer: PoolBuffer) {
        if let Some((index, data)) = self.admit(buffer) {
            self.slots[index] = SlotState::EndOfStream(data);
        }
    }

    /// The consumer processed the EOS sentinel; its slot is free again.
    pub fn release_end_of_stream(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = match std::mem::replace(slot, SlotState::Lent) {
                SlotState::EndOfStream(data) => SlotState::Free(data),
                other => other,
            };
        }
    }

    fn admit(&self, buffer: PoolBuffer) -> Option<(usize, Box<[u8]>)> {
        let index = buffer.slot.0;
        let lent = matches!(self.slots.get(index), Some(SlotState::Lent));
        if !lent || buffer.data.len() != self.capacity {
            debug_assert!(lent, "slot {} returned while not lent", index);
            debug_assert_eq!(buffer.data.len(), self.capacity);
            log::error!(
                "Rejected foreign or duplicate buffer for slot {} ({} bytes)",
                index,
                buffer.data.len()
            );
            return None;
        }
        Some((index, buffer.data))
    }
}
