// Session configuration: packet geometry and pool size

use crate::error::{FeedError, Result};

/// MPEG-2 transport stream packet size in bytes
pub const MPEG2_TS_PACKET_SIZE: usize = 188;

/// Number of transport stream packets carried by one pool buffer
pub const PACKETS_PER_BUFFER: usize = 10;

/// Number of buffers in the pool
pub const NB_BUFFERS: usize = 8;

/// Fixed geometry of a feeding session.
/// Immutable once a session has been created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfig {
    /// Size of one packet; reads are truncated to multiples of it
    pub packet_size: usize,
    /// Packets per pool buffer
    pub packets_per_buffer: usize,
    /// Number of pool buffers
    pub buffer_count: usize,
}

impl FeedConfig {
    /// Capacity of a single pool buffer in bytes.
    /// Only meaningful on a configuration that passed [`FeedConfig::validate`].
    pub fn buffer_capacity(&self) -> usize {
        self.packet_size * self.packets_per_buffer
    }

    /// Total bytes held by the pool
    pub fn pool_bytes(&self) -> usize {
        self.buffer_capacity() * self.buffer_count
    }

    pub fn validate(&self) -> Result<()> {
        if self.packet_size == 0 {
            return Err(FeedError::InvalidConfig("packet size must be > 0".to_string()));
        }
        if self.packets_per_buffer == 0 {
            return Err(FeedError::InvalidConfig(
                "packets per buffer must be > 0".to_string(),
            ));
        }
        if self.buffer_count == 0 {
            return Err(FeedError::InvalidConfig("buffer count must be > 0".to_string()));
        }
        let pool_bytes = self
            .packet_size
            .checked_mul(self.packets_per_buffer)
            .and_then(|capacity| capacity.checked_mul(self.buffer_count));
        if pool_bytes.is_none() {
            return Err(FeedError::InvalidConfig(format!(
                "{} buffers of {} x {} bytes overflow the address space",
                self.buffer_count, self.packets_per_buffer, self.packet_size
            )));
        }
        Ok(())
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            packet_size: MPEG2_TS_PACKET_SIZE,
            packets_per_buffer: PACKETS_PER_BUFFER,
            buffer_count: NB_BUFFERS,
        }
    }
}
