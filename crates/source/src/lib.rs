// Sequential, rewindable reader over fixed-size packet records

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tsfeed_core::{FeedError, Result};

/// Packet-aligned reader over a sequential byte stream.
///
/// Reads never deliver a partial packet: trailing bytes beyond the last
/// whole packet are dropped. A delivered length of 0 means the stream is
/// exhausted or the read failed; callers treat both as end of stream.
pub struct PacketSource<R> {
    reader: R,
    packet_size: usize,
    /// Offset of the underlying reader, dropped bytes included
    position: u64,
}

impl PacketSource<File> {
    /// Open a file for packet reading
    pub fn open(path: impl AsRef<Path>, packet_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            log::error!("cannot open file {}: {}", path.display(), e);
            FeedError::OpenError(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self::new(file, packet_size))
    }
}

impl<R: Read + Seek> PacketSource<R> {
    pub fn new(reader: R, packet_size: usize) -> Self {
        debug_assert!(packet_size > 0);
        Self {
            reader,
            packet_size,
            position: 0,
        }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fill `buf` with as many whole packets as the stream provides.
    ///
    /// Short reads are retried until `buf` is full or the stream ends, so a
    /// result smaller than `buf.len()` only happens at end of stream.
    /// Returns the number of bytes delivered, always a multiple of the
    /// packet size.
    pub fn read_aligned(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Read failed after {} bytes: {}", filled, e);
                    break;
                }
            }
        }
        self.position += filled as u64;

        let stray = filled % self.packet_size;
        if stray != 0 {
            log::info!(
                "Dropping last packet because it is not whole ({} stray bytes)",
                stray
            );
        }
        filled - stray
    }

    /// Reposition to the first packet
    pub fn rewind_to_start(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.position = 0;
        log::debug!("Packet source rewound to start");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    const PACKET: usize = 188;

    fn numbered_packets(count: usize) -> Vec<u8> {
        (0..count)
            .flat_map(|i| std::iter::repeat(i as u8).take(PACKET))
            .collect()
    }

    /// Reader that hands out at most `chunk` bytes per call
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..len])
        }
    }

    impl Seek for Trickle {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    /// Reader whose every operation fails
    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    impl Seek for Broken {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn test_whole_packets_delivered_in_order() {
        let mut source = PacketSource::new(Cursor::new(numbered_packets(4)), PACKET);
        let mut buf = vec![0u8; PACKET * 3];

        assert_eq!(source.read_aligned(&mut buf), PACKET * 3);
        assert_eq!(buf[0], 0);
        assert_eq!(buf[PACKET * 2], 2);

        assert_eq!(source.read_aligned(&mut buf), PACKET);
        assert_eq!(buf[0], 3);
        assert_eq!(source.read_aligned(&mut buf), 0);
    }

    #[test]
    fn test_partial_packet_dropped() {
        let mut data = numbered_packets(2);
        data.extend_from_slice(&[0xAA; 100]);
        let mut source = PacketSource::new(Cursor::new(data), PACKET);
        let mut buf = vec![0u8; PACKET * 10];

        assert_eq!(source.read_aligned(&mut buf), PACKET * 2);
        assert_eq!(source.position(), (PACKET * 2 + 100) as u64);
        // The stray bytes are gone, not carried over
        assert_eq!(source.read_aligned(&mut buf), 0);
    }

    #[test]
    fn test_short_reads_are_coalesced() {
        let reader = Trickle {
            inner: Cursor::new(numbered_packets(5)),
            chunk: 50,
        };
        let mut source = PacketSource::new(reader, PACKET);
        let mut buf = vec![0u8; PACKET * 2];

        assert_eq!(source.read_aligned(&mut buf), PACKET * 2);
        assert_eq!(source.read_aligned(&mut buf), PACKET * 2);
        assert_eq!(buf[0], 2);
    }

    #[test]
    fn test_rewind_restarts_stream() {
        let mut source = PacketSource::new(Cursor::new(numbered_packets(3)), PACKET);
        let mut buf = vec![0u8; PACKET * 2];
        source.read_aligned(&mut buf);
        source.read_aligned(&mut buf);
        assert_eq!(source.position(), (PACKET * 3) as u64);

        source.rewind_to_start().unwrap();
        assert_eq!(source.position(), 0);
        assert_eq!(source.read_aligned(&mut buf), PACKET * 2);
        assert_eq!(buf[0], 0);
        assert_eq!(buf[PACKET], 1);
    }

    #[test]
    fn test_io_failure_reads_as_exhaustion() {
        let mut source = PacketSource::new(Broken, PACKET);
        let mut buf = vec![0u8; PACKET];
        assert_eq!(source.read_aligned(&mut buf), 0);
        assert!(matches!(source.rewind_to_start(), Err(FeedError::IoError(_))));
    }

    #[test]
    fn test_open_missing_file() {
        let result = PacketSource::open("/nonexistent/tsfeed/missing.ts", PACKET);
        assert!(matches!(result, Err(FeedError::OpenError(_))));
    }
}
