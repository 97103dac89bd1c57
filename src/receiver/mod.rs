//! Reassembly of a device dump from either receive protocol
//!
//! [DumpAssembler] owns the output buffer and transfer accounting for one
//! dump operation. [FramedStreamReceiver] fills it with offset-addressed
//! writes, [PolledChunkReceiver] by sequential appends; the caller takes
//! the image and final statistics with [DumpAssembler::finalize].

use crate::error::Error;

pub mod framed;
pub mod polled;

pub use framed::{DumpHeader, FramedStreamReceiver};
pub use polled::PolledChunkReceiver;

/// Running counters for one transfer, mutated monotonically as it proceeds
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// Payload bytes actually read off the channel
    pub bytes_received: u32,
    /// Chunks received in full
    pub chunks_received: u32,
    /// Recoverable protocol errors recorded along the way
    pub errors: u32,
}

/// Owns the reconstructed image and accounting for a single dump operation
#[derive(Debug)]
pub struct DumpAssembler {
    buffer: Vec<u8>,
    stats: TransferStats,
}

impl DumpAssembler {
    /// Fixed-capacity assembler for offset-addressed chunk writes
    ///
    /// The buffer is zero-filled up front and never grows; chunks outside
    /// the declared capacity are rejected.
    pub(crate) fn fixed(total_size: u32) -> Self {
        DumpAssembler {
            buffer: vec![0; total_size as usize],
            stats: TransferStats::default(),
        }
    }

    /// Append-only assembler for sequentially polled chunks
    pub(crate) fn appending(size: u32) -> Self {
        DumpAssembler {
            buffer: Vec::with_capacity(size as usize),
            stats: TransferStats::default(),
        }
    }

    /// Place `payload` at `[offset, offset + payload.len())`, overwriting
    /// any previously written range
    pub(crate) fn write_at(&mut self, offset: u32, payload: &[u8]) -> Result<(), Error> {
        let capacity = self.buffer.len() as u64;
        let end = offset as u64 + payload.len() as u64;
        if end > capacity {
            return Err(Error::ChunkOutOfBounds {
                offset,
                length: payload.len() as u32,
                capacity: capacity as u32,
            });
        }

        self.buffer[offset as usize..end as usize].copy_from_slice(payload);

        Ok(())
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub(crate) fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    /// Bytes assembled so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// True when the transfer recorded no errors
    pub fn success(&self) -> bool {
        self.stats.errors == 0
    }

    /// Hand the assembled image and final accounting to the caller
    pub fn finalize(self) -> (Vec<u8>, TransferStats) {
        (self.buffer, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn offset_writes_land_in_place() {
        let mut assembler = DumpAssembler::fixed(8);
        assembler.write_at(4, &[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();
        assembler.write_at(0, &[0x11, 0x22]).unwrap();

        let (buffer, _) = assembler.finalize();
        assert_eq!(buffer, [0x11, 0x22, 0, 0, 0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn overlapping_writes_overwrite() {
        let mut assembler = DumpAssembler::fixed(4);
        assembler.write_at(0, &[1, 1, 1, 1]).unwrap();
        assembler.write_at(1, &[2, 2]).unwrap();

        let (buffer, _) = assembler.finalize();
        assert_eq!(buffer, [1, 2, 2, 1]);
    }

    #[test]
    fn out_of_bounds_write_is_rejected_without_growing() {
        let mut assembler = DumpAssembler::fixed(4);
        let result = assembler.write_at(2, &[0; 4]);

        assert!(matches!(
            result,
            Err(Error::ChunkOutOfBounds {
                offset: 2,
                length: 4,
                capacity: 4
            })
        ));
        assert_eq!(assembler.len(), 4);
    }

    #[test]
    fn bounds_check_survives_offset_overflow() {
        let mut assembler = DumpAssembler::fixed(4);
        assert!(assembler.write_at(u32::MAX, &[0; 2]).is_err());
    }

    #[test]
    fn success_tracks_error_count() {
        let mut assembler = DumpAssembler::appending(0);
        assert!(assembler.success());
        assembler.stats_mut().errors += 1;
        assert!(!assembler.success());
    }
}
