//! Receive a dump pushed by the device as a framed chunk stream
//!
//! The dumper payload announces itself with a start marker, sends a header
//! declaring the total size, then streams self-describing chunks (marker,
//! offset, length, payload, additive checksum) until the whole image has
//! been transmitted, closing with an end marker. The receiver synchronizes
//! on the start marker one byte at a time, then reassembles chunks at their
//! declared offsets, recording recoverable protocol noise instead of
//! aborting: a dump with a few damaged chunks is still worth keeping.

use log::{debug, info, warn};

use crate::{
    checksum::additive_checksum,
    connection::{ByteChannel, Connection},
    error::{Error, ResultExt},
    progress::ProgressCallbacks,
    receiver::DumpAssembler,
};

/// Sentinel announcing the dump header
pub const START_MARKER: u32 = 0xAA55_AA55;
/// Sentinel announcing each chunk
pub const CHUNK_MARKER: u32 = 0x55AA_55AA;
/// Sentinel closing the stream
pub const END_MARKER: u32 = 0xDEAD_BEEF;

/// Header transmitted after the start marker
#[derive(Debug, Clone, Copy)]
pub struct DumpHeader {
    /// Size of the complete image in bytes
    pub total_size: u32,
    /// Advisory chunk size; chunks are self-describing and may use any
    /// length
    pub chunk_size: u32,
}

/// Receives a framed dump stream pushed by the device
pub struct FramedStreamReceiver<C> {
    connection: Connection<C>,
}

impl<C: ByteChannel> FramedStreamReceiver<C> {
    pub fn new(connection: Connection<C>) -> Self {
        FramedStreamReceiver { connection }
    }

    /// Receive one complete dump
    ///
    /// Blocks until the device starts streaming (or the channel timeout
    /// fires), then runs the transfer to completion and returns the
    /// assembler holding the image and statistics. Only a failed channel,
    /// an out-of-bounds chunk, or a zero-length chunk abort the transfer;
    /// everything else is recorded in the error count.
    pub fn receive(
        &mut self,
        mut progress: Option<&mut dyn ProgressCallbacks>,
    ) -> Result<DumpAssembler, Error> {
        self.await_start()?;
        let header = self.read_header()?;
        info!(
            "Receiving {} bytes in chunks of up to {} bytes",
            header.total_size, header.chunk_size
        );

        let mut assembler = DumpAssembler::fixed(header.total_size);
        if let Some(progress) = progress.as_deref_mut() {
            progress.init(0, header.total_size as usize);
        }

        let end_consumed = self.receive_chunks(&header, &mut assembler, &mut progress)?;
        if !end_consumed {
            self.await_end();
        }

        if let Some(progress) = progress {
            progress.finish(assembler.success());
        }

        Ok(assembler)
    }

    /// Scan the stream one byte at a time until the start marker appears
    ///
    /// A four-byte sliding window keeps this allocation-free no matter how
    /// much boot chatter precedes the marker. A channel timeout here is
    /// fatal: the device never entered the dumper payload.
    fn await_start(&mut self) -> Result<(), Error> {
        debug!("Waiting for start marker");
        let marker = START_MARKER.to_le_bytes();
        let mut window = [0u8; 4];
        loop {
            window.rotate_left(1);
            window[3] = self.connection.read_byte()?;
            if window == marker {
                debug!("Start marker received");
                return Ok(());
            }
        }
    }

    fn read_header(&mut self) -> Result<DumpHeader, Error> {
        let total_size = self.connection.read_word()?;
        let chunk_size = self.connection.read_word()?;

        Ok(DumpHeader {
            total_size,
            chunk_size,
        })
    }

    /// Consume chunks until the declared size is reached or the device
    /// signals an early end
    ///
    /// Returns `true` when the end marker was already consumed.
    fn receive_chunks(
        &mut self,
        header: &DumpHeader,
        assembler: &mut DumpAssembler,
        progress: &mut Option<&mut dyn ProgressCallbacks>,
    ) -> Result<bool, Error> {
        while assembler.stats().bytes_received < header.total_size {
            let marker = self.connection.read_word().transferring()?;
            if marker == END_MARKER {
                info!("End marker received before the declared size was reached");
                return Ok(true);
            }
            if marker != CHUNK_MARKER {
                warn!("Expected chunk marker, got {marker:#010x}");
                assembler.stats_mut().errors += 1;
                continue;
            }

            let offset = self.connection.read_word().transferring()?;
            let length = self.connection.read_word().transferring()?;
            if length == 0 {
                return Err(Error::ZeroLengthChunk { offset });
            }

            let mut payload = vec![0; length as usize];
            let read = self
                .connection
                .read_exact_or_short(&mut payload)
                .transferring()?;
            if read < payload.len() {
                warn!(
                    "Chunk at offset {offset:#x}: expected {length} bytes, got {read}"
                );
                assembler.stats_mut().errors += 1;
                // The trailing checksum word stays in the stream and will be
                // flagged by the next marker read; recovery only restarts at
                // a clean chunk boundary.
                continue;
            }

            let received_checksum = self.connection.read_word().transferring()?;
            let calculated_checksum = additive_checksum(&payload);
            if received_checksum != calculated_checksum {
                warn!(
                    "Checksum mismatch at offset {offset:#x}: received {received_checksum:#010x}, calculated {calculated_checksum:#010x}"
                );
                // The payload is still kept; the caller decides what a
                // nonzero error count means for the dump.
                assembler.stats_mut().errors += 1;
            }

            assembler.write_at(offset, &payload)?;

            let stats = assembler.stats_mut();
            stats.bytes_received += length;
            stats.chunks_received += 1;
            let received = stats.bytes_received;

            if let Some(progress) = progress.as_deref_mut() {
                progress.update(received as usize);
            }
        }

        Ok(false)
    }

    /// Check for the closing end marker
    ///
    /// The size target was already met, so anything other than a clean end
    /// marker (including a dead channel) downgrades to a warning.
    fn await_end(&mut self) {
        match self.connection.read_word() {
            Ok(END_MARKER) => debug!("End marker received"),
            Ok(word) => warn!("Expected end marker, got {word:#010x}"),
            Err(err) => warn!("Failed to read end marker: {err}"),
        }
    }

    pub fn connection(&mut self) -> &mut Connection<C> {
        &mut self.connection
    }

    pub fn into_connection(self) -> Connection<C> {
        self.connection
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::connection::fake::{FakeChannel, ReadStep};

    fn word(value: u32) -> Vec<u8> {
        value.to_le_bytes().to_vec()
    }

    fn chunk(offset: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = word(CHUNK_MARKER);
        bytes.extend(word(offset));
        bytes.extend(word(payload.len() as u32));
        bytes.extend(payload);
        bytes.extend(word(additive_checksum(payload)));
        bytes
    }

    fn receive_stream(stream: Vec<u8>) -> Result<DumpAssembler, Error> {
        let connection = Connection::new(FakeChannel::from_stream(stream));
        let mut receiver = FramedStreamReceiver::new(connection);
        receiver.receive(None)
    }

    #[test]
    fn reassembles_a_single_chunk_dump() {
        const PAYLOAD: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

        let mut stream = word(START_MARKER);
        stream.extend(word(8)); // total size
        stream.extend(word(4)); // advisory chunk size
        stream.extend(chunk(0, &PAYLOAD));
        stream.extend(word(END_MARKER));

        let assembler = receive_stream(stream).unwrap();
        assert!(assembler.success());

        let (buffer, stats) = assembler.finalize();
        assert_eq!(buffer, PAYLOAD);
        assert_eq!(stats.bytes_received, 8);
        assert_eq!(stats.chunks_received, 1);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn synchronizes_through_leading_garbage() {
        let mut stream = vec![0xFF, 0x00, 0xAA, 0x55, 0xAA]; // noise, incl. a partial marker
        stream.extend(word(START_MARKER));
        stream.extend(word(2));
        stream.extend(word(2));
        stream.extend(chunk(0, &[0xCA, 0xFE]));
        stream.extend(word(END_MARKER));

        let (buffer, stats) = receive_stream(stream).unwrap().finalize();
        assert_eq!(buffer, [0xCA, 0xFE]);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn places_out_of_order_chunks_by_offset() {
        let mut stream = word(START_MARKER);
        stream.extend(word(4));
        stream.extend(word(2));
        stream.extend(chunk(2, &[3, 4]));
        stream.extend(chunk(0, &[1, 2]));
        stream.extend(word(END_MARKER));

        let (buffer, stats) = receive_stream(stream).unwrap().finalize();
        assert_eq!(buffer, [1, 2, 3, 4]);
        assert_eq!(stats.bytes_received, 4);
        assert_eq!(stats.chunks_received, 2);
    }

    #[test]
    fn early_end_marker_stops_the_transfer_cleanly() {
        let mut stream = word(START_MARKER);
        stream.extend(word(8));
        stream.extend(word(4));
        stream.extend(chunk(0, &[1, 2, 3, 4]));
        stream.extend(word(END_MARKER));

        let (buffer, stats) = receive_stream(stream).unwrap().finalize();
        assert_eq!(buffer, [1, 2, 3, 4, 0, 0, 0, 0]);
        assert_eq!(stats.bytes_received, 4);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn unexpected_marker_is_recorded_and_skipped() {
        let mut stream = word(START_MARKER);
        stream.extend(word(2));
        stream.extend(word(2));
        stream.extend(word(0x1234_5678)); // stray word where a marker belongs
        stream.extend(chunk(0, &[7, 8]));
        stream.extend(word(END_MARKER));

        let (buffer, stats) = receive_stream(stream).unwrap().finalize();
        assert_eq!(buffer, [7, 8]);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.chunks_received, 1);
    }

    #[test]
    fn checksum_mismatch_keeps_the_payload() {
        let mut stream = word(START_MARKER);
        stream.extend(word(2));
        stream.extend(word(2));
        stream.extend(word(CHUNK_MARKER));
        stream.extend(word(0));
        stream.extend(word(2));
        stream.extend([0xAB, 0xCD]);
        stream.extend(word(0xBAD)); // wrong checksum
        stream.extend(word(END_MARKER));

        let assembler = receive_stream(stream).unwrap();
        assert!(!assembler.success());

        let (buffer, stats) = assembler.finalize();
        assert_eq!(buffer, [0xAB, 0xCD]);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.bytes_received, 2);
    }

    #[test]
    fn short_payload_skips_the_chunk_and_resynchronizes() {
        // The device sent a full chunk but the host lost the tail of the
        // payload to a timeout. The unread checksum word is then flagged as
        // a stray marker before the next chunk parses cleanly.
        let mut before_loss = word(START_MARKER);
        before_loss.extend(word(4));
        before_loss.extend(word(4));
        before_loss.extend(word(CHUNK_MARKER));
        before_loss.extend(word(0));
        before_loss.extend(word(4));
        before_loss.extend([0x11, 0x22]); // payload truncated after 2 of 4 bytes

        let mut after_loss = word(0x0000_0066); // checksum word of the lost chunk
        after_loss.extend(chunk(0, &[1, 2, 3, 4]));
        after_loss.extend(word(END_MARKER));

        let connection = Connection::new(FakeChannel::new(vec![
            ReadStep::Data(before_loss),
            ReadStep::Timeout,
            ReadStep::Data(after_loss),
        ]));
        let assembler = FramedStreamReceiver::new(connection).receive(None).unwrap();

        let (buffer, stats) = assembler.finalize();
        assert_eq!(buffer, [1, 2, 3, 4]);
        assert_eq!(stats.errors, 2); // short payload + stray checksum word
        assert_eq!(stats.chunks_received, 1);
    }

    #[test]
    fn empty_dump_is_legal() {
        let mut stream = word(START_MARKER);
        stream.extend(word(0));
        stream.extend(word(1024));
        stream.extend(word(END_MARKER));

        let (buffer, stats) = receive_stream(stream).unwrap().finalize();
        assert!(buffer.is_empty());
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.chunks_received, 0);
    }

    #[test]
    fn missing_end_marker_is_not_an_error() {
        let mut stream = word(START_MARKER);
        stream.extend(word(2));
        stream.extend(word(2));
        stream.extend(chunk(0, &[9, 9]));
        // stream dies before the end marker

        let (buffer, stats) = receive_stream(stream).unwrap().finalize();
        assert_eq!(buffer, [9, 9]);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn out_of_bounds_chunk_aborts() {
        let mut stream = word(START_MARKER);
        stream.extend(word(4));
        stream.extend(word(4));
        stream.extend(chunk(4, &[1, 2, 3, 4])); // starts exactly past the end

        let result = receive_stream(stream);
        assert!(matches!(result, Err(Error::ChunkOutOfBounds { .. })));
    }

    #[test]
    fn zero_length_chunk_aborts() {
        let mut stream = word(START_MARKER);
        stream.extend(word(4));
        stream.extend(word(4));
        stream.extend(word(CHUNK_MARKER));
        stream.extend(word(0)); // offset
        stream.extend(word(0)); // length

        let result = receive_stream(stream);
        assert!(matches!(result, Err(Error::ZeroLengthChunk { offset: 0 })));
    }

    #[test]
    fn silent_channel_fails_the_synchronization() {
        let connection = Connection::new(FakeChannel::new(vec![ReadStep::Timeout]));
        let result = FramedStreamReceiver::new(connection).receive(None);
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
