//! Pull a dump from the device with patched inquiry commands
//!
//! The device-side payload answers each authenticated inquiry command with a
//! raw 1024-byte eMMC read at the requested address, no framing. The host
//! paces itself with a settle delay after every command and retries short
//! reads by resending the identical packet. A chunk that fails all retries
//! is zero-padded so the output always covers the full requested range.

use std::thread::sleep;

use log::{debug, info, warn};

use crate::{
    connection::{
        command::{INQUIRY_CHUNK_SIZE, RETRY_SETTLE_DELAY, SETTLE_DELAY},
        ByteChannel, Command, CommandType, Connection,
    },
    error::{Error, ResultExt},
    progress::ProgressCallbacks,
    receiver::DumpAssembler,
};

/// Additional attempts made for a chunk after a short read
const MAX_RETRIES: usize = 3;

/// Polls the device for a linear address range, one chunk at a time
pub struct PolledChunkReceiver<C> {
    connection: Connection<C>,
    start_offset: u32,
    size: u32,
}

impl<C: ByteChannel> PolledChunkReceiver<C> {
    /// Create a receiver for the address range
    /// `[start_offset, start_offset + size)`
    ///
    /// `size` must be a whole number of chunks; the protocol has no way to
    /// request a partial one.
    pub fn new(connection: Connection<C>, start_offset: u32, size: u32) -> Result<Self, Error> {
        if size % INQUIRY_CHUNK_SIZE as u32 != 0 {
            return Err(Error::UnalignedDumpSize {
                size,
                chunk_size: INQUIRY_CHUNK_SIZE as u32,
            });
        }

        Ok(PolledChunkReceiver {
            connection,
            start_offset,
            size,
        })
    }

    /// Request every chunk in the range and return the assembler holding
    /// the image and statistics
    ///
    /// The output is always exactly `size` bytes; chunks that failed all
    /// retries are zero-padded and counted in the error total.
    pub fn receive(
        &mut self,
        mut progress: Option<&mut dyn ProgressCallbacks>,
    ) -> Result<DumpAssembler, Error> {
        info!(
            "Polling {} bytes starting at {:#x}",
            self.size, self.start_offset
        );

        let mut assembler = DumpAssembler::appending(self.size);
        if let Some(progress) = progress.as_deref_mut() {
            progress.init(self.start_offset, self.size as usize);
        }

        // The sequence number starts at 1 and wraps; retries resend the
        // identical packet without advancing it.
        let mut sequence: u8 = 1;
        let chunk_count = self.size / INQUIRY_CHUNK_SIZE as u32;
        for index in 0..chunk_count {
            let address = self.start_offset + index * INQUIRY_CHUNK_SIZE as u32;
            let chunk = self.request_chunk(sequence, address, &mut assembler)?;
            assembler.append(&chunk);
            sequence = sequence.wrapping_add(1);

            if let Some(progress) = progress.as_deref_mut() {
                progress.update(assembler.len());
            }
        }

        if let Some(progress) = progress {
            progress.finish(assembler.success());
        }

        Ok(assembler)
    }

    /// Request one chunk, retrying short reads with the identical packet
    fn request_chunk(
        &mut self,
        sequence: u8,
        address: u32,
        assembler: &mut DumpAssembler,
    ) -> Result<[u8; INQUIRY_CHUNK_SIZE], Error> {
        let command = Command::Inquiry { sequence, address };

        let mut chunk = [0u8; INQUIRY_CHUNK_SIZE];
        let mut last_read = 0;
        for attempt in 0..=MAX_RETRIES {
            self.connection.write_command(command)?;
            sleep(if attempt == 0 {
                SETTLE_DELAY
            } else {
                RETRY_SETTLE_DELAY
            });

            chunk = [0u8; INQUIRY_CHUNK_SIZE];
            let read = self
                .connection
                .with_timeout(CommandType::Inquiry.timeout(), |connection| {
                    connection.read_exact_or_short(&mut chunk)
                })
                .for_command(CommandType::Inquiry)?;

            if read == INQUIRY_CHUNK_SIZE {
                debug!("Chunk at {address:#x} received");
                let stats = assembler.stats_mut();
                stats.bytes_received += read as u32;
                stats.chunks_received += 1;
                return Ok(chunk);
            }

            last_read = read;
            warn!(
                "Short read for chunk at {address:#x} (attempt {}): {read}/{INQUIRY_CHUNK_SIZE} bytes",
                attempt + 1
            );
        }

        // Retries exhausted: keep the zero-padded remainder rather than
        // aborting the whole dump over one bad chunk.
        warn!("Giving up on chunk at {address:#x}, zero-padding");
        let stats = assembler.stats_mut();
        stats.bytes_received += last_read as u32;
        stats.errors += 1;

        Ok(chunk)
    }

    pub fn connection(&mut self) -> &mut Connection<C> {
        &mut self.connection
    }

    pub fn into_connection(self) -> Connection<C> {
        self.connection
    }
}
