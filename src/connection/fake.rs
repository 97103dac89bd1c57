//! Scripted in-memory channel used by the protocol tests

use std::{collections::VecDeque, io, time::Duration};

use super::ByteChannel;

/// One scripted read outcome
pub enum ReadStep {
    /// Bytes that become available to subsequent reads
    Data(Vec<u8>),
    /// A read attempt that times out with nothing buffered
    Timeout,
}

/// Minimal fake channel that serves reads from a script and records writes
pub struct FakeChannel {
    script: VecDeque<ReadStep>,
    pending: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    timeout: Duration,
}

impl FakeChannel {
    pub fn new(script: Vec<ReadStep>) -> Self {
        Self {
            script: script.into(),
            pending: VecDeque::new(),
            writes: Vec::new(),
            timeout: Duration::from_secs(1),
        }
    }

    /// A channel that plays back one contiguous byte stream
    pub fn from_stream(bytes: Vec<u8>) -> Self {
        Self::new(vec![ReadStep::Data(bytes)])
    }

    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }
}

impl ByteChannel for FakeChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.script.pop_front() {
                Some(ReadStep::Data(bytes)) => self.pending.extend(bytes),
                Some(ReadStep::Timeout) | None => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "scripted timeout"));
                }
            }
        }

        let count = buf.len().min(self.pending.len());
        for slot in buf[..count].iter_mut() {
            *slot = self.pending.pop_front().unwrap();
        }

        Ok(count)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writes.push(data.to_vec());
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
