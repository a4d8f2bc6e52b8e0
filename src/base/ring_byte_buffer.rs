use std::cmp::min;
use std::io::{self, Read};

/// Fixed-capacity FIFO of received bytes.
///
/// `StreamChannel` pumps a blocking stream into it so that the driver can ask how many
/// bytes are pending before committing to a read.
#[derive(Debug, Clone, PartialEq)]
pub struct RingByteBuffer {
    buf: Vec<u8>,
    head: usize,
    size: usize,
}

impl RingByteBuffer {
    pub fn with_capacity(capacity: usize) -> RingByteBuffer {
        RingByteBuffer {
            buf: vec![0; capacity],
            head: 0,
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn free_space(&self) -> usize {
        self.buf.len() - self.size
    }

    /// Drops all pending bytes.
    pub fn clear(&mut self) {
        self.head = 0;
        self.size = 0;
    }

    fn tail(&self) -> usize {
        (self.head + self.size) % self.buf.len()
    }

    /// Longest contiguous run of pending bytes starting at the head.
    fn readable_run(&self) -> &[u8] {
        let end = min(self.head + self.size, self.buf.len());
        &self.buf[self.head..end]
    }

    /// Longest contiguous run of free space starting at the tail.
    fn writable_run(&mut self) -> &mut [u8] {
        let tail = self.tail();
        let end = min(self.buf.len(), tail + self.free_space());
        &mut self.buf[tail..end]
    }

    fn skip(&mut self, bytes: usize) {
        let skipped = min(self.size, bytes);
        self.head = (self.head + skipped) % self.buf.len();
        self.size -= skipped;
    }

    /// Appends as much of `data` as fits, returning how many bytes were stored.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let mut stored = 0;
        while stored < data.len() && self.free_space() > 0 {
            let run = self.writable_run();
            let n = min(run.len(), data.len() - stored);
            run[..n].copy_from_slice(&data[stored..stored + n]);
            self.size += n;
            stored += n;
        }
        stored
    }

    /// Moves up to `out.len()` pending bytes into `out`.
    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < out.len() && !self.is_empty() {
            let run = self.readable_run();
            let n = min(run.len(), out.len() - copied);
            out[copied..copied + n].copy_from_slice(&run[..n]);
            self.skip(n);
            copied += n;
        }
        copied
    }

    /// Fills free space from `upstream`.
    ///
    /// A read that times out or would block counts as zero bytes. A read returning
    /// nothing while there is room means the stream is closed and is reported as
    /// `UnexpectedEof`; any other failure is returned to the caller.
    pub fn fill_from(&mut self, upstream: &mut impl Read) -> io::Result<usize> {
        let mut total = 0;
        // at most two runs: up to the end of storage, then from the front
        for _ in 0..2 {
            if self.free_space() == 0 {
                break;
            }
            let run = self.writable_run();
            match upstream.read(run) {
                Ok(0) if total == 0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream closed",
                    ))
                }
                Ok(0) => break,
                Ok(read) => {
                    self.size += read;
                    total += read;
                }
                Err(err)
                    if err.kind() == io::ErrorKind::TimedOut
                        || err.kind() == io::ErrorKind::WouldBlock =>
                {
                    break
                }
                Err(err) => return Err(err),
            }
        }
        Ok(total)
    }
}
