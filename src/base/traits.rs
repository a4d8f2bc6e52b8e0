use crate::base::error::Result;
use std::fmt;

/// Duplex byte stream the driver talks to the device through.
///
/// Implemented by the environment: a serial port, a UDP/TCP socket tunneling the
/// same byte protocol, or an in-memory script in tests. Implementations must not
/// block indefinitely: `read_bytes` returns whatever is ready (possibly nothing),
/// and the driver polls `bytes_available` against its own timeouts.
pub trait ByteChannel: Send {
    /// Writes `data` to the device, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Reads up to `buf.len()` bytes that are already available.
    ///
    /// Returns the number of bytes copied into `buf`, `0` if nothing is pending.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Number of received bytes ready to be read without blocking.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Discards every received byte that has not been read yet.
    fn flush(&mut self) -> Result<()>;

    /// Releases the underlying transport.
    fn close(&mut self) {}
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_bytes(buf)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl fmt::Debug for dyn ByteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteChannel")
    }
}
