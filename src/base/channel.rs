use crate::base::error::{Error, Result};
use crate::base::ring_byte_buffer::RingByteBuffer;
use crate::base::traits::ByteChannel;
use log::{error, trace};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_CHANNEL_READ_BUFFER_SIZE: usize = 4096;

/// Granularity of the `bytes_available` polling loops.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Channel handle shared by the command path and the scan loop.
pub type SharedChannel = Arc<Mutex<Box<dyn ByteChannel>>>;

/// Wraps a channel so it can be shared between the facade and the scan thread.
pub fn share_channel(channel: Box<dyn ByteChannel>) -> SharedChannel {
    Arc::new(Mutex::new(channel))
}

/// Adapts any `Read + Write` stream (serial port, `TcpStream`, ...) to [`ByteChannel`].
///
/// The stream should be configured with a short read timeout: a read that times out
/// or would block is treated as "nothing received yet".
///
/// # Example
/// ```ignore
/// let port = serialport::new("/dev/ttyUSB0", 115200)
///     .timeout(Duration::from_millis(1))
///     .open()?;
/// let mut lidar = LidarDriver::new();
/// lidar.connect(Box::new(StreamChannel::new(port)))?;
/// ```
#[derive(Debug)]
pub struct StreamChannel<T> {
    stream: T,
    read_buffer: RingByteBuffer,
}

impl<T> StreamChannel<T>
where
    T: Read + Write + Send,
{
    pub fn new(stream: T) -> StreamChannel<T> {
        StreamChannel::with_read_buffer_size(stream, DEFAULT_CHANNEL_READ_BUFFER_SIZE)
    }

    pub fn with_read_buffer_size(stream: T, read_buffer_size: usize) -> StreamChannel<T> {
        trace!("Creating StreamChannel with buffer size {}", read_buffer_size);
        StreamChannel {
            stream,
            read_buffer: RingByteBuffer::with_capacity(read_buffer_size),
        }
    }

    /// Gives the wrapped stream back, dropping any buffered bytes.
    pub fn into_inner(self) -> T {
        self.stream
    }

    fn pump(&mut self) -> Result<usize> {
        match self.read_buffer.fill_from(&mut self.stream) {
            Ok(read) => {
                if read > 0 {
                    trace!(
                        "Pumped {} bytes from stream (buffered: {})",
                        read,
                        self.read_buffer.len()
                    );
                }
                Ok(read)
            }
            // bytes received before the close are still handed out
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && !self.read_buffer.is_empty() => {
                trace!("Stream closed with {} bytes buffered", self.read_buffer.len());
                Ok(0)
            }
            Err(e) => {
                error!("IO error reading from stream: {}", e);
                Err(e.into())
            }
        }
    }
}

impl<T> ByteChannel for StreamChannel<T>
where
    T: Read + Write + Send,
{
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        trace!("Writing {} bytes to stream: {:02X?}", data.len(), data);
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(data.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.read_buffer.len() < buf.len() {
            self.pump()?;
        }
        Ok(self.read_buffer.pop_into(buf))
    }

    fn bytes_available(&mut self) -> Result<usize> {
        self.pump()?;
        Ok(self.read_buffer.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.pump()?;
        trace!("Discarding {} buffered bytes", self.read_buffer.len());
        self.read_buffer.clear();
        Ok(())
    }
}

/// Waits until at least `size` bytes are pending on the channel.
///
/// Returns the number of bytes available, or `OperationTimeout` once `timeout` elapses.
pub fn wait_for_data(
    channel: &mut dyn ByteChannel,
    size: usize,
    timeout: Duration,
) -> Result<usize> {
    let start = Instant::now();
    loop {
        let available = channel.bytes_available()?;
        if available >= size {
            return Ok(available);
        }
        if start.elapsed() >= timeout {
            trace!(
                "Timed out waiting for {} bytes ({} available)",
                size,
                available
            );
            return Err(Error::OperationTimeout);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Fills `buf` completely from the channel within `timeout`.
pub fn read_exact(channel: &mut dyn ByteChannel, buf: &mut [u8], timeout: Duration) -> Result<()> {
    let start = Instant::now();
    let mut offset = 0;
    while offset < buf.len() {
        let remaining = timeout.saturating_sub(start.elapsed());
        wait_for_data(channel, 1, remaining)?;
        offset += channel.read_bytes(&mut buf[offset..])?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct Loopback {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl Read for Loopback {
        // behaves like a port with a read timeout once the script is consumed
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.rx.position() as usize >= self.rx.get_ref().len() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.rx.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn loopback(rx: &[u8]) -> StreamChannel<Loopback> {
        StreamChannel::with_read_buffer_size(
            Loopback {
                rx: Cursor::new(rx.to_vec()),
                tx: Vec::new(),
            },
            16,
        )
    }

    #[test]
    fn stream_channel_reads_and_writes() {
        let mut chn = loopback(&[1, 2, 3, 4, 5]);
        assert_eq!(chn.write(&[0xA5, 0x25]).unwrap(), 2);
        assert_eq!(chn.bytes_available().unwrap(), 5);

        let mut buf = [0; 3];
        read_exact(&mut chn, &mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(chn.into_inner().tx, vec![0xA5, 0x25]);
    }

    #[test]
    fn flush_drops_pending_bytes() {
        let mut chn = loopback(&[1, 2, 3]);
        chn.flush().unwrap();
        assert_eq!(chn.bytes_available().unwrap(), 0);
    }

    /// Stream whose reads always end the same way, after `rx` is drained.
    pub(crate) struct Dead {
        pub rx: Cursor<Vec<u8>>,
        pub kind: Option<io::ErrorKind>,
    }

    impl Dead {
        /// Peer closed the connection: reads return 0 bytes.
        pub(crate) fn closed(rx: &[u8]) -> Dead {
            Dead {
                rx: Cursor::new(rx.to_vec()),
                kind: None,
            }
        }

        pub(crate) fn failing(kind: io::ErrorKind) -> Dead {
            Dead {
                rx: Cursor::new(Vec::new()),
                kind: Some(kind),
            }
        }
    }

    impl Read for Dead {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.rx.position() as usize >= self.rx.get_ref().len() {
                if let Some(kind) = self.kind {
                    return Err(kind.into());
                }
            }
            self.rx.read(buf)
        }
    }

    impl Write for Dead {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_stream_is_an_io_error() {
        let mut chn = StreamChannel::new(Dead::closed(&[1, 2]));
        assert_eq!(chn.bytes_available().unwrap(), 2);
        assert_eq!(chn.bytes_available().unwrap(), 2);

        let mut buf = [0; 2];
        read_exact(&mut chn, &mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(buf, [1, 2]);
        match chn.bytes_available() {
            Err(Error::IoError(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!Error::IoError(io::ErrorKind::UnexpectedEof.into()).is_recoverable());
    }

    #[test]
    fn broken_pipe_is_an_io_error() {
        let mut chn = StreamChannel::new(Dead::failing(io::ErrorKind::BrokenPipe));
        match wait_for_data(&mut chn, 1, Duration::from_millis(20)) {
            Err(Error::IoError(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn wait_for_data_times_out() {
        let mut chn = loopback(&[1]);
        match wait_for_data(&mut chn, 2, Duration::from_millis(5)) {
            Err(Error::OperationTimeout) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
