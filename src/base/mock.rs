//! Scripted in-memory device used by unit tests.

use crate::base::error::{Error, Result};
use crate::base::traits::ByteChannel;
use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

const GET_LIDAR_CONF_CMD: u8 = 0x84;
const GET_LIDAR_CONF_ANS: u8 = 0x20;

/// Encodes a response header followed by `body`.
pub(crate) fn response(ans_type: u8, body: &[u8], looping: bool) -> Vec<u8> {
    let mut size_q30_subtype = body.len() as u32;
    if looping {
        size_q30_subtype |= 1 << 30;
    }
    let mut bytes = vec![0xA5, 0x5A, 0, 0, 0, 0, ans_type];
    LittleEndian::write_u32(&mut bytes[2..6], size_q30_subtype);
    bytes.extend_from_slice(body);
    bytes
}

/// Response header announcing a measurement stream of `frame_size` byte frames.
pub(crate) fn stream_header(ans_type: u8, frame_size: usize) -> Vec<u8> {
    let mut bytes = vec![0xA5, 0x5A, 0, 0, 0, 0, ans_type];
    LittleEndian::write_u32(&mut bytes[2..6], frame_size as u32 | (1 << 30));
    bytes
}

struct Stream {
    frames: Vec<Vec<u8>>,
    next: usize,
    repeat: bool,
}

struct ScanScript {
    header: Vec<u8>,
    frames: Vec<Vec<u8>>,
    repeat: bool,
}

#[derive(Default)]
struct Inner {
    rx: VecDeque<u8>,
    written: Vec<u8>,
    commands: Vec<(u8, Vec<u8>)>,
    responses: HashMap<u8, Vec<u8>>,
    conf_responses: HashMap<u32, Vec<u8>>,
    scans: HashMap<u8, ScanScript>,
    stream: Option<Stream>,
    interrupt_bytes: Vec<u8>,
    broken: bool,
    closed: bool,
}

impl Inner {
    fn on_command(&mut self, cmd: u8, payload: Vec<u8>) {
        if self.stream.take().is_some() {
            let in_flight = self.interrupt_bytes.clone();
            self.rx.extend(in_flight);
        }

        if cmd == GET_LIDAR_CONF_CMD && payload.len() >= 4 {
            let conf_type = LittleEndian::read_u32(&payload[0..4]);
            if let Some(value) = self.conf_responses.get(&conf_type) {
                let mut body = conf_type.to_le_bytes().to_vec();
                body.extend_from_slice(value);
                self.rx.extend(response(GET_LIDAR_CONF_ANS, &body, false));
            }
        } else if let Some(script) = self.scans.get(&cmd) {
            self.rx.extend(script.header.iter().copied());
            self.stream = Some(Stream {
                frames: script.frames.clone(),
                next: 0,
                repeat: script.repeat,
            });
        } else if let Some(bytes) = self.responses.get(&cmd) {
            let bytes = bytes.clone();
            self.rx.extend(bytes);
        }
        self.commands.push((cmd, payload));
    }

    fn refill(&mut self) {
        if !self.rx.is_empty() {
            return;
        }
        if let Some(stream) = self.stream.as_mut() {
            if stream.next >= stream.frames.len() && stream.repeat {
                stream.next = 0;
            }
            if let Some(frame) = stream.frames.get(stream.next) {
                self.rx.extend(frame.iter().copied());
                stream.next += 1;
            }
        }
    }
}

/// A fake device answering command packets from a script.
///
/// Cloning shares the underlying state so a test can keep a handle after boxing
/// the channel into the driver.
#[derive(Clone, Default)]
pub(crate) struct MockChannel {
    inner: Arc<Mutex<Inner>>,
}

impl MockChannel {
    pub fn new() -> MockChannel {
        MockChannel::default()
    }

    /// Queues bytes as if the device had sent them unprompted.
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().rx.extend(data.iter().copied());
    }

    /// Replies with `bytes` every time command `cmd` is received.
    pub fn respond(&self, cmd: u8, bytes: Vec<u8>) {
        self.inner.lock().responses.insert(cmd, bytes);
    }

    /// Answers a get-config query of `conf_type` with `value`.
    pub fn respond_conf(&self, conf_type: u32, value: &[u8]) {
        self.inner
            .lock()
            .conf_responses
            .insert(conf_type, value.to_vec());
    }

    /// Starts streaming `frames` after `header` whenever `cmd` is received.
    pub fn stream_on(&self, cmd: u8, header: Vec<u8>, frames: Vec<Vec<u8>>, repeat: bool) {
        self.inner.lock().scans.insert(
            cmd,
            ScanScript {
                header,
                frames,
                repeat,
            },
        );
    }

    /// Bytes left in flight when a command interrupts a running stream.
    pub fn set_interrupt_bytes(&self, bytes: &[u8]) {
        self.inner.lock().interrupt_bytes = bytes.to_vec();
    }

    /// Makes every subsequent read fail like a yanked cable.
    pub fn break_link(&self) {
        self.inner.lock().broken = true;
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().written.clone()
    }

    /// Command codes received so far, with their payloads.
    pub fn commands(&self) -> Vec<(u8, Vec<u8>)> {
        self.inner.lock().commands.clone()
    }

    pub fn command_codes(&self) -> Vec<u8> {
        self.inner.lock().commands.iter().map(|(c, _)| *c).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn check_link(inner: &Inner) -> Result<()> {
        if inner.broken {
            return Err(Error::IoError(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock link broken",
            )));
        }
        Ok(())
    }
}

impl ByteChannel for MockChannel {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        inner.written.extend_from_slice(data);
        if data.len() >= 2 && data[0] == 0xA5 {
            let payload = if data.len() > 3 {
                let len = data[2] as usize;
                data[3..(3 + len).min(data.len())].to_vec()
            } else {
                Vec::new()
            };
            inner.on_command(data[1], payload);
        }
        Ok(data.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        MockChannel::check_link(&inner)?;
        inner.refill();
        let n = buf.len().min(inner.rx.len());
        for (slot, byte) in buf.iter_mut().zip(inner.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let mut inner = self.inner.lock();
        MockChannel::check_link(&inner)?;
        inner.refill();
        Ok(inner.rx.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.lock().rx.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().closed = true;
    }
}
