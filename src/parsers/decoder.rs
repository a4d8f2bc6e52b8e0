use crate::answers::*;
use crate::base::{wait_for_data, ByteChannel, Error, Result};
use crate::parsers::capsuled_parser::{accepts_capsule_byte, CapsuledParser};
use crate::parsers::dense_capsuled_parser::DenseCapsuledParser;
use crate::parsers::hq_capsuled_parser::HqCapsuledParser;
use crate::parsers::node_parser::NodeParser;
use crate::parsers::ultra_capsuled_parser::UltraCapsuledParser;
use crate::types::MeasurementNode;
use log::{debug, trace};
use std::time::{Duration, Instant};

/// The frame format of a measurement stream, with the state its decoder carries
/// between frames.
#[derive(Debug, Clone)]
pub enum DecoderKind {
    Node(NodeParser),
    Capsuled(CapsuledParser),
    DenseCapsuled(DenseCapsuledParser),
    UltraCapsuled(UltraCapsuledParser),
    Hq(HqCapsuledParser),
}

impl DecoderKind {
    pub fn for_ans_type(ans_type: u8) -> Result<DecoderKind> {
        match ans_type {
            RPLIDAR_ANS_TYPE_MEASUREMENT => Ok(DecoderKind::Node(NodeParser::new())),
            RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED => {
                Ok(DecoderKind::Capsuled(CapsuledParser::new()))
            }
            RPLIDAR_ANS_TYPE_MEASUREMENT_DENSE_CAPSULED => {
                Ok(DecoderKind::DenseCapsuled(DenseCapsuledParser::new()))
            }
            RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED_ULTRA => {
                Ok(DecoderKind::UltraCapsuled(UltraCapsuledParser::new()))
            }
            RPLIDAR_ANS_TYPE_MEASUREMENT_HQ => Ok(DecoderKind::Hq(HqCapsuledParser::new())),
            _ => Err(Error::invalid_data(format!(
                "unsupported measurement answer type {:02X}",
                ans_type
            ))),
        }
    }

    pub fn frame_size(&self) -> usize {
        match self {
            DecoderKind::Node(_) => NodeParser::FRAME_SIZE,
            DecoderKind::Capsuled(_) => CapsuledParser::FRAME_SIZE,
            DecoderKind::DenseCapsuled(_) => DenseCapsuledParser::FRAME_SIZE,
            DecoderKind::UltraCapsuled(_) => UltraCapsuledParser::FRAME_SIZE,
            DecoderKind::Hq(_) => HqCapsuledParser::FRAME_SIZE,
        }
    }

    fn accepts(&self, pos: usize, byte: u8) -> bool {
        match self {
            DecoderKind::Node(_) => NodeParser::accepts(pos, byte),
            DecoderKind::Hq(_) => HqCapsuledParser::accepts(pos, byte),
            _ => accepts_capsule_byte(pos, byte),
        }
    }

    fn invalidate(&mut self) {
        match self {
            DecoderKind::Node(p) => p.invalidate(),
            DecoderKind::Capsuled(p) => p.invalidate(),
            DecoderKind::DenseCapsuled(p) => p.invalidate(),
            DecoderKind::UltraCapsuled(p) => p.invalidate(),
            DecoderKind::Hq(p) => p.invalidate(),
        }
    }

    fn is_primed(&self) -> bool {
        match self {
            DecoderKind::Node(p) => p.is_primed(),
            DecoderKind::Capsuled(p) => p.is_primed(),
            DecoderKind::DenseCapsuled(p) => p.is_primed(),
            DecoderKind::UltraCapsuled(p) => p.is_primed(),
            DecoderKind::Hq(p) => p.is_primed(),
        }
    }

    fn parse(&mut self, frame: &[u8], out: &mut Vec<MeasurementNode>) -> Result<()> {
        match self {
            DecoderKind::Node(p) => p.parse(frame, out),
            DecoderKind::Capsuled(p) => p.parse(frame, out),
            DecoderKind::DenseCapsuled(p) => p.parse(frame, out),
            DecoderKind::UltraCapsuled(p) => p.parse(frame, out),
            DecoderKind::Hq(p) => p.parse(frame, out),
        }
    }
}

/// Reassembles measurement frames from the byte stream and feeds them to the decoder
/// selected by the stream's answer type.
///
/// Bytes that cannot start (or continue) a frame are dropped until the stream lines
/// up again; every resync drops the decoder's cached frame.
#[derive(Debug, Clone)]
pub struct ScanDecoder {
    kind: DecoderKind,
    frame: Vec<u8>,
    recv_pos: usize,
}

impl ScanDecoder {
    pub fn new(kind: DecoderKind) -> ScanDecoder {
        let frame_size = kind.frame_size();
        ScanDecoder {
            kind,
            frame: vec![0u8; frame_size],
            recv_pos: 0,
        }
    }

    pub fn for_ans_type(ans_type: u8) -> Result<ScanDecoder> {
        Ok(ScanDecoder::new(DecoderKind::for_ans_type(ans_type)?))
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame.len()
    }

    /// Drops any partial frame and the decoder's cached frame.
    pub fn invalidate(&mut self) {
        self.recv_pos = 0;
        self.kind.invalidate();
    }

    pub fn is_primed(&self) -> bool {
        self.kind.is_primed()
    }

    /// Decodes one complete frame, appending the measurements it releases to `out`.
    pub fn decode_frame(&mut self, frame: &[u8], out: &mut Vec<MeasurementNode>) -> Result<()> {
        if frame.len() != self.frame_size() {
            return Err(Error::invalid_data(format!(
                "frame size mismatch: expected {}, got {}",
                self.frame_size(),
                frame.len()
            )));
        }
        self.kind.parse(frame, out)
    }

    /// Reads from `channel` until one complete frame has been decoded.
    ///
    /// Decoders that interpolate between frames release nothing for the first frame
    /// after a (re)sync, so `out` may be left untouched on success.
    pub fn wait_nodes(
        &mut self,
        channel: &mut dyn ByteChannel,
        timeout: Duration,
        out: &mut Vec<MeasurementNode>,
    ) -> Result<()> {
        let start = Instant::now();
        let mut chunk = [0u8; 256];

        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(self.on_timeout());
            }
            if let Err(e) = wait_for_data(channel, 1, remaining) {
                return Err(match e {
                    Error::OperationTimeout => self.on_timeout(),
                    e => e,
                });
            }

            let wanted = (self.frame_size() - self.recv_pos).min(chunk.len());
            let read = channel.read_bytes(&mut chunk[..wanted])?;
            for &byte in &chunk[..read] {
                if self.push_byte(byte) {
                    self.recv_pos = 0;
                    return self.kind.parse(&self.frame, out);
                }
            }
        }
    }

    /// Stores `byte` at the current frame position. Returns `true` once the frame is
    /// complete.
    fn push_byte(&mut self, byte: u8) -> bool {
        if !self.kind.accepts(self.recv_pos, byte) {
            if self.recv_pos > 0 {
                trace!("Measurement frame out of sync at byte {}", self.recv_pos);
            }
            let retry = self.recv_pos > 0;
            self.invalidate();
            if !(retry && self.kind.accepts(0, byte)) {
                return false;
            }
        }

        self.frame[self.recv_pos] = byte;
        self.recv_pos += 1;
        self.recv_pos == self.frame.len()
    }

    fn on_timeout(&mut self) -> Error {
        debug!("Timed out waiting for measurement frame");
        self.invalidate();
        Error::OperationTimeout
    }
}
