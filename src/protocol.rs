//! Command packet encoding and response header synchronization.

use crate::answers::Answer;
use crate::base::{read_exact, wait_for_data, ByteChannel, Error, Message, Result};
use crate::checksum::Checksum;
use byteorder::{ByteOrder, LittleEndian};
use log::{error, trace, warn};
use std::cmp::min;
use std::time::{Duration, Instant};

const RPLIDAR_CMD_SYNC_BYTE: u8 = 0xA5;
const RPLIDAR_CMDFLAG_HAS_PAYLOAD: u8 = 0x80;

const RPLIDAR_ANS_SYNC_BYTES: [u8; 2] = [0xA5, 0x5A];

const RPLIDAR_ANS_PKTFLAG_LOOP: u8 = 0x1;

const RPLIDAR_ANS_HEADER_SIZE_MASK: u32 = 0x3FFFFFFF;
const RPLIDAR_ANS_HEADER_SUBTYPE_SHIFT: u32 = 30;

/// The size of the answer header following the two sync bytes.
const RPLIDAR_ANS_HEADER_SIZE: usize = 5;

const RPLIDAR_MAX_PAYLOAD_SIZE: usize = 255;

/// Decoded response header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AnsHeader {
    pub ans_type: u8,
    /// Size of the body, or of each frame for looping answers.
    pub size: u32,
    pub subtype: u8,
}

impl AnsHeader {
    fn from_bytes(bytes: &[u8]) -> AnsHeader {
        let size_q30_subtype = LittleEndian::read_u32(&bytes[0..4]);
        AnsHeader {
            ans_type: bytes[4],
            size: size_q30_subtype & RPLIDAR_ANS_HEADER_SIZE_MASK,
            subtype: (size_q30_subtype >> RPLIDAR_ANS_HEADER_SUBTYPE_SHIFT) as u8,
        }
    }

    /// Returns `true` for answers that keep streaming frames (scans).
    #[inline]
    pub fn is_loop(&self) -> bool {
        (self.subtype & RPLIDAR_ANS_PKTFLAG_LOOP) == RPLIDAR_ANS_PKTFLAG_LOOP
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DecodeStatus {
    WaitSyncByte(usize),
    WaitAnsHeader,
}

/// Byte-at-a-time response header scanner.
///
/// Any byte that breaks the sync sequence is dropped and scanning starts over, so
/// garbage in front of a header never prevents it from being found.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderDecoder {
    status: DecodeStatus,
    ans_header: Vec<u8>,
}

impl HeaderDecoder {
    pub fn new() -> HeaderDecoder {
        HeaderDecoder {
            status: DecodeStatus::WaitSyncByte(0),
            ans_header: Vec::with_capacity(RPLIDAR_ANS_HEADER_SIZE),
        }
    }

    pub fn reset(&mut self) {
        self.status = DecodeStatus::WaitSyncByte(0);
        self.ans_header.clear();
    }

    /// Number of bytes that can be consumed without overshooting the header.
    pub fn remaining(&self) -> usize {
        match self.status {
            DecodeStatus::WaitSyncByte(i) => RPLIDAR_ANS_SYNC_BYTES.len() - i + RPLIDAR_ANS_HEADER_SIZE,
            DecodeStatus::WaitAnsHeader => RPLIDAR_ANS_HEADER_SIZE - self.ans_header.len(),
        }
    }

    /// Feeds one byte, returning the header once it is complete.
    pub fn push(&mut self, byte: u8) -> Option<AnsHeader> {
        match self.status {
            DecodeStatus::WaitSyncByte(i) => {
                if byte == RPLIDAR_ANS_SYNC_BYTES[i] {
                    if i + 1 == RPLIDAR_ANS_SYNC_BYTES.len() {
                        trace!("Sync bytes received, waiting for answer header");
                        self.status = DecodeStatus::WaitAnsHeader;
                    } else {
                        self.status = DecodeStatus::WaitSyncByte(i + 1);
                    }
                } else if byte == RPLIDAR_ANS_SYNC_BYTES[0] {
                    trace!("Sync byte mismatch at {}, {:02X} restarts the sequence", i, byte);
                    self.status = DecodeStatus::WaitSyncByte(1);
                } else {
                    trace!("Skipping byte {:02X} while waiting for sync {}", byte, i);
                    self.status = DecodeStatus::WaitSyncByte(0);
                }
                None
            }
            DecodeStatus::WaitAnsHeader => {
                self.ans_header.push(byte);
                if self.ans_header.len() < RPLIDAR_ANS_HEADER_SIZE {
                    return None;
                }
                let header = AnsHeader::from_bytes(&self.ans_header);
                trace!(
                    "Answer header: type={:02X}, size={}, subtype={}",
                    header.ans_type,
                    header.size,
                    header.subtype
                );
                self.reset();
                Some(header)
            }
        }
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a command packet: sync, command, and for non-empty payloads the length,
/// payload bytes and XOR checksum over everything before it.
pub fn encode_command(msg: &Message, bytes: &mut [u8]) -> Result<usize> {
    trace!(
        "Encoding message: cmd={:02X}, data_len={}",
        msg.cmd,
        msg.data.len()
    );
    let encoded_size = estimate_encoded_size(msg)?;
    if encoded_size > bytes.len() {
        error!(
            "Buffer too small: required {}, available {}",
            encoded_size,
            bytes.len()
        );
        return Err(Error::BufferTooSmall);
    }

    bytes[0] = RPLIDAR_CMD_SYNC_BYTE;
    if !msg.has_payload() {
        bytes[1] = msg.cmd;
        return Ok(2);
    }

    bytes[1] = msg.cmd | RPLIDAR_CMDFLAG_HAS_PAYLOAD;
    bytes[2] = msg.data.len() as u8;
    bytes[3..3 + msg.data.len()].copy_from_slice(&msg.data);

    let mut checksum = Checksum::new();
    checksum.push_slice(&bytes[0..3 + msg.data.len()]);
    bytes[3 + msg.data.len()] = checksum.checksum();
    trace!("Calculated checksum: {:02X}", checksum.checksum());

    Ok(encoded_size)
}

/// Size of the packet `encode_command` produces for `msg`.
pub fn estimate_encoded_size(msg: &Message) -> Result<usize> {
    if msg.data.len() > RPLIDAR_MAX_PAYLOAD_SIZE {
        error!("Payload too large: {} bytes", msg.data.len());
        return Err(Error::operation_fail("payload too big"));
    }
    if msg.has_payload() {
        Ok(4 + msg.data.len())
    } else {
        Ok(2)
    }
}

/// Sends a command packet. Stale received bytes are discarded first so that they
/// cannot be mistaken for the answer.
pub fn send_command(channel: &mut dyn ByteChannel, msg: &Message) -> Result<()> {
    let mut buf = vec![0; estimate_encoded_size(msg)?];
    let encoded_size = encode_command(msg, &mut buf)?;

    channel.flush()?;
    trace!("Sending {:02X?}", &buf[..encoded_size]);
    let written = channel.write(&buf[..encoded_size])?;
    if written != encoded_size {
        error!("Short write: {} of {} bytes", written, encoded_size);
        return Err(Error::operation_fail("short write on channel"));
    }
    Ok(())
}

/// Scans the channel for a response header.
pub fn wait_response_header(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<AnsHeader> {
    let start = Instant::now();
    let mut decoder = HeaderDecoder::new();
    let mut buf = [0u8; RPLIDAR_ANS_SYNC_BYTES.len() + RPLIDAR_ANS_HEADER_SIZE];

    loop {
        let remaining_time = timeout.saturating_sub(start.elapsed());
        let available = match wait_for_data(channel, 1, remaining_time) {
            Ok(available) => available,
            Err(Error::OperationTimeout) => {
                warn!("Timed out waiting for response header");
                return Err(Error::OperationTimeout);
            }
            Err(e) => return Err(e),
        };

        let want = min(available, decoder.remaining());
        let read = channel.read_bytes(&mut buf[..want])?;
        for (i, byte) in buf[..read].iter().enumerate() {
            if let Some(header) = decoder.push(*byte) {
                debug_assert_eq!(i + 1, read);
                return Ok(header);
            }
        }
    }
}

/// Reads the body announced by `header` in full.
pub fn read_response_body(
    channel: &mut dyn ByteChannel,
    header: &AnsHeader,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let mut body = vec![0; header.size as usize];
    read_exact(channel, &mut body, timeout)?;
    trace!("Response body ({} bytes): {:02X?}", body.len(), body);
    Ok(body)
}

/// Waits for a fixed-size answer of type `T`.
///
/// The header must carry `T::ANS_TYPE` and announce at least `T::SIZE` bytes;
/// exactly `T::SIZE` bytes are then read.
pub fn wait_response<T: Answer>(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<T> {
    let start = Instant::now();
    let header = wait_response_header(channel, timeout)?;

    if header.ans_type != T::ANS_TYPE {
        error!(
            "Unexpected response type: expected {:02X}, got {:02X}",
            T::ANS_TYPE,
            header.ans_type
        );
        return Err(Error::invalid_data(format!(
            "unexpected response type: expected {:02X}, got {:02X}",
            T::ANS_TYPE,
            header.ans_type
        )));
    }
    if (header.size as usize) < T::SIZE {
        error!(
            "Response too short for type {:02X}: {} < {}",
            T::ANS_TYPE,
            header.size,
            T::SIZE
        );
        return Err(Error::invalid_data(format!(
            "response size {} smaller than expected {}",
            header.size,
            T::SIZE
        )));
    }

    let mut data = vec![0; T::SIZE];
    read_exact(channel, &mut data, timeout.saturating_sub(start.elapsed()))?;
    trace!("Answer {:02X} data: {:02X?}", T::ANS_TYPE, data);
    Ok(T::parse(&data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::mock::{response, MockChannel};
    use crate::types::DeviceInfo;

    fn encode(msg: &Message) -> Result<Vec<u8>> {
        let mut buf = vec![0; estimate_encoded_size(msg)?];
        let encoded_bytes = encode_command(msg, &mut buf)?;
        buf.truncate(encoded_bytes);
        Ok(buf)
    }

    fn device_info_response() -> Vec<u8> {
        let mut body = vec![0x18, 0x17, 0x01, 0x07];
        body.extend(0u8..16);
        response(0x04, &body, false)
    }

    #[test]
    fn protocol_encode() {
        assert_eq!(
            encode(&Message::new(0x25)).unwrap().as_slice(),
            [0xA5, 0x25]
        );

        assert_eq!(
            encode(&Message::with_data(0x82, &[0; 5])).unwrap().as_slice(),
            [0xA5, 0x82, 0x05, 0, 0, 0, 0, 0, 0x22]
        );

        assert_eq!(
            encode(&Message::with_data(0x70, &[0x94, 0x02])).unwrap().as_slice(),
            [0xA5, 0xF0, 0x02, 0x94, 0x02, 0xA5 ^ 0xF0 ^ 0x02 ^ 0x94 ^ 0x02]
        );
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        match encode(&Message::with_data(0x84, &[0; 256])) {
            Err(Error::OperationFail { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        let mut small = [0; 3];
        match encode_command(&Message::with_data(0x82, &[0; 5]), &mut small) {
            Err(Error::BufferTooSmall) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn header_found_after_garbage() {
        for garbage_len in [0usize, 1, 5, 100] {
            let mut chn = MockChannel::new();
            let garbage: Vec<u8> = (0..garbage_len).map(|i| (i * 37 + 0xA5) as u8).collect();
            chn.inject_read(&garbage);
            chn.inject_read(&response(0x06, &[0, 0, 0], false));

            let header = wait_response_header(&mut chn, Duration::from_millis(100)).unwrap();
            assert_eq!(header.ans_type, 0x06, "garbage length {}", garbage_len);
            assert_eq!(header.size, 3);
            assert!(!header.is_loop());
        }
    }

    #[test]
    fn header_found_after_repeated_sync_byte() {
        let mut chn = MockChannel::new();
        chn.inject_read(&[0xA5, 0xA5, 0xA5]);
        chn.inject_read(&response(0x81, &[], true));
        let header = wait_response_header(&mut chn, Duration::from_millis(100)).unwrap();
        assert_eq!(header.ans_type, 0x81);
        assert!(header.is_loop());
    }

    #[test]
    fn header_times_out_without_sync() {
        let mut chn = MockChannel::new();
        chn.inject_read(&[0x00, 0x5A, 0xA5]);
        match wait_response_header(&mut chn, Duration::from_millis(20)) {
            Err(Error::OperationTimeout) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn typed_response() {
        let mut chn = MockChannel::new();
        chn.inject_read(&device_info_response());
        let info: DeviceInfo = wait_response(&mut chn, Duration::from_millis(100)).unwrap();
        assert_eq!(info.firmware_version, 0x0117);
        assert_eq!(info.serial_number[1], 1);
    }

    #[test]
    fn typed_response_rejects_wrong_type_and_size() {
        let mut chn = MockChannel::new();
        chn.inject_read(&response(0x06, &[0; 20], false));
        match wait_response::<DeviceInfo>(&mut chn, Duration::from_millis(100)) {
            Err(Error::InvalidData { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        let mut chn = MockChannel::new();
        chn.inject_read(&response(0x04, &[0; 10], false));
        match wait_response::<DeviceInfo>(&mut chn, Duration::from_millis(100)) {
            Err(Error::InvalidData { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn send_command_discards_stale_bytes() {
        let mut chn = MockChannel::new();
        chn.inject_read(&[1, 2, 3]);
        send_command(&mut chn, &Message::new(0x25)).unwrap();
        assert_eq!(chn.written(), vec![0xA5, 0x25]);
        assert_eq!(chn.bytes_available().unwrap(), 0);
    }
}
