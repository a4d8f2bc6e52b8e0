use crate::answers::*;
use crate::base::{Error, Result};
use crate::checksum::device_crc32;
use crate::types::MeasurementNode;
use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};

const HQ_TIMESTAMP_OFFSET: usize = 1;
const HQ_NODES_OFFSET: usize = HQ_TIMESTAMP_OFFSET + 8;
const HQ_CRC_OFFSET: usize = RPLIDAR_HQ_CAPSULE_SIZE - 4;

#[derive(Debug, Clone, PartialEq)]
struct HqCapsule {
    timestamp: u64,
    nodes: [MeasurementNode; RPLIDAR_HQ_NODE_COUNT],
}

impl HqCapsule {
    fn from_bytes(frame: &[u8]) -> HqCapsule {
        let mut nodes = [MeasurementNode::default(); RPLIDAR_HQ_NODE_COUNT];
        for (node, raw) in nodes
            .iter_mut()
            .zip(frame[HQ_NODES_OFFSET..HQ_CRC_OFFSET].chunks_exact(RPLIDAR_HQ_NODE_SIZE))
        {
            *node = MeasurementNode {
                angle_z_q14: LittleEndian::read_u16(&raw[0..2]),
                dist_mm_q2: LittleEndian::read_u32(&raw[2..6]),
                quality: raw[6],
                flag: raw[7],
            };
        }
        HqCapsule {
            timestamp: LittleEndian::read_u64(&frame[HQ_TIMESTAMP_OFFSET..HQ_NODES_OFFSET]),
            nodes,
        }
    }
}

/// Decoder for HQ capsules, which already carry fully decoded nodes protected by a
/// CRC32.
///
/// Capsules are released one frame late, like the interpolating capsule decoders,
/// so a capsule followed by a corrupted one is never handed out.
#[derive(Debug, Clone, Default)]
pub struct HqCapsuledParser {
    prev: Option<HqCapsule>,
}

impl HqCapsuledParser {
    pub const FRAME_SIZE: usize = RPLIDAR_HQ_CAPSULE_SIZE;

    pub fn new() -> HqCapsuledParser {
        HqCapsuledParser { prev: None }
    }

    #[inline]
    pub fn accepts(pos: usize, byte: u8) -> bool {
        pos != 0 || byte == RPLIDAR_RESP_MEASUREMENT_HQ_SYNC
    }

    pub fn invalidate(&mut self) {
        self.prev = None;
    }

    pub fn is_primed(&self) -> bool {
        self.prev.is_some()
    }

    pub fn parse(&mut self, frame: &[u8], out: &mut Vec<MeasurementNode>) -> Result<()> {
        let received = LittleEndian::read_u32(&frame[HQ_CRC_OFFSET..RPLIDAR_HQ_CAPSULE_SIZE]);
        let calculated = device_crc32(&frame[..HQ_CRC_OFFSET]);
        if received != calculated {
            warn!(
                "HQ capsule checksum mismatch: received {:08X}, calculated {:08X}",
                received, calculated
            );
            self.invalidate();
            return Err(Error::invalid_data("HQ capsule checksum mismatch"));
        }

        let capsule = HqCapsule::from_bytes(frame);
        trace!("Parsed HQ capsule: timestamp={}", capsule.timestamp);
        if let Some(prev) = self.prev.take() {
            out.extend_from_slice(&prev.nodes);
        }
        self.prev = Some(capsule);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn build_hq(timestamp: u64, nodes: &[MeasurementNode]) -> Vec<u8> {
        let mut frame = vec![0u8; RPLIDAR_HQ_CAPSULE_SIZE];
        frame[0] = RPLIDAR_RESP_MEASUREMENT_HQ_SYNC;
        LittleEndian::write_u64(&mut frame[HQ_TIMESTAMP_OFFSET..HQ_NODES_OFFSET], timestamp);
        for (i, node) in nodes.iter().take(RPLIDAR_HQ_NODE_COUNT).enumerate() {
            let at = HQ_NODES_OFFSET + i * RPLIDAR_HQ_NODE_SIZE;
            LittleEndian::write_u16(&mut frame[at..at + 2], node.angle_z_q14);
            LittleEndian::write_u32(&mut frame[at + 2..at + 6], node.dist_mm_q2);
            frame[at + 6] = node.quality;
            frame[at + 7] = node.flag;
        }
        let crc = device_crc32(&frame[..HQ_CRC_OFFSET]);
        LittleEndian::write_u32(&mut frame[HQ_CRC_OFFSET..], crc);
        frame
    }

    fn sample_nodes(base_deg: u16) -> Vec<MeasurementNode> {
        (0..RPLIDAR_HQ_NODE_COUNT as u16)
            .map(|i| MeasurementNode {
                angle_z_q14: ((base_deg + i) as u32 * 16384 / 90) as u16,
                dist_mm_q2: 4000 + i as u32,
                quality: 100,
                flag: if base_deg == 0 && i == 0 { 1 } else { 0 },
            })
            .collect()
    }

    #[test]
    fn capsules_are_released_one_frame_late() {
        let mut parser = HqCapsuledParser::new();
        let mut out = Vec::new();
        parser.parse(&build_hq(1, &sample_nodes(0)), &mut out).unwrap();
        assert!(out.is_empty());
        assert!(parser.is_primed());

        parser.parse(&build_hq(2, &sample_nodes(16)), &mut out).unwrap();
        assert_eq!(out, sample_nodes(0));
        assert!(out[0].is_sync());
    }

    #[test]
    fn corrupted_trailing_byte_is_rejected() {
        let mut parser = HqCapsuledParser::new();
        let mut out = Vec::new();
        parser.parse(&build_hq(1, &sample_nodes(0)), &mut out).unwrap();

        let mut frame = build_hq(2, &sample_nodes(16));
        frame[RPLIDAR_HQ_CAPSULE_SIZE - 1] ^= 0xFF;
        let err = parser.parse(&frame, &mut out).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
        assert!(out.is_empty());
        assert!(!parser.is_primed());
    }

    #[test]
    fn sync_byte() {
        assert!(HqCapsuledParser::accepts(0, 0xA5));
        assert!(!HqCapsuledParser::accepts(0, 0x5A));
        assert!(HqCapsuledParser::accepts(1, 0x00));
    }
}
