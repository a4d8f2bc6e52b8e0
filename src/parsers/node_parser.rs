use crate::answers::*;
use crate::base::Result;
use crate::types::MeasurementNode;
use byteorder::{ByteOrder, LittleEndian};
use log::trace;

/// Decoder for the 5-byte measurement nodes of the standard scan.
///
/// Every node is self-contained, so there is no cached state and no lag.
#[derive(Debug, Clone, Default)]
pub struct NodeParser;

impl NodeParser {
    pub const FRAME_SIZE: usize = RPLIDAR_RESP_MEASUREMENT_NODE_SIZE;

    pub fn new() -> NodeParser {
        NodeParser
    }

    /// Resync test: the sync bit and its inverse must disagree in the first byte,
    /// and the check bit must be set in the second.
    #[inline]
    pub fn accepts(pos: usize, byte: u8) -> bool {
        match pos {
            0 => ((byte >> 1) ^ byte) & RPLIDAR_RESP_MEASUREMENT_SYNCBIT != 0,
            1 => byte & RPLIDAR_RESP_MEASUREMENT_CHECKBIT != 0,
            _ => true,
        }
    }

    pub fn invalidate(&mut self) {}

    pub fn is_primed(&self) -> bool {
        true
    }

    pub fn parse(&mut self, frame: &[u8], out: &mut Vec<MeasurementNode>) -> Result<()> {
        let sync_quality = frame[0];
        let angle_q6_checkbit = LittleEndian::read_u16(&frame[1..3]);
        let distance_q2 = LittleEndian::read_u16(&frame[3..5]);
        trace!(
            "Received legacy node: sync_q={}, angle_q6c={}, dist_q2={}",
            sync_quality,
            angle_q6_checkbit,
            distance_q2
        );

        out.push(MeasurementNode {
            angle_z_q14: ((((angle_q6_checkbit >> RPLIDAR_RESP_MEASUREMENT_ANGLE_SHIFT) as u32)
                << 8)
                / 90) as u16,
            dist_mm_q2: distance_q2 as u32,
            quality: (sync_quality >> RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT)
                << RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT,
            flag: sync_quality & RPLIDAR_RESP_MEASUREMENT_SYNCBIT,
        });
        Ok(())
    }
}
