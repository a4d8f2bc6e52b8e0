use crate::answers::*;
use crate::base::Result;
use crate::parsers::capsuled_parser::{
    angle_diff_q8, start_angle_q8, to_hq, validate_capsule, wrap_angle_q6, ANGLE_360_Q16,
};
use crate::types::MeasurementNode;
use byteorder::{ByteOrder, LittleEndian};
use log::trace;

#[derive(Debug, Clone, PartialEq)]
struct DenseCapsule {
    start_angle_sync_q6: u16,
    distances: [u16; RPLIDAR_DENSE_CABIN_COUNT],
}

impl DenseCapsule {
    fn from_bytes(start_angle_sync_q6: u16, frame: &[u8]) -> DenseCapsule {
        let mut distances = [0u16; RPLIDAR_DENSE_CABIN_COUNT];
        LittleEndian::read_u16_into(&frame[RPLIDAR_RESP_CAPSULE_HEADER_SIZE..], &mut distances);
        DenseCapsule {
            start_angle_sync_q6,
            distances,
        }
    }
}

/// Decoder for dense capsules: 40 distance-only cabins evenly spread over the
/// angle between two capsule start angles.
///
/// The finer spacing makes the wrap test fire on two neighbouring cabins, so only
/// the rising edge counts as a revolution start, and nothing is emitted until the
/// first such edge has been seen.
#[derive(Debug, Clone, Default)]
pub struct DenseCapsuledParser {
    prev: Option<DenseCapsule>,
    last_sync: bool,
    synced: bool,
}

impl DenseCapsuledParser {
    pub const FRAME_SIZE: usize = RPLIDAR_DENSE_CAPSULE_SIZE;

    pub fn new() -> DenseCapsuledParser {
        DenseCapsuledParser::default()
    }

    pub fn invalidate(&mut self) {
        self.prev = None;
    }

    pub fn is_primed(&self) -> bool {
        self.prev.is_some()
    }

    pub fn parse(&mut self, frame: &[u8], out: &mut Vec<MeasurementNode>) -> Result<()> {
        let start_angle_sync_q6 = match validate_capsule(frame) {
            Ok(start) => start,
            Err(e) => {
                self.invalidate();
                return Err(e);
            }
        };
        if (start_angle_sync_q6 & RPLIDAR_RESP_MEASUREMENT_EXP_SYNCBIT) != 0 {
            trace!("Dense capsule carries the start sync bit, dropping cached capsule");
            self.invalidate();
        }

        let capsule = DenseCapsule::from_bytes(start_angle_sync_q6, frame);
        match self.prev.take() {
            Some(prev) => self.decode_pair(&prev, &capsule, out),
            None => self.synced = false,
        }
        self.prev = Some(capsule);
        Ok(())
    }

    fn decode_pair(&mut self, prev: &DenseCapsule, cur: &DenseCapsule, out: &mut Vec<MeasurementNode>) {
        let cur_start_angle_q8 = start_angle_q8(cur.start_angle_sync_q6);
        let prev_start_angle_q8 = start_angle_q8(prev.start_angle_sync_q6);
        let diff_angle_q8 = angle_diff_q8(prev_start_angle_q8, cur_start_angle_q8);

        let angle_inc_q16 = (diff_angle_q8 << 8) / RPLIDAR_DENSE_CABIN_COUNT as i32;
        let mut cur_angle_raw_q16 = prev_start_angle_q8 << 8;

        for distance in prev.distances.iter() {
            let dist_q2 = (*distance as u32) << 2;
            let angle_q6 = cur_angle_raw_q16 >> 10;

            let wrapped = ((cur_angle_raw_q16 + angle_inc_q16) % ANGLE_360_Q16) < (angle_inc_q16 << 1);
            let sync = wrapped && !self.last_sync;
            if sync {
                self.synced = true;
            }
            cur_angle_raw_q16 += angle_inc_q16;

            if self.synced {
                out.push(to_hq(wrap_angle_q6(angle_q6), dist_q2, sync));
            }
            self.last_sync = sync;
        }
    }
}
