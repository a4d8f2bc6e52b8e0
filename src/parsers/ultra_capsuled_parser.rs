use crate::answers::*;
use crate::base::Result;
use crate::parsers::capsuled_parser::{
    angle_diff_q8, check_sync, start_angle_q8, to_hq, validate_capsule, wrap_angle_q6,
};
use crate::parsers::varbitscale::varbitscale_decode;
use crate::types::MeasurementNode;
use byteorder::{ByteOrder, LittleEndian};
use log::trace;

/// Predicted distance deltas carrying these values mean "no measurement".
const DIST_PREDICT_INVALID: [i32; 2] = [-512, 0x1FF];

#[derive(Debug, Clone, PartialEq)]
struct UltraCapsule {
    start_angle_sync_q6: u16,
    cabins: [u32; RPLIDAR_ULTRA_CABIN_COUNT],
}

impl UltraCapsule {
    fn from_bytes(start_angle_sync_q6: u16, frame: &[u8]) -> UltraCapsule {
        let mut cabins = [0u32; RPLIDAR_ULTRA_CABIN_COUNT];
        LittleEndian::read_u32_into(&frame[RPLIDAR_RESP_CAPSULE_HEADER_SIZE..], &mut cabins);
        UltraCapsule {
            start_angle_sync_q6,
            cabins,
        }
    }
}

/// Decoder for ultra capsules: three measurements per 32-bit cabin.
///
/// Each cabin holds a 12-bit varbitscale coded major distance and two signed
/// 10-bit deltas predicted from it and from the next cabin's major distance.
#[derive(Debug, Clone, Default)]
pub struct UltraCapsuledParser {
    prev: Option<UltraCapsule>,
}

impl UltraCapsuledParser {
    pub const FRAME_SIZE: usize = RPLIDAR_ULTRA_CAPSULE_SIZE;

    pub fn new() -> UltraCapsuledParser {
        UltraCapsuledParser { prev: None }
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
            trace!("Ultra capsule carries the start sync bit, dropping cached capsule");
            self.invalidate();
        }

        let capsule = UltraCapsule::from_bytes(start_angle_sync_q6, frame);
        if let Some(prev) = self.prev.as_ref() {
            decode_ultra_pair(prev, &capsule, out);
        }
        self.prev = Some(capsule);
        Ok(())
    }
}

/// Distances of the three measurements packed in one cabin, Q2 millimeters.
fn unpack_cabin(combined_x3: u32, next_combined_x3: u32) -> [u32; 3] {
    let dist_major = combined_x3 & 0xFFF;

    // sign-extending shifts pull out the two 10-bit deltas
    let dist_predict1 = ((combined_x3 << 10) as i32) >> 22;
    let dist_predict2 = (combined_x3 as i32) >> 22;

    let (dist_major, scalelvl1) = varbitscale_decode(dist_major);
    let (dist_major2, scalelvl2) = varbitscale_decode(next_combined_x3 & 0xFFF);

    let (dist_base1, scalelvl1) = if dist_major == 0 && dist_major2 != 0 {
        (dist_major2, scalelvl2)
    } else {
        (dist_major, scalelvl1)
    };
    let dist_base2 = dist_major2;

    let predicted = |predict: i32, base: u32, level: u32| -> u32 {
        if DIST_PREDICT_INVALID.contains(&predict) {
            0
        } else {
            (((predict << level) + base as i32) << 2) as u32
        }
    };

    [
        dist_major << 2,
        predicted(dist_predict1, dist_base1, scalelvl1),
        predicted(dist_predict2, dist_base2, scalelvl2),
    ]
}

/// Mean angular offset between the laser and the camera for a given distance, in Q16
/// radians. Close targets see a larger parallax.
fn offset_angle_mean_q16(dist_q2: u32) -> i32 {
    // 50 mm in Q2; distances are unsigned so everything below takes the constant branch
    if dist_q2 >= 50 * 4 {
        let k1: i32 = 98361;
        let k2 = k1 / dist_q2 as i32;
        (8.0 * 3.1415926535 * 65536.0 / 180.0) as i32 - (k2 << 6) - (k2 * k2 * k2) / 98304
    } else {
        (7.5 * 3.1415926535 * 65536.0 / 180.0) as i32
    }
}

fn decode_ultra_pair(prev: &UltraCapsule, cur: &UltraCapsule, out: &mut Vec<MeasurementNode>) {
    let cur_start_angle_q8 = start_angle_q8(cur.start_angle_sync_q6);
    let prev_start_angle_q8 = start_angle_q8(prev.start_angle_sync_q6);
    let diff_angle_q8 = angle_diff_q8(prev_start_angle_q8, cur_start_angle_q8);

    let angle_inc_q16 = (diff_angle_q8 << 3) / 3;
    let mut cur_angle_raw_q16 = prev_start_angle_q8 << 8;
    trace!(
        "Decoding ultra capsule: prev start {} q8, diff {} q8, inc {} q16",
        prev_start_angle_q8,
        diff_angle_q8,
        angle_inc_q16
    );

    for (pos, combined_x3) in prev.cabins.iter().enumerate() {
        // the last cabin predicts from the first cabin of the capsule that followed
        let next_combined_x3 = match prev.cabins.get(pos + 1) {
            Some(next) => *next,
            None => cur.cabins[0],
        };

        for dist_q2 in unpack_cabin(*combined_x3, next_combined_x3) {
            let sync = check_sync(cur_angle_raw_q16, angle_inc_q16);
            let offset_q16 = offset_angle_mean_q16(dist_q2);
            let offset_q16_deg = ((offset_q16 * 180) as f64 / 3.14159265) as i32;
            let angle_q6 = (cur_angle_raw_q16 - offset_q16_deg) >> 10;
            cur_angle_raw_q16 += angle_inc_q16;

            out.push(to_hq(wrap_angle_q6(angle_q6), dist_q2, sync));
        }
    }
}
