use crate::answers::*;
use crate::base::{Error, Result};
use crate::checksum::xor_checksum;
use crate::types::MeasurementNode;
use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};

pub const ANGLE_360_Q6: i32 = 360 << 6;
pub const ANGLE_360_Q8: i32 = 360 << 8;
pub const ANGLE_360_Q16: i32 = 360 << 16;

/// Resync test for the two sync nibbles that open every express capsule.
#[inline]
pub fn accepts_capsule_byte(pos: usize, byte: u8) -> bool {
    match pos {
        0 => (byte >> 4) == RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_1,
        1 => (byte >> 4) == RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_2,
        _ => true,
    }
}

/// Checks the split checksum of an express capsule and returns its start angle field.
///
/// The low nibbles of the first two bytes hold the XOR of every byte from the start
/// angle onward.
pub fn validate_capsule(frame: &[u8]) -> Result<u16> {
    let recv_checksum = (frame[0] & 0xF) | (frame[1] << 4);
    let checksum = xor_checksum(&frame[2..]);
    if recv_checksum != checksum {
        warn!(
            "Capsule checksum mismatch: received {:02X}, calculated {:02X}",
            recv_checksum, checksum
        );
        return Err(Error::invalid_data("capsule checksum mismatch"));
    }
    Ok(LittleEndian::read_u16(&frame[2..4]))
}

#[inline]
pub fn start_angle_q8(start_angle_sync_q6: u16) -> i32 {
    ((start_angle_sync_q6 & 0x7FFF) as i32) << 2
}

/// Angle covered between two consecutive capsule start angles, across the 360 wrap.
#[inline]
pub fn angle_diff_q8(prev_q8: i32, cur_q8: i32) -> i32 {
    let diff = cur_q8 - prev_q8;
    if prev_q8 > cur_q8 {
        diff + ANGLE_360_Q8
    } else {
        diff
    }
}

/// Returns `true` if the next step from `cur_angle_q16` crosses 0 degrees.
#[inline]
pub fn check_sync(cur_angle_q16: i32, angle_inc_q16: i32) -> bool {
    ((cur_angle_q16 + angle_inc_q16) % ANGLE_360_Q16) < angle_inc_q16
}

#[inline]
pub fn wrap_angle_q6(angle_q6: i32) -> i32 {
    if angle_q6 < 0 {
        angle_q6 + ANGLE_360_Q6
    } else if angle_q6 >= ANGLE_360_Q6 {
        angle_q6 - ANGLE_360_Q6
    } else {
        angle_q6
    }
}

/// Builds an HQ node from an interpolated express measurement.
#[inline]
pub fn to_hq(angle_q6: i32, dist_q2: u32, sync: bool) -> MeasurementNode {
    MeasurementNode {
        angle_z_q14: ((angle_q6 << 8) / 90) as u16,
        dist_mm_q2: dist_q2,
        quality: if dist_q2 != 0 {
            0x2F << RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT
        } else {
            0
        },
        flag: if sync { 0x1 } else { 0x2 },
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
struct Cabin {
    distance_angle_1: u16,
    distance_angle_2: u16,
    offset_angles_q3: u8,
}

#[derive(Debug, Clone, PartialEq)]
struct Capsule {
    start_angle_sync_q6: u16,
    cabins: [Cabin; RPLIDAR_CAPSULE_CABIN_COUNT],
}

impl Capsule {
    fn from_bytes(start_angle_sync_q6: u16, frame: &[u8]) -> Capsule {
        let mut cabins = [Cabin::default(); RPLIDAR_CAPSULE_CABIN_COUNT];
        for (cabin, raw) in cabins.iter_mut().zip(
            frame[RPLIDAR_RESP_CAPSULE_HEADER_SIZE..].chunks_exact(RPLIDAR_CAPSULE_CABIN_SIZE),
        ) {
            *cabin = Cabin {
                distance_angle_1: LittleEndian::read_u16(&raw[0..2]),
                distance_angle_2: LittleEndian::read_u16(&raw[2..4]),
                offset_angles_q3: raw[4],
            };
        }
        Capsule {
            start_angle_sync_q6,
            cabins,
        }
    }
}

/// Decoder for express capsules carrying two measurements per cabin.
///
/// Angles are interpolated between the start angle of the cached capsule and the
/// one just received, so each capsule is decoded when its successor arrives.
#[derive(Debug, Clone, Default)]
pub struct CapsuledParser {
    prev: Option<Capsule>,
}

impl CapsuledParser {
    pub const FRAME_SIZE: usize = RPLIDAR_CAPSULE_SIZE;

    pub fn new() -> CapsuledParser {
        CapsuledParser { prev: None }
    }

    /// Forgets the cached capsule; the next one only primes the decoder.
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
            trace!("Capsule carries the start sync bit, dropping cached capsule");
            self.invalidate();
        }

        let capsule = Capsule::from_bytes(start_angle_sync_q6, frame);
        if let Some(prev) = self.prev.as_ref() {
            decode_capsule_pair(prev, &capsule, out);
        }
        self.prev = Some(capsule);
        Ok(())
    }
}

fn decode_capsule_pair(prev: &Capsule, cur: &Capsule, out: &mut Vec<MeasurementNode>) {
    let cur_start_angle_q8 = start_angle_q8(cur.start_angle_sync_q6);
    let prev_start_angle_q8 = start_angle_q8(prev.start_angle_sync_q6);
    let diff_angle_q8 = angle_diff_q8(prev_start_angle_q8, cur_start_angle_q8);

    let angle_inc_q16 = diff_angle_q8 << 3;
    let mut cur_angle_raw_q16 = prev_start_angle_q8 << 8;
    trace!(
        "Decoding capsule: prev start {} q8, diff {} q8, inc {} q16",
        prev_start_angle_q8,
        diff_angle_q8,
        angle_inc_q16
    );

    for cabin in prev.cabins.iter() {
        let dist_q2 = [
            (cabin.distance_angle_1 & 0xFFFC) as u32,
            (cabin.distance_angle_2 & 0xFFFC) as u32,
        ];
        let angle_offset_q3 = [
            ((cabin.offset_angles_q3 & 0xF) as i32) | (((cabin.distance_angle_1 & 0x3) as i32) << 4),
            ((cabin.offset_angles_q3 >> 4) as i32) | (((cabin.distance_angle_2 & 0x3) as i32) << 4),
        ];

        for i in 0..2 {
            let angle_q6 = (cur_angle_raw_q16 - (angle_offset_q3[i] << 13)) >> 10;
            let sync = check_sync(cur_angle_raw_q16, angle_inc_q16);
            cur_angle_raw_q16 += angle_inc_q16;
            out.push(to_hq(wrap_angle_q6(angle_q6), dist_q2[i], sync));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a legacy capsule with valid sync nibbles and checksum.
    pub(crate) fn build_capsule(start_angle_q6: u16, sync: bool, cabins: &[(u16, u16, u8)]) -> Vec<u8> {
        let mut frame = vec![0u8; RPLIDAR_CAPSULE_SIZE];
        let mut start = start_angle_q6 & 0x7FFF;
        if sync {
            start |= RPLIDAR_RESP_MEASUREMENT_EXP_SYNCBIT;
        }
        LittleEndian::write_u16(&mut frame[2..4], start);
        for (i, (d1, d2, off)) in cabins.iter().enumerate() {
            let at = RPLIDAR_RESP_CAPSULE_HEADER_SIZE + i * RPLIDAR_CAPSULE_CABIN_SIZE;
            LittleEndian::write_u16(&mut frame[at..at + 2], *d1);
            LittleEndian::write_u16(&mut frame[at + 2..at + 4], *d2);
            frame[at + 4] = *off;
        }
        seal_capsule(&mut frame);
        frame
    }

    /// Writes sync nibbles and checksum into the first two bytes of an express capsule.
    pub(crate) fn seal_capsule(frame: &mut [u8]) {
        let checksum = xor_checksum(&frame[2..]);
        frame[0] = (RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_1 << 4) | (checksum & 0xF);
        frame[1] = (RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_2 << 4) | (checksum >> 4);
    }

    fn flat_cabins() -> Vec<(u16, u16, u8)> {
        (0..16u16).map(|i| (1000 + i * 4, 0, 0)).collect()
    }

    #[test]
    fn first_capsule_only_primes() {
        let mut parser = CapsuledParser::new();
        let mut out = Vec::new();
        parser
            .parse(&build_capsule(0, true, &flat_cabins()), &mut out)
            .unwrap();
        assert!(out.is_empty());
        assert!(parser.is_primed());
    }

    #[test]
    fn capsule_pair_yields_two_nodes_per_cabin() {
        let mut parser = CapsuledParser::new();
        let mut out = Vec::new();
        // 350 -> 20 degrees crosses the zero direction
        parser
            .parse(&build_capsule(350 * 64, false, &flat_cabins()), &mut out)
            .unwrap();
        parser
            .parse(&build_capsule(20 * 64, false, &flat_cabins()), &mut out)
            .unwrap();

        assert_eq!(out.len(), 2 * RPLIDAR_CAPSULE_CABIN_COUNT);
        assert!(out.iter().all(|n| n.angle_degrees() < 360.0));
        assert_eq!(out.iter().filter(|n| n.is_sync()).count(), 1);
        assert_eq!(out[0].dist_mm_q2, 1000);
        assert_eq!(out[0].quality, 0x2F << 2);
        assert_eq!(out[1].dist_mm_q2, 0);
        assert_eq!(out[1].quality, 0);
        assert_eq!(out[0].angle_z_q14, (((350i32 * 64) << 8) / 90) as u16);
    }

    #[test]
    fn angle_offset_is_subtracted() {
        let mut parser = CapsuledParser::new();
        let mut out = Vec::new();
        // offset 8 (q3) = 1 degree on the first node
        let mut cabins = flat_cabins();
        cabins[0] = (1000, 1000, 0x08);
        parser
            .parse(&build_capsule(90 * 64, false, &cabins), &mut out)
            .unwrap();
        parser
            .parse(&build_capsule(122 * 64, false, &cabins), &mut out)
            .unwrap();
        assert_eq!(out[0].angle_z_q14, (((89i32 * 64) << 8) / 90) as u16);
    }

    #[test]
    fn checksum_failure_drops_cache() {
        let mut parser = CapsuledParser::new();
        let mut out = Vec::new();
        parser
            .parse(&build_capsule(0, false, &flat_cabins()), &mut out)
            .unwrap();

        let mut corrupted = build_capsule(30 * 64, false, &flat_cabins());
        corrupted[10] ^= 0x40;
        assert!(parser.parse(&corrupted, &mut out).is_err());
        assert!(!parser.is_primed());
        assert!(out.is_empty());
    }

    #[test]
    fn sync_nibbles() {
        assert!(accepts_capsule_byte(0, 0xA3));
        assert!(!accepts_capsule_byte(0, 0x53));
        assert!(accepts_capsule_byte(1, 0x5F));
        assert!(!accepts_capsule_byte(1, 0xAF));
        assert!(accepts_capsule_byte(7, 0x00));
    }

    #[test]
    fn angle_helpers() {
        assert_eq!(angle_diff_q8(350 << 8, 10 << 8), 20 << 8);
        assert_eq!(angle_diff_q8(10 << 8, 30 << 8), 20 << 8);
        assert_eq!(wrap_angle_q6(-64), ANGLE_360_Q6 - 64);
        assert_eq!(wrap_angle_q6(ANGLE_360_Q6 + 5), 5);
        assert!(check_sync(359 << 16, 2 << 16));
        assert!(!check_sync(10 << 16, 2 << 16));
    }
}
