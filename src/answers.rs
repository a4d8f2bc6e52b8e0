use crate::types::{DeviceInfo, Health};
use byteorder::{ByteOrder, LittleEndian};

/// A fixed-size response body that can be read straight off the wire.
pub trait Answer: Sized {
    /// Answer type the response header must carry.
    const ANS_TYPE: u8;

    /// Number of body bytes consumed.
    const SIZE: usize;

    /// Decodes the body. `data` is exactly `SIZE` bytes long.
    fn parse(data: &[u8]) -> Self;
}

pub const RPLIDAR_ANS_TYPE_DEVINFO: u8 = 0x4;
pub const RPLIDAR_ANS_TYPE_DEVHEALTH: u8 = 0x6;
pub const RPLIDAR_ANS_TYPE_SAMPLE_RATE: u8 = 0x15;
pub const RPLIDAR_ANS_TYPE_GET_LIDAR_CONF: u8 = 0x20;
pub const RPLIDAR_ANS_TYPE_SET_LIDAR_CONF: u8 = 0x21;
pub const RPLIDAR_ANS_TYPE_ACC_BOARD_FLAG: u8 = 0xFF;

// health status

pub const RPLIDAR_HEALTH_STATUS_OK: u8 = 0;
pub const RPLIDAR_HEALTH_STATUS_WARNING: u8 = 1;
pub const RPLIDAR_HEALTH_STATUS_ERROR: u8 = 2;

impl Answer for DeviceInfo {
    const ANS_TYPE: u8 = RPLIDAR_ANS_TYPE_DEVINFO;
    const SIZE: usize = 20;

    fn parse(data: &[u8]) -> DeviceInfo {
        let mut serial_number = [0; 16];
        serial_number.copy_from_slice(&data[4..20]);
        DeviceInfo {
            model: data[0],
            firmware_version: LittleEndian::read_u16(&data[1..3]),
            hardware_version: data[3],
            serial_number,
        }
    }
}

/// Raw health answer; the status byte is validated when mapped to [`Health`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResponseDeviceHealth {
    pub status: u8,
    pub error_code: u16,
}

impl Answer for ResponseDeviceHealth {
    const ANS_TYPE: u8 = RPLIDAR_ANS_TYPE_DEVHEALTH;
    const SIZE: usize = 3;

    fn parse(data: &[u8]) -> ResponseDeviceHealth {
        ResponseDeviceHealth {
            status: data[0],
            error_code: LittleEndian::read_u16(&data[1..3]),
        }
    }
}

impl ResponseDeviceHealth {
    pub fn to_health(self) -> Option<Health> {
        match self.status {
            RPLIDAR_HEALTH_STATUS_OK => Some(Health::Healthy),
            RPLIDAR_HEALTH_STATUS_WARNING => Some(Health::Warning(self.error_code)),
            RPLIDAR_HEALTH_STATUS_ERROR => Some(Health::Error(self.error_code)),
            _ => None,
        }
    }
}

/// Sample durations reported by legacy devices, in microseconds.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResponseSampleRate {
    pub std_sample_duration_us: u16,
    pub express_sample_duration_us: u16,
}

impl Answer for ResponseSampleRate {
    const ANS_TYPE: u8 = RPLIDAR_ANS_TYPE_SAMPLE_RATE;
    const SIZE: usize = 4;

    fn parse(data: &[u8]) -> ResponseSampleRate {
        ResponseSampleRate {
            std_sample_duration_us: LittleEndian::read_u16(&data[0..2]),
            express_sample_duration_us: LittleEndian::read_u16(&data[2..4]),
        }
    }
}

/// Bit in [`ResponseAccBoardFlag::support_flag`] set when the accessory board drives the motor.
pub const RPLIDAR_RESP_ACC_BOARD_FLAG_MOTOR_CTRL_SUPPORT_MASK: u32 = 0x1;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResponseAccBoardFlag {
    pub support_flag: u32,
}

impl Answer for ResponseAccBoardFlag {
    const ANS_TYPE: u8 = RPLIDAR_ANS_TYPE_ACC_BOARD_FLAG;
    const SIZE: usize = 4;

    fn parse(data: &[u8]) -> ResponseAccBoardFlag {
        ResponseAccBoardFlag {
            support_flag: LittleEndian::read_u32(data),
        }
    }
}

/// Outcome of a set-config request; `result` is 0 on success.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResponseSetLidarConf {
    pub conf_type: u32,
    pub result: u32,
}

impl Answer for ResponseSetLidarConf {
    const ANS_TYPE: u8 = RPLIDAR_ANS_TYPE_SET_LIDAR_CONF;
    const SIZE: usize = 8;

    fn parse(data: &[u8]) -> ResponseSetLidarConf {
        ResponseSetLidarConf {
            conf_type: LittleEndian::read_u32(&data[0..4]),
            result: LittleEndian::read_u32(&data[4..8]),
        }
    }
}

// Measurement answers

/// Stream of 5-byte measurement nodes (legacy scan).
pub const RPLIDAR_ANS_TYPE_MEASUREMENT: u8 = 0x81;

/// Stream of express capsules, 2 points per cabin.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED: u8 = 0x82;

/// Stream of HQ capsules carrying fully decoded nodes and a CRC32.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_HQ: u8 = 0x83;

/// Stream of ultra capsules, 3 points per varbitscale encoded cabin.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED_ULTRA: u8 = 0x84;

/// Stream of dense capsules, 40 distance-only cabins.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_DENSE_CAPSULED: u8 = 0x85;

pub const RPLIDAR_RESP_MEASUREMENT_NODE_SIZE: usize = 5;
pub const RPLIDAR_RESP_MEASUREMENT_SYNCBIT: u8 = 1;
pub const RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT: usize = 2;
pub const RPLIDAR_RESP_MEASUREMENT_CHECKBIT: u8 = 1;
pub const RPLIDAR_RESP_MEASUREMENT_ANGLE_SHIFT: usize = 1;

/// Sync nibbles in the high halves of the first two capsule bytes.
pub const RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_1: u8 = 0xA;
pub const RPLIDAR_RESP_MEASUREMENT_EXP_SYNC_2: u8 = 0x5;

/// Set in a capsule's start angle field on the first capsule after a (re)start.
pub const RPLIDAR_RESP_MEASUREMENT_EXP_SYNCBIT: u16 = 0x1 << 15;

/// Checksum bytes plus the start angle word.
pub const RPLIDAR_RESP_CAPSULE_HEADER_SIZE: usize = 4;

pub const RPLIDAR_CAPSULE_CABIN_COUNT: usize = 16;
pub const RPLIDAR_CAPSULE_CABIN_SIZE: usize = 5;
pub const RPLIDAR_CAPSULE_SIZE: usize =
    RPLIDAR_RESP_CAPSULE_HEADER_SIZE + RPLIDAR_CAPSULE_CABIN_COUNT * RPLIDAR_CAPSULE_CABIN_SIZE;

pub const RPLIDAR_DENSE_CABIN_COUNT: usize = 40;
pub const RPLIDAR_DENSE_CAPSULE_SIZE: usize =
    RPLIDAR_RESP_CAPSULE_HEADER_SIZE + RPLIDAR_DENSE_CABIN_COUNT * 2;

pub const RPLIDAR_ULTRA_CABIN_COUNT: usize = 32;
pub const RPLIDAR_ULTRA_CAPSULE_SIZE: usize =
    RPLIDAR_RESP_CAPSULE_HEADER_SIZE + RPLIDAR_ULTRA_CABIN_COUNT * 4;

pub const RPLIDAR_RESP_HQ_FLAG_SYNCBIT: u8 = 0x1;
pub const RPLIDAR_RESP_MEASUREMENT_HQ_SYNC: u8 = 0xA5;
pub const RPLIDAR_HQ_NODE_SIZE: usize = 8;
pub const RPLIDAR_HQ_NODE_COUNT: usize = 16;

/// Sync byte, u64 timestamp, node array, u32 CRC.
pub const RPLIDAR_HQ_CAPSULE_SIZE: usize = 1 + 8 + RPLIDAR_HQ_NODE_COUNT * RPLIDAR_HQ_NODE_SIZE + 4;
