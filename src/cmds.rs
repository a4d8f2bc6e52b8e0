use byteorder::{ByteOrder, LittleEndian};

// Commands without payload and response

/// Stop the measurement process.
pub const RPLIDAR_CMD_STOP: u8 = 0x25;

/// Start a legacy scan. The device answers with a stream of 5-byte measurement nodes.
pub const RPLIDAR_CMD_SCAN: u8 = 0x20;

/// Start a legacy scan without waiting for the motor to reach a stable speed.
pub const RPLIDAR_CMD_FORCE_SCAN: u8 = 0x21;

/// Reset the LIDAR core.
pub const RPLIDAR_CMD_RESET: u8 = 0x40;

// Commands without payload but have response

pub const RPLIDAR_CMD_GET_DEVICE_INFO: u8 = 0x50;
pub const RPLIDAR_CMD_GET_DEVICE_HEALTH: u8 = 0x52;

/// Query the standard/express sample durations of legacy devices.
pub const RPLIDAR_CMD_GET_SAMPLERATE: u8 = 0x59;

// Commands with payload and have response

/// Start an express scan in the working mode carried by [`ExpressScanPayload`].
pub const RPLIDAR_CMD_EXPRESS_SCAN: u8 = 0x82;

/// Read a configuration entry, see the `RPLIDAR_CONF_*` types.
pub const RPLIDAR_CMD_GET_LIDAR_CONF: u8 = 0x84;

/// Write a configuration entry. Only types in [`RPLIDAR_CONF_WRITABLE_RANGE`] are accepted.
pub const RPLIDAR_CMD_SET_LIDAR_CONF: u8 = 0x85;

// Commands with payload and no response

/// Set the motor RPM on models with built-in speed control.
pub const RPLIDAR_CMD_HQ_MOTOR_SPEED_CTRL: u8 = 0xA8;

/// Set the motor PWM duty cycle through the accessory board.
pub const RPLIDAR_CMD_SET_MOTOR_PWM: u8 = 0xF0;

/// Query accessory board capability flags. Takes a 4-byte reserved payload.
pub const RPLIDAR_CMD_GET_ACC_BOARD_FLAG: u8 = 0xFF;

// LIDAR configurations

pub const RPLIDAR_CONF_DESIRED_ROT_FREQ: u32 = 0x00000001;
pub const RPLIDAR_CONF_MIN_ROT_FREQ: u32 = 0x00000004;
pub const RPLIDAR_CONF_MAX_ROT_FREQ: u32 = 0x00000005;

/// Number of supported scan modes. Response is u16.
pub const RPLIDAR_CONF_SCAN_MODE_COUNT: u32 = 0x00000070;

/// Sample duration of a scan mode in microseconds, Q8. Takes a u16 mode id.
pub const RPLIDAR_CONF_SCAN_MODE_US_PER_SAMPLE: u32 = 0x00000071;

/// Maximum distance of a scan mode in meters, Q8. Takes a u16 mode id.
pub const RPLIDAR_CONF_SCAN_MODE_MAX_DISTANCE: u32 = 0x00000074;

/// Answer type emitted by a scan mode. Takes a u16 mode id; response is u8.
pub const RPLIDAR_CONF_SCAN_MODE_ANS_TYPE: u32 = 0x00000075;

pub const RPLIDAR_CONF_LIDAR_MAC_ADDR: u32 = 0x00000079;

/// Id of the recommended scan mode. Response is u16.
pub const RPLIDAR_CONF_SCAN_MODE_TYPICAL: u32 = 0x0000007C;

/// Null-terminated scan mode name. Takes a u16 mode id.
pub const RPLIDAR_CONF_SCAN_MODE_NAME: u32 = 0x0000007F;

pub const RPLIDAR_CONF_LIDAR_STATIC_IP_ADDR: u32 = 0x0001CCC0;

/// Configuration types the host is allowed to write.
pub const RPLIDAR_CONF_WRITABLE_RANGE: std::ops::RangeInclusive<u32> = 0x0001_0000..=0x0001_FFFF;

/// Size of the reserved area following the type in a get-config query.
pub const RPLIDAR_CONF_QUERY_RESERVED_SIZE: usize = 32;

/// Legacy scan mode ids, valid on devices without configuration commands.
pub const RPLIDAR_CONF_SCAN_COMMAND_STD: u16 = 0;
pub const RPLIDAR_CONF_SCAN_COMMAND_EXPRESS: u16 = 1;

/// Payload of [`RPLIDAR_CMD_EXPRESS_SCAN`].
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ExpressScanPayload {
    /// Scan mode id, or 0 for the legacy express mode.
    pub working_mode: u8,
    pub working_flags: u16,
    pub param: u16,
}

impl ExpressScanPayload {
    pub const SIZE: usize = 5;

    pub fn to_bytes(&self) -> [u8; ExpressScanPayload::SIZE] {
        let mut bytes = [0; ExpressScanPayload::SIZE];
        bytes[0] = self.working_mode;
        LittleEndian::write_u16(&mut bytes[1..3], self.working_flags);
        LittleEndian::write_u16(&mut bytes[3..5], self.param);
        bytes
    }
}

/// Builds the payload of a get-config query: the type followed by a zero padded reserved area.
pub fn get_conf_payload(conf_type: u32, reserve: &[u8]) -> Vec<u8> {
    let mut data = vec![0; 4 + RPLIDAR_CONF_QUERY_RESERVED_SIZE];
    LittleEndian::write_u32(&mut data[0..4], conf_type);
    let len = reserve.len().min(RPLIDAR_CONF_QUERY_RESERVED_SIZE);
    data[4..4 + len].copy_from_slice(&reserve[..len]);
    data
}

/// Builds the payload of a set-config request.
pub fn set_conf_payload(conf_type: u32, value: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + value.len());
    data.extend_from_slice(&conf_type.to_le_bytes());
    data.extend_from_slice(value);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn express_payload_layout() {
        let payload = ExpressScanPayload {
            working_mode: 3,
            working_flags: 0x0102,
            param: 0x0304,
        };
        assert_eq!(payload.to_bytes(), [3, 0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn get_conf_payload_is_padded_and_clamped() {
        let payload = get_conf_payload(RPLIDAR_CONF_SCAN_MODE_NAME, &[2, 0]);
        assert_eq!(payload.len(), 36);
        assert_eq!(&payload[0..6], &[0x7F, 0, 0, 0, 2, 0]);
        assert!(payload[6..].iter().all(|b| *b == 0));

        let payload = get_conf_payload(RPLIDAR_CONF_SCAN_MODE_COUNT, &[0xAB; 40]);
        assert_eq!(payload.len(), 36);
        assert_eq!(payload[35], 0xAB);
    }

    #[test]
    fn writable_range() {
        assert!(RPLIDAR_CONF_WRITABLE_RANGE.contains(&RPLIDAR_CONF_LIDAR_STATIC_IP_ADDR));
        assert!(!RPLIDAR_CONF_WRITABLE_RANGE.contains(&RPLIDAR_CONF_SCAN_MODE_COUNT));
    }
}
