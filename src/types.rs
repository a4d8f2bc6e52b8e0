use super::answers::RPLIDAR_RESP_HQ_FLAG_SYNCBIT;
use std::f32::consts::PI;
use std::fmt;
use std::net::Ipv4Addr;

/// One decoded measurement, in the HQ node layout every decoder produces.
///
/// `dist_mm_q2 == 0` means the beam saw no return; it is not an error marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MeasurementNode {
    /// Angle in Q14, where `1 << 14` is 90 degrees. Always below 360 degrees.
    pub angle_z_q14: u16,
    /// Distance in millimeters, Q2.
    pub dist_mm_q2: u32,
    /// Quality indicator (0-255); 0 means no valid return.
    pub quality: u8,
    /// Bit 0 marks the first node of a new revolution.
    pub flag: u8,
}

impl MeasurementNode {
    #[inline]
    pub fn angle_degrees(&self) -> f32 {
        self.angle_z_q14 as f32 * 90f32 / 16384f32
    }

    #[inline]
    pub fn set_angle_degrees(&mut self, degrees: f32) {
        self.angle_z_q14 = (degrees * 16384f32 / 90f32) as u16;
    }

    /// Angle in radians (0 to 2*PI).
    #[inline]
    pub fn angle(&self) -> f32 {
        (self.angle_z_q14 as f32) / 16384f32 / 2f32 * PI
    }

    #[inline]
    pub fn distance_mm(&self) -> f32 {
        self.dist_mm_q2 as f32 / 4f32
    }

    /// Distance in meters.
    #[inline]
    pub fn distance(&self) -> f32 {
        (self.dist_mm_q2 as f32) / 4000f32
    }

    /// Returns `true` if this node starts a new 360 degree revolution.
    #[inline]
    pub fn is_sync(&self) -> bool {
        (self.flag & RPLIDAR_RESP_HQ_FLAG_SYNCBIT) == RPLIDAR_RESP_HQ_FLAG_SYNCBIT
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.quality != 0 && self.dist_mm_q2 != 0
    }
}

/// Describes one scan mode offered by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanMode {
    pub id: u16,

    /// Time taken by a single sample, in microseconds.
    pub us_per_sample: f32,

    /// Maximum measurable distance in meters.
    pub max_distance: f32,

    /// Answer type of the measurement stream this mode produces.
    pub ans_type: u8,

    /// Human readable name, e.g. "Standard", "Express", "Boost".
    pub name: String,
}

/// Options for configuring a scan operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanOptions {
    /// Scan mode id to use. `None` picks the device's typical scan mode.
    pub scan_mode: Option<u16>,

    /// Start measuring even if the motor has not reached a stable speed.
    pub force_scan: bool,

    /// Reserved flags forwarded in the express scan request. Should be 0.
    pub options: u32,
}

impl ScanOptions {
    pub fn with_mode(scan_mode: u16) -> ScanOptions {
        ScanOptions {
            scan_mode: Some(scan_mode),
            ..ScanOptions::default()
        }
    }

    pub fn force_scan() -> ScanOptions {
        ScanOptions {
            force_scan: true,
            ..ScanOptions::default()
        }
    }

    pub fn force_scan_with_mode(scan_mode: u16) -> ScanOptions {
        ScanOptions {
            scan_mode: Some(scan_mode),
            force_scan: true,
            options: 0,
        }
    }
}

/// Health status reported by the device.
///
/// `Error` means the device needs a reset; retrying the same operation will not help.
#[derive(Debug, Clone, PartialEq)]
pub enum Health {
    Healthy,
    Warning(u16),
    Error(u16),
}

/// Identity of the connected device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub model: u8,
    /// Major version in the high byte, minor version in the low byte.
    pub firmware_version: u16,
    pub hardware_version: u8,
    pub serial_number: [u8; 16],
}

impl DeviceInfo {
    /// Model family; selects motor control capabilities.
    #[inline]
    pub fn major_model(&self) -> u8 {
        self.model >> 4
    }

    #[inline]
    pub fn sub_model(&self) -> u8 {
        self.model & 0xF
    }

    #[inline]
    pub fn firmware_major(&self) -> u8 {
        (self.firmware_version >> 8) as u8
    }

    #[inline]
    pub fn firmware_minor(&self) -> u8 {
        (self.firmware_version & 0xFF) as u8
    }

    pub fn serial_number_hex(&self) -> String {
        self.serial_number
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect()
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "S/N: {}", self.serial_number_hex())?;
        writeln!(
            f,
            "Firmware Ver: {}.{:02}",
            self.firmware_major(),
            self.firmware_minor()
        )?;
        write!(f, "Hardware Rev: {}", self.hardware_version)
    }
}

/// How the motor speed of the connected device can be controlled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MotorCtrlSupport {
    #[default]
    None,
    /// Duty cycle through the accessory board.
    Pwm,
    /// Closed-loop RPM set point.
    Rpm,
}

/// Speed set point the device suggests for itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DesiredSpeed {
    pub rpm: u16,
    pub pwm_ref: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MotorInfo {
    pub motor_ctrl_support: MotorCtrlSupport,
    /// Desired speed in the unit of `motor_ctrl_support` (PWM duty or RPM).
    pub desired_speed: u16,
    pub min_speed: u16,
    pub max_speed: u16,
}

/// Static IP configuration of network-attached devices.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IpConf {
    pub ip_addr: Ipv4Addr,
    pub net_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl IpConf {
    pub const SIZE: usize = 12;

    pub fn to_bytes(&self) -> [u8; IpConf::SIZE] {
        let mut bytes = [0; IpConf::SIZE];
        bytes[0..4].copy_from_slice(&self.ip_addr.octets());
        bytes[4..8].copy_from_slice(&self.net_mask.octets());
        bytes[8..12].copy_from_slice(&self.gateway.octets());
        bytes
    }

    /// Returns `None` if fewer than 12 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Option<IpConf> {
        if bytes.len() < IpConf::SIZE {
            return None;
        }
        let addr = |at: usize| Ipv4Addr::new(bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]);
        Some(IpConf {
            ip_addr: addr(0),
            net_mask: addr(4),
            gateway: addr(8),
        })
    }
}
