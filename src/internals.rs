use std::time::Duration;

/// Sample duration reported for the two fixed scan modes of devices that predate
/// the configuration protocol.
pub const RPLIDAR_LEGACY_SAMPLE_DURATION_US: f32 = 476.0;

/// Maximum distance, in meters, reported for the legacy scan modes.
pub const RPLIDAR_LEGACY_MAX_DISTANCE: f32 = 16.0;

/// Default speed used when starting the motor with `start_motor()`.
pub const RPLIDAR_DEFAULT_MOTOR_SPEED: u16 = 600;

pub const RPLIDAR_DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(2000);
pub const RPLIDAR_DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(250);
pub const RPLIDAR_DEFAULT_SCAN_READ_TIMEOUT: Duration = Duration::from_millis(2000);
pub const RPLIDAR_DEFAULT_MOTOR_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Maximum number of nodes held for one revolution.
pub const RPLIDAR_DEFAULT_REVOLUTION_CAPACITY: usize = 1400;

/// Timing and sizing knobs of a [`LidarDriver`](crate::LidarDriver).
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Budget for one command round-trip (send, header, body).
    pub command_timeout: Duration,
    /// Budget for the configuration protocol probe done by `check_support_config_commands`.
    pub probe_timeout: Duration,
    /// Budget for reading one measurement frame inside the scan loop.
    pub scan_read_timeout: Duration,
    /// Delay between stopping a scan and stopping the motor.
    pub motor_settle_delay: Duration,
    pub revolution_capacity: usize,
    pub default_motor_speed: u16,
}

impl Default for DriverConfig {
    fn default() -> DriverConfig {
        DriverConfig {
            command_timeout: RPLIDAR_DEFAULT_COMMAND_TIMEOUT,
            probe_timeout: RPLIDAR_DEFAULT_PROBE_TIMEOUT,
            scan_read_timeout: RPLIDAR_DEFAULT_SCAN_READ_TIMEOUT,
            motor_settle_delay: RPLIDAR_DEFAULT_MOTOR_SETTLE_DELAY,
            revolution_capacity: RPLIDAR_DEFAULT_REVOLUTION_CAPACITY,
            default_motor_speed: RPLIDAR_DEFAULT_MOTOR_SPEED,
        }
    }
}

impl DriverConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> DriverConfig {
        self.command_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> DriverConfig {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_scan_read_timeout(mut self, timeout: Duration) -> DriverConfig {
        self.scan_read_timeout = timeout;
        self
    }

    pub fn with_motor_settle_delay(mut self, delay: Duration) -> DriverConfig {
        self.motor_settle_delay = delay;
        self
    }

    pub fn with_revolution_capacity(mut self, capacity: usize) -> DriverConfig {
        self.revolution_capacity = capacity.max(1);
        self
    }

    pub fn with_default_motor_speed(mut self, speed: u16) -> DriverConfig {
        self.default_motor_speed = speed;
        self
    }
}
