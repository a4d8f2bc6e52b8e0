//! # Rplidar Driver Core
//!
//! `rplidar_core` is the transport-independent core of a driver for Slamtec RPLIDAR
//! series laser sensors. It frames commands, negotiates scan modes through the
//! configuration protocol, decodes every measurement stream encoding and runs the
//! acquisition loop that publishes complete revolutions.
//!
//! The byte transport is supplied by the caller through [`ByteChannel`]; any
//! `Read + Write` stream can be adapted with [`StreamChannel`].

extern crate byteorder;
extern crate crc32fast;
extern crate crossbeam_channel;
extern crate log;
extern crate parking_lot;

mod answers;
pub mod base;
mod checksum;
mod cmds;
mod conf;
mod internals;
mod parsers;
mod protocol;
mod scan_loop;
pub mod types;
pub mod utils;

pub use crate::answers::ResponseSampleRate;
pub use crate::base::{ByteChannel, Error, Result, StreamChannel};
pub use crate::internals::DriverConfig;
pub use crate::parsers::varbitscale::{varbitscale_decode, varbitscale_encode};
pub use crate::scan_loop::ScanState;
pub use crate::types::{
    DesiredSpeed, DeviceInfo, Health, IpConf, MeasurementNode, MotorCtrlSupport, MotorInfo,
    ScanMode, ScanOptions,
};
pub use crate::utils::ascend_scan_data;

use crate::answers::*;
use crate::base::{share_channel, Message, SharedChannel};
use crate::cmds::*;
use crate::internals::*;
use crate::parsers::ScanDecoder;
use crate::protocol::{send_command, wait_response, wait_response_header};
use crate::scan_loop::ScanLoop;
use log::{debug, error, info, trace, warn};
use std::thread;
use std::time::Duration;

/// Model ids from this major up drive their motor with an RPM set point.
const RPLIDAR_TOF_MINUM_MAJOR_ID: u8 = 6;

/// Model ids from this major up may carry an accessory board with PWM motor control.
const RPLIDAR_A2A3_MINUM_MAJOR_ID: u8 = 2;

/// Control interface for one RPLIDAR device.
///
/// The driver owns the channel once connected. Commands and the background scan
/// loop share it; any command issued while scanning stops the scan first, and it
/// is up to the caller to start scanning again afterwards.
#[derive(Debug)]
pub struct LidarDriver {
    config: DriverConfig,
    channel: Option<SharedChannel>,
    scan_loop: ScanLoop,
    motor_ctrl_support: MotorCtrlSupport,
    // fetched once per connection
    device_info: Option<DeviceInfo>,
    config_support: Option<bool>,
    scan_modes: Option<Vec<ScanMode>>,
    typical_scan_mode: Option<u16>,
}

impl Default for LidarDriver {
    fn default() -> LidarDriver {
        LidarDriver::new()
    }
}

impl LidarDriver {
    /// Creates a driver with the default [`DriverConfig`].
    pub fn new() -> LidarDriver {
        LidarDriver::with_config(DriverConfig::default())
    }

    /// Creates a driver with custom timeouts and buffer sizes.
    ///
    /// # Example
    /// ```ignore
    /// # use rplidar_core::{DriverConfig, LidarDriver};
    /// # use std::time::Duration;
    /// let config = DriverConfig::default()
    ///     .with_command_timeout(Duration::from_millis(500))
    ///     .with_revolution_capacity(8192);
    /// let mut lidar = LidarDriver::with_config(config);
    /// ```
    pub fn with_config(config: DriverConfig) -> LidarDriver {
        trace!("Creating new LidarDriver with {:?}", config);
        LidarDriver {
            config,
            channel: None,
            scan_loop: ScanLoop::new(),
            motor_ctrl_support: MotorCtrlSupport::None,
            device_info: None,
            config_support: None,
            scan_modes: None,
            typical_scan_mode: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Takes ownership of `channel` and probes the motor control capability.
    ///
    /// A failed probe does not fail the connection: the device can still scan,
    /// only motor speed control stays disabled.
    ///
    /// # Example
    /// ```ignore
    /// # use rplidar_core::{LidarDriver, StreamChannel};
    /// # use std::time::Duration;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let port = serialport::new("/dev/ttyUSB0", 115200)
    ///     .timeout(Duration::from_millis(1))
    ///     .open()?;
    /// let mut lidar = LidarDriver::new();
    /// lidar.connect(Box::new(StreamChannel::new(port)))?;
    /// println!("{}", lidar.get_device_info()?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect(&mut self, channel: Box<dyn ByteChannel>) -> Result<()> {
        if self.channel.is_some() {
            debug!("connect called while already connected");
            return Err(Error::AlreadyDone);
        }
        info!("Connecting to lidar");
        self.channel = Some(share_channel(channel));

        match self.check_motor_ctrl_support() {
            Ok(support) => debug!("Motor control support: {:?}", support),
            Err(e) => {
                warn!("Could not determine motor control support: {}", e);
                self.motor_ctrl_support = MotorCtrlSupport::None;
            }
        }
        Ok(())
    }

    /// Stops any running scan and closes the channel.
    pub fn disconnect(&mut self) {
        self.scan_loop.stop();
        if let Some(channel) = self.channel.take() {
            info!("Disconnecting from lidar");
            channel.lock().close();
        }
        self.forget_device();
    }

    /// Drops everything learned about the device since `connect`.
    fn forget_device(&mut self) {
        self.motor_ctrl_support = MotorCtrlSupport::None;
        self.device_info = None;
        self.config_support = None;
        self.scan_modes = None;
        self.typical_scan_mode = None;
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan_loop.state()
    }

    /// Returns `true` while the acquisition thread is running.
    pub fn is_scanning(&self) -> bool {
        self.scan_loop.is_running()
    }

    /// Motor control capability found by the last probe.
    pub fn motor_ctrl_support(&self) -> MotorCtrlSupport {
        self.motor_ctrl_support
    }

    /// Gets the device information (model, firmware, hardware, serial number).
    /// Uses the configured command timeout.
    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        let timeout = self.config.command_timeout;
        self.get_device_info_with_timeout(timeout)
    }

    /// Gets the device information with a specified timeout.
    ///
    /// # Arguments
    ///
    /// * `timeout` - The maximum duration to wait for the full answer.
    pub fn get_device_info_with_timeout(&mut self, timeout: Duration) -> Result<DeviceInfo> {
        trace!("Getting device info with timeout: {:?}", timeout);
        let info = self.with_channel(|channel| {
            send_command(channel, &Message::new(RPLIDAR_CMD_GET_DEVICE_INFO))?;
            wait_response::<DeviceInfo>(channel, timeout)
        });
        match &info {
            Ok(info) => {
                trace!(
                    "Device info: model {:02X}, firmware {}.{:02}",
                    info.model,
                    info.firmware_major(),
                    info.firmware_minor()
                );
                self.device_info = Some(info.clone());
            }
            Err(e) => error!("Failed to get device info: {}", e),
        }
        info
    }

    /// Device information of this connection, queried only the first time.
    fn cached_device_info(&mut self) -> Result<DeviceInfo> {
        if let Some(info) = &self.device_info {
            return Ok(info.clone());
        }
        self.get_device_info()
    }

    /// Gets the device health. [`Health::Error`] means the device needs a reset.
    pub fn get_health(&mut self) -> Result<Health> {
        let timeout = self.config.command_timeout;
        self.get_health_with_timeout(timeout)
    }

    pub fn get_health_with_timeout(&mut self, timeout: Duration) -> Result<Health> {
        trace!("Getting device health with timeout: {:?}", timeout);
        let resp = self.with_channel(|channel| {
            send_command(channel, &Message::new(RPLIDAR_CMD_GET_DEVICE_HEALTH))?;
            wait_response::<ResponseDeviceHealth>(channel, timeout)
        })?;

        match resp.to_health() {
            Some(health) => {
                trace!("Device health: {:?}", health);
                Ok(health)
            }
            None => {
                error!("Unknown health status {:02X}", resp.status);
                Err(Error::invalid_data(format!(
                    "unknown health status {:02X}",
                    resp.status
                )))
            }
        }
    }

    /// Sample durations of the two legacy scan modes, in microseconds.
    pub fn get_sample_duration(&mut self) -> Result<ResponseSampleRate> {
        let timeout = self.config.command_timeout;
        trace!("Getting sample duration");
        self.with_channel(|channel| {
            send_command(channel, &Message::new(RPLIDAR_CMD_GET_SAMPLERATE))?;
            wait_response::<ResponseSampleRate>(channel, timeout)
        })
    }

    /// Sends the core reset command. The device reboots and must be probed again.
    pub fn reset(&mut self) -> Result<()> {
        trace!("Sending RESET command ({:02X})", RPLIDAR_CMD_RESET);
        self.with_channel(|channel| send_command(channel, &Message::new(RPLIDAR_CMD_RESET)))?;
        self.forget_device();
        Ok(())
    }

    /// Tells whether the device understands the configuration protocol.
    ///
    /// The device info must be known first; then the scan mode count is asked
    /// for with the probe timeout and only that answer decides. Failing to get the
    /// device info is reported as an error. The outcome is kept until `disconnect`.
    pub fn check_support_config_commands(&mut self) -> Result<bool> {
        if let Some(supported) = self.config_support {
            return Ok(supported);
        }
        self.cached_device_info()?;
        let timeout = self.config.probe_timeout;
        let queried = self.with_channel(|channel| conf::get_scan_mode_count(channel, timeout));
        let supported = match queried {
            Ok(count) => {
                debug!("Configuration protocol supported ({} scan modes)", count);
                true
            }
            Err(e) => {
                debug!("Configuration protocol not supported: {}", e);
                false
            }
        };
        self.config_support = Some(supported);
        Ok(supported)
    }

    pub fn get_scan_mode_count(&mut self) -> Result<u16> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::get_scan_mode_count(channel, timeout))
    }

    /// Gets the scan mode the device recommends.
    ///
    /// Devices without configuration protocol fall back to the express mode.
    pub fn get_typical_scan_mode(&mut self) -> Result<u16> {
        if let Some(mode) = self.typical_scan_mode {
            return Ok(mode);
        }
        let mode = if self.check_support_config_commands()? {
            let timeout = self.config.command_timeout;
            self.with_channel(|channel| conf::get_typical_scan_mode(channel, timeout))?
        } else {
            trace!("Using legacy typical scan mode");
            RPLIDAR_CONF_SCAN_COMMAND_EXPRESS
        };
        self.typical_scan_mode = Some(mode);
        Ok(mode)
    }

    pub fn get_scan_mode_us_per_sample(&mut self, scan_mode: u16) -> Result<f32> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::get_scan_mode_us_per_sample(channel, scan_mode, timeout))
    }

    pub fn get_scan_mode_max_distance(&mut self, scan_mode: u16) -> Result<f32> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::get_scan_mode_max_distance(channel, scan_mode, timeout))
    }

    pub fn get_scan_mode_ans_type(&mut self, scan_mode: u16) -> Result<u8> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::get_scan_mode_ans_type(channel, scan_mode, timeout))
    }

    pub fn get_scan_mode_name(&mut self, scan_mode: u16) -> Result<String> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::get_scan_mode_name(channel, scan_mode, timeout))
    }

    /// Gets the full description of one scan mode.
    pub fn get_scan_mode(&mut self, scan_mode: u16) -> Result<ScanMode> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::get_scan_mode(channel, scan_mode, timeout))
    }

    /// Gets every scan mode supported by the device.
    ///
    /// Devices without configuration protocol report the fixed Standard and
    /// Express modes.
    pub fn get_all_supported_scan_modes(&mut self) -> Result<Vec<ScanMode>> {
        if let Some(modes) = &self.scan_modes {
            return Ok(modes.clone());
        }
        let modes = if self.check_support_config_commands()? {
            let timeout = self.config.command_timeout;
            self.with_channel(|channel| conf::get_all_scan_modes(channel, timeout))?
        } else {
            trace!("Reporting legacy scan modes");
            vec![
                legacy_scan_mode(RPLIDAR_CONF_SCAN_COMMAND_STD),
                legacy_scan_mode(RPLIDAR_CONF_SCAN_COMMAND_EXPRESS),
            ]
        };
        trace!("Supported scan modes: {:?}", modes);
        self.scan_modes = Some(modes.clone());
        Ok(modes)
    }

    /// Looks `scan_mode` up in the supported modes, asking the device only for
    /// ids it did not list.
    fn lookup_scan_mode(&mut self, scan_mode: u16, support_config: bool) -> Result<ScanMode> {
        if !support_config {
            return Ok(legacy_scan_mode(scan_mode));
        }
        let modes = self.get_all_supported_scan_modes()?;
        match modes.into_iter().find(|mode| mode.id == scan_mode) {
            Some(mode) => Ok(mode),
            None => {
                warn!("Scan mode {} not listed by the device", scan_mode);
                self.get_scan_mode(scan_mode)
            }
        }
    }

    /// Starts scanning with the typical scan mode, or the standard one when
    /// `use_typical` is `false`.
    ///
    /// # Arguments
    ///
    /// * `force` - Start measuring without waiting for the motor to be stable.
    /// * `use_typical` - Use the mode the device recommends.
    ///
    /// # Example
    /// ```ignore
    /// let mode = lidar.start_scan(false, true)?;
    /// println!("Scanning in {} mode", mode.name);
    /// let revolution = lidar.grab_scan_data()?;
    /// ```
    pub fn start_scan(&mut self, force: bool, use_typical: bool) -> Result<ScanMode> {
        trace!("start_scan(force: {}, use_typical: {})", force, use_typical);
        if let Err(e) = self.start_motor() {
            warn!("Failed to start motor: {}", e);
        }
        let support_config = self.check_support_config_commands()?;

        if use_typical {
            let typical = self.get_typical_scan_mode()?;
            return self.start_scan_express(force, typical);
        }

        let scan_mode = self.lookup_scan_mode(RPLIDAR_CONF_SCAN_COMMAND_STD, support_config)?;
        self.start_scan_normal(force)?;
        Ok(scan_mode)
    }

    /// Starts scanning as described by `options`.
    pub fn start_scan_with_options(&mut self, options: &ScanOptions) -> Result<ScanMode> {
        trace!("Starting scan with options: {:?}", options);
        let scan_mode = match options.scan_mode {
            Some(mode) => mode,
            None => self.get_typical_scan_mode()?,
        };
        self.start_scan_express_with_flags(options.force_scan, scan_mode, options.options)
    }

    /// Starts a legacy (5-byte node) scan.
    pub fn start_scan_normal(&mut self, force: bool) -> Result<()> {
        self.ensure_ready_to_scan()?;
        self.stop()?;
        if let Err(e) = self.set_motor_speed(None) {
            warn!("Failed to set motor speed: {}", e);
        }

        let cmd = if force {
            RPLIDAR_CMD_FORCE_SCAN
        } else {
            RPLIDAR_CMD_SCAN
        };
        trace!("Starting legacy scan with command {:02X}", cmd);
        self.start_stream(&Message::new(cmd), RPLIDAR_ANS_TYPE_MEASUREMENT)
    }

    /// Starts scanning in `scan_mode`.
    ///
    /// Modes streaming legacy nodes fall back to [`start_scan_normal`](Self::start_scan_normal);
    /// every other mode goes through the express scan command.
    pub fn start_scan_express(&mut self, force: bool, scan_mode: u16) -> Result<ScanMode> {
        self.start_scan_express_with_flags(force, scan_mode, 0)
    }

    fn start_scan_express_with_flags(
        &mut self,
        force: bool,
        scan_mode: u16,
        flags: u32,
    ) -> Result<ScanMode> {
        trace!(
            "start_scan_express(force: {}, mode: {}, flags: {:08X})",
            force,
            scan_mode,
            flags
        );
        self.ensure_ready_to_scan()?;
        self.stop()?;

        let support_config = self.check_support_config_commands()?;
        let mode = self.lookup_scan_mode(scan_mode, support_config)?;

        if (!support_config || mode.ans_type == RPLIDAR_ANS_TYPE_MEASUREMENT)
            && scan_mode == RPLIDAR_CONF_SCAN_COMMAND_STD
        {
            debug!("Mode {} streams legacy nodes, using the standard scan", scan_mode);
            self.start_scan_normal(force)?;
            return Ok(mode);
        }

        if let Err(e) = self.start_motor() {
            warn!("Failed to start motor: {}", e);
        }

        let working_mode = if !support_config
            && (scan_mode == RPLIDAR_CONF_SCAN_COMMAND_STD
                || scan_mode == RPLIDAR_CONF_SCAN_COMMAND_EXPRESS)
        {
            0
        } else {
            scan_mode as u8
        };
        let payload = ExpressScanPayload {
            working_mode,
            working_flags: flags as u16,
            param: 0,
        };
        trace!("Express scan payload: {:?}", payload);
        self.start_stream(
            &Message::with_data(RPLIDAR_CMD_EXPRESS_SCAN, &payload.to_bytes()),
            mode.ans_type,
        )?;
        info!("Scanning in mode {} ({})", mode.id, mode.name);
        Ok(mode)
    }

    fn ensure_ready_to_scan(&self) -> Result<()> {
        if self.channel.is_none() {
            return Err(Error::operation_fail("not connected"));
        }
        if self.is_scanning() {
            debug!("Scan already running");
            return Err(Error::AlreadyDone);
        }
        Ok(())
    }

    /// Sends a scan start command, validates the stream header against
    /// `ans_type` and hands the channel to the scan loop.
    fn start_stream(&mut self, msg: &Message, ans_type: u8) -> Result<()> {
        let decoder = ScanDecoder::for_ans_type(ans_type)?;
        let channel = self.disable_data_grabbing()?;
        let timeout = self.config.command_timeout;

        self.scan_loop.set_state(ScanState::Starting);
        let header = {
            let mut chan = channel.lock();
            send_command(&mut **chan, msg).and_then(|()| wait_response_header(&mut **chan, timeout))
        };
        let header = match header {
            Ok(header) => header,
            Err(e) => {
                error!("No scan answer header: {}", e);
                self.scan_loop.set_state(ScanState::Idle);
                return Err(e);
            }
        };

        if header.ans_type != ans_type {
            error!(
                "Unexpected scan answer type: expected {:02X}, got {:02X}",
                ans_type, header.ans_type
            );
            self.scan_loop.set_state(ScanState::Idle);
            return Err(Error::invalid_data(format!(
                "unexpected scan answer type {:02X}",
                header.ans_type
            )));
        }
        if (header.size as usize) < decoder.frame_size() {
            error!(
                "Scan answer announces {} byte frames, {} expected",
                header.size,
                decoder.frame_size()
            );
            self.scan_loop.set_state(ScanState::Idle);
            return Err(Error::invalid_data("scan answer frame size too small"));
        }

        self.scan_loop.spawn(
            channel,
            decoder,
            self.config.scan_read_timeout,
            self.config.revolution_capacity,
        )
    }

    /// Stops scanning: ends the scan loop, sends the stop command and, on PWM
    /// controlled devices, stops the motor after the settle delay.
    pub fn stop(&mut self) -> Result<()> {
        let channel = self.disable_data_grabbing()?;
        trace!("Sending STOP command ({:02X})", RPLIDAR_CMD_STOP);
        send_command(&mut **channel.lock(), &Message::new(RPLIDAR_CMD_STOP))?;

        thread::sleep(self.config.motor_settle_delay);
        channel.lock().flush()?;

        if self.motor_ctrl_support == MotorCtrlSupport::Pwm {
            self.set_motor_speed(Some(0))?;
        }
        Ok(())
    }

    /// Waits for the next complete revolution and copies it into `nodes`.
    ///
    /// Returns the number of nodes copied, which is at most `nodes.len()`. The
    /// revolution is consumed even if it did not fit.
    pub fn grab_scan_data_hq(&self, nodes: &mut [MeasurementNode], timeout: Duration) -> Result<usize> {
        let revolution = self.scan_loop.mailbox().recv_timeout(timeout)?;
        if revolution.is_empty() {
            return Err(Error::OperationTimeout);
        }
        let count = nodes.len().min(revolution.len());
        if count < revolution.len() {
            warn!(
                "Revolution of {} nodes truncated to {}",
                revolution.len(),
                count
            );
        }
        nodes[..count].copy_from_slice(&revolution[..count]);
        trace!("Grabbed {} nodes", count);
        Ok(count)
    }

    /// Waits for the next complete revolution using the configured command timeout.
    pub fn grab_scan_data(&self) -> Result<Vec<MeasurementNode>> {
        self.grab_scan_data_with_timeout(self.config.command_timeout)
    }

    pub fn grab_scan_data_with_timeout(&self, timeout: Duration) -> Result<Vec<MeasurementNode>> {
        let revolution = self.scan_loop.mailbox().recv_timeout(timeout)?;
        if revolution.is_empty() {
            return Err(Error::OperationTimeout);
        }
        trace!("Grabbed {} nodes", revolution.len());
        Ok(revolution)
    }

    /// See [`utils::ascend_scan_data`].
    pub fn ascend_scan_data(&self, nodes: &mut [MeasurementNode]) -> Result<()> {
        utils::ascend_scan_data(nodes)
    }

    /// Scan frequency in Hz of a revolution of `count` samples taken in `scan_mode`.
    pub fn get_frequency(scan_mode: &ScanMode, count: usize) -> f32 {
        if count == 0 || scan_mode.us_per_sample <= 0f32 {
            return 0f32;
        }
        1_000_000f32 / (count as f32 * scan_mode.us_per_sample)
    }

    /// Probes how the motor speed can be controlled and remembers the answer.
    pub fn check_motor_ctrl_support(&mut self) -> Result<MotorCtrlSupport> {
        let info = self.cached_device_info()?;
        let major = info.major_model();

        let support = if major >= RPLIDAR_TOF_MINUM_MAJOR_ID {
            MotorCtrlSupport::Rpm
        } else if major >= RPLIDAR_A2A3_MINUM_MAJOR_ID {
            let timeout = self.config.command_timeout;
            let flag = self.with_channel(|channel| {
                send_command(
                    channel,
                    &Message::with_data(RPLIDAR_CMD_GET_ACC_BOARD_FLAG, &0u32.to_le_bytes()),
                )?;
                wait_response::<ResponseAccBoardFlag>(channel, timeout)
            })?;
            trace!("Accessory board flag: {:08X}", flag.support_flag);
            if flag.support_flag & RPLIDAR_RESP_ACC_BOARD_FLAG_MOTOR_CTRL_SUPPORT_MASK != 0 {
                MotorCtrlSupport::Pwm
            } else {
                MotorCtrlSupport::None
            }
        } else {
            MotorCtrlSupport::None
        };

        self.motor_ctrl_support = support;
        Ok(support)
    }

    /// Sets the motor speed: a PWM duty on accessory-board devices, RPM otherwise.
    ///
    /// `None` uses the speed the device itself asks for. Does nothing on devices
    /// without motor control.
    pub fn set_motor_speed(&mut self, speed: Option<u16>) -> Result<()> {
        let support = self.motor_ctrl_support;
        let cmd = match support {
            MotorCtrlSupport::Pwm => RPLIDAR_CMD_SET_MOTOR_PWM,
            MotorCtrlSupport::Rpm => RPLIDAR_CMD_HQ_MOTOR_SPEED_CTRL,
            MotorCtrlSupport::None => {
                trace!("No motor control, ignoring speed {:?}", speed);
                return Ok(());
            }
        };
        let timeout = self.config.command_timeout;

        let speed = match speed {
            Some(speed) => speed,
            None => {
                let desired = self.with_channel(|channel| conf::get_desired_speed(channel, timeout))?;
                match support {
                    MotorCtrlSupport::Pwm => desired.pwm_ref,
                    _ => desired.rpm,
                }
            }
        };

        trace!("Setting motor speed to {} with command {:02X}", speed, cmd);
        self.with_channel(|channel| {
            send_command(channel, &Message::with_data(cmd, &speed.to_le_bytes()))
        })
    }

    /// Starts the motor at the configured default speed.
    pub fn start_motor(&mut self) -> Result<()> {
        let speed = self.config.default_motor_speed;
        trace!("Starting motor with default speed ({})", speed);
        self.set_motor_speed(Some(speed))
    }

    pub fn stop_motor(&mut self) -> Result<()> {
        trace!("Stopping motor");
        self.set_motor_speed(Some(0))
    }

    /// Gets the speed range and desired speed of the motor.
    pub fn get_motor_info(&mut self) -> Result<MotorInfo> {
        let support = self.motor_ctrl_support;
        if support == MotorCtrlSupport::None {
            return Err(Error::OperationNotSupport);
        }
        let timeout = self.config.command_timeout;
        let (min_speed, max_speed, desired) = self.with_channel(|channel| {
            let (min_speed, max_speed) = conf::get_rot_freq_range(channel, timeout)?;
            let desired = conf::get_desired_speed(channel, timeout)?;
            Ok((min_speed, max_speed, desired))
        })?;

        Ok(MotorInfo {
            motor_ctrl_support: support,
            desired_speed: match support {
                MotorCtrlSupport::Pwm => desired.pwm_ref,
                _ => desired.rpm,
            },
            min_speed,
            max_speed,
        })
    }

    /// Writes a configuration entry. Only types in `0x0001_0000..=0x0001_FFFF` are writable.
    pub fn set_lidar_conf(&mut self, conf_type: u32, value: &[u8]) -> Result<()> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::set_lidar_conf(channel, conf_type, value, timeout))
    }

    /// Sets the static IP configuration of network-attached devices.
    pub fn set_lidar_ip_conf(&mut self, ip_conf: &IpConf) -> Result<()> {
        trace!("Setting IP configuration: {:?}", ip_conf);
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::set_ip_conf(channel, ip_conf, timeout))
    }

    pub fn get_lidar_ip_conf(&mut self) -> Result<IpConf> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::get_ip_conf(channel, timeout))
    }

    pub fn get_device_mac_addr(&mut self) -> Result<[u8; 6]> {
        let timeout = self.config.command_timeout;
        self.with_channel(|channel| conf::get_mac_addr(channel, timeout))
    }

    /// Stops the scan loop so the caller gets exclusive use of the channel.
    fn disable_data_grabbing(&mut self) -> Result<SharedChannel> {
        let channel = match &self.channel {
            Some(channel) => channel.clone(),
            None => {
                debug!("Command issued while not connected");
                return Err(Error::operation_fail("not connected"));
            }
        };
        if self.scan_loop.is_running() {
            debug!("Pausing data grabbing for a command");
        }
        self.scan_loop.stop();
        Ok(channel)
    }

    /// Runs one command round-trip with the channel locked.
    fn with_channel<R>(&mut self, f: impl FnOnce(&mut dyn ByteChannel) -> Result<R>) -> Result<R> {
        let channel = self.disable_data_grabbing()?;
        let mut chan = channel.lock();
        f(&mut **chan)
    }
}

fn legacy_scan_mode(scan_mode: u16) -> ScanMode {
    if scan_mode == RPLIDAR_CONF_SCAN_COMMAND_STD {
        ScanMode {
            id: RPLIDAR_CONF_SCAN_COMMAND_STD,
            us_per_sample: RPLIDAR_LEGACY_SAMPLE_DURATION_US,
            max_distance: RPLIDAR_LEGACY_MAX_DISTANCE,
            ans_type: RPLIDAR_ANS_TYPE_MEASUREMENT,
            name: "Standard".to_owned(),
        }
    } else {
        ScanMode {
            id: RPLIDAR_CONF_SCAN_COMMAND_EXPRESS,
            us_per_sample: RPLIDAR_LEGACY_SAMPLE_DURATION_US,
            max_distance: RPLIDAR_LEGACY_MAX_DISTANCE,
            ans_type: RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED,
            name: "Express".to_owned(),
        }
    }
}
