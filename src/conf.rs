//! Typed queries over the generic get/set configuration commands.
//!
//! Every function performs one full round-trip on a channel the caller has already
//! locked, with the scan loop paused.

use crate::answers::*;
use crate::base::{ByteChannel, Error, Message, Result};
use crate::cmds::*;
use crate::protocol::{read_response_body, send_command, wait_response, wait_response_header};
use crate::types::{DesiredSpeed, IpConf, ScanMode};
use byteorder::{ByteOrder, LittleEndian};
use log::{error, trace, warn};
use std::time::{Duration, Instant};

/// Reads configuration entry `conf_type`, passing `reserve` as the query parameter.
///
/// Returns the value bytes that follow the echoed type.
pub fn get_lidar_conf(
    channel: &mut dyn ByteChannel,
    conf_type: u32,
    reserve: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>> {
    trace!(
        "Getting lidar config type {:08X} with param {:?} and timeout {:?}",
        conf_type,
        reserve,
        timeout
    );
    let start = Instant::now();
    let msg = Message::with_data(RPLIDAR_CMD_GET_LIDAR_CONF, &get_conf_payload(conf_type, reserve));
    send_command(channel, &msg)?;

    let header = wait_response_header(channel, timeout)?;
    if header.ans_type != RPLIDAR_ANS_TYPE_GET_LIDAR_CONF {
        error!(
            "Unexpected response type for GET_LIDAR_CONF: got {:02X}, expected {:02X}",
            header.ans_type, RPLIDAR_ANS_TYPE_GET_LIDAR_CONF
        );
        return Err(Error::invalid_data(format!(
            "unexpected response type for GET_LIDAR_CONF: got {:02X}",
            header.ans_type
        )));
    }
    if header.size <= 4 {
        error!("GET_LIDAR_CONF response too short: len {}", header.size);
        return Err(Error::invalid_data("GET_LIDAR_CONF response too short"));
    }

    let mut data = read_response_body(channel, &header, timeout.saturating_sub(start.elapsed()))?;
    let resp_conf_type = LittleEndian::read_u32(&data[0..4]);
    if resp_conf_type != conf_type {
        error!(
            "GET_LIDAR_CONF response config type mismatch: got {:08X}, expected {:08X}",
            resp_conf_type, conf_type
        );
        return Err(Error::invalid_data("response config type mismatch"));
    }

    let value = data.split_off(4);
    trace!(
        "Lidar config {:08X} value ({} bytes): {:02X?}",
        conf_type,
        value.len(),
        value
    );
    Ok(value)
}

/// Writes configuration entry `conf_type`. Only writable types are accepted.
pub fn set_lidar_conf(
    channel: &mut dyn ByteChannel,
    conf_type: u32,
    value: &[u8],
    timeout: Duration,
) -> Result<()> {
    if !RPLIDAR_CONF_WRITABLE_RANGE.contains(&conf_type) {
        warn!("Refusing to write read-only config type {:08X}", conf_type);
        return Err(Error::invalid_data(format!(
            "config type {:08X} is not writable",
            conf_type
        )));
    }
    trace!("Setting lidar config type {:08X} to {:02X?}", conf_type, value);

    let payload = set_conf_payload(conf_type, value);
    if payload.len() > u8::MAX as usize {
        return Err(Error::operation_fail("config value too large"));
    }
    send_command(channel, &Message::with_data(RPLIDAR_CMD_SET_LIDAR_CONF, &payload))?;

    let response: ResponseSetLidarConf = wait_response(channel, timeout)?;
    if response.conf_type != conf_type {
        error!(
            "SET_LIDAR_CONF response config type mismatch: got {:08X}, expected {:08X}",
            response.conf_type, conf_type
        );
        return Err(Error::invalid_data("response config type mismatch"));
    }
    if response.result != 0 {
        error!(
            "Device rejected config type {:08X}: result {}",
            conf_type, response.result
        );
        return Err(Error::operation_fail(format!(
            "device rejected config {:08X} with result {}",
            conf_type, response.result
        )));
    }
    Ok(())
}

fn require_len(data: &[u8], len: usize, what: &str) -> Result<()> {
    if data.len() < len {
        error!("{} response too short: {} < {}", what, data.len(), len);
        return Err(Error::invalid_data(format!("{} response too short", what)));
    }
    Ok(())
}

fn mode_param(scan_mode: u16) -> [u8; 2] {
    let mut param = [0; 2];
    LittleEndian::write_u16(&mut param, scan_mode);
    param
}

pub fn get_scan_mode_count(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<u16> {
    let data = get_lidar_conf(channel, RPLIDAR_CONF_SCAN_MODE_COUNT, &[], timeout)?;
    require_len(&data, 2, "scan mode count")?;
    let count = LittleEndian::read_u16(&data);
    trace!("Parsed scan mode count: {}", count);
    Ok(count)
}

pub fn get_typical_scan_mode(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<u16> {
    let data = get_lidar_conf(channel, RPLIDAR_CONF_SCAN_MODE_TYPICAL, &[], timeout)?;
    require_len(&data, 2, "typical scan mode")?;
    let mode = LittleEndian::read_u16(&data);
    trace!("Parsed typical scan mode ID: {}", mode);
    Ok(mode)
}

/// Sample duration of `scan_mode` in microseconds.
pub fn get_scan_mode_us_per_sample(
    channel: &mut dyn ByteChannel,
    scan_mode: u16,
    timeout: Duration,
) -> Result<f32> {
    let data = get_lidar_conf(
        channel,
        RPLIDAR_CONF_SCAN_MODE_US_PER_SAMPLE,
        &mode_param(scan_mode),
        timeout,
    )?;
    require_len(&data, 4, "us_per_sample")?;
    Ok(LittleEndian::read_u32(&data) as f32 / 256f32)
}

/// Maximum distance of `scan_mode` in meters.
pub fn get_scan_mode_max_distance(
    channel: &mut dyn ByteChannel,
    scan_mode: u16,
    timeout: Duration,
) -> Result<f32> {
    let data = get_lidar_conf(
        channel,
        RPLIDAR_CONF_SCAN_MODE_MAX_DISTANCE,
        &mode_param(scan_mode),
        timeout,
    )?;
    require_len(&data, 4, "max_distance")?;
    Ok(LittleEndian::read_u32(&data) as f32 / 256f32)
}

pub fn get_scan_mode_ans_type(
    channel: &mut dyn ByteChannel,
    scan_mode: u16,
    timeout: Duration,
) -> Result<u8> {
    let data = get_lidar_conf(
        channel,
        RPLIDAR_CONF_SCAN_MODE_ANS_TYPE,
        &mode_param(scan_mode),
        timeout,
    )?;
    require_len(&data, 1, "ans_type")?;
    Ok(data[0])
}

pub fn get_scan_mode_name(
    channel: &mut dyn ByteChannel,
    scan_mode: u16,
    timeout: Duration,
) -> Result<String> {
    let data = get_lidar_conf(
        channel,
        RPLIDAR_CONF_SCAN_MODE_NAME,
        &mode_param(scan_mode),
        timeout,
    )?;
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    match std::str::from_utf8(&data[..end]) {
        Ok(name) => Ok(name.to_owned()),
        Err(e) => {
            error!("Invalid UTF-8 in scan mode name for mode {}: {}", scan_mode, e);
            Err(Error::invalid_data("invalid scan mode name"))
        }
    }
}

pub fn get_scan_mode(
    channel: &mut dyn ByteChannel,
    scan_mode: u16,
    timeout: Duration,
) -> Result<ScanMode> {
    trace!("Getting full scan mode info for mode {}", scan_mode);
    Ok(ScanMode {
        id: scan_mode,
        us_per_sample: get_scan_mode_us_per_sample(channel, scan_mode, timeout)?,
        max_distance: get_scan_mode_max_distance(channel, scan_mode, timeout)?,
        ans_type: get_scan_mode_ans_type(channel, scan_mode, timeout)?,
        name: get_scan_mode_name(channel, scan_mode, timeout)?,
    })
}

pub fn get_all_scan_modes(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<Vec<ScanMode>> {
    let count = get_scan_mode_count(channel, timeout)?;
    let mut modes = Vec::with_capacity(count as usize);
    for id in 0..count {
        modes.push(get_scan_mode(channel, id, timeout)?);
    }
    Ok(modes)
}

/// Speed the device would like to run at, in both RPM and PWM terms.
pub fn get_desired_speed(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<DesiredSpeed> {
    let data = get_lidar_conf(channel, RPLIDAR_CONF_DESIRED_ROT_FREQ, &[], timeout)?;
    require_len(&data, 4, "desired speed")?;
    Ok(DesiredSpeed {
        rpm: LittleEndian::read_u16(&data[0..2]),
        pwm_ref: LittleEndian::read_u16(&data[2..4]),
    })
}

/// Lower and upper motor speed bounds, in RPM.
pub fn get_rot_freq_range(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<(u16, u16)> {
    let min = get_lidar_conf(channel, RPLIDAR_CONF_MIN_ROT_FREQ, &[], timeout)?;
    require_len(&min, 2, "min rot freq")?;
    let max = get_lidar_conf(channel, RPLIDAR_CONF_MAX_ROT_FREQ, &[], timeout)?;
    require_len(&max, 2, "max rot freq")?;
    Ok((LittleEndian::read_u16(&min), LittleEndian::read_u16(&max)))
}

pub fn get_ip_conf(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<IpConf> {
    let data = get_lidar_conf(channel, RPLIDAR_CONF_LIDAR_STATIC_IP_ADDR, &[], timeout)?;
    IpConf::from_bytes(&data).ok_or_else(|| Error::invalid_data("static IP response too short"))
}

pub fn set_ip_conf(channel: &mut dyn ByteChannel, conf: &IpConf, timeout: Duration) -> Result<()> {
    set_lidar_conf(channel, RPLIDAR_CONF_LIDAR_STATIC_IP_ADDR, &conf.to_bytes(), timeout)
}

pub fn get_mac_addr(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<[u8; 6]> {
    let data = get_lidar_conf(channel, RPLIDAR_CONF_LIDAR_MAC_ADDR, &[], timeout)?;
    require_len(&data, 6, "MAC address")?;
    let mut mac = [0; 6];
    mac.copy_from_slice(&data[..6]);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::mock::{response, MockChannel};
    use std::net::Ipv4Addr;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn conf_reply(conf_type: u32, value: &[u8]) -> Vec<u8> {
        let mut body = conf_type.to_le_bytes().to_vec();
        body.extend_from_slice(value);
        response(RPLIDAR_ANS_TYPE_GET_LIDAR_CONF, &body, false)
    }

    #[test]
    fn get_conf_returns_value_after_type() {
        let mut channel = MockChannel::new();
        channel.respond_conf(RPLIDAR_CONF_SCAN_MODE_COUNT, &[3, 0]);

        assert_eq!(get_scan_mode_count(&mut channel, TIMEOUT).unwrap(), 3);
        let commands = channel.commands();
        assert_eq!(commands[0].0, RPLIDAR_CMD_GET_LIDAR_CONF);
        assert_eq!(commands[0].1.len(), 4 + RPLIDAR_CONF_QUERY_RESERVED_SIZE);
        assert_eq!(&commands[0].1[0..4], &[0x70, 0, 0, 0]);
    }

    #[test]
    fn get_conf_rejects_mismatched_type() {
        let mut channel = MockChannel::new();
        channel.respond(
            RPLIDAR_CMD_GET_LIDAR_CONF,
            conf_reply(RPLIDAR_CONF_SCAN_MODE_TYPICAL, &[1, 0]),
        );
        let result = get_scan_mode_count(&mut channel, TIMEOUT);
        assert!(matches!(result, Err(Error::InvalidData { .. })));
    }

    #[test]
    fn get_conf_rejects_empty_value() {
        let mut channel = MockChannel::new();
        channel.respond(
            RPLIDAR_CMD_GET_LIDAR_CONF,
            conf_reply(RPLIDAR_CONF_SCAN_MODE_COUNT, &[]),
        );
        let result = get_lidar_conf(&mut channel, RPLIDAR_CONF_SCAN_MODE_COUNT, &[], TIMEOUT);
        assert!(matches!(result, Err(Error::InvalidData { .. })));
    }

    #[test]
    fn get_conf_times_out() {
        let mut channel = MockChannel::new();
        let result = get_scan_mode_count(&mut channel, Duration::from_millis(20));
        assert!(matches!(result, Err(Error::OperationTimeout)));
    }

    #[test]
    fn scan_mode_fields() {
        let mut channel = MockChannel::new();
        channel.respond_conf(RPLIDAR_CONF_SCAN_MODE_US_PER_SAMPLE, &(63u32 * 256).to_le_bytes());
        channel.respond_conf(RPLIDAR_CONF_SCAN_MODE_MAX_DISTANCE, &(12u32 * 256 + 128).to_le_bytes());
        channel.respond_conf(
            RPLIDAR_CONF_SCAN_MODE_ANS_TYPE,
            &[RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED_ULTRA],
        );
        channel.respond_conf(RPLIDAR_CONF_SCAN_MODE_NAME, b"Boost\0\0\0");

        let mode = get_scan_mode(&mut channel, 2, TIMEOUT).unwrap();
        assert_eq!(
            mode,
            ScanMode {
                id: 2,
                us_per_sample: 63.0,
                max_distance: 12.5,
                ans_type: RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED_ULTRA,
                name: "Boost".to_owned(),
            }
        );
        // mode id travels as the query parameter
        assert!(channel.commands().iter().all(|(_, payload)| payload[4..6] == [2, 0]));
    }

    #[test]
    fn set_conf_checks_writable_range() {
        let mut channel = MockChannel::new();
        let result = set_lidar_conf(&mut channel, RPLIDAR_CONF_SCAN_MODE_COUNT, &[1], TIMEOUT);
        assert!(matches!(result, Err(Error::InvalidData { .. })));
        assert!(channel.commands().is_empty());
    }

    #[test]
    fn set_ip_conf_round_trip() {
        let mut channel = MockChannel::new();
        let mut ack = RPLIDAR_CONF_LIDAR_STATIC_IP_ADDR.to_le_bytes().to_vec();
        ack.extend_from_slice(&0u32.to_le_bytes());
        channel.respond(
            RPLIDAR_CMD_SET_LIDAR_CONF,
            response(RPLIDAR_ANS_TYPE_SET_LIDAR_CONF, &ack, false),
        );

        let conf = IpConf {
            ip_addr: Ipv4Addr::new(192, 168, 11, 2),
            net_mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 11, 1),
        };
        set_ip_conf(&mut channel, &conf, TIMEOUT).unwrap();
        let commands = channel.commands();
        assert_eq!(commands[0].0, RPLIDAR_CMD_SET_LIDAR_CONF);
        assert_eq!(&commands[0].1[4..], &conf.to_bytes());
    }

    #[test]
    fn set_conf_reports_device_rejection() {
        let mut channel = MockChannel::new();
        let mut nack = RPLIDAR_CONF_LIDAR_STATIC_IP_ADDR.to_le_bytes().to_vec();
        nack.extend_from_slice(&1u32.to_le_bytes());
        channel.respond(
            RPLIDAR_CMD_SET_LIDAR_CONF,
            response(RPLIDAR_ANS_TYPE_SET_LIDAR_CONF, &nack, false),
        );
        let result = set_lidar_conf(&mut channel, RPLIDAR_CONF_LIDAR_STATIC_IP_ADDR, &[0; 12], TIMEOUT);
        assert!(matches!(result, Err(Error::OperationFail { .. })));
    }

    #[test]
    fn mac_and_motor_bounds() {
        let mut channel = MockChannel::new();
        channel.respond_conf(RPLIDAR_CONF_LIDAR_MAC_ADDR, &[1, 2, 3, 4, 5, 6]);
        channel.respond_conf(RPLIDAR_CONF_MIN_ROT_FREQ, &300u16.to_le_bytes());
        channel.respond_conf(RPLIDAR_CONF_MAX_ROT_FREQ, &1200u16.to_le_bytes());
        channel.respond_conf(RPLIDAR_CONF_DESIRED_ROT_FREQ, &[0x58, 0x02, 0x94, 0x02]);

        assert_eq!(get_mac_addr(&mut channel, TIMEOUT).unwrap(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(get_rot_freq_range(&mut channel, TIMEOUT).unwrap(), (300, 1200));
        assert_eq!(
            get_desired_speed(&mut channel, TIMEOUT).unwrap(),
            DesiredSpeed { rpm: 600, pwm_ref: 660 }
        );
    }
}
