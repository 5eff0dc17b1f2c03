use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use uuid::Uuid;

use crate::{
    error::{Result, TreadctlError},
    types::{SpeedRange, TrainingState},
};

/// Build a full 128-bit UUID from a 16-bit Bluetooth SIG short UUID
///
/// Base UUID: `0000XXXX-0000-1000-8000-00805f9b34fb`.
const fn ble_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_00805f9b34fb_u128)
}

/// Fitness Machine Service UUID (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = ble_uuid(0x1826);

/// Treadmill Data characteristic UUID (0x2ACD)
pub const TREADMILL_DATA_UUID: Uuid = ble_uuid(0x2ACD);

/// Training Status characteristic UUID (0x2AD3)
pub const TRAINING_STATUS_UUID: Uuid = ble_uuid(0x2AD3);

/// Supported Speed Range characteristic UUID (0x2AD4)
pub const SUPPORTED_SPEED_RANGE_UUID: Uuid = ble_uuid(0x2AD4);

/// Fitness Machine Control Point characteristic UUID (0x2AD9)
pub const CONTROL_POINT_UUID: Uuid = ble_uuid(0x2AD9);

/// Control Point response marker (first octet of every response indication)
pub const RESPONSE_CODE: u8 = 0x80;

/// Stop/Pause parameter: stop
pub const STOP_PARAM: u8 = 0x01;

/// Stop/Pause parameter: pause
pub const PAUSE_PARAM: u8 = 0x02;

/// Control Point opcodes used by this client (FTMS spec Table 4.15)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlOpcode {
    /// Request control of the fitness machine
    RequestControl = 0x00,
    /// Reset the fitness machine
    Reset = 0x01,
    /// Set target speed
    SetTargetSpeed = 0x02,
    /// Start or resume training
    StartOrResume = 0x07,
    /// Stop or pause training (parameter selects which)
    StopOrPause = 0x08,
}

/// Control Point result codes (FTMS spec Table 4.24)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// Command accepted
    Success,
    /// Opcode not supported by this machine
    NotSupported,
    /// Parameter outside the machine's supported range
    InvalidParameter,
    /// Command could not be completed
    Failed,
    /// Control has not been granted (Request Control first)
    NotPermitted,
    /// Reserved or vendor-specific result code
    Unknown(u8),
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::Success,
            0x02 => Self::NotSupported,
            0x03 => Self::InvalidParameter,
            0x04 => Self::Failed,
            0x05 => Self::NotPermitted,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NotSupported => write!(f, "not supported"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::Failed => write!(f, "operation failed"),
            Self::NotPermitted => write!(f, "control not permitted"),
            Self::Unknown(code) => write!(f, "unknown result code {code:#04X}"),
        }
    }
}

/// Parsed Control Point response indication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlResponse {
    /// Opcode of the request this response answers
    pub request_opcode: u8,
    /// Result reported by the machine
    pub code: ResultCode,
}

impl ControlResponse {
    /// Parse a Control Point response indication: `[0x80, request opcode, result]`
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Protocol`] if the payload is too short or
    /// does not start with the response marker.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(TreadctlError::Protocol(format!(
                "control point response too short: {} bytes",
                data.len()
            )));
        }
        if data[0] != RESPONSE_CODE {
            return Err(TreadctlError::Protocol(format!(
                "unexpected control point payload, first octet {:#04X}",
                data[0]
            )));
        }

        Ok(Self {
            request_opcode: data[1],
            code: ResultCode::from(data[2]),
        })
    }

    /// Turn a non-success response into the matching error
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::CommandRejected`] unless the result code is
    /// [`ResultCode::Success`].
    pub fn into_result(self) -> Result<()> {
        match self.code {
            ResultCode::Success => Ok(()),
            code => Err(TreadctlError::CommandRejected {
                opcode: self.request_opcode,
                code,
            }),
        }
    }
}

/// Build a Request Control command
#[must_use]
pub fn request_control() -> Bytes {
    let mut buf = BytesMut::with_capacity(1);
    buf.put_u8(ControlOpcode::RequestControl as u8);
    buf.freeze()
}

/// Build a Start or Resume command
#[must_use]
pub fn start_or_resume() -> Bytes {
    let mut buf = BytesMut::with_capacity(1);
    buf.put_u8(ControlOpcode::StartOrResume as u8);
    buf.freeze()
}

/// Build a Stop command
#[must_use]
pub fn stop() -> Bytes {
    let mut buf = BytesMut::with_capacity(2);
    buf.put_u8(ControlOpcode::StopOrPause as u8);
    buf.put_u8(STOP_PARAM);
    buf.freeze()
}

/// Build a Pause command
#[must_use]
pub fn pause() -> Bytes {
    let mut buf = BytesMut::with_capacity(2);
    buf.put_u8(ControlOpcode::StopOrPause as u8);
    buf.put_u8(PAUSE_PARAM);
    buf.freeze()
}

/// Build a Set Target Speed command
///
/// Speed travels on the wire as km/h with 0.01 resolution (uint16 LE).
#[must_use]
pub fn set_target_speed(speed_kmh: f32) -> Bytes {
    let raw = (speed_kmh * 100.0).round() as u16;
    let mut buf = BytesMut::with_capacity(3);
    buf.put_u8(ControlOpcode::SetTargetSpeed as u8);
    buf.put_u16_le(raw);
    buf.freeze()
}

/// Telemetry parsed from a Treadmill Data notification (0x2ACD)
///
/// Fields are optional because the flags word decides, per notification,
/// which of them the machine included.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TreadmillData {
    /// Instantaneous speed in km/h
    pub speed_kmh: Option<f32>,
    /// Average speed in km/h
    pub avg_speed_kmh: Option<f32>,
    /// Total distance in meters
    pub distance_m: Option<u32>,
    /// Inclination in percent
    pub incline_pct: Option<f32>,
    /// Total expended energy in kcal
    pub energy_kcal: Option<u16>,
    /// Heart rate in BPM
    pub heart_rate_bpm: Option<u8>,
    /// Elapsed time in seconds
    pub elapsed_s: Option<u16>,
}

/// Parse a Treadmill Data notification
///
/// Layout: `flags (uint16 LE)` followed by the fields the flags declare,
/// in spec order. All multi-byte values are little-endian. Fields this
/// client does not surface (ramp angle, elevation gain, pace, MET,
/// remaining time, belt force) are skipped but still consume their bytes
/// so later fields stay aligned.
///
/// # Errors
///
/// Returns [`TreadctlError::Protocol`] if the payload ends before a field
/// the flags promised.
pub fn parse_treadmill_data(data: &[u8]) -> Result<TreadmillData> {
    let mut buf = data;
    if buf.remaining() < 2 {
        return Err(TreadctlError::Protocol(
            "treadmill data shorter than flags word".to_string(),
        ));
    }
    let flags = buf.get_u16_le();

    let mut out = TreadmillData::default();

    // Bit 0 is "More Data": instantaneous speed is present when it is clear.
    if flags & 0x0001 == 0 {
        out.speed_kmh = Some(f32::from(take_u16(&mut buf, "instantaneous speed")?) / 100.0);
    }

    if flags & 0x0002 != 0 {
        out.avg_speed_kmh = Some(f32::from(take_u16(&mut buf, "average speed")?) / 100.0);
    }

    if flags & 0x0004 != 0 {
        // Total distance is a uint24.
        if buf.remaining() < 3 {
            return Err(truncated("total distance"));
        }
        let lo = buf.get_u16_le();
        let hi = buf.get_u8();
        out.distance_m = Some(u32::from(lo) | (u32::from(hi) << 16));
    }

    if flags & 0x0008 != 0 {
        // Inclination (0.1 %) + ramp angle setting (0.1 degree, unused).
        if buf.remaining() < 4 {
            return Err(truncated("inclination"));
        }
        out.incline_pct = Some(f32::from(buf.get_i16_le()) / 10.0);
        buf.advance(2);
    }

    if flags & 0x0010 != 0 {
        // Positive + negative elevation gain, unused.
        skip(&mut buf, 4, "elevation gain")?;
    }

    if flags & 0x0020 != 0 {
        skip(&mut buf, 1, "instantaneous pace")?;
    }

    if flags & 0x0040 != 0 {
        skip(&mut buf, 1, "average pace")?;
    }

    if flags & 0x0080 != 0 {
        // Total energy (kcal) + energy per hour + energy per minute.
        if buf.remaining() < 5 {
            return Err(truncated("expended energy"));
        }
        out.energy_kcal = Some(buf.get_u16_le());
        buf.advance(3);
    }

    if flags & 0x0100 != 0 {
        if buf.remaining() < 1 {
            return Err(truncated("heart rate"));
        }
        out.heart_rate_bpm = Some(buf.get_u8());
    }

    if flags & 0x0200 != 0 {
        skip(&mut buf, 1, "metabolic equivalent")?;
    }

    if flags & 0x0400 != 0 {
        out.elapsed_s = Some(take_u16(&mut buf, "elapsed time")?);
    }

    // Remaining time (bit 11) and force on belt / power output (bit 12)
    // are trailing fields nothing after them depends on.

    Ok(out)
}

/// Parse a Training Status read or notification (0x2AD3)
///
/// Layout: `flags (uint8)`, `status (uint8)`, optionally followed by a
/// UTF-8 status string this client ignores.
///
/// # Errors
///
/// Returns [`TreadctlError::Protocol`] if the payload is shorter than the
/// two mandatory octets.
pub fn parse_training_status(data: &[u8]) -> Result<TrainingState> {
    if data.len() < 2 {
        return Err(TreadctlError::Protocol(format!(
            "training status too short: {} bytes",
            data.len()
        )));
    }
    Ok(TrainingState::from(data[1]))
}

/// Parse a Supported Speed Range read (0x2AD4)
///
/// Three uint16 LE values: minimum, maximum, increment, all km/h * 100.
///
/// # Errors
///
/// Returns [`TreadctlError::Protocol`] on a short payload.
pub fn parse_speed_range(data: &[u8]) -> Result<SpeedRange> {
    if data.len() < 6 {
        return Err(TreadctlError::Protocol(format!(
            "speed range too short: {} bytes",
            data.len()
        )));
    }
    let mut buf = data;
    let min = f32::from(buf.get_u16_le()) / 100.0;
    let max = f32::from(buf.get_u16_le()) / 100.0;
    let step = f32::from(buf.get_u16_le()) / 100.0;
    Ok(SpeedRange { min, max, step })
}

fn take_u16(buf: &mut &[u8], field: &str) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(truncated(field));
    }
    Ok(buf.get_u16_le())
}

fn skip(buf: &mut &[u8], n: usize, field: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(truncated(field));
    }
    buf.advance(n);
    Ok(())
}

fn truncated(field: &str) -> TreadctlError {
    TreadctlError::Protocol(format!("treadmill data truncated in {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builders() {
        assert_eq!(&request_control()[..], &[0x00]);
        assert_eq!(&start_or_resume()[..], &[0x07]);
        assert_eq!(&stop()[..], &[0x08, 0x01]);
        assert_eq!(&pause()[..], &[0x08, 0x02]);
    }

    #[test]
    fn test_set_target_speed_encoding() {
        // 2.50 km/h -> 250 = 0x00FA
        assert_eq!(&set_target_speed(2.5)[..], &[0x02, 0xFA, 0x00]);
        // 12.00 km/h -> 1200 = 0x04B0
        assert_eq!(&set_target_speed(12.0)[..], &[0x02, 0xB0, 0x04]);
    }

    #[test]
    fn test_control_response_parsing() {
        let ok = ControlResponse::from_bytes(&[0x80, 0x07, 0x01]).unwrap();
        assert_eq!(ok.request_opcode, 0x07);
        assert_eq!(ok.code, ResultCode::Success);
        assert!(ok.into_result().is_ok());

        let rejected = ControlResponse::from_bytes(&[0x80, 0x02, 0x03]).unwrap();
        assert_eq!(rejected.code, ResultCode::InvalidParameter);
        assert!(matches!(
            rejected.into_result(),
            Err(TreadctlError::CommandRejected {
                opcode: 0x02,
                code: ResultCode::InvalidParameter,
            })
        ));

        assert!(ControlResponse::from_bytes(&[0x80, 0x07]).is_err());
        assert!(ControlResponse::from_bytes(&[0x42, 0x07, 0x01]).is_err());
    }

    #[test]
    fn test_parse_treadmill_data_speed_only() {
        // Flags 0x0000: only instantaneous speed. 500 -> 5.00 km/h.
        let data = [0x00, 0x00, 0xF4, 0x01];
        let parsed = parse_treadmill_data(&data).unwrap();
        assert!((parsed.speed_kmh.unwrap() - 5.0).abs() < 0.001);
        assert!(parsed.distance_m.is_none());
        assert!(parsed.elapsed_s.is_none());
    }

    #[test]
    fn test_parse_treadmill_data_distance_and_elapsed() {
        // Flags 0x0404: bits 2 (total distance) and 10 (elapsed time).
        // Speed 450 -> 4.50 km/h, distance 1240 m, elapsed 125 s.
        let data = [0x04, 0x04, 0xC2, 0x01, 0xD8, 0x04, 0x00, 0x7D, 0x00];
        let parsed = parse_treadmill_data(&data).unwrap();
        assert!((parsed.speed_kmh.unwrap() - 4.5).abs() < 0.001);
        assert_eq!(parsed.distance_m, Some(1240));
        assert_eq!(parsed.elapsed_s, Some(125));
    }

    #[test]
    fn test_parse_treadmill_data_energy_and_heart_rate() {
        // Flags 0x0180: bits 7 (energy) and 8 (heart rate).
        // Energy total 45 kcal, per hour 120, per minute 2, HR 96.
        let data = [
            0x80, 0x01, 0x2C, 0x01, 0x2D, 0x00, 0x78, 0x00, 0x02, 0x60,
        ];
        let parsed = parse_treadmill_data(&data).unwrap();
        assert!((parsed.speed_kmh.unwrap() - 3.0).abs() < 0.001);
        assert_eq!(parsed.energy_kcal, Some(45));
        assert_eq!(parsed.heart_rate_bpm, Some(96));
    }

    #[test]
    fn test_parse_treadmill_data_truncated() {
        // Flags promise total distance but the payload stops after speed.
        let data = [0x04, 0x00, 0xF4, 0x01];
        assert!(parse_treadmill_data(&data).is_err());
        assert!(parse_treadmill_data(&[0x00]).is_err());
    }

    #[test]
    fn test_parse_training_status() {
        assert_eq!(
            parse_training_status(&[0x00, 0x01]).unwrap(),
            TrainingState::Idle
        );
        assert_eq!(
            parse_training_status(&[0x00, 0x0D]).unwrap(),
            TrainingState::ManualMode
        );
        // String-present flag with trailing text still parses.
        let with_text = [0x01, 0x0D, b'R', b'u', b'n'];
        assert_eq!(
            parse_training_status(&with_text).unwrap(),
            TrainingState::ManualMode
        );
        assert!(parse_training_status(&[0x00]).is_err());
    }

    #[test]
    fn test_parse_speed_range() {
        // 0.50 - 6.00 km/h, 0.05 steps.
        let data = [0x32, 0x00, 0x58, 0x02, 0x05, 0x00];
        let range = parse_speed_range(&data).unwrap();
        assert!((range.min - 0.5).abs() < 0.001);
        assert!((range.max - 6.0).abs() < 0.001);
        assert!((range.step - 0.05).abs() < 0.001);

        assert!(parse_speed_range(&[0x32, 0x00]).is_err());
    }

    #[test]
    fn test_uuid_construction() {
        assert_eq!(
            FTMS_SERVICE_UUID.to_string(),
            "00001826-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CONTROL_POINT_UUID.to_string(),
            "00002ad9-0000-1000-8000-00805f9b34fb"
        );
    }
}
