use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};

/// Machine training state reported by the Training Status characteristic
///
/// Values follow FTMS spec Table 4.25. Walking pads spend their whole life
/// between `Idle` and `ManualMode`; the remaining states are kept so status
/// output never shows a bare number for a smarter machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingState {
    /// Machine is idle, belt stopped
    Idle,
    /// Warming up
    WarmingUp,
    /// Low intensity interval
    LowIntensityInterval,
    /// High intensity interval
    HighIntensityInterval,
    /// Recovery interval
    RecoveryInterval,
    /// Isometric exercise
    Isometric,
    /// Heart rate control program
    HeartRateControl,
    /// Fitness test in progress
    FitnessTest,
    /// Speed below the control region
    SpeedOutsideControlRegionLow,
    /// Speed above the control region
    SpeedOutsideControlRegionHigh,
    /// Cool down
    CoolDown,
    /// Watt control program
    WattControl,
    /// Manual mode (quick start) - the belt is running
    ManualMode,
    /// Pre-workout screen
    PreWorkout,
    /// Post-workout screen
    PostWorkout,
    /// Vendor-specific or reserved state
    Other(u8),
}

impl From<u8> for TrainingState {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::Idle,
            0x02 => Self::WarmingUp,
            0x03 => Self::LowIntensityInterval,
            0x04 => Self::HighIntensityInterval,
            0x05 => Self::RecoveryInterval,
            0x06 => Self::Isometric,
            0x07 => Self::HeartRateControl,
            0x08 => Self::FitnessTest,
            0x09 => Self::SpeedOutsideControlRegionLow,
            0x0A => Self::SpeedOutsideControlRegionHigh,
            0x0B => Self::CoolDown,
            0x0C => Self::WattControl,
            0x0D => Self::ManualMode,
            0x0E => Self::PreWorkout,
            0x0F => Self::PostWorkout,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for TrainingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::WarmingUp => write!(f, "WARMING_UP"),
            Self::LowIntensityInterval => write!(f, "LOW_INTENSITY_INTERVAL"),
            Self::HighIntensityInterval => write!(f, "HIGH_INTENSITY_INTERVAL"),
            Self::RecoveryInterval => write!(f, "RECOVERY_INTERVAL"),
            Self::Isometric => write!(f, "ISOMETRIC"),
            Self::HeartRateControl => write!(f, "HEART_RATE_CONTROL"),
            Self::FitnessTest => write!(f, "FITNESS_TEST"),
            Self::SpeedOutsideControlRegionLow => write!(f, "SPEED_TOO_LOW"),
            Self::SpeedOutsideControlRegionHigh => write!(f, "SPEED_TOO_HIGH"),
            Self::CoolDown => write!(f, "COOL_DOWN"),
            Self::WattControl => write!(f, "WATT_CONTROL"),
            Self::ManualMode => write!(f, "MANUAL_MODE"),
            Self::PreWorkout => write!(f, "PRE_WORKOUT"),
            Self::PostWorkout => write!(f, "POST_WORKOUT"),
            Self::Other(code) => write!(f, "OTHER({code:#04X})"),
        }
    }
}

/// Snapshot of the machine's telemetry
///
/// Refreshed from Treadmill Data and Training Status notifications by the
/// session's notification router; readers always get a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Training state
    pub state: TrainingState,
    /// Instantaneous speed in km/h
    pub speed_kmh: f32,
    /// Total distance in meters
    pub distance_m: u32,
    /// Elapsed session time in seconds
    pub elapsed_s: u32,
    /// Step count (0 for machines that do not report steps)
    pub steps: u32,
    /// Total expended energy in kcal
    pub energy_kcal: u32,
    /// When this snapshot was last updated
    pub updated_at: SystemTime,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            state: TrainingState::Idle,
            speed_kmh: 0.0,
            distance_m: 0,
            elapsed_s: 0,
            steps: 0,
            energy_kcal: 0,
            updated_at: SystemTime::now(),
        }
    }
}

/// Supported speed range read from the machine (0x2AD4)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    /// Minimum supported speed in km/h
    pub min: f32,
    /// Maximum supported speed in km/h
    pub max: f32,
    /// Speed increment in km/h
    pub step: f32,
}

impl SpeedRange {
    /// Check whether a target speed falls inside this range
    #[must_use]
    pub fn contains(&self, speed_kmh: f32) -> bool {
        speed_kmh >= self.min && speed_kmh <= self.max
    }
}

impl Default for SpeedRange {
    // WalkingPad R3 reference constraints, used until the machine's own
    // Supported Speed Range characteristic has been read.
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 12.0,
            step: 0.1,
        }
    }
}

/// Information about a discovered FTMS device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Advertised device name
    pub name: String,
    /// Bluetooth address
    pub address: String,
    /// Signal strength (RSSI) at discovery time
    pub rssi: i16,
}

/// Connection and polling parameters
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Discovery scan window in milliseconds
    pub scan_timeout_ms: u64,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Quick timeout for the cached-address attempt in milliseconds
    pub cached_timeout_ms: u64,
    /// Per-command response timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Live display refresh interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            cached_timeout_ms: 5_000,
            command_timeout_ms: 3_000,
            poll_interval_ms: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_state_from_u8() {
        assert_eq!(TrainingState::from(0x01), TrainingState::Idle);
        assert_eq!(TrainingState::from(0x0D), TrainingState::ManualMode);
        assert_eq!(TrainingState::from(0x0B), TrainingState::CoolDown);
        assert_eq!(TrainingState::from(0x42), TrainingState::Other(0x42));
    }

    #[test]
    fn test_training_state_display() {
        assert_eq!(TrainingState::ManualMode.to_string(), "MANUAL_MODE");
        assert_eq!(TrainingState::Idle.to_string(), "IDLE");
    }

    #[test]
    fn test_speed_range_contains() {
        let range = SpeedRange::default();
        assert!(range.contains(1.0));
        assert!(range.contains(3.5));
        assert!(range.contains(12.0));
        assert!(!range.contains(0.5));
        assert!(!range.contains(99.0));
    }

    #[test]
    fn test_connection_params_defaults() {
        let params = ConnectionParams::default();
        assert_eq!(params.scan_timeout_ms, 10_000);
        assert_eq!(params.cached_timeout_ms, 5_000);
        assert_eq!(params.command_timeout_ms, 3_000);
    }

    #[test]
    fn test_device_status_default() {
        let status = DeviceStatus::default();
        assert_eq!(status.state, TrainingState::Idle);
        assert!(status.speed_kmh.abs() < f32::EPSILON);
        assert_eq!(status.steps, 0);
    }
}
