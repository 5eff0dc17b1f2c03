use bytes::Bytes;
use futures::stream::StreamExt;
use std::{sync::Arc, time::{Duration, SystemTime}};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    ble::{BleManager, FtmsConnection},
    cache::AddressCache,
    error::{Result, TreadctlError},
    ftms::{
        self, ControlResponse, TreadmillData, CONTROL_POINT_UUID, TRAINING_STATUS_UUID,
        TREADMILL_DATA_UUID,
    },
    types::{ConnectionParams, DeviceInfo, DeviceStatus, SpeedRange},
};

/// Session with a connected FTMS machine
///
/// `FtmsDevice` owns the single open BLE connection and exposes the five
/// control operations (start/resume, stop, pause, set speed) plus a live
/// telemetry snapshot. Connecting tries the cached address first with a
/// short timeout, then falls back to a discovery scan filtered by the FTMS
/// service UUID; the first matching device wins.
///
/// Control-point writes are serialized: FTMS machines do not tolerate
/// concurrent control-point operations, so a second command waits until
/// the previous response indication (or its timeout) has been consumed.
///
/// # Examples
///
/// ```no_run
/// use treadctl::{AddressCache, ConnectionParams, FtmsDevice};
///
/// #[tokio::main]
/// async fn main() -> treadctl::Result<()> {
///     let cache = AddressCache::open_default()?;
///     let device = FtmsDevice::connect(&cache, ConnectionParams::default()).await?;
///
///     device.start_resume().await?;
///     device.set_speed(3.5).await?;
///
///     let status = device.status().await;
///     println!("{} at {:.1} km/h", status.state, status.speed_kmh);
///
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct FtmsDevice {
    connection: FtmsConnection,
    info: DeviceInfo,
    status: Arc<RwLock<DeviceStatus>>,
    speed_range: SpeedRange,
    params: ConnectionParams,
    // Holding the receiver inside the lock makes "one control command at a
    // time" and "responses pair with my write" the same guarantee.
    control: Mutex<mpsc::UnboundedReceiver<ControlResponse>>,
}

impl FtmsDevice {
    /// Connect to an FTMS machine, cached address first, scan fallback
    ///
    /// On success the connected address is persisted to `cache`,
    /// overwriting any prior value. A failing cached attempt is logged and
    /// falls through to the scan; a cache that cannot be written only
    /// produces a warning.
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::DeviceNotFound`] if neither the cached
    /// address nor the scan yields a device, or any connection error from
    /// the attempt that was made.
    pub async fn connect(cache: &AddressCache, params: ConnectionParams) -> Result<Self> {
        let manager = BleManager::new().await?;

        if let Some(address) = cache.load() {
            info!("Trying cached address {}", address);
            match Self::connect_cached(&manager, &address, &params).await {
                Ok(device) => {
                    if let Err(e) = cache.save(&device.info.address) {
                        warn!("Failed to refresh cached address: {}", e);
                    }
                    return Ok(device);
                }
                Err(e) => {
                    warn!("Cached address failed ({}), falling back to scan", e);
                }
            }
        }

        let devices = manager.scan_for_devices(&params).await?;
        let (info, peripheral) = devices
            .into_iter()
            .next()
            .ok_or(TreadctlError::DeviceNotFound)?;

        let device = Self::establish(&manager, info, peripheral, params).await?;
        if let Err(e) = cache.save(&device.info.address) {
            warn!("Failed to cache device address: {}", e);
        }
        Ok(device)
    }

    async fn connect_cached(
        manager: &BleManager,
        address: &str,
        params: &ConnectionParams,
    ) -> Result<Self> {
        let peripheral = manager
            .find_by_address(address, params)
            .await?
            .ok_or(TreadctlError::DeviceNotFound)?;

        let info = DeviceInfo {
            name: address.to_string(),
            address: address.to_string(),
            rssi: 0,
        };
        Self::establish(manager, info, peripheral, params.clone()).await
    }

    async fn establish(
        manager: &BleManager,
        mut info: DeviceInfo,
        peripheral: btleplug::platform::Peripheral,
        params: ConnectionParams,
    ) -> Result<Self> {
        use btleplug::api::Peripheral as _;

        if let Ok(Some(properties)) = peripheral.properties().await {
            if let Some(name) = properties.local_name {
                info.name = name;
            }
        }

        let connection = manager.connect(peripheral, &params).await?;

        let status = Arc::new(RwLock::new(DeviceStatus::default()));
        let (cp_tx, cp_rx) = mpsc::unbounded_channel();
        spawn_notification_router(&connection, Arc::clone(&status), cp_tx).await?;

        let mut device = Self {
            connection,
            info,
            status,
            speed_range: SpeedRange::default(),
            params,
            control: Mutex::new(cp_rx),
        };

        // FTMS requires control to be requested before any other
        // control-point operation is permitted.
        device.send_command(ftms::request_control()).await?.into_result()?;

        device.prime_state().await;

        Ok(device)
    }

    /// Seed the snapshot and speed range from readable characteristics
    async fn prime_state(&mut self) {
        match self.connection.read_training_status().await {
            Ok(Some(payload)) => match ftms::parse_training_status(&payload) {
                Ok(state) => {
                    let mut status = self.status.write().await;
                    status.state = state;
                }
                Err(e) => warn!("Ignoring unreadable training status: {}", e),
            },
            Ok(None) => debug!("Machine exposes no Training Status characteristic"),
            Err(e) => warn!("Training status read failed: {}", e),
        }

        match self.connection.read_speed_range().await {
            Ok(Some(payload)) => match ftms::parse_speed_range(&payload) {
                Ok(range) => {
                    info!(
                        "Machine speed range {:.1}-{:.1} km/h (step {:.2})",
                        range.min, range.max, range.step
                    );
                    self.speed_range = range;
                }
                Err(e) => warn!("Ignoring unreadable speed range: {}", e),
            },
            Ok(None) => debug!("Machine exposes no Supported Speed Range characteristic"),
            Err(e) => warn!("Speed range read failed: {}", e),
        }
    }

    /// Device information captured at discovery time
    #[must_use]
    pub const fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Speed range accepted by [`FtmsDevice::set_speed`]
    #[must_use]
    pub const fn speed_range(&self) -> SpeedRange {
        self.speed_range
    }

    /// Current telemetry snapshot
    pub async fn status(&self) -> DeviceStatus {
        self.status.read().await.clone()
    }

    /// Check if the machine is still connected
    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Start or resume the belt
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::CommandRejected`] if the machine refuses,
    /// or [`TreadctlError::Timeout`] if no response indication arrives.
    pub async fn start_resume(&self) -> Result<()> {
        info!("Starting (or resuming) machine");
        self.send_command(ftms::start_or_resume()).await?.into_result()
    }

    /// Stop the belt
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::CommandRejected`] if the machine refuses,
    /// or [`TreadctlError::Timeout`] if no response indication arrives.
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping machine");
        self.send_command(ftms::stop()).await?.into_result()
    }

    /// Pause the belt
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::CommandRejected`] if the machine refuses,
    /// or [`TreadctlError::Timeout`] if no response indication arrives.
    pub async fn pause(&self) -> Result<()> {
        info!("Pausing machine");
        self.send_command(ftms::pause()).await?.into_result()
    }

    /// Set the target belt speed in km/h
    ///
    /// The value is validated against the machine's supported range before
    /// anything is written, so an out-of-range speed never reaches the
    /// device and the previous target stays in effect.
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::InvalidParameters`] for out-of-range
    /// speeds, [`TreadctlError::CommandRejected`] if the machine refuses
    /// the value anyway, or [`TreadctlError::Timeout`] on a missing
    /// response.
    pub async fn set_speed(&self, speed_kmh: f32) -> Result<()> {
        validate_speed(&self.speed_range, speed_kmh)?;

        info!("Setting target speed to {:.1} km/h", speed_kmh);
        self.send_command(ftms::set_target_speed(speed_kmh))
            .await?
            .into_result()
    }

    /// Disconnect from the machine
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Ble`] if disconnection fails.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}", self.info.address);
        self.connection.disconnect().await
    }

    /// Write a control-point command and wait for its response indication
    async fn send_command(&self, payload: Bytes) -> Result<ControlResponse> {
        let mut responses = self.control.lock().await;

        // Drop stale indications from machine-initiated state changes so
        // the next recv pairs with this write.
        while responses.try_recv().is_ok() {}

        self.connection.write_control(&payload).await?;

        let response = await_response(&mut responses, self.params.command_timeout_ms).await?;
        debug!(
            "Control point response: opcode {:#04X} -> {}",
            response.request_opcode, response.code
        );
        Ok(response)
    }
}

/// Wait for the next control-point response, bounded by the command timeout
async fn await_response(
    responses: &mut mpsc::UnboundedReceiver<ControlResponse>,
    timeout_ms: u64,
) -> Result<ControlResponse> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), responses.recv()).await {
        Ok(Some(response)) => Ok(response),
        Ok(None) => Err(TreadctlError::Disconnected),
        Err(_) => Err(TreadctlError::Timeout { timeout_ms }),
    }
}

/// Spawn the task that routes notifications into the shared snapshot and
/// the control-point response channel
///
/// The task ends when the notification stream does, which happens on
/// disconnect; it holds no lock while parked on the stream.
async fn spawn_notification_router(
    connection: &FtmsConnection,
    status: Arc<RwLock<DeviceStatus>>,
    cp_tx: mpsc::UnboundedSender<ControlResponse>,
) -> Result<()> {
    let mut stream = connection.notifications().await?;

    tokio::spawn(async move {
        while let Some(notification) = stream.next().await {
            match notification.uuid {
                uuid if uuid == CONTROL_POINT_UUID => {
                    match ControlResponse::from_bytes(&notification.value) {
                        Ok(response) => {
                            if cp_tx.send(response).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Bad control point indication: {}", e),
                    }
                }
                uuid if uuid == TREADMILL_DATA_UUID => {
                    match ftms::parse_treadmill_data(&notification.value) {
                        Ok(data) => {
                            let mut snapshot = status.write().await;
                            apply_treadmill_data(&mut snapshot, &data);
                        }
                        Err(e) => warn!("Bad treadmill data notification: {}", e),
                    }
                }
                uuid if uuid == TRAINING_STATUS_UUID => {
                    match ftms::parse_training_status(&notification.value) {
                        Ok(state) => {
                            let mut snapshot = status.write().await;
                            snapshot.state = state;
                            snapshot.updated_at = SystemTime::now();
                        }
                        Err(e) => warn!("Bad training status notification: {}", e),
                    }
                }
                other => debug!("Ignoring notification from {}", other),
            }
        }
        debug!("Notification stream ended");
    });

    Ok(())
}

/// Fold one Treadmill Data notification into the snapshot
///
/// Absent fields leave the previous values untouched; machines rotate
/// which fields they include across notifications.
fn apply_treadmill_data(snapshot: &mut DeviceStatus, data: &TreadmillData) {
    if let Some(speed) = data.speed_kmh {
        snapshot.speed_kmh = speed;
    }
    if let Some(distance) = data.distance_m {
        snapshot.distance_m = distance;
    }
    if let Some(elapsed) = data.elapsed_s {
        snapshot.elapsed_s = u32::from(elapsed);
    }
    if let Some(energy) = data.energy_kcal {
        snapshot.energy_kcal = u32::from(energy);
    }
    snapshot.updated_at = SystemTime::now();
}

/// Validate a target speed against the machine's supported range
fn validate_speed(range: &SpeedRange, speed_kmh: f32) -> Result<()> {
    if !speed_kmh.is_finite() || !range.contains(speed_kmh) {
        return Err(TreadctlError::InvalidParameters(format!(
            "speed {speed_kmh:.1} km/h is out of range ({:.1}-{:.1})",
            range.min, range.max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ftms::ResultCode, types::TrainingState};

    #[test]
    fn test_validate_speed() {
        let range = SpeedRange::default();
        assert!(validate_speed(&range, 3.5).is_ok());
        assert!(validate_speed(&range, 1.0).is_ok());
        assert!(validate_speed(&range, 12.0).is_ok());

        assert!(matches!(
            validate_speed(&range, 99.0),
            Err(TreadctlError::InvalidParameters(_))
        ));
        assert!(validate_speed(&range, 0.5).is_err());
        assert!(validate_speed(&range, f32::NAN).is_err());
    }

    #[test]
    fn test_apply_treadmill_data_merges_fields() {
        let mut snapshot = DeviceStatus::default();

        apply_treadmill_data(
            &mut snapshot,
            &TreadmillData {
                speed_kmh: Some(4.5),
                distance_m: Some(1240),
                ..Default::default()
            },
        );
        assert!((snapshot.speed_kmh - 4.5).abs() < 0.001);
        assert_eq!(snapshot.distance_m, 1240);

        // A notification without distance keeps the previous total.
        apply_treadmill_data(
            &mut snapshot,
            &TreadmillData {
                speed_kmh: Some(4.6),
                elapsed_s: Some(125),
                energy_kcal: Some(12),
                ..Default::default()
            },
        );
        assert!((snapshot.speed_kmh - 4.6).abs() < 0.001);
        assert_eq!(snapshot.distance_m, 1240);
        assert_eq!(snapshot.elapsed_s, 125);
        assert_eq!(snapshot.energy_kcal, 12);
        assert_eq!(snapshot.state, TrainingState::Idle);
    }

    #[tokio::test]
    async fn test_await_response_pairs_with_indication() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ControlResponse {
            request_opcode: 0x07,
            code: ResultCode::Success,
        })
        .unwrap();

        let response = await_response(&mut rx, 1000).await.unwrap();
        assert_eq!(response.request_opcode, 0x07);
        assert_eq!(response.code, ResultCode::Success);
    }

    #[tokio::test]
    async fn test_await_response_times_out_without_indication() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<ControlResponse>();
        assert!(matches!(
            await_response(&mut rx, 10).await,
            Err(TreadctlError::Timeout { timeout_ms: 10 })
        ));
    }

    #[tokio::test]
    async fn test_await_response_reports_disconnect() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ControlResponse>();
        drop(tx);
        assert!(matches!(
            await_response(&mut rx, 1000).await,
            Err(TreadctlError::Disconnected)
        ));
    }
}
