use btleplug::{
    api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType},
    platform::{Adapter, Manager, Peripheral},
};
use futures::stream::Stream;
use std::{pin::Pin, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, TreadctlError},
    ftms::{
        CONTROL_POINT_UUID, FTMS_SERVICE_UUID, SUPPORTED_SPEED_RANGE_UUID, TRAINING_STATUS_UUID,
        TREADMILL_DATA_UUID,
    },
    types::{ConnectionParams, DeviceInfo},
};

/// How often the cached-address fast path re-checks the scan results
const ADDRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Advertised name fragments that identify walking pads which do not put
/// the FTMS UUID in their advertisement
const KNOWN_NAME_MARKERS: &[&str] = &["KS-", "WALKINGPAD", "TREADMILL"];

/// BLE manager wrapping the btleplug adapter
pub struct BleManager {
    manager: Manager,
}

impl BleManager {
    /// Create a new BLE manager
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Ble`] if the Bluetooth stack cannot be
    /// initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        Ok(Self { manager })
    }

    async fn adapter(&self) -> Result<Adapter> {
        let adapters = self.manager.adapters().await?;
        adapters
            .into_iter()
            .next()
            .ok_or(TreadctlError::DeviceNotFound)
    }

    /// Scan for FTMS devices for the full scan window
    ///
    /// Returns discovered devices in advertisement order; connecting takes
    /// the head of the list, so the first matching device wins.
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::DeviceNotFound`] if no Bluetooth adapter is
    /// available, or [`TreadctlError::Ble`] for other Bluetooth errors.
    pub async fn scan_for_devices(
        &self,
        params: &ConnectionParams,
    ) -> Result<Vec<(DeviceInfo, Peripheral)>> {
        info!("Scanning for FTMS devices...");

        let central = self.adapter().await?;
        let filter = ScanFilter {
            services: vec![FTMS_SERVICE_UUID],
        };

        central.start_scan(filter).await?;
        tokio::time::sleep(Duration::from_millis(params.scan_timeout_ms)).await;
        central.stop_scan().await?;

        let mut devices = Vec::new();
        for peripheral in central.peripherals().await? {
            if let Some(info) = ftms_device_info(&peripheral).await {
                info!("Found FTMS device: {} ({})", info.name, info.address);
                devices.push((info, peripheral));
            }
        }

        info!("Scan completed. Found {} FTMS device(s)", devices.len());
        Ok(devices)
    }

    /// Look for a peripheral with a known address, bounded by the cached
    /// timeout
    ///
    /// Scans with the FTMS filter and polls the result set so the scan can
    /// end as soon as the address shows up instead of waiting out the full
    /// window.
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Ble`] for Bluetooth errors; an address that
    /// never appears is `Ok(None)`, not an error.
    pub async fn find_by_address(
        &self,
        address: &str,
        params: &ConnectionParams,
    ) -> Result<Option<Peripheral>> {
        debug!("Looking for cached address {}", address);

        let central = self.adapter().await?;
        let filter = ScanFilter {
            services: vec![FTMS_SERVICE_UUID],
        };
        central.start_scan(filter).await?;

        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(params.cached_timeout_ms);
        let mut found = None;

        while tokio::time::Instant::now() < deadline {
            for peripheral in central.peripherals().await? {
                if peripheral.address().to_string().eq_ignore_ascii_case(address) {
                    found = Some(peripheral);
                    break;
                }
            }
            if found.is_some() {
                break;
            }
            tokio::time::sleep(ADDRESS_POLL_INTERVAL).await;
        }

        central.stop_scan().await?;
        Ok(found)
    }

    /// Connect to a peripheral and resolve the FTMS characteristics
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Timeout`] if the connect exceeds the
    /// connect timeout, [`TreadctlError::ConnectionFailed`] if the connect
    /// itself fails, or [`TreadctlError::Protocol`] if the peripheral does
    /// not expose the FTMS service or its mandatory characteristics.
    pub async fn connect(
        &self,
        peripheral: Peripheral,
        params: &ConnectionParams,
    ) -> Result<FtmsConnection> {
        let address = peripheral.address().to_string();
        info!("Connecting to {}", address);

        timeout(
            Duration::from_millis(params.connect_timeout_ms),
            peripheral.connect(),
        )
        .await
        .map_err(|_| TreadctlError::Timeout {
            timeout_ms: params.connect_timeout_ms,
        })?
        .map_err(|e| TreadctlError::ConnectionFailed(e.to_string()))?;

        peripheral.discover_services().await?;

        let services = peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == FTMS_SERVICE_UUID)
            .ok_or_else(|| {
                TreadctlError::Protocol("FTMS service not found on device".to_string())
            })?;

        let find_char = |uuid| {
            service
                .characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
        };

        let control_point = find_char(CONTROL_POINT_UUID).ok_or_else(|| {
            TreadctlError::Protocol("Control Point characteristic not found".to_string())
        })?;
        let treadmill_data = find_char(TREADMILL_DATA_UUID).ok_or_else(|| {
            TreadctlError::Protocol("Treadmill Data characteristic not found".to_string())
        })?;
        let training_status = find_char(TRAINING_STATUS_UUID);
        let speed_range = find_char(SUPPORTED_SPEED_RANGE_UUID);

        // Control point responses arrive as indications; telemetry as
        // notifications. btleplug routes both through subscribe().
        peripheral.subscribe(&control_point).await?;
        peripheral.subscribe(&treadmill_data).await?;
        if let Some(ts) = &training_status {
            peripheral.subscribe(ts).await?;
        }

        info!("Successfully connected to {}", address);

        Ok(FtmsConnection {
            peripheral,
            control_point,
            training_status,
            speed_range,
        })
    }
}

/// Active GATT connection to an FTMS machine
pub struct FtmsConnection {
    peripheral: Peripheral,
    control_point: Characteristic,
    training_status: Option<Characteristic>,
    speed_range: Option<Characteristic>,
}

impl FtmsConnection {
    /// Write a command payload to the Control Point
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Ble`] if the write fails.
    pub async fn write_control(&self, payload: &[u8]) -> Result<()> {
        debug!("Control point write: {:02X?}", payload);
        self.peripheral
            .write(&self.control_point, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Read the current Training Status, if the machine exposes it
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Ble`] if the read fails.
    pub async fn read_training_status(&self) -> Result<Option<Vec<u8>>> {
        match &self.training_status {
            Some(ts) => Ok(Some(self.peripheral.read(ts).await?)),
            None => Ok(None),
        }
    }

    /// Read the Supported Speed Range, if the machine exposes it
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Ble`] if the read fails.
    pub async fn read_speed_range(&self) -> Result<Option<Vec<u8>>> {
        match &self.speed_range {
            Some(sr) => Ok(Some(self.peripheral.read(sr).await?)),
            None => Ok(None),
        }
    }

    /// Stream of value notifications from all subscribed characteristics
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Ble`] if the stream cannot be opened.
    pub async fn notifications(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = btleplug::api::ValueNotification> + Send>>> {
        Ok(self.peripheral.notifications().await?)
    }

    /// Check if the device is still connected
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Disconnect from the device
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Ble`] if disconnection fails.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    /// Bluetooth address of the connected peripheral
    #[must_use]
    pub fn address(&self) -> String {
        self.peripheral.address().to_string()
    }
}

/// Extract [`DeviceInfo`] for a peripheral that looks like an FTMS machine
///
/// A peripheral qualifies if its advertisement carries the FTMS service
/// UUID, or if its name matches a known walking-pad marker (some pads omit
/// the service UUID from the advertisement even though they serve it).
async fn ftms_device_info(peripheral: &Peripheral) -> Option<DeviceInfo> {
    let properties = peripheral.properties().await.ok()??;

    let advertises_ftms = properties.services.contains(&FTMS_SERVICE_UUID);
    let name = properties.local_name.clone();
    let name_matches = name.as_deref().is_some_and(name_matches_ftms);

    if !advertises_ftms && !name_matches {
        return None;
    }

    Some(DeviceInfo {
        name: name.unwrap_or_else(|| "Unknown FTMS device".to_string()),
        address: properties.address.to_string(),
        rssi: properties.rssi.unwrap_or(0),
    })
}

fn name_matches_ftms(name: &str) -> bool {
    let upper = name.to_uppercase();
    let matches = KNOWN_NAME_MARKERS.iter().any(|m| upper.contains(m));
    if matches {
        warn!("Matched device '{}' by name, not by service UUID", name);
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matching() {
        assert!(name_matches_ftms("KS-AP-RQ3"));
        assert!(name_matches_ftms("WalkingPad R3"));
        assert!(name_matches_ftms("Garage treadmill"));
        assert!(!name_matches_ftms("Living Room TV"));
        assert!(!name_matches_ftms(""));
    }
}
