//! Device Context / Private State (spec §3) and its registry.
//!
//! Re-architected per spec §9: an explicit `DeviceContext`, looked up (not
//! created) from any entry point, lazily initialized on first access,
//! destroyed atomically with the device - the same "shared, mutex-guarded
//! state reached through a handle" shape as the teacher's `asynch::state`
//! (`Shared` behind a `Mutex<RefCell<..>>`), except guarded by a `tokio::Mutex`
//! since operations here hold it across `.await` points.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use tokio::sync::Mutex;

use crate::feature_probe::FeatureProbeCache;
use crate::mask::{Band, CapabilityMask};
use crate::qmi::pdc::{ConfigId, ConfigType};
use crate::qmi::Token;

bitflags! {
    /// Location sources a device currently exposes (spec §4.6 "Capability
    /// discovery").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LocationSourceMask: u8 {
        const GPS_NMEA = 0b001;
        const GPS_RAW = 0b010;
        const A_GPS = 0b100;
    }
}

/// Which location backend this device's Location Subsystem is bound to (spec
/// §4.6, §9 "tagged variants instead of inheritance").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationBackend {
    Pds,
    Loc,
}

/// A carrier configuration descriptor (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDescriptor {
    pub id: ConfigId,
    pub config_type: ConfigType,
    pub token: Token,
    pub version: u32,
    pub description: String,
    pub total_size: u64,
}

/// Per-device private state (spec §3). One instance per managed modem, created
/// lazily on first access and destroyed when the device is released.
#[derive(Debug, Clone, Default)]
pub struct DeviceContext {
    /// `true` once Load-Current-Capabilities has completed once (spec §7
    /// Fatal: "Load-Current-Capabilities invoked twice on the same device").
    pub capabilities_loaded: bool,
    pub capability_mask: CapabilityMask,
    /// Immutable after first load.
    pub supported_radio_interfaces: Option<CapabilityMask>,
    pub probes: FeatureProbeCache,
    /// Set for tri-mode LTE+CDMA+GSM devices to avoid a lossy reboot path
    /// (spec §3, §4.3).
    pub disable_4g_only_mode: bool,
    pub supported_bands: Option<Vec<Band>>,
    pub enabled_location_sources: LocationSourceMask,
    pub location_backend: Option<LocationBackend>,
    /// Whether a GPS session (PDS event-report / LOC nmea registration) is
    /// currently active - governs whether the retained client handle's
    /// subscription is live (spec §3, §5 "Shared resources").
    pub location_session_active: bool,
    pub assistance_data_servers: Vec<String>,
    pub max_file_size: Option<u32>,
    pub max_part_size: Option<u32>,
    pub carrier_configs: Option<Vec<ConfigDescriptor>>,
    pub active_config_index: Option<usize>,
    /// `true` when the device is using its built-in default carrier config
    /// rather than an indexed one (spec §4.5, §9 Open Question (b)).
    pub active_config_default: bool,
}

impl DeviceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// XTRA part size to use when the device hasn't advertised one (spec §4.6);
    /// `default` comes from the host application's configured
    /// `DeviceConfig::default_xtra_part_size`.
    pub fn max_part_size_or(&self, default: u32) -> u32 {
        self.max_part_size.unwrap_or(default)
    }
}

/// Owns one [`DeviceContext`] per managed modem, keyed by an opaque device id
/// supplied by the (out-of-scope) device discovery layer.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: std::sync::Mutex<HashMap<String, Arc<Mutex<DeviceContext>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the context for `device_id`, creating it lazily if this is the
    /// first access (spec §9).
    pub fn get_or_create(&self, device_id: &str) -> Arc<Mutex<DeviceContext>> {
        let mut devices = self.devices.lock().expect("device registry lock poisoned");
        devices
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DeviceContext::new())))
            .clone()
    }

    /// Destroy the context, releasing it atomically with the device (spec
    /// §3 Lifecycle).
    pub fn release(&self, device_id: &str) {
        self.devices
            .lock()
            .expect("device registry lock poisoned")
            .remove(device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazily_creates_and_reuses_context() {
        let registry = DeviceRegistry::new();
        let a = registry.get_or_create("dev0");
        let b = registry.get_or_create("dev0");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn release_drops_the_context() {
        let registry = DeviceRegistry::new();
        let handle = registry.get_or_create("dev0");
        registry.release("dev0");
        let fresh = registry.get_or_create("dev0");
        assert!(!Arc::ptr_eq(&handle, &fresh));
    }
}
