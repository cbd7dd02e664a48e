//! Ambient device configuration: per-step timeouts, the carrier-config mapping
//! file location, and SUPL/XTRA defaults. Out of scope per spec §1 beyond the
//! interface this core consumes it through; this is that interface.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables a host application supplies once per managed modem.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Default per-step timeout for QMI request/response and request/indication
    /// dialogs that don't specify their own (spec §4.1, §6).
    pub step_timeout: Duration,
    /// Path to the carrier-config mapping keyfile (spec §6).
    pub carrier_config_mapping: Option<PathBuf>,
    /// Default SUPL server, applied if the caller never calls `set_supl_server`.
    pub default_supl_server: Option<String>,
    /// Default XTRA/predicted-orbits chunk size when a device doesn't
    /// advertise its own `max_part_size` (spec §4.6).
    pub default_xtra_part_size: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            step_timeout: crate::engine::DEFAULT_STEP_TIMEOUT,
            carrier_config_mapping: None,
            default_supl_server: None,
            default_xtra_part_size: 1024,
        }
    }
}
