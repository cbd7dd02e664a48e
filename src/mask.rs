//! Capability, mode and band bit sets (spec §3: "independent bit sets").
//!
//! `bitflags` pulls in the same kind of small bitset type the rest of this
//! corpus's modem/network-manager adjacent crates reach for rather than
//! hand-rolling one.

use bitflags::bitflags;

bitflags! {
    /// Radio access technology families a device's radio can speak (spec §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CapabilityMask: u8 {
        const GSM_UMTS = 0b0001;
        const CDMA_EVDO = 0b0010;
        const LTE = 0b0100;
        const NR5G = 0b1000;
    }

    /// Generation mask independent of `CapabilityMask` (spec §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModeMask: u8 {
        const MODE_2G = 0b0001;
        const MODE_3G = 0b0010;
        const MODE_4G = 0b0100;
        const MODE_5G = 0b1000;
    }
}

impl CapabilityMask {
    /// Fold a RAT-family capability mask onto the generation-based
    /// `ModeMask` - used when Technology Preference (which only speaks in
    /// capability-shaped bits) stands in for Set/Load-Current-Modes because
    /// System Selection Preference isn't supported (spec §4.3 Load-Current-Modes
    /// TP path).
    pub fn to_mode_mask(self) -> ModeMask {
        let mut modes = ModeMask::empty();
        if self.intersects(CapabilityMask::GSM_UMTS | CapabilityMask::CDMA_EVDO) {
            modes |= ModeMask::MODE_2G | ModeMask::MODE_3G;
        }
        if self.contains(CapabilityMask::LTE) {
            modes |= ModeMask::MODE_4G;
        }
        if self.contains(CapabilityMask::NR5G) {
            modes |= ModeMask::MODE_5G;
        }
        modes
    }
}

/// A single radio interface, used for NAS acquisition-order arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioInterface {
    Gsm,
    Umts,
    Lte,
    Nr5g,
}

impl RadioInterface {
    /// The `ModeMask` bit this radio interface belongs to.
    pub fn mode(self) -> ModeMask {
        match self {
            RadioInterface::Gsm => ModeMask::MODE_2G,
            RadioInterface::Umts => ModeMask::MODE_3G,
            RadioInterface::Lte => ModeMask::MODE_4G,
            RadioInterface::Nr5g => ModeMask::MODE_5G,
        }
    }
}

/// A requested "allowed modes + preferred mode" pair (spec §4.3 Set-Current-Modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    pub allowed: ModeMask,
    pub preferred: Option<RadioInterface>,
}

impl ModeRequest {
    /// `allowed == ANY` sentinel (spec §4.3, §9 Open Question (a)).
    pub const ANY: ModeMask = ModeMask::all();
}

/// A single radio band, opaque to this core beyond its numeric identity - the
/// real bit assignments come from the QMI band TLVs (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    /// A concrete band number as reported/accepted by the device.
    Numbered(u16),
    /// "Any supported band" - resolves to the cached supported-bands list
    /// (spec §4.4 Store).
    Any,
}
