//! NAS (Network Access Service) subset: system-selection-preference and
//! technology-preference dialogs (spec §4.3, §4.4), plus operating-mode control
//! used by the reset step (spec §4.3 "reset").

use crate::mask::{Band, CapabilityMask, ModeMask, RadioInterface};

/// How long a Set-System-Selection-Preference / Set-Technology-Preference change
/// should persist across power cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permanence {
    Volatile,
    Permanent,
}

/// Operating-mode values used to drive the reset dialog (spec §4.3 "reset" step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Online,
    Offline,
    Reset,
}

/// Legacy + extended-LTE band TLVs layered together (spec §4.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BandPreference {
    pub legacy: Vec<Band>,
    pub legacy_lte: Vec<Band>,
    /// `Some` only when the device honours the extended-LTE-band TLV; its mere
    /// presence in a response promotes that feature to `supported` (spec §4.4).
    pub extended_lte: Option<Vec<Band>>,
}

impl BandPreference {
    /// Fuse legacy + extended entries into one flat list (spec §4.4 Load).
    pub fn fused(&self) -> Vec<Band> {
        let mut all = self.legacy.clone();
        all.extend(self.legacy_lte.iter().copied());
        if let Some(ext) = &self.extended_lte {
            all.extend(ext.iter().copied());
        }
        all
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemSelectionPreference {
    /// RAT family preference used by Set/Load-Current-*Capabilities*
    /// (spec §4.3 "mode-preference mask") - shares its bit space with the DMS
    /// capability mask.
    pub mode_preference: Option<CapabilityMask>,
    /// Generation-level allowed-mode restriction used by Set/Load-Current-
    /// *Modes* (spec §4.3) - the same underlying wire field as
    /// `mode_preference`, reinterpreted at 2G/3G/4G/5G granularity by that
    /// entry point instead of RAT-family granularity.
    pub mode_mask: Option<ModeMask>,
    /// 2G/3G/4G acquisition order, used to express a preferred mode
    /// (spec §4.3 Set/Load-Current-Modes).
    pub acquisition_order: Option<Vec<RadioInterface>>,
    pub acquisition_order_2g_3g: Option<RadioInterface>,
    pub bands: Option<BandPreference>,
}

#[derive(Debug, Clone)]
pub enum NasRequest {
    GetSystemSelectionPreference,
    SetSystemSelectionPreference {
        mode_preference: Option<CapabilityMask>,
        mode_mask: Option<ModeMask>,
        acquisition_order: Option<Vec<RadioInterface>>,
        acquisition_order_2g_3g: Option<RadioInterface>,
        bands: Option<BandPreference>,
        duration: Permanence,
    },
    GetTechnologyPreference,
    SetTechnologyPreference {
        mask: CapabilityMask,
    },
    SetOperatingMode {
        mode: OperatingMode,
    },
}

#[derive(Debug, Clone)]
pub enum NasResponse {
    SystemSelectionPreference(SystemSelectionPreference),
    TechnologyPreference(CapabilityMask),
    Ack,
}
