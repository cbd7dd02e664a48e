//! DMS (Device Management Service) subset: the mandatory capability/band
//! ceiling queries (spec §4.3, §4.4).

use crate::mask::{Band, CapabilityMask};

#[derive(Debug, Clone)]
pub enum DmsRequest {
    GetCapabilities,
    GetBandCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The device's maximum radio interface list - the universe every other
    /// mask is narrowed against (spec §4.3 "DMS is the universe").
    pub radio_interfaces: CapabilityMask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BandCapabilities {
    pub legacy: Vec<Band>,
    pub legacy_lte: Vec<Band>,
    pub extended_lte: Option<Vec<Band>>,
}

impl BandCapabilities {
    pub fn fused(&self) -> Vec<Band> {
        let mut all = self.legacy.clone();
        all.extend(self.legacy_lte.iter().copied());
        if let Some(ext) = &self.extended_lte {
            all.extend(ext.iter().copied());
        }
        all
    }
}

#[derive(Debug, Clone)]
pub enum DmsResponse {
    Capabilities(Capabilities),
    BandCapabilities(BandCapabilities),
}
