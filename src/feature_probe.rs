//! Feature Probe Cache (spec §4.2): per-device memoization of which optional
//! TLVs/services a subsystem supports.

use std::future::Future;

use crate::error::Error;

/// A feature's support tri-state (spec §3, §9: "model explicitly as a
/// three-valued sum rather than two booleans").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tristate {
    #[default]
    Unknown,
    Unsupported,
    Supported,
}

impl Tristate {
    pub fn is_supported(self) -> bool {
        matches!(self, Tristate::Supported)
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Tristate::Unknown)
    }
}

/// The three NAS/LOC feature probes this core memoizes (spec §3 Device
/// Context: "feature tri-states for NAS-System-Selection-Preference,
/// NAS-Technology-Preference, Extended-LTE-Band-Preference").
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureProbeCache {
    pub system_selection_preference: Tristate,
    pub technology_preference: Tristate,
    pub extended_lte_band_preference: Tristate,
}

impl FeatureProbeCache {
    pub const fn new() -> Self {
        Self {
            system_selection_preference: Tristate::Unknown,
            technology_preference: Tristate::Unknown,
            extended_lte_band_preference: Tristate::Unknown,
        }
    }
}

/// Runs `probe` at most once per device per feature: `unknown -> {unsupported,
/// supported}` is a one-shot transition (spec §3 invariant). A transport-level
/// failure marks the feature `unsupported`; any other outcome (success, or a
/// non-fatal protocol error such as `no-effect`/`not-provisioned`) marks it
/// `supported` - the device answered the request at all, which is what this
/// probe is checking for (spec §4.2). Returns the probe's payload alongside
/// the resulting state, so callers that need the response (capability/mode
/// preference payloads) and callers that only need the tri-state (band
/// preference presence) can share one primitive.
pub async fn probe_once<T, Fut>(state: &mut Tristate, probe: Fut) -> (Tristate, Option<T>)
where
    Fut: Future<Output = Result<T, Error>>,
{
    if *state != Tristate::Unknown {
        return (*state, None);
    }
    match probe.await {
        Ok(value) => {
            *state = Tristate::Supported;
            (*state, Some(value))
        }
        Err(Error::Transport(_)) => {
            *state = Tristate::Unsupported;
            (*state, None)
        }
        Err(_) => {
            *state = Tristate::Supported;
            (*state, None)
        }
    }
}
