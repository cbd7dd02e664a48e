//! Capability & Mode Selector (spec §4.3).

use log::{debug, info};
use tokio::time::Duration;

use crate::config::DeviceConfig;
use crate::device::DeviceContext;
use crate::engine::{is_no_effect, OperationEngine};
use crate::error::Error;
use crate::feature_probe::{probe_once, Tristate};
use crate::gateway::{ClientGateway, Transport};
use crate::mask::{CapabilityMask, ModeMask, ModeRequest, RadioInterface};
use crate::qmi::nas::{NasRequest, NasResponse, OperatingMode, Permanence, SystemSelectionPreference};
use crate::qmi::{Request, Response};

const MODE_BITS: [(ModeMask, RadioInterface); 3] = [
    (ModeMask::MODE_2G, RadioInterface::Gsm),
    (ModeMask::MODE_3G, RadioInterface::Umts),
    (ModeMask::MODE_4G, RadioInterface::Lte),
];

pub struct CapabilityAndModeSelector<'g, T: Transport> {
    engine: OperationEngine<'g, T>,
    step_timeout: Duration,
}

impl<'g, T: Transport> CapabilityAndModeSelector<'g, T> {
    pub fn new(gateway: &'g ClientGateway<T>, config: &DeviceConfig) -> Self {
        Self {
            engine: OperationEngine::new(gateway),
            step_timeout: config.step_timeout,
        }
    }

    /// Three-step sequence (spec §4.3 "Current-capabilities load").
    pub async fn load_current_capabilities(&self, ctx: &mut DeviceContext) -> Result<CapabilityMask, Error> {
        info!("loading current capabilities");
        if ctx.capabilities_loaded {
            return Err(Error::fatal(
                "Load-Current-Capabilities invoked twice on the same device",
            ));
        }

        let ssp = self.probe_ssp(ctx).await;
        let tp = self.probe_tp(ctx).await;
        let dms_mask = self.get_dms_capabilities().await?;
        ctx.supported_radio_interfaces = Some(dms_mask);

        let merged = if let Some(mode_pref) = ssp.and_then(|s| s.mode_preference) {
            dms_mask & mode_pref
        } else if let Some(tp_mask) = tp {
            dms_mask & tp_mask
        } else {
            dms_mask
        };

        ctx.capability_mask = merged;
        ctx.capabilities_loaded = true;
        debug!("current capabilities loaded: {merged:?}");
        Ok(merged)
    }

    async fn probe_ssp(&self, ctx: &mut DeviceContext) -> Option<SystemSelectionPreference> {
        let probe = async {
            match self
                .engine
                .request(Request::Nas(NasRequest::GetSystemSelectionPreference), self.step_timeout)
                .await?
            {
                Response::Nas(NasResponse::SystemSelectionPreference(p)) => Ok(Some(p)),
                _ => Ok(None),
            }
        };
        let (state, payload) = probe_once(&mut ctx.probes.system_selection_preference, probe).await;
        if state == Tristate::Unsupported {
            debug!("system-selection-preference is not supported by this device");
        }
        payload.flatten()
    }

    async fn probe_tp(&self, ctx: &mut DeviceContext) -> Option<CapabilityMask> {
        let probe = async {
            match self
                .engine
                .request(Request::Nas(NasRequest::GetTechnologyPreference), self.step_timeout)
                .await?
            {
                Response::Nas(NasResponse::TechnologyPreference(mask)) => Ok(Some(mask)),
                _ => Ok(None),
            }
        };
        let (state, payload) = probe_once(&mut ctx.probes.technology_preference, probe).await;
        if state == Tristate::Unsupported {
            debug!("technology-preference is not supported by this device");
        }
        payload.flatten()
    }

    async fn get_dms_capabilities(&self) -> Result<CapabilityMask, Error> {
        match self
            .engine
            .request(Request::Dms(crate::qmi::dms::DmsRequest::GetCapabilities), self.step_timeout)
            .await?
        {
            Response::Dms(crate::qmi::dms::DmsResponse::Capabilities(c)) => Ok(c.radio_interfaces),
            _ => Err(Error::fatal("unexpected response shape for DMS GetCapabilities")),
        }
    }

    /// State machine `first -> ssp -> tp -> reset -> last` (spec §4.3
    /// "Set-current-capabilities state machine").
    pub async fn set_current_capabilities(&self, ctx: &DeviceContext, requested: CapabilityMask) -> Result<(), Error> {
        info!("setting current capabilities to {requested:?}");
        let ssp_supported = ctx.probes.system_selection_preference.is_supported();
        let tp_supported = ctx.probes.technology_preference.is_supported();

        if !ssp_supported && !tp_supported {
            return Err(Error::unsupported(
                "neither system-selection-preference nor technology-preference is available",
            ));
        }

        if ssp_supported {
            self.engine
                .request(
                    Request::Nas(NasRequest::SetSystemSelectionPreference {
                        mode_preference: Some(requested),
                        mode_mask: None,
                        acquisition_order: None,
                        acquisition_order_2g_3g: None,
                        bands: None,
                        duration: Permanence::Permanent,
                    }),
                    self.step_timeout,
                )
                .await?;
            return self.reset().await;
        }

        match self
            .engine
            .request(
                Request::Nas(NasRequest::SetTechnologyPreference { mask: requested }),
                self.step_timeout,
            )
            .await
        {
            Ok(_) => self.reset().await,
            Err(e) if is_no_effect(&e) => {
                debug!("technology-preference set had no effect; already at the requested value");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Standalone reset entry point (spec SPEC_FULL.md §F.1), driving the same
    /// OFFLINE -> RESET sequence as the `reset` step of Set-Current-Capabilities.
    pub async fn reset(&self) -> Result<(), Error> {
        info!("resetting modem (offline -> reset)");
        self.engine
            .request(
                Request::Nas(NasRequest::SetOperatingMode { mode: OperatingMode::Offline }),
                self.step_timeout,
            )
            .await?;
        self.engine
            .request(
                Request::Nas(NasRequest::SetOperatingMode { mode: OperatingMode::Reset }),
                self.step_timeout,
            )
            .await?;
        Ok(())
    }

    /// Spec §4.3 "Set-current-modes".
    pub async fn set_current_modes(&self, ctx: &DeviceContext, mut req: ModeRequest) -> Result<(), Error> {
        info!("setting current modes: allowed={:?} preferred={:?}", req.allowed, req.preferred);
        if req.allowed == ModeRequest::ANY && req.preferred.is_none() {
            let dms = ctx
                .supported_radio_interfaces
                .ok_or_else(|| Error::fatal("Load-Current-Capabilities has not run yet"))?;
            req.allowed = dms.to_mode_mask();
        }

        if ctx.probes.system_selection_preference.is_supported() {
            let (acquisition_order, acquisition_order_2g_3g) = if req.preferred.is_some() {
                let order = Some(generic_acquisition_order(req.allowed, req.preferred));
                let order_2g_3g = if req.allowed.contains(ModeMask::MODE_2G | ModeMask::MODE_3G) {
                    req.preferred
                } else {
                    None
                };
                (order, order_2g_3g)
            } else {
                (None, None)
            };

            self.engine
                .request(
                    Request::Nas(NasRequest::SetSystemSelectionPreference {
                        mode_preference: None,
                        mode_mask: Some(req.allowed),
                        acquisition_order,
                        acquisition_order_2g_3g,
                        bands: None,
                        duration: Permanence::Permanent,
                    }),
                    self.step_timeout,
                )
                .await?;
            Ok(())
        } else if ctx.probes.technology_preference.is_supported() {
            if req.preferred.is_some() {
                return Err(Error::unsupported(
                    "technology-preference cannot express a preferred mode",
                ));
            }
            self.engine
                .request(
                    Request::Nas(NasRequest::SetTechnologyPreference {
                        mask: mode_mask_to_capability(req.allowed),
                    }),
                    self.step_timeout,
                )
                .await?;
            Ok(())
        } else {
            Err(Error::unsupported(
                "neither system-selection-preference nor technology-preference is available",
            ))
        }
    }

    /// Spec §4.3 "Load-current-modes".
    pub async fn load_current_modes(&self, ctx: &DeviceContext) -> Result<ModeRequest, Error> {
        info!("loading current modes");
        if ctx.probes.system_selection_preference.is_supported() {
            let ssp = match self
                .engine
                .request(Request::Nas(NasRequest::GetSystemSelectionPreference), self.step_timeout)
                .await?
            {
                Response::Nas(NasResponse::SystemSelectionPreference(p)) => p,
                _ => return Err(Error::fatal("unexpected response shape for GetSystemSelectionPreference")),
            };
            let allowed = ssp
                .mode_mask
                .ok_or_else(|| Error::fatal("device did not report an allowed-mode mask"))?;
            let preferred = if allowed == (ModeMask::MODE_2G | ModeMask::MODE_3G) {
                ssp.acquisition_order_2g_3g
            } else {
                ssp.acquisition_order
                    .as_ref()
                    .and_then(|order| order.iter().copied().find(|ri| allowed.contains(ri.mode())))
            };
            Ok(ModeRequest { allowed, preferred })
        } else if ctx.probes.technology_preference.is_supported() {
            let mask = match self
                .engine
                .request(Request::Nas(NasRequest::GetTechnologyPreference), self.step_timeout)
                .await?
            {
                Response::Nas(NasResponse::TechnologyPreference(mask)) => mask,
                _ => return Err(Error::fatal("unexpected response shape for GetTechnologyPreference")),
            };
            Ok(ModeRequest {
                allowed: mask.to_mode_mask(),
                preferred: None,
            })
        } else {
            Err(Error::unsupported(
                "neither system-selection-preference nor technology-preference is available",
            ))
        }
    }

}

/// Derived purely from the DMS radio interface list (spec §4.3
/// "Supported-capabilities enumeration").
pub fn load_supported_capabilities(ctx: &mut DeviceContext) -> Result<Vec<CapabilityMask>, Error> {
    let dms = ctx
        .supported_radio_interfaces
        .ok_or_else(|| Error::fatal("Load-Current-Capabilities has not run yet"))?;

    let mut combos = Vec::new();
    let has_gsm_cdma_lte = dms.contains(CapabilityMask::GSM_UMTS)
        && dms.contains(CapabilityMask::CDMA_EVDO)
        && dms.contains(CapabilityMask::LTE);
    let has_gsm_cdma_only = dms.contains(CapabilityMask::GSM_UMTS) && dms.contains(CapabilityMask::CDMA_EVDO);

    if has_gsm_cdma_lte {
        combos.push(CapabilityMask::GSM_UMTS | CapabilityMask::LTE);
        combos.push(CapabilityMask::CDMA_EVDO | CapabilityMask::LTE);
        combos.push(CapabilityMask::LTE);
        ctx.disable_4g_only_mode = true;
    } else if has_gsm_cdma_only {
        combos.push(CapabilityMask::GSM_UMTS);
        combos.push(CapabilityMask::CDMA_EVDO);
    }

    combos.push(dms);
    combos.dedup();
    Ok(combos)
}

/// Spec §4.3 "Supported-modes enumeration".
pub fn load_supported_modes(ctx: &DeviceContext) -> Result<Vec<ModeRequest>, Error> {
    let dms = ctx
        .supported_radio_interfaces
        .ok_or_else(|| Error::fatal("Load-Current-Capabilities has not run yet"))?;
    let device_modes = dms.to_mode_mask();
    let ssp_supported = ctx.probes.system_selection_preference.is_supported();
    let tp_supported = ctx.probes.technology_preference.is_supported();

    // Neither mode-selection dialog is available: the device can't be steered
    // below its full mode mask, so that's the only entry (spec §4.3, original
    // `mm_shared_qmi_load_supported_modes`'s unconditional-mask early return).
    if !ssp_supported && !tp_supported {
        return Ok(vec![ModeRequest { allowed: device_modes, preferred: None }]);
    }

    let mut result = Vec::new();
    for bitmask in 1u8..8 {
        let mut combo = ModeMask::empty();
        for (i, (bit, _)) in MODE_BITS.iter().enumerate() {
            if bitmask & (1 << i) != 0 {
                combo |= *bit;
            }
        }
        if !device_modes.contains(combo) {
            continue;
        }
        if ctx.disable_4g_only_mode && combo == ModeMask::MODE_4G {
            continue;
        }

        let member_count = MODE_BITS.iter().filter(|(bit, _)| combo.contains(*bit)).count();
        if member_count >= 2 && ssp_supported {
            for (bit, radio) in MODE_BITS.iter() {
                if combo.contains(*bit) {
                    result.push(ModeRequest {
                        allowed: combo,
                        preferred: Some(*radio),
                    });
                }
            }
        } else {
            result.push(ModeRequest {
                allowed: combo,
                preferred: None,
            });
        }
    }
    Ok(result)
}

fn mode_mask_to_capability(modes: ModeMask) -> CapabilityMask {
    let mut caps = CapabilityMask::empty();
    if modes.intersects(ModeMask::MODE_2G | ModeMask::MODE_3G) {
        caps |= CapabilityMask::GSM_UMTS;
    }
    if modes.contains(ModeMask::MODE_4G) {
        caps |= CapabilityMask::LTE;
    }
    if modes.contains(ModeMask::MODE_5G) {
        caps |= CapabilityMask::NR5G;
    }
    caps
}

/// Build the generic acquisition-order array for a wide `allowed` set: the
/// preferred mode first (if any), then the rest of `allowed` in priority
/// order 4G, 3G, 2G (spec §4.3 "its first element whose radio interface is
/// contained in `allowed` is the preferred mode").
fn generic_acquisition_order(allowed: ModeMask, preferred: Option<RadioInterface>) -> Vec<RadioInterface> {
    let mut order = Vec::new();
    if let Some(p) = preferred {
        order.push(p);
    }
    for radio in [RadioInterface::Lte, RadioInterface::Umts, RadioInterface::Gsm, RadioInterface::Nr5g] {
        if allowed.contains(radio.mode()) && Some(radio) != preferred {
            order.push(radio);
        }
    }
    order
}
