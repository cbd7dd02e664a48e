//! Band Selector (spec §4.4).

use log::{debug, info};
use tokio::time::Duration;

use crate::config::DeviceConfig;
use crate::device::DeviceContext;
use crate::engine::OperationEngine;
use crate::error::Error;
use crate::feature_probe::{probe_once, Tristate};
use crate::gateway::{ClientGateway, Transport};
use crate::mask::Band;
use crate::qmi::dms::DmsRequest;
use crate::qmi::nas::{BandPreference, NasRequest, NasResponse, Permanence};
use crate::qmi::{Request, Response};

/// Numbered bands at or above this value are LTE-class (E-UTRA) bands rather
/// than legacy GSM/UMTS bands - the only classification this core needs to
/// pick a TLV, the exact 3GPP numbering table itself lives in the transport.
const LTE_BAND_FLOOR: u16 = 65;

pub struct BandSelector<'g, T: Transport> {
    engine: OperationEngine<'g, T>,
    step_timeout: Duration,
}

impl<'g, T: Transport> BandSelector<'g, T> {
    pub fn new(gateway: &'g ClientGateway<T>, config: &DeviceConfig) -> Self {
        Self {
            engine: OperationEngine::new(gateway),
            step_timeout: config.step_timeout,
        }
    }

    /// Spec §4.4 "Load" (supported side): DMS band-capabilities, fusing
    /// legacy + legacy-LTE + extended-LTE (if present).
    pub async fn load_supported_bands(&self, ctx: &mut DeviceContext) -> Result<Vec<Band>, Error> {
        info!("loading supported bands");
        let resp = self
            .engine
            .request(Request::Dms(DmsRequest::GetBandCapabilities), self.step_timeout)
            .await?;
        let caps = match resp {
            Response::Dms(crate::qmi::dms::DmsResponse::BandCapabilities(c)) => c,
            _ => return Err(Error::fatal("unexpected response shape for DMS GetBandCapabilities")),
        };

        let fused = caps.fused();
        if fused.is_empty() {
            return Err(Error::validation("couldn't parse the list of supported bands"));
        }

        note_extended_lte_presence(&mut ctx.probes.extended_lte_band_preference, caps.extended_lte.is_some()).await;
        ctx.supported_bands = Some(fused.clone());
        Ok(fused)
    }

    /// Spec §4.4 "Load" (current side): NAS-System-Selection-Preference,
    /// same TLV layering.
    pub async fn load_current_bands(&self, ctx: &mut DeviceContext) -> Result<Vec<Band>, Error> {
        info!("loading current bands");
        let resp = self
            .engine
            .request(Request::Nas(NasRequest::GetSystemSelectionPreference), self.step_timeout)
            .await?;
        let ssp = match resp {
            Response::Nas(NasResponse::SystemSelectionPreference(p)) => p,
            _ => return Err(Error::fatal("unexpected response shape for GetSystemSelectionPreference")),
        };
        let pref = ssp
            .bands
            .ok_or_else(|| Error::validation("couldn't parse the list of current bands"))?;

        note_extended_lte_presence(&mut ctx.probes.extended_lte_band_preference, pref.extended_lte.is_some()).await;

        let fused = pref.fused();
        if fused.is_empty() {
            return Err(Error::validation("couldn't parse the list of current bands"));
        }
        Ok(fused)
    }

    /// Spec §4.4 "Store".
    pub async fn set_current_bands(&self, ctx: &DeviceContext, bands: Vec<Band>) -> Result<(), Error> {
        info!("setting current bands: {bands:?}");
        let bands = if bands.as_slice() == [Band::Any] {
            ctx.supported_bands
                .clone()
                .ok_or_else(|| Error::fatal("cannot handle 'ANY' if supported bands are unknown"))?
        } else {
            bands
        };

        let extended_supported = ctx.probes.extended_lte_band_preference.is_supported();
        let mut pref = BandPreference::default();
        for band in bands {
            match band {
                Band::Any => unreachable!("ANY was already resolved above"),
                Band::Numbered(n) if n >= LTE_BAND_FLOOR => {
                    if extended_supported {
                        pref.extended_lte.get_or_insert_with(Vec::new).push(band);
                    } else {
                        pref.legacy_lte.push(band);
                    }
                }
                Band::Numbered(_) => pref.legacy.push(band),
            }
        }

        self.engine
            .request(
                Request::Nas(NasRequest::SetSystemSelectionPreference {
                    mode_preference: None,
                    mode_mask: None,
                    acquisition_order: None,
                    acquisition_order_2g_3g: None,
                    bands: Some(pref),
                    duration: Permanence::Permanent,
                }),
                self.step_timeout,
            )
            .await?;
        Ok(())
    }
}

/// The extended-LTE-band feature is probed implicitly by whether the TLV
/// shows up in a response at all (spec §4.4 "presence promotes the
/// extended-LTE-band feature to `supported`"); it only ever transitions once.
/// Routed through the shared one-shot probe primitive rather than a hand-
/// rolled transition so the invariant lives in one place.
async fn note_extended_lte_presence(state: &mut Tristate, present: bool) {
    let probe = async {
        if present {
            Ok(())
        } else {
            Err(Error::Transport("extended-LTE-band TLV absent from response".into()))
        }
    };
    let (new_state, _) = probe_once(state, probe).await;
    if new_state == Tristate::Unsupported {
        debug!("extended-LTE-band preference is not supported by this device");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extended_lte_presence_is_one_shot() {
        let mut state = Tristate::Unknown;
        note_extended_lte_presence(&mut state, true).await;
        assert_eq!(state, Tristate::Supported);
        // Once known, a later "absent" observation must not flip it back.
        note_extended_lte_presence(&mut state, false).await;
        assert_eq!(state, Tristate::Supported);
    }

    #[tokio::test]
    async fn extended_lte_presence_marks_unsupported_when_absent() {
        let mut state = Tristate::Unknown;
        note_extended_lte_presence(&mut state, false).await;
        assert_eq!(state, Tristate::Unsupported);
    }
}
