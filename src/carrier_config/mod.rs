//! Carrier Config Manager (spec §4.5).

pub mod keyfile;

use std::collections::HashMap;

use log::{debug, info, warn};
use tokio::time::Duration;

use crate::config::DeviceConfig;
use crate::device::{ConfigDescriptor, DeviceContext};
use crate::engine::{is_not_provisioned, IndicationOutcome, OperationEngine};
use crate::error::Error;
use crate::gateway::{ClientGateway, Transport};
use crate::qmi::pdc::{ConfigId, ConfigType, PdcIndication, PdcRequest, PdcResponse};
use crate::qmi::{Indication, Request, Response, Token};

use keyfile::CarrierMapping;

pub struct CarrierConfigManager<'g, T: Transport> {
    engine: OperationEngine<'g, T>,
    step_timeout: Duration,
}

impl<'g, T: Transport> CarrierConfigManager<'g, T> {
    pub fn new(gateway: &'g ClientGateway<T>, config: &DeviceConfig) -> Self {
        Self {
            engine: OperationEngine::new(gateway),
            step_timeout: config.step_timeout,
        }
    }

    /// Loads the carrier-config mapping file named by `config`, if any (spec §6).
    pub fn load_mapping(config: &DeviceConfig) -> Result<Option<CarrierMapping>, Error> {
        CarrierMapping::load_from_config(config)
    }

    /// Spec §4.5 "Load sequence".
    pub async fn load(&self, ctx: &mut DeviceContext) -> Result<(), Error> {
        info!("loading carrier config list");
        let list = match self
            .engine
            .request(
                Request::Pdc(PdcRequest::ListConfigs { config_type: ConfigType::Software }),
                self.step_timeout,
            )
            .await?
        {
            Response::Pdc(PdcResponse::ConfigList(list)) => list,
            _ => return Err(Error::fatal("unexpected response shape for PDC ListConfigs")),
        };

        if list.is_empty() {
            info!("device reports no carrier configs installed");
            ctx.carrier_configs = Some(Vec::new());
            ctx.active_config_index = None;
            ctx.active_config_default = true;
            return Ok(());
        }

        // Subscribe before issuing any Get-Config-Info request: the indications
        // answering the first request must not be missed while later requests
        // in this loop are still being issued (spec §4.1, §4.5).
        let mut indications = self.engine.subscribe();

        let mut token_by_id: HashMap<ConfigId, Token> = HashMap::new();
        for entry in &list {
            let token = self.engine.next_token();
            token_by_id.insert(entry.id.clone(), token);
            self.engine
                .request(
                    Request::Pdc(PdcRequest::GetConfigInfo {
                        token,
                        config_type: entry.config_type,
                        id: entry.id.clone(),
                    }),
                    self.step_timeout,
                )
                .await?;
        }

        let mut descriptors: HashMap<Token, ConfigDescriptor> = HashMap::new();
        let wait = async {
            while descriptors.len() < token_by_id.len() {
                match indications.recv().await {
                    Ok(Indication::Pdc(PdcIndication::GetConfigInfo { token, description, version, total_size })) => {
                        if let Some((id, _)) = token_by_id.iter().find(|(_, t)| **t == token) {
                            descriptors.entry(token).or_insert(ConfigDescriptor {
                                id: id.clone(),
                                config_type: ConfigType::Software,
                                token,
                                version,
                                description,
                                total_size,
                            });
                        }
                        // Unknown or already-populated tokens are ignored (spec §9 Open
                        // Question (c)) - robustness against duplicate indications.
                    }
                    Ok(Indication::Pdc(PdcIndication::GetConfigInfoFailed { token, error })) => {
                        if token_by_id.values().any(|t| *t == token) {
                            return Err(Error::from(error));
                        }
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        return Err(Error::aborted("indication stream closed while collecting config info"));
                    }
                }
            }
            Ok(())
        };
        tokio::time::timeout(self.step_timeout, wait)
            .await
            .map_err(|_| Error::aborted("timed out waiting for get-config-info"))??;

        let ordered: Vec<ConfigDescriptor> = list
            .iter()
            .filter_map(|entry| token_by_id.get(&entry.id).and_then(|token| descriptors.get(token).cloned()))
            .collect();

        let token = self.engine.next_token();
        let outcome = self
            .engine
            .request_with_indication(
                Request::Pdc(PdcRequest::GetSelectedConfig { token, config_type: ConfigType::Software }),
                self.step_timeout,
                token,
                move |ind| match ind {
                    Indication::Pdc(PdcIndication::SelectedConfig { token: t, id }) if t == token => Some(Ok(id)),
                    Indication::Pdc(PdcIndication::SelectedConfigFailed { token: t, error }) if t == token => {
                        Some(Err(error))
                    }
                    _ => None,
                },
                false,
            )
            .await?;

        match outcome {
            IndicationOutcome::Received(Ok(id)) => {
                ctx.active_config_index = ordered.iter().position(|d| d.id == id);
                ctx.active_config_default = false;
            }
            IndicationOutcome::Received(Err(e)) if is_not_provisioned(&Error::Protocol(e)) => {
                info!("no carrier config provisioned; device is using its built-in default");
                ctx.active_config_index = None;
                ctx.active_config_default = true;
            }
            IndicationOutcome::Received(Err(e)) => return Err(Error::Protocol(e)),
            IndicationOutcome::TimedOutAsSuccess => unreachable!("not a timeout-is-success step"),
        }

        ctx.carrier_configs = Some(ordered);
        debug!("carrier config load complete: {} config(s) known", ctx.carrier_configs.as_ref().unwrap().len());
        Ok(())
    }

    /// Spec §4.5 "Switch sequence".
    pub async fn switch(&self, ctx: &mut DeviceContext, mapping: &CarrierMapping, imsi: &str) -> Result<(), Error> {
        info!("switching carrier config for imsi {imsi}");
        let configs = ctx
            .carrier_configs
            .clone()
            .ok_or_else(|| Error::fatal("Carrier Config Manager has not been loaded yet"))?;

        let (requested, fallback) = mapping.resolve(imsi);
        let chosen_index = requested
            .and_then(|name| configs.iter().position(|c| c.description == name))
            .or_else(|| fallback.and_then(|name| configs.iter().position(|c| c.description == name)))
            .ok_or_else(|| {
                Error::not_found(format!(
                    "neither the requested ({requested:?}) nor the generic ({fallback:?}) carrier config is installed"
                ))
            })?;

        if !ctx.active_config_default && ctx.active_config_index == Some(chosen_index) {
            debug!("requested carrier config is already active; no-op");
            return Ok(());
        }

        let chosen = &configs[chosen_index];
        let set_token = self.engine.next_token();
        self.engine
            .request_with_indication(
                Request::Pdc(PdcRequest::SetSelectedConfig {
                    token: set_token,
                    config_type: chosen.config_type,
                    id: chosen.id.clone(),
                }),
                self.step_timeout,
                set_token,
                |ind| match ind {
                    Indication::Pdc(PdcIndication::SetSelectedConfig { token }) if token == set_token => Some(()),
                    _ => None,
                },
                false,
            )
            .await?;

        let activate_token = self.engine.next_token();
        let activate_outcome = self
            .engine
            .request_with_indication(
                Request::Pdc(PdcRequest::ActivateConfig { token: activate_token, config_type: chosen.config_type }),
                self.step_timeout,
                activate_token,
                |ind| match ind {
                    Indication::Pdc(PdcIndication::ActivateConfig { token }) if token == activate_token => Some(()),
                    _ => None,
                },
                // Silent-reboot: the device may disappear before the indication arrives
                // (spec §4.1, §4.5 step 4).
                true,
            )
            .await?;
        if matches!(activate_outcome, IndicationOutcome::TimedOutAsSuccess) {
            warn!("activate-config timed out; treating as success (silent reboot)");
        }

        ctx.active_config_index = Some(chosen_index);
        ctx.active_config_default = false;
        Ok(())
    }
}
