//! End-to-end scenarios driving a scripted fake transport through whole
//! subsystem dialogs, rather than exercising one function at a time.

use std::future::Future;
use std::sync::{Mutex, Once};

use tokio::sync::broadcast;

use qmi_modem_control::band::BandSelector;
use qmi_modem_control::capability::CapabilityAndModeSelector;
use qmi_modem_control::carrier_config::keyfile::CarrierMapping;
use qmi_modem_control::carrier_config::CarrierConfigManager;
use qmi_modem_control::config::DeviceConfig;
use qmi_modem_control::device::DeviceContext;
use qmi_modem_control::error::Error;
use qmi_modem_control::gateway::{ClientGateway, Transport};
use qmi_modem_control::location::LocationSubsystem;
use qmi_modem_control::mask::{Band, CapabilityMask, ModeMask, ModeRequest, RadioInterface};
use qmi_modem_control::qmi::dms::{BandCapabilities, Capabilities, DmsRequest, DmsResponse};
use qmi_modem_control::qmi::loc::{AssistanceFormat, LocIndication, LocRequest, LocResponse};
use qmi_modem_control::qmi::nas::{
    NasRequest, NasResponse, OperatingMode, SystemSelectionPreference,
};
use qmi_modem_control::qmi::pdc::{
    ConfigId, ConfigListEntry, ConfigType, PdcIndication, PdcRequest, PdcResponse,
};
use qmi_modem_control::qmi::pds::{AgpsServer, PdsRequest, PdsResponse};
use qmi_modem_control::qmi::{Indication, ProtocolError, Request, Response};

/// A scripted transport: each call is routed through a boxed closure that
/// inspects the request and may also push indications onto the broadcast bus
/// before answering, modeling the request/indication races real QMI dialogs
/// depend on.
type Handler = dyn FnMut(Request, &broadcast::Sender<Indication>) -> Result<Response, Error> + Send;

struct FakeTransport {
    handler: Mutex<Box<Handler>>,
    tx: broadcast::Sender<Indication>,
}

impl FakeTransport {
    fn new(
        handler: impl FnMut(Request, &broadcast::Sender<Indication>) -> Result<Response, Error> + Send + 'static,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(32);
        Self { handler: Mutex::new(Box::new(handler)), tx }
    }
}

static LOG_INIT: Once = Once::new();

fn init_test_logging() {
    LOG_INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .init();
    });
}

impl Transport for FakeTransport {
    fn call(&self, req: Request) -> impl Future<Output = Result<Response, Error>> + Send {
        let result = (self.handler.lock().unwrap())(req, &self.tx);
        async move { result }
    }

    fn subscribe(&self) -> broadcast::Receiver<Indication> {
        self.tx.subscribe()
    }
}

// Scenario 1 (spec §8): TP-only GSM modem, capability set drives a reset.
#[tokio::test]
async fn tp_only_modem_set_capabilities_drives_reset() {
    init_test_logging();
    let calls = Mutex::new(Vec::<&'static str>::new());
    let transport = FakeTransport::new(move |req, _tx| {
        calls.lock().unwrap().push(match &req {
            Request::Nas(NasRequest::GetSystemSelectionPreference) => "get_ssp",
            Request::Nas(NasRequest::GetTechnologyPreference) => "get_tp",
            Request::Dms(DmsRequest::GetCapabilities) => "get_caps",
            Request::Nas(NasRequest::SetTechnologyPreference { .. }) => "set_tp",
            Request::Nas(NasRequest::SetOperatingMode { mode: OperatingMode::Offline }) => "offline",
            Request::Nas(NasRequest::SetOperatingMode { mode: OperatingMode::Reset }) => "reset",
            _ => "unexpected",
        });
        match req {
            Request::Nas(NasRequest::GetSystemSelectionPreference) => {
                Err(Error::Transport("no such service".into()))
            }
            Request::Nas(NasRequest::GetTechnologyPreference) => {
                Ok(Response::Nas(NasResponse::TechnologyPreference(CapabilityMask::GSM_UMTS)))
            }
            Request::Dms(DmsRequest::GetCapabilities) => Ok(Response::Dms(DmsResponse::Capabilities(Capabilities {
                radio_interfaces: CapabilityMask::GSM_UMTS,
            }))),
            Request::Nas(NasRequest::SetTechnologyPreference { mask }) => {
                assert_eq!(mask, CapabilityMask::CDMA_EVDO);
                Ok(Response::Nas(NasResponse::Ack))
            }
            Request::Nas(NasRequest::SetOperatingMode { .. }) => Ok(Response::Nas(NasResponse::Ack)),
            _ => panic!("unexpected request {req:?}"),
        }
    });
    let gateway = ClientGateway::new(transport);
    let config = DeviceConfig::default();
    let selector = CapabilityAndModeSelector::new(&gateway, &config);
    let mut ctx = DeviceContext::new();

    let loaded = selector.load_current_capabilities(&mut ctx).await.unwrap();
    assert_eq!(loaded, CapabilityMask::GSM_UMTS);
    assert!(!ctx.probes.system_selection_preference.is_supported());
    assert!(ctx.probes.technology_preference.is_supported());

    selector.set_current_capabilities(&ctx, CapabilityMask::CDMA_EVDO).await.unwrap();
}

// Scenario 2 (spec §8): SSP-supporting LTE modem, allowed={2G,3G} preferred=3G
// must set BOTH the generic acquisition-order array and the 2G/3G-specific TLV.
#[tokio::test]
async fn ssp_modem_set_modes_populates_both_acquisition_order_tlvs() {
    init_test_logging();
    let transport = FakeTransport::new(move |req, _tx| match req {
        Request::Nas(NasRequest::SetSystemSelectionPreference {
            mode_mask,
            acquisition_order,
            acquisition_order_2g_3g,
            ..
        }) => {
            assert_eq!(mode_mask, Some(ModeMask::MODE_2G | ModeMask::MODE_3G));
            assert_eq!(acquisition_order, Some(vec![RadioInterface::Umts, RadioInterface::Gsm]));
            assert_eq!(acquisition_order_2g_3g, Some(RadioInterface::Umts));
            Ok(Response::Nas(NasResponse::Ack))
        }
        _ => panic!("unexpected request {req:?}"),
    });
    let gateway = ClientGateway::new(transport);
    let config = DeviceConfig::default();
    let selector = CapabilityAndModeSelector::new(&gateway, &config);
    let mut ctx = DeviceContext::new();
    ctx.probes.system_selection_preference = qmi_modem_control::feature_probe::Tristate::Supported;

    selector
        .set_current_modes(
            &ctx,
            ModeRequest { allowed: ModeMask::MODE_2G | ModeMask::MODE_3G, preferred: Some(RadioInterface::Umts) },
        )
        .await
        .unwrap();
}

// Scenario 3 (spec §8): carrier-config switch with a silent reboot on activate.
#[tokio::test(start_paused = true)]
async fn carrier_config_switch_survives_silent_reboot() {
    init_test_logging();
    let generic_id = ConfigId(b"generic".to_vec());
    let att_id = ConfigId(b"att".to_vec());

    let transport = FakeTransport::new({
        let generic_id = generic_id.clone();
        let att_id = att_id.clone();
        move |req, tx| match req {
            Request::Pdc(PdcRequest::ListConfigs { .. }) => Ok(Response::Pdc(PdcResponse::ConfigList(vec![
                ConfigListEntry { id: generic_id.clone(), config_type: ConfigType::Software },
                ConfigListEntry { id: att_id.clone(), config_type: ConfigType::Software },
            ]))),
            Request::Pdc(PdcRequest::GetConfigInfo { token, id, .. }) => {
                let description = if id == generic_id { "generic" } else { "att" };
                tx.send(Indication::Pdc(PdcIndication::GetConfigInfo {
                    token,
                    description: description.to_string(),
                    version: 1,
                    total_size: 100,
                }))
                .ok();
                Ok(Response::Pdc(PdcResponse::Ack))
            }
            Request::Pdc(PdcRequest::GetSelectedConfig { token, .. }) => {
                tx.send(Indication::Pdc(PdcIndication::SelectedConfigFailed {
                    token,
                    error: ProtocolError::NotProvisioned,
                }))
                .ok();
                Ok(Response::Pdc(PdcResponse::Ack))
            }
            Request::Pdc(PdcRequest::SetSelectedConfig { token, id, .. }) => {
                assert_eq!(id, att_id);
                tx.send(Indication::Pdc(PdcIndication::SetSelectedConfig { token })).ok();
                Ok(Response::Pdc(PdcResponse::Ack))
            }
            Request::Pdc(PdcRequest::ActivateConfig { .. }) => {
                // Device reboots before sending the activation indication.
                Ok(Response::Pdc(PdcResponse::Ack))
            }
            _ => panic!("unexpected request {req:?}"),
        }
    });
    let gateway = ClientGateway::new(transport);
    let config = DeviceConfig::default();
    let manager = CarrierConfigManager::new(&gateway, &config);
    let mut ctx = DeviceContext::new();

    manager.load(&mut ctx).await.unwrap();
    assert!(ctx.active_config_default);
    assert_eq!(ctx.carrier_configs.as_ref().unwrap().len(), 2);

    let mut mapping_path = std::env::temp_dir();
    mapping_path.push(format!("qmi-scenario-mapping-{}.ini", std::process::id()));
    std::fs::write(&mapping_path, "[carriers]\n310260 = att\ngeneric = generic\n").unwrap();
    let mapping = CarrierMapping::load(&mapping_path).unwrap();
    std::fs::remove_file(&mapping_path).ok();

    manager.switch(&mut ctx, &mapping, "310260123456789").await.unwrap();

    assert!(!ctx.active_config_default);
    assert_eq!(
        ctx.carrier_configs.as_ref().unwrap()[ctx.active_config_index.unwrap()].description,
        "att"
    );
}

// Scenario 4 (spec §8): assistance-data injection chunks over the modern
// Inject-Predicted-Orbits-Data dialog with no legacy fallback.
#[tokio::test]
async fn assistance_data_injects_in_sequential_chunks() {
    init_test_logging();
    let seen_parts = Mutex::new(Vec::<u16>::new());
    let transport = FakeTransport::new(move |req, tx| match req {
        Request::Loc(LocRequest::InjectPredictedOrbitsData { token, total_parts, part_number, format, .. }) => {
            assert_eq!(total_parts, 3);
            assert_eq!(format, AssistanceFormat::Xtra);
            seen_parts.lock().unwrap().push(part_number);
            tx.send(Indication::Loc(LocIndication::InjectPredictedOrbitsData { token, result: Ok(()) })).ok();
            Ok(Response::Loc(LocResponse::Ack))
        }
        _ => panic!("unexpected request {req:?}"),
    });
    let gateway = ClientGateway::new(transport);
    let config = DeviceConfig::default();
    let location = LocationSubsystem::new(&gateway, &config);
    let mut ctx = DeviceContext::new();
    ctx.location_backend = Some(qmi_modem_control::device::LocationBackend::Loc);
    ctx.max_part_size = Some(1024);

    let data = vec![7u8; 3000];
    location.inject_assistance_data(&ctx, &data).await.unwrap();
}

// Scenario 5 (spec §8): SUPL server set on a multimode PDS device encodes the
// URL as UTF-16BE with no IP/port TLV.
#[tokio::test]
async fn pds_multimode_device_sets_supl_url_as_utf16be() {
    init_test_logging();
    let transport = FakeTransport::new(move |req, _tx| match req {
        Request::Pds(PdsRequest::GetAgpsConfig) => {
            Ok(Response::Pds(PdsResponse::AgpsConfig { ip_port: None, url: None }))
        }
        Request::Pds(PdsRequest::SetAgpsConfig { network_mode, server }) => {
            assert_eq!(network_mode, qmi_modem_control::qmi::pds::AgpsNetworkMode::Umts);
            match server {
                AgpsServer::Url(bytes) => {
                    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
                    assert_eq!(String::from_utf16(&units).unwrap(), "supl.example.org:7275");
                }
                AgpsServer::IpPort(..) => panic!("expected a URL-encoded SUPL server"),
            }
            Ok(Response::Pds(PdsResponse::Ack))
        }
        _ => panic!("unexpected request {req:?}"),
    });
    let gateway = ClientGateway::new(transport);
    let config = DeviceConfig::default();
    let location = LocationSubsystem::new(&gateway, &config);
    let mut ctx = DeviceContext::new();
    ctx.capability_mask = CapabilityMask::GSM_UMTS | CapabilityMask::LTE;

    location.set_supl_server(&mut ctx, "supl.example.org:7275").await.unwrap();
}

// Scenario 6 (spec §8): extended-LTE-band load transitions the tri-state once
// and fuses legacy + extended bands; repeating the load is idempotent.
#[tokio::test]
async fn extended_band_load_transitions_tristate_and_fuses_bands() {
    init_test_logging();
    let transport = FakeTransport::new(move |req, _tx| match req {
        Request::Dms(DmsRequest::GetBandCapabilities) => Ok(Response::Dms(DmsResponse::BandCapabilities(BandCapabilities {
            legacy: vec![Band::Numbered(1), Band::Numbered(2)],
            legacy_lte: vec![],
            extended_lte: Some(vec![Band::Numbered(66)]),
        }))),
        _ => panic!("unexpected request {req:?}"),
    });
    let gateway = ClientGateway::new(transport);
    let config = DeviceConfig::default();
    let bands = BandSelector::new(&gateway, &config);
    let mut ctx = DeviceContext::new();

    let loaded = bands.load_supported_bands(&mut ctx).await.unwrap();
    assert_eq!(loaded, vec![Band::Numbered(1), Band::Numbered(2), Band::Numbered(66)]);
    assert!(ctx.probes.extended_lte_band_preference.is_supported());

    // Repeat: transport keeps answering with the TLV present, tristate stays put.
    let loaded_again = bands.load_supported_bands(&mut ctx).await.unwrap();
    assert_eq!(loaded_again, loaded);
    assert!(ctx.probes.extended_lte_band_preference.is_supported());
}

#[tokio::test]
async fn load_current_capabilities_twice_is_fatal() {
    init_test_logging();
    let transport = FakeTransport::new(move |req, _tx| match req {
        Request::Nas(NasRequest::GetSystemSelectionPreference) => {
            Ok(Response::Nas(NasResponse::SystemSelectionPreference(SystemSelectionPreference {
                mode_preference: Some(CapabilityMask::LTE),
                ..Default::default()
            })))
        }
        Request::Nas(NasRequest::GetTechnologyPreference) => {
            Ok(Response::Nas(NasResponse::TechnologyPreference(CapabilityMask::LTE)))
        }
        Request::Dms(DmsRequest::GetCapabilities) => Ok(Response::Dms(DmsResponse::Capabilities(Capabilities {
            radio_interfaces: CapabilityMask::LTE,
        }))),
        _ => panic!("unexpected request {req:?}"),
    });
    let gateway = ClientGateway::new(transport);
    let config = DeviceConfig::default();
    let selector = CapabilityAndModeSelector::new(&gateway, &config);
    let mut ctx = DeviceContext::new();

    selector.load_current_capabilities(&mut ctx).await.unwrap();
    let err = selector.load_current_capabilities(&mut ctx).await.unwrap_err();
    assert!(matches!(err, Error::Fatal(_)));
}

#[tokio::test]
async fn get_config_info_error_surfaces_as_protocol_error() {
    init_test_logging();
    let transport = FakeTransport::new(move |req, tx| match req {
        Request::Pdc(PdcRequest::ListConfigs { .. }) => Ok(Response::Pdc(PdcResponse::ConfigList(vec![
            ConfigListEntry { id: ConfigId(b"a".to_vec()), config_type: ConfigType::Software },
        ]))),
        Request::Pdc(PdcRequest::GetConfigInfo { token, .. }) => {
            tx.send(Indication::Pdc(PdcIndication::GetConfigInfoFailed { token, error: ProtocolError::Other(42) }))
                .ok();
            Ok(Response::Pdc(PdcResponse::Ack))
        }
        _ => panic!("unexpected request {req:?}"),
    });
    let gateway = ClientGateway::new(transport);
    let config = DeviceConfig::default();
    let manager = CarrierConfigManager::new(&gateway, &config);
    let mut ctx = DeviceContext::new();

    let err = manager.load(&mut ctx).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::Other(42))));
}
