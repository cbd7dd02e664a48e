//! Location Subsystem (spec §4.6): one interface over two incompatible
//! back-ends, dispatched on the [`LocationBackend`] tag rather than a vtable
//! (spec §9 "tagged variants instead of inheritance").

use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::capability::CapabilityAndModeSelector;
use crate::config::DeviceConfig;
use crate::device::{DeviceContext, LocationBackend, LocationSourceMask};
use crate::engine::{is_no_effect, is_not_supported, IndicationOutcome, OperationEngine};
use crate::error::Error;
use crate::gateway::{ClientGateway, Transport};
use crate::mask::CapabilityMask;
use crate::qmi::loc::{
    AgpsServerValue, AssistanceFormat, EventMask, LocIndication, LocRequest, LocResponse, OperationMode, Recurrence,
    ServerType,
};
use crate::qmi::pds::{AgpsNetworkMode, AgpsServer, PdsIndication, PdsRequest, PdsResponse, TrackingSessionMode};
use crate::qmi::{Indication, Request, Response};

/// Session id and minimum NMEA interval fixed by spec §6.
const LOC_SESSION_ID: u8 = 0x10;
const MIN_NMEA_INTERVAL_MS: u32 = 1000;
const SUPL_INDICATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgpsMode {
    Assisted,
    Standalone,
}

/// A host:port SUPL target, parsed before it is handed to either backend's
/// TLV encoding (spec §4.6 "SUPL server set/get").
enum SuplTarget {
    IpPort(std::net::Ipv4Addr, u16),
    Url(String),
}

fn parse_supl(input: &str) -> Result<SuplTarget, Error> {
    let (host, port) = input
        .rsplit_once(':')
        .ok_or_else(|| Error::validation("SUPL server must be in host:port form"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::validation("SUPL server port is not a valid number"))?;
    match host.parse::<std::net::Ipv4Addr>() {
        Ok(ip) => Ok(SuplTarget::IpPort(ip, port)),
        Err(_) => Ok(SuplTarget::Url(input.to_string())),
    }
}

fn encode_utf16_be(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

fn decode_utf16_be(bytes: &[u8]) -> Result<String, Error> {
    if !bytes.len().is_multiple_of(2) {
        return Err(Error::validation("SUPL URL has an odd byte length for UTF-16"));
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|_| Error::validation("SUPL URL is not valid UTF-16"))
}

/// Multimode devices prefer UMTS-SLP / UMTS network-mode; CDMA-only devices
/// use CDMA-PDE (spec §4.6).
fn prefer_umts(ctx: &DeviceContext) -> bool {
    !(ctx.capability_mask == CapabilityMask::CDMA_EVDO)
}

/// Forwards NMEA sentences from whichever backend started the session (spec
/// §4.6 "retained ... indication subscription that forwards NMEA sentences").
pub struct NmeaStream {
    receiver: broadcast::Receiver<Indication>,
    backend: LocationBackend,
}

impl NmeaStream {
    pub async fn next(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(Indication::Pds(PdsIndication::EventReport { nmea })) if self.backend == LocationBackend::Pds => {
                    return Some(nmea)
                }
                Ok(Indication::Loc(LocIndication::Nmea { sentence })) if self.backend == LocationBackend::Loc => {
                    return Some(sentence)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub struct LocationSubsystem<'g, T: Transport> {
    engine: OperationEngine<'g, T>,
    step_timeout: Duration,
    default_supl_server: Option<String>,
    default_xtra_part_size: u32,
}

impl<'g, T: Transport> LocationSubsystem<'g, T> {
    pub fn new(gateway: &'g ClientGateway<T>, config: &DeviceConfig) -> Self {
        Self {
            engine: OperationEngine::new(gateway),
            step_timeout: config.step_timeout,
            default_supl_server: config.default_supl_server.clone(),
            default_xtra_part_size: config.default_xtra_part_size,
        }
    }

    /// Probes for a PDS client first, falling back to LOC (spec §4.6); memoized
    /// for the device's lifetime like the other feature probes.
    async fn backend(&self, ctx: &mut DeviceContext) -> Result<LocationBackend, Error> {
        if let Some(b) = ctx.location_backend {
            return Ok(b);
        }
        let backend = match self.engine.request(Request::Pds(PdsRequest::GetAgpsConfig), self.step_timeout).await {
            Ok(_) => LocationBackend::Pds,
            Err(Error::Transport(_)) => LocationBackend::Loc,
            Err(e) => return Err(e),
        };
        debug!("location backend probed as {backend:?}");
        ctx.location_backend = Some(backend);
        Ok(backend)
    }

    /// Spec §4.6 "Capability discovery": runs the parent capability load, then
    /// records which location sources the probed backend exposes.
    pub async fn load_capabilities(
        &self,
        ctx: &mut DeviceContext,
        capability_selector: &CapabilityAndModeSelector<'_, T>,
    ) -> Result<CapabilityMask, Error> {
        let mask = capability_selector.load_current_capabilities(ctx).await?;
        self.backend(ctx).await?;
        ctx.enabled_location_sources =
            LocationSourceMask::GPS_NMEA | LocationSourceMask::GPS_RAW | LocationSourceMask::A_GPS;

        if let Some(default_supl) = self.default_supl_server.clone() {
            if self.get_supl_server(ctx).await?.is_empty() {
                info!("applying configured default SUPL server");
                self.set_supl_server(ctx, &default_supl).await?;
            }
        }

        Ok(mask)
    }

    async fn request_ignoring_no_effect(&self, req: Request) -> Result<(), Error> {
        match self.engine.request(req, self.step_timeout).await {
            Ok(_) => Ok(()),
            Err(e) if is_no_effect(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Spec §4.6 "Start/stop GPS" - start.
    pub async fn start_gps(&self, ctx: &mut DeviceContext) -> Result<NmeaStream, Error> {
        info!("starting GPS session");
        let backend = self.backend(ctx).await?;
        match backend {
            LocationBackend::Pds => {
                self.request_ignoring_no_effect(Request::Pds(PdsRequest::SetGpsServiceState { on: true }))
                    .await?;
                self.request_ignoring_no_effect(Request::Pds(PdsRequest::SetAutoTrackingState { on: true }))
                    .await?;
                self.engine
                    .request(
                        Request::Pds(PdsRequest::SetEventReport { nmea_position_reporting: true }),
                        self.step_timeout,
                    )
                    .await?;
            }
            LocationBackend::Loc => {
                self.engine
                    .request(
                        Request::Loc(LocRequest::Start {
                            session_id: LOC_SESSION_ID,
                            intermediate_report: false,
                            min_interval_ms: MIN_NMEA_INTERVAL_MS,
                            recurrence: Recurrence::Periodic,
                        }),
                        self.step_timeout,
                    )
                    .await?;
                self.engine
                    .request(Request::Loc(LocRequest::RegisterEvents { mask: EventMask::NMEA }), self.step_timeout)
                    .await?;
            }
        }
        ctx.location_session_active = true;
        Ok(NmeaStream { receiver: self.engine.subscribe(), backend })
    }

    /// Spec §4.6 "Start/stop GPS" - stop.
    pub async fn stop_gps(&self, ctx: &mut DeviceContext) -> Result<(), Error> {
        info!("stopping GPS session");
        let backend = self.backend(ctx).await?;
        match backend {
            LocationBackend::Pds => {
                self.request_ignoring_no_effect(Request::Pds(PdsRequest::SetEventReport {
                    nmea_position_reporting: false,
                }))
                .await?;
                self.request_ignoring_no_effect(Request::Pds(PdsRequest::SetAutoTrackingState { on: false }))
                    .await?;
                self.request_ignoring_no_effect(Request::Pds(PdsRequest::SetGpsServiceState { on: false }))
                    .await?;
            }
            LocationBackend::Loc => {
                self.request_ignoring_no_effect(Request::Loc(LocRequest::Stop { session_id: LOC_SESSION_ID }))
                    .await?;
            }
        }
        ctx.location_session_active = false;
        Ok(())
    }

    /// Spec §4.6 "SUPL server set/get" - setter.
    pub async fn set_supl_server(&self, ctx: &mut DeviceContext, target: &str) -> Result<(), Error> {
        info!("setting SUPL server to {target}");
        let backend = self.backend(ctx).await?;
        let parsed = parse_supl(target)?;
        match backend {
            LocationBackend::Pds => {
                let network_mode = if prefer_umts(ctx) { AgpsNetworkMode::Umts } else { AgpsNetworkMode::Cdma };
                let server = match parsed {
                    SuplTarget::IpPort(ip, port) => AgpsServer::IpPort(ip, port),
                    SuplTarget::Url(url) => AgpsServer::Url(encode_utf16_be(&url)),
                };
                self.engine
                    .request(Request::Pds(PdsRequest::SetAgpsConfig { network_mode, server }), self.step_timeout)
                    .await?;
            }
            LocationBackend::Loc => {
                let server_type = if prefer_umts(ctx) { ServerType::UmtsSlp } else { ServerType::CdmaPde };
                let value = match parsed {
                    SuplTarget::IpPort(ip, port) => AgpsServerValue::IpPort(ip, port),
                    SuplTarget::Url(url) => AgpsServerValue::Url(url),
                };
                let token = self.engine.next_token();
                let outcome = self
                    .engine
                    .request_with_indication(
                        Request::Loc(LocRequest::SetServer { token, server_type, value }),
                        SUPL_INDICATION_TIMEOUT,
                        token,
                        move |ind| match ind {
                            Indication::Loc(LocIndication::SetServer { token: t, result }) if t == token => Some(result),
                            _ => None,
                        },
                        false,
                    )
                    .await?;
                match outcome {
                    IndicationOutcome::Received(Ok(())) => {}
                    IndicationOutcome::Received(Err(e)) => return Err(Error::Protocol(e)),
                    IndicationOutcome::TimedOutAsSuccess => unreachable!("not a timeout-is-success step"),
                }
            }
        }
        Ok(())
    }

    /// Spec §4.6 "SUPL server set/get" - getter.
    pub async fn get_supl_server(&self, ctx: &mut DeviceContext) -> Result<String, Error> {
        let backend = self.backend(ctx).await?;
        match backend {
            LocationBackend::Pds => {
                match self.engine.request(Request::Pds(PdsRequest::GetAgpsConfig), self.step_timeout).await? {
                    Response::Pds(PdsResponse::AgpsConfig { ip_port, url }) => {
                        if let Some((ip, port)) = ip_port {
                            Ok(format!("{ip}:{port}"))
                        } else if let Some(bytes) = url {
                            decode_utf16_be(&bytes)
                        } else {
                            debug!("device has no SUPL server configured");
                            Ok(String::new())
                        }
                    }
                    _ => Err(Error::fatal("unexpected response shape for PDS GetAgpsConfig")),
                }
            }
            LocationBackend::Loc => {
                let server_type = if prefer_umts(ctx) { ServerType::UmtsSlp } else { ServerType::CdmaPde };
                let token = self.engine.next_token();
                let outcome = self
                    .engine
                    .request_with_indication(
                        Request::Loc(LocRequest::GetServer { token, server_type }),
                        SUPL_INDICATION_TIMEOUT,
                        token,
                        move |ind| match ind {
                            Indication::Loc(LocIndication::GetServer { token: t, ip_port, url }) if t == token => {
                                Some((ip_port, url))
                            }
                            _ => None,
                        },
                        false,
                    )
                    .await?;
                match outcome {
                    IndicationOutcome::Received((Some((ip, port)), _)) => Ok(format!("{ip}:{port}")),
                    IndicationOutcome::Received((None, Some(url))) => Ok(url),
                    IndicationOutcome::Received((None, None)) => {
                        debug!("device has no SUPL server configured");
                        Ok(String::new())
                    }
                    IndicationOutcome::TimedOutAsSuccess => unreachable!("not a timeout-is-success step"),
                }
            }
        }
    }

    /// Spec §4.6 "A-GPS mode" - getter.
    pub async fn get_agps_mode(&self, ctx: &mut DeviceContext) -> Result<AgpsMode, Error> {
        let backend = self.backend(ctx).await?;
        match backend {
            LocationBackend::Pds => {
                match self
                    .engine
                    .request(Request::Pds(PdsRequest::GetSessionControlState), self.step_timeout)
                    .await?
                {
                    Response::Pds(PdsResponse::SessionControlState(mode)) => Ok(match mode {
                        TrackingSessionMode::MsAssisted => AgpsMode::Assisted,
                        TrackingSessionMode::Standalone => AgpsMode::Standalone,
                    }),
                    _ => Err(Error::fatal("unexpected response shape for PDS GetSessionControlState")),
                }
            }
            LocationBackend::Loc => {
                match self.engine.request(Request::Loc(LocRequest::GetOperationMode), self.step_timeout).await? {
                    Response::Loc(LocResponse::OperationMode(mode)) => Ok(match mode {
                        OperationMode::Standalone => AgpsMode::Standalone,
                        OperationMode::Msa | OperationMode::Msb => AgpsMode::Assisted,
                    }),
                    _ => Err(Error::fatal("unexpected response shape for LOC GetOperationMode")),
                }
            }
        }
    }

    /// Spec §4.6 "A-GPS mode" - setter: no-ops if the device already reports
    /// the requested mode.
    pub async fn set_agps_mode(&self, ctx: &mut DeviceContext, mode: AgpsMode) -> Result<(), Error> {
        info!("setting A-GPS mode to {mode:?}");
        if self.get_agps_mode(ctx).await? == mode {
            debug!("device already reports the requested A-GPS mode; no-op");
            return Ok(());
        }
        let backend = self.backend(ctx).await?;
        match backend {
            LocationBackend::Pds => {
                let session_mode = match mode {
                    AgpsMode::Assisted => TrackingSessionMode::MsAssisted,
                    AgpsMode::Standalone => TrackingSessionMode::Standalone,
                };
                self.engine
                    .request(Request::Pds(PdsRequest::SetSessionControlState { mode: session_mode }), self.step_timeout)
                    .await?;
            }
            LocationBackend::Loc => {
                let op_mode = match mode {
                    AgpsMode::Assisted => OperationMode::Msa,
                    AgpsMode::Standalone => OperationMode::Standalone,
                };
                self.engine
                    .request(Request::Loc(LocRequest::SetOperationMode { mode: op_mode }), self.step_timeout)
                    .await?;
            }
        }
        Ok(())
    }

    /// Spec §4.6 "Assistance-data servers and limits" - LOC only.
    pub async fn load_assistance_data_limits(&self, ctx: &mut DeviceContext) -> Result<bool, Error> {
        if self.backend(ctx).await? != LocationBackend::Loc {
            ctx.assistance_data_servers.clear();
            ctx.max_file_size = None;
            ctx.max_part_size = None;
            return Ok(false);
        }

        let token = self.engine.next_token();
        let outcome = self
            .engine
            .request_with_indication(
                Request::Loc(LocRequest::GetPredictedOrbitsDataSource { token }),
                self.step_timeout,
                token,
                move |ind| match ind {
                    Indication::Loc(LocIndication::PredictedOrbitsDataSource { token: t, servers, max_file_size, max_part_size })
                        if t == token =>
                    {
                        Some((servers, max_file_size, max_part_size))
                    }
                    _ => None,
                },
                false,
            )
            .await?;

        let (servers, max_file_size, max_part_size) = match outcome {
            IndicationOutcome::Received(v) => v,
            IndicationOutcome::TimedOutAsSuccess => unreachable!("not a timeout-is-success step"),
        };
        let supported = !servers.is_empty() || max_file_size.is_some() || max_part_size.is_some();
        ctx.assistance_data_servers = servers;
        ctx.max_file_size = max_file_size;
        ctx.max_part_size = max_part_size;
        Ok(supported)
    }

    /// Spec §4.6 "Inject assistance data": chunked, falling back to the legacy
    /// Inject-Xtra-Data dialog if the modern one isn't supported.
    pub async fn inject_assistance_data(&self, ctx: &DeviceContext, data: &[u8]) -> Result<(), Error> {
        info!("injecting {} bytes of assistance data", data.len());
        if ctx.location_backend != Some(LocationBackend::Loc) {
            return Err(Error::unsupported("assistance-data injection requires the LOC backend"));
        }

        let part_size = ctx.max_part_size_or(self.default_xtra_part_size) as usize;
        let total_size = data.len();
        if total_size as u64 > 65535u64 * part_size as u64 {
            return Err(Error::TooMany("assistance data exceeds 65535 parts at the device's part size".into()));
        }
        if let Some(max_file_size) = ctx.max_file_size {
            if total_size as u64 > max_file_size as u64 {
                return Err(Error::TooMany("assistance data exceeds the device's max file size".into()));
            }
        }

        let parts: Vec<&[u8]> = if data.is_empty() { vec![&[][..]] } else { data.chunks(part_size).collect() };
        let total_parts = parts.len() as u16;

        let mut legacy = false;
        for (i, chunk) in parts.iter().enumerate() {
            let part_number = (i + 1) as u16;
            if !legacy {
                match self.inject_predicted_orbits_part(total_size as u32, total_parts, part_number, chunk).await {
                    Ok(()) => continue,
                    Err(e) if is_not_supported(&e) && part_number == 1 => {
                        warn!("predicted-orbits injection not supported; falling back to legacy Xtra");
                        legacy = true;
                    }
                    Err(e) => return Err(e),
                }
            }
            self.inject_xtra_part(total_size as u32, total_parts, part_number, chunk).await?;
        }
        Ok(())
    }

    async fn inject_predicted_orbits_part(
        &self,
        total_size: u32,
        total_parts: u16,
        part_number: u16,
        data: &[u8],
    ) -> Result<(), Error> {
        let token = self.engine.next_token();
        let outcome = self
            .engine
            .request_with_indication(
                Request::Loc(LocRequest::InjectPredictedOrbitsData {
                    token,
                    total_size,
                    total_parts,
                    part_number,
                    data: data.to_vec(),
                    format: AssistanceFormat::Xtra,
                }),
                self.step_timeout,
                token,
                move |ind| match ind {
                    Indication::Loc(LocIndication::InjectPredictedOrbitsData { token: t, result }) if t == token => {
                        Some(result)
                    }
                    _ => None,
                },
                false,
            )
            .await?;
        match outcome {
            IndicationOutcome::Received(Ok(())) => Ok(()),
            IndicationOutcome::Received(Err(e)) => Err(Error::Protocol(e)),
            IndicationOutcome::TimedOutAsSuccess => unreachable!("not a timeout-is-success step"),
        }
    }

    async fn inject_xtra_part(&self, total_size: u32, total_parts: u16, part_number: u16, data: &[u8]) -> Result<(), Error> {
        let token = self.engine.next_token();
        let outcome = self
            .engine
            .request_with_indication(
                Request::Loc(LocRequest::InjectXtraData { token, total_size, total_parts, part_number, data: data.to_vec() }),
                self.step_timeout,
                token,
                move |ind| match ind {
                    Indication::Loc(LocIndication::InjectPredictedOrbitsData { token: t, result }) if t == token => {
                        Some(result)
                    }
                    _ => None,
                },
                false,
            )
            .await?;
        match outcome {
            IndicationOutcome::Received(Ok(())) => Ok(()),
            IndicationOutcome::Received(Err(e)) => Err(Error::Protocol(e)),
            IndicationOutcome::TimedOutAsSuccess => unreachable!("not a timeout-is-success step"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_ipv4_target() {
        match parse_supl("127.0.0.1:7275").unwrap() {
            SuplTarget::IpPort(ip, port) => {
                assert_eq!(ip, std::net::Ipv4Addr::new(127, 0, 0, 1));
                assert_eq!(port, 7275);
            }
            SuplTarget::Url(_) => panic!("expected an IP:port target"),
        }
    }

    #[test]
    fn parses_hostname_target_as_url() {
        match parse_supl("supl.example.org:7275").unwrap() {
            SuplTarget::Url(url) => assert_eq!(url, "supl.example.org:7275"),
            SuplTarget::IpPort(..) => panic!("expected a URL target"),
        }
    }

    #[test]
    fn utf16_be_round_trips() {
        let encoded = encode_utf16_be("supl.example.org");
        assert_eq!(decode_utf16_be(&encoded).unwrap(), "supl.example.org");
    }
}
