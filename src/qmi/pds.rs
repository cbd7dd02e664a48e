//! PDS (Position Determination Service, legacy) subset used by the location
//! subsystem (spec §4.6).

use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgpsNetworkMode {
    Umts,
    Cdma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingSessionMode {
    MsAssisted,
    Standalone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgpsServer {
    IpPort(Ipv4Addr, u16),
    /// Big-endian UTF-16 bytes (spec §4.6 SUPL server set/get).
    Url(Vec<u8>),
}

#[derive(Debug, Clone)]
pub enum PdsRequest {
    SetGpsServiceState { on: bool },
    SetAutoTrackingState { on: bool },
    SetEventReport { nmea_position_reporting: bool },
    SetAgpsConfig { network_mode: AgpsNetworkMode, server: AgpsServer },
    GetAgpsConfig,
    GetSessionControlState,
    SetSessionControlState { mode: TrackingSessionMode },
}

#[derive(Debug, Clone)]
pub enum PdsResponse {
    Ack,
    AgpsConfig {
        ip_port: Option<(Ipv4Addr, u16)>,
        url: Option<Vec<u8>>,
    },
    SessionControlState(TrackingSessionMode),
}

/// PDS forwards NMEA sentences continuously once a session is started; it is
/// not correlated by token (spec §4.6 "forwards NMEA sentences to the upper
/// layer").
#[derive(Debug, Clone)]
pub enum PdsIndication {
    EventReport { nmea: String },
}

impl PdsIndication {
    pub fn token(&self) -> Option<crate::qmi::Token> {
        None
    }
}
