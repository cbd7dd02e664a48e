//! LOC (Location, modern) subset used by the location subsystem (spec §4.6).

use bitflags::bitflags;

use crate::qmi::{ProtocolError, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Periodic,
    SingleShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    UmtsSlp,
    CdmaPde,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgpsServerValue {
    IpPort(std::net::Ipv4Addr, u16),
    /// Raw UTF-8 (spec §4.6: "for LOC the URL is raw UTF-8").
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Standalone,
    Msa,
    Msb,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u32 {
        const NMEA = 0b1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistanceFormat {
    Xtra,
}

#[derive(Debug, Clone)]
pub enum LocRequest {
    Start {
        session_id: u8,
        intermediate_report: bool,
        min_interval_ms: u32,
        recurrence: Recurrence,
    },
    Stop {
        session_id: u8,
    },
    RegisterEvents {
        mask: EventMask,
    },
    SetServer {
        token: Token,
        server_type: ServerType,
        value: AgpsServerValue,
    },
    GetServer {
        token: Token,
        server_type: ServerType,
    },
    GetOperationMode,
    SetOperationMode {
        mode: OperationMode,
    },
    GetPredictedOrbitsDataSource {
        token: Token,
    },
    InjectPredictedOrbitsData {
        token: Token,
        total_size: u32,
        total_parts: u16,
        part_number: u16,
        data: Vec<u8>,
        format: AssistanceFormat,
    },
    /// Legacy fallback dialog used when Inject-Predicted-Orbits-Data answers
    /// `not-supported` (spec §4.6 "Inject assistance data").
    InjectXtraData {
        token: Token,
        total_size: u32,
        total_parts: u16,
        part_number: u16,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub enum LocResponse {
    Ack,
    OperationMode(OperationMode),
}

#[derive(Debug, Clone)]
pub enum LocIndication {
    SetServer {
        token: Token,
        result: Result<(), ProtocolError>,
    },
    GetServer {
        token: Token,
        ip_port: Option<(std::net::Ipv4Addr, u16)>,
        url: Option<String>,
    },
    /// Forwarded continuously once `RegisterEvents` is active; not
    /// token-correlated, same as PDS's event-report indication.
    Nmea {
        sentence: String,
    },
    PredictedOrbitsDataSource {
        token: Token,
        servers: Vec<String>,
        max_file_size: Option<u32>,
        max_part_size: Option<u32>,
    },
    InjectPredictedOrbitsData {
        token: Token,
        result: Result<(), ProtocolError>,
    },
}

impl LocIndication {
    pub fn token(&self) -> Option<Token> {
        match self {
            LocIndication::SetServer { token, .. } => Some(*token),
            LocIndication::GetServer { token, .. } => Some(*token),
            LocIndication::Nmea { .. } => None,
            LocIndication::PredictedOrbitsDataSource { token, .. } => Some(*token),
            LocIndication::InjectPredictedOrbitsData { token, .. } => Some(*token),
        }
    }
}
