//! Typed catalogue of the QMI messages this core exchanges with the five
//! subservices it drives (spec §6 "QMI wire protocol - only the subset consumed").
//!
//! Wire framing and serialization are out of scope (spec §1) and live in the real
//! transport; this module only carries the typed request/response/indication
//! shapes the rest of the crate builds dialogs out of.

pub mod dms;
pub mod loc;
pub mod nas;
pub mod pdc;
pub mod pds;

/// A QMI subservice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Nas,
    Dms,
    Pdc,
    Pds,
    Loc,
}

/// Monotonically increasing per-request correlation token (spec §5).
pub type Token = u32;

/// Protocol-level failure codes recognized by name (spec §6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The requested change would have no effect; treated as idempotent success
    /// by Set-Technology-Preference and the GPS service-state calls.
    NoEffect,
    /// No carrier config / SUPL config is provisioned; the default is in use.
    NotProvisioned,
    /// The dialog is not supported by this firmware; triggers a fallback dialog
    /// in Carrier Config and Assistance Inject only.
    NotSupported,
    /// Any other named QMI error, carried as a raw code for diagnostics.
    Other(u16),
}

/// A typed request sent through the [`crate::gateway::ClientGateway`].
#[derive(Debug, Clone)]
pub enum Request {
    Nas(nas::NasRequest),
    Dms(dms::DmsRequest),
    Pdc(pdc::PdcRequest),
    Pds(pds::PdsRequest),
    Loc(loc::LocRequest),
}

/// A typed response delivered by the transport for a [`Request`].
#[derive(Debug, Clone)]
pub enum Response {
    Nas(nas::NasResponse),
    Dms(dms::DmsResponse),
    Pdc(pdc::PdcResponse),
    Pds(pds::PdsResponse),
    Loc(loc::LocResponse),
}

/// A typed asynchronous indication pushed by the transport, independent of the
/// request/response cycle that may have triggered it.
#[derive(Debug, Clone)]
pub enum Indication {
    Pdc(pdc::PdcIndication),
    Pds(pds::PdsIndication),
    Loc(loc::LocIndication),
}

impl Indication {
    /// The correlation token this indication answers, if any (spec §5).
    pub fn token(&self) -> Option<Token> {
        match self {
            Indication::Pdc(i) => i.token(),
            Indication::Pds(i) => i.token(),
            Indication::Loc(i) => i.token(),
        }
    }
}
