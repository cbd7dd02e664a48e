//! PDC (Persistent Device Config) subset: carrier configuration list/info/
//! select/activate dialogs (spec §4.5).

use crate::qmi::{ProtocolError, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    Software,
}

/// An opaque carrier-config identifier, as returned by List-Configs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigId(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigListEntry {
    pub id: ConfigId,
    pub config_type: ConfigType,
}

#[derive(Debug, Clone)]
pub enum PdcRequest {
    ListConfigs {
        config_type: ConfigType,
    },
    GetConfigInfo {
        token: Token,
        config_type: ConfigType,
        id: ConfigId,
    },
    GetSelectedConfig {
        token: Token,
        config_type: ConfigType,
    },
    SetSelectedConfig {
        token: Token,
        config_type: ConfigType,
        id: ConfigId,
    },
    ActivateConfig {
        token: Token,
        config_type: ConfigType,
    },
}

#[derive(Debug, Clone)]
pub enum PdcResponse {
    ConfigList(Vec<ConfigListEntry>),
    Ack,
}

/// Indications correlated by the tokens the engine allocated per outstanding
/// request (spec §4.5, §5).
#[derive(Debug, Clone)]
pub enum PdcIndication {
    GetConfigInfo {
        token: Token,
        description: String,
        version: u32,
        total_size: u64,
    },
    GetConfigInfoFailed {
        token: Token,
        error: ProtocolError,
    },
    SelectedConfig {
        token: Token,
        id: ConfigId,
    },
    /// `not-provisioned` - the device has no config selected and is using its
    /// built-in default (spec §4.5 step 3).
    SelectedConfigFailed {
        token: Token,
        error: ProtocolError,
    },
    SetSelectedConfig {
        token: Token,
    },
    ActivateConfig {
        token: Token,
    },
}

impl PdcIndication {
    pub fn token(&self) -> Option<Token> {
        Some(match self {
            PdcIndication::GetConfigInfo { token, .. } => *token,
            PdcIndication::GetConfigInfoFailed { token, .. } => *token,
            PdcIndication::SelectedConfig { token, .. } => *token,
            PdcIndication::SelectedConfigFailed { token, .. } => *token,
            PdcIndication::SetSelectedConfig { token } => *token,
            PdcIndication::ActivateConfig { token } => *token,
        })
    }
}
