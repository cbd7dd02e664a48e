//! QMI Shared Modem Control Core.
//!
//! Device-agnostic control plane above a QMI transport: capability and mode
//! selection, band selection, carrier configuration, and GPS/A-GPS location
//! services. The raw QMI transport (framing, message serialization, service
//! client allocation), device discovery, and upper-level bus interfaces are
//! out of scope - this crate only depends on them through the [`gateway::Transport`]
//! trait.

pub mod band;
pub mod capability;
pub mod carrier_config;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod feature_probe;
pub mod gateway;
pub mod location;
pub mod mask;
pub mod qmi;

pub use config::DeviceConfig;
pub use device::{DeviceContext, DeviceRegistry};
pub use error::Error;
pub use gateway::{ClientGateway, Transport};
