//! gamelink Core - Shared types and protocol definitions
//!
//! This crate provides the configuration, error type and JSON wire types
//! shared by the pairing core, the HTTP server and device clients.

pub mod config;
pub mod error;
pub mod protocol;

pub use config::{Config, HashCost, SessionSeed, MAX_TTL_SECS};
pub use error::{Error, Result};
pub use protocol::{
    ApprovalInfo, CreatePairingResponse, DeviceIdentityResponse, ErrorResponse,
    ExchangeRequest, ExchangeResponse, PairingStateKind, PairingStateResponse, UserIdentity,
};
