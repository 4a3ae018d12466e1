//! # Domain Module
//!
//! Core domain types for the heterogeneous bridge.

pub mod config;
pub mod entities;
pub mod errors;
pub mod secure_key;
pub mod value_objects;

pub use config::{BridgeConfig, ContractSignatures, QuorumParams, DEFAULT_HEADER_RETENTION};
pub use entities::*;
pub use errors::*;
pub use secure_key::{SecureKey, SigningIdentity};
pub use value_objects::*;
