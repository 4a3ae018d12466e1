//! # Signing Identity
//!
//! The node's signing key material as handed to a docking adapter on import.
//! Private key bytes are zeroed on drop and never formatted.

use super::value_objects::Address;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secp256k1 private key that zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureKey {
    inner: [u8; 32],
}

impl SecureKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { inner: bytes }
    }

    /// Parse from hex (with or without `0x`).
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let mut inner = [0u8; 32];
        hex::decode_to_slice(raw, &mut inner).ok()?;
        Some(Self { inner })
    }

    /// Key bytes. Do not hold on to the reference.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.inner
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecureKey(***)")
    }
}

/// Signing identity of the local node.
#[derive(Clone, Debug)]
pub struct SigningIdentity {
    /// Platform-side signing address (quorum membership key).
    pub platform_address: String,
    /// External-chain address derived from the key.
    pub external_address: Address,
    /// Hex public key.
    pub public_key: String,
    /// Private key.
    pub private_key: SecureKey,
}
