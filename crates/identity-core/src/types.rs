//! Core types for the identity account
//!
//! This module defines the fundamental types shared by the key registry, the
//! approval queue and the signed relay engine: key identifiers, purpose and key
//! type codes, and recoverable ECDSA signatures.

use crate::{Error, Result};
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque 32-byte key identifier
///
/// Keys registered for externally owned accounts are the account address
/// left-padded to 32 bytes (see [`KeyId::from_address`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub B256);

impl KeyId {
    /// Canonical key for an externally owned account
    pub fn from_address(address: Address) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_slice());
        KeyId(B256::from(word))
    }

    /// Address this key was derived from, if it is a left-padded address
    pub fn to_address(&self) -> Option<Address> {
        let bytes = self.0.as_slice();
        if bytes[..12].iter().all(|b| *b == 0) {
            Some(Address::from_slice(&bytes[12..]))
        } else {
            None
        }
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0.0
    }
}

impl From<B256> for KeyId {
    fn from(value: B256) -> Self {
        KeyId(value)
    }
}

impl From<Address> for KeyId {
    fn from(value: Address) -> Self {
        KeyId::from_address(value)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Role tag granting a key specific authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Purpose(pub u64);

impl Purpose {
    /// Manage keys, approve or reject queued and self-directed transactions
    pub const MANAGEMENT: Purpose = Purpose(1);
    /// Request and auto-execute outgoing calls, sign meta-transactions
    pub const ACTION: Purpose = Purpose(2);
    /// Claim signer
    pub const CLAIM: Purpose = Purpose(3);
    /// Encryption key
    pub const ENCRYPTION: Purpose = Purpose(4);

    /// Numeric purpose code
    pub fn code(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Purpose::MANAGEMENT => write!(f, "MANAGEMENT(1)"),
            Purpose::ACTION => write!(f, "ACTION(2)"),
            Purpose::CLAIM => write!(f, "CLAIM(3)"),
            Purpose::ENCRYPTION => write!(f, "ENCRYPTION(4)"),
            Purpose(code) => write!(f, "{}", code),
        }
    }
}

/// Key scheme tag
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct KeyType(pub u64);

impl KeyType {
    /// Reported for keys that are not registered
    pub const NONE: KeyType = KeyType(0);
    /// secp256k1 ECDSA
    pub const ECDSA: KeyType = KeyType(1);
    /// RSA
    pub const RSA: KeyType = KeyType(2);

    /// Numeric key type code
    pub fn code(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a registry entry as returned by `get_key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Key identifier that was looked up
    pub key: KeyId,
    /// Purposes in the order they were granted (empty for unknown keys)
    pub purposes: Vec<Purpose>,
    /// Key type (`KeyType::NONE` for unknown keys)
    pub key_type: KeyType,
}

impl KeyInfo {
    /// Check whether the key is registered
    pub fn exists(&self) -> bool {
        !self.purposes.is_empty()
    }
}

/// Recoverable ECDSA signature (r, s, v)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// R component (32 bytes)
    pub r: [u8; 32],
    /// S component (32 bytes)
    pub s: [u8; 32],
    /// Recovery ID (0 or 1)
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Parse a 65-byte `r || s || v` signature
    ///
    /// `v` may be given either as a raw recovery id (0/1) or in the
    /// Ethereum form (27/28).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(Error::InvalidSignature(format!(
                "expected 65 bytes, got {}",
                bytes.len()
            )));
        }

        let recovery_id = match bytes[64] {
            0 | 1 => bytes[64],
            27 | 28 => bytes[64] - 27,
            v => {
                return Err(Error::InvalidSignature(format!("invalid v value {}", v)));
            }
        };

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, recovery_id })
    }

    /// Convert to Ethereum byte format (r || s || v) with v in {27, 28}
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v();
        bytes
    }

    /// Get v value in Ethereum form
    pub fn v(&self) -> u8 {
        self.recovery_id + 27
    }
}

/// Compute Keccak256 hash of data
pub fn keccak256_hash(data: &[u8]) -> [u8; 32] {
    use tiny_keccak::{Hasher, Keccak};
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}
