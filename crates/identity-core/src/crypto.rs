//! ECDSA signing and recovery over secp256k1
//!
//! Signers sign the EIP-191 personal-message hash of a 32-byte digest
//! (`"\x19Ethereum Signed Message:\n32" || digest`), and the account recovers
//! the signer address from that same hash.

use crate::types::{KeyId, Signature, keccak256_hash};
use crate::{Error, Result};
use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// EIP-191 personal-message hash of a 32-byte digest
pub fn eth_signed_message_hash(digest: &B256) -> B256 {
    let mut message = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 32);
    message.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    message.extend_from_slice(digest.as_slice());
    B256::from(keccak256_hash(&message))
}

/// Ethereum address of a secp256k1 public key
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    // Skip the 0x04 prefix and take the last 20 bytes of the hash
    let hash = keccak256_hash(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recover the address that signed `digest`
pub fn recover_signer(digest: &B256, signature: &Signature) -> Result<Address> {
    let sig = k256::ecdsa::Signature::from_scalars(
        *k256::FieldBytes::from_slice(&signature.r),
        *k256::FieldBytes::from_slice(&signature.s),
    )
    .map_err(|e| Error::InvalidSignature(e.to_string()))?;

    let recovery_id = RecoveryId::from_byte(signature.recovery_id).ok_or_else(|| {
        Error::InvalidSignature(format!("invalid recovery id {}", signature.recovery_id))
    })?;

    let prehash = eth_signed_message_hash(digest);
    let key = VerifyingKey::recover_from_prehash(prehash.as_slice(), &sig, recovery_id)
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;

    Ok(address_from_verifying_key(&key))
}

/// Recover the registry key that signed `digest`
pub fn recover_key(digest: &B256, signature: &Signature) -> Result<KeyId> {
    recover_signer(digest, signature).map(KeyId::from_address)
}

/// Single-key signer for off-chain message signing
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Generate a fresh random signer
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Load a signer from a 32-byte secret
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| Error::InvalidConfig(format!("invalid secret key: {}", e)))?;
        Ok(Self::from_signing_key(key))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    /// Signer address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Registry key of this signer
    pub fn key_id(&self) -> KeyId {
        KeyId::from_address(self.address)
    }

    /// Sign the personal-message hash of `digest`
    pub fn sign_digest(&self, digest: &B256) -> Result<Signature> {
        let prehash = eth_signed_message_hash(digest);
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(prehash.as_slice())
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;

        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature::new(r, s, recovery_id.to_byte()))
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
