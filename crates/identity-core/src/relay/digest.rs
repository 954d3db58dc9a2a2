//! Canonical meta-transaction digest
//!
//! Packed layout (all integers big-endian, no padding between fields):
//!
//! | field | bytes |
//! |---|---|
//! | `0x19` prefix | 1 |
//! | version `0x00` | 1 |
//! | from | 20 |
//! | to | 20 |
//! | value | 32 |
//! | keccak256(data) | 32 |
//! | selector (first 4 bytes of data, zero-padded) | 4 |
//! | nonce | 32 |
//! | gas price | 32 |
//! | gas limit | 32 |
//! | gas token | 20 |
//! | operation type | 1 |
//! | extra hash | 32 |

use super::SignedMessage;
use crate::types::keccak256_hash;
use alloy_primitives::{B256, U256};

/// First byte of the packed encoding
pub const DIGEST_PREFIX: u8 = 0x19;

/// Encoding version
pub const DIGEST_VERSION: u8 = 0x00;

/// Length of the packed encoding
pub const PACKED_LEN: usize = 1 + 1 + 20 + 20 + 32 + 32 + 4 + 32 + 32 + 32 + 20 + 1 + 32;

/// Packed pre-image of the digest
pub fn pack_message(message: &SignedMessage) -> Vec<u8> {
    let mut packed = Vec::with_capacity(PACKED_LEN);

    packed.push(DIGEST_PREFIX);
    packed.push(DIGEST_VERSION);
    packed.extend_from_slice(message.from.as_slice());
    packed.extend_from_slice(message.to.as_slice());
    packed.extend_from_slice(&message.value.to_be_bytes::<32>());

    // keccak256(data) plus the selector it starts with
    packed.extend_from_slice(&keccak256_hash(&message.data));
    packed.extend_from_slice(&message.selector());

    packed.extend_from_slice(&U256::from(message.nonce).to_be_bytes::<32>());
    packed.extend_from_slice(&message.gas_price.to_be_bytes::<32>());
    packed.extend_from_slice(&U256::from(message.gas_limit).to_be_bytes::<32>());
    packed.extend_from_slice(message.gas_token.as_slice());
    packed.push(message.operation_type.code());
    packed.extend_from_slice(message.extra_hash.as_slice());

    packed
}

/// Digest signers commit to
pub fn build_digest(message: &SignedMessage) -> B256 {
    B256::from(keccak256_hash(&pack_message(message)))
}
