//! Calls the account makes to itself
//!
//! Registry mutations can be routed through the approval queue or a signed
//! message by targeting the account's own address with ABI-encoded call data.
//! Only the functions below are understood; anything else fails the call.

use crate::types::{KeyId, KeyType, Purpose};
use crate::{Error, Result};
use alloy_primitives::U256;
use alloy_sol_types::{SolCall, sol};

sol! {
    /// Management surface of the identity account
    interface IIdentity {
        function addKey(bytes32 key, uint256 purpose, uint256 keyType) external returns (bool success);
        function removeKey(bytes32 key, uint256 purpose) external returns (bool success);
        function setRequiredSignatures(uint256 requiredSignatures) external;
    }
}

/// Decoded self-directed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfCall {
    /// `addKey(bytes32,uint256,uint256)`
    AddKey {
        key: KeyId,
        purpose: Purpose,
        key_type: KeyType,
    },
    /// `removeKey(bytes32,uint256)`
    RemoveKey { key: KeyId, purpose: Purpose },
    /// `setRequiredSignatures(uint256)`
    SetRequiredSignatures { required: usize },
}

impl SelfCall {
    /// Decode call data addressed to the account
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::CallFailed(
                "self call data shorter than a selector".into(),
            ));
        }

        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);

        match selector {
            IIdentity::addKeyCall::SELECTOR => {
                let call = IIdentity::addKeyCall::abi_decode(data, true).map_err(abi_error)?;
                Ok(SelfCall::AddKey {
                    key: KeyId(call.key),
                    purpose: Purpose(to_u64(call.purpose, "purpose")?),
                    key_type: KeyType(to_u64(call.keyType, "key type")?),
                })
            }
            IIdentity::removeKeyCall::SELECTOR => {
                let call =
                    IIdentity::removeKeyCall::abi_decode(data, true).map_err(abi_error)?;
                Ok(SelfCall::RemoveKey {
                    key: KeyId(call.key),
                    purpose: Purpose(to_u64(call.purpose, "purpose")?),
                })
            }
            IIdentity::setRequiredSignaturesCall::SELECTOR => {
                let call = IIdentity::setRequiredSignaturesCall::abi_decode(data, true)
                    .map_err(abi_error)?;
                Ok(SelfCall::SetRequiredSignatures {
                    required: to_usize(call.requiredSignatures, "required signatures")?,
                })
            }
            other => Err(Error::CallFailed(format!(
                "unknown self call selector 0x{}",
                hex::encode(other)
            ))),
        }
    }

    /// ABI-encode the call
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            SelfCall::AddKey {
                key,
                purpose,
                key_type,
            } => IIdentity::addKeyCall {
                key: key.0,
                purpose: U256::from(purpose.code()),
                keyType: U256::from(key_type.code()),
            }
            .abi_encode(),
            SelfCall::RemoveKey { key, purpose } => IIdentity::removeKeyCall {
                key: key.0,
                purpose: U256::from(purpose.code()),
            }
            .abi_encode(),
            SelfCall::SetRequiredSignatures { required } => {
                IIdentity::setRequiredSignaturesCall {
                    requiredSignatures: U256::from(required),
                }
                .abi_encode()
            }
        }
    }
}

fn to_u64(value: U256, what: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(Error::CallFailed(format!("{} {} out of range", what, value)));
    }
    Ok(value.to::<u64>())
}

fn to_usize(value: U256, what: &str) -> Result<usize> {
    usize::try_from(to_u64(value, what)?)
        .map_err(|_| Error::CallFailed(format!("{} {} out of range", what, value)))
}

fn abi_error(e: alloy_sol_types::Error) -> Error {
    Error::CallFailed(format!("malformed self call: {}", e))
}
