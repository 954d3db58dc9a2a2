//! Account notifications
//!
//! Every successful mutating operation appends to the account's event log.
//! Failed operations roll the log back together with the rest of the state.

use crate::approval::TxHandle;
use crate::types::{KeyId, KeyType, Purpose};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Event emitted by an identity account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccountEvent {
    /// A purpose was granted to a key
    KeyAdded {
        key: KeyId,
        purpose: Purpose,
        key_type: KeyType,
    },
    /// A purpose was revoked from a key
    KeyRemoved { key: KeyId, purpose: Purpose },
    /// A direct execution was queued for approval
    ExecutionRequested {
        handle: TxHandle,
        to: Address,
        value: U256,
    },
    /// A queued or direct execution was dispatched
    Executed { handle: TxHandle },
    /// A relayed meta-transaction was dispatched and the relayer refunded
    ExecutedSigned {
        digest: B256,
        nonce: u64,
        relayer: Address,
        gas_used: u64,
        refund: U256,
        gas_token: Address,
    },
    /// Signature threshold for meta-transactions changed
    RequiredSignaturesChanged { required: usize },
}

impl AccountEvent {
    /// Short event name
    pub fn name(&self) -> &'static str {
        match self {
            AccountEvent::KeyAdded { .. } => "KeyAdded",
            AccountEvent::KeyRemoved { .. } => "KeyRemoved",
            AccountEvent::ExecutionRequested { .. } => "ExecutionRequested",
            AccountEvent::Executed { .. } => "Executed",
            AccountEvent::ExecutedSigned { .. } => "ExecutedSigned",
            AccountEvent::RequiredSignaturesChanged { .. } => "RequiredSignaturesChanged",
        }
    }
}
