//! Execution environment collaborators
//!
//! The account never talks to a concrete chain. Calls are dispatched through
//! the [`Dispatcher`] capability, token refunds go through [`TokenLedger`], and
//! the surrounding [`Host`] supplies balances, time and checkpoints so a
//! failed operation can be rolled back in full.
//!
//! A host is always bound to one account: `invoke`, `transfer` and
//! `send_value` spend from [`Host::account`].

use alloy_primitives::{Address, U256};
use thiserror::Error;

pub mod memory;

pub use memory::{CallRecord, MemoryChain, MemoryHost};

/// Failure reported by the execution environment for a dispatched call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CallError {
    /// Human-readable reason
    pub reason: String,
}

impl CallError {
    /// Create a call error
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<CallError> for crate::Error {
    fn from(e: CallError) -> Self {
        crate::Error::CallFailed(e.reason)
    }
}

/// Opaque host checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(pub usize);

/// Call dispatch capability
pub trait Dispatcher {
    /// Execute `{to, value, data}` from the bound account with a gas stipend
    ///
    /// # Returns
    /// Gas consumed by the call
    fn invoke(&mut self, to: Address, value: U256, data: &[u8], gas: u64)
    -> Result<u64, CallError>;

    /// Gas `invoke` would consume for the same call, without executing it
    fn estimate_gas(&self, to: Address, value: U256, data: &[u8]) -> u64;
}

/// ERC20-style token ledger used for gas-token refunds
pub trait TokenLedger {
    /// Token balance of `owner`
    fn balance_of(&self, token: Address, owner: Address) -> U256;

    /// Transfer tokens from the bound account; `false` if the token refused
    fn transfer(&mut self, token: Address, to: Address, amount: U256) -> bool;
}

/// Execution environment bound to one account
pub trait Host: Dispatcher + TokenLedger {
    /// Address of the account this host acts for
    fn account(&self) -> Address;

    /// Native balance of `who`
    fn balance(&self, who: Address) -> U256;

    /// Send native currency from the bound account
    fn send_value(&mut self, to: Address, amount: U256) -> Result<(), CallError>;

    /// Current block timestamp (Unix seconds)
    fn timestamp(&self) -> u64;

    /// Open a checkpoint that can be reverted
    fn checkpoint(&mut self) -> Checkpoint;

    /// Undo everything since `checkpoint`
    fn revert_to(&mut self, checkpoint: Checkpoint);

    /// Keep everything since `checkpoint`
    fn commit(&mut self, checkpoint: Checkpoint);
}
