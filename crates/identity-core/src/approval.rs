//! Pending transaction queue
//!
//! Records every directly requested execution. A record starts `Requested` and
//! ends either `Executed` or `Rejected`; both are terminal. Records are never
//! deleted and handles start at 1.

use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Handle of a pending transaction
pub type TxHandle = u64;

/// Status of a pending transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a management key
    Requested,
    /// Call dispatched successfully
    Executed,
    /// Rejected by a management key
    Rejected,
}

impl ApprovalStatus {
    /// Check if the transaction is still waiting
    pub fn is_pending(&self) -> bool {
        matches!(self, ApprovalStatus::Requested)
    }

    /// Check if no further transitions are allowed
    pub fn is_finalized(&self) -> bool {
        !self.is_pending()
    }
}

/// A requested execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Handle (1-based)
    pub handle: TxHandle,
    /// Call target
    pub to: Address,
    /// Native value to send
    pub value: U256,
    /// Call data
    pub data: Bytes,
    /// Rejected by a management key
    pub rejected: bool,
    /// Dispatched successfully
    pub executed: bool,
}

impl PendingTransaction {
    /// Current status
    pub fn status(&self) -> ApprovalStatus {
        if self.executed {
            ApprovalStatus::Executed
        } else if self.rejected {
            ApprovalStatus::Rejected
        } else {
            ApprovalStatus::Requested
        }
    }

    /// Whether the transaction is terminal
    pub fn is_finalized(&self) -> bool {
        self.status().is_finalized()
    }
}

/// Append-only log of requested executions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalQueue {
    transactions: Vec<PendingTransaction>,
}

impl ApprovalQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new `Requested` record and return its handle
    pub fn request(&mut self, to: Address, value: U256, data: Bytes) -> TxHandle {
        let handle = self.transactions.len() as TxHandle + 1;
        self.transactions.push(PendingTransaction {
            handle,
            to,
            value,
            data,
            rejected: false,
            executed: false,
        });
        handle
    }

    /// Look up a record
    pub fn get(&self, handle: TxHandle) -> Option<&PendingTransaction> {
        let index = usize::try_from(handle).ok()?.checked_sub(1)?;
        self.transactions.get(index)
    }

    /// Look up a record that can still transition
    pub fn get_open(&self, handle: TxHandle) -> Result<&PendingTransaction> {
        let tx = self
            .get(handle)
            .ok_or(Error::TransactionNotFound(handle))?;
        if tx.is_finalized() {
            return Err(Error::AlreadyFinalized(handle));
        }
        Ok(tx)
    }

    /// Move a `Requested` record to `Executed`
    pub fn mark_executed(&mut self, handle: TxHandle) -> Result<()> {
        self.get_open(handle)?;
        if let Some(tx) = self.get_mut(handle) {
            tx.executed = true;
        }
        Ok(())
    }

    /// Move a `Requested` record to `Rejected`
    pub fn reject(&mut self, handle: TxHandle) -> Result<()> {
        self.get_open(handle)?;
        if let Some(tx) = self.get_mut(handle) {
            tx.rejected = true;
        }
        Ok(())
    }

    /// Number of records ever created
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether no record was ever created
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Records still waiting for approval
    pub fn pending(&self) -> impl Iterator<Item = &PendingTransaction> {
        self.transactions.iter().filter(|tx| !tx.is_finalized())
    }

    /// All records in handle order
    pub fn iter(&self) -> impl Iterator<Item = &PendingTransaction> {
        self.transactions.iter()
    }

    fn get_mut(&mut self, handle: TxHandle) -> Option<&mut PendingTransaction> {
        let index = usize::try_from(handle).ok()?.checked_sub(1)?;
        self.transactions.get_mut(index)
    }
}
