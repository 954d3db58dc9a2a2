//! In-memory execution environment for testing and local simulation
//!
//! `MemoryChain` keeps native and token balances plus a log of dispatched calls.
//! Checkpoints snapshot the whole world state, so reverting restores balances
//! and drops the calls made since the checkpoint.

use super::{CallError, Checkpoint, Dispatcher, Host, TokenLedger};
use alloy_primitives::{Address, Bytes, U256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A call that reached its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Calling account
    pub from: Address,
    /// Call target
    pub to: Address,
    /// Native value transferred
    pub value: U256,
    /// Call data
    pub data: Bytes,
    /// Gas consumed
    pub gas_used: u64,
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    native: HashMap<Address, U256>,
    /// (token, owner) -> balance
    tokens: HashMap<(Address, Address), U256>,
    calls: Vec<CallRecord>,
}

/// In-memory world state shared by any number of accounts
#[derive(Debug)]
pub struct MemoryChain {
    state: ChainState,
    snapshots: Vec<ChainState>,
    timestamp: u64,
    reverting: HashSet<Address>,
    refusing_tokens: HashSet<Address>,
    call_gas: u64,
    gas_per_byte: u64,
}

impl MemoryChain {
    /// Create an empty chain with the clock at the current time
    pub fn new() -> Self {
        Self::with_call_gas(21_000, 16)
    }

    /// Create an empty chain with a custom per-call gas model
    pub fn with_call_gas(call_gas: u64, gas_per_byte: u64) -> Self {
        Self {
            state: ChainState::default(),
            snapshots: Vec::new(),
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            reverting: HashSet::new(),
            refusing_tokens: HashSet::new(),
            call_gas,
            gas_per_byte,
        }
    }

    /// Bind a host view to `account`
    pub fn host(&mut self, account: Address) -> MemoryHost<'_> {
        MemoryHost {
            chain: self,
            account,
        }
    }

    /// Credit native currency to `who`
    pub fn fund(&mut self, who: Address, amount: U256) {
        *self.state.native.entry(who).or_default() += amount;
    }

    /// Native balance of `who`
    pub fn native_balance(&self, who: Address) -> U256 {
        self.state.native.get(&who).copied().unwrap_or_default()
    }

    /// Credit `amount` of `token` to `who`
    pub fn mint(&mut self, token: Address, who: Address, amount: U256) {
        *self.state.tokens.entry((token, who)).or_default() += amount;
    }

    /// Token balance of `who`
    pub fn token_balance(&self, token: Address, who: Address) -> U256 {
        self.state
            .tokens
            .get(&(token, who))
            .copied()
            .unwrap_or_default()
    }

    /// Make every call to `target` revert
    pub fn revert_calls_to(&mut self, target: Address) {
        self.reverting.insert(target);
    }

    /// Make `token` return `false` from every transfer
    pub fn refuse_transfers(&mut self, token: Address) {
        self.refusing_tokens.insert(token);
    }

    /// Set the block timestamp
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Move the clock forward
    pub fn advance_time(&mut self, secs: u64) {
        self.timestamp += secs;
    }

    /// Current block timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Calls that reached their target, oldest first
    pub fn calls(&self) -> &[CallRecord] {
        &self.state.calls
    }

    /// Gas a call with `data_len` bytes of data consumes
    pub fn call_cost(&self, data_len: usize) -> u64 {
        self.call_gas + self.gas_per_byte * data_len as u64
    }

    fn move_native(&mut self, from: Address, to: Address, amount: U256) -> Result<(), CallError> {
        let available = self.native_balance(from);
        if available < amount {
            return Err(CallError::new(format!(
                "insufficient balance: need {}, have {}",
                amount, available
            )));
        }
        self.state.native.insert(from, available - amount);
        *self.state.native.entry(to).or_default() += amount;
        Ok(())
    }
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

/// [`MemoryChain`] bound to one account
#[derive(Debug)]
pub struct MemoryHost<'a> {
    chain: &'a mut MemoryChain,
    account: Address,
}

impl Dispatcher for MemoryHost<'_> {
    fn invoke(
        &mut self,
        to: Address,
        value: U256,
        data: &[u8],
        gas: u64,
    ) -> Result<u64, CallError> {
        let gas_used = self.chain.call_cost(data.len());
        if gas_used > gas {
            return Err(CallError::new(format!(
                "out of gas: need {}, stipend {}",
                gas_used, gas
            )));
        }
        if self.chain.reverting.contains(&to) {
            return Err(CallError::new(format!("call to {} reverted", to)));
        }

        self.chain.move_native(self.account, to, value)?;
        self.chain.state.calls.push(CallRecord {
            from: self.account,
            to,
            value,
            data: Bytes::copy_from_slice(data),
            gas_used,
        });
        debug!(from = %self.account, to = %to, value = %value, gas_used, "Call dispatched");
        Ok(gas_used)
    }

    fn estimate_gas(&self, _to: Address, _value: U256, data: &[u8]) -> u64 {
        self.chain.call_cost(data.len())
    }
}

impl TokenLedger for MemoryHost<'_> {
    fn balance_of(&self, token: Address, owner: Address) -> U256 {
        self.chain.token_balance(token, owner)
    }

    fn transfer(&mut self, token: Address, to: Address, amount: U256) -> bool {
        if self.chain.refusing_tokens.contains(&token) {
            return false;
        }
        let available = self.chain.token_balance(token, self.account);
        if available < amount {
            return false;
        }
        self.chain
            .state
            .tokens
            .insert((token, self.account), available - amount);
        self.chain.mint(token, to, amount);
        true
    }
}

impl Host for MemoryHost<'_> {
    fn account(&self) -> Address {
        self.account
    }

    fn balance(&self, who: Address) -> U256 {
        self.chain.native_balance(who)
    }

    fn send_value(&mut self, to: Address, amount: U256) -> Result<(), CallError> {
        self.chain.move_native(self.account, to, amount)
    }

    fn timestamp(&self) -> u64 {
        self.chain.timestamp
    }

    fn checkpoint(&mut self) -> Checkpoint {
        self.chain.snapshots.push(self.chain.state.clone());
        Checkpoint(self.chain.snapshots.len() - 1)
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) {
        if let Some(state) = self.chain.snapshots.get(checkpoint.0).cloned() {
            self.chain.state = state;
        }
        self.chain.snapshots.truncate(checkpoint.0);
    }

    fn commit(&mut self, checkpoint: Checkpoint) {
        self.chain.snapshots.truncate(checkpoint.0);
    }
}
