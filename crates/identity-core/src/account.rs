//! Identity account
//!
//! [`IdentityAccount`] owns one key registry, one approval queue, the replay
//! watermarks and an event log. Every mutating operation is all-or-nothing:
//! the owned state is snapshotted and a host checkpoint is opened before any
//! effect, and both are restored if the operation fails.
//!
//! ## Direct execution
//!
//! ```rust,ignore
//! use identity_core::{AccountConfig, IdentityAccount, KeyId, MemoryChain};
//!
//! let mut chain = MemoryChain::new();
//! let mut account = IdentityAccount::new(address, KeyId::from_address(owner), AccountConfig::default())?;
//!
//! // Management keys execute immediately; others are queued
//! let handle = account.execute(owner, target, value, data, &mut chain.host(address))?;
//! ```

use crate::approval::{ApprovalQueue, PendingTransaction, TxHandle};
use crate::config::{AccountConfig, ThresholdMode};
use crate::events::AccountEvent;
use crate::host::Host;
use crate::policy::{AuthorizationPolicy, ExecutionDecision, is_self_call};
use crate::registry::KeyRegistry;
use crate::relay::ReplayState;
use crate::selfcall::SelfCall;
use crate::types::{KeyId, KeyInfo, KeyType, Purpose};
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Gas stipend for direct and approved executions (everything available)
pub const DIRECT_CALL_GAS: u64 = u64::MAX;

/// Mutable state of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AccountState {
    pub(crate) registry: KeyRegistry,
    pub(crate) queue: ApprovalQueue,
    pub(crate) replay: ReplayState,
    pub(crate) threshold: ThresholdMode,
    pub(crate) events: Vec<AccountEvent>,
}

/// Key-registry-backed smart account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAccount {
    pub(crate) address: Address,
    pub(crate) config: AccountConfig,
    pub(crate) state: AccountState,
}

impl IdentityAccount {
    /// Create an account at `address` with `owner` as its first management key
    pub fn new(address: Address, owner: KeyId, config: AccountConfig) -> Result<Self> {
        config.validate()?;

        let registry = KeyRegistry::with_management_key(owner, config.owner_key_type);
        let events = vec![AccountEvent::KeyAdded {
            key: owner,
            purpose: Purpose::MANAGEMENT,
            key_type: config.owner_key_type,
        }];

        info!(account = %address, owner = %owner, "Identity account created");

        Ok(Self {
            address,
            state: AccountState {
                registry,
                queue: ApprovalQueue::new(),
                replay: ReplayState::new(),
                threshold: config.threshold,
                events,
            },
            config,
        })
    }

    /// Account address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Account configuration
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Read-only view of the key registry
    pub fn registry(&self) -> &KeyRegistry {
        &self.state.registry
    }

    /// Authorization predicates over the current registry
    pub fn policy(&self) -> AuthorizationPolicy<'_> {
        AuthorizationPolicy::new(&self.state.registry, self.address)
            .with_open_requests(self.config.allow_open_requests)
    }

    // ============ Key Registry ============

    /// Grant `purpose` to `key`
    #[instrument(skip_all, fields(account = %self.address, caller = %caller, key = %key, purpose = %purpose))]
    pub fn add_key(
        &mut self,
        caller: Address,
        key: KeyId,
        purpose: Purpose,
        key_type: KeyType,
    ) -> Result<()> {
        self.ensure_manager(caller)?;
        self.apply_add_key(key, purpose, key_type)
    }

    /// Revoke `purpose` from `key`
    #[instrument(skip_all, fields(account = %self.address, caller = %caller, key = %key, purpose = %purpose))]
    pub fn remove_key(&mut self, caller: Address, key: KeyId, purpose: Purpose) -> Result<()> {
        self.ensure_manager(caller)?;
        self.apply_remove_key(key, purpose)
    }

    /// Look up a key; unknown keys have no purposes and type `NONE`
    pub fn get_key(&self, key: &KeyId) -> KeyInfo {
        self.state.registry.get_key(key)
    }

    /// Whether `key` holds `purpose`
    pub fn key_has_purpose(&self, key: &KeyId, purpose: Purpose) -> bool {
        self.state.registry.key_has_purpose(key, purpose)
    }

    /// Keys holding `purpose`, in grant order
    pub fn keys_by_purpose(&self, purpose: Purpose) -> Vec<KeyId> {
        self.state.registry.keys_by_purpose(purpose)
    }

    /// Key for an externally owned account
    pub fn address_to_key(address: Address) -> KeyId {
        KeyId::from_address(address)
    }

    /// Number of registered keys
    pub fn key_count(&self) -> usize {
        self.state.registry.key_count()
    }

    /// Number of keys holding `MANAGEMENT`
    pub fn management_key_count(&self) -> usize {
        self.state.registry.management_key_count()
    }

    // ============ Approval Queue ============

    /// Request a call from the account
    ///
    /// Callers with standing execute immediately; the returned handle is then
    /// already `Executed`. Otherwise the call is queued as `Requested`.
    #[instrument(skip_all, fields(account = %self.address, caller = %caller, to = %to, value = %value))]
    pub fn execute<H: Host>(
        &mut self,
        caller: Address,
        to: Address,
        value: U256,
        data: Bytes,
        host: &mut H,
    ) -> Result<TxHandle> {
        self.ensure_host(host)?;

        let decision = self.policy().execution_decision(caller, to);
        match decision {
            ExecutionDecision::Reject { reason } => {
                warn!(reason = %reason, "Execution request rejected");
                Err(Error::Unauthorized(reason))
            }
            ExecutionDecision::RequireApproval { reason } => {
                let handle = self.state.queue.request(to, value, data);
                self.state
                    .events
                    .push(AccountEvent::ExecutionRequested { handle, to, value });
                info!(handle, reason = %reason, "Execution queued for approval");
                Ok(handle)
            }
            ExecutionDecision::AutoExecute => self.atomically(host, |account, host| {
                let handle = account.state.queue.request(to, value, data.clone());
                account.dispatch(host, to, value, &data, DIRECT_CALL_GAS)?;
                account.state.queue.mark_executed(handle)?;
                account.state.events.push(AccountEvent::Executed { handle });
                info!(handle, "Execution dispatched");
                Ok(handle)
            }),
        }
    }

    /// Approve or reject a queued call
    ///
    /// Rejection is silent. Approval dispatches the call; if the call fails the
    /// whole approval is undone and the transaction stays `Requested`.
    #[instrument(skip_all, fields(account = %self.address, caller = %caller, handle = handle, approved = approved))]
    pub fn approve<H: Host>(
        &mut self,
        caller: Address,
        handle: TxHandle,
        approved: bool,
        host: &mut H,
    ) -> Result<()> {
        self.ensure_host(host)?;
        self.ensure_manager(caller)?;

        let tx = self.state.queue.get_open(handle)?.clone();

        if !approved {
            self.state.queue.reject(handle)?;
            info!(handle, "Transaction rejected");
            return Ok(());
        }

        self.atomically(host, |account, host| {
            account.dispatch(host, tx.to, tx.value, &tx.data, DIRECT_CALL_GAS)?;
            account.state.queue.mark_executed(handle)?;
            account.state.events.push(AccountEvent::Executed { handle });
            info!(handle, "Approved transaction dispatched");
            Ok(())
        })
    }

    /// Look up a queued or executed transaction
    pub fn transaction(&self, handle: TxHandle) -> Option<&PendingTransaction> {
        self.state.queue.get(handle)
    }

    /// Number of transactions ever requested
    pub fn transaction_count(&self) -> usize {
        self.state.queue.len()
    }

    /// Transactions still waiting for approval
    pub fn pending_transactions(&self) -> Vec<&PendingTransaction> {
        self.state.queue.pending().collect()
    }

    // ============ Events ============

    /// Events emitted so far
    pub fn events(&self) -> &[AccountEvent] {
        &self.state.events
    }

    /// Take the emitted events, leaving the log empty
    pub fn drain_events(&mut self) -> Vec<AccountEvent> {
        std::mem::take(&mut self.state.events)
    }

    // ============ Internals ============

    fn ensure_manager(&self, caller: Address) -> Result<()> {
        if !self.policy().can_manage(caller) {
            return Err(Error::Unauthorized(format!(
                "{} does not hold a management key",
                caller
            )));
        }
        Ok(())
    }

    pub(crate) fn ensure_host<H: Host>(&self, host: &H) -> Result<()> {
        if host.account() != self.address {
            return Err(Error::InvalidConfig(format!(
                "host is bound to {}, account is {}",
                host.account(),
                self.address
            )));
        }
        Ok(())
    }

    fn apply_add_key(&mut self, key: KeyId, purpose: Purpose, key_type: KeyType) -> Result<()> {
        self.state.registry.add_key(key, purpose, key_type)?;
        self.state.events.push(AccountEvent::KeyAdded {
            key,
            purpose,
            key_type,
        });
        info!(key = %key, purpose = %purpose, key_type = %key_type, "Key added");
        Ok(())
    }

    fn apply_remove_key(&mut self, key: KeyId, purpose: Purpose) -> Result<()> {
        self.state.registry.remove_key(key, purpose)?;
        self.state
            .events
            .push(AccountEvent::KeyRemoved { key, purpose });
        info!(key = %key, purpose = %purpose, "Key removed");
        Ok(())
    }

    /// Run `op` with full rollback of account and host state on error
    pub(crate) fn atomically<H, T, F>(&mut self, host: &mut H, op: F) -> Result<T>
    where
        H: Host,
        F: FnOnce(&mut Self, &mut H) -> Result<T>,
    {
        let snapshot = self.state.clone();
        let checkpoint = host.checkpoint();

        match op(self, host) {
            Ok(value) => {
                host.commit(checkpoint);
                Ok(value)
            }
            Err(e) => {
                self.state = snapshot;
                host.revert_to(checkpoint);
                warn!(error = %e, "Operation rolled back");
                Err(e)
            }
        }
    }

    /// Dispatch a call on behalf of the account and return the gas it used
    ///
    /// Calls to the account itself are decoded and applied to the registry
    /// with the account as caller; everything else goes to the host.
    pub(crate) fn dispatch<H: Host>(
        &mut self,
        host: &mut H,
        to: Address,
        value: U256,
        data: &[u8],
        gas: u64,
    ) -> Result<u64> {
        if is_self_call(to, self.address) {
            let call = SelfCall::decode(data)?;
            debug!(call = ?call, "Applying self call");
            match call {
                SelfCall::AddKey {
                    key,
                    purpose,
                    key_type,
                } => self.apply_add_key(key, purpose, key_type)?,
                SelfCall::RemoveKey { key, purpose } => self.apply_remove_key(key, purpose)?,
                SelfCall::SetRequiredSignatures { required } => {
                    self.apply_required_signatures(required)?
                }
            }
            return Ok(self.config.gas.self_call);
        }

        Ok(host.invoke(to, value, data, gas)?)
    }
}
