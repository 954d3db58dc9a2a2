//! Authorization policy
//!
//! Pure decision logic over the key registry. The policy holds no state of its
//! own; it answers whether a caller may manage the account, act on its behalf,
//! and whether a requested call can execute right away or has to wait for a
//! management key.
//!
//! ## Rules
//!
//! - **Management**: keys with `MANAGEMENT`, or the account calling itself
//! - **Action**: keys with `ACTION` or `MANAGEMENT`
//! - **Self calls**: a call targeting the account mutates its own registry, so it
//!   only auto-executes for management callers; action keys are queued

use crate::registry::KeyRegistry;
use crate::types::{KeyId, Purpose};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Decision for a directly requested execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionDecision {
    /// Caller has standing to execute immediately
    AutoExecute,
    /// Request is queued until a management key approves it
    RequireApproval { reason: String },
    /// Caller may not request executions at all
    Reject { reason: String },
}

impl ExecutionDecision {
    /// Check if the call executes immediately
    pub fn is_auto_execute(&self) -> bool {
        matches!(self, ExecutionDecision::AutoExecute)
    }

    /// Check if the call has to wait for approval
    pub fn requires_approval(&self) -> bool {
        matches!(self, ExecutionDecision::RequireApproval { .. })
    }
}

/// Check whether `to` is the account itself
pub fn is_self_call(to: Address, account: Address) -> bool {
    to == account
}

/// Authorization predicates for one account
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationPolicy<'a> {
    registry: &'a KeyRegistry,
    account: Address,
    allow_open_requests: bool,
}

impl<'a> AuthorizationPolicy<'a> {
    /// Create a policy view over `registry` for the account at `account`
    pub fn new(registry: &'a KeyRegistry, account: Address) -> Self {
        Self {
            registry,
            account,
            allow_open_requests: false,
        }
    }

    /// Let callers without standing queue requests instead of being rejected
    pub fn with_open_requests(mut self, enabled: bool) -> Self {
        self.allow_open_requests = enabled;
        self
    }

    /// Whether `caller` may mutate keys and approve or reject transactions
    pub fn can_manage(&self, caller: Address) -> bool {
        caller == self.account || self.has_purpose(caller, Purpose::MANAGEMENT)
    }

    /// Whether `caller` may request and auto-execute outgoing calls
    pub fn can_act(&self, caller: Address) -> bool {
        self.has_purpose(caller, Purpose::ACTION) || self.has_purpose(caller, Purpose::MANAGEMENT)
    }

    /// Whether a call to `to` needs management standing regardless of `ACTION`
    pub fn is_management_only_self_call(&self, to: Address) -> bool {
        is_self_call(to, self.account)
    }

    /// Decide how a direct `execute` request from `caller` to `to` proceeds
    pub fn execution_decision(&self, caller: Address, to: Address) -> ExecutionDecision {
        if !self.can_act(caller) && !self.can_manage(caller) {
            if self.allow_open_requests {
                return ExecutionDecision::RequireApproval {
                    reason: format!("caller {} holds no action purpose", caller),
                };
            }
            return ExecutionDecision::Reject {
                reason: format!("caller {} holds neither ACTION nor MANAGEMENT", caller),
            };
        }

        if self.is_management_only_self_call(to) && !self.can_manage(caller) {
            return ExecutionDecision::RequireApproval {
                reason: "calls to the account itself need management approval".into(),
            };
        }

        ExecutionDecision::AutoExecute
    }

    /// Purpose signers of a meta-transaction to `to` must hold
    pub fn required_signing_purpose(&self, to: Address, signing_purpose: Purpose) -> Purpose {
        if self.is_management_only_self_call(to) {
            Purpose::MANAGEMENT
        } else {
            signing_purpose
        }
    }

    fn has_purpose(&self, caller: Address, purpose: Purpose) -> bool {
        self.registry
            .key_has_purpose(&KeyId::from_address(caller), purpose)
    }
}
