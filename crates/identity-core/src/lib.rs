//! # Identity Core
//!
//! Key-registry identity account with multi-signature approvals and signed
//! meta-transaction relay.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Key Registry**: Purpose-scoped keys (management, action, claim, encryption)
//! - **Authorization Policy**: Who may manage the account and who may act for it
//! - **Approval Queue**: Calls from keys without standing wait for a management key
//! - **Signed Relay**: Threshold-signed meta-transactions with replay protection
//!   and relayer gas refunds in native currency or tokens
//! - **Host Interface**: Call dispatch, token ledger and checkpoints, plus an
//!   in-memory chain for tests and simulation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use identity_core::{AccountConfig, IdentityAccount, KeyId, KeyType, LocalSigner, MemoryChain, Purpose};
//! use identity_core::relay::{SignedMessage, Submission};
//!
//! let mut chain = MemoryChain::new();
//! let mut account = IdentityAccount::new(address, KeyId::from_address(owner), AccountConfig::default())?;
//!
//! // Grant an action key
//! let signer = LocalSigner::random();
//! account.add_key(owner, signer.key_id(), Purpose::ACTION, KeyType::ECDSA)?;
//!
//! // Relay a signed call
//! let message = SignedMessage::new(address, target)
//!     .with_value(value)
//!     .with_nonce(account.next_nonce())
//!     .with_gas(gas_price, 100_000);
//! let signature = message.sign(&signer)?;
//! let receipt = account.execute_signed(
//!     &message,
//!     &[signature],
//!     Submission::new(relayer, 200_000),
//!     &mut chain.host(address),
//! )?;
//! ```
//!
//! ## Atomicity
//!
//! Every operation either completes or leaves the account, its event log and
//! the host world exactly as they were.

pub mod account;
pub mod approval;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod host;
pub mod policy;
pub mod registry;
pub mod relay;
pub mod selfcall;
pub mod types;

pub use account::IdentityAccount;
pub use approval::{ApprovalQueue, ApprovalStatus, PendingTransaction, TxHandle};
pub use config::{AccountConfig, GasSchedule, ThresholdMode};
pub use crypto::{LocalSigner, recover_signer};
pub use error::{Error, Result};
pub use events::AccountEvent;
pub use host::{CallError, Dispatcher, Host, MemoryChain, MemoryHost, TokenLedger};
pub use policy::{AuthorizationPolicy, ExecutionDecision};
pub use registry::KeyRegistry;
pub use relay::{
    ExecutionPlan, ExecutionReceipt, OperationType, SignedMessage, Submission, build_digest,
};
pub use selfcall::SelfCall;
pub use types::{KeyId, KeyInfo, KeyType, Purpose, Signature, keccak256_hash};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
