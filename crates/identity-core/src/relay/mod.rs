//! Signed meta-transaction relay
//!
//! A relayer submits a [`SignedMessage`] together with signatures from keys of
//! the account. The account verifies the signatures over the canonical
//! [`build_digest`], checks replay protection, dispatches the call and pays
//! the relayer back for the gas it spent, in native currency or a token.
//!
//! ## Flow
//!
//! 1. `from` must be the account itself
//! 2. Only `CALL` operations are executed
//! 3. Supplied gas must cover the base overhead plus `gas_limit`
//! 4. Nonce must be the next sequential nonce or a fresh timestamp
//! 5. Every signature must recover to a distinct key holding the required purpose
//! 6. Enough signatures for the threshold
//! 7. Nonce consumed, call dispatched, relayer refunded
//!
//! Any failure in steps 7 onwards rolls back the nonce, the call and the refund.

pub mod digest;
pub mod gas;
pub mod nonce;

pub use digest::{PACKED_LEN, build_digest, pack_message};
pub use gas::GasMeter;
pub use nonce::{NonceMode, ReplayState};

use crate::account::IdentityAccount;
use crate::config::ThresholdMode;
use crate::crypto::{LocalSigner, recover_key};
use crate::events::AccountEvent;
use crate::host::Host;
use crate::policy::is_self_call;
use crate::types::{Purpose, Signature};
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, instrument};

/// Operation type code of a signed message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationType(pub u8);

impl OperationType {
    /// Regular message call
    pub const CALL: OperationType = OperationType(0);
    /// Delegate call (recognised, not executed)
    pub const DELEGATECALL: OperationType = OperationType(1);
    /// Contract creation (recognised, not executed)
    pub const CREATE: OperationType = OperationType(2);

    /// Numeric code
    pub fn code(&self) -> u8 {
        self.0
    }

    /// Whether the account executes this operation type
    pub fn is_supported(&self) -> bool {
        *self == OperationType::CALL
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            OperationType::CALL => write!(f, "CALL"),
            OperationType::DELEGATECALL => write!(f, "DELEGATECALL"),
            OperationType::CREATE => write!(f, "CREATE"),
            OperationType(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// Meta-transaction parameters covered by the signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    /// Account the message is signed for
    pub from: Address,
    /// Call target
    pub to: Address,
    /// Native value to send
    pub value: U256,
    /// Call data
    pub data: Bytes,
    /// Sequential nonce or timestamp
    pub nonce: u64,
    /// Refund price per gas unit (zero disables the refund)
    pub gas_price: U256,
    /// Gas stipend for the call
    pub gas_limit: u64,
    /// Refund token; zero address for native currency
    pub gas_token: Address,
    /// Operation type
    pub operation_type: OperationType,
    /// Application-defined extra commitment
    pub extra_hash: B256,
}

impl SignedMessage {
    /// Create a plain call message with zero value, data and gas price
    pub fn new(from: Address, to: Address) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            data: Bytes::new(),
            nonce: 0,
            gas_price: U256::ZERO,
            gas_limit: 0,
            gas_token: Address::ZERO,
            operation_type: OperationType::CALL,
            extra_hash: B256::ZERO,
        }
    }

    /// Set the value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set the call data
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Set the nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set gas price and limit
    pub fn with_gas(mut self, gas_price: U256, gas_limit: u64) -> Self {
        self.gas_price = gas_price;
        self.gas_limit = gas_limit;
        self
    }

    /// Pay the refund in `token`
    pub fn with_gas_token(mut self, token: Address) -> Self {
        self.gas_token = token;
        self
    }

    /// Set the operation type
    pub fn with_operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = operation_type;
        self
    }

    /// Set the extra hash
    pub fn with_extra_hash(mut self, extra_hash: B256) -> Self {
        self.extra_hash = extra_hash;
        self
    }

    /// First four bytes of the call data, zero-padded
    pub fn selector(&self) -> [u8; 4] {
        let mut selector = [0u8; 4];
        let len = self.data.len().min(4);
        selector[..len].copy_from_slice(&self.data[..len]);
        selector
    }

    /// Whether the refund is paid in native currency
    pub fn refunds_native(&self) -> bool {
        self.gas_token == Address::ZERO
    }

    /// Canonical digest
    pub fn digest(&self) -> B256 {
        build_digest(self)
    }

    /// Sign the digest with a local key
    pub fn sign(&self, signer: &LocalSigner) -> Result<Signature> {
        signer.sign_digest(&self.digest())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Relayer-side context of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Receives the refund
    pub relayer: Address,
    /// Gas the relayer supplies
    pub gas: u64,
}

impl Submission {
    /// Create a submission
    pub fn new(relayer: Address, gas: u64) -> Self {
        Self { relayer, gas }
    }
}

/// Outcome of validating a signed message without executing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Canonical digest
    pub digest: B256,
    /// Ordering discipline the nonce falls under
    pub nonce_mode: NonceMode,
    /// Purpose every signer holds
    pub required_purpose: Purpose,
    /// Signatures needed
    pub required_signatures: usize,
    /// Recovered signer addresses, in signature order
    pub signers: Vec<Address>,
}

/// Outcome of a signed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    /// Canonical digest
    pub digest: B256,
    /// Consumed nonce
    pub nonce: u64,
    /// Ordering discipline the nonce fell under
    pub nonce_mode: NonceMode,
    /// Metered gas
    pub gas_used: u64,
    /// Amount paid to the relayer
    pub refund: U256,
    /// Refund token (zero for native)
    pub gas_token: Address,
}

impl IdentityAccount {
    /// Execute a relayed meta-transaction
    ///
    /// # Arguments
    /// * `message` - Parameters covered by the signatures
    /// * `signatures` - One signature per signer, any order
    /// * `submission` - Relayer address and supplied gas
    /// * `host` - Execution environment bound to this account
    #[instrument(skip_all, fields(account = %self.address, nonce = message.nonce, relayer = %submission.relayer))]
    pub fn execute_signed<H: Host>(
        &mut self,
        message: &SignedMessage,
        signatures: &[Signature],
        submission: Submission,
        host: &mut H,
    ) -> Result<ExecutionReceipt> {
        self.ensure_host(host)?;

        info!(
            to = %message.to,
            value = %message.value,
            signatures = signatures.len(),
            "Processing signed message"
        );

        let plan = self.can_execute(message, signatures, submission.gas, host.timestamp())?;

        let receipt = self.atomically(host, |account, host| {
            account.state.replay.advance(message.nonce, plan.nonce_mode);

            let mut meter = GasMeter::start(account.config.gas);
            meter.charge_signatures(plan.signers.len());

            if !is_self_call(message.to, account.address) {
                let balance = host.balance(account.address);
                if message.value > balance {
                    return Err(Error::insufficient_funds(message.value, balance));
                }
            }

            let dispatch_gas =
                account.dispatch(host, message.to, message.value, &message.data, message.gas_limit)?;
            meter.charge_dispatch(dispatch_gas);

            let gas_used = meter.finish();
            let refund = GasMeter::refund(gas_used, message.gas_price);
            account.pay_refund(host, message.gas_token, submission.relayer, refund)?;

            account.state.events.push(AccountEvent::ExecutedSigned {
                digest: plan.digest,
                nonce: message.nonce,
                relayer: submission.relayer,
                gas_used,
                refund,
                gas_token: message.gas_token,
            });

            Ok(ExecutionReceipt {
                digest: plan.digest,
                nonce: message.nonce,
                nonce_mode: plan.nonce_mode,
                gas_used,
                refund,
                gas_token: message.gas_token,
            })
        })?;

        info!(
            digest = %receipt.digest,
            gas_used = receipt.gas_used,
            refund = %receipt.refund,
            "Signed message executed"
        );

        Ok(receipt)
    }

    /// Validate a signed message against the current state without executing it
    ///
    /// Runs every check `execute_signed` performs before dispatch: sender,
    /// operation type, gas, nonce, signatures and threshold.
    pub fn can_execute(
        &self,
        message: &SignedMessage,
        signatures: &[Signature],
        gas: u64,
        now: u64,
    ) -> Result<ExecutionPlan> {
        if message.from != self.address {
            return Err(Error::InvalidSender(format!(
                "message is from {}, account is {}",
                message.from, self.address
            )));
        }

        if !message.operation_type.is_supported() {
            return Err(Error::UnsupportedOperation(message.operation_type.code()));
        }

        GasMeter::ensure_available(&self.config.gas, message.gas_limit, gas)?;

        let nonce_mode =
            self.state
                .replay
                .check(message.nonce, self.config.timestamp_nonce_threshold, now)?;

        let digest = build_digest(message);
        let required_purpose = self
            .policy()
            .required_signing_purpose(message.to, self.config.signing_purpose);

        let mut seen = HashSet::with_capacity(signatures.len());
        let mut signers = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let key = recover_key(&digest, signature)?;
            if !self.state.registry.key_has_purpose(&key, required_purpose) {
                return Err(Error::InvalidSignature(format!(
                    "signer {} lacks purpose {}",
                    key, required_purpose
                )));
            }
            if !seen.insert(key) {
                return Err(Error::InvalidSignature(format!("duplicate signer {}", key)));
            }
            if let Some(address) = key.to_address() {
                signers.push(address);
            }
        }

        let required_signatures = self.required_signatures_for(required_purpose);
        if signers.len() < required_signatures {
            return Err(Error::InsufficientSignatures {
                required: required_signatures,
                actual: signers.len(),
            });
        }

        debug!(
            digest = %digest,
            mode = ?nonce_mode,
            signers = signers.len(),
            "Signed message validated"
        );

        Ok(ExecutionPlan {
            digest,
            nonce_mode,
            required_purpose,
            required_signatures,
            signers,
        })
    }

    /// Whether a signed message would execute, and the gas it would be metered at
    ///
    /// The gas figure is what `execute_signed` charges on success: base overhead,
    /// per-signature cost, the host's estimate for the call (or the self-call
    /// charge) and the refund overhead.
    pub fn gas_estimate<H: Host>(
        &self,
        message: &SignedMessage,
        signatures: &[Signature],
        gas: u64,
        host: &H,
    ) -> (bool, u64) {
        let executable = self.ensure_host(host).is_ok()
            && self
                .can_execute(message, signatures, gas, host.timestamp())
                .is_ok();

        let mut meter = GasMeter::start(self.config.gas);
        meter.charge_signatures(signatures.len());
        if is_self_call(message.to, self.address) {
            meter.charge_dispatch(self.config.gas.self_call);
        } else {
            meter.charge_dispatch(host.estimate_gas(message.to, message.value, &message.data));
        }

        (executable, meter.finish())
    }

    /// Set a fixed signature threshold for meta-transactions
    #[instrument(skip_all, fields(account = %self.address, caller = %caller, required = required))]
    pub fn set_required_signatures(&mut self, caller: Address, required: usize) -> Result<()> {
        if !self.policy().can_manage(caller) {
            return Err(Error::Unauthorized(format!(
                "{} does not hold a management key",
                caller
            )));
        }
        self.apply_required_signatures(required)
    }

    /// Signatures an outgoing meta-transaction currently needs
    pub fn required_signatures(&self) -> usize {
        self.required_signatures_for(self.config.signing_purpose)
    }

    /// Current threshold mode
    pub fn threshold_mode(&self) -> ThresholdMode {
        self.state.threshold
    }

    /// Last accepted sequential nonce
    pub fn last_nonce(&self) -> u64 {
        self.state.replay.last_nonce()
    }

    /// Last accepted timestamp nonce
    pub fn last_timestamp(&self) -> u64 {
        self.state.replay.last_timestamp()
    }

    /// Next acceptable sequential nonce
    pub fn next_nonce(&self) -> u64 {
        self.state.replay.next_nonce()
    }

    pub(crate) fn apply_required_signatures(&mut self, required: usize) -> Result<()> {
        let signers = self
            .state
            .registry
            .purpose_count(self.config.signing_purpose);
        if required == 0 || required > signers {
            return Err(Error::InvalidThreshold(format!(
                "required signatures must be between 1 and {}, got {}",
                signers, required
            )));
        }

        self.state.threshold = ThresholdMode::Fixed(required);
        self.state
            .events
            .push(AccountEvent::RequiredSignaturesChanged { required });
        info!(required, "Required signatures changed");
        Ok(())
    }

    /// Effective threshold for signers holding `purpose`
    ///
    /// A fixed threshold is capped at the number of keys holding `purpose`.
    fn required_signatures_for(&self, purpose: Purpose) -> usize {
        let holders = self.state.registry.purpose_count(purpose);
        match self.state.threshold {
            ThresholdMode::AllSigners => holders.max(1),
            ThresholdMode::Fixed(required) => required.min(holders).max(1),
        }
    }

    fn pay_refund<H: Host>(
        &self,
        host: &mut H,
        gas_token: Address,
        relayer: Address,
        refund: U256,
    ) -> Result<()> {
        if refund.is_zero() {
            return Ok(());
        }

        if gas_token == Address::ZERO {
            let balance = host.balance(self.address);
            if balance < refund {
                return Err(Error::insufficient_funds(refund, balance));
            }
            host.send_value(relayer, refund)?;
        } else {
            let balance = host.balance_of(gas_token, self.address);
            if balance < refund {
                return Err(Error::insufficient_funds(refund, balance));
            }
            if !host.transfer(gas_token, relayer, refund) {
                return Err(Error::CallFailed(format!(
                    "token {} refused refund transfer",
                    gas_token
                )));
            }
        }

        debug!(relayer = %relayer, refund = %refund, token = %gas_token, "Relayer refunded");
        Ok(())
    }
}
