//! Account configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use identity_core::config::{AccountConfig, ThresholdMode};
//!
//! let config = AccountConfig::default()
//!     .with_threshold(ThresholdMode::Fixed(2))
//!     .with_open_requests(true);
//! config.validate()?;
//! ```

use crate::types::{KeyType, Purpose};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Nonces at or above this value are treated as Unix timestamps
/// (2001-09-09T01:46:40Z).
pub const DEFAULT_TIMESTAMP_NONCE_THRESHOLD: u64 = 1_000_000_000;

/// How many signatures a signed message needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "count", rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Every key holding the required purpose must sign
    #[default]
    AllSigners,
    /// A fixed number of distinct authorized signers
    Fixed(usize),
}

/// Gas accounting used for relayer refunds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSchedule {
    /// Gas consumed before the gas-limit check (transaction intrinsic cost)
    pub base_overhead: u64,
    /// Gas charged per recovered signature
    pub per_signature: u64,
    /// Gas charged for a call the account handles on itself
    pub self_call: u64,
    /// Gas charged for paying the refund
    pub refund_overhead: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            base_overhead: 21_000,
            per_signature: 5_000,
            self_call: 30_000,
            refund_overhead: 10_000,
        }
    }
}

/// Complete account configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Purpose a key needs to sign outgoing meta-transactions
    pub signing_purpose: Purpose,
    /// Signature threshold for meta-transactions
    pub threshold: ThresholdMode,
    /// Boundary between sequential nonces and timestamp nonces
    pub timestamp_nonce_threshold: u64,
    /// Let callers without ACTION or MANAGEMENT queue requests for approval
    pub allow_open_requests: bool,
    /// Key type registered for the initial management key
    pub owner_key_type: KeyType,
    /// Gas accounting
    pub gas: GasSchedule,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            signing_purpose: Purpose::ACTION,
            threshold: ThresholdMode::AllSigners,
            timestamp_nonce_threshold: DEFAULT_TIMESTAMP_NONCE_THRESHOLD,
            allow_open_requests: false,
            owner_key_type: KeyType::ECDSA,
            gas: GasSchedule::default(),
        }
    }
}

impl AccountConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AccountConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the purpose required to sign meta-transactions
    pub fn with_signing_purpose(mut self, purpose: Purpose) -> Self {
        self.signing_purpose = purpose;
        self
    }

    /// Set the signature threshold
    pub fn with_threshold(mut self, threshold: ThresholdMode) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the sequential/timestamp nonce boundary
    pub fn with_timestamp_nonce_threshold(mut self, threshold: u64) -> Self {
        self.timestamp_nonce_threshold = threshold;
        self
    }

    /// Allow any caller to queue requests
    pub fn with_open_requests(mut self, enabled: bool) -> Self {
        self.allow_open_requests = enabled;
        self
    }

    /// Set the initial management key type
    pub fn with_owner_key_type(mut self, key_type: KeyType) -> Self {
        self.owner_key_type = key_type;
        self
    }

    /// Set the gas schedule
    pub fn with_gas_schedule(mut self, gas: GasSchedule) -> Self {
        self.gas = gas;
        self
    }

    /// Check the configuration for values the account cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.threshold == ThresholdMode::Fixed(0) {
            return Err(Error::InvalidConfig(
                "fixed signature threshold must be at least 1".into(),
            ));
        }
        if self.owner_key_type == KeyType::NONE {
            return Err(Error::InvalidConfig(
                "owner key type cannot be NONE".into(),
            ));
        }
        if self.timestamp_nonce_threshold == 0 {
            return Err(Error::InvalidConfig(
                "timestamp nonce threshold must be positive".into(),
            ));
        }
        if self.gas.base_overhead == 0 {
            return Err(Error::InvalidConfig(
                "base gas overhead must be positive".into(),
            ));
        }
        Ok(())
    }
}
