//! Replay protection
//!
//! Two ordering disciplines share the `nonce` field, split by an explicit
//! threshold:
//!
//! - **Sequential**: `nonce < threshold`, must equal `last_nonce + 1`
//! - **Timestamp**: `nonce >= threshold`, must satisfy
//!   `last_timestamp < nonce <= now`
//!
//! Each mode keeps its own watermark, so relayers can mix them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ordering discipline a nonce falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceMode {
    /// Strictly incrementing counter
    Sequential,
    /// Unix timestamp watermark
    Timestamp,
}

impl NonceMode {
    /// Classify `nonce` against the timestamp threshold
    pub fn classify(nonce: u64, timestamp_threshold: u64) -> Self {
        if nonce >= timestamp_threshold {
            NonceMode::Timestamp
        } else {
            NonceMode::Sequential
        }
    }
}

/// Replay watermarks of one account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayState {
    last_nonce: u64,
    last_timestamp: u64,
}

impl ReplayState {
    /// Fresh state: next sequential nonce is 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted sequential nonce
    pub fn last_nonce(&self) -> u64 {
        self.last_nonce
    }

    /// Last accepted timestamp nonce
    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    /// Next acceptable sequential nonce
    pub fn next_nonce(&self) -> u64 {
        self.last_nonce.saturating_add(1)
    }

    /// Validate `nonce` without consuming it
    pub fn check(&self, nonce: u64, timestamp_threshold: u64, now: u64) -> Result<NonceMode> {
        let mode = NonceMode::classify(nonce, timestamp_threshold);
        match mode {
            NonceMode::Sequential => {
                if self.last_nonce.checked_add(1) != Some(nonce) {
                    return Err(Error::InvalidNonce(format!(
                        "expected {}, got {}",
                        self.next_nonce(),
                        nonce
                    )));
                }
            }
            NonceMode::Timestamp => {
                if nonce <= self.last_timestamp {
                    return Err(Error::InvalidNonce(format!(
                        "timestamp {} not after last accepted {}",
                        nonce, self.last_timestamp
                    )));
                }
                if nonce > now {
                    return Err(Error::InvalidNonce(format!(
                        "timestamp {} is in the future (now {})",
                        nonce, now
                    )));
                }
            }
        }
        Ok(mode)
    }

    /// Record an accepted nonce
    pub fn advance(&mut self, nonce: u64, mode: NonceMode) {
        match mode {
            NonceMode::Sequential => self.last_nonce = nonce,
            NonceMode::Timestamp => self.last_timestamp = nonce,
        }
    }

    /// Validate and consume `nonce`
    pub fn consume(&mut self, nonce: u64, timestamp_threshold: u64, now: u64) -> Result<NonceMode> {
        let mode = self.check(nonce, timestamp_threshold, now)?;
        self.advance(nonce, mode);
        Ok(mode)
    }
}
