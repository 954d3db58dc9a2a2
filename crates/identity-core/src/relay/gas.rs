//! Gas metering for relayer refunds

use crate::config::GasSchedule;
use crate::{Error, Result};
use alloy_primitives::U256;

/// Running gas total of one signed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    schedule: GasSchedule,
    used: u64,
}

impl GasMeter {
    /// Check that `available` gas covers the base overhead plus `gas_limit`
    pub fn ensure_available(schedule: &GasSchedule, gas_limit: u64, available: u64) -> Result<()> {
        let required = gas_limit
            .checked_add(schedule.base_overhead)
            .unwrap_or(u64::MAX);
        if available < required || available <= gas_limit {
            return Err(Error::InsufficientGas {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Start metering; the base overhead is charged up front
    pub fn start(schedule: GasSchedule) -> Self {
        Self {
            used: schedule.base_overhead,
            schedule,
        }
    }

    /// Charge signature recovery
    pub fn charge_signatures(&mut self, count: usize) {
        let cost = self.schedule.per_signature.saturating_mul(count as u64);
        self.used = self.used.saturating_add(cost);
    }

    /// Charge gas reported by the dispatched call
    pub fn charge_dispatch(&mut self, gas: u64) {
        self.used = self.used.saturating_add(gas);
    }

    /// Gas used so far
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Close the meter, adding the cost of paying the refund
    pub fn finish(self) -> u64 {
        self.used.saturating_add(self.schedule.refund_overhead)
    }

    /// Amount owed to the relayer
    pub fn refund(gas_used: u64, gas_price: U256) -> U256 {
        U256::from(gas_used).saturating_mul(gas_price)
    }
}
