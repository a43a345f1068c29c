//! Harvest sanity limits.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{AllocatorError, Result};
use crate::math::bps_of;

/// Bounds a harvest's reported profit and loss relative to the strategy's debt.
///
/// A relative limit is checked against the debt recorded before the report;
/// the optional absolute caps apply on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub profit_limit_bps: u16,
    pub loss_limit_bps: u16,
    #[serde(default)]
    pub max_profit: Option<U256>,
    #[serde(default)]
    pub max_loss: Option<U256>,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            profit_limit_bps: 100,
            loss_limit_bps: 1,
            max_profit: None,
            max_loss: None,
        }
    }
}

impl HealthCheck {
    pub fn with_profit_limit_bps(mut self, bps: u16) -> Self {
        self.profit_limit_bps = bps;
        self
    }

    pub fn with_loss_limit_bps(mut self, bps: u16) -> Self {
        self.loss_limit_bps = bps;
        self
    }

    pub fn with_max_profit(mut self, max: U256) -> Self {
        self.max_profit = Some(max);
        self
    }

    pub fn with_max_loss(mut self, max: U256) -> Self {
        self.max_loss = Some(max);
        self
    }

    pub fn is_healthy(&self, profit: U256, loss: U256, total_debt: U256) -> bool {
        if profit > bps_of(total_debt, self.profit_limit_bps) {
            return false;
        }
        if loss > bps_of(total_debt, self.loss_limit_bps) {
            return false;
        }
        if self.max_profit.is_some_and(|max| profit > max) {
            return false;
        }
        !self.max_loss.is_some_and(|max| loss > max)
    }

    pub fn check(&self, profit: U256, loss: U256, total_debt: U256) -> Result<()> {
        if self.is_healthy(profit, loss, total_debt) {
            Ok(())
        } else {
            Err(AllocatorError::HealthCheckFailed { profit, loss })
        }
    }
}
