//! Best-effort, liquidity-constrained withdrawal.
//!
//! Capital is freed in a fixed order: idle asset, loose tracker shares, then
//! positions in registry order. A position gives up at most what its pool can
//! pay from un-lent liquidity, so credit that is borrowed out stays put and the
//! unmet remainder comes back as `loss` rather than an error.
//!
//! Every position is re-read right before it is touched: redeeming from one
//! pool moves the tracker's totals, which changes the value of the next.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::allocator::Allocator;
use crate::error::{PoolId, Result};
use crate::ledger::{atomically, Ledger};
use crate::math::{self, zero_floor_sub, RoundingDirection};
use crate::valuation::{self, PoolSnapshot};

/// Sentinel amount meaning "everything the allocator holds"
pub const WITHDRAW_ALL: U256 = U256::MAX;

/// Result of a withdrawal request.
///
/// `liquidated + loss` always equals the amount requested (or the estimated
/// total for [`WITHDRAW_ALL`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WithdrawOutcome {
    pub liquidated: U256,
    pub loss: U256,
}

impl WithdrawOutcome {
    pub fn is_full(&self) -> bool {
        self.loss.is_zero()
    }

    pub fn is_empty(&self) -> bool {
        self.liquidated.is_zero()
    }
}

impl Allocator {
    /// Frees up to `amount` and sends it to the vault.
    ///
    /// Only the vault may call this. The call never fails for lack of pool
    /// liquidity; a shortfall is reported in [`WithdrawOutcome::loss`].
    pub fn withdraw<L: Ledger>(&self, caller: Address, ledger: &mut L, amount: U256) -> Result<WithdrawOutcome> {
        self.ensure_vault(caller, "withdraw")?;
        let outcome = atomically(ledger, |l| {
            self.accrue_all(l)?;
            let outcome = self.liquidate(l, amount)?;
            l.transfer_token(self.asset, self.address, self.vault, outcome.liquidated)?;
            Ok(outcome)
        })?;

        if outcome.is_full() {
            info!(allocator = %self.address, liquidated = %outcome.liquidated, "withdraw");
        } else {
            warn!(
                allocator = %self.address,
                liquidated = %outcome.liquidated,
                loss = %outcome.loss,
                "withdraw fell short of request"
            );
        }
        Ok(outcome)
    }

    /// Makes up to `amount` of asset idle, returning how much is now available
    /// (capped at `amount`) and the unmet remainder.
    pub(crate) fn liquidate<L: Ledger>(&self, ledger: &mut L, amount: U256) -> Result<WithdrawOutcome> {
        let amount = if amount == WITHDRAW_ALL {
            self.estimated_total_assets(ledger)?
        } else {
            amount
        };

        if self.idle(ledger) < amount {
            self.free_loose_shares(ledger, amount - self.idle(ledger))?;
        }

        for position in &self.registry {
            let idle = self.idle(ledger);
            if idle >= amount {
                break;
            }
            self.withdraw_from_position(ledger, position.pool, amount - idle)?;
        }

        let liquidated = math::min(self.idle(ledger), amount);
        Ok(WithdrawOutcome {
            liquidated,
            loss: amount - liquidated,
        })
    }

    /// Redeems loose tracker shares worth up to `amount`
    fn free_loose_shares<L: Ledger>(&self, ledger: &mut L, amount: U256) -> Result<U256> {
        let held = ledger.tracker_balance(self.asset, self.address);
        if held.is_zero() {
            return Ok(U256::ZERO);
        }
        let wanted = ledger.to_share(self.asset, amount, RoundingDirection::Up);
        let share = math::min(held, wanted);
        let (freed, _) = ledger.tracker_withdraw(self.asset, self.address, self.address, share)?;
        debug!(allocator = %self.address, %share, %freed, "loose shares redeemed");
        Ok(freed)
    }

    /// Redeems credit from `pool` worth up to `amount` ([`WITHDRAW_ALL`] for
    /// the whole position), limited by the pool's un-lent liquidity.
    /// Returns the asset amount that became idle.
    pub(crate) fn withdraw_from_position<L: Ledger>(&self, ledger: &mut L, pool: PoolId, amount: U256) -> Result<U256> {
        let held = ledger.fraction_balance(pool, self.address)?;
        if held.is_zero() || amount.is_zero() {
            return Ok(U256::ZERO);
        }

        let snapshot = PoolSnapshot::read(ledger, pool, self.asset)?;
        let wanted = if amount == WITHDRAW_ALL {
            held
        } else {
            valuation::fraction_for_amount(amount, &snapshot).unwrap_or(held)
        };
        let redeemable = valuation::max_redeemable_fraction(&snapshot);
        let fraction = math::min(math::min(held, wanted), redeemable);

        if fraction.is_zero() {
            warn!(allocator = %self.address, %pool, "pool has no free liquidity");
            return Ok(U256::ZERO);
        }

        let share = ledger.remove_asset(pool, self.address, fraction)?;
        if share.is_zero() {
            return Ok(U256::ZERO);
        }
        let before = self.idle(ledger);
        ledger.tracker_withdraw(self.asset, self.address, self.address, share)?;
        let freed = zero_floor_sub(self.idle(ledger), before);

        debug!(
            allocator = %self.address,
            %pool,
            %fraction,
            %share,
            %freed,
            remaining = %(held - fraction),
            "withdrew from pool"
        );
        Ok(freed)
    }
}
