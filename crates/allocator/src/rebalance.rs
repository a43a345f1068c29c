//! Harvest and tend.
//!
//! # Harvest
//!
//! 1. Accrue interest on every pool and value everything the allocator holds.
//! 2. Compare that with the debt the vault has recorded: the excess is profit,
//!    the shortfall is loss.
//! 3. Free `debt_outstanding + profit`, capped at total assets. Whatever
//!    illiquid pools keep back is first taken out of profit; any remainder
//!    becomes loss.
//! 4. Run the health check on the result of step 2, report to the vault and
//!    receive credit.
//! 5. Redistribute (see below).
//!
//! The health check sees the valuation result only. Capital that is merely
//! borrowed out is reported as loss in step 3 but never trips the check. That
//! loss is tracked in [`Allocator::written_off`]; once borrowers repay, the
//! gain that wins it back is not counted against the profit limit either.
//!
//! In emergency exit, step 3 frees everything, profit and loss are measured
//! against the outstanding debt and step 5 is skipped. The health check still
//! judges the valuation, so credit stuck in illiquid pools does not block the
//! exit.
//!
//! # Redistribution
//!
//! Targets are `weight_bps` of the allocator's total assets minus the reserve
//! the vault still wants back. Positions above target give back their excess
//! (as far as pool liquidity allows), then positions below target are topped
//! up from idle capital in registry order. When idle capital runs out, later
//! positions end up short of target.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::allocator::Allocator;
use crate::error::{PoolId, Result};
use crate::ledger::{atomically, Ledger};
use crate::math::{self, zero_floor_sub};
use crate::vault::Vault;
use crate::withdraw::WITHDRAW_ALL;

/// What a harvest reported to the vault
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub profit: U256,
    pub loss: U256,
    pub debt_payment: U256,
    /// Debt the vault still wants back after the report
    pub debt_outstanding: U256,
    /// Estimated total assets once the harvest completed
    pub total_assets: U256,
}

/// Capital moved by one redistribution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rebalance {
    pub withdrawn: U256,
    pub deposited: U256,
}

/// Amounts a harvest reports to the vault
#[derive(Debug, Clone, Copy)]
struct Settlement {
    profit: U256,
    loss: U256,
    debt_payment: U256,
    /// `(profit, loss)` from valuation alone, before liquidity shortfalls
    realized: (U256, U256),
}

impl Allocator {
    /// Realizes profit or loss, settles with the vault and rebalances.
    ///
    /// All-or-nothing: if the health check or any collaborator call fails,
    /// neither the ledger nor the vault changes.
    pub fn harvest<L: Ledger, V: Vault>(&mut self, caller: Address, ledger: &mut L, vault: &mut V) -> Result<HarvestReport> {
        self.ensure_keeper(caller, "harvest")?;

        let mut staged_vault = vault.clone();
        let (report, written_off) = atomically(ledger, |l| {
            self.accrue_all(l)?;
            let debt_outstanding = staged_vault.debt_outstanding(l, self.address);
            let total_debt = staged_vault.strategy_total_debt(self.address);

            let settlement = if self.emergency_exit {
                self.exit_position(l, debt_outstanding, total_debt)?
            } else {
                self.prepare_return(l, debt_outstanding, total_debt)?
            };
            let Settlement {
                profit,
                loss,
                debt_payment,
                realized: (gain, shortfall),
            } = settlement;

            // Gains that only undo an earlier illiquidity write-off are not profit
            let recovered = math::min(gain, self.written_off);
            let written_off = self.written_off - recovered + zero_floor_sub(loss, shortfall);

            if self.do_health_check {
                let gain = gain - recovered;
                if let Err(err) = self.health_check.check(gain, shortfall, total_debt) {
                    warn!(allocator = %self.address, %gain, %shortfall, %total_debt, "health check failed");
                    return Err(err);
                }
            }

            let debt_outstanding = staged_vault.report(l, self.address, profit, loss, debt_payment)?;

            if !self.emergency_exit {
                self.redistribute(l, debt_outstanding)?;
            }

            let report = HarvestReport {
                profit,
                loss,
                debt_payment,
                debt_outstanding,
                total_assets: self.estimated_total_assets(l)?,
            };
            Ok((report, written_off))
        })?;

        *vault = staged_vault;
        self.do_health_check = true;
        if written_off != self.written_off {
            debug!(allocator = %self.address, before = %self.written_off, after = %written_off, "illiquidity write-off updated");
            self.written_off = written_off;
        }

        info!(
            allocator = %self.address,
            profit = %report.profit,
            loss = %report.loss,
            debt_payment = %report.debt_payment,
            debt_outstanding = %report.debt_outstanding,
            total_assets = %report.total_assets,
            "harvest"
        );
        Ok(report)
    }

    /// Rebalances toward target weights without reporting to the vault.
    /// Does nothing while in emergency exit.
    pub fn tend<L: Ledger, V: Vault>(&self, caller: Address, ledger: &mut L, vault: &V) -> Result<Rebalance> {
        self.ensure_keeper(caller, "tend")?;
        if self.emergency_exit {
            debug!(allocator = %self.address, "tend skipped during emergency exit");
            return Ok(Rebalance::default());
        }

        let moved = atomically(ledger, |l| {
            self.accrue_all(l)?;
            let reserve = vault.debt_outstanding(l, self.address);
            self.redistribute(l, reserve)
        })?;

        info!(
            allocator = %self.address,
            withdrawn = %moved.withdrawn,
            deposited = %moved.deposited,
            "tend"
        );
        Ok(moved)
    }

    /// Settles a regular harvest and frees the capital to pay it
    fn prepare_return<L: Ledger>(
        &self,
        ledger: &mut L,
        debt_outstanding: U256,
        total_debt: U256,
    ) -> Result<Settlement> {
        let total_assets = self.estimated_total_assets(ledger)?;
        let realized = if total_assets >= total_debt {
            (total_assets - total_debt, U256::ZERO)
        } else {
            (U256::ZERO, total_debt - total_assets)
        };
        let (mut profit, mut loss) = realized;

        // Debt above total assets is already counted in `loss`
        let to_free = math::min(debt_outstanding.saturating_add(profit), total_assets);
        let outcome = self.liquidate(ledger, to_free)?;

        if !outcome.loss.is_zero() {
            warn!(
                allocator = %self.address,
                wanted = %to_free,
                freed = %outcome.liquidated,
                "illiquid pools held back capital during harvest"
            );
            if outcome.loss <= profit {
                profit -= outcome.loss;
            } else {
                loss = math::min(loss + outcome.loss - profit, total_debt);
                profit = U256::ZERO;
            }
        }

        let debt_payment = math::min(debt_outstanding, zero_floor_sub(outcome.liquidated, profit));
        Ok(Settlement {
            profit,
            loss,
            debt_payment,
            realized,
        })
    }

    /// Frees everything and measures the result against the outstanding debt.
    /// The health check still judges the valuation against `total_debt`.
    fn exit_position<L: Ledger>(
        &self,
        ledger: &mut L,
        debt_outstanding: U256,
        total_debt: U256,
    ) -> Result<Settlement> {
        let total_assets = self.estimated_total_assets(ledger)?;
        let realized = if total_assets >= total_debt {
            (total_assets - total_debt, U256::ZERO)
        } else {
            (U256::ZERO, total_debt - total_assets)
        };

        let freed = self.liquidate(ledger, WITHDRAW_ALL)?.liquidated;
        let (profit, loss) = if freed >= debt_outstanding {
            (freed - debt_outstanding, U256::ZERO)
        } else {
            (U256::ZERO, debt_outstanding - freed)
        };
        let debt_payment = debt_outstanding - loss;
        warn!(allocator = %self.address, %freed, %debt_outstanding, "emergency exit liquidation");
        Ok(Settlement {
            profit,
            loss,
            debt_payment,
            realized,
        })
    }

    /// Moves capital toward each position's target, keeping `reserve` idle
    pub(crate) fn redistribute<L: Ledger>(&self, ledger: &mut L, reserve: U256) -> Result<Rebalance> {
        let basis = zero_floor_sub(self.estimated_total_assets(ledger)?, reserve);
        let mut moved = Rebalance::default();

        for position in &self.registry {
            let value = self.position_value(ledger, position.pool)?;
            let target = position.target(basis);
            if value > target {
                moved.withdrawn += self.withdraw_from_position(ledger, position.pool, value - target)?;
            }
        }

        for position in &self.registry {
            let available = zero_floor_sub(self.idle(ledger), reserve);
            if available.is_zero() {
                break;
            }
            let value = self.position_value(ledger, position.pool)?;
            let target = position.target(basis);
            if value >= target {
                continue;
            }
            let amount = math::min(target - value, available);
            moved.deposited += self.deposit_into(ledger, position.pool, amount)?;
        }

        Ok(moved)
    }

    /// Lends `amount` of idle asset to `pool`
    fn deposit_into<L: Ledger>(&self, ledger: &mut L, pool: PoolId, amount: U256) -> Result<U256> {
        let (amount, share) = ledger.tracker_deposit(self.asset, self.address, self.address, amount)?;
        if share.is_zero() {
            return Ok(amount);
        }
        let fraction = ledger.add_asset(pool, self.address, share)?;
        debug!(allocator = %self.address, %pool, %amount, %share, %fraction, "deposited into pool");
        Ok(amount)
    }
}
