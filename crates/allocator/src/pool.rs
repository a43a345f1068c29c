//! Rebasing lending pools.
//!
//! A [`LendingPool`] lends one asset held in the tracker. Lenders hold
//! *fractions* of the pool; their claim covers both the tracker shares sitting
//! idle in the pool and the (growing) amount owed by borrowers.
//!
//! # Accounting
//!
//! - `total_asset.elastic`: tracker shares held un-lent by the pool
//! - `total_asset.base`: fractions issued to lenders
//! - `total_borrow.elastic`: asset amount owed by borrowers (grows with interest)
//! - `total_borrow.base`: borrow parts issued to borrowers
//!
//! The share-denominated value of all fractions is
//! `total_asset.elastic + to_share(total_borrow.elastic)`; see [`pool_share_total`].

use std::collections::HashMap;

use alloy_primitives::{Address, U256};

use crate::error::{AllocatorError, PoolId, Result};
use crate::math::{mul_div, w_mul_down, RoundingDirection};
use crate::rebase::Rebase;

/// Tracker shares backing every fraction of a pool (idle shares plus borrowed amount in shares)
pub fn pool_share_total(total_asset: Rebase, total_borrow: Rebase, tracker_totals: Rebase) -> U256 {
    total_asset.elastic + tracker_totals.to_base(total_borrow.elastic, RoundingDirection::Down)
}

#[derive(Debug, Clone)]
pub struct LendingPool {
    /// Pool identity (also the address of its fraction token)
    pub id: PoolId,
    /// Asset lent by this pool
    pub asset: Address,
    /// Tracker holding the pool's asset
    pub tracker: Address,
    /// Un-lent tracker shares against issued fractions
    pub total_asset: Rebase,
    /// Owed amount against issued borrow parts
    pub total_borrow: Rebase,
    /// Borrow interest per second (WAD-scaled)
    pub interest_per_second: U256,
    /// Timestamp of the last interest accrual
    pub last_accrued: u64,
    balances: HashMap<Address, U256>,
    borrow_parts: HashMap<Address, U256>,
}

impl LendingPool {
    pub fn new(
        id: PoolId,
        asset: Address,
        tracker: Address,
        interest_per_second: U256,
        now: u64,
    ) -> Self {
        Self {
            id,
            asset,
            tracker,
            total_asset: Rebase::ZERO,
            total_borrow: Rebase::ZERO,
            interest_per_second,
            last_accrued: now,
            balances: HashMap::new(),
            borrow_parts: HashMap::new(),
        }
    }

    /// Fraction balance of a lender
    pub fn balance_of(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or_default()
    }

    /// Borrow part of a borrower
    pub fn borrow_part_of(&self, borrower: Address) -> U256 {
        self.borrow_parts.get(&borrower).copied().unwrap_or_default()
    }

    pub fn share_total(&self, tracker_totals: Rebase) -> U256 {
        pool_share_total(self.total_asset, self.total_borrow, tracker_totals)
    }

    /// Accrues borrow interest up to `timestamp`, returning the interest added
    pub fn accrue(&mut self, timestamp: u64) -> Result<U256> {
        if timestamp < self.last_accrued {
            return Err(AllocatorError::InvalidInterestAccrual {
                timestamp,
                last_update: self.last_accrued,
            });
        }
        let elapsed = U256::from(timestamp - self.last_accrued);
        self.last_accrued = timestamp;

        if self.total_borrow.base.is_zero() || elapsed.is_zero() {
            return Ok(U256::ZERO);
        }

        let rate = self.interest_per_second.saturating_mul(elapsed);
        let extra = w_mul_down(self.total_borrow.elastic, rate);
        self.total_borrow = self.total_borrow.add(extra, U256::ZERO);
        Ok(extra)
    }

    /// Credits `share` tracker shares to the pool and mints fractions to `to`
    pub fn add_asset(&mut self, to: Address, share: U256, tracker_totals: Rebase) -> U256 {
        let fraction = if self.total_asset.base.is_zero() {
            share
        } else {
            mul_div(
                share,
                self.total_asset.base,
                self.share_total(tracker_totals),
                RoundingDirection::Down,
            )
        };
        self.total_asset = self.total_asset.add(share, fraction);
        *self.balances.entry(to).or_default() += fraction;
        fraction
    }

    /// Burns `fraction` from `from`, returning the tracker shares it redeems
    pub fn remove_asset(&mut self, from: Address, fraction: U256, tracker_totals: Rebase) -> Result<U256> {
        let held = self.balance_of(from);
        if held < fraction {
            return Err(AllocatorError::InsufficientFraction {
                pool: self.id,
                holder: from,
            });
        }
        let share = mul_div(
            fraction,
            self.share_total(tracker_totals),
            self.total_asset.base,
            RoundingDirection::Down,
        );
        let updated = self
            .total_asset
            .sub(share, fraction)
            .ok_or(AllocatorError::InsufficientPoolLiquidity {
                pool: self.id,
                requested: share,
                available: self.total_asset.elastic,
            })?;
        self.total_asset = updated;
        self.balances.insert(from, held - fraction);
        Ok(share)
    }

    /// Lends `amount` of asset to `borrower`, returning `(part, share)` where
    /// `share` is the tracker share amount leaving the pool
    pub fn borrow(&mut self, borrower: Address, amount: U256, tracker_totals: Rebase) -> Result<(U256, U256)> {
        let share = tracker_totals.to_base(amount, RoundingDirection::Down);
        if share > self.total_asset.elastic {
            return Err(AllocatorError::InsufficientPoolLiquidity {
                pool: self.id,
                requested: share,
                available: self.total_asset.elastic,
            });
        }
        let part = self.total_borrow.to_base(amount, RoundingDirection::Up);
        self.total_borrow = self.total_borrow.add(amount, part);
        self.total_asset.elastic -= share;
        *self.borrow_parts.entry(borrower).or_default() += part;
        Ok((part, share))
    }

    /// Repays `part` of a borrower's debt, returning `(amount, share)` where
    /// `share` is the tracker share amount entering the pool
    pub fn repay(&mut self, borrower: Address, part: U256, tracker_totals: Rebase) -> Result<(U256, U256)> {
        let owed = self.borrow_part_of(borrower);
        if owed < part {
            return Err(AllocatorError::InsufficientFraction {
                pool: self.id,
                holder: borrower,
            });
        }
        let amount = self.total_borrow.to_elastic(part, RoundingDirection::Up);
        let amount = crate::math::min(amount, self.total_borrow.elastic);
        let share = tracker_totals.to_base(amount, RoundingDirection::Up);
        self.total_borrow = self
            .total_borrow
            .sub(amount, part)
            .ok_or(AllocatorError::AccountingInvariant {
                pool: self.id,
                reason: "repayment exceeds outstanding borrow",
            })?;
        self.total_asset.elastic += share;
        self.borrow_parts.insert(borrower, owed - part);
        Ok((amount, share))
    }

    /// Moves fractions between lenders
    pub fn transfer(&mut self, from: Address, to: Address, fraction: U256) -> Result<()> {
        let held = self.balance_of(from);
        if held < fraction {
            return Err(AllocatorError::InsufficientFraction {
                pool: self.id,
                holder: from,
            });
        }
        self.balances.insert(from, held - fraction);
        *self.balances.entry(to).or_default() += fraction;
        Ok(())
    }
}
