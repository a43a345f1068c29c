//! Position valuation against live pool and tracker totals.
//!
//! A position is valued in three steps, each rounding down:
//!
//! ```text
//! share_total  = total_asset.elastic + tracker.to_base(total_borrow.elastic)
//! owned_shares = fraction * share_total / total_asset.base
//! value        = tracker.to_elastic(owned_shares)
//! ```
//!
//! A [`PoolSnapshot`] is read right before it is used and dropped afterwards.
//! Withdrawing from one pool changes the tracker's ratio, so a snapshot taken
//! before a pool interaction must not be reused after it.

use alloy_primitives::{Address, U256};

use crate::error::{AllocatorError, PoolId, Result};
use crate::ledger::Ledger;
use crate::math::{mul_div, RoundingDirection};
use crate::pool::pool_share_total;
use crate::rebase::Rebase;

/// Pool and tracker totals read at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub pool: PoolId,
    pub total_asset: Rebase,
    pub total_borrow: Rebase,
    /// Tracker totals for the pool's asset
    pub tracker: Rebase,
}

impl PoolSnapshot {
    pub fn read<L: Ledger>(ledger: &L, pool: PoolId, asset: Address) -> Result<Self> {
        Ok(Self {
            pool,
            total_asset: ledger.total_asset(pool)?,
            total_borrow: ledger.total_borrow(pool)?,
            tracker: ledger.tracker_totals(asset),
        })
    }

    pub fn share_total(&self) -> U256 {
        pool_share_total(self.total_asset, self.total_borrow, self.tracker)
    }

    /// Asset amount the pool holds un-lent
    pub fn free_liquidity(&self) -> U256 {
        self.tracker
            .to_elastic(self.total_asset.elastic, RoundingDirection::Down)
    }
}

/// Values `fraction` of the pool in asset terms.
///
/// A zero fraction is worth zero without touching the totals. A non-zero
/// fraction against a pool with no issued fractions cannot happen while the
/// pool's books are consistent and is reported as an invariant violation.
pub fn position_value(fraction: U256, snapshot: &PoolSnapshot) -> Result<U256> {
    if fraction.is_zero() {
        return Ok(U256::ZERO);
    }
    if snapshot.total_asset.base.is_zero() {
        return Err(AllocatorError::AccountingInvariant {
            pool: snapshot.pool,
            reason: "non-zero fraction in a pool with no issued fractions",
        });
    }
    let owned_shares = mul_div(
        fraction,
        snapshot.share_total(),
        snapshot.total_asset.base,
        RoundingDirection::Down,
    );
    Ok(snapshot
        .tracker
        .to_elastic(owned_shares, RoundingDirection::Down))
}

/// Smallest fraction whose redemption yields at least `amount`, or `None`
/// when the pool has nothing backing its fractions
pub fn fraction_for_amount(amount: U256, snapshot: &PoolSnapshot) -> Option<U256> {
    let share_total = snapshot.share_total();
    if share_total.is_zero() || snapshot.total_asset.base.is_zero() {
        return None;
    }
    let shares = snapshot.tracker.to_base(amount, RoundingDirection::Up);
    Some(mul_div(
        shares,
        snapshot.total_asset.base,
        share_total,
        RoundingDirection::Up,
    ))
}

/// Largest fraction the pool can redeem from its un-lent shares right now
pub fn max_redeemable_fraction(snapshot: &PoolSnapshot) -> U256 {
    mul_div(
        snapshot.total_asset.elastic,
        snapshot.total_asset.base,
        snapshot.share_total(),
        RoundingDirection::Down,
    )
}
