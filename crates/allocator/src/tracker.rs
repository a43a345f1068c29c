//! Rebasing balance tracker.
//!
//! The tracker custodies tokens on behalf of holders and books them as shares of
//! a per-token [`Rebase`]. When the tracker itself earns (its `elastic` grows
//! without new shares), every share becomes worth more, which shifts the
//! conversion used to value pool positions.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};

use crate::error::{AllocatorError, Result};
use crate::math::RoundingDirection;
use crate::rebase::Rebase;

#[derive(Debug, Clone, Default)]
pub struct RebasingTracker {
    /// The tracker's own address (custodian of deposited tokens)
    pub id: Address,
    totals: HashMap<Address, Rebase>,
    balances: HashMap<(Address, Address), U256>,
}

impl RebasingTracker {
    pub fn new(id: Address) -> Self {
        Self {
            id,
            totals: HashMap::new(),
            balances: HashMap::new(),
        }
    }

    /// Amount/share totals for a token
    pub fn totals(&self, token: Address) -> Rebase {
        self.totals.get(&token).copied().unwrap_or_default()
    }

    pub fn to_share(&self, token: Address, amount: U256, rounding: RoundingDirection) -> U256 {
        self.totals(token).to_base(amount, rounding)
    }

    pub fn to_amount(&self, token: Address, share: U256, rounding: RoundingDirection) -> U256 {
        self.totals(token).to_elastic(share, rounding)
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }

    /// Books a deposit of `amount` tokens for `to`, returning the shares minted.
    ///
    /// Token custody is handled by the caller.
    pub fn deposit(&mut self, token: Address, to: Address, amount: U256) -> U256 {
        let totals = self.totals(token);
        let share = totals.to_base(amount, RoundingDirection::Down);
        self.totals.insert(token, totals.add(amount, share));
        *self.balances.entry((token, to)).or_default() += share;
        share
    }

    /// Burns `share` from `from`, returning the token amount released
    pub fn withdraw(&mut self, token: Address, from: Address, share: U256) -> Result<U256> {
        let totals = self.totals(token);
        let amount = totals.to_elastic(share, RoundingDirection::Down);
        let updated = totals
            .sub(amount, share)
            .ok_or(AllocatorError::InsufficientBalance {
                token,
                holder: self.id,
                requested: amount,
                available: totals.elastic,
            })?;
        self.debit(token, from, share)?;
        self.totals.insert(token, updated);
        Ok(amount)
    }

    /// Moves shares between holders
    pub fn transfer(&mut self, token: Address, from: Address, to: Address, share: U256) -> Result<()> {
        self.debit(token, from, share)?;
        *self.balances.entry((token, to)).or_default() += share;
        Ok(())
    }

    /// Grows a token's elastic without minting shares
    pub fn gain(&mut self, token: Address, amount: U256) {
        let totals = self.totals(token);
        self.totals.insert(token, totals.add(amount, U256::ZERO));
    }

    fn debit(&mut self, token: Address, holder: Address, share: U256) -> Result<()> {
        let available = self.balance_of(token, holder);
        if available < share {
            return Err(AllocatorError::InsufficientBalance {
                token,
                holder,
                requested: share,
                available,
            });
        }
        self.balances.insert((token, holder), available - share);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    #[test]
    fn test_deposit_bootstraps_one_to_one() {
        let mut t = RebasingTracker::new(addr(1));
        let share = t.deposit(addr(2), addr(3), U256::from(1_000));
        assert_eq!(share, U256::from(1_000));
        assert_eq!(t.balance_of(addr(2), addr(3)), U256::from(1_000));
        assert_eq!(t.totals(addr(2)), Rebase::new(U256::from(1_000), U256::from(1_000)));
    }

    #[test]
    fn test_gain_shifts_ratio() {
        let mut t = RebasingTracker::new(addr(1));
        t.deposit(addr(2), addr(3), U256::from(1_000));
        t.gain(addr(2), U256::from(250));

        assert_eq!(
            t.to_amount(addr(2), U256::from(1_000), RoundingDirection::Down),
            U256::from(1_250)
        );
        // A later depositor receives fewer shares for the same amount
        let share = t.deposit(addr(2), addr(4), U256::from(1_250));
        assert_eq!(share, U256::from(1_000));
    }

    #[test]
    fn test_withdraw_releases_amount() {
        let mut t = RebasingTracker::new(addr(1));
        t.deposit(addr(2), addr(3), U256::from(1_000));
        t.gain(addr(2), U256::from(1_000));
        let amount = t.withdraw(addr(2), addr(3), U256::from(500)).unwrap();
        assert_eq!(amount, U256::from(1_000));
        assert_eq!(t.totals(addr(2)), Rebase::new(U256::from(1_000), U256::from(500)));
    }

    #[test]
    fn test_withdraw_more_than_balance_fails() {
        let mut t = RebasingTracker::new(addr(1));
        t.deposit(addr(2), addr(3), U256::from(10));
        let result = t.withdraw(addr(2), addr(3), U256::from(11));
        assert!(matches!(result, Err(AllocatorError::InsufficientBalance { .. })));
        assert_eq!(t.balance_of(addr(2), addr(3)), U256::from(10));
    }

    #[test]
    fn test_failed_withdraw_keeps_holder_balance() {
        let mut t = RebasingTracker::new(addr(1));
        t.deposit(addr(2), addr(3), U256::from(100));
        // Totals that cannot cover the holder's shares
        t.totals.insert(addr(2), Rebase::new(U256::from(100), U256::from(50)));

        let result = t.withdraw(addr(2), addr(3), U256::from(100));
        assert!(matches!(result, Err(AllocatorError::InsufficientBalance { .. })));
        assert_eq!(t.balance_of(addr(2), addr(3)), U256::from(100));
    }

    #[test]
    fn test_transfer() {
        let mut t = RebasingTracker::new(addr(1));
        t.deposit(addr(2), addr(3), U256::from(10));
        t.transfer(addr(2), addr(3), addr(4), U256::from(4)).unwrap();
        assert_eq!(t.balance_of(addr(2), addr(3)), U256::from(6));
        assert_eq!(t.balance_of(addr(2), addr(4)), U256::from(4));
    }
}
