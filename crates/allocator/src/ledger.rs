//! Collaborator surface: token balances, the rebasing tracker and lending pools.
//!
//! The allocator never owns pool or tracker state. It reaches them through the
//! [`Ledger`] trait, re-reading every value it needs because other parties may
//! borrow, repay or lend between (and conceptually within) allocator calls.
//!
//! [`InMemoryLedger`] is the reference implementation used by the tests and the
//! scenario runner. Besides the trait surface it exposes the third-party actions
//! (lending, borrowing, repaying, time passing) that move pool state under the
//! allocator's feet.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};

use crate::error::{AllocatorError, PoolId, Result};
use crate::math::RoundingDirection;
use crate::pool::LendingPool;
use crate::rebase::Rebase;
use crate::tracker::RebasingTracker;

/// Static facts about a pool checked when it is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolInfo {
    pub asset: Address,
    pub tracker: Address,
}

/// Operations the allocator performs against its collaborators.
///
/// `Clone` lets callers stage a multi-step operation on a copy and commit it
/// only if every step succeeds (see [`atomically`]).
pub trait Ledger: Clone {
    /// Current timestamp in seconds
    fn now(&self) -> u64;

    fn token_balance(&self, token: Address, holder: Address) -> U256;

    fn transfer_token(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<()>;

    /// Address of the rebasing tracker
    fn tracker_id(&self) -> Address;

    fn tracker_totals(&self, token: Address) -> Rebase;

    fn to_share(&self, token: Address, amount: U256, rounding: RoundingDirection) -> U256 {
        self.tracker_totals(token).to_base(amount, rounding)
    }

    fn to_amount(&self, token: Address, share: U256, rounding: RoundingDirection) -> U256 {
        self.tracker_totals(token).to_elastic(share, rounding)
    }

    fn tracker_balance(&self, token: Address, holder: Address) -> U256;

    /// Moves `amount` tokens from `from` into the tracker, crediting shares to `to`.
    /// Returns `(amount, share)`.
    fn tracker_deposit(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<(U256, U256)>;

    /// Burns `share` from `from` and sends the released tokens to `to`.
    /// Returns `(amount, share)`.
    fn tracker_withdraw(&mut self, token: Address, from: Address, to: Address, share: U256) -> Result<(U256, U256)>;

    fn tracker_transfer(&mut self, token: Address, from: Address, to: Address, share: U256) -> Result<()>;

    /// Asset and tracker of a pool, `None` if no such pool exists
    fn pool_info(&self, pool: PoolId) -> Option<PoolInfo>;

    fn total_asset(&self, pool: PoolId) -> Result<Rebase>;

    fn total_borrow(&self, pool: PoolId) -> Result<Rebase>;

    fn fraction_balance(&self, pool: PoolId, holder: Address) -> Result<U256>;

    /// Brings the pool's borrow interest up to date
    fn accrue(&mut self, pool: PoolId) -> Result<()>;

    /// Moves `share` tracker shares from `holder` into the pool, returning the fraction minted
    fn add_asset(&mut self, pool: PoolId, holder: Address, share: U256) -> Result<U256>;

    /// Burns `fraction` of `holder`'s credit, returning the tracker shares sent back
    fn remove_asset(&mut self, pool: PoolId, holder: Address, fraction: U256) -> Result<U256>;

    fn transfer_fraction(&mut self, pool: PoolId, from: Address, to: Address, fraction: U256) -> Result<()>;
}

/// Runs `f` against a staged copy of the ledger and commits it only on success.
pub fn atomically<L, T, F>(ledger: &mut L, f: F) -> Result<T>
where
    L: Ledger,
    F: FnOnce(&mut L) -> Result<T>,
{
    let mut staged = ledger.clone();
    let out = f(&mut staged)?;
    *ledger = staged;
    Ok(out)
}

/// In-memory world: token balances, one tracker and any number of pools
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    now: u64,
    tracker: RebasingTracker,
    pools: HashMap<PoolId, LendingPool>,
    tokens: HashMap<(Address, Address), U256>,
}

impl InMemoryLedger {
    pub fn new(tracker_id: Address, now: u64) -> Self {
        Self {
            now,
            tracker: RebasingTracker::new(tracker_id),
            pools: HashMap::new(),
            tokens: HashMap::new(),
        }
    }

    pub fn tracker(&self) -> &RebasingTracker {
        &self.tracker
    }

    pub fn pool(&self, pool: PoolId) -> Result<&LendingPool> {
        self.pools
            .get(&pool)
            .ok_or(AllocatorError::UnknownPool { pool })
    }

    fn pool_mut(&mut self, pool: PoolId) -> Result<&mut LendingPool> {
        self.pools
            .get_mut(&pool)
            .ok_or(AllocatorError::UnknownPool { pool })
    }

    /// Creates tokens out of thin air
    pub fn mint(&mut self, token: Address, to: Address, amount: U256) {
        *self.tokens.entry((token, to)).or_default() += amount;
    }

    /// Adds a pool to the world
    pub fn register_pool(&mut self, pool: LendingPool) {
        self.pools.insert(pool.id, pool);
    }

    /// Creates and adds a pool lending `asset` through this ledger's tracker
    pub fn create_pool(&mut self, id: PoolId, asset: Address, interest_per_second: U256) {
        let pool = LendingPool::new(id, asset, self.tracker.id, interest_per_second, self.now);
        self.register_pool(pool);
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.now += seconds;
    }

    /// Third-party lending: deposits `amount` of the pool's asset on behalf of `lender`
    pub fn lend(&mut self, pool: PoolId, lender: Address, amount: U256) -> Result<U256> {
        let asset = self.pool(pool)?.asset;
        self.accrue(pool)?;
        let (_, share) = self.tracker_deposit(asset, lender, lender, amount)?;
        self.add_asset(pool, lender, share)
    }

    /// Third-party borrowing; the borrowed shares land in the borrower's tracker balance.
    /// Returns the borrow part.
    pub fn borrow(&mut self, pool: PoolId, borrower: Address, amount: U256) -> Result<U256> {
        self.accrue(pool)?;
        let asset = self.pool(pool)?.asset;
        let totals = self.tracker.totals(asset);
        let pool_state = self.pool_mut(pool)?;
        let (part, share) = pool_state.borrow(borrower, amount, totals)?;
        self.tracker.transfer(asset, pool, borrower, share)?;
        Ok(part)
    }

    /// Borrows every share the pool holds un-lent
    pub fn borrow_all(&mut self, pool: PoolId, borrower: Address) -> Result<U256> {
        self.accrue(pool)?;
        let state = self.pool(pool)?;
        let totals = self.tracker.totals(state.asset);
        let shares = state.total_asset.elastic;
        let mut amount = totals.to_elastic(shares, RoundingDirection::Up);
        if totals.to_base(amount, RoundingDirection::Down) > shares {
            amount = totals.to_elastic(shares, RoundingDirection::Down);
        }
        self.borrow(pool, borrower, amount)
    }

    /// Repays `part` of a borrower's debt out of the borrower's tracker balance
    pub fn repay(&mut self, pool: PoolId, borrower: Address, part: U256) -> Result<U256> {
        self.accrue(pool)?;
        let asset = self.pool(pool)?.asset;
        let totals = self.tracker.totals(asset);
        let mut staged = self.pool(pool)?.clone();
        let (amount, share) = staged.repay(borrower, part, totals)?;
        self.tracker.transfer(asset, borrower, pool, share)?;
        self.pools.insert(pool, staged);
        Ok(amount)
    }

    /// Grows the tracker's holdings of `token` without minting shares
    pub fn tracker_gain(&mut self, token: Address, amount: U256) {
        let tracker_id = self.tracker.id;
        self.mint(token, tracker_id, amount);
        self.tracker.gain(token, amount);
    }

    /// Asset amount the pool could pay out right now
    pub fn free_liquidity(&self, pool: PoolId) -> Result<U256> {
        let state = self.pool(pool)?;
        Ok(self
            .tracker
            .to_amount(state.asset, state.total_asset.elastic, RoundingDirection::Down))
    }
}

impl Ledger for InMemoryLedger {
    fn now(&self) -> u64 {
        self.now
    }

    fn token_balance(&self, token: Address, holder: Address) -> U256 {
        self.tokens.get(&(token, holder)).copied().unwrap_or_default()
    }

    fn transfer_token(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<()> {
        let available = self.token_balance(token, from);
        if available < amount {
            return Err(AllocatorError::InsufficientBalance {
                token,
                holder: from,
                requested: amount,
                available,
            });
        }
        self.tokens.insert((token, from), available - amount);
        *self.tokens.entry((token, to)).or_default() += amount;
        Ok(())
    }

    fn tracker_id(&self) -> Address {
        self.tracker.id
    }

    fn tracker_totals(&self, token: Address) -> Rebase {
        self.tracker.totals(token)
    }

    fn tracker_balance(&self, token: Address, holder: Address) -> U256 {
        self.tracker.balance_of(token, holder)
    }

    fn tracker_deposit(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<(U256, U256)> {
        let tracker_id = self.tracker.id;
        self.transfer_token(token, from, tracker_id, amount)?;
        let share = self.tracker.deposit(token, to, amount);
        Ok((amount, share))
    }

    fn tracker_withdraw(&mut self, token: Address, from: Address, to: Address, share: U256) -> Result<(U256, U256)> {
        let amount = self.tracker.withdraw(token, from, share)?;
        let tracker_id = self.tracker.id;
        self.transfer_token(token, tracker_id, to, amount)?;
        Ok((amount, share))
    }

    fn tracker_transfer(&mut self, token: Address, from: Address, to: Address, share: U256) -> Result<()> {
        self.tracker.transfer(token, from, to, share)
    }

    fn pool_info(&self, pool: PoolId) -> Option<PoolInfo> {
        self.pools.get(&pool).map(|p| PoolInfo {
            asset: p.asset,
            tracker: p.tracker,
        })
    }

    fn total_asset(&self, pool: PoolId) -> Result<Rebase> {
        Ok(self.pool(pool)?.total_asset)
    }

    fn total_borrow(&self, pool: PoolId) -> Result<Rebase> {
        Ok(self.pool(pool)?.total_borrow)
    }

    fn fraction_balance(&self, pool: PoolId, holder: Address) -> Result<U256> {
        Ok(self.pool(pool)?.balance_of(holder))
    }

    fn accrue(&mut self, pool: PoolId) -> Result<()> {
        let now = self.now;
        self.pool_mut(pool)?.accrue(now)?;
        Ok(())
    }

    fn add_asset(&mut self, pool: PoolId, holder: Address, share: U256) -> Result<U256> {
        let asset = self.pool(pool)?.asset;
        let totals = self.tracker.totals(asset);
        self.tracker.transfer(asset, holder, pool, share)?;
        let fraction = self.pool_mut(pool)?.add_asset(holder, share, totals);
        Ok(fraction)
    }

    fn remove_asset(&mut self, pool: PoolId, holder: Address, fraction: U256) -> Result<U256> {
        let asset = self.pool(pool)?.asset;
        let totals = self.tracker.totals(asset);
        let share = self.pool_mut(pool)?.remove_asset(holder, fraction, totals)?;
        self.tracker.transfer(asset, pool, holder, share)?;
        Ok(share)
    }

    fn transfer_fraction(&mut self, pool: PoolId, from: Address, to: Address, fraction: U256) -> Result<()> {
        self.pool_mut(pool)?.transfer(from, to, fraction)
    }
}
