//! Upstream vault.
//!
//! The allocator only needs the debt-policy surface captured by [`Vault`]:
//! how much the vault wants back, how much it will lend, and a `report` call
//! that settles profit, loss and debt repayment.
//!
//! [`DebtVault`] is the reference implementation. Each strategy (allocator)
//! gets a debt ratio in basis points of the vault's total assets. Shares use a
//! virtual-share conversion with a decimals offset so that a share always has
//! 18 decimals.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut vault = DebtVault::new(vault_addr, asset, 18, governance);
//! vault.add_strategy(governance, allocator.address, 10_000)?;
//! let shares = vault.deposit(&mut ledger, user, amount)?;
//! allocator.harvest(keeper, &mut ledger, &mut vault)?;
//! let assets = vault.withdraw(&mut ledger, user, shares, 1, &[&allocator])?;
//! ```

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use tracing::{debug, info, warn};

use crate::allocator::Allocator;
use crate::error::{AllocatorError, Result};
use crate::ledger::{atomically, Ledger};
use crate::math::{self, mul_div, zero_floor_sub, RoundingDirection, MAX_BPS, WAD};

/// Virtual assets added to total assets in share conversions
pub const VAULT_VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Default tolerated loss on withdrawal (0.01%)
pub const DEFAULT_MAX_LOSS_BPS: u16 = 1;

/// What an allocator calls on its vault
pub trait Vault: Clone {
    fn address(&self) -> Address;

    /// Asset the vault lends to its strategies
    fn asset(&self) -> Address;

    fn strategy_total_debt(&self, strategy: Address) -> U256;

    /// Additional capital the vault is willing to lend to `strategy` now
    fn credit_available<L: Ledger>(&self, ledger: &L, strategy: Address) -> U256;

    /// Capital the vault wants back from `strategy`
    fn debt_outstanding<L: Ledger>(&self, ledger: &L, strategy: Address) -> U256;

    /// Settles a harvest: records `profit` and `loss`, takes up to `debt_payment`
    /// back and lends any available credit. Returns the debt still outstanding.
    fn report<L: Ledger>(
        &mut self,
        ledger: &mut L,
        strategy: Address,
        profit: U256,
        loss: U256,
        debt_payment: U256,
    ) -> Result<U256>;

    /// Stops lending to `strategy` and asks for all of its debt back
    fn revoke_strategy(&mut self, strategy: Address) -> Result<()>;
}

/// Per-strategy debt book
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyParams {
    pub debt_ratio: u16,
    pub total_debt: U256,
    pub total_gain: U256,
    pub total_loss: U256,
    pub last_report: u64,
}

#[derive(Debug, Clone)]
pub struct DebtVault {
    /// Vault address (also its share token)
    pub address: Address,
    pub asset: Address,
    pub asset_decimals: u8,
    pub governance: Address,
    pub total_supply: U256,
    /// Sum of every strategy's debt
    pub total_debt: U256,
    /// Sum of every strategy's debt ratio
    pub debt_ratio: u32,
    pub emergency_shutdown: bool,
    strategies: HashMap<Address, StrategyParams>,
    withdrawal_queue: Vec<Address>,
    balances: HashMap<Address, U256>,
}

impl DebtVault {
    pub fn new(address: Address, asset: Address, asset_decimals: u8, governance: Address) -> Self {
        Self {
            address,
            asset,
            asset_decimals,
            governance,
            total_supply: U256::ZERO,
            total_debt: U256::ZERO,
            debt_ratio: 0,
            emergency_shutdown: false,
            strategies: HashMap::new(),
            withdrawal_queue: Vec::new(),
            balances: HashMap::new(),
        }
    }

    /// Calculate the decimals offset for share conversion
    pub fn decimals_offset(&self) -> u8 {
        18u8.saturating_sub(self.asset_decimals)
    }

    /// Virtual shares for this vault (10^decimals_offset)
    pub fn virtual_shares(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals_offset()))
    }

    /// Convert vault shares to assets given the vault's total assets
    pub fn to_assets(&self, total_assets: U256, shares: U256, rounding: RoundingDirection) -> U256 {
        mul_div(
            shares,
            total_assets + VAULT_VIRTUAL_ASSETS,
            self.total_supply + self.virtual_shares(),
            rounding,
        )
    }

    /// Convert assets to vault shares given the vault's total assets
    pub fn to_shares(&self, total_assets: U256, assets: U256, rounding: RoundingDirection) -> U256 {
        mul_div(
            assets,
            self.total_supply + self.virtual_shares(),
            total_assets + VAULT_VIRTUAL_ASSETS,
            rounding,
        )
    }

    /// Idle balance plus everything lent to strategies
    pub fn total_assets<L: Ledger>(&self, ledger: &L) -> U256 {
        self.idle(ledger) + self.total_debt
    }

    pub fn idle<L: Ledger>(&self, ledger: &L) -> U256 {
        ledger.token_balance(self.asset, self.address)
    }

    /// Assets backing one whole share (1e18 share units)
    pub fn price_per_share<L: Ledger>(&self, ledger: &L) -> U256 {
        self.to_assets(self.total_assets(ledger), WAD, RoundingDirection::Down)
    }

    pub fn balance_of(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or_default()
    }

    pub fn strategy(&self, strategy: Address) -> Option<&StrategyParams> {
        self.strategies.get(&strategy)
    }

    pub fn withdrawal_queue(&self) -> &[Address] {
        &self.withdrawal_queue
    }

    fn ensure_governance(&self, caller: Address, action: &'static str) -> Result<()> {
        if caller == self.governance {
            Ok(())
        } else {
            Err(AllocatorError::PermissionDenied { caller, action })
        }
    }

    fn params(&self, strategy: Address) -> Result<StrategyParams> {
        self.strategies
            .get(&strategy)
            .copied()
            .ok_or(AllocatorError::UnknownStrategy {
                vault: self.address,
                strategy,
            })
    }

    fn checked_debt_ratio(&self, total_bps: u32) -> Result<u32> {
        if total_bps > u32::from(MAX_BPS) {
            return Err(AllocatorError::DebtRatioExceeded { total_bps });
        }
        Ok(total_bps)
    }

    pub fn add_strategy(&mut self, caller: Address, strategy: Address, debt_ratio: u16) -> Result<()> {
        self.ensure_governance(caller, "add a strategy")?;
        if self.strategies.contains_key(&strategy) {
            return Err(AllocatorError::StrategyExists {
                vault: self.address,
                strategy,
            });
        }
        self.debt_ratio = self.checked_debt_ratio(self.debt_ratio + u32::from(debt_ratio))?;
        self.strategies.insert(
            strategy,
            StrategyParams {
                debt_ratio,
                ..Default::default()
            },
        );
        self.withdrawal_queue.push(strategy);
        info!(vault = %self.address, %strategy, debt_ratio, "strategy added");
        Ok(())
    }

    pub fn update_strategy_debt_ratio(&mut self, caller: Address, strategy: Address, debt_ratio: u16) -> Result<()> {
        self.ensure_governance(caller, "update a debt ratio")?;
        let params = self.params(strategy)?;
        let total = self.debt_ratio - u32::from(params.debt_ratio) + u32::from(debt_ratio);
        self.debt_ratio = self.checked_debt_ratio(total)?;
        self.set_params(strategy, StrategyParams { debt_ratio, ..params });
        Ok(())
    }

    pub fn set_emergency_shutdown(&mut self, caller: Address, active: bool) -> Result<()> {
        self.ensure_governance(caller, "toggle emergency shutdown")?;
        self.emergency_shutdown = active;
        warn!(vault = %self.address, active, "emergency shutdown toggled");
        Ok(())
    }

    fn set_params(&mut self, strategy: Address, params: StrategyParams) {
        self.strategies.insert(strategy, params);
    }

    /// Writes `loss` off the strategy's debt, returning the amount written off
    fn report_loss(&mut self, strategy: Address, loss: U256) -> Result<U256> {
        let mut params = self.params(strategy)?;
        let loss = math::min(loss, params.total_debt);
        params.total_loss += loss;
        params.total_debt -= loss;
        self.total_debt = zero_floor_sub(self.total_debt, loss);
        self.set_params(strategy, params);
        Ok(loss)
    }

    /// Deposits `amount` of asset from `user`, minting shares
    pub fn deposit<L: Ledger>(&mut self, ledger: &mut L, user: Address, amount: U256) -> Result<U256> {
        if self.emergency_shutdown {
            return Err(AllocatorError::PermissionDenied {
                caller: user,
                action: "deposit during emergency shutdown",
            });
        }
        let shares = self.to_shares(self.total_assets(ledger), amount, RoundingDirection::Down);
        ledger.transfer_token(self.asset, user, self.address, amount)?;
        self.total_supply += shares;
        *self.balances.entry(user).or_default() += shares;
        debug!(vault = %self.address, %user, %amount, %shares, "deposit");
        Ok(shares)
    }

    /// Burns `shares` from `user` and pays out their value, pulling from
    /// strategies in withdrawal-queue order when idle assets fall short.
    ///
    /// Strategy losses met on the way are written off and borne by `user`.
    /// The whole withdrawal is rejected if those losses exceed `max_loss_bps`
    /// of the requested value.
    pub fn withdraw<L: Ledger>(
        &mut self,
        ledger: &mut L,
        user: Address,
        shares: U256,
        max_loss_bps: u16,
        allocators: &[&Allocator],
    ) -> Result<U256> {
        let held = self.balance_of(user);
        if shares > held {
            return Err(AllocatorError::InsufficientBalance {
                token: self.address,
                holder: user,
                requested: shares,
                available: held,
            });
        }

        let mut next = self.clone();
        let value = atomically(ledger, |l| {
            let total_assets = next.total_assets(l);
            let mut value = next.to_assets(total_assets, shares, RoundingDirection::Down);
            let mut total_loss = U256::ZERO;

            for strategy in next.withdrawal_queue.clone() {
                let idle = next.idle(l);
                if value <= idle {
                    break;
                }
                let params = next.params(strategy)?;
                let needed = math::min(value - idle, params.total_debt);
                if needed.is_zero() {
                    continue;
                }
                let allocator = allocators
                    .iter()
                    .find(|a| a.address == strategy)
                    .ok_or(AllocatorError::UnknownStrategy {
                        vault: next.address,
                        strategy,
                    })?;

                let outcome = allocator.withdraw(next.address, l, needed)?;
                let withdrawn = zero_floor_sub(next.idle(l), idle);

                if !outcome.loss.is_zero() {
                    let written_off = next.report_loss(strategy, outcome.loss)?;
                    value = zero_floor_sub(value, written_off);
                    total_loss += written_off;
                }

                let mut params = next.params(strategy)?;
                params.total_debt = zero_floor_sub(params.total_debt, withdrawn);
                next.set_params(strategy, params);
                next.total_debt = zero_floor_sub(next.total_debt, withdrawn);
            }

            value = math::min(value, next.idle(l));

            let limit = math::bps_of(value + total_loss, max_loss_bps);
            if total_loss > limit {
                return Err(AllocatorError::MaxLossExceeded {
                    loss: total_loss,
                    limit,
                });
            }

            let burned = math::min(
                shares,
                next.to_shares(total_assets, value + total_loss, RoundingDirection::Up),
            );
            next.total_supply -= burned;
            next.balances.insert(user, held - burned);
            l.transfer_token(next.asset, next.address, user, value)?;

            if !total_loss.is_zero() {
                warn!(vault = %next.address, %user, loss = %total_loss, "withdrawal realized strategy losses");
            }
            debug!(vault = %next.address, %user, %value, %burned, "withdraw");
            Ok(value)
        })?;

        *self = next;
        Ok(value)
    }

    /// Hands `old`'s debt over to `new` and moves every asset `old` controls.
    pub fn migrate_strategy<L: Ledger>(
        &mut self,
        caller: Address,
        ledger: &mut L,
        old: &Allocator,
        new: &Allocator,
    ) -> Result<()> {
        self.ensure_governance(caller, "migrate a strategy")?;
        let params = self.params(old.address)?;
        if self.strategies.contains_key(&new.address) {
            return Err(AllocatorError::StrategyExists {
                vault: self.address,
                strategy: new.address,
            });
        }

        old.migrate(self.address, ledger, new)?;

        self.strategies.remove(&old.address);
        self.set_params(
            new.address,
            StrategyParams {
                total_gain: U256::ZERO,
                total_loss: U256::ZERO,
                ..params
            },
        );
        for slot in &mut self.withdrawal_queue {
            if *slot == old.address {
                *slot = new.address;
            }
        }
        info!(vault = %self.address, old = %old.address, new = %new.address, "strategy migrated");
        Ok(())
    }
}

impl Vault for DebtVault {
    fn address(&self) -> Address {
        self.address
    }

    fn asset(&self) -> Address {
        self.asset
    }

    fn strategy_total_debt(&self, strategy: Address) -> U256 {
        self.strategies
            .get(&strategy)
            .map(|p| p.total_debt)
            .unwrap_or_default()
    }

    fn credit_available<L: Ledger>(&self, ledger: &L, strategy: Address) -> U256 {
        if self.emergency_shutdown {
            return U256::ZERO;
        }
        let Some(params) = self.strategies.get(&strategy) else {
            return U256::ZERO;
        };
        let total_assets = self.total_assets(ledger);
        let vault_limit = mul_div(
            total_assets,
            U256::from(self.debt_ratio),
            U256::from(MAX_BPS),
            RoundingDirection::Down,
        );
        let strategy_limit = math::bps_of(total_assets, params.debt_ratio);

        if strategy_limit <= params.total_debt || vault_limit <= self.total_debt {
            return U256::ZERO;
        }
        let available = math::min(strategy_limit - params.total_debt, vault_limit - self.total_debt);
        math::min(available, self.idle(ledger))
    }

    fn debt_outstanding<L: Ledger>(&self, ledger: &L, strategy: Address) -> U256 {
        let Some(params) = self.strategies.get(&strategy) else {
            return U256::ZERO;
        };
        if self.debt_ratio == 0 || self.emergency_shutdown {
            return params.total_debt;
        }
        let strategy_limit = math::bps_of(self.total_assets(ledger), params.debt_ratio);
        zero_floor_sub(params.total_debt, strategy_limit)
    }

    fn report<L: Ledger>(
        &mut self,
        ledger: &mut L,
        strategy: Address,
        profit: U256,
        loss: U256,
        debt_payment: U256,
    ) -> Result<U256> {
        self.params(strategy)?;

        if !loss.is_zero() {
            self.report_loss(strategy, loss)?;
        }

        let mut params = self.params(strategy)?;
        params.total_gain += profit;

        // Credit is sized before the strategy's gain reaches the vault
        let credit = self.credit_available(ledger, strategy);
        let mut debt = self.debt_outstanding(ledger, strategy);
        let debt_payment = math::min(debt_payment, debt);

        if !debt_payment.is_zero() {
            params.total_debt -= debt_payment;
            self.total_debt -= debt_payment;
            debt -= debt_payment;
        }
        if !credit.is_zero() {
            params.total_debt += credit;
            self.total_debt += credit;
        }

        let total_available = profit + debt_payment;
        if total_available < credit {
            ledger.transfer_token(self.asset, self.address, strategy, credit - total_available)?;
        } else if total_available > credit {
            ledger.transfer_token(self.asset, strategy, self.address, total_available - credit)?;
        }

        params.last_report = ledger.now();
        self.set_params(strategy, params);

        info!(
            vault = %self.address,
            %strategy,
            %profit,
            %loss,
            %debt_payment,
            %credit,
            total_debt = %params.total_debt,
            "strategy reported"
        );

        if self.emergency_shutdown || self.debt_ratio == 0 {
            Ok(params.total_debt)
        } else {
            Ok(debt)
        }
    }

    fn revoke_strategy(&mut self, strategy: Address) -> Result<()> {
        let params = self.params(strategy)?;
        self.debt_ratio -= u32::from(params.debt_ratio);
        self.set_params(strategy, StrategyParams { debt_ratio: 0, ..params });
        warn!(vault = %self.address, %strategy, "strategy revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    const ASSET: u8 = 1;
    const VAULT: u8 = 20;
    const GOV: u8 = 21;
    const STRATEGY: u8 = 30;
    const USER: u8 = 40;

    fn create_test_world() -> (InMemoryLedger, DebtVault) {
        let mut ledger = InMemoryLedger::new(addr(2), 1_000);
        ledger.mint(addr(ASSET), addr(USER), U256::from(1_000_000));
        let mut vault = DebtVault::new(addr(VAULT), addr(ASSET), 18, addr(GOV));
        vault.add_strategy(addr(GOV), addr(STRATEGY), 9_000).unwrap();
        vault
            .deposit(&mut ledger, addr(USER), U256::from(1_000_000))
            .unwrap();
        (ledger, vault)
    }

    #[test]
    fn test_deposit_mints_shares_one_to_one() {
        let (ledger, vault) = create_test_world();
        assert_eq!(vault.balance_of(addr(USER)), U256::from(1_000_000));
        assert_eq!(vault.total_assets(&ledger), U256::from(1_000_000));
        assert_eq!(vault.price_per_share(&ledger), WAD);
    }

    #[test]
    fn test_credit_respects_debt_ratio() {
        let (ledger, vault) = create_test_world();
        assert_eq!(vault.credit_available(&ledger, addr(STRATEGY)), U256::from(900_000));
        assert_eq!(vault.debt_outstanding(&ledger, addr(STRATEGY)), U256::ZERO);
        assert_eq!(vault.credit_available(&ledger, addr(99)), U256::ZERO);
    }

    #[test]
    fn test_report_lends_credit() {
        let (mut ledger, mut vault) = create_test_world();
        let outstanding = vault
            .report(&mut ledger, addr(STRATEGY), U256::ZERO, U256::ZERO, U256::ZERO)
            .unwrap();
        assert_eq!(outstanding, U256::ZERO);
        assert_eq!(ledger.token_balance(addr(ASSET), addr(STRATEGY)), U256::from(900_000));
        assert_eq!(vault.strategy_total_debt(addr(STRATEGY)), U256::from(900_000));
        assert_eq!(vault.total_assets(&ledger), U256::from(1_000_000));
    }

    #[test]
    fn test_report_profit_raises_share_price() {
        let (mut ledger, mut vault) = create_test_world();
        vault
            .report(&mut ledger, addr(STRATEGY), U256::ZERO, U256::ZERO, U256::ZERO)
            .unwrap();
        ledger.mint(addr(ASSET), addr(STRATEGY), U256::from(9_000));
        vault
            .report(&mut ledger, addr(STRATEGY), U256::from(9_000), U256::ZERO, U256::ZERO)
            .unwrap();
        assert_eq!(vault.total_assets(&ledger), U256::from(1_009_000));
        assert!(vault.price_per_share(&ledger) > WAD);
        assert_eq!(vault.strategy(addr(STRATEGY)).unwrap().total_gain, U256::from(9_000));
    }

    #[test]
    fn test_report_loss_writes_down_debt() {
        let (mut ledger, mut vault) = create_test_world();
        vault
            .report(&mut ledger, addr(STRATEGY), U256::ZERO, U256::ZERO, U256::ZERO)
            .unwrap();
        vault
            .update_strategy_debt_ratio(addr(GOV), addr(STRATEGY), 9_000)
            .unwrap();
        vault
            .report(&mut ledger, addr(STRATEGY), U256::ZERO, U256::from(10_000), U256::ZERO)
            .unwrap();
        let params = vault.strategy(addr(STRATEGY)).unwrap();
        assert_eq!(params.total_loss, U256::from(10_000));
        assert_eq!(vault.total_assets(&ledger), U256::from(990_000));
    }

    #[test]
    fn test_revoke_asks_for_all_debt() {
        let (mut ledger, mut vault) = create_test_world();
        vault
            .report(&mut ledger, addr(STRATEGY), U256::ZERO, U256::ZERO, U256::ZERO)
            .unwrap();
        vault.revoke_strategy(addr(STRATEGY)).unwrap();
        assert_eq!(vault.debt_ratio, 0);
        assert_eq!(vault.debt_outstanding(&ledger, addr(STRATEGY)), U256::from(900_000));

        let outstanding = vault
            .report(&mut ledger, addr(STRATEGY), U256::ZERO, U256::ZERO, U256::from(900_000))
            .unwrap();
        assert_eq!(outstanding, U256::ZERO);
        assert_eq!(ledger.token_balance(addr(ASSET), addr(VAULT)), U256::from(1_000_000));
    }

    #[test]
    fn test_debt_ratio_cap() {
        let (_, mut vault) = create_test_world();
        let result = vault.add_strategy(addr(GOV), addr(31), 1_001);
        assert_eq!(result, Err(AllocatorError::DebtRatioExceeded { total_bps: 10_001 }));
        assert!(vault.add_strategy(addr(USER), addr(31), 1).is_err());
        assert!(vault.add_strategy(addr(GOV), addr(STRATEGY), 0).is_err());
    }

    #[test]
    fn test_withdraw_from_idle() {
        let (mut ledger, mut vault) = create_test_world();
        let paid = vault
            .withdraw(&mut ledger, addr(USER), U256::from(400_000), DEFAULT_MAX_LOSS_BPS, &[])
            .unwrap();
        assert_eq!(paid, U256::from(400_000));
        assert_eq!(vault.balance_of(addr(USER)), U256::from(600_000));
        assert_eq!(ledger.token_balance(addr(ASSET), addr(USER)), U256::from(400_000));
    }

    #[test]
    fn test_withdraw_more_shares_than_held() {
        let (mut ledger, mut vault) = create_test_world();
        let result = vault.withdraw(&mut ledger, addr(USER), U256::from(1_000_001), 1, &[]);
        assert!(matches!(result, Err(AllocatorError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_deposit_rejected_during_shutdown() {
        let (mut ledger, mut vault) = create_test_world();
        vault.set_emergency_shutdown(addr(GOV), true).unwrap();
        ledger.mint(addr(ASSET), addr(USER), U256::from(5));
        assert!(vault.deposit(&mut ledger, addr(USER), U256::from(5)).is_err());
        assert_eq!(vault.credit_available(&ledger, addr(STRATEGY)), U256::ZERO);
    }
}
