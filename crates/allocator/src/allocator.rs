//! The allocator: configuration, roles and valuation queries.
//!
//! Operations are split by concern:
//! - [`crate::rebalance`]: `harvest`, `tend`
//! - [`crate::withdraw`]: `withdraw`, liquidation
//! - [`crate::lifecycle`]: pool set changes, migration, emergency exit, sweep
//!
//! The allocator holds no balances of its own. Every amount it reports is
//! recomputed from the [`Ledger`] at call time; nothing read from a pool or
//! the tracker survives past the call that read it.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::info;

use crate::config::{AllocatorConfig, Roles};
use crate::error::{AllocatorError, PoolId, Result};
use crate::health::HealthCheck;
use crate::ledger::Ledger;
use crate::math::{self, RoundingDirection};
use crate::registry::PoolRegistry;
use crate::valuation::{self, PoolSnapshot};
use crate::vault::Vault;

/// One row of [`Allocator::position_values`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionReport {
    pub pool: PoolId,
    pub weight_bps: u16,
    /// Fraction balance held in the pool
    pub fraction: U256,
    /// Credit value in asset terms
    pub value: U256,
    /// Un-lent asset in the pool
    pub free_liquidity: U256,
    /// Part of `value` that could be withdrawn right now
    pub redeemable: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocator {
    /// Identity under which the allocator holds balances
    pub address: Address,
    pub vault: Address,
    pub asset: Address,
    pub tracker: Address,
    pub roles: Roles,
    pub registry: PoolRegistry,
    pub health_check: HealthCheck,
    /// When false the next harvest skips the health check, then re-arms it
    pub do_health_check: bool,
    pub emergency_exit: bool,
    /// Loss reported to the vault only because pools were illiquid, not yet
    /// recovered. Recoveries up to this amount bypass the profit limit.
    pub written_off: U256,
    initialized: bool,
}

impl Allocator {
    fn blank(address: Address) -> Self {
        Self {
            address,
            vault: Address::ZERO,
            asset: Address::ZERO,
            tracker: Address::ZERO,
            roles: Roles::single(Address::ZERO),
            registry: PoolRegistry::new(),
            health_check: HealthCheck::default(),
            do_health_check: true,
            emergency_exit: false,
            written_off: U256::ZERO,
            initialized: false,
        }
    }

    /// Creates an allocator at `address` and initializes it from `config`
    pub fn new<L: Ledger, V: Vault>(address: Address, config: AllocatorConfig, vault: &V, ledger: &L) -> Result<Self> {
        let mut allocator = Self::blank(address);
        allocator.initialize(config, vault, ledger)?;
        Ok(allocator)
    }

    /// Builds an independent allocator at `address` from `config`.
    ///
    /// The clone shares nothing with `self`; both stay operable.
    pub fn clone_with_config<L: Ledger, V: Vault>(
        &self,
        address: Address,
        config: AllocatorConfig,
        vault: &V,
        ledger: &L,
    ) -> Result<Self> {
        let clone = Self::new(address, config, vault, ledger)?;
        info!(original = %self.address, clone = %clone.address, "allocator cloned");
        Ok(clone)
    }

    /// Applies `config`; fails on any allocator that was already initialized
    pub fn initialize<L: Ledger, V: Vault>(&mut self, config: AllocatorConfig, vault: &V, ledger: &L) -> Result<()> {
        if self.initialized {
            return Err(AllocatorError::AlreadyInitialized {
                allocator: self.address,
            });
        }
        if vault.address() != config.vault {
            return Err(AllocatorError::VaultMismatch {
                expected: config.vault,
                found: vault.address(),
            });
        }
        if vault.asset() != config.asset {
            return Err(AllocatorError::VaultMismatch {
                expected: config.asset,
                found: vault.asset(),
            });
        }

        let mut next = Self::blank(self.address);
        next.vault = config.vault;
        next.asset = config.asset;
        next.tracker = config.tracker;
        next.roles = config.roles;
        next.health_check = config.health_check.unwrap_or_default();
        for position in &config.positions {
            next.validate_pool(ledger, position.pool)?;
        }
        next.registry = PoolRegistry::from_positions(&config.positions)?;
        next.initialized = true;

        info!(
            allocator = %next.address,
            vault = %next.vault,
            pools = next.registry.len(),
            "allocator initialized"
        );
        *self = next;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Reproduces the configuration this allocator currently runs with
    pub fn config(&self) -> AllocatorConfig {
        AllocatorConfig {
            vault: self.vault,
            asset: self.asset,
            tracker: self.tracker,
            roles: self.roles,
            positions: self.registry.positions().to_vec(),
            health_check: Some(self.health_check),
        }
    }

    /// Rejects pools that do not exist or lend another asset through another tracker
    pub(crate) fn validate_pool<L: Ledger>(&self, ledger: &L, pool: PoolId) -> Result<()> {
        let info = ledger.pool_info(pool).ok_or(AllocatorError::InvalidPool {
            pool,
            reason: "pool does not exist",
        })?;
        if info.asset != self.asset {
            return Err(AllocatorError::InvalidPool {
                pool,
                reason: "pool lends a different asset",
            });
        }
        if info.tracker != self.tracker {
            return Err(AllocatorError::InvalidPool {
                pool,
                reason: "pool uses a different tracker",
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_governance(&self, caller: Address, action: &'static str) -> Result<()> {
        if caller == self.roles.governance {
            return Ok(());
        }
        Err(AllocatorError::PermissionDenied { caller, action })
    }

    /// Strategist or governance
    pub(crate) fn ensure_authorized(&self, caller: Address, action: &'static str) -> Result<()> {
        if caller == self.roles.strategist || caller == self.roles.governance {
            return Ok(());
        }
        Err(AllocatorError::PermissionDenied { caller, action })
    }

    /// Keeper, strategist or governance
    pub(crate) fn ensure_keeper(&self, caller: Address, action: &'static str) -> Result<()> {
        if caller == self.roles.keeper {
            return Ok(());
        }
        self.ensure_authorized(caller, action)
    }

    pub(crate) fn ensure_vault(&self, caller: Address, action: &'static str) -> Result<()> {
        if caller == self.vault {
            return Ok(());
        }
        Err(AllocatorError::PermissionDenied { caller, action })
    }

    /// Asset held directly by the allocator
    pub fn idle<L: Ledger>(&self, ledger: &L) -> U256 {
        ledger.token_balance(self.asset, self.address)
    }

    /// Tracker shares held outside any pool, valued in asset
    pub fn loose_value<L: Ledger>(&self, ledger: &L) -> U256 {
        let shares = ledger.tracker_balance(self.asset, self.address);
        ledger.to_amount(self.asset, shares, RoundingDirection::Down)
    }

    /// Current asset value of the allocator's credit in `pool`
    pub fn position_value<L: Ledger>(&self, ledger: &L, pool: PoolId) -> Result<U256> {
        let fraction = ledger.fraction_balance(pool, self.address)?;
        if fraction.is_zero() {
            return Ok(U256::ZERO);
        }
        let snapshot = PoolSnapshot::read(ledger, pool, self.asset)?;
        valuation::position_value(fraction, &snapshot)
    }

    /// Idle asset, loose tracker shares and every position, valued now
    pub fn estimated_total_assets<L: Ledger>(&self, ledger: &L) -> Result<U256> {
        let mut total = self.idle(ledger) + self.loose_value(ledger);
        for position in &self.registry {
            total += self.position_value(ledger, position.pool)?;
        }
        Ok(total)
    }

    /// Per-position valuation, in registry order
    pub fn position_values<L: Ledger>(&self, ledger: &L) -> Result<Vec<PositionReport>> {
        self.registry
            .iter()
            .map(|position| {
                let fraction = ledger.fraction_balance(position.pool, self.address)?;
                let snapshot = PoolSnapshot::read(ledger, position.pool, self.asset)?;
                let value = valuation::position_value(fraction, &snapshot)?;
                let free_liquidity = snapshot.free_liquidity();
                Ok(PositionReport {
                    pool: position.pool,
                    weight_bps: position.weight_bps,
                    fraction,
                    value,
                    free_liquidity,
                    redeemable: math::min(value, free_liquidity),
                })
            })
            .collect()
    }

    /// Brings interest on every registered pool up to date
    pub(crate) fn accrue_all<L: Ledger>(&self, ledger: &mut L) -> Result<()> {
        for position in &self.registry {
            ledger.accrue(position.pool)?;
        }
        Ok(())
    }
}
