//! Pool set changes, migration and administrative switches.
//!
//! None of these move capital into pools. Removing or replacing a pool frees
//! what it can into idle; the next harvest redeploys it.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::{info, warn};

use crate::allocator::Allocator;
use crate::error::{AllocatorError, PoolId, Result};
use crate::health::HealthCheck;
use crate::ledger::{atomically, Ledger};
use crate::registry::Position;
use crate::vault::Vault;
use crate::withdraw::WITHDRAW_ALL;

/// Outcome of taking a pool out of the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolRemoval {
    /// Asset freed into idle
    pub withdrawn: U256,
    /// Value of credit left behind in the pool and no longer counted
    pub forfeited: U256,
}

impl Allocator {
    /// Appends `pool` to the registry. A zero weight keeps the pool tracked
    /// without allocating to it.
    pub fn add_pool<L: Ledger>(&mut self, caller: Address, ledger: &L, pool: PoolId, weight_bps: u16) -> Result<()> {
        self.ensure_governance(caller, "add a pool")?;
        if self.registry.contains(pool) {
            return Err(AllocatorError::DuplicatePool { pool });
        }
        self.validate_pool(ledger, pool)?;
        self.registry.push(Position::new(pool, weight_bps))?;
        info!(allocator = %self.address, %pool, weight_bps, "pool added");
        Ok(())
    }

    /// Withdraws everything the pool can pay and drops it from the registry.
    ///
    /// If credit is still stuck in the pool afterwards the call fails with
    /// `OutstandingBalance`, unless `force` is set, in which case that credit is
    /// forfeited. `new_weights`, when given, replaces the weights of the
    /// remaining positions in the same step.
    pub fn remove_pool<L: Ledger>(
        &mut self,
        caller: Address,
        ledger: &mut L,
        pool: PoolId,
        new_weights: Option<&[u16]>,
        force: bool,
    ) -> Result<PoolRemoval> {
        self.ensure_governance(caller, "remove a pool")?;
        let mut registry = self.registry.clone();
        registry.remove(pool)?;
        if let Some(weights) = new_weights {
            registry.set_weights(weights)?;
        }

        let removal = self.retire_position(ledger, pool, force)?;
        self.registry = registry;
        info!(
            allocator = %self.address,
            %pool,
            withdrawn = %removal.withdrawn,
            forfeited = %removal.forfeited,
            "pool removed"
        );
        Ok(removal)
    }

    /// Swaps `old` for `new` in the same slot with the same weight
    pub fn replace_pool<L: Ledger>(
        &mut self,
        caller: Address,
        ledger: &mut L,
        old: PoolId,
        new: PoolId,
        force: bool,
    ) -> Result<PoolRemoval> {
        self.ensure_governance(caller, "replace a pool")?;
        let index = self
            .registry
            .index_of(old)
            .ok_or(AllocatorError::UnknownPool { pool: old })?;
        if self.registry.contains(new) {
            return Err(AllocatorError::DuplicatePool { pool: new });
        }
        self.validate_pool(ledger, new)?;

        let mut registry = self.registry.clone();
        registry.replace_at(index, new)?;

        let removal = self.retire_position(ledger, old, force)?;
        self.registry = registry;
        info!(allocator = %self.address, %old, %new, index, "pool replaced");
        Ok(removal)
    }

    fn retire_position<L: Ledger>(&self, ledger: &mut L, pool: PoolId, force: bool) -> Result<PoolRemoval> {
        atomically(ledger, |l| {
            l.accrue(pool)?;
            let withdrawn = self.withdraw_from_position(l, pool, WITHDRAW_ALL)?;
            let forfeited = self.position_value(l, pool)?;
            if !forfeited.is_zero() {
                if !force {
                    return Err(AllocatorError::OutstandingBalance {
                        pool,
                        value: forfeited,
                    });
                }
                warn!(allocator = %self.address, %pool, %forfeited, "credit forfeited on pool removal");
            }
            Ok(PoolRemoval { withdrawn, forfeited })
        })
    }

    /// Replaces every weight at once. Capital moves on the next harvest.
    pub fn adjust_weights(&mut self, caller: Address, weights: &[u16]) -> Result<()> {
        self.ensure_authorized(caller, "adjust weights")?;
        self.registry.set_weights(weights)?;
        info!(allocator = %self.address, ?weights, "weights adjusted");
        Ok(())
    }

    /// Moves every position, loose tracker shares and idle asset to `new`.
    ///
    /// `new` must serve the same vault with an identical registry, so that its
    /// valuation right after equals ours right before.
    pub fn migrate<L: Ledger>(&self, caller: Address, ledger: &mut L, new: &Allocator) -> Result<()> {
        self.ensure_vault(caller, "migrate")?;
        self.ensure_migration_target(new)?;

        atomically(ledger, |l| {
            for position in &self.registry {
                self.transfer_position(l, new, position.pool)?;
            }
            let loose = l.tracker_balance(self.asset, self.address);
            if !loose.is_zero() {
                l.tracker_transfer(self.asset, self.address, new.address, loose)?;
            }
            let idle = self.idle(l);
            if !idle.is_zero() {
                l.transfer_token(self.asset, self.address, new.address, idle)?;
            }
            Ok(())
        })?;

        info!(allocator = %self.address, new = %new.address, "allocator migrated");
        Ok(())
    }

    /// Moves the credit of a single position to `new`, returning the fraction moved
    pub fn migrate_position<L: Ledger>(
        &self,
        caller: Address,
        ledger: &mut L,
        new: &Allocator,
        pool: PoolId,
    ) -> Result<U256> {
        self.ensure_vault(caller, "migrate a position")?;
        if !self.registry.contains(pool) {
            return Err(AllocatorError::UnknownPool { pool });
        }
        if new.vault != self.vault {
            return Err(AllocatorError::VaultMismatch {
                expected: self.vault,
                found: new.vault,
            });
        }
        if !new.registry.contains(pool) {
            return Err(AllocatorError::MigrationMismatch {
                target: new.address,
                reason: "target does not track the pool",
            });
        }
        let moved = self.transfer_position(ledger, new, pool)?;
        info!(allocator = %self.address, new = %new.address, %pool, fraction = %moved, "position migrated");
        Ok(moved)
    }

    fn transfer_position<L: Ledger>(&self, ledger: &mut L, new: &Allocator, pool: PoolId) -> Result<U256> {
        let held = ledger.fraction_balance(pool, self.address)?;
        if !held.is_zero() {
            ledger.transfer_fraction(pool, self.address, new.address, held)?;
        }
        Ok(held)
    }

    fn ensure_migration_target(&self, new: &Allocator) -> Result<()> {
        if new.vault != self.vault {
            return Err(AllocatorError::VaultMismatch {
                expected: self.vault,
                found: new.vault,
            });
        }
        let reason = if new.address == self.address {
            Some("cannot migrate to itself")
        } else if !new.is_initialized() {
            Some("target is not initialized")
        } else if new.asset != self.asset || new.tracker != self.tracker {
            Some("asset or tracker differs")
        } else if new.registry != self.registry {
            Some("pool configuration differs")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(AllocatorError::MigrationMismatch {
                target: new.address,
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Flags the allocator for exit and asks the vault for all of its debt back.
    /// The next harvest liquidates every position.
    pub fn set_emergency_exit<V: Vault>(&mut self, caller: Address, vault: &mut V) -> Result<()> {
        self.ensure_authorized(caller, "set emergency exit")?;
        vault.revoke_strategy(self.address)?;
        self.emergency_exit = true;
        warn!(allocator = %self.address, "emergency exit");
        Ok(())
    }

    /// Sends the allocator's whole balance of a stray `token` to governance
    pub fn sweep<L: Ledger>(&self, caller: Address, ledger: &mut L, token: Address) -> Result<U256> {
        self.ensure_governance(caller, "sweep")?;
        if token == self.asset {
            return Err(AllocatorError::NotWant { token });
        }
        if token == self.vault {
            return Err(AllocatorError::NotShareToken { token });
        }
        if self.registry.contains(token) {
            return Err(AllocatorError::ProtectedToken { token });
        }
        let amount = ledger.token_balance(token, self.address);
        ledger.transfer_token(token, self.address, self.roles.governance, amount)?;
        info!(allocator = %self.address, %token, %amount, "swept");
        Ok(amount)
    }

    pub fn set_keeper(&mut self, caller: Address, keeper: Address) -> Result<()> {
        self.ensure_authorized(caller, "set keeper")?;
        self.roles.keeper = keeper;
        Ok(())
    }

    pub fn set_strategist(&mut self, caller: Address, strategist: Address) -> Result<()> {
        self.ensure_authorized(caller, "set strategist")?;
        self.roles.strategist = strategist;
        Ok(())
    }

    pub fn set_health_check(&mut self, caller: Address, health_check: HealthCheck) -> Result<()> {
        self.ensure_authorized(caller, "set health check")?;
        self.health_check = health_check;
        Ok(())
    }

    /// Disabling skips the health check for the next harvest only
    pub fn set_do_health_check(&mut self, caller: Address, enabled: bool) -> Result<()> {
        self.ensure_authorized(caller, "toggle health check")?;
        self.do_health_check = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;
    use crate::ledger::InMemoryLedger;
    use crate::vault::DebtVault;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    const ASSET: u8 = 1;
    const TRACKER: u8 = 2;
    const VAULT: u8 = 20;
    const GOV: u8 = 21;
    const STRATEGIST: u8 = 22;
    const ME: u8 = 30;
    const BORROWER: u8 = 50;

    fn create_test_world() -> (InMemoryLedger, DebtVault, Allocator) {
        let mut ledger = InMemoryLedger::new(addr(TRACKER), 1_000);
        for id in 10..14 {
            ledger.create_pool(addr(id), addr(ASSET), U256::ZERO);
        }
        let vault = DebtVault::new(addr(VAULT), addr(ASSET), 18, addr(GOV));
        let config = AllocatorConfig::new(addr(VAULT), addr(ASSET), addr(TRACKER), addr(GOV))
            .with_strategist(addr(STRATEGIST))
            .with_position(addr(10), 5_000)
            .with_position(addr(11), 5_000);
        let allocator = Allocator::new(addr(ME), config, &vault, &ledger).unwrap();
        ledger.mint(addr(ASSET), addr(ME), U256::from(2_000));
        ledger.lend(addr(10), addr(ME), U256::from(1_000)).unwrap();
        ledger.lend(addr(11), addr(ME), U256::from(1_000)).unwrap();
        (ledger, vault, allocator)
    }

    #[test]
    fn test_add_pool_validation() {
        let (mut ledger, _, mut allocator) = create_test_world();
        ledger.create_pool(addr(14), addr(99), U256::ZERO);

        let duplicate = allocator.add_pool(addr(GOV), &ledger, addr(10), 0);
        assert_eq!(duplicate, Err(AllocatorError::DuplicatePool { pool: addr(10) }));
        let foreign = allocator.add_pool(addr(GOV), &ledger, addr(14), 0);
        assert!(matches!(foreign, Err(AllocatorError::InvalidPool { .. })));
        let missing = allocator.add_pool(addr(GOV), &ledger, addr(15), 0);
        assert!(matches!(missing, Err(AllocatorError::InvalidPool { .. })));
        let denied = allocator.add_pool(addr(STRATEGIST), &ledger, addr(12), 0);
        assert!(matches!(denied, Err(AllocatorError::PermissionDenied { .. })));

        allocator.add_pool(addr(GOV), &ledger, addr(12), 0).unwrap();
        assert_eq!(allocator.registry.pools(), vec![addr(10), addr(11), addr(12)]);
    }

    #[test]
    fn test_remove_liquid_pool_frees_to_idle() {
        let (mut ledger, _, mut allocator) = create_test_world();
        let before = allocator.estimated_total_assets(&ledger).unwrap();
        let removal = allocator
            .remove_pool(addr(GOV), &mut ledger, addr(10), Some(&[10_000]), false)
            .unwrap();
        assert_eq!(removal.withdrawn, U256::from(1_000));
        assert_eq!(removal.forfeited, U256::ZERO);
        assert_eq!(allocator.registry.weights(), vec![10_000]);
        assert_eq!(allocator.estimated_total_assets(&ledger).unwrap(), before);
    }

    #[test]
    fn test_remove_illiquid_pool_needs_force() {
        let (mut ledger, _, mut allocator) = create_test_world();
        ledger.borrow_all(addr(10), addr(BORROWER)).unwrap();
        let registry = allocator.registry.clone();

        let result = allocator.remove_pool(addr(GOV), &mut ledger, addr(10), None, false);
        assert_eq!(
            result,
            Err(AllocatorError::OutstandingBalance {
                pool: addr(10),
                value: U256::from(1_000)
            })
        );
        assert_eq!(allocator.registry, registry);

        let before = allocator.estimated_total_assets(&ledger).unwrap();
        let removal = allocator
            .remove_pool(addr(GOV), &mut ledger, addr(10), None, true)
            .unwrap();
        assert_eq!(removal.forfeited, U256::from(1_000));
        assert_eq!(
            allocator.estimated_total_assets(&ledger).unwrap(),
            before - removal.forfeited
        );
    }

    #[test]
    fn test_replace_pool_keeps_slot() {
        let (mut ledger, _, mut allocator) = create_test_world();
        let before = allocator.estimated_total_assets(&ledger).unwrap();
        allocator
            .replace_pool(addr(GOV), &mut ledger, addr(10), addr(12), false)
            .unwrap();
        assert_eq!(allocator.registry.pools(), vec![addr(12), addr(11)]);
        assert_eq!(allocator.registry.weights(), vec![5_000, 5_000]);
        assert_eq!(allocator.estimated_total_assets(&ledger).unwrap(), before);
        assert_eq!(allocator.idle(&ledger), U256::from(1_000));
    }

    #[test]
    fn test_adjust_weights_roles() {
        let (_, _, mut allocator) = create_test_world();
        allocator.adjust_weights(addr(STRATEGIST), &[3_000, 7_000]).unwrap();
        assert!(allocator.adjust_weights(addr(BORROWER), &[0, 0]).is_err());
        assert!(allocator.adjust_weights(addr(GOV), &[6_000, 6_000]).is_err());
        assert_eq!(allocator.registry.weights(), vec![3_000, 7_000]);
    }

    #[test]
    fn test_sweep_protections() {
        let (mut ledger, _, allocator) = create_test_world();
        ledger.mint(addr(77), addr(ME), U256::from(5));

        assert_eq!(
            allocator.sweep(addr(GOV), &mut ledger, addr(ASSET)),
            Err(AllocatorError::NotWant { token: addr(ASSET) })
        );
        assert_eq!(
            allocator.sweep(addr(GOV), &mut ledger, addr(VAULT)),
            Err(AllocatorError::NotShareToken { token: addr(VAULT) })
        );
        assert_eq!(
            allocator.sweep(addr(GOV), &mut ledger, addr(11)),
            Err(AllocatorError::ProtectedToken { token: addr(11) })
        );
        assert_eq!(allocator.sweep(addr(GOV), &mut ledger, addr(77)).unwrap(), U256::from(5));
        assert_eq!(ledger.token_balance(addr(77), addr(GOV)), U256::from(5));
    }

    #[test]
    fn test_migrate_moves_everything() {
        let (mut ledger, vault, allocator) = create_test_world();
        ledger.mint(addr(ASSET), addr(ME), U256::from(123));
        let new = allocator
            .clone_with_config(addr(31), allocator.config(), &vault, &ledger)
            .unwrap();
        let before = allocator.estimated_total_assets(&ledger).unwrap();

        allocator.migrate(addr(VAULT), &mut ledger, &new).unwrap();
        assert_eq!(allocator.estimated_total_assets(&ledger).unwrap(), U256::ZERO);
        assert_eq!(new.estimated_total_assets(&ledger).unwrap(), before);
    }

    #[test]
    fn test_migrate_rejects_different_registry() {
        let (mut ledger, vault, allocator) = create_test_world();
        let config = allocator.config().with_positions(vec![Position::new(addr(10), 5_000)]);
        let new = allocator.clone_with_config(addr(31), config, &vault, &ledger).unwrap();
        let result = allocator.migrate(addr(VAULT), &mut ledger, &new);
        assert!(matches!(result, Err(AllocatorError::MigrationMismatch { .. })));
        assert!(allocator.migrate(addr(GOV), &mut ledger, &new).is_err());
    }

    #[test]
    fn test_emergency_exit_revokes_in_vault() {
        let (_, mut vault, mut allocator) = create_test_world();
        vault.add_strategy(addr(GOV), addr(ME), 5_000).unwrap();
        allocator.set_emergency_exit(addr(STRATEGIST), &mut vault).unwrap();
        assert!(allocator.emergency_exit);
        assert_eq!(vault.debt_ratio, 0);
    }
}
