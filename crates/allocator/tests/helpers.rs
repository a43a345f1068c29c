//! Test world for allocator integration tests.
//!
//! Four pools lend the same asset through one tracker. A third-party lender
//! has supplied each pool, a borrower has drawn from each, and the tracker has
//! earned on its own so that one share is worth more than one unit of asset.
//! A debt vault holds a user deposit and lends all of it to the allocator.

use alloy_primitives::{Address, U256};
use rebase_allocator::math::abs_diff;
use rebase_allocator::{
    Allocator, AllocatorConfig, DebtVault, HarvestReport, InMemoryLedger, Ledger, PoolId, Vault,
};

pub const ASSET_DECIMALS: u8 = 6;
pub const START: u64 = 1_700_000_000;
pub const DAY: u64 = 86_400;
/// ~3.15% per year
pub const INTEREST_PER_SECOND: u64 = 1_000_000_000;

pub fn addr(b: u8) -> Address {
    Address::from([b; 20])
}

pub fn asset() -> Address {
    addr(1)
}

pub fn tracker() -> Address {
    addr(2)
}

pub fn vault_addr() -> Address {
    addr(20)
}

pub fn governance() -> Address {
    addr(21)
}

pub fn keeper() -> Address {
    addr(22)
}

pub fn allocator_addr() -> Address {
    addr(30)
}

pub fn user() -> Address {
    addr(40)
}

pub fn lender() -> Address {
    addr(41)
}

pub fn borrower() -> Address {
    addr(50)
}

pub fn pools() -> [PoolId; 4] {
    [addr(10), addr(11), addr(12), addr(13)]
}

/// Whole asset units in base units
pub fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(ASSET_DECIMALS))
}

pub fn assert_close(actual: U256, expected: U256, tolerance: U256) {
    let diff = abs_diff(actual, expected);
    assert!(
        diff <= tolerance,
        "expected {} within {} of {}, diff {}",
        actual,
        tolerance,
        expected,
        diff
    );
}

#[derive(Debug, Clone)]
pub struct World {
    pub ledger: InMemoryLedger,
    pub vault: DebtVault,
    pub allocator: Allocator,
}

impl World {
    /// World with equal weights and 100,000 units deposited but not yet harvested
    pub fn new() -> Self {
        Self::with_weights([2_500, 2_500, 2_500, 2_500])
    }

    pub fn with_weights(weights: [u16; 4]) -> Self {
        let mut ledger = InMemoryLedger::new(tracker(), START);
        for pool in pools() {
            ledger.create_pool(pool, asset(), U256::from(INTEREST_PER_SECOND));
        }

        ledger.mint(asset(), lender(), units(200_000));
        for pool in pools() {
            ledger.lend(pool, lender(), units(50_000)).unwrap();
        }
        // One share is now worth 1.1 units
        ledger.tracker_gain(asset(), units(20_000));
        for pool in pools() {
            ledger.borrow(pool, borrower(), units(20_000)).unwrap();
        }

        let mut vault = DebtVault::new(vault_addr(), asset(), ASSET_DECIMALS, governance());
        let mut config = AllocatorConfig::new(vault_addr(), asset(), tracker(), governance())
            .with_keeper(keeper());
        for (pool, weight) in pools().into_iter().zip(weights) {
            config = config.with_position(pool, weight);
        }
        let allocator = Allocator::new(allocator_addr(), config, &vault, &ledger).unwrap();
        vault
            .add_strategy(governance(), allocator_addr(), 10_000)
            .unwrap();

        ledger.mint(asset(), user(), units(100_000));
        vault.deposit(&mut ledger, user(), units(100_000)).unwrap();

        Self {
            ledger,
            vault,
            allocator,
        }
    }

    /// World after the first harvest has deployed the deposit
    pub fn deployed() -> Self {
        let mut world = Self::new();
        world.harvest();
        world
    }

    pub fn harvest(&mut self) -> HarvestReport {
        self.allocator
            .harvest(keeper(), &mut self.ledger, &mut self.vault)
            .unwrap()
    }

    pub fn total(&self) -> U256 {
        self.allocator.estimated_total_assets(&self.ledger).unwrap()
    }

    pub fn value(&self, pool: PoolId) -> U256 {
        self.allocator.position_value(&self.ledger, pool).unwrap()
    }

    pub fn debt(&self) -> U256 {
        self.vault.strategy_total_debt(allocator_addr())
    }

    /// Lets a third party borrow every unit a pool has left
    pub fn drain(&mut self, pool: PoolId) {
        self.ledger.borrow_all(pool, borrower()).unwrap();
    }

    pub fn free_liquidity(&self, pool: PoolId) -> U256 {
        self.ledger.free_liquidity(pool).unwrap()
    }

    pub fn idle(&self) -> U256 {
        self.ledger.token_balance(asset(), allocator_addr())
    }
}
