//! Scenario files and the in-memory world they describe.
//!
//! A scenario lists pools with third-party liquidity and borrowing, a user
//! deposit into a debt vault that lends to one allocator, and a script of
//! steps to run against that world. Every named actor gets a deterministic
//! address derived from its name.

use std::fs;
use std::path::Path;

use alloy_primitives::{keccak256, Address, U256};
use anyhow::{Context, Result};
use rebase_allocator::{
    Allocator, AllocatorConfig, DebtVault, InMemoryLedger, Ledger, PoolId, RoundingDirection, Vault,
    DEFAULT_MAX_LOSS_BPS, MAX_BPS,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::amount::parse_amount;

/// Clock value every scenario starts at
pub const START_TIMESTAMP: u64 = 1_700_000_000;

fn default_decimals() -> u8 {
    18
}

fn default_debt_ratio() -> u16 {
    MAX_BPS
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default = "default_decimals")]
    pub asset_decimals: u8,
    /// Amount the user deposits into the vault
    pub deposit: String,
    /// Yield the tracker earns on its own before the allocator starts
    #[serde(default)]
    pub tracker_gain: Option<String>,
    #[serde(default = "default_debt_ratio")]
    pub debt_ratio_bps: u16,
    pub pools: Vec<PoolSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSpec {
    pub name: String,
    pub weight_bps: u16,
    /// Lent by a third party when the pool is created
    pub liquidity: String,
    /// Borrowed by a third party right after the initial lending
    #[serde(default)]
    pub borrowed: Option<String>,
    /// WAD-scaled borrow interest per second
    #[serde(default)]
    pub interest_per_second: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Harvest,
    Tend,
    Advance {
        seconds: u64,
    },
    Borrow {
        pool: String,
        amount: String,
    },
    BorrowAll {
        pool: String,
    },
    RepayAll {
        pool: String,
    },
    AdjustWeights {
        weights: Vec<u16>,
    },
    Withdraw {
        amount: String,
        #[serde(default)]
        max_loss_bps: Option<u16>,
    },
    WithdrawAll {
        #[serde(default)]
        max_loss_bps: Option<u16>,
    },
    EmergencyExit,
    SkipHealthCheck,
    RemovePool {
        pool: String,
        #[serde(default)]
        force: bool,
    },
    Donate {
        amount: String,
    },
}

impl Step {
    pub fn label(&self) -> String {
        match self {
            Step::Harvest => "harvest".to_string(),
            Step::Tend => "tend".to_string(),
            Step::Advance { seconds } => format!("advance {}s", seconds),
            Step::Borrow { pool, amount } => format!("borrow {} from {}", amount, pool),
            Step::BorrowAll { pool } => format!("borrow all from {}", pool),
            Step::RepayAll { pool } => format!("repay all to {}", pool),
            Step::AdjustWeights { weights } => format!("adjust weights {:?}", weights),
            Step::Withdraw { amount, .. } => format!("withdraw {}", amount),
            Step::WithdrawAll { .. } => "withdraw all".to_string(),
            Step::EmergencyExit => "emergency exit".to_string(),
            Step::SkipHealthCheck => "skip health check".to_string(),
            Step::RemovePool { pool, force } => {
                if *force {
                    format!("force remove {}", pool)
                } else {
                    format!("remove {}", pool)
                }
            }
            Step::Donate { amount } => format!("donate {}", amount),
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid scenario file {}", path.display()))
    }
}

/// Deterministic address for a named actor or pool
pub fn name_address(name: &str) -> Address {
    Address::from_word(keccak256(name.as_bytes()))
}

/// Actor addresses shared by every scenario
pub mod actors {
    use alloy_primitives::Address;

    use super::name_address;

    pub fn asset() -> Address {
        name_address("asset")
    }

    pub fn tracker() -> Address {
        name_address("tracker")
    }

    pub fn vault() -> Address {
        name_address("vault")
    }

    pub fn governance() -> Address {
        name_address("governance")
    }

    pub fn keeper() -> Address {
        name_address("keeper")
    }

    pub fn allocator() -> Address {
        name_address("allocator")
    }

    pub fn user() -> Address {
        name_address("user")
    }

    pub fn lender() -> Address {
        name_address("lender")
    }

    pub fn borrower() -> Address {
        name_address("borrower")
    }
}

/// What one step did, in base units
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub index: usize,
    pub label: String,
    pub profit: U256,
    pub loss: U256,
    pub debt_payment: U256,
    /// Asset paid out: freed by a withdrawal or by a pool removal
    pub liquidated: U256,
    /// Allocator's estimated total assets after the step
    pub total_assets: U256,
}

#[derive(Debug, Clone)]
pub struct World {
    pub decimals: u8,
    pub ledger: InMemoryLedger,
    pub vault: DebtVault,
    pub allocator: Allocator,
    pools: Vec<(String, PoolId)>,
}

impl World {
    /// Builds the world a scenario starts from
    pub fn build(scenario: &Scenario) -> Result<Self> {
        let decimals = scenario.asset_decimals;
        let asset = actors::asset();
        let mut ledger = InMemoryLedger::new(actors::tracker(), START_TIMESTAMP);
        let mut pools = Vec::with_capacity(scenario.pools.len());

        for spec in &scenario.pools {
            let id = name_address(&spec.name);
            ledger.create_pool(id, asset, U256::from(spec.interest_per_second));
            let liquidity = parse_amount(&spec.liquidity, decimals)?;
            ledger.mint(asset, actors::lender(), liquidity);
            ledger
                .lend(id, actors::lender(), liquidity)
                .with_context(|| format!("Failed to seed pool {}", spec.name))?;
            pools.push((spec.name.clone(), id));
        }

        if let Some(gain) = &scenario.tracker_gain {
            ledger.tracker_gain(asset, parse_amount(gain, decimals)?);
        }

        for spec in &scenario.pools {
            if let Some(borrowed) = &spec.borrowed {
                let amount = parse_amount(borrowed, decimals)?;
                ledger
                    .borrow(name_address(&spec.name), actors::borrower(), amount)
                    .with_context(|| format!("Failed to borrow from pool {}", spec.name))?;
            }
        }

        let mut vault = DebtVault::new(actors::vault(), asset, decimals, actors::governance());
        let config = scenario.pools.iter().fold(
            AllocatorConfig::new(actors::vault(), asset, actors::tracker(), actors::governance())
                .with_keeper(actors::keeper()),
            |config, spec| config.with_position(name_address(&spec.name), spec.weight_bps),
        );
        let allocator =
            Allocator::new(actors::allocator(), config, &vault, &ledger).context("Failed to initialize allocator")?;
        vault.add_strategy(actors::governance(), allocator.address, scenario.debt_ratio_bps)?;

        let deposit = parse_amount(&scenario.deposit, decimals)?;
        ledger.mint(asset, actors::user(), deposit);
        vault.deposit(&mut ledger, actors::user(), deposit)?;

        info!(pools = pools.len(), %deposit, "scenario world built");
        Ok(Self {
            decimals,
            ledger,
            vault,
            allocator,
            pools,
        })
    }

    pub fn pool_id(&self, name: &str) -> Result<PoolId> {
        self.pools
            .iter()
            .find(|(pool_name, _)| pool_name == name)
            .map(|(_, id)| *id)
            .with_context(|| format!("Unknown pool: {}", name))
    }

    /// Name a pool was declared with, or its address for pools added later
    pub fn pool_name(&self, pool: PoolId) -> String {
        self.pools
            .iter()
            .find(|(_, id)| *id == pool)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| pool.to_string())
    }

    pub fn amount(&self, value: &str) -> Result<U256> {
        parse_amount(value, self.decimals)
    }

    pub fn total_assets(&self) -> Result<U256> {
        Ok(self.allocator.estimated_total_assets(&self.ledger)?)
    }

    /// Runs one step, returning what it did
    pub fn execute(&mut self, index: usize, step: &Step) -> Result<StepOutcome> {
        debug!(index, step = %step.label(), "executing step");
        let mut outcome = StepOutcome {
            index,
            label: step.label(),
            ..StepOutcome::default()
        };

        match step {
            Step::Harvest => {
                let report = self
                    .allocator
                    .harvest(actors::keeper(), &mut self.ledger, &mut self.vault)?;
                outcome.profit = report.profit;
                outcome.loss = report.loss;
                outcome.debt_payment = report.debt_payment;
            }
            Step::Tend => {
                self.allocator.tend(actors::keeper(), &mut self.ledger, &self.vault)?;
            }
            Step::Advance { seconds } => {
                self.ledger.advance_time(*seconds);
            }
            Step::Borrow { pool, amount } => {
                let pool = self.pool_id(pool)?;
                let amount = self.amount(amount)?;
                self.ledger.borrow(pool, actors::borrower(), amount)?;
            }
            Step::BorrowAll { pool } => {
                let pool = self.pool_id(pool)?;
                self.ledger.borrow_all(pool, actors::borrower())?;
            }
            Step::RepayAll { pool } => {
                let pool = self.pool_id(pool)?;
                self.repay_all(pool)?;
            }
            Step::AdjustWeights { weights } => {
                self.allocator.adjust_weights(actors::governance(), weights)?;
            }
            Step::Withdraw { amount, max_loss_bps } => {
                let amount = self.amount(amount)?;
                let total = self.vault.total_assets(&self.ledger);
                let shares = self
                    .vault
                    .to_shares(total, amount, RoundingDirection::Up)
                    .min(self.vault.balance_of(actors::user()));
                self.withdraw_shares(shares, *max_loss_bps, &mut outcome)?;
            }
            Step::WithdrawAll { max_loss_bps } => {
                let shares = self.vault.balance_of(actors::user());
                self.withdraw_shares(shares, *max_loss_bps, &mut outcome)?;
            }
            Step::EmergencyExit => {
                self.allocator
                    .set_emergency_exit(actors::governance(), &mut self.vault)?;
            }
            Step::SkipHealthCheck => {
                self.allocator
                    .set_do_health_check(actors::governance(), false)?;
            }
            Step::RemovePool { pool, force } => {
                let pool = self.pool_id(pool)?;
                let removal = self
                    .allocator
                    .remove_pool(actors::governance(), &mut self.ledger, pool, None, *force)?;
                outcome.liquidated = removal.withdrawn;
                outcome.loss = removal.forfeited;
            }
            Step::Donate { amount } => {
                let amount = self.amount(amount)?;
                self.ledger.mint(actors::asset(), self.allocator.address, amount);
            }
        }

        outcome.total_assets = self.total_assets()?;
        Ok(outcome)
    }

    fn withdraw_shares(&mut self, shares: U256, max_loss_bps: Option<u16>, outcome: &mut StepOutcome) -> Result<()> {
        let loss_before = self.strategy_loss();
        let allocator = self.allocator.clone();
        outcome.liquidated = self.vault.withdraw(
            &mut self.ledger,
            actors::user(),
            shares,
            max_loss_bps.unwrap_or(DEFAULT_MAX_LOSS_BPS),
            &[&allocator],
        )?;
        outcome.loss = self.strategy_loss().saturating_sub(loss_before);
        Ok(())
    }

    fn strategy_loss(&self) -> U256 {
        self.vault
            .strategy(self.allocator.address)
            .map(|params| params.total_loss)
            .unwrap_or_default()
    }

    /// Repays the borrower's whole debt to `pool`, topping the borrower up first
    fn repay_all(&mut self, pool: PoolId) -> Result<()> {
        let asset = actors::asset();
        let borrower = actors::borrower();
        self.ledger.accrue(pool)?;
        let state = self.ledger.pool(pool)?;
        let part = state.borrow_part_of(borrower);
        if part.is_zero() {
            return Ok(());
        }
        let owed = state.total_borrow.to_elastic(part, RoundingDirection::Up);

        // Covers rounding in the tracker conversion
        let top_up = owed * U256::from(2);
        self.ledger.mint(asset, borrower, top_up);
        self.ledger.tracker_deposit(asset, borrower, borrower, top_up)?;
        self.ledger.repay(pool, borrower, part)?;
        Ok(())
    }

    /// Debt the vault has lent to the allocator
    pub fn vault_debt(&self) -> U256 {
        self.vault.strategy_total_debt(self.allocator.address)
    }

    /// Asset the user has received back from the vault
    pub fn user_balance(&self) -> U256 {
        self.ledger.token_balance(actors::asset(), actors::user())
    }
}

/// Builds the world and runs up to `limit` steps
pub fn execute(scenario: &Scenario, limit: Option<usize>) -> Result<(World, Vec<StepOutcome>)> {
    let mut world = World::build(scenario)?;
    let steps = scenario.steps.iter().take(limit.unwrap_or(usize::MAX));
    let mut outcomes = Vec::new();
    for (index, step) in steps.enumerate() {
        let outcome = world
            .execute(index + 1, step)
            .with_context(|| format!("Step {} ({}) failed", index + 1, step.label()))?;
        outcomes.push(outcome);
    }
    Ok((world, outcomes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_scenario() -> Scenario {
        serde_json::from_str(
            r#"{
                "asset_decimals": 6,
                "deposit": "1000",
                "tracker_gain": "100",
                "pools": [
                    { "name": "alpha", "weight_bps": 5000, "liquidity": "500", "borrowed": "200" },
                    { "name": "beta", "weight_bps": 5000, "liquidity": "500" }
                ],
                "steps": [
                    { "action": "harvest" },
                    { "action": "advance", "seconds": 3600 },
                    { "action": "borrow_all", "pool": "alpha" },
                    { "action": "withdraw", "amount": "100" }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_scenario_deserialization() {
        let scenario = create_test_scenario();
        assert_eq!(scenario.asset_decimals, 6);
        assert_eq!(scenario.debt_ratio_bps, MAX_BPS);
        assert_eq!(scenario.pools.len(), 2);
        assert!(matches!(scenario.steps[1], Step::Advance { seconds: 3600 }));
        assert!(matches!(scenario.steps[3], Step::Withdraw { max_loss_bps: None, .. }));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: std::result::Result<Scenario, _> =
            serde_json::from_str(r#"{ "deposit": "1", "pools": [], "colour": "red" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_name_address_is_deterministic() {
        assert_eq!(name_address("alpha"), name_address("alpha"));
        assert_ne!(name_address("alpha"), name_address("beta"));
    }

    #[test]
    fn test_build_world() {
        let world = World::build(&create_test_scenario()).unwrap();
        assert!(world.vault.balance_of(actors::user()) > U256::ZERO);
        assert_eq!(world.total_assets().unwrap(), U256::ZERO);
        assert_eq!(world.pool_name(name_address("beta")), "beta");
        assert!(world.pool_id("gamma").is_err());
    }

    #[test]
    fn test_execute_steps() {
        let scenario = create_test_scenario();
        let (world, outcomes) = execute(&scenario, None).unwrap();
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].label, "harvest");
        assert!(outcomes[0].total_assets > U256::ZERO);
        // 100 units paid out of the pool that is still liquid
        let paid = outcomes[3].liquidated;
        assert!(paid >= U256::from(99_999_999u64) && paid <= U256::from(100_000_001u64));
        assert_eq!(outcomes[3].loss, U256::ZERO);
        assert!(world.vault_debt() < U256::from(1_000_000_000u64));
    }

    #[test]
    fn test_execute_respects_step_limit() {
        let scenario = create_test_scenario();
        let (_, outcomes) = execute(&scenario, Some(1)).unwrap();
        assert_eq!(outcomes.len(), 1);
    }
}
