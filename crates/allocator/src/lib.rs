//! Rebase Allocator
//!
//! A capital allocator that takes a vault's asset and lends it across a set of
//! rebasing lending pools according to target weights.
//!
//! # Overview
//!
//! The allocator:
//! - Values its credit in each pool from live pool and tracker totals
//! - Harvests profit or loss and settles it with the vault
//! - Rebalances toward target weights, earlier pools first
//! - Serves withdrawals best-effort, reporting unredeemable credit as loss
//! - Adds, removes, replaces and migrates positions without breaking its books
//!
//! Pools, the rebasing tracker and token balances are reached through the
//! [`Ledger`] trait; the upstream vault through [`Vault`]. In-memory
//! implementations of both ([`InMemoryLedger`], [`DebtVault`]) are included.
//!
//! # Example
//!
//! ```rust,ignore
//! use rebase_allocator::{Allocator, AllocatorConfig, DebtVault, InMemoryLedger};
//!
//! let config = AllocatorConfig::new(vault_addr, asset, tracker, governance)
//!     .with_position(pool_a, 5_000)
//!     .with_position(pool_b, 5_000);
//! let mut allocator = Allocator::new(allocator_addr, config, &vault, &ledger)?;
//!
//! let report = allocator.harvest(governance, &mut ledger, &mut vault)?;
//! println!("profit {} loss {}", report.profit, report.loss);
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod health;
pub mod ledger;
pub mod lifecycle;
pub mod math;
pub mod pool;
pub mod rebalance;
pub mod rebase;
pub mod registry;
pub mod tracker;
pub mod valuation;
pub mod vault;
pub mod withdraw;

// Re-export commonly used types
pub use error::{AllocatorError, PoolId, Result};

// Allocator exports
pub use allocator::{Allocator, PositionReport};
pub use config::{AllocatorConfig, Roles};
pub use health::HealthCheck;
pub use lifecycle::PoolRemoval;
pub use rebalance::{HarvestReport, Rebalance};
pub use registry::{PoolRegistry, Position};
pub use withdraw::{WithdrawOutcome, WITHDRAW_ALL};

// Valuation exports
pub use valuation::{fraction_for_amount, max_redeemable_fraction, position_value, PoolSnapshot};

// Collaborator exports
pub use ledger::{atomically, InMemoryLedger, Ledger, PoolInfo};
pub use pool::{pool_share_total, LendingPool};
pub use rebase::Rebase;
pub use tracker::RebasingTracker;
pub use vault::{DebtVault, StrategyParams, Vault, DEFAULT_MAX_LOSS_BPS};

// Math exports
pub use math::{RoundingDirection, MAX_BPS, WAD};
