//! Error types for the allocator and its collaborator models.

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Identity of a lending pool (the address of its fraction token)
pub type PoolId = Address;

/// Errors that can occur while operating the allocator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocatorError {
    /// Pool is already part of the registry
    #[error("Pool {pool} is already registered")]
    DuplicatePool { pool: PoolId },

    /// Pool does not belong to the allocator's asset or tracker
    #[error("Pool {pool} is invalid: {reason}")]
    InvalidPool { pool: PoolId, reason: &'static str },

    /// Pool is not part of the registry
    #[error("Pool {pool} is not registered")]
    UnknownPool { pool: PoolId },

    /// Weight vector does not fit the registry
    #[error("Invalid weights: {count} entries for {expected} pools summing to {total_bps} bps (max 10000)")]
    InvalidWeights {
        count: usize,
        expected: usize,
        total_bps: u32,
    },

    /// Initialization was attempted twice
    #[error("Allocator {allocator} is already initialized")]
    AlreadyInitialized { allocator: Address },

    /// Position still holds credit that cannot be redeemed
    #[error("Pool {pool} still holds {value} assets of credit")]
    OutstandingBalance { pool: PoolId, value: U256 },

    /// Migration target does not mirror the source configuration
    #[error("Migration to {target} rejected: {reason}")]
    MigrationMismatch {
        target: Address,
        reason: &'static str,
    },

    /// Call came from a vault other than the configured one
    #[error("Vault mismatch: expected {expected}, found {found}")]
    VaultMismatch { expected: Address, found: Address },

    /// Sweep of the managed asset
    #[error("Token {token} is the managed asset and cannot be swept")]
    NotWant { token: Address },

    /// Sweep of the vault share token
    #[error("Token {token} is the vault share token and cannot be swept")]
    NotShareToken { token: Address },

    /// Sweep of a pool fraction token
    #[error("Token {token} is a protected pool token and cannot be swept")]
    ProtectedToken { token: Address },

    /// Caller lacks the role required for the action
    #[error("Caller {caller} is not allowed to {action}")]
    PermissionDenied {
        caller: Address,
        action: &'static str,
    },

    /// Internal accounting broke an invariant
    #[error("Accounting invariant violated in pool {pool}: {reason}")]
    AccountingInvariant { pool: PoolId, reason: &'static str },

    /// Holder does not own enough of a token or tracker share
    #[error("Insufficient balance of {token} for {holder}: requested {requested}, available {available}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        requested: U256,
        available: U256,
    },

    /// Pool does not hold enough un-lent shares
    #[error("Insufficient liquidity in pool {pool}: requested {requested} shares, available {available}")]
    InsufficientPoolLiquidity {
        pool: PoolId,
        requested: U256,
        available: U256,
    },

    /// Holder does not own enough fraction in a pool
    #[error("Insufficient fraction for {holder} in pool {pool}")]
    InsufficientFraction { pool: PoolId, holder: Address },

    /// Strategy is not registered in the vault
    #[error("Strategy {strategy} is not registered in vault {vault}")]
    UnknownStrategy { vault: Address, strategy: Address },

    /// Strategy is already registered in the vault
    #[error("Strategy {strategy} is already registered in vault {vault}")]
    StrategyExists { vault: Address, strategy: Address },

    /// Interest accrual was attempted with a timestamp before the last update
    #[error("Invalid interest accrual: timestamp {timestamp} is before last update {last_update}")]
    InvalidInterestAccrual { timestamp: u64, last_update: u64 },

    /// Harvest result fell outside the configured limits
    #[error("Health check failed: profit {profit}, loss {loss}")]
    HealthCheckFailed { profit: U256, loss: U256 },

    /// Vault withdrawal realized more loss than the holder accepts
    #[error("Withdrawal loss {loss} exceeds limit {limit}")]
    MaxLossExceeded { loss: U256, limit: U256 },

    /// Sum of strategy debt ratios would exceed 100%
    #[error("Debt ratio {total_bps} bps exceeds 10000")]
    DebtRatioExceeded { total_bps: u32 },
}

/// Result type alias for allocator operations.
pub type Result<T> = std::result::Result<T, AllocatorError>;
