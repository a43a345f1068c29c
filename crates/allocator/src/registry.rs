//! Ordered pool registry with target weights.
//!
//! Order is part of the contract: distribution tops up positions first to
//! last and withdrawal drains them first to last, so an earlier position wins
//! whenever capital or liquidity runs short. The weight left over after all
//! positions (`MAX_BPS - total`) stays idle.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{AllocatorError, PoolId, Result};
use crate::math::{bps_of, MAX_BPS};

/// One configured lending pool and its target share of assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub pool: PoolId,
    pub weight_bps: u16,
}

impl Position {
    pub fn new(pool: PoolId, weight_bps: u16) -> Self {
        Self { pool, weight_bps }
    }

    /// Target amount of `basis` this position should hold
    pub fn target(&self, basis: U256) -> U256 {
        bps_of(basis, self.weight_bps)
    }
}

/// Persisted as a plain list of positions, validated on the way in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Position>", into = "Vec<Position>")]
pub struct PoolRegistry {
    positions: Vec<Position>,
}

impl TryFrom<Vec<Position>> for PoolRegistry {
    type Error = AllocatorError;

    fn try_from(positions: Vec<Position>) -> Result<Self> {
        Self::from_positions(&positions)
    }
}

impl From<PoolRegistry> for Vec<Position> {
    fn from(registry: PoolRegistry) -> Self {
        registry.positions
    }
}

fn sum_bps(weights: impl IntoIterator<Item = u16>) -> u32 {
    weights.into_iter().map(u32::from).sum()
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from positions, enforcing every registry invariant
    pub fn from_positions(positions: &[Position]) -> Result<Self> {
        let mut registry = Self::new();
        for position in positions {
            registry.push(*position)?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn pools(&self) -> Vec<PoolId> {
        self.positions.iter().map(|p| p.pool).collect()
    }

    pub fn contains(&self, pool: PoolId) -> bool {
        self.index_of(pool).is_some()
    }

    pub fn index_of(&self, pool: PoolId) -> Option<usize> {
        self.positions.iter().position(|p| p.pool == pool)
    }

    pub fn get(&self, pool: PoolId) -> Option<&Position> {
        self.positions.iter().find(|p| p.pool == pool)
    }

    pub fn total_weight(&self) -> u32 {
        sum_bps(self.positions.iter().map(|p| p.weight_bps))
    }

    /// Weight not assigned to any position
    pub fn idle_weight(&self) -> u32 {
        u32::from(MAX_BPS).saturating_sub(self.total_weight())
    }

    /// Appends a position at the end of the order
    pub fn push(&mut self, position: Position) -> Result<()> {
        if self.contains(position.pool) {
            return Err(AllocatorError::DuplicatePool {
                pool: position.pool,
            });
        }
        let total_bps = self.total_weight() + u32::from(position.weight_bps);
        if total_bps > u32::from(MAX_BPS) {
            return Err(AllocatorError::InvalidWeights {
                count: self.len() + 1,
                expected: self.len() + 1,
                total_bps,
            });
        }
        self.positions.push(position);
        Ok(())
    }

    /// Removes a position, keeping the relative order of the rest
    pub fn remove(&mut self, pool: PoolId) -> Result<Position> {
        let index = self
            .index_of(pool)
            .ok_or(AllocatorError::UnknownPool { pool })?;
        Ok(self.positions.remove(index))
    }

    /// Swaps the pool at `index` for `pool`, keeping the weight
    pub fn replace_at(&mut self, index: usize, pool: PoolId) -> Result<Position> {
        if self.contains(pool) {
            return Err(AllocatorError::DuplicatePool { pool });
        }
        let slot = self
            .positions
            .get_mut(index)
            .ok_or(AllocatorError::UnknownPool { pool })?;
        let old = *slot;
        slot.pool = pool;
        Ok(old)
    }

    /// Replaces every weight at once; nothing changes if the vector is rejected
    pub fn set_weights(&mut self, weights: &[u16]) -> Result<()> {
        let total_bps = sum_bps(weights.iter().copied());
        if weights.len() != self.len() || total_bps > u32::from(MAX_BPS) {
            return Err(AllocatorError::InvalidWeights {
                count: weights.len(),
                expected: self.len(),
                total_bps,
            });
        }
        for (position, weight) in self.positions.iter_mut().zip(weights) {
            position.weight_bps = *weight;
        }
        Ok(())
    }

    pub fn weights(&self) -> Vec<u16> {
        self.positions.iter().map(|p| p.weight_bps).collect()
    }
}

impl<'a> IntoIterator for &'a PoolRegistry {
    type Item = &'a Position;
    type IntoIter = std::slice::Iter<'a, Position>;

    fn into_iter(self) -> Self::IntoIter {
        self.positions.iter()
    }
}
