//! Elastic/base pairs.
//!
//! A [`Rebase`] tracks a total value (`elastic`) against the number of units
//! issued for it (`base`). Both the tracker's share ledger and the lending pools'
//! asset and borrow totals are expressed this way.
//!
//! # Zero policy
//!
//! An empty side never divides: converting against a pair whose denominator is
//! zero maps 1:1. This is the bootstrap rule for the first deposit into an empty
//! ledger. Valuation code that needs a different answer (a zero fraction is always
//! worth zero) checks before calling in.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::math::{mul_div, RoundingDirection};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebase {
    /// Total value represented
    pub elastic: U256,
    /// Total units issued against it
    pub base: U256,
}

impl Rebase {
    pub const ZERO: Rebase = Rebase {
        elastic: U256::ZERO,
        base: U256::ZERO,
    };

    pub fn new(elastic: U256, base: U256) -> Self {
        Self { elastic, base }
    }

    /// Converts an elastic amount into base units
    pub fn to_base(&self, elastic: U256, rounding: RoundingDirection) -> U256 {
        if self.elastic.is_zero() {
            return elastic;
        }
        mul_div(elastic, self.base, self.elastic, rounding)
    }

    /// Converts base units into an elastic amount
    pub fn to_elastic(&self, base: U256, rounding: RoundingDirection) -> U256 {
        if self.base.is_zero() {
            return base;
        }
        mul_div(base, self.elastic, self.base, rounding)
    }

    /// Returns the pair grown by the given amounts
    pub fn add(&self, elastic: U256, base: U256) -> Self {
        Self {
            elastic: self.elastic + elastic,
            base: self.base + base,
        }
    }

    /// Returns the pair shrunk by the given amounts, or `None` if either side would underflow
    pub fn sub(&self, elastic: U256, base: U256) -> Option<Self> {
        Some(Self {
            elastic: self.elastic.checked_sub(elastic)?,
            base: self.base.checked_sub(base)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_zero()
    }
}
