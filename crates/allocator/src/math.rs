//! Fixed-point integer helpers.
//!
//! Every conversion in the allocator is integer math on [`U256`] with an explicit
//! [`RoundingDirection`]. Inputs are bounded by token supplies (well below 2^128),
//! so intermediate products fit in 256 bits.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// 1e18, the scale of WAD fixed-point numbers
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Basis points in 100%
pub const MAX_BPS: u16 = 10_000;

/// Rounding direction for integer division
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundingDirection {
    /// Truncate toward zero
    #[default]
    Down,
    /// Round away from zero
    Up,
}

/// Computes `x * y / d` with the given rounding.
///
/// Returns zero when `d` is zero; callers that can see a zero denominator
/// handle that case before dividing.
pub fn mul_div(x: U256, y: U256, d: U256, rounding: RoundingDirection) -> U256 {
    if d.is_zero() {
        return U256::ZERO;
    }
    let product = x.saturating_mul(y);
    let quotient = product / d;
    match rounding {
        RoundingDirection::Up if !(product % d).is_zero() => quotient + U256::from(1),
        _ => quotient,
    }
}

/// `x * y / d` rounded down
pub fn mul_div_down(x: U256, y: U256, d: U256) -> U256 {
    mul_div(x, y, d, RoundingDirection::Down)
}

/// `x * y / d` rounded up
pub fn mul_div_up(x: U256, y: U256, d: U256) -> U256 {
    mul_div(x, y, d, RoundingDirection::Up)
}

/// WAD multiplication rounded down
pub fn w_mul_down(x: U256, y: U256) -> U256 {
    mul_div_down(x, y, WAD)
}

/// Share of `amount` given by `bps` basis points, rounded down
pub fn bps_of(amount: U256, bps: u16) -> U256 {
    mul_div_down(amount, U256::from(bps), U256::from(MAX_BPS))
}

/// `x - y`, or zero if `y > x`
pub fn zero_floor_sub(x: U256, y: U256) -> U256 {
    x.saturating_sub(y)
}

pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}

/// Absolute difference between two amounts
pub fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding() {
        let x = U256::from(10);
        let y = U256::from(10);
        let d = U256::from(3);
        assert_eq!(mul_div(x, y, d, RoundingDirection::Down), U256::from(33));
        assert_eq!(mul_div(x, y, d, RoundingDirection::Up), U256::from(34));
    }

    #[test]
    fn test_mul_div_exact_does_not_round_up() {
        let r = mul_div_up(U256::from(6), U256::from(4), U256::from(8));
        assert_eq!(r, U256::from(3));
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(mul_div_down(U256::from(5), U256::from(5), U256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_bps_of() {
        assert_eq!(bps_of(U256::from(100_000), 2_500), U256::from(25_000));
        assert_eq!(bps_of(U256::from(3), 3_333), U256::ZERO);
        assert_eq!(bps_of(U256::from(7), MAX_BPS), U256::from(7));
    }

    #[test]
    fn test_w_mul_down() {
        let half = WAD / U256::from(2);
        assert_eq!(w_mul_down(U256::from(1_000), half), U256::from(500));
    }

    #[test]
    fn test_min_sub_diff() {
        let a = U256::from(3);
        let b = U256::from(9);
        assert_eq!(min(a, b), a);
        assert_eq!(zero_floor_sub(a, b), U256::ZERO);
        assert_eq!(zero_floor_sub(b, a), U256::from(6));
        assert_eq!(abs_diff(a, b), U256::from(6));
    }
}
