//! Allocator configuration record.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::PoolId;
use crate::health::HealthCheck;
use crate::registry::Position;

/// Addresses allowed to operate an allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    /// Pool set changes, sweeping, role changes
    pub governance: Address,
    /// Weights, health check, emergency exit
    pub strategist: Address,
    /// Harvest and tend
    pub keeper: Address,
}

impl Roles {
    /// Every role held by one address
    pub fn single(owner: Address) -> Self {
        Self {
            governance: owner,
            strategist: owner,
            keeper: owner,
        }
    }
}

/// Everything an allocator is initialized from.
///
/// This is the only state an allocator owns outright; balances are always read
/// from the collaborators. Two allocators built from equal configs are
/// interchangeable migration partners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    pub vault: Address,
    pub asset: Address,
    pub tracker: Address,
    pub roles: Roles,
    /// Pools in allocation priority order
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
}

impl AllocatorConfig {
    /// Create a configuration where `governance` holds every role
    pub fn new(vault: Address, asset: Address, tracker: Address, governance: Address) -> Self {
        Self {
            vault,
            asset,
            tracker,
            roles: Roles::single(governance),
            positions: Vec::new(),
            health_check: None,
        }
    }

    pub fn with_strategist(mut self, strategist: Address) -> Self {
        self.roles.strategist = strategist;
        self
    }

    pub fn with_keeper(mut self, keeper: Address) -> Self {
        self.roles.keeper = keeper;
        self
    }

    /// Append a pool at the end of the priority order
    pub fn with_position(mut self, pool: PoolId, weight_bps: u16) -> Self {
        self.positions.push(Position::new(pool, weight_bps));
        self
    }

    pub fn with_positions(mut self, positions: Vec<Position>) -> Self {
        self.positions = positions;
        self
    }

    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = Some(health_check);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    #[test]
    fn test_builder() {
        let config = AllocatorConfig::new(addr(1), addr(2), addr(3), addr(4))
            .with_keeper(addr(5))
            .with_position(addr(10), 6_000)
            .with_position(addr(11), 4_000);

        assert_eq!(config.roles.governance, addr(4));
        assert_eq!(config.roles.strategist, addr(4));
        assert_eq!(config.roles.keeper, addr(5));
        assert_eq!(config.positions.len(), 2);
        assert_eq!(config.positions[1], Position::new(addr(11), 4_000));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = format!(
            r#"{{"vault":"{}","asset":"{}","tracker":"{}","roles":{{"governance":"{}","strategist":"{}","keeper":"{}"}}}}"#,
            addr(1),
            addr(2),
            addr(3),
            addr(4),
            addr(4),
            addr(4)
        );
        let config: AllocatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, AllocatorConfig::new(addr(1), addr(2), addr(3), addr(4)));
    }
}
