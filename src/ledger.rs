use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SpellError;

pub const ORB_MANA_COST: u32 = 10;
pub const ELEMENT_COST: u32 = 5;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Mana,
    Fire,
    Water,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Mana => "mana",
            ResourceKind::Fire => "fire",
            ResourceKind::Water => "water",
        })
    }
}

/// Player reserves. Balances only ever go down, and never below zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub struct ResourceLedger {
    mana: u32,
    fire: u32,
    water: u32,
}

impl ResourceLedger {
    pub fn new(mana: u32, fire: u32, water: u32) -> Self {
        Self { mana, fire, water }
    }

    pub fn mana(&self) -> u32 {
        self.mana
    }

    pub fn fire(&self) -> u32 {
        self.fire
    }

    pub fn water(&self) -> u32 {
        self.water
    }

    /// Rejects (never clamps) a spend larger than the current balance.
    pub fn spend(&mut self, kind: ResourceKind, amount: u32) -> Result<(), SpellError> {
        let slot = match kind {
            ResourceKind::Mana => &mut self.mana,
            ResourceKind::Fire => &mut self.fire,
            ResourceKind::Water => &mut self.water,
        };
        if *slot < amount {
            return Err(SpellError::InsufficientResource {
                resource: kind,
                required: amount,
                available: *slot,
            });
        }
        *slot -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overspend_fails_and_leaves_balance() {
        let mut ledger = ResourceLedger::new(5, 0, 0);
        let err = ledger.spend(ResourceKind::Mana, 10).unwrap_err();
        assert!(matches!(
            err,
            SpellError::InsufficientResource {
                resource: ResourceKind::Mana,
                required: 10,
                available: 5,
            }
        ));
        assert_eq!(ledger.mana(), 5);
    }

    #[test]
    fn spend_to_exactly_zero_is_allowed() {
        let mut ledger = ResourceLedger::new(10, 5, 5);
        ledger.spend(ResourceKind::Mana, 10).expect("spend mana");
        ledger.spend(ResourceKind::Fire, 5).expect("spend fire");
        assert_eq!(ledger, ResourceLedger::new(0, 0, 5));
        assert!(ledger.spend(ResourceKind::Fire, 1).is_err());
    }

    #[test]
    fn every_amount_above_balance_is_rejected() {
        let mut ledger = ResourceLedger::new(3, 3, 3);
        for amount in 4..40 {
            for kind in [ResourceKind::Mana, ResourceKind::Fire, ResourceKind::Water] {
                assert!(ledger.spend(kind, amount).is_err());
                assert_eq!(ledger, ResourceLedger::new(3, 3, 3));
            }
        }
    }
}
