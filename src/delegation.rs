//! Delegation-side records: live bonds, unbonding delegations, redelegations.
//!
//! Unbonding delegations and redelegations are the records the slashing
//! engine reaches back into: each remembers the height it was created at and
//! the time its cool-down elapses, plus the balance it started with. Slashes
//! are computed against `initial_balance` (so repeated slashes for one
//! infraction never compound) and capped by `balance` (so a record burns at
//! most to exhaustion). `balance <= initial_balance` holds for their entire
//! lifetime; `initial_balance` never changes after creation.

use serde::{Deserialize, Serialize};

use crate::coin::Coin;
use crate::error::Result;
use crate::rational::Rat;
use crate::{Address, Amount};

/// A delegator's live share holding on one validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: Address,
    pub shares: Rat,
    /// Height the bond was last changed at.
    pub height: u64,
}

/// Stake on its way out of a validator, waiting for the cool-down to elapse.
///
/// Mutated only by slashing; consumed by the external sweeper at `min_time`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: Address,
    pub validator: Address,
    /// Height at which the unbonding began.
    pub creation_height: u64,
    /// Unix time at which the balance becomes spendable.
    pub min_time: i64,
    /// Balance the unbonding started with. Fixed at creation.
    pub initial_balance: Coin,
    /// Balance still due at completion; reduced by slashes.
    pub balance: Coin,
}

impl UnbondingDelegation {
    /// Burns part of the pending balance. `balance <= initial_balance` is
    /// preserved because the balance only ever decreases.
    pub fn reduce_balance(&mut self, amount: Amount) -> Result<()> {
        self.balance.deduct(amount)
    }
}

/// Stake moving atomically from one validator to another.
///
/// While the destination shares persist, a sibling
/// `Delegation(delegator, validator_dst)` exists alongside this record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Redelegation {
    pub delegator: Address,
    pub validator_src: Address,
    pub validator_dst: Address,
    pub creation_height: u64,
    pub min_time: i64,
    pub initial_balance: Coin,
    pub balance: Coin,
    /// Shares removed from the source when the redelegation began.
    pub shares_src: Rat,
    /// Shares issued at the destination.
    pub shares_dst: Rat,
}

impl Redelegation {
    /// Burns part of the still-slashable balance.
    pub fn reduce_balance(&mut self, amount: Amount) -> Result<()> {
        self.balance.deduct(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_reduction_preserves_bounds() {
        let mut ubd = UnbondingDelegation {
            delegator: [9; 20],
            validator: [1; 20],
            creation_height: 0,
            min_time: 0,
            initial_balance: Coin::new("steak", 10),
            balance: Coin::new("steak", 10),
        };
        ubd.reduce_balance(4).unwrap();
        assert_eq!(ubd.balance.amount, 6);
        assert_eq!(ubd.initial_balance.amount, 10);
        assert!(ubd.reduce_balance(7).is_err());
        assert_eq!(ubd.balance.amount, 6);
    }
}
