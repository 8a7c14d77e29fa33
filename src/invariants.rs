//! Whole-state accounting checks.
//!
//! These walk the entire store, so they are meant for tests and for the
//! host's occasional self-audit, not for the per-message hot path. The token
//! supply is `loose + bonded`: unbonding balances live inside the loose
//! bucket and redelegation balances are bookkeeping over stake bonded at the
//! destination, so neither is added on top.

use crate::error::{Result, StakingError};
use crate::rational::Rat;
use crate::store::StakingStore;
use crate::Amount;

/// Total tokens known to the pool. A slash reduces this by exactly the
/// amount it reports burned; nothing else changes it.
pub fn total_tokens<S: StakingStore>(store: &S) -> Result<Amount> {
    store.pool()?.total_tokens()
}

/// Every validator's share ledger equals the sum over its delegations.
pub fn check_shares_integrity<S: StakingStore>(store: &S) -> Result<()> {
    for validator in store.validators()? {
        let mut sum = Rat::zero();
        for delegation in store.delegations_to(&validator.owner)? {
            sum = &sum + &delegation.shares;
        }
        if sum != validator.delegator_shares {
            return Err(StakingError::InvariantBroken(format!(
                "validator {} issued {} shares but delegations sum to {}",
                hex::encode(validator.owner),
                validator.delegator_shares,
                sum
            )));
        }
    }
    Ok(())
}

/// No record's balance exceeds its initial balance, and the unbonding
/// balances are covered by the loose bucket they sit in.
pub fn check_record_balances<S: StakingStore>(store: &S) -> Result<()> {
    let pool = store.pool()?;
    let mut unbonding_total: Amount = 0;
    for validator in store.validators()? {
        for ubd in store.unbonding_delegations_from(&validator.owner)? {
            if ubd.balance.amount > ubd.initial_balance.amount {
                return Err(StakingError::InvariantBroken(format!(
                    "unbonding delegation balance {} exceeds initial {}",
                    ubd.balance, ubd.initial_balance
                )));
            }
            unbonding_total = unbonding_total
                .checked_add(ubd.balance.amount)
                .ok_or(StakingError::Overflow {
                    context: "unbonding balance total",
                    value: ubd.balance.amount,
                })?;
        }
        for red in store.redelegations_from_src(&validator.owner)? {
            if red.balance.amount > red.initial_balance.amount {
                return Err(StakingError::InvariantBroken(format!(
                    "redelegation balance {} exceeds initial {}",
                    red.balance, red.initial_balance
                )));
            }
        }
    }
    if unbonding_total > pool.loose_tokens {
        return Err(StakingError::InvariantBroken(format!(
            "unbonding balances total {unbonding_total} exceed loose tokens {}",
            pool.loose_tokens
        )));
    }
    Ok(())
}

/// All of the above.
pub fn check_all<S: StakingStore>(store: &S) -> Result<()> {
    check_shares_integrity(store)?;
    check_record_balances(store)
}
