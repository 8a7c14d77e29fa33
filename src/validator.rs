//! Validator record and the shares ↔ tokens conversion contract.
//!
//! A validator holds an integer token balance and issues rational shares to
//! its delegators. One share is worth `tokens / delegator_shares` tokens;
//! the very first deposit is priced 1:1. Share removal truncates toward zero,
//! so conversion can never mint tokens — any sub-token remainder stays with
//! the validator and slightly raises the worth of the remaining shares.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StakingError};
use crate::pool::Pool;
use crate::rational::Rat;
use crate::{Address, Amount, ConsensusKey};

/// Lifecycle state of a validator's stake.
///
/// Transitions are driven by the validator-set selector, not by this crate;
/// slashing is legal in all three states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorStatus {
    Bonded,
    Unbonding,
    Unbonded,
}

/// A consensus participant holding bonded stake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    /// Owner (operator) account address; the primary key.
    pub owner: Address,
    /// Consensus public key the evidence layer reports misbehavior under.
    pub consensus_key: ConsensusKey,
    /// Token balance backing the issued shares.
    pub tokens: Amount,
    /// Total shares issued to delegators.
    pub delegator_shares: Rat,
    /// Set by revocation; a jailed validator is excluded from the active set
    /// by the external selector but remains slashable.
    pub jailed: bool,
    pub status: ValidatorStatus,
}

impl Validator {
    pub fn new(owner: Address, consensus_key: ConsensusKey) -> Self {
        Self {
            owner,
            consensus_key,
            tokens: 0,
            delegator_shares: Rat::zero(),
            jailed: false,
            status: ValidatorStatus::Unbonded,
        }
    }

    /// Consensus power: the token balance while bonded, zero otherwise.
    pub fn power(&self) -> Rat {
        match self.status {
            ValidatorStatus::Bonded => Rat::from_int(self.tokens),
            _ => Rat::zero(),
        }
    }

    /// Token worth of `shares` at the current exchange rate.
    pub fn share_tokens(&self, shares: &Rat) -> Result<Rat> {
        let product = shares * &Rat::from_int(self.tokens);
        product.checked_div(&self.delegator_shares)
    }

    /// Adds delegated tokens, issuing shares at the current rate (1:1 on the
    /// first deposit). Bonded validators pull the tokens into the bonded
    /// bucket; otherwise they stay loose.
    pub fn add_tokens_from_del(&mut self, pool: &mut Pool, amount: Amount) -> Result<Rat> {
        let issued = if self.delegator_shares.is_zero() {
            Rat::from_int(amount)
        } else if self.tokens == 0 {
            // Shares exist but back nothing; a fresh deposit cannot be priced.
            return Err(StakingError::InvariantBroken(format!(
                "validator {} has {} shares against zero tokens",
                hex::encode(self.owner),
                self.delegator_shares
            )));
        } else {
            let wanted = &Rat::from_int(amount) * &self.delegator_shares;
            wanted.checked_div(&Rat::from_int(self.tokens))?
        };

        self.tokens = self
            .tokens
            .checked_add(amount)
            .ok_or(StakingError::Overflow {
                context: "validator tokens",
                value: amount,
            })?;
        self.delegator_shares = &self.delegator_shares + &issued;
        if self.status == ValidatorStatus::Bonded {
            pool.bond_tokens(amount)?;
        }
        Ok(issued)
    }

    /// Removes delegator shares, returning the token amount they were worth
    /// (truncated toward zero). Bonded validators push the tokens back to the
    /// loose bucket.
    pub fn remove_del_shares(&mut self, pool: &mut Pool, shares: &Rat) -> Result<Amount> {
        if shares.is_negative() || shares > &self.delegator_shares {
            return Err(StakingError::InsufficientShares {
                requested: shares.to_string(),
                held: self.delegator_shares.to_string(),
            });
        }
        let removed = if shares.is_zero() {
            0
        } else {
            self.share_tokens(shares)?.to_amount()?
        };
        self.tokens = self.tokens.checked_sub(removed).ok_or_else(|| {
            StakingError::InvariantBroken(format!(
                "share removal worth {removed} exceeds validator balance {}",
                self.tokens
            ))
        })?;
        self.delegator_shares = &self.delegator_shares - shares;
        if self.status == ValidatorStatus::Bonded {
            pool.unbond_tokens(removed)?;
        }
        Ok(removed)
    }

    /// Burns tokens straight off the validator's balance without touching
    /// shares — each remaining share is simply worth less afterwards. Used by
    /// the slashing residual.
    pub fn remove_tokens(&mut self, pool: &mut Pool, amount: Amount) -> Result<()> {
        self.tokens = self.tokens.checked_sub(amount).ok_or_else(|| {
            StakingError::InvariantBroken(format!(
                "removing {amount} tokens from validator holding {}",
                self.tokens
            ))
        })?;
        match self.status {
            ValidatorStatus::Bonded => pool.burn_bonded(amount)?,
            _ => pool.burn_loose(amount)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new([1; 20], [1; 32])
    }

    fn pool(loose: Amount) -> Pool {
        Pool {
            loose_tokens: loose,
            ..Pool::default()
        }
    }

    #[test]
    fn first_deposit_is_one_to_one() {
        let mut v = validator();
        let mut p = pool(100);
        let issued = v.add_tokens_from_del(&mut p, 10).unwrap();
        assert_eq!(issued, Rat::from_int(10));
        assert_eq!(v.tokens, 10);
        assert_eq!(v.delegator_shares, Rat::from_int(10));
        // Unbonded validator: tokens stay loose.
        assert_eq!(p.bonded_tokens, 0);
        assert_eq!(p.loose_tokens, 100);
    }

    #[test]
    fn bonded_deposit_moves_tokens_into_bonded_bucket() {
        let mut v = validator();
        let mut p = pool(100);
        v.status = ValidatorStatus::Bonded;
        v.add_tokens_from_del(&mut p, 10).unwrap();
        assert_eq!(p.bonded_tokens, 10);
        assert_eq!(p.loose_tokens, 90);
    }

    #[test]
    fn deposits_after_token_burn_get_more_shares() {
        let mut v = validator();
        let mut p = pool(100);
        v.add_tokens_from_del(&mut p, 10).unwrap();
        // Burn half the backing; a share is now worth half a token.
        v.remove_tokens(&mut p, 5).unwrap();
        let issued = v.add_tokens_from_del(&mut p, 5).unwrap();
        assert_eq!(issued, Rat::from_int(10));
        assert_eq!(v.delegator_shares, Rat::from_int(20));
        assert_eq!(v.tokens, 10);
    }

    #[test]
    fn share_removal_truncates_and_keeps_remainder() {
        let mut v = validator();
        let mut p = pool(100);
        v.add_tokens_from_del(&mut p, 10).unwrap();
        // Make the exchange rate 10/3 by removing shares out from under the
        // balance: 3 shares against 10 tokens.
        v.delegator_shares = Rat::from_int(3);
        let removed = v.remove_del_shares(&mut p, &Rat::from_int(1)).unwrap();
        // 1 share * 10/3 = 3.33.. tokens, truncated to 3; the remainder stays.
        assert_eq!(removed, 3);
        assert_eq!(v.tokens, 7);
        assert_eq!(v.delegator_shares, Rat::from_int(2));
    }

    #[test]
    fn removing_more_shares_than_held_is_an_error() {
        let mut v = validator();
        let mut p = pool(100);
        v.add_tokens_from_del(&mut p, 10).unwrap();
        let err = v.remove_del_shares(&mut p, &Rat::from_int(11));
        assert!(matches!(err, Err(StakingError::InsufficientShares { .. })));
    }

    #[test]
    fn power_follows_status() {
        let mut v = validator();
        v.tokens = 10;
        assert_eq!(v.power(), Rat::zero());
        v.status = ValidatorStatus::Bonded;
        assert_eq!(v.power(), Rat::from_int(10));
        v.status = ValidatorStatus::Unbonding;
        assert_eq!(v.power(), Rat::zero());
    }

    #[test]
    fn remove_tokens_burns_from_the_matching_bucket() {
        let mut v = validator();
        let mut p = pool(100);
        v.status = ValidatorStatus::Bonded;
        v.add_tokens_from_del(&mut p, 10).unwrap();
        v.remove_tokens(&mut p, 4).unwrap();
        assert_eq!(v.tokens, 6);
        assert_eq!(p.bonded_tokens, 6);

        let mut u = validator();
        let mut q = pool(100);
        u.add_tokens_from_del(&mut q, 10).unwrap();
        u.remove_tokens(&mut q, 4).unwrap();
        assert_eq!(q.loose_tokens, 96);
    }
}
