//! Global token pool.
//!
//! The pool is the single cross-validator mutable object: it tracks how many
//! tokens are bonded to validators and how many are loose (unbonded supply,
//! including balances waiting out an unbonding period). Tokens move between
//! the two buckets as validators bond and unbond; the only way tokens leave
//! the system is through the two `burn_*` methods. Every mutation is checked —
//! an underflow means the caller's accounting is wrong and the transaction
//! must abort.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StakingError};
use crate::rational::Rat;
use crate::Amount;

/// Global accounting of bonded and loose tokens.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    /// Tokens bonded to validators. Equals the token sum over bonded validators.
    pub bonded_tokens: Amount,
    /// Share-denominated view of the bonded bucket, moved in lockstep with it.
    pub bonded_shares: Rat,
    /// Unbonded supply, including unbonding-delegation balances.
    pub loose_tokens: Amount,
}

impl Pool {
    /// Total tokens known to the pool.
    pub fn total_tokens(&self) -> Result<Amount> {
        self.loose_tokens
            .checked_add(self.bonded_tokens)
            .ok_or(StakingError::Overflow {
                context: "pool total",
                value: self.bonded_tokens,
            })
    }

    /// Moves tokens loose → bonded (a validator bonding stake).
    pub fn bond_tokens(&mut self, amount: Amount) -> Result<()> {
        self.loose_tokens = sub(self.loose_tokens, amount, "bonding more than loose supply")?;
        self.bonded_tokens = add(self.bonded_tokens, amount, "bonded tokens")?;
        self.bonded_shares = &self.bonded_shares + &Rat::from_int(amount);
        Ok(())
    }

    /// Moves tokens bonded → loose (stake leaving a bonded validator).
    pub fn unbond_tokens(&mut self, amount: Amount) -> Result<()> {
        self.bonded_tokens = sub(self.bonded_tokens, amount, "unbonding more than bonded")?;
        self.loose_tokens = add(self.loose_tokens, amount, "loose tokens")?;
        self.bonded_shares = &self.bonded_shares - &Rat::from_int(amount);
        Ok(())
    }

    /// Destroys bonded tokens. One of the two sinks in the system.
    pub fn burn_bonded(&mut self, amount: Amount) -> Result<()> {
        self.bonded_tokens = sub(self.bonded_tokens, amount, "burning more than bonded")?;
        self.bonded_shares = &self.bonded_shares - &Rat::from_int(amount);
        Ok(())
    }

    /// Destroys loose tokens. The other sink.
    pub fn burn_loose(&mut self, amount: Amount) -> Result<()> {
        self.loose_tokens = sub(self.loose_tokens, amount, "burning more than loose")?;
        Ok(())
    }
}

fn add(lhs: Amount, rhs: Amount, context: &'static str) -> Result<Amount> {
    lhs.checked_add(rhs)
        .ok_or(StakingError::Overflow { context, value: rhs })
}

fn sub(lhs: Amount, rhs: Amount, context: &str) -> Result<Amount> {
    lhs.checked_sub(rhs)
        .ok_or_else(|| StakingError::InvariantBroken(format!("{context}: {rhs} exceeds {lhs}")))
}
