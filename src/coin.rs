//! Denominated token amounts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StakingError};
use crate::Amount;

/// An integer amount of a single denomination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Amount,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Amount) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    /// Checked reduction of the amount; underflow aborts the transaction.
    pub fn deduct(&mut self, amount: Amount) -> Result<()> {
        self.amount = self.amount.checked_sub(amount).ok_or_else(|| {
            StakingError::InvariantBroken(format!(
                "deducting {amount} from coin {self} would go negative"
            ))
        })?;
        Ok(())
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}
