//! Module parameters.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StakingError};

/// Network-governed staking parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Denomination of the bondable token.
    pub bond_denom: String,
    /// Cool-down period, in seconds, applied to unbonding delegations and
    /// redelegations. The record stays slashable until it elapses.
    pub unbonding_time: i64,
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        if self.bond_denom.is_empty() {
            return Err(StakingError::InvariantBroken(
                "params.bond_denom must not be empty".into(),
            ));
        }
        if self.unbonding_time < 0 {
            return Err(StakingError::InvariantBroken(
                "params.unbonding_time must not be negative".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            bond_denom: "steak".into(),
            // Three weeks.
            unbonding_time: 60 * 60 * 24 * 21,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_validate() {
        Params::default().validate().unwrap();
    }

    #[test]
    fn empty_denom_rejected() {
        let params = Params {
            bond_denom: String::new(),
            ..Params::default()
        };
        assert!(params.validate().is_err());
    }
}
