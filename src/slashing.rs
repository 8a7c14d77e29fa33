//! The slashing engine.
//!
//! Given evidence that a validator misbehaved at some past block height, burn
//! `slash_factor` of the stake that stood behind it at that height. Stake
//! that has since started unbonding or been redelegated away still
//! contributed to the infraction, so the engine reaches back into every
//! unbonding delegation and redelegation created at or after the infraction
//! height and still inside its cool-down, burns each of them against its
//! *initial* balance (clamped by what is left), and takes whatever remains of
//! the commitment out of the validator's current bond.
//!
//! Two deliberate consequences of that accounting:
//! - Slashing against initial balances means repeated slashes for one
//!   infraction never compound on a record; a record burns at most to
//!   exhaustion.
//! - An exhausted record still absorbs its full share of the commitment, so
//!   once every at-risk balance is spent, further slashes for the same
//!   infraction height fall through to stake bonded *after* the infraction.
//!   Intentional, if surprising; the tests pin it.

use tracing::{debug, info, warn};

use crate::delegation::{Redelegation, UnbondingDelegation};
use crate::error::{Result, StakingError};
use crate::keeper::{BlockContext, Keeper};
use crate::rational::Rat;
use crate::store::{StakingEvent, StakingStore};
use crate::validator::Validator;
use crate::{Amount, ConsensusKey};

impl<S: StakingStore> Keeper<S> {
    /// Burns `slash_factor` of the stake that backed `consensus_key` at
    /// `infraction_height`. Returns the number of tokens actually removed
    /// from the pool.
    ///
    /// The infraction power — the validator's power when it misbehaved, as
    /// reported by the evidence layer — scales the burn, so stake bonded
    /// after the fact does not dilute the penalty.
    ///
    /// A consensus key that resolves to no validator is a logged no-op: the
    /// validator may have been fully slashed out of existence already.
    /// A future infraction height or a factor outside `[0, 1]` aborts the
    /// transaction.
    pub fn slash(
        &mut self,
        ctx: &BlockContext,
        consensus_key: &ConsensusKey,
        infraction_height: u64,
        infraction_power: Amount,
        slash_factor: &Rat,
    ) -> Result<Amount> {
        if slash_factor.is_negative() || slash_factor > &Rat::one() {
            return Err(StakingError::BadSlashFactor(slash_factor.to_string()));
        }
        if infraction_height > ctx.height {
            return Err(StakingError::FutureInfraction {
                infraction_height,
                current_height: ctx.height,
            });
        }
        let Some(mut validator) = self.store.validator_by_consensus_key(consensus_key)? else {
            warn!(
                consensus_key = %hex::encode(consensus_key),
                "validator not found for slash; previously slashed out or never bonded"
            );
            return Ok(0);
        };

        let supply_before = self.store.pool()?.total_tokens()?;
        let slash_amount = (slash_factor * &Rat::from_int(infraction_power)).to_amount()?;
        let mut remaining = slash_amount;

        // At the current height no unbonding or redelegation can predate the
        // infraction, so the walk is skipped entirely.
        if infraction_height < ctx.height {
            for ubd in self.store.unbonding_delegations_from(&validator.owner)? {
                let committed =
                    self.slash_unbonding_delegation(ctx, ubd, infraction_height, slash_factor)?;
                remaining = remaining.saturating_sub(committed);
            }
            for red in self.store.redelegations_from_src(&validator.owner)? {
                let Some(dst) = self.store.validator(&red.validator_dst)? else {
                    warn!(
                        delegator = %hex::encode(red.delegator),
                        destination = %hex::encode(red.validator_dst),
                        "redelegation destination validator not found, skipping"
                    );
                    continue;
                };
                let committed =
                    self.slash_redelegation(ctx, &dst, red, infraction_height, slash_factor)?;
                remaining = remaining.saturating_sub(committed);
            }
        }

        // Whatever the at-risk records did not absorb comes out of the
        // current bond, down to zero tokens at worst.
        let residual = remaining.min(validator.tokens);
        if residual > 0 {
            let mut pool = self.store.pool()?;
            validator.remove_tokens(&mut pool, residual)?;
            self.store.set_pool(&pool)?;
        }
        self.update_validator(&validator)?;

        let supply_after = self.store.pool()?.total_tokens()?;
        let burned = supply_before.checked_sub(supply_after).ok_or_else(|| {
            StakingError::InvariantBroken("slash increased the token supply".into())
        })?;
        info!(
            validator = %hex::encode(validator.owner),
            infraction_height,
            fraction = %slash_factor,
            burned,
            "slashed validator"
        );
        self.store.emit(StakingEvent::Slashed {
            validator: validator.owner,
            infraction_height,
            fraction: slash_factor.clone(),
            burned,
        })?;
        Ok(burned)
    }

    /// Slashes one unbonding delegation. Burns
    /// `min(slash_factor × initial_balance, balance)` from the pending
    /// balance and the loose bucket it sits in.
    ///
    /// Returns the *unclamped* commitment `slash_factor × initial_balance` —
    /// an exhausted record still absorbs its full share of the slash, so the
    /// caller's residual does not grow when a balance runs out.
    pub(crate) fn slash_unbonding_delegation(
        &mut self,
        ctx: &BlockContext,
        mut ubd: UnbondingDelegation,
        infraction_height: u64,
        slash_factor: &Rat,
    ) -> Result<Amount> {
        // Unbonding that began before the infraction: that stake had already
        // left and never contributed.
        if ubd.creation_height < infraction_height {
            return Ok(0);
        }
        // Cool-down elapsed: the stake has left the system for good.
        if ubd.min_time < ctx.time_unix {
            return Ok(0);
        }

        let slash_amount =
            (slash_factor * &Rat::from_int(ubd.initial_balance.amount)).to_amount()?;
        let to_burn = slash_amount.min(ubd.balance.amount);
        if to_burn > 0 {
            ubd.reduce_balance(to_burn)?;
            self.store.set_unbonding_delegation(&ubd)?;

            let mut pool = self.store.pool()?;
            pool.burn_loose(to_burn)?;
            self.store.set_pool(&pool)?;
            debug!(
                delegator = %hex::encode(ubd.delegator),
                validator = %hex::encode(ubd.validator),
                burned = to_burn,
                "slashed unbonding delegation"
            );
        }
        Ok(slash_amount)
    }

    /// Slashes one redelegation sourced from the offending validator.
    ///
    /// Two legs:
    /// - the record's balance is reduced by
    ///   `min(slash_factor × initial_balance, balance)`. The balance is
    ///   bookkeeping — it caps how much of this redelegation is still at
    ///   risk; the tokens themselves are bonded at the destination.
    /// - `slash_factor × shares_dst` shares (clamped to what the delegator
    ///   still holds there) are unbonded from the destination delegation and
    ///   the tokens they return are burned.
    ///
    /// Returns the unclamped commitment, like the unbonding case.
    pub(crate) fn slash_redelegation(
        &mut self,
        ctx: &BlockContext,
        dst_validator: &Validator,
        mut red: Redelegation,
        infraction_height: u64,
        slash_factor: &Rat,
    ) -> Result<Amount> {
        if dst_validator.owner != red.validator_dst {
            return Err(StakingError::InvariantBroken(format!(
                "redelegation slash handed validator {}, record names destination {}",
                hex::encode(dst_validator.owner),
                hex::encode(red.validator_dst)
            )));
        }
        // Redelegation that began before the infraction did not contribute.
        if red.creation_height < infraction_height {
            return Ok(0);
        }
        if red.min_time < ctx.time_unix {
            return Ok(0);
        }

        let slash_amount =
            (slash_factor * &Rat::from_int(red.initial_balance.amount)).to_amount()?;
        let balance_slash = slash_amount.min(red.balance.amount);
        if balance_slash > 0 {
            red.reduce_balance(balance_slash)?;
            self.store.set_redelegation(&red)?;
        }

        let mut shares = slash_factor * &red.shares_dst;
        let Some(delegation) = self.store.delegation(&red.delegator, &red.validator_dst)? else {
            // Destination delegation already unbonded, possibly by an earlier
            // slash; the shortfall is simply not available.
            return Ok(slash_amount);
        };
        if shares > delegation.shares {
            shares = delegation.shares.clone();
        }
        if !shares.is_zero() {
            let tokens_to_burn =
                self.unbond_shares(ctx, &red.delegator, &red.validator_dst, &shares)?;
            if tokens_to_burn > 0 {
                // `unbond_shares` parked the tokens in the loose bucket.
                let mut pool = self.store.pool()?;
                pool.burn_loose(tokens_to_burn)?;
                self.store.set_pool(&pool)?;
            }
            debug!(
                delegator = %hex::encode(red.delegator),
                destination = %hex::encode(red.validator_dst),
                shares = %shares,
                burned = tokens_to_burn,
                "slashed redelegation at destination"
            );
        }
        Ok(slash_amount)
    }
}
