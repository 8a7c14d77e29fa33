//! State façade and the delegation lifecycle.
//!
//! The keeper owns the store: every state transition in the crate goes
//! through it, and the global [`Pool`] is only ever reached here. Operations
//! are synchronous and run to completion; the host provides transactional
//! semantics around them.

use tracing::{debug, info};

use crate::coin::Coin;
use crate::delegation::{Delegation, Redelegation, UnbondingDelegation};
use crate::error::{Result, StakingError};
use crate::rational::Rat;
use crate::store::{StakingEvent, StakingStore};
use crate::validator::{Validator, ValidatorStatus};
use crate::{Address, Amount, ConsensusKey};

/// Block header data the state machine is allowed to read.
///
/// No other clock or height source exists in the crate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockContext {
    /// Height of the block being executed.
    pub height: u64,
    /// Header time, unix seconds.
    pub time_unix: i64,
}

impl BlockContext {
    pub fn new(height: u64, time_unix: i64) -> Self {
        Self { height, time_unix }
    }
}

/// Typed façade over the staking store.
pub struct Keeper<S: StakingStore> {
    pub(crate) store: S,
}

impl<S: StakingStore> Keeper<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Registers a new validator under its owner address and consensus key.
    pub fn create_validator(&mut self, owner: Address, consensus_key: ConsensusKey) -> Result<()> {
        if self.store.validator(&owner)?.is_some() {
            return Err(StakingError::ValidatorExists(hex::encode(owner)));
        }
        self.store.set_validator(&Validator::new(owner, consensus_key))
    }

    /// Persists a validator record, maintaining the consensus-key index.
    /// Power is derived from tokens and status, so it needs no recomputation
    /// beyond the write.
    pub fn update_validator(&mut self, validator: &Validator) -> Result<()> {
        self.store.set_validator(validator)
    }

    fn must_validator(&self, owner: &Address) -> Result<Validator> {
        self.store
            .validator(owner)?
            .ok_or_else(|| StakingError::NoValidator(format!("owner {}", hex::encode(owner))))
    }

    fn must_validator_by_consensus_key(&self, key: &ConsensusKey) -> Result<Validator> {
        self.store.validator_by_consensus_key(key)?.ok_or_else(|| {
            StakingError::NoValidator(format!("consensus key {}", hex::encode(key)))
        })
    }

    // ---------------- Status transitions ----------------
    //
    // Which validators enter the bonded set is the selector's decision, made
    // outside this crate; these two transitions carry it out on the pool.

    /// Moves a validator into the bonded set, pulling its tokens into the
    /// bonded bucket.
    pub fn bond_validator(&mut self, owner: &Address) -> Result<()> {
        let mut validator = self.must_validator(owner)?;
        if validator.status == ValidatorStatus::Bonded {
            return Ok(());
        }
        if validator.jailed {
            return Err(StakingError::ValidatorJailed(hex::encode(owner)));
        }
        let mut pool = self.store.pool()?;
        pool.bond_tokens(validator.tokens)?;
        validator.status = ValidatorStatus::Bonded;
        self.store.set_pool(&pool)?;
        self.update_validator(&validator)
    }

    /// Starts a validator unbonding, returning its tokens to the loose bucket.
    pub fn begin_unbonding_validator(&mut self, owner: &Address) -> Result<()> {
        let mut validator = self.must_validator(owner)?;
        if validator.status != ValidatorStatus::Bonded {
            return Ok(());
        }
        let mut pool = self.store.pool()?;
        pool.unbond_tokens(validator.tokens)?;
        validator.status = ValidatorStatus::Unbonding;
        self.store.set_pool(&pool)?;
        self.update_validator(&validator)
    }

    // ---------------- Delegation lifecycle ----------------

    /// Bonds `amount` tokens from the loose supply to a validator, issuing
    /// shares at the current exchange rate.
    pub fn delegate(
        &mut self,
        ctx: &BlockContext,
        delegator: &Address,
        validator_owner: &Address,
        amount: Amount,
    ) -> Result<Rat> {
        let mut validator = self.must_validator(validator_owner)?;
        if validator.jailed {
            return Err(StakingError::ValidatorJailed(hex::encode(validator_owner)));
        }

        let mut pool = self.store.pool()?;
        let issued = validator.add_tokens_from_del(&mut pool, amount)?;
        self.store.set_pool(&pool)?;

        let mut delegation = self
            .store
            .delegation(delegator, validator_owner)?
            .unwrap_or_else(|| Delegation {
                delegator: *delegator,
                validator: *validator_owner,
                shares: Rat::zero(),
                height: ctx.height,
            });
        delegation.shares = &delegation.shares + &issued;
        delegation.height = ctx.height;
        self.store.set_delegation(&delegation)?;
        self.update_validator(&validator)?;

        debug!(
            delegator = %hex::encode(delegator),
            validator = %hex::encode(validator_owner),
            amount,
            shares = %issued,
            "delegated"
        );
        self.store.emit(StakingEvent::Delegated {
            delegator: *delegator,
            validator: *validator_owner,
            amount,
            shares: issued.clone(),
        })?;
        Ok(issued)
    }

    /// Removes shares from a delegation and its validator, returning the
    /// token amount they were worth. Deletes the delegation at zero shares.
    ///
    /// This is the primitive both voluntary unbonding and redelegation
    /// slashing are built on.
    pub(crate) fn unbond_shares(
        &mut self,
        ctx: &BlockContext,
        delegator: &Address,
        validator_owner: &Address,
        shares: &Rat,
    ) -> Result<Amount> {
        let mut delegation = self.store.delegation(delegator, validator_owner)?.ok_or_else(
            || StakingError::NoDelegation {
                delegator: hex::encode(delegator),
                validator: hex::encode(validator_owner),
            },
        )?;
        if shares > &delegation.shares {
            return Err(StakingError::InsufficientShares {
                requested: shares.to_string(),
                held: delegation.shares.to_string(),
            });
        }
        let mut validator = self.must_validator(validator_owner)?;

        let mut pool = self.store.pool()?;
        let removed = validator.remove_del_shares(&mut pool, shares)?;
        self.store.set_pool(&pool)?;

        delegation.shares = &delegation.shares - shares;
        if delegation.shares.is_zero() {
            self.store.remove_delegation(delegator, validator_owner)?;
        } else {
            delegation.height = ctx.height;
            self.store.set_delegation(&delegation)?;
        }
        self.update_validator(&validator)?;
        Ok(removed)
    }

    /// Starts unbonding: removes shares and parks the token value in an
    /// unbonding delegation until the cool-down elapses.
    pub fn begin_unbonding(
        &mut self,
        ctx: &BlockContext,
        delegator: &Address,
        validator_owner: &Address,
        shares: &Rat,
    ) -> Result<UnbondingDelegation> {
        let params = self.store.params()?;
        let removed = self.unbond_shares(ctx, delegator, validator_owner, shares)?;
        let min_time = ctx.time_unix.saturating_add(params.unbonding_time);
        let ubd = UnbondingDelegation {
            delegator: *delegator,
            validator: *validator_owner,
            creation_height: ctx.height,
            min_time,
            initial_balance: Coin::new(params.bond_denom.clone(), removed),
            balance: Coin::new(params.bond_denom, removed),
        };
        self.store.set_unbonding_delegation(&ubd)?;
        self.store.emit(StakingEvent::UnbondingBegun {
            delegator: *delegator,
            validator: *validator_owner,
            amount: removed,
            min_time,
        })?;
        Ok(ubd)
    }

    /// Moves shares atomically from one validator to another, recording the
    /// redelegation for the slashing engine to reach back into.
    pub fn begin_redelegation(
        &mut self,
        ctx: &BlockContext,
        delegator: &Address,
        src_owner: &Address,
        dst_owner: &Address,
        shares: &Rat,
    ) -> Result<Redelegation> {
        if src_owner == dst_owner {
            return Err(StakingError::SelfRedelegation);
        }
        let params = self.store.params()?;
        let removed = self.unbond_shares(ctx, delegator, src_owner, shares)?;
        let issued = self.delegate(ctx, delegator, dst_owner, removed)?;
        let min_time = ctx.time_unix.saturating_add(params.unbonding_time);
        let red = Redelegation {
            delegator: *delegator,
            validator_src: *src_owner,
            validator_dst: *dst_owner,
            creation_height: ctx.height,
            min_time,
            initial_balance: Coin::new(params.bond_denom.clone(), removed),
            balance: Coin::new(params.bond_denom, removed),
            shares_src: shares.clone(),
            shares_dst: issued,
        };
        self.store.set_redelegation(&red)?;
        self.store.emit(StakingEvent::RedelegationBegun {
            delegator: *delegator,
            validator_src: *src_owner,
            validator_dst: *dst_owner,
            amount: removed,
        })?;
        Ok(red)
    }

    // ---------------- Revocation ----------------

    /// Jails the validator behind `consensus_key`; it keeps its stake and
    /// stays slashable, the external selector drops it from the active set.
    pub fn revoke(&mut self, consensus_key: &ConsensusKey) -> Result<()> {
        let mut validator = self.must_validator_by_consensus_key(consensus_key)?;
        validator.jailed = true;
        self.update_validator(&validator)?;
        info!(validator = %hex::encode(validator.owner), "validator jailed");
        self.store.emit(StakingEvent::Jailed {
            validator: validator.owner,
        })
    }

    /// Clears the jailed flag set by [`Keeper::revoke`].
    pub fn unrevoke(&mut self, consensus_key: &ConsensusKey) -> Result<()> {
        let mut validator = self.must_validator_by_consensus_key(consensus_key)?;
        validator.jailed = false;
        self.update_validator(&validator)?;
        info!(validator = %hex::encode(validator.owner), "validator unjailed");
        self.store.emit(StakingEvent::Unjailed {
            validator: validator.owner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use crate::pool::Pool;
    use crate::store::MemStore;

    fn addr(byte: u8) -> Address {
        [byte; 20]
    }

    fn ckey(byte: u8) -> ConsensusKey {
        [byte; 32]
    }

    /// A keeper with one bonded validator holding `amount` self-delegated
    /// tokens, and `extra` loose tokens left over for further delegations.
    fn setup(amount: Amount, extra: Amount) -> Keeper<MemStore> {
        let mut store = MemStore::new();
        store
            .set_pool(&Pool {
                loose_tokens: amount + extra,
                ..Pool::default()
            })
            .unwrap();
        store.set_params(&Params::default()).unwrap();
        let mut keeper = Keeper::new(store);
        let ctx = BlockContext::new(0, 0);
        keeper.create_validator(addr(1), ckey(1)).unwrap();
        keeper.delegate(&ctx, &addr(1), &addr(1), amount).unwrap();
        keeper.bond_validator(&addr(1)).unwrap();
        keeper
    }

    #[test]
    fn create_validator_rejects_duplicates() {
        let mut keeper = Keeper::new(MemStore::new());
        keeper.create_validator(addr(1), ckey(1)).unwrap();
        assert!(matches!(
            keeper.create_validator(addr(1), ckey(2)),
            Err(StakingError::ValidatorExists(_))
        ));
    }

    #[test]
    fn delegate_issues_shares_and_bonds_tokens() {
        let mut keeper = setup(10, 20);
        let ctx = BlockContext::new(5, 0);
        let issued = keeper.delegate(&ctx, &addr(9), &addr(1), 20).unwrap();
        assert_eq!(issued, Rat::from_int(20));

        let pool = keeper.store().pool().unwrap();
        assert_eq!(pool.bonded_tokens, 30);
        assert_eq!(pool.loose_tokens, 0);

        let delegation = keeper
            .store()
            .delegation(&addr(9), &addr(1))
            .unwrap()
            .unwrap();
        assert_eq!(delegation.shares, Rat::from_int(20));
        assert_eq!(delegation.height, 5);
    }

    #[test]
    fn delegate_to_jailed_validator_rejected() {
        let mut keeper = setup(10, 20);
        keeper.revoke(&ckey(1)).unwrap();
        let err = keeper.delegate(&BlockContext::default(), &addr(9), &addr(1), 5);
        assert!(matches!(err, Err(StakingError::ValidatorJailed(_))));
    }

    #[test]
    fn begin_unbonding_parks_tokens_and_records_schedule() {
        let mut keeper = setup(10, 4);
        let ctx = BlockContext::new(2, 100);
        keeper.delegate(&ctx, &addr(9), &addr(1), 4).unwrap();

        let ctx = BlockContext::new(3, 100);
        let ubd = keeper
            .begin_unbonding(&ctx, &addr(9), &addr(1), &Rat::from_int(4))
            .unwrap();
        assert_eq!(ubd.creation_height, 3);
        assert_eq!(ubd.min_time, 100 + Params::default().unbonding_time);
        assert_eq!(ubd.initial_balance.amount, 4);
        assert_eq!(ubd.balance, ubd.initial_balance);

        // Delegation consumed entirely, tokens back in the loose bucket.
        assert!(keeper.store().delegation(&addr(9), &addr(1)).unwrap().is_none());
        let pool = keeper.store().pool().unwrap();
        assert_eq!(pool.bonded_tokens, 10);
        assert_eq!(pool.loose_tokens, 4);
    }

    #[test]
    fn begin_redelegation_moves_stake_and_records_both_share_legs() {
        let mut keeper = setup(10, 6);
        let ctx = BlockContext::new(0, 0);
        keeper.create_validator(addr(2), ckey(2)).unwrap();
        keeper.delegate(&ctx, &addr(9), &addr(1), 6).unwrap();

        let ctx = BlockContext::new(11, 0);
        let red = keeper
            .begin_redelegation(&ctx, &addr(9), &addr(1), &addr(2), &Rat::from_int(6))
            .unwrap();
        assert_eq!(red.creation_height, 11);
        assert_eq!(red.shares_src, Rat::from_int(6));
        assert_eq!(red.shares_dst, Rat::from_int(6));
        assert_eq!(red.initial_balance.amount, 6);

        let dst_delegation = keeper
            .store()
            .delegation(&addr(9), &addr(2))
            .unwrap()
            .unwrap();
        assert_eq!(dst_delegation.shares, Rat::from_int(6));

        let src = keeper.store().validator(&addr(1)).unwrap().unwrap();
        assert_eq!(src.tokens, 10);
        let dst = keeper.store().validator(&addr(2)).unwrap().unwrap();
        assert_eq!(dst.tokens, 6);
    }

    #[test]
    fn self_redelegation_rejected() {
        let mut keeper = setup(10, 0);
        let err = keeper.begin_redelegation(
            &BlockContext::default(),
            &addr(1),
            &addr(1),
            &addr(1),
            &Rat::from_int(1),
        );
        assert!(matches!(err, Err(StakingError::SelfRedelegation)));
    }

    #[test]
    fn unbonding_more_shares_than_delegated_rejected() {
        let mut keeper = setup(10, 0);
        let err = keeper.begin_unbonding(
            &BlockContext::default(),
            &addr(1),
            &addr(1),
            &Rat::from_int(11),
        );
        assert!(matches!(err, Err(StakingError::InsufficientShares { .. })));
    }

    #[test]
    fn revocation_round_trip() {
        let mut keeper = setup(10, 0);

        let validator = keeper.store().validator(&addr(1)).unwrap().unwrap();
        assert!(!validator.jailed);

        keeper.revoke(&ckey(1)).unwrap();
        let jailed = keeper.store().validator(&addr(1)).unwrap().unwrap();
        assert!(jailed.jailed);

        keeper.unrevoke(&ckey(1)).unwrap();
        let restored = keeper.store().validator(&addr(1)).unwrap().unwrap();
        assert!(!restored.jailed);
        assert_eq!(restored, validator);
    }

    #[test]
    fn revoking_unknown_consensus_key_fails() {
        let mut keeper = setup(10, 0);
        assert!(matches!(
            keeper.revoke(&ckey(42)),
            Err(StakingError::NoValidator(_))
        ));
        assert!(matches!(
            keeper.unrevoke(&ckey(42)),
            Err(StakingError::NoValidator(_))
        ));
    }
}
