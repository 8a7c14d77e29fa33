//! Keyed persistence for staking state.
//!
//! Design goals:
//! - Typed capability trait ([`StakingStore`]) so the keeper never touches
//!   raw bytes or a codec; the host plugs its own backend in.
//! - Deterministic enumeration: record keys are single-byte prefixes followed
//!   by fixed-width address/key bytes, and every listing walks them in
//!   byte-lexicographic order. Consensus-replicated execution depends on each
//!   node visiting records identically.
//! - Secondary indexes for the two enumerations slashing needs: unbonding
//!   delegations by validator, redelegations by source validator.
//! - [`MemStore`]: ordered in-memory implementation for tests and
//!   single-process use.

use std::collections::BTreeMap;

use crate::delegation::{Delegation, Redelegation, UnbondingDelegation};
use crate::error::Result;
use crate::params::Params;
use crate::pool::Pool;
use crate::rational::Rat;
use crate::validator::Validator;
use crate::{Address, Amount, ConsensusKey};

/// Store key construction. Fixed-width segments keep prefix scans exact.
pub mod keys {
    use crate::{Address, ConsensusKey};

    pub const VALIDATOR: u8 = 0x11;
    pub const VALIDATOR_BY_CONSENSUS_KEY: u8 = 0x12;
    pub const DELEGATION: u8 = 0x21;
    pub const UNBONDING: u8 = 0x22;
    pub const UNBONDING_BY_VALIDATOR: u8 = 0x23;
    pub const REDELEGATION: u8 = 0x24;
    pub const REDELEGATION_BY_SRC: u8 = 0x25;

    fn concat(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + parts.iter().map(|p| p.len()).sum::<usize>());
        key.push(prefix);
        for part in parts {
            key.extend_from_slice(part);
        }
        key
    }

    pub fn validator(owner: &Address) -> Vec<u8> {
        concat(VALIDATOR, &[owner])
    }

    pub fn validator_by_consensus_key(key: &ConsensusKey) -> Vec<u8> {
        concat(VALIDATOR_BY_CONSENSUS_KEY, &[key])
    }

    pub fn delegation(delegator: &Address, validator: &Address) -> Vec<u8> {
        concat(DELEGATION, &[delegator, validator])
    }

    pub fn unbonding(delegator: &Address, validator: &Address) -> Vec<u8> {
        concat(UNBONDING, &[delegator, validator])
    }

    /// Index entry `(validator, delegator) -> primary key`.
    pub fn unbonding_by_validator(validator: &Address, delegator: &Address) -> Vec<u8> {
        concat(UNBONDING_BY_VALIDATOR, &[validator, delegator])
    }

    /// Prefix covering every unbonding delegation leaving `validator`.
    pub fn unbonding_by_validator_prefix(validator: &Address) -> Vec<u8> {
        concat(UNBONDING_BY_VALIDATOR, &[validator])
    }

    pub fn redelegation(delegator: &Address, src: &Address, dst: &Address) -> Vec<u8> {
        concat(REDELEGATION, &[delegator, src, dst])
    }

    /// Index entry `(src, delegator, dst) -> primary key`.
    pub fn redelegation_by_src(src: &Address, delegator: &Address, dst: &Address) -> Vec<u8> {
        concat(REDELEGATION_BY_SRC, &[src, delegator, dst])
    }

    /// Prefix covering every redelegation sourced from `src`.
    pub fn redelegation_by_src_prefix(src: &Address) -> Vec<u8> {
        concat(REDELEGATION_BY_SRC, &[src])
    }
}

/// Events surfaced to the host for indexing and diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub enum StakingEvent {
    Delegated {
        delegator: Address,
        validator: Address,
        amount: Amount,
        shares: Rat,
    },
    UnbondingBegun {
        delegator: Address,
        validator: Address,
        amount: Amount,
        min_time: i64,
    },
    RedelegationBegun {
        delegator: Address,
        validator_src: Address,
        validator_dst: Address,
        amount: Amount,
    },
    Slashed {
        validator: Address,
        infraction_height: u64,
        fraction: Rat,
        burned: Amount,
    },
    Jailed {
        validator: Address,
    },
    Unjailed {
        validator: Address,
    },
}

/// Capability set the keeper requires from its backing store.
///
/// Listings (`validators`, `unbonding_delegations_from`,
/// `redelegations_from_src`, `delegations_to`) must return records in
/// ascending byte order of their store keys.
pub trait StakingStore {
    fn validator(&self, owner: &Address) -> Result<Option<Validator>>;
    fn validator_by_consensus_key(&self, key: &ConsensusKey) -> Result<Option<Validator>>;
    /// Persists the validator and maintains the consensus-key index.
    fn set_validator(&mut self, validator: &Validator) -> Result<()>;
    /// Every registered validator, in owner-key order.
    fn validators(&self) -> Result<Vec<Validator>>;

    fn delegation(&self, delegator: &Address, validator: &Address) -> Result<Option<Delegation>>;
    fn set_delegation(&mut self, delegation: &Delegation) -> Result<()>;
    fn remove_delegation(&mut self, delegator: &Address, validator: &Address) -> Result<()>;
    /// Every delegation bonded to `validator`, in key order.
    fn delegations_to(&self, validator: &Address) -> Result<Vec<Delegation>>;

    fn unbonding_delegation(
        &self,
        delegator: &Address,
        validator: &Address,
    ) -> Result<Option<UnbondingDelegation>>;
    fn set_unbonding_delegation(&mut self, ubd: &UnbondingDelegation) -> Result<()>;
    /// Every unbonding delegation leaving `validator`, in index-key order.
    fn unbonding_delegations_from(&self, validator: &Address)
        -> Result<Vec<UnbondingDelegation>>;

    fn redelegation(
        &self,
        delegator: &Address,
        src: &Address,
        dst: &Address,
    ) -> Result<Option<Redelegation>>;
    fn set_redelegation(&mut self, red: &Redelegation) -> Result<()>;
    /// Every redelegation sourced from `src`, in index-key order.
    fn redelegations_from_src(&self, src: &Address) -> Result<Vec<Redelegation>>;

    fn pool(&self) -> Result<Pool>;
    fn set_pool(&mut self, pool: &Pool) -> Result<()>;
    fn params(&self) -> Result<Params>;
    fn set_params(&mut self, params: &Params) -> Result<()>;

    /// Event hook; backends that don't index events ignore them.
    fn emit(&mut self, _event: StakingEvent) -> Result<()> {
        Ok(())
    }
}

/// In-memory store over ordered maps.
///
/// `BTreeMap` iterates keys in ascending byte order, which makes every
/// listing deterministic without extra sorting.
#[derive(Debug, Default)]
pub struct MemStore {
    validators: BTreeMap<Vec<u8>, Validator>,
    consensus_index: BTreeMap<Vec<u8>, Address>,
    delegations: BTreeMap<Vec<u8>, Delegation>,
    unbonding: BTreeMap<Vec<u8>, UnbondingDelegation>,
    unbonding_index: BTreeMap<Vec<u8>, Vec<u8>>,
    redelegations: BTreeMap<Vec<u8>, Redelegation>,
    redelegation_index: BTreeMap<Vec<u8>, Vec<u8>>,
    pool: Pool,
    params: Params,
    /// Emitted events, in order. Exposed for assertions.
    pub events: Vec<StakingEvent>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn prefix_scan<'a, V>(
    map: &'a BTreeMap<Vec<u8>, V>,
    prefix: Vec<u8>,
) -> impl Iterator<Item = (&'a Vec<u8>, &'a V)> {
    map.range(prefix.clone()..)
        .take_while(move |(key, _)| key.starts_with(&prefix))
}

impl StakingStore for MemStore {
    fn validator(&self, owner: &Address) -> Result<Option<Validator>> {
        Ok(self.validators.get(&keys::validator(owner)).cloned())
    }

    fn validator_by_consensus_key(&self, key: &ConsensusKey) -> Result<Option<Validator>> {
        match self
            .consensus_index
            .get(&keys::validator_by_consensus_key(key))
        {
            Some(owner) => self.validator(owner),
            None => Ok(None),
        }
    }

    fn set_validator(&mut self, validator: &Validator) -> Result<()> {
        self.consensus_index.insert(
            keys::validator_by_consensus_key(&validator.consensus_key),
            validator.owner,
        );
        self.validators
            .insert(keys::validator(&validator.owner), validator.clone());
        Ok(())
    }

    fn validators(&self) -> Result<Vec<Validator>> {
        Ok(self.validators.values().cloned().collect())
    }

    fn delegation(&self, delegator: &Address, validator: &Address) -> Result<Option<Delegation>> {
        Ok(self
            .delegations
            .get(&keys::delegation(delegator, validator))
            .cloned())
    }

    fn set_delegation(&mut self, delegation: &Delegation) -> Result<()> {
        self.delegations.insert(
            keys::delegation(&delegation.delegator, &delegation.validator),
            delegation.clone(),
        );
        Ok(())
    }

    fn remove_delegation(&mut self, delegator: &Address, validator: &Address) -> Result<()> {
        self.delegations
            .remove(&keys::delegation(delegator, validator));
        Ok(())
    }

    fn delegations_to(&self, validator: &Address) -> Result<Vec<Delegation>> {
        Ok(self
            .delegations
            .values()
            .filter(|d| d.validator == *validator)
            .cloned()
            .collect())
    }

    fn unbonding_delegation(
        &self,
        delegator: &Address,
        validator: &Address,
    ) -> Result<Option<UnbondingDelegation>> {
        Ok(self
            .unbonding
            .get(&keys::unbonding(delegator, validator))
            .cloned())
    }

    fn set_unbonding_delegation(&mut self, ubd: &UnbondingDelegation) -> Result<()> {
        let primary = keys::unbonding(&ubd.delegator, &ubd.validator);
        self.unbonding_index.insert(
            keys::unbonding_by_validator(&ubd.validator, &ubd.delegator),
            primary.clone(),
        );
        self.unbonding.insert(primary, ubd.clone());
        Ok(())
    }

    fn unbonding_delegations_from(
        &self,
        validator: &Address,
    ) -> Result<Vec<UnbondingDelegation>> {
        prefix_scan(
            &self.unbonding_index,
            keys::unbonding_by_validator_prefix(validator),
        )
        .map(|(_, primary)| {
            self.unbonding.get(primary).cloned().ok_or_else(|| {
                crate::StakingError::Store(format!(
                    "dangling unbonding index entry {}",
                    hex::encode(primary)
                ))
            })
        })
        .collect()
    }

    fn redelegation(
        &self,
        delegator: &Address,
        src: &Address,
        dst: &Address,
    ) -> Result<Option<Redelegation>> {
        Ok(self
            .redelegations
            .get(&keys::redelegation(delegator, src, dst))
            .cloned())
    }

    fn set_redelegation(&mut self, red: &Redelegation) -> Result<()> {
        let primary = keys::redelegation(&red.delegator, &red.validator_src, &red.validator_dst);
        self.redelegation_index.insert(
            keys::redelegation_by_src(&red.validator_src, &red.delegator, &red.validator_dst),
            primary.clone(),
        );
        self.redelegations.insert(primary, red.clone());
        Ok(())
    }

    fn redelegations_from_src(&self, src: &Address) -> Result<Vec<Redelegation>> {
        prefix_scan(
            &self.redelegation_index,
            keys::redelegation_by_src_prefix(src),
        )
        .map(|(_, primary)| {
            self.redelegations.get(primary).cloned().ok_or_else(|| {
                crate::StakingError::Store(format!(
                    "dangling redelegation index entry {}",
                    hex::encode(primary)
                ))
            })
        })
        .collect()
    }

    fn pool(&self) -> Result<Pool> {
        Ok(self.pool.clone())
    }

    fn set_pool(&mut self, pool: &Pool) -> Result<()> {
        self.pool = pool.clone();
        Ok(())
    }

    fn params(&self) -> Result<Params> {
        Ok(self.params.clone())
    }

    fn set_params(&mut self, params: &Params) -> Result<()> {
        self.params = params.clone();
        Ok(())
    }

    fn emit(&mut self, event: StakingEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::Coin;

    fn addr(byte: u8) -> Address {
        [byte; 20]
    }

    fn ubd(delegator: Address, validator: Address, amount: Amount) -> UnbondingDelegation {
        UnbondingDelegation {
            delegator,
            validator,
            creation_height: 0,
            min_time: 0,
            initial_balance: Coin::new("steak", amount),
            balance: Coin::new("steak", amount),
        }
    }

    #[test]
    fn consensus_key_index_follows_validator() {
        let mut store = MemStore::new();
        let validator = Validator::new(addr(1), [7; 32]);
        store.set_validator(&validator).unwrap();
        let found = store.validator_by_consensus_key(&[7; 32]).unwrap().unwrap();
        assert_eq!(found.owner, addr(1));
        assert!(store.validator_by_consensus_key(&[8; 32]).unwrap().is_none());
    }

    #[test]
    fn unbonding_listing_is_scoped_and_ordered() {
        let mut store = MemStore::new();
        // Insert out of delegator order, across two validators.
        store.set_unbonding_delegation(&ubd(addr(9), addr(1), 30)).unwrap();
        store.set_unbonding_delegation(&ubd(addr(3), addr(1), 10)).unwrap();
        store.set_unbonding_delegation(&ubd(addr(5), addr(2), 99)).unwrap();

        let listed = store.unbonding_delegations_from(&addr(1)).unwrap();
        assert_eq!(listed.len(), 2);
        // Ascending delegator bytes under the validator prefix.
        assert_eq!(listed[0].delegator, addr(3));
        assert_eq!(listed[1].delegator, addr(9));
    }

    #[test]
    fn redelegation_listing_is_scoped_to_source() {
        let mut store = MemStore::new();
        let red = Redelegation {
            delegator: addr(9),
            validator_src: addr(1),
            validator_dst: addr(2),
            creation_height: 0,
            min_time: 0,
            initial_balance: Coin::new("steak", 5),
            balance: Coin::new("steak", 5),
            shares_src: crate::Rat::from_int(5),
            shares_dst: crate::Rat::from_int(5),
        };
        store.set_redelegation(&red).unwrap();

        assert_eq!(store.redelegations_from_src(&addr(1)).unwrap().len(), 1);
        assert!(store.redelegations_from_src(&addr(2)).unwrap().is_empty());
        assert_eq!(
            store.redelegation(&addr(9), &addr(1), &addr(2)).unwrap(),
            Some(red)
        );
    }

    #[test]
    fn overwriting_a_record_keeps_one_entry() {
        let mut store = MemStore::new();
        let mut record = ubd(addr(3), addr(1), 10);
        store.set_unbonding_delegation(&record).unwrap();
        record.balance.amount = 4;
        store.set_unbonding_delegation(&record).unwrap();

        let listed = store.unbonding_delegations_from(&addr(1)).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].balance.amount, 4);
    }
}
