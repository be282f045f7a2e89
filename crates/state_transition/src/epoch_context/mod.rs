//! Per-epoch caches derived from the state: shufflings for the previous, current and next epoch,
//! the proposer of every slot of the current epoch, and the pubkey cache.
//!
//! Everything here is a pure function of the state it was built from. After a reorg the context
//! must be rebuilt with [`EpochsContext::new`] (the pubkey cache can be carried over).

pub mod pubkey_cache;

use std::{mem, sync::Arc};

use alloy_primitives::B256;
use ember_consensus_beacon::view::{BeaconStateView, committee_count_per_slot};
use ember_consensus_misc::{
    constants::{DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, GENESIS_EPOCH},
    shuffle::{committee_bounds, compute_shuffled_index, shuffle_list},
};
use ember_network_spec::ChainSpec;
use ethereum_hashing::hash;
pub use pubkey_cache::PubkeyCache;
use tracing::trace;

use crate::errors::EpochContextError;

pub const MAX_RANDOM_BYTE: u64 = 255;

/// Upper bound on rejection-sampling rounds. A candidate with a full effective balance is always
/// accepted, so only a registry of near-empty balances can get close.
const MAX_SAMPLING_ROUNDS: usize = 1 << 20;

/// The active validators of one epoch in committee order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShufflingEpoch {
    pub epoch: u64,
    pub active_indices: Vec<u64>,
    pub shuffling: Vec<u64>,
    pub committees_per_slot: u64,
    slots_per_epoch: u64,
}

impl ShufflingEpoch {
    pub fn new<S: BeaconStateView>(
        state: &S,
        epoch: u64,
        spec: &ChainSpec,
    ) -> Result<Self, EpochContextError> {
        let active_indices = state.get_active_validator_indices(epoch);
        let shuffling = if active_indices.is_empty() {
            vec![]
        } else {
            let seed = state.get_seed(epoch, DOMAIN_BEACON_ATTESTER, spec);
            shuffle_list(active_indices.clone(), spec.shuffle_round_count, seed, false)
                .map_err(|err| EpochContextError::Shuffling(err.to_string()))?
        };
        Ok(Self {
            epoch,
            committees_per_slot: committee_count_per_slot(active_indices.len() as u64, spec),
            active_indices,
            shuffling,
            slots_per_epoch: spec.slots_per_epoch,
        })
    }

    pub fn committee_count(&self) -> u64 {
        self.committees_per_slot * self.slots_per_epoch
    }

    /// Committee `index` of `slot`. The slot must lie in this epoch.
    pub fn committee(&self, slot: u64, index: u64) -> Result<&[u64], EpochContextError> {
        if index >= self.committees_per_slot {
            return Err(EpochContextError::CommitteeIndexOutOfRange {
                index,
                committees_per_slot: self.committees_per_slot,
            });
        }
        let position = (slot % self.slots_per_epoch) * self.committees_per_slot + index;
        let (start, end) = committee_bounds(self.shuffling.len(), position, self.committee_count());
        Ok(&self.shuffling[start..end])
    }

    /// Every committee of the epoch, slot by slot.
    pub fn committees(&self) -> impl Iterator<Item = &[u64]> + '_ {
        (0..self.committee_count()).map(move |position| {
            let (start, end) =
                committee_bounds(self.shuffling.len(), position, self.committee_count());
            &self.shuffling[start..end]
        })
    }
}

#[derive(Debug, Clone)]
pub struct EpochsContext {
    pub pubkey_cache: PubkeyCache,
    epoch: u64,
    slots_per_epoch: u64,
    previous_shuffling: Arc<ShufflingEpoch>,
    current_shuffling: Arc<ShufflingEpoch>,
    next_shuffling: Arc<ShufflingEpoch>,
    proposers: Vec<u64>,
}

impl EpochsContext {
    pub fn new<S: BeaconStateView>(state: &S, spec: &ChainSpec) -> Result<Self, EpochContextError> {
        let pubkey_cache =
            PubkeyCache::from_pubkeys(state.validators().iter().map(|validator| &validator.pubkey))?;
        Self::with_pubkey_cache(state, pubkey_cache, spec)
    }

    /// Builds the shufflings from `state`, reusing a cache from the same or a related branch.
    ///
    /// The cache is cut back to the longest prefix it shares with the registry, then extended
    /// with the rest of the registry.
    pub fn with_pubkey_cache<S: BeaconStateView>(
        state: &S,
        mut pubkey_cache: PubkeyCache,
        spec: &ChainSpec,
    ) -> Result<Self, EpochContextError> {
        pubkey_cache.truncate(state.validators().len() as u64);
        if let Some(diverged_at) = state
            .validators()
            .iter()
            .take(pubkey_cache.len() as usize)
            .enumerate()
            .position(|(index, validator)| {
                pubkey_cache.get_pubkey(index as u64).as_ref() != Some(&validator.pubkey)
            })
        {
            pubkey_cache.truncate(diverged_at as u64);
        }
        for (index, validator) in state
            .validators()
            .iter()
            .enumerate()
            .skip(pubkey_cache.len() as usize)
        {
            pubkey_cache.insert(index as u64, validator.pubkey.clone())?;
        }

        let epoch = state.get_current_epoch(spec);
        let current_shuffling = Arc::new(ShufflingEpoch::new(state, epoch, spec)?);
        let previous_shuffling = if epoch == GENESIS_EPOCH {
            current_shuffling.clone()
        } else {
            Arc::new(ShufflingEpoch::new(state, epoch - 1, spec)?)
        };
        let next_shuffling = Arc::new(ShufflingEpoch::new(state, epoch + 1, spec)?);
        let proposers = compute_proposers(state, epoch, &current_shuffling.active_indices, spec)?;

        Ok(Self {
            pubkey_cache,
            epoch,
            slots_per_epoch: spec.slots_per_epoch,
            previous_shuffling,
            current_shuffling,
            next_shuffling,
            proposers,
        })
    }

    /// Advances the context to the state's new epoch. Called once the state has crossed an epoch
    /// boundary.
    pub fn rotate<S: BeaconStateView>(
        &mut self,
        state: &S,
        spec: &ChainSpec,
    ) -> Result<(), EpochContextError> {
        let epoch = state.get_current_epoch(spec);
        if epoch != self.epoch + 1 {
            *self = Self::with_pubkey_cache(state, self.pubkey_cache.clone(), spec)?;
            return Ok(());
        }

        let next_shuffling = Arc::new(ShufflingEpoch::new(state, epoch + 1, spec)?);
        self.previous_shuffling = mem::replace(
            &mut self.current_shuffling,
            mem::replace(&mut self.next_shuffling, next_shuffling),
        );
        self.proposers =
            compute_proposers(state, epoch, &self.current_shuffling.active_indices, spec)?;
        self.epoch = epoch;
        trace!(epoch, "Rotated epochs context");
        Ok(())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn get_shuffling(&self, epoch: u64) -> Result<&ShufflingEpoch, EpochContextError> {
        if epoch == self.epoch {
            Ok(&self.current_shuffling)
        } else if epoch + 1 == self.epoch {
            Ok(&self.previous_shuffling)
        } else if epoch == self.epoch + 1 {
            Ok(&self.next_shuffling)
        } else if epoch == GENESIS_EPOCH && self.epoch == GENESIS_EPOCH {
            Ok(&self.previous_shuffling)
        } else {
            Err(EpochContextError::EpochOutOfRange {
                epoch,
                current_epoch: self.epoch,
            })
        }
    }

    /// Return the beacon committee at ``slot`` for ``index``.
    pub fn get_beacon_committee(&self, slot: u64, index: u64) -> Result<&[u64], EpochContextError> {
        self.get_shuffling(slot / self.slots_per_epoch)?
            .committee(slot, index)
    }

    pub fn get_committee_count_per_slot(&self, epoch: u64) -> Result<u64, EpochContextError> {
        Ok(self.get_shuffling(epoch)?.committees_per_slot)
    }

    /// Return the beacon proposer index at ``slot``, which must be in the current epoch.
    pub fn get_beacon_proposer(&self, slot: u64) -> Result<u64, EpochContextError> {
        let epoch = slot / self.slots_per_epoch;
        if epoch != self.epoch {
            return Err(EpochContextError::EpochOutOfRange {
                epoch,
                current_epoch: self.epoch,
            });
        }
        self.proposers
            .get((slot % self.slots_per_epoch) as usize)
            .copied()
            .ok_or(EpochContextError::NoActiveValidators(epoch))
    }

    pub fn proposers(&self) -> &[u64] {
        &self.proposers
    }
}

fn compute_proposers<S: BeaconStateView>(
    state: &S,
    epoch: u64,
    active_indices: &[u64],
    spec: &ChainSpec,
) -> Result<Vec<u64>, EpochContextError> {
    if active_indices.is_empty() {
        return Ok(vec![]);
    }
    let epoch_seed = state.get_seed(epoch, DOMAIN_BEACON_PROPOSER, spec);
    let start_slot = spec.compute_start_slot_at_epoch(epoch);
    (start_slot..start_slot + spec.slots_per_epoch)
        .map(|slot| {
            let seed = B256::from_slice(&hash(
                &[epoch_seed.as_slice(), &slot.to_le_bytes()].concat(),
            ));
            compute_proposer_index(state, active_indices, seed, spec)?
                .ok_or(EpochContextError::ProposerSelectionExhausted(slot))
        })
        .collect()
}

/// Return from ``indices`` a random index sampled by effective balance.
///
/// `Ok(None)` means the sampling bound was hit without accepting a candidate.
pub fn compute_proposer_index<S: BeaconStateView>(
    state: &S,
    indices: &[u64],
    seed: B256,
    spec: &ChainSpec,
) -> Result<Option<u64>, EpochContextError> {
    Ok(sample_by_effective_balance(state, indices, seed, 1, spec)?
        .and_then(|sample| sample.first().copied()))
}

/// Draws `count` indices from `indices`, accepting each candidate with probability
/// `effective_balance / max_effective_balance`. The same index may be drawn more than once.
///
/// Candidates are visited in shuffled order, wrapping around the list as often as needed.
/// `Ok(None)` means the sampling bound was hit first.
pub fn sample_by_effective_balance<S: BeaconStateView>(
    state: &S,
    indices: &[u64],
    seed: B256,
    count: usize,
    spec: &ChainSpec,
) -> Result<Option<Vec<u64>>, EpochContextError> {
    if indices.is_empty() {
        return Err(EpochContextError::NoActiveValidators(
            state.get_current_epoch(spec),
        ));
    }
    let total = indices.len();
    let mut sample = Vec::with_capacity(count);
    let mut random_bytes = vec![];
    for i in 0..MAX_SAMPLING_ROUNDS {
        if sample.len() == count {
            return Ok(Some(sample));
        }
        let shuffled_index =
            compute_shuffled_index(i % total, total, seed, spec.shuffle_round_count)
                .map_err(|err| EpochContextError::Shuffling(err.to_string()))?;
        let candidate_index = indices[shuffled_index];
        if i % 32 == 0 {
            random_bytes = hash(&[seed.as_slice(), &((i / 32) as u64).to_le_bytes()].concat());
        }
        let random_byte = random_bytes[i % 32] as u64;
        let effective_balance = state.validator(candidate_index)?.effective_balance;
        if effective_balance * MAX_RANDOM_BYTE >= spec.max_effective_balance * random_byte {
            sample.push(candidate_index);
        }
    }
    Ok((sample.len() == count).then_some(sample))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ember_bls::PubKey;
    use ember_consensus_beacon::phase0::beacon_state::BeaconState;
    use ember_consensus_misc::validator::Validator;
    use ember_network_spec::MINIMAL;

    use super::*;

    fn state_with_validators(count: u64) -> BeaconState {
        let mut state = BeaconState::default();
        for index in 0..count {
            let mut bytes = [0u8; 48];
            bytes[..8].copy_from_slice(&index.to_le_bytes());
            let mut validator = Validator::from_deposit(
                PubKey::from_bytes(&bytes).unwrap(),
                B256::ZERO,
                MINIMAL.max_effective_balance,
                MINIMAL.effective_balance_increment,
                MINIMAL.max_effective_balance,
            );
            validator.activation_eligibility_epoch = 0;
            validator.activation_epoch = 0;
            state
                .push_validator(validator, MINIMAL.max_effective_balance)
                .unwrap();
        }
        state
    }

    #[test]
    fn test_committees_cover_every_active_validator_once() {
        let state = state_with_validators(100);
        let shuffling = ShufflingEpoch::new(&state, 0, &MINIMAL).unwrap();
        let mut seen = HashSet::new();
        let mut total = 0;
        for committee in shuffling.committees() {
            total += committee.len();
            seen.extend(committee.iter().copied());
        }
        assert_eq!(total, 100);
        assert_eq!(seen, (0..100).collect::<HashSet<_>>());
    }

    #[test]
    fn test_committee_lookup_by_slot_and_index() {
        let state = state_with_validators(64);
        let ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        // 64 validators over 8 slots with a target size of 4 gives two committees per slot.
        assert_eq!(ctx.get_committee_count_per_slot(0).unwrap(), 2);
        let committee = ctx.get_beacon_committee(3, 1).unwrap();
        assert_eq!(committee.len(), 4);
        assert_eq!(
            ctx.get_beacon_committee(3, 2),
            Err(EpochContextError::CommitteeIndexOutOfRange {
                index: 2,
                committees_per_slot: 2
            })
        );
    }

    #[test]
    fn test_epochs_beyond_next_are_out_of_range() {
        let state = state_with_validators(16);
        let ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        assert!(ctx.get_shuffling(1).is_ok());
        assert_eq!(
            ctx.get_shuffling(2).err(),
            Some(EpochContextError::EpochOutOfRange {
                epoch: 2,
                current_epoch: 0
            })
        );
        assert!(ctx.get_beacon_proposer(MINIMAL.slots_per_epoch).is_err());
    }

    #[test]
    fn test_proposers_are_active_and_deterministic() {
        let state = state_with_validators(32);
        let ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        let again = EpochsContext::new(&state, &MINIMAL).unwrap();
        assert_eq!(ctx.proposers(), again.proposers());
        assert_eq!(ctx.proposers().len(), MINIMAL.slots_per_epoch as usize);
        assert!(ctx.proposers().iter().all(|&index| index < 32));
    }

    #[test]
    fn test_rotation_matches_fresh_context() {
        let mut state = state_with_validators(40);
        let mut ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        state.slot = MINIMAL.slots_per_epoch;
        ctx.rotate(&state, &MINIMAL).unwrap();

        let fresh = EpochsContext::new(&state, &MINIMAL).unwrap();
        assert_eq!(ctx.epoch(), 1);
        assert_eq!(ctx.get_shuffling(0).unwrap(), fresh.get_shuffling(0).unwrap());
        assert_eq!(ctx.get_shuffling(1).unwrap(), fresh.get_shuffling(1).unwrap());
        assert_eq!(ctx.get_shuffling(2).unwrap(), fresh.get_shuffling(2).unwrap());
        assert_eq!(ctx.proposers(), fresh.proposers());
    }

    #[test]
    fn test_empty_registry_has_no_proposer() {
        let state = BeaconState::default();
        let ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        assert_eq!(
            ctx.get_beacon_proposer(0),
            Err(EpochContextError::NoActiveValidators(0))
        );
    }

    fn validator_with_key(byte: u8) -> Validator {
        let mut validator = Validator::from_deposit(
            PubKey::from_bytes(&[byte; 48]).unwrap(),
            B256::ZERO,
            MINIMAL.max_effective_balance,
            MINIMAL.effective_balance_increment,
            MINIMAL.max_effective_balance,
        );
        validator.activation_eligibility_epoch = 0;
        validator.activation_epoch = 0;
        validator
    }

    #[test]
    fn test_cache_reused_on_shorter_branch_accepts_deposit() {
        let base = state_with_validators(10);
        let base_ctx = EpochsContext::new(&base, &MINIMAL).unwrap();

        // Two branches each register a different validator at index 10.
        let mut branch_a = base.clone();
        branch_a
            .push_validator(validator_with_key(0xaa), MINIMAL.max_effective_balance)
            .unwrap();
        let mut branch_b = base.clone();
        branch_b
            .push_validator(validator_with_key(0xbb), MINIMAL.max_effective_balance)
            .unwrap();
        let ctx_a =
            EpochsContext::with_pubkey_cache(&branch_a, base_ctx.pubkey_cache.clone(), &MINIMAL)
                .unwrap();
        let ctx_b =
            EpochsContext::with_pubkey_cache(&branch_b, base_ctx.pubkey_cache.clone(), &MINIMAL)
                .unwrap();
        assert_eq!(ctx_a.pubkey_cache.get_index(&branch_a.validators[10].pubkey), Some(10));
        assert_eq!(ctx_b.pubkey_cache.get_index(&branch_b.validators[10].pubkey), Some(10));

        // Reuse branch B's cache for an older state with only 8 validators.
        let mut shorter = state_with_validators(8);
        let reused =
            EpochsContext::with_pubkey_cache(&shorter, ctx_b.pubkey_cache.clone(), &MINIMAL)
                .unwrap();
        assert_eq!(reused.pubkey_cache.len(), 8);
        assert_eq!(reused.pubkey_cache.get_index(&branch_b.validators[10].pubkey), None);
        assert_eq!(reused.pubkey_cache.get_index(&base.validators[8].pubkey), None);

        // A deposit on the shorter state lands at index 8.
        let mut after_deposit = reused.clone();
        let deposited = validator_with_key(0xcc);
        after_deposit
            .pubkey_cache
            .insert(8, deposited.pubkey.clone())
            .unwrap();
        assert_eq!(after_deposit.pubkey_cache.get_index(&deposited.pubkey), Some(8));
        assert_eq!(after_deposit.pubkey_cache.get_index(&base.validators[8].pubkey), None);

        // Rotating onto a non-contiguous epoch takes the same rebuild path.
        shorter
            .push_validator(deposited.clone(), MINIMAL.max_effective_balance)
            .unwrap();
        shorter.slot = 3 * MINIMAL.slots_per_epoch;
        let mut rotated = ctx_b.clone();
        rotated.rotate(&shorter, &MINIMAL).unwrap();
        assert_eq!(rotated.epoch(), 3);
        assert_eq!(rotated.pubkey_cache.len(), 9);
        assert_eq!(rotated.pubkey_cache.get_index(&deposited.pubkey), Some(8));
        assert_eq!(rotated.pubkey_cache.get_index(&branch_b.validators[10].pubkey), None);

        // The other branches still resolve their own validators.
        assert_eq!(ctx_a.pubkey_cache.get_index(&branch_a.validators[10].pubkey), Some(10));
        assert_eq!(ctx_a.pubkey_cache.get_index(&base.validators[8].pubkey), Some(8));
        assert_eq!(ctx_b.pubkey_cache.get_index(&deposited.pubkey), None);
    }
}
