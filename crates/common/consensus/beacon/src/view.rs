//! Capability traits over the fork-specific state containers.
//!
//! `BeaconStateView` is the surface every fork shares. Participation bookkeeping differs between
//! forks and lives in the extension traits `PendingAttestationsView` (phase0) and
//! `ParticipationView` (altair).

use alloy_primitives::{B256, aliases::B32};
use ember_consensus_misc::{
    beacon_block_header::BeaconBlockHeader,
    checkpoint::Checkpoint,
    constants::{
        EPOCHS_PER_HISTORICAL_VECTOR, EPOCHS_PER_SLASHINGS_VECTOR, GENESIS_EPOCH,
        SLOTS_PER_HISTORICAL_ROOT,
    },
    eth_1_data::Eth1Data,
    fork::{Fork, ForkName},
    misc::compute_domain,
    pending_attestation::PendingAttestation,
    sync_committee::SyncCommittee,
    validator::Validator,
};
use ember_network_spec::ChainSpec;
use ethereum_hashing::hash;
use ssz_types::{
    BitVector, FixedVector, VariableList,
    typenum::{U4, U2048, U4096, U8192, U65536, U16777216, U1099511627776},
};
use tree_hash::TreeHash;

use crate::{errors::BeaconStateError, flat_validator::FlatValidator};

pub type Validators = VariableList<Validator, U1099511627776>;
pub type Balances = VariableList<u64, U1099511627776>;
pub type RootsVector = FixedVector<B256, U8192>;
pub type HistoricalRoots = VariableList<B256, U16777216>;
pub type Eth1DataVotes = VariableList<Eth1Data, U2048>;
pub type RandaoMixes = FixedVector<B256, U65536>;
pub type Slashings = FixedVector<u64, U8192>;
pub type JustificationBits = BitVector<U4>;
pub type EpochAttestations = VariableList<PendingAttestation, U4096>;
pub type EpochParticipation = VariableList<u8, U1099511627776>;
pub type InactivityScores = VariableList<u64, U1099511627776>;

pub trait BeaconStateView: Clone + TreeHash + Send + Sync {
    fn fork_name(&self) -> ForkName;

    fn genesis_time(&self) -> u64;
    fn genesis_validators_root(&self) -> B256;
    fn slot(&self) -> u64;
    fn slot_mut(&mut self) -> &mut u64;
    fn fork(&self) -> &Fork;
    fn fork_mut(&mut self) -> &mut Fork;

    fn latest_block_header(&self) -> &BeaconBlockHeader;
    fn latest_block_header_mut(&mut self) -> &mut BeaconBlockHeader;
    fn block_roots(&self) -> &RootsVector;
    fn block_roots_mut(&mut self) -> &mut RootsVector;
    fn state_roots(&self) -> &RootsVector;
    fn state_roots_mut(&mut self) -> &mut RootsVector;
    fn historical_roots(&self) -> &HistoricalRoots;
    fn historical_roots_mut(&mut self) -> &mut HistoricalRoots;

    fn eth1_data(&self) -> &Eth1Data;
    fn eth1_data_mut(&mut self) -> &mut Eth1Data;
    fn eth1_data_votes(&self) -> &Eth1DataVotes;
    fn eth1_data_votes_mut(&mut self) -> &mut Eth1DataVotes;
    fn eth1_deposit_index(&self) -> u64;
    fn eth1_deposit_index_mut(&mut self) -> &mut u64;

    fn validators(&self) -> &Validators;
    fn validators_mut(&mut self) -> &mut Validators;
    fn balances(&self) -> &Balances;
    fn balances_mut(&mut self) -> &mut Balances;

    fn randao_mixes(&self) -> &RandaoMixes;
    fn randao_mixes_mut(&mut self) -> &mut RandaoMixes;
    fn slashings(&self) -> &Slashings;
    fn slashings_mut(&mut self) -> &mut Slashings;

    fn justification_bits(&self) -> &JustificationBits;
    fn justification_bits_mut(&mut self) -> &mut JustificationBits;
    fn previous_justified_checkpoint(&self) -> &Checkpoint;
    fn previous_justified_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn current_justified_checkpoint(&self) -> &Checkpoint;
    fn current_justified_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn finalized_checkpoint(&self) -> &Checkpoint;
    fn finalized_checkpoint_mut(&mut self) -> &mut Checkpoint;

    /// Appends a validator to the registry together with every list indexed in parallel with it.
    /// Either all of them grow by one or none does.
    fn push_validator(&mut self, validator: Validator, balance: u64)
    -> Result<(), BeaconStateError>;

    /// Commitment root of the whole state.
    fn state_root(&self) -> B256 {
        self.tree_hash_root()
    }

    fn get_current_epoch(&self, spec: &ChainSpec) -> u64 {
        spec.compute_epoch_at_slot(self.slot())
    }

    /// Return the previous epoch (unless the current epoch is ``GENESIS_EPOCH``).
    fn get_previous_epoch(&self, spec: &ChainSpec) -> u64 {
        let current_epoch = self.get_current_epoch(spec);
        if current_epoch == GENESIS_EPOCH {
            GENESIS_EPOCH
        } else {
            current_epoch - 1
        }
    }

    fn validator(&self, index: u64) -> Result<&Validator, BeaconStateError> {
        self.validators()
            .get(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))
    }

    fn validator_mut(&mut self, index: u64) -> Result<&mut Validator, BeaconStateError> {
        self.validators_mut()
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))
    }

    fn balance(&self, index: u64) -> Result<u64, BeaconStateError> {
        self.balances()
            .get(index as usize)
            .copied()
            .ok_or(BeaconStateError::UnknownValidator(index))
    }

    /// Increase the validator balance at index ``index`` by ``delta``.
    fn increase_balance(&mut self, index: u64, delta: u64) -> Result<(), BeaconStateError> {
        let balance = self
            .balances_mut()
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))?;
        *balance = balance
            .checked_add(delta)
            .ok_or(BeaconStateError::BalanceOverflow(index))?;
        Ok(())
    }

    /// Decrease the validator balance at index ``index`` by ``delta``, with underflow protection.
    fn decrease_balance(&mut self, index: u64, delta: u64) -> Result<(), BeaconStateError> {
        let balance = self
            .balances_mut()
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))?;
        *balance = balance.saturating_sub(delta);
        Ok(())
    }

    /// Return the block root at a recent ``slot``.
    fn get_block_root_at_slot(&self, slot: u64) -> Result<B256, BeaconStateError> {
        let state_slot = self.slot();
        if !(slot < state_slot && state_slot <= slot + SLOTS_PER_HISTORICAL_ROOT) {
            return Err(BeaconStateError::SlotOutOfRange { slot, state_slot });
        }
        Ok(self.block_roots()[(slot % SLOTS_PER_HISTORICAL_ROOT) as usize])
    }

    /// Return the block root at the start of a recent ``epoch``.
    fn get_block_root(&self, epoch: u64, spec: &ChainSpec) -> Result<B256, BeaconStateError> {
        self.get_block_root_at_slot(spec.compute_start_slot_at_epoch(epoch))
    }

    /// Return the randao mix at a recent ``epoch``.
    fn get_randao_mix(&self, epoch: u64) -> B256 {
        self.randao_mixes()[(epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize]
    }

    fn get_slashings_sum(&self) -> u64 {
        self.slashings().iter().sum()
    }

    fn slashings_index(&self, epoch: u64) -> usize {
        (epoch % EPOCHS_PER_SLASHINGS_VECTOR) as usize
    }

    /// Return the sequence of active validator indices at ``epoch``.
    fn get_active_validator_indices(&self, epoch: u64) -> Vec<u64> {
        self.validators()
            .iter()
            .enumerate()
            .filter(|(_, validator)| validator.is_active_validator(epoch))
            .map(|(index, _)| index as u64)
            .collect()
    }

    /// Return the validator churn limit for the current epoch.
    fn get_validator_churn_limit(&self, spec: &ChainSpec) -> u64 {
        let active_validator_count = self
            .validators()
            .iter()
            .filter(|validator| validator.is_active_validator(self.get_current_epoch(spec)))
            .count() as u64;
        spec.min_per_epoch_churn_limit
            .max(active_validator_count / spec.churn_limit_quotient)
    }

    /// Return the seed at ``epoch``.
    fn get_seed(&self, epoch: u64, domain_type: B32, spec: &ChainSpec) -> B256 {
        let mix = self.get_randao_mix(
            epoch + EPOCHS_PER_HISTORICAL_VECTOR - spec.min_seed_lookahead - 1,
        );
        let mut preimage = Vec::with_capacity(4 + 8 + 32);
        preimage.extend_from_slice(domain_type.as_slice());
        preimage.extend_from_slice(&epoch.to_le_bytes());
        preimage.extend_from_slice(mix.as_slice());
        B256::from_slice(&hash(&preimage))
    }

    /// Return the number of committees in each slot for the given ``epoch``.
    fn get_committee_count_per_slot(&self, epoch: u64, spec: &ChainSpec) -> u64 {
        committee_count_per_slot(
            self.get_active_validator_indices(epoch).len() as u64,
            spec,
        )
    }

    /// Return the combined effective balance of the ``indices``.
    /// ``EFFECTIVE_BALANCE_INCREMENT`` Gwei minimum to avoid divisions by zero.
    fn get_total_balance<I: IntoIterator<Item = u64>>(
        &self,
        indices: I,
        spec: &ChainSpec,
    ) -> Result<u64, BeaconStateError> {
        let mut total = 0u64;
        for index in indices {
            total += self.validator(index)?.effective_balance;
        }
        Ok(total.max(spec.effective_balance_increment))
    }

    /// Return the combined effective balance of the active validators.
    fn get_total_active_balance(&self, spec: &ChainSpec) -> u64 {
        let epoch = self.get_current_epoch(spec);
        let total: u64 = self
            .validators()
            .iter()
            .filter(|validator| validator.is_active_validator(epoch))
            .map(|validator| validator.effective_balance)
            .sum();
        total.max(spec.effective_balance_increment)
    }

    /// Return the signature domain (fork version concatenated with domain type) of a message.
    fn get_domain(&self, domain_type: B32, epoch: Option<u64>, spec: &ChainSpec) -> B256 {
        let epoch = epoch.unwrap_or_else(|| self.get_current_epoch(spec));
        compute_domain(
            domain_type,
            self.fork().version_at(epoch),
            self.genesis_validators_root(),
        )
    }

    fn get_finality_delay(&self, spec: &ChainSpec) -> u64 {
        self.get_previous_epoch(spec)
            .saturating_sub(self.finalized_checkpoint().epoch)
    }

    fn is_in_inactivity_leak(&self, spec: &ChainSpec) -> bool {
        self.get_finality_delay(spec) > spec.min_epochs_to_inactivity_penalty
    }

    /// Copies the registry into a flat, pubkey-free form for bulk epoch processing.
    fn flatten_validators(&self) -> Vec<FlatValidator> {
        self.validators().iter().map(FlatValidator::from).collect()
    }
}

/// Committees per slot for an epoch with `active_validator_count` active validators.
pub fn committee_count_per_slot(active_validator_count: u64, spec: &ChainSpec) -> u64 {
    (active_validator_count / spec.slots_per_epoch / spec.target_committee_size)
        .clamp(1, spec.max_committees_per_slot)
}

/// Phase0 participation: attestations are stored whole until the epoch transition.
pub trait PendingAttestationsView: BeaconStateView {
    fn previous_epoch_attestations(&self) -> &EpochAttestations;
    fn previous_epoch_attestations_mut(&mut self) -> &mut EpochAttestations;
    fn current_epoch_attestations(&self) -> &EpochAttestations;
    fn current_epoch_attestations_mut(&mut self) -> &mut EpochAttestations;
}

/// Altair participation: one flag byte per validator per epoch, plus the fields introduced with it.
pub trait ParticipationView: BeaconStateView {
    fn previous_epoch_participation(&self) -> &EpochParticipation;
    fn previous_epoch_participation_mut(&mut self) -> &mut EpochParticipation;
    fn current_epoch_participation(&self) -> &EpochParticipation;
    fn current_epoch_participation_mut(&mut self) -> &mut EpochParticipation;
    fn inactivity_scores(&self) -> &InactivityScores;
    fn inactivity_scores_mut(&mut self) -> &mut InactivityScores;
    fn current_sync_committee(&self) -> &SyncCommittee;
    fn current_sync_committee_mut(&mut self) -> &mut SyncCommittee;
    fn next_sync_committee(&self) -> &SyncCommittee;
    fn next_sync_committee_mut(&mut self) -> &mut SyncCommittee;
}

/// Implements the field accessors of `BeaconStateView` for a state container with the standard
/// field names. Fork-specific trait items are passed through as the trailing block.
#[macro_export]
macro_rules! impl_beacon_state_view {
    ($state:ty, $fork:expr, { $($extra:tt)* }) => {
        impl $crate::view::BeaconStateView for $state {
            fn fork_name(&self) -> ::ember_consensus_misc::fork::ForkName {
                $fork
            }

            fn genesis_time(&self) -> u64 {
                self.genesis_time
            }

            fn genesis_validators_root(&self) -> ::alloy_primitives::B256 {
                self.genesis_validators_root
            }

            fn slot(&self) -> u64 {
                self.slot
            }

            fn slot_mut(&mut self) -> &mut u64 {
                &mut self.slot
            }

            fn fork(&self) -> &::ember_consensus_misc::fork::Fork {
                &self.fork
            }

            fn fork_mut(&mut self) -> &mut ::ember_consensus_misc::fork::Fork {
                &mut self.fork
            }

            fn latest_block_header(
                &self,
            ) -> &::ember_consensus_misc::beacon_block_header::BeaconBlockHeader {
                &self.latest_block_header
            }

            fn latest_block_header_mut(
                &mut self,
            ) -> &mut ::ember_consensus_misc::beacon_block_header::BeaconBlockHeader {
                &mut self.latest_block_header
            }

            fn block_roots(&self) -> &$crate::view::RootsVector {
                &self.block_roots
            }

            fn block_roots_mut(&mut self) -> &mut $crate::view::RootsVector {
                &mut self.block_roots
            }

            fn state_roots(&self) -> &$crate::view::RootsVector {
                &self.state_roots
            }

            fn state_roots_mut(&mut self) -> &mut $crate::view::RootsVector {
                &mut self.state_roots
            }

            fn historical_roots(&self) -> &$crate::view::HistoricalRoots {
                &self.historical_roots
            }

            fn historical_roots_mut(&mut self) -> &mut $crate::view::HistoricalRoots {
                &mut self.historical_roots
            }

            fn eth1_data(&self) -> &::ember_consensus_misc::eth_1_data::Eth1Data {
                &self.eth1_data
            }

            fn eth1_data_mut(&mut self) -> &mut ::ember_consensus_misc::eth_1_data::Eth1Data {
                &mut self.eth1_data
            }

            fn eth1_data_votes(&self) -> &$crate::view::Eth1DataVotes {
                &self.eth1_data_votes
            }

            fn eth1_data_votes_mut(&mut self) -> &mut $crate::view::Eth1DataVotes {
                &mut self.eth1_data_votes
            }

            fn eth1_deposit_index(&self) -> u64 {
                self.eth1_deposit_index
            }

            fn eth1_deposit_index_mut(&mut self) -> &mut u64 {
                &mut self.eth1_deposit_index
            }

            fn validators(&self) -> &$crate::view::Validators {
                &self.validators
            }

            fn validators_mut(&mut self) -> &mut $crate::view::Validators {
                &mut self.validators
            }

            fn balances(&self) -> &$crate::view::Balances {
                &self.balances
            }

            fn balances_mut(&mut self) -> &mut $crate::view::Balances {
                &mut self.balances
            }

            fn randao_mixes(&self) -> &$crate::view::RandaoMixes {
                &self.randao_mixes
            }

            fn randao_mixes_mut(&mut self) -> &mut $crate::view::RandaoMixes {
                &mut self.randao_mixes
            }

            fn slashings(&self) -> &$crate::view::Slashings {
                &self.slashings
            }

            fn slashings_mut(&mut self) -> &mut $crate::view::Slashings {
                &mut self.slashings
            }

            fn justification_bits(&self) -> &$crate::view::JustificationBits {
                &self.justification_bits
            }

            fn justification_bits_mut(&mut self) -> &mut $crate::view::JustificationBits {
                &mut self.justification_bits
            }

            fn previous_justified_checkpoint(
                &self,
            ) -> &::ember_consensus_misc::checkpoint::Checkpoint {
                &self.previous_justified_checkpoint
            }

            fn previous_justified_checkpoint_mut(
                &mut self,
            ) -> &mut ::ember_consensus_misc::checkpoint::Checkpoint {
                &mut self.previous_justified_checkpoint
            }

            fn current_justified_checkpoint(
                &self,
            ) -> &::ember_consensus_misc::checkpoint::Checkpoint {
                &self.current_justified_checkpoint
            }

            fn current_justified_checkpoint_mut(
                &mut self,
            ) -> &mut ::ember_consensus_misc::checkpoint::Checkpoint {
                &mut self.current_justified_checkpoint
            }

            fn finalized_checkpoint(&self) -> &::ember_consensus_misc::checkpoint::Checkpoint {
                &self.finalized_checkpoint
            }

            fn finalized_checkpoint_mut(
                &mut self,
            ) -> &mut ::ember_consensus_misc::checkpoint::Checkpoint {
                &mut self.finalized_checkpoint
            }

            $($extra)*
        }
    };
}
