use std::sync::Arc;

use alloy_primitives::B256;
use ember_consensus_misc::{
    beacon_block_header::BeaconBlockHeader, checkpoint::Checkpoint, eth_1_data::Eth1Data,
    fork::Fork, sync_committee::SyncCommittee, validator::Validator,
};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{
    BitVector, FixedVector, VariableList,
    serde_utils::{quoted_u64_fixed_vec, quoted_u64_var_list},
};
use tree_hash_derive::TreeHash;

use crate::{
    errors::BeaconStateError,
    impl_beacon_state_view,
    serde_helpers::quoted_u8_var_list,
    view::{
        Balances, EpochParticipation, Eth1DataVotes, HistoricalRoots, InactivityScores,
        JustificationBits, ParticipationView, RandaoMixes, RootsVector, Slashings, Validators,
    },
};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconState {
    // Versioning
    #[serde(with = "serde_utils::quoted_u64")]
    pub genesis_time: u64,
    pub genesis_validators_root: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    pub fork: Fork,

    // History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: RootsVector,
    pub state_roots: RootsVector,
    pub historical_roots: HistoricalRoots,

    // Eth1
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: Eth1DataVotes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub eth1_deposit_index: u64,

    // Registry
    pub validators: Validators,
    #[serde(with = "quoted_u64_var_list")]
    pub balances: Balances,

    // Randomness
    pub randao_mixes: RandaoMixes,

    // Slashings
    #[serde(with = "quoted_u64_fixed_vec")]
    pub slashings: Slashings,

    // Participation
    #[serde(with = "quoted_u8_var_list")]
    pub previous_epoch_participation: EpochParticipation,
    #[serde(with = "quoted_u8_var_list")]
    pub current_epoch_participation: EpochParticipation,

    // Finality
    pub justification_bits: JustificationBits,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    // Inactivity
    #[serde(with = "quoted_u64_var_list")]
    pub inactivity_scores: InactivityScores,

    // Sync
    pub current_sync_committee: Arc<SyncCommittee>,
    pub next_sync_committee: Arc<SyncCommittee>,
}

impl Default for BeaconState {
    fn default() -> Self {
        Self {
            genesis_time: 0,
            genesis_validators_root: B256::ZERO,
            slot: 0,
            fork: Fork::default(),
            latest_block_header: BeaconBlockHeader::default(),
            block_roots: FixedVector::default(),
            state_roots: FixedVector::default(),
            historical_roots: VariableList::default(),
            eth1_data: Eth1Data::default(),
            eth1_data_votes: VariableList::default(),
            eth1_deposit_index: 0,
            validators: VariableList::default(),
            balances: VariableList::default(),
            randao_mixes: FixedVector::default(),
            slashings: FixedVector::default(),
            previous_epoch_participation: VariableList::default(),
            current_epoch_participation: VariableList::default(),
            justification_bits: BitVector::new(),
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            inactivity_scores: VariableList::default(),
            current_sync_committee: Arc::default(),
            next_sync_committee: Arc::default(),
        }
    }
}

impl_beacon_state_view!(BeaconState, ::ember_consensus_misc::fork::ForkName::Altair, {
    fn push_validator(
        &mut self,
        validator: Validator,
        balance: u64,
    ) -> Result<(), BeaconStateError> {
        let count = self.validators.len();
        let extra = [
            self.previous_epoch_participation.len(),
            self.current_epoch_participation.len(),
            self.inactivity_scores.len(),
        ];
        if self.balances.len() != count || extra.iter().any(|&len| len != count) {
            return Err(BeaconStateError::RegistryLengthMismatch {
                validators: count,
                balances: self.balances.len(),
                extra: extra.into_iter().find(|&len| len != count).unwrap_or(count),
            });
        }
        if count >= Validators::max_len() {
            return Err(BeaconStateError::ListFull("validators"));
        }
        self.validators
            .push(validator)
            .map_err(|_| BeaconStateError::ListFull("validators"))?;
        self.balances
            .push(balance)
            .map_err(|_| BeaconStateError::ListFull("balances"))?;
        self.previous_epoch_participation
            .push(0)
            .map_err(|_| BeaconStateError::ListFull("previous_epoch_participation"))?;
        self.current_epoch_participation
            .push(0)
            .map_err(|_| BeaconStateError::ListFull("current_epoch_participation"))?;
        self.inactivity_scores
            .push(0)
            .map_err(|_| BeaconStateError::ListFull("inactivity_scores"))
    }
});

impl ParticipationView for BeaconState {
    fn previous_epoch_participation(&self) -> &EpochParticipation {
        &self.previous_epoch_participation
    }

    fn previous_epoch_participation_mut(&mut self) -> &mut EpochParticipation {
        &mut self.previous_epoch_participation
    }

    fn current_epoch_participation(&self) -> &EpochParticipation {
        &self.current_epoch_participation
    }

    fn current_epoch_participation_mut(&mut self) -> &mut EpochParticipation {
        &mut self.current_epoch_participation
    }

    fn inactivity_scores(&self) -> &InactivityScores {
        &self.inactivity_scores
    }

    fn inactivity_scores_mut(&mut self) -> &mut InactivityScores {
        &mut self.inactivity_scores
    }

    fn current_sync_committee(&self) -> &SyncCommittee {
        &self.current_sync_committee
    }

    fn current_sync_committee_mut(&mut self) -> &mut SyncCommittee {
        Arc::make_mut(&mut self.current_sync_committee)
    }

    fn next_sync_committee(&self) -> &SyncCommittee {
        &self.next_sync_committee
    }

    fn next_sync_committee_mut(&mut self) -> &mut SyncCommittee {
        Arc::make_mut(&mut self.next_sync_committee)
    }
}
