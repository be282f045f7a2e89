use alloy_primitives::B256;
use ember_consensus_misc::{
    beacon_block_header::BeaconBlockHeader, checkpoint::Checkpoint, eth_1_data::Eth1Data,
    fork::Fork, validator::Validator,
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
    view::{
        Balances, EpochAttestations, Eth1DataVotes, HistoricalRoots, JustificationBits,
        PendingAttestationsView, RandaoMixes, RootsVector, Slashings, Validators,
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

    // Attestations
    pub previous_epoch_attestations: EpochAttestations,
    pub current_epoch_attestations: EpochAttestations,

    // Finality
    pub justification_bits: JustificationBits,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
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
            previous_epoch_attestations: VariableList::default(),
            current_epoch_attestations: VariableList::default(),
            justification_bits: BitVector::new(),
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
        }
    }
}

impl_beacon_state_view!(BeaconState, ::ember_consensus_misc::fork::ForkName::Phase0, {
    fn push_validator(
        &mut self,
        validator: Validator,
        balance: u64,
    ) -> Result<(), BeaconStateError> {
        if self.validators.len() != self.balances.len() {
            return Err(BeaconStateError::RegistryLengthMismatch {
                validators: self.validators.len(),
                balances: self.balances.len(),
                extra: self.balances.len(),
            });
        }
        if self.validators.len() >= Validators::max_len() {
            return Err(BeaconStateError::ListFull("validators"));
        }
        self.validators
            .push(validator)
            .map_err(|_| BeaconStateError::ListFull("validators"))?;
        self.balances
            .push(balance)
            .map_err(|_| BeaconStateError::ListFull("balances"))
    }
});

impl PendingAttestationsView for BeaconState {
    fn previous_epoch_attestations(&self) -> &EpochAttestations {
        &self.previous_epoch_attestations
    }

    fn previous_epoch_attestations_mut(&mut self) -> &mut EpochAttestations {
        &mut self.previous_epoch_attestations
    }

    fn current_epoch_attestations(&self) -> &EpochAttestations {
        &self.current_epoch_attestations
    }

    fn current_epoch_attestations_mut(&mut self) -> &mut EpochAttestations {
        &mut self.current_epoch_attestations
    }
}
