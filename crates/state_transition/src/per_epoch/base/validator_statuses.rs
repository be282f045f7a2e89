use ember_consensus_beacon::{
    BeaconStateError,
    view::{BeaconStateView, PendingAttestationsView},
};
use ember_consensus_misc::pending_attestation::PendingAttestation;
use ember_network_spec::ChainSpec;

use crate::{
    common::get_attesting_indices, context::TransitionContext, epoch_context::EpochsContext,
    errors::EpochProcessingError,
};

/// The earliest inclusion of a validator's previous-epoch attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionInfo {
    /// Slots between the attestation and the block that included it.
    pub delay: u64,
    /// Proposer of the including block.
    pub proposer_index: u64,
}

/// Participation of one validator over the previous and current epoch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidatorStatus {
    pub is_slashed: bool,
    pub is_active_in_current_epoch: bool,
    pub is_active_in_previous_epoch: bool,
    /// Active in the previous epoch, or slashed and not yet withdrawable.
    pub is_eligible: bool,
    pub effective_balance: u64,

    pub is_previous_epoch_source_attester: bool,
    pub is_previous_epoch_target_attester: bool,
    pub is_previous_epoch_head_attester: bool,
    pub is_current_epoch_source_attester: bool,
    pub is_current_epoch_target_attester: bool,

    pub inclusion_info: Option<InclusionInfo>,
}

impl ValidatorStatus {
    pub fn is_unslashed_previous_source_attester(&self) -> bool {
        !self.is_slashed && self.is_previous_epoch_source_attester
    }

    pub fn is_unslashed_previous_target_attester(&self) -> bool {
        !self.is_slashed && self.is_previous_epoch_target_attester
    }

    pub fn is_unslashed_previous_head_attester(&self) -> bool {
        !self.is_slashed && self.is_previous_epoch_head_attester
    }
}

/// Summed effective balances of the validator sets the epoch transition weighs. Every accessor
/// returns at least one effective balance increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalBalances {
    effective_balance_increment: u64,
    current_epoch: u64,
    previous_epoch: u64,
    previous_epoch_source_attesters: u64,
    previous_epoch_target_attesters: u64,
    previous_epoch_head_attesters: u64,
    current_epoch_target_attesters: u64,
}

macro_rules! balance_accessor {
    ($field_name:ident) => {
        pub fn $field_name(&self) -> u64 {
            self.$field_name.max(self.effective_balance_increment)
        }
    };
}

impl TotalBalances {
    fn new(spec: &ChainSpec) -> Self {
        Self {
            effective_balance_increment: spec.effective_balance_increment,
            current_epoch: 0,
            previous_epoch: 0,
            previous_epoch_source_attesters: 0,
            previous_epoch_target_attesters: 0,
            previous_epoch_head_attesters: 0,
            current_epoch_target_attesters: 0,
        }
    }

    balance_accessor!(current_epoch);
    balance_accessor!(previous_epoch);
    balance_accessor!(previous_epoch_source_attesters);
    balance_accessor!(previous_epoch_target_attesters);
    balance_accessor!(previous_epoch_head_attesters);
    balance_accessor!(current_epoch_target_attesters);
}

/// Phase0 participation of the whole registry, derived from the state's pending attestations.
#[derive(Debug, Clone)]
pub struct ValidatorStatuses {
    pub statuses: Vec<ValidatorStatus>,
    pub total_balances: TotalBalances,
}

impl ValidatorStatuses {
    pub fn new<S: PendingAttestationsView>(
        state: &S,
        epochs_ctx: &EpochsContext,
        ctx: &TransitionContext,
    ) -> Result<Self, EpochProcessingError> {
        let spec = ctx.spec;
        let current_epoch = state.get_current_epoch(spec);
        let previous_epoch = state.get_previous_epoch(spec);
        let mut total_balances = TotalBalances::new(spec);

        let mut statuses = Vec::with_capacity(state.validators().len());
        for (index, validator) in state.flatten_validators().into_iter().enumerate() {
            ctx.check_cancelled_at(index)?;
            let status = ValidatorStatus {
                is_slashed: validator.slashed,
                is_active_in_current_epoch: validator.is_active(current_epoch),
                is_active_in_previous_epoch: validator.is_active(previous_epoch),
                is_eligible: validator.is_eligible_for_rewards(previous_epoch),
                effective_balance: validator.effective_balance,
                ..ValidatorStatus::default()
            };
            if status.is_active_in_current_epoch {
                total_balances.current_epoch += validator.effective_balance;
            }
            if status.is_active_in_previous_epoch {
                total_balances.previous_epoch += validator.effective_balance;
            }
            statuses.push(status);
        }

        let mut validator_statuses = Self {
            statuses,
            total_balances,
        };
        validator_statuses.process_attestations(state, epochs_ctx, spec)?;
        Ok(validator_statuses)
    }

    fn process_attestations<S: PendingAttestationsView>(
        &mut self,
        state: &S,
        epochs_ctx: &EpochsContext,
        spec: &ChainSpec,
    ) -> Result<(), EpochProcessingError> {
        let previous_epoch_boundary_root =
            state.get_block_root(state.get_previous_epoch(spec), spec)?;
        let current_epoch_boundary_root =
            state.get_block_root(state.get_current_epoch(spec), spec)?;

        for attestation in state.previous_epoch_attestations().iter() {
            let is_target = attestation.data.target.root == previous_epoch_boundary_root;
            let is_head = is_target
                && attestation.data.beacon_block_root
                    == state.get_block_root_at_slot(attestation.data.slot)?;
            let inclusion_info = InclusionInfo {
                delay: attestation.inclusion_delay,
                proposer_index: attestation.proposer_index,
            };
            for index in self.attesting_indices(attestation, epochs_ctx)? {
                let status = self.status_mut(index)?;
                status.is_previous_epoch_source_attester = true;
                status.is_previous_epoch_target_attester |= is_target;
                status.is_previous_epoch_head_attester |= is_head;
                // The first attestation wins a tie, matching list order.
                match status.inclusion_info {
                    Some(existing) if existing.delay <= inclusion_info.delay => {}
                    _ => status.inclusion_info = Some(inclusion_info),
                }
            }
        }

        for attestation in state.current_epoch_attestations().iter() {
            let is_target = attestation.data.target.root == current_epoch_boundary_root;
            for index in self.attesting_indices(attestation, epochs_ctx)? {
                let status = self.status_mut(index)?;
                status.is_current_epoch_source_attester = true;
                status.is_current_epoch_target_attester |= is_target;
            }
        }

        // Only unslashed validators count towards the attesting totals.
        let totals = &mut self.total_balances;
        for status in self.statuses.iter().filter(|status| !status.is_slashed) {
            if status.is_previous_epoch_source_attester {
                totals.previous_epoch_source_attesters += status.effective_balance;
            }
            if status.is_previous_epoch_target_attester {
                totals.previous_epoch_target_attesters += status.effective_balance;
            }
            if status.is_previous_epoch_head_attester {
                totals.previous_epoch_head_attesters += status.effective_balance;
            }
            if status.is_current_epoch_target_attester {
                totals.current_epoch_target_attesters += status.effective_balance;
            }
        }
        Ok(())
    }

    fn attesting_indices(
        &self,
        attestation: &PendingAttestation,
        epochs_ctx: &EpochsContext,
    ) -> Result<Vec<u64>, EpochProcessingError> {
        let committee =
            epochs_ctx.get_beacon_committee(attestation.data.slot, attestation.data.index)?;
        get_attesting_indices(committee, &attestation.aggregation_bits)
            .map_err(EpochProcessingError::PendingAttestationInvalid)
    }

    fn status_mut(&mut self, index: u64) -> Result<&mut ValidatorStatus, EpochProcessingError> {
        self.statuses
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index).into())
    }
}
