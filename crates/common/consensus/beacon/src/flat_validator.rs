use ember_consensus_misc::validator::Validator;

/// Pubkey-free copy of a registry entry. Epoch processing walks the whole registry several times
/// and only ever reads these fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatValidator {
    pub effective_balance: u64,
    pub slashed: bool,
    pub activation_eligibility_epoch: u64,
    pub activation_epoch: u64,
    pub exit_epoch: u64,
    pub withdrawable_epoch: u64,
}

impl FlatValidator {
    pub fn is_active(&self, epoch: u64) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    pub fn is_eligible_for_rewards(&self, previous_epoch: u64) -> bool {
        self.is_active(previous_epoch)
            || (self.slashed && previous_epoch + 1 < self.withdrawable_epoch)
    }
}

impl From<&Validator> for FlatValidator {
    fn from(validator: &Validator) -> Self {
        Self {
            effective_balance: validator.effective_balance,
            slashed: validator.slashed,
            activation_eligibility_epoch: validator.activation_eligibility_epoch,
            activation_epoch: validator.activation_epoch,
            exit_epoch: validator.exit_epoch,
            withdrawable_epoch: validator.withdrawable_epoch,
        }
    }
}
