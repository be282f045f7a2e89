use ember_consensus_misc::checkpoint::Checkpoint;

/// Balances and checkpoints observed while processing one epoch. All balances are in Gwei and
/// already floored at one effective balance increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochProcessingSummary {
    /// The epoch that was processed, i.e. the state's current epoch before the transition.
    pub epoch: u64,
    pub total_active_balance: u64,
    pub previous_epoch_source_attesting_balance: u64,
    pub previous_epoch_target_attesting_balance: u64,
    pub previous_epoch_head_attesting_balance: u64,
    pub current_epoch_target_attesting_balance: u64,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl EpochProcessingSummary {
    /// Whether the previous epoch's target reached a two-thirds supermajority.
    pub fn is_previous_epoch_target_supermajority(&self) -> bool {
        self.previous_epoch_target_attesting_balance * 3 >= self.total_active_balance * 2
    }
}
