use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum BeaconStateError {
    #[error("unknown validator index {0}")]
    UnknownValidator(u64),
    #[error("slot {slot} is not within the block root history of a state at slot {state_slot}")]
    SlotOutOfRange { slot: u64, state_slot: u64 },
    #[error("{0} list is full")]
    ListFull(&'static str),
    #[error("registry lists diverged: {validators} validators, {balances} balances, {extra} per-validator records")]
    RegistryLengthMismatch {
        validators: usize,
        balances: usize,
        extra: usize,
    },
    #[error("balance of validator {0} overflowed")]
    BalanceOverflow(u64),
    #[error("no active validators at epoch {0}")]
    NoActiveValidators(u64),
    #[error("state is at fork {actual}, expected {expected}")]
    WrongFork {
        expected: ember_consensus_misc::fork::ForkName,
        actual: ember_consensus_misc::fork::ForkName,
    },
}
