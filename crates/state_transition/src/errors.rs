use alloy_primitives::B256;
use ember_bls::errors::BLSError;
use ember_consensus_beacon::BeaconStateError;
use ember_consensus_misc::fork::ForkName;
use thiserror::Error;

/// The caller's cancellation token fired. Any partially processed state must be discarded.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("state transition cancelled")]
pub struct Cancelled;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum EpochContextError {
    #[error("epoch {epoch} is outside the cached range around epoch {current_epoch}")]
    EpochOutOfRange { epoch: u64, current_epoch: u64 },
    #[error("committee index {index} out of range, {committees_per_slot} committees per slot")]
    CommitteeIndexOutOfRange {
        index: u64,
        committees_per_slot: u64,
    },
    #[error("no active validators at epoch {0}")]
    NoActiveValidators(u64),
    #[error("proposer selection for slot {0} did not terminate")]
    ProposerSelectionExhausted(u64),
    #[error("sync committee selection for epoch {0} did not terminate")]
    SyncCommitteeSelectionExhausted(u64),
    #[error("shuffling failed: {0}")]
    Shuffling(String),
    #[error("pubkey cache has {len} entries, cannot insert index {index}")]
    PubkeyIndexGap { index: u64, len: u64 },
    #[error("pubkey is not in the registry")]
    UnknownPubkey,
    #[error("no cached pubkey for validator {0}")]
    MissingPubkey(u64),
    #[error(transparent)]
    BeaconState(#[from] BeaconStateError),
    #[error("state transition cancelled")]
    Cancelled,
}

impl From<Cancelled> for EpochContextError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum HeaderInvalid {
    #[error("block slot {block_slot} does not match state slot {state_slot}")]
    StateSlotMismatch { block_slot: u64, state_slot: u64 },
    #[error("block slot {block_slot} is not newer than the latest header at {latest_slot}")]
    OlderThanLatestBlockHeader { block_slot: u64, latest_slot: u64 },
    #[error("block proposer {block_proposer_index} is not the expected {state_proposer_index}")]
    ProposerIndexMismatch {
        block_proposer_index: u64,
        state_proposer_index: u64,
    },
    #[error("parent root {block} does not match latest header root {state}")]
    ParentBlockRootMismatch { state: B256, block: B256 },
    #[error("proposer {0} is slashed")]
    ProposerSlashed(u64),
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ProposerSlashingInvalid {
    #[error("header slots differ: {0} and {1}")]
    ProposalSlotMismatch(u64, u64),
    #[error("header proposers differ: {0} and {1}")]
    ProposerIndexMismatch(u64, u64),
    #[error("headers are identical")]
    ProposalsIdentical,
    #[error("proposer {0} is not slashable")]
    ProposerNotSlashable(u64),
    #[error("signature of header {0} is invalid")]
    BadProposal(u8),
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum AttesterSlashingInvalid {
    #[error("attestations are neither a double nor a surround vote")]
    NotSlashable,
    #[error("attestation {0} is invalid: {1}")]
    IndexedAttestationInvalid(u8, IndexedAttestationInvalid),
    #[error("no attester could be slashed")]
    NoSlashableIndices,
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum IndexedAttestationInvalid {
    #[error("no attesting indices")]
    IndicesEmpty,
    #[error("attesting indices are not sorted and unique")]
    BadValidatorIndicesOrdering,
    #[error("unknown attesting validator {0}")]
    UnknownValidator(u64),
    #[error("aggregate signature is invalid")]
    BadSignature,
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum AttestationInvalid {
    #[error("target epoch {target_epoch} is neither {previous_epoch} nor {current_epoch}")]
    BadTargetEpoch {
        target_epoch: u64,
        previous_epoch: u64,
        current_epoch: u64,
    },
    #[error("target epoch {target_epoch} does not contain slot {slot}")]
    TargetEpochSlotMismatch { target_epoch: u64, slot: u64 },
    #[error("included at {state_slot}, too early for attestation at slot {attestation_slot}")]
    IncludedTooEarly {
        state_slot: u64,
        attestation_slot: u64,
    },
    #[error("included at {state_slot}, too late for attestation at slot {attestation_slot}")]
    IncludedTooLate {
        state_slot: u64,
        attestation_slot: u64,
    },
    #[error("committee index {index} out of range, {committees_per_slot} committees per slot")]
    BadCommitteeIndex {
        index: u64,
        committees_per_slot: u64,
    },
    #[error("aggregation bits length {bitfield_len} does not match committee size {committee_len}")]
    BadAggregationBitfieldLength {
        committee_len: usize,
        bitfield_len: usize,
    },
    #[error("source checkpoint does not match the justified checkpoint")]
    WrongJustifiedCheckpoint,
    #[error("indexed attestation is invalid: {0}")]
    BadIndexedAttestation(IndexedAttestationInvalid),
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum DepositInvalid {
    #[error("merkle branch does not prove deposit {0} against the eth1 deposit root")]
    BadMerkleProof(u64),
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ExitInvalid {
    #[error("validator {0} is not active")]
    NotActive(u64),
    #[error("validator {0} has already initiated an exit")]
    AlreadyExited(u64),
    #[error("exit epoch {exit_epoch} is in the future, current epoch is {current_epoch}")]
    FutureEpoch { current_epoch: u64, exit_epoch: u64 },
    #[error("validator has been active for too short, eligible to exit at epoch {0}")]
    TooYoungToExit(u64),
    #[error("exit signature is invalid")]
    BadSignature,
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum SyncAggregateInvalid {
    #[error("sync committee signature is invalid")]
    SignatureInvalid,
    #[error("sync committee member is not in the registry")]
    UnknownMember,
}

/// Failure of a single block operation, before it is tagged with the operation's position.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum BlockOperationError<T> {
    Invalid(T),
    BeaconState(BeaconStateError),
    EpochContext(EpochContextError),
    Cancelled,
}

impl<T> BlockOperationError<T> {
    pub fn invalid(reason: T) -> Self {
        Self::Invalid(reason)
    }

    /// Re-tags the invalidity reason, e.g. to wrap a nested operation's failure.
    pub fn map_invalid<U>(self, f: impl FnOnce(T) -> U) -> BlockOperationError<U> {
        match self {
            Self::Invalid(reason) => BlockOperationError::Invalid(f(reason)),
            Self::BeaconState(err) => BlockOperationError::BeaconState(err),
            Self::EpochContext(err) => BlockOperationError::EpochContext(err),
            Self::Cancelled => BlockOperationError::Cancelled,
        }
    }
}

impl<T> From<BeaconStateError> for BlockOperationError<T> {
    fn from(err: BeaconStateError) -> Self {
        Self::BeaconState(err)
    }
}

impl<T> From<EpochContextError> for BlockOperationError<T> {
    fn from(err: EpochContextError) -> Self {
        Self::EpochContext(err)
    }
}

impl<T> From<Cancelled> for BlockOperationError<T> {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum BlockProcessingError {
    #[error("invalid block header: {0}")]
    HeaderInvalid(HeaderInvalid),
    #[error("randao reveal signature is invalid")]
    RandaoSignatureInvalid,
    #[error("eth1 data vote list is full")]
    Eth1DataVotesFull,
    #[error("block carries {found} {kind}, at most {max} allowed")]
    TooManyOperations {
        kind: &'static str,
        found: usize,
        max: u64,
    },
    #[error("block carries {found} deposits, expected {expected}")]
    DepositCountInvalid { expected: u64, found: u64 },
    #[error("proposer slashing {index} is invalid: {reason}")]
    ProposerSlashingInvalid {
        index: usize,
        reason: ProposerSlashingInvalid,
    },
    #[error("attester slashing {index} is invalid: {reason}")]
    AttesterSlashingInvalid {
        index: usize,
        reason: AttesterSlashingInvalid,
    },
    #[error("attestation {index} is invalid: {reason}")]
    AttestationInvalid {
        index: usize,
        reason: AttestationInvalid,
    },
    #[error("deposit {index} is invalid: {reason}")]
    DepositInvalid {
        index: usize,
        reason: DepositInvalid,
    },
    #[error("voluntary exit {index} is invalid: {reason}")]
    ExitInvalid { index: usize, reason: ExitInvalid },
    #[error("sync aggregate is invalid: {0}")]
    SyncAggregateInvalid(SyncAggregateInvalid),
    #[error(transparent)]
    BeaconState(#[from] BeaconStateError),
    #[error(transparent)]
    EpochContext(#[from] EpochContextError),
    #[error("state transition cancelled")]
    Cancelled,
}

impl From<Cancelled> for BlockProcessingError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<BlockOperationError<HeaderInvalid>> for BlockProcessingError {
    fn from(err: BlockOperationError<HeaderInvalid>) -> Self {
        match err {
            BlockOperationError::Invalid(reason) => Self::HeaderInvalid(reason),
            BlockOperationError::BeaconState(err) => Self::BeaconState(err),
            BlockOperationError::EpochContext(err) => Self::EpochContext(err),
            BlockOperationError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<BlockOperationError<SyncAggregateInvalid>> for BlockProcessingError {
    fn from(err: BlockOperationError<SyncAggregateInvalid>) -> Self {
        match err {
            BlockOperationError::Invalid(reason) => Self::SyncAggregateInvalid(reason),
            BlockOperationError::BeaconState(err) => Self::BeaconState(err),
            BlockOperationError::EpochContext(err) => Self::EpochContext(err),
            BlockOperationError::Cancelled => Self::Cancelled,
        }
    }
}

/// Attaches the position of the failing operation within the block body.
pub trait IntoWithIndex<V>: Sized {
    fn into_with_index(self, index: usize) -> V;
}

macro_rules! impl_into_block_processing_error_with_index {
    ($($type: ident),*) => {
        $(
            impl IntoWithIndex<BlockProcessingError> for BlockOperationError<$type> {
                fn into_with_index(self, index: usize) -> BlockProcessingError {
                    match self {
                        BlockOperationError::Invalid(reason) => BlockProcessingError::$type {
                            index,
                            reason,
                        },
                        BlockOperationError::BeaconState(err) => {
                            BlockProcessingError::BeaconState(err)
                        }
                        BlockOperationError::EpochContext(err) => {
                            BlockProcessingError::EpochContext(err)
                        }
                        BlockOperationError::Cancelled => BlockProcessingError::Cancelled,
                    }
                }
            }
        )*
    };
}

impl_into_block_processing_error_with_index!(
    ProposerSlashingInvalid,
    AttesterSlashingInvalid,
    AttestationInvalid,
    DepositInvalid,
    ExitInvalid
);

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum EpochProcessingError {
    #[error("{kind} deltas cover {deltas} validators, registry has {validators}")]
    DeltasLengthMismatch {
        kind: &'static str,
        deltas: usize,
        validators: usize,
    },
    #[error("historical roots accumulator is full")]
    HistoricalRootsFull,
    #[error("justification bits update failed: {0}")]
    JustificationBits(String),
    #[error("stored pending attestation is invalid: {0}")]
    PendingAttestationInvalid(AttestationInvalid),
    #[error("sync committee aggregation failed: {0}")]
    SyncCommitteeAggregation(String),
    #[error(transparent)]
    BeaconState(#[from] BeaconStateError),
    #[error(transparent)]
    EpochContext(#[from] EpochContextError),
    #[error("state transition cancelled")]
    Cancelled,
}

impl From<Cancelled> for EpochProcessingError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<BLSError> for EpochProcessingError {
    fn from(err: BLSError) -> Self {
        Self::SyncCommitteeAggregation(err.to_string())
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum SlotProcessingError {
    #[error("target slot {target} is not after state slot {current}")]
    SlotNotIncreasing { target: u64, current: u64 },
    #[error("fork upgrade failed: {0}")]
    Upgrade(#[from] UpgradeError),
    #[error(transparent)]
    EpochProcessing(#[from] EpochProcessingError),
    #[error(transparent)]
    EpochContext(#[from] EpochContextError),
    #[error("state transition cancelled")]
    Cancelled,
}

impl From<Cancelled> for SlotProcessingError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum UpgradeError {
    #[error("pending attestation could not be translated: {0}")]
    Participation(AttestationInvalid),
    #[error(transparent)]
    EpochProcessing(#[from] EpochProcessingError),
    #[error(transparent)]
    BeaconState(#[from] BeaconStateError),
    #[error(transparent)]
    EpochContext(#[from] EpochContextError),
}

impl From<BlockOperationError<AttestationInvalid>> for UpgradeError {
    fn from(err: BlockOperationError<AttestationInvalid>) -> Self {
        match err {
            BlockOperationError::Invalid(reason) => Self::Participation(reason),
            BlockOperationError::BeaconState(err) => Self::BeaconState(err),
            BlockOperationError::EpochContext(err) => Self::EpochContext(err),
            BlockOperationError::Cancelled => Self::EpochProcessing(EpochProcessingError::Cancelled),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum StateTransitionError {
    #[error("block for fork {block} cannot be applied to a {state} state")]
    ForkMismatch { block: ForkName, state: ForkName },
    #[error("block signature is invalid")]
    BlockSignatureInvalid,
    #[error("state root mismatch: block declares {expected}, computed {computed}")]
    StateRootMismatch { expected: B256, computed: B256 },
    #[error(transparent)]
    SlotProcessing(#[from] SlotProcessingError),
    #[error(transparent)]
    BlockProcessing(#[from] BlockProcessingError),
    #[error(transparent)]
    EpochContext(#[from] EpochContextError),
    #[error("state transition cancelled")]
    Cancelled,
}

impl From<Cancelled> for StateTransitionError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl StateTransitionError {
    /// True when the error is the caller's own cancellation rather than a verdict on the block.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::SlotProcessing(SlotProcessingError::Cancelled)
                | Self::SlotProcessing(SlotProcessingError::EpochProcessing(
                    EpochProcessingError::Cancelled
                ))
                | Self::BlockProcessing(BlockProcessingError::Cancelled)
        )
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum GenesisError {
    #[error("deposit tree: {0}")]
    DepositTree(String),
    #[error(transparent)]
    BlockProcessing(#[from] BlockProcessingError),
    #[error(transparent)]
    EpochContext(#[from] EpochContextError),
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
}
