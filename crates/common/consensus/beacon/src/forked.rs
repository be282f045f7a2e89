use alloy_primitives::B256;
use ember_bls::BLSSignature;
use ember_consensus_misc::{beacon_block_header::SignedBeaconBlockHeader, fork::ForkName};
use ssz::{Decode, DecodeError, Encode};
use tree_hash::TreeHash;

use crate::{
    altair, errors::BeaconStateError, phase0,
    view::{Balances, BeaconStateView, Validators},
};

/// Runs `$body` with `$inner` bound to whichever fork-specific state `$state` holds.
#[macro_export]
macro_rules! map_forked_state {
    ($state:expr, |$inner:ident| $body:expr) => {
        match $state {
            $crate::forked::ForkedBeaconState::Phase0($inner) => $body,
            $crate::forked::ForkedBeaconState::Altair($inner) => $body,
        }
    };
}

/// A beacon state tagged with the fork it belongs to. This is the type callers hold across fork
/// boundaries; processing code works on the inner variant through the view traits.
#[derive(Debug, Clone, PartialEq)]
pub enum ForkedBeaconState {
    Phase0(phase0::beacon_state::BeaconState),
    Altair(altair::beacon_state::BeaconState),
}

impl ForkedBeaconState {
    pub fn fork_name(&self) -> ForkName {
        map_forked_state!(self, |state| state.fork_name())
    }

    pub fn slot(&self) -> u64 {
        map_forked_state!(self, |state| state.slot())
    }

    pub fn validators(&self) -> &Validators {
        map_forked_state!(self, |state| state.validators())
    }

    pub fn balances(&self) -> &Balances {
        map_forked_state!(self, |state| state.balances())
    }

    pub fn state_root(&self) -> B256 {
        map_forked_state!(self, |state| state.state_root())
    }

    pub fn as_phase0(&self) -> Result<&phase0::beacon_state::BeaconState, BeaconStateError> {
        match self {
            Self::Phase0(state) => Ok(state),
            _ => Err(self.wrong_fork(ForkName::Phase0)),
        }
    }

    pub fn as_phase0_mut(
        &mut self,
    ) -> Result<&mut phase0::beacon_state::BeaconState, BeaconStateError> {
        match self {
            Self::Phase0(state) => Ok(state),
            other => Err(other.wrong_fork(ForkName::Phase0)),
        }
    }

    pub fn as_altair(&self) -> Result<&altair::beacon_state::BeaconState, BeaconStateError> {
        match self {
            Self::Altair(state) => Ok(state),
            _ => Err(self.wrong_fork(ForkName::Altair)),
        }
    }

    pub fn as_altair_mut(
        &mut self,
    ) -> Result<&mut altair::beacon_state::BeaconState, BeaconStateError> {
        match self {
            Self::Altair(state) => Ok(state),
            other => Err(other.wrong_fork(ForkName::Altair)),
        }
    }

    pub fn as_ssz_bytes(&self) -> Vec<u8> {
        map_forked_state!(self, |state| state.as_ssz_bytes())
    }

    /// SSZ carries no fork tag, so the caller says which container the bytes hold.
    pub fn from_ssz_bytes(bytes: &[u8], fork: ForkName) -> Result<Self, DecodeError> {
        Ok(match fork {
            ForkName::Phase0 => {
                Self::Phase0(phase0::beacon_state::BeaconState::from_ssz_bytes(bytes)?)
            }
            ForkName::Altair => {
                Self::Altair(altair::beacon_state::BeaconState::from_ssz_bytes(bytes)?)
            }
        })
    }

    fn wrong_fork(&self, expected: ForkName) -> BeaconStateError {
        BeaconStateError::WrongFork {
            expected,
            actual: self.fork_name(),
        }
    }
}

impl From<phase0::beacon_state::BeaconState> for ForkedBeaconState {
    fn from(state: phase0::beacon_state::BeaconState) -> Self {
        Self::Phase0(state)
    }
}

impl From<altair::beacon_state::BeaconState> for ForkedBeaconState {
    fn from(state: altair::beacon_state::BeaconState) -> Self {
        Self::Altair(state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkedSignedBeaconBlock {
    Phase0(phase0::beacon_block::SignedBeaconBlock),
    Altair(altair::beacon_block::SignedBeaconBlock),
}

impl ForkedSignedBeaconBlock {
    pub fn fork_name(&self) -> ForkName {
        match self {
            Self::Phase0(_) => ForkName::Phase0,
            Self::Altair(_) => ForkName::Altair,
        }
    }

    pub fn slot(&self) -> u64 {
        match self {
            Self::Phase0(block) => block.message.slot,
            Self::Altair(block) => block.message.slot,
        }
    }

    pub fn proposer_index(&self) -> u64 {
        match self {
            Self::Phase0(block) => block.message.proposer_index,
            Self::Altair(block) => block.message.proposer_index,
        }
    }

    pub fn state_root(&self) -> B256 {
        match self {
            Self::Phase0(block) => block.message.state_root,
            Self::Altair(block) => block.message.state_root,
        }
    }

    pub fn signature(&self) -> &BLSSignature {
        match self {
            Self::Phase0(block) => &block.signature,
            Self::Altair(block) => &block.signature,
        }
    }

    /// Root of the unsigned block.
    pub fn message_root(&self) -> B256 {
        match self {
            Self::Phase0(block) => block.message.tree_hash_root(),
            Self::Altair(block) => block.message.tree_hash_root(),
        }
    }

    pub fn signed_header(&self) -> SignedBeaconBlockHeader {
        match self {
            Self::Phase0(block) => block.signed_header(),
            Self::Altair(block) => block.signed_header(),
        }
    }
}

impl From<phase0::beacon_block::SignedBeaconBlock> for ForkedSignedBeaconBlock {
    fn from(block: phase0::beacon_block::SignedBeaconBlock) -> Self {
        Self::Phase0(block)
    }
}

impl From<altair::beacon_block::SignedBeaconBlock> for ForkedSignedBeaconBlock {
    fn from(block: altair::beacon_block::SignedBeaconBlock) -> Self {
        Self::Altair(block)
    }
}
