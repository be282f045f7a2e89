//! Fork-agnostic read access to blocks, so block processing is written once.

use alloy_primitives::B256;
use ember_bls::BLSSignature;
use ember_consensus_misc::{
    attestation::Attestation, attester_slashing::AttesterSlashing,
    beacon_block_header::BeaconBlockHeader, deposit::Deposit, eth_1_data::Eth1Data,
    proposer_slashing::ProposerSlashing, voluntary_exit::SignedVoluntaryExit,
};
use tree_hash::TreeHash;

use crate::altair::sync_aggregate::SyncAggregate;

pub trait BeaconBlockBodyView: TreeHash {
    fn randao_reveal(&self) -> &BLSSignature;
    fn eth1_data(&self) -> &Eth1Data;
    fn graffiti(&self) -> B256;
    fn proposer_slashings(&self) -> &[ProposerSlashing];
    fn attester_slashings(&self) -> &[AttesterSlashing];
    fn attestations(&self) -> &[Attestation];
    fn deposits(&self) -> &[Deposit];
    fn voluntary_exits(&self) -> &[SignedVoluntaryExit];

    /// Present from altair onwards.
    fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        None
    }
}

pub trait BeaconBlockView: TreeHash {
    type Body: BeaconBlockBodyView;

    fn slot(&self) -> u64;
    fn proposer_index(&self) -> u64;
    fn parent_root(&self) -> B256;
    fn state_root(&self) -> B256;
    fn body(&self) -> &Self::Body;

    fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot(),
            proposer_index: self.proposer_index(),
            parent_root: self.parent_root(),
            state_root: self.state_root(),
            body_root: self.body().tree_hash_root(),
        }
    }
}

macro_rules! impl_block_views {
    ($block:ty, $body:ty, { $($body_extra:tt)* }) => {
        impl $crate::block::BeaconBlockBodyView for $body {
            fn randao_reveal(&self) -> &::ember_bls::BLSSignature {
                &self.randao_reveal
            }

            fn eth1_data(&self) -> &::ember_consensus_misc::eth_1_data::Eth1Data {
                &self.eth1_data
            }

            fn graffiti(&self) -> ::alloy_primitives::B256 {
                self.graffiti
            }

            fn proposer_slashings(
                &self,
            ) -> &[::ember_consensus_misc::proposer_slashing::ProposerSlashing] {
                &self.proposer_slashings
            }

            fn attester_slashings(
                &self,
            ) -> &[::ember_consensus_misc::attester_slashing::AttesterSlashing] {
                &self.attester_slashings
            }

            fn attestations(&self) -> &[::ember_consensus_misc::attestation::Attestation] {
                &self.attestations
            }

            fn deposits(&self) -> &[::ember_consensus_misc::deposit::Deposit] {
                &self.deposits
            }

            fn voluntary_exits(
                &self,
            ) -> &[::ember_consensus_misc::voluntary_exit::SignedVoluntaryExit] {
                &self.voluntary_exits
            }

            $($body_extra)*
        }

        impl $crate::block::BeaconBlockView for $block {
            type Body = $body;

            fn slot(&self) -> u64 {
                self.slot
            }

            fn proposer_index(&self) -> u64 {
                self.proposer_index
            }

            fn parent_root(&self) -> ::alloy_primitives::B256 {
                self.parent_root
            }

            fn state_root(&self) -> ::alloy_primitives::B256 {
                self.state_root
            }

            fn body(&self) -> &$body {
                &self.body
            }
        }
    };
}

pub(crate) use impl_block_views;
