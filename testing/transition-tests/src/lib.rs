//! Deterministic chains for scenario tests.
//!
//! Keys are derived from the validator index, the genesis state is built from deposits signed
//! with those keys, and blocks come out with a real randao reveal, state root and proposer
//! signature, so they pass both the `blst` verifier and the fake one.

use alloy_primitives::B256;
use anyhow::{Context, anyhow};
use ember_bls::{BLSSignature, PrivateKey, traits::{Aggregatable, Signable}};
use ember_consensus_beacon::{
    ForkedBeaconState, ForkedSignedBeaconBlock, altair, map_forked_state, phase0,
    view::BeaconStateView,
};
use ember_consensus_misc::{
    attestation::Attestation,
    attestation_data::AttestationData,
    attester_slashing::AttesterSlashing,
    checkpoint::Checkpoint,
    constants::{
        DEPOSIT_CONTRACT_TREE_DEPTH, DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER,
        DOMAIN_DEPOSIT, DOMAIN_RANDAO,
    },
    deposit::{Deposit, DepositData},
    misc::{compute_domain, compute_signing_root},
    proposer_slashing::ProposerSlashing,
    voluntary_exit::SignedVoluntaryExit,
};
use ember_merkle::DepositTree;
use ember_network_spec::{ChainSpec, MINIMAL};
use ember_state_transition::{
    EpochsContext, TransitionContext, initialize_beacon_state_from_eth1,
    per_block::process_forked_block, process_slots, state_transition,
};
use ethereum_hashing::hash;
use ssz_types::{BitList, FixedVector, VariableList};
use tree_hash::TreeHash;

pub const ETH1_BLOCK_HASH: B256 = B256::repeat_byte(0x42);

/// The minimal preset with altair scheduled at `epoch`.
pub fn minimal_spec_with_altair_at(epoch: u64) -> ChainSpec {
    ChainSpec {
        altair_fork_epoch: epoch,
        ..MINIMAL.as_ref().clone()
    }
}

/// Secret key of validator `index`.
pub fn interop_key(index: u64) -> anyhow::Result<PrivateKey> {
    let mut seed = [0u8; 32];
    seed[..8].copy_from_slice(&index.to_le_bytes());
    Ok(PrivateKey::key_gen(&hash(&seed))?)
}

pub fn sign<T: TreeHash>(key: &PrivateKey, object: &T, domain: B256) -> anyhow::Result<BLSSignature> {
    Ok(key.sign(compute_signing_root(object, domain).as_slice())?)
}

/// A deposit of `amount` for `key`, with BLS withdrawal credentials and a valid proof of
/// possession.
pub fn deposit_data(key: &PrivateKey, amount: u64, spec: &ChainSpec) -> anyhow::Result<DepositData> {
    let pubkey = key.public_key()?;
    let mut withdrawal_credentials = B256::from_slice(&hash(pubkey.to_bytes()));
    withdrawal_credentials[0] = 0;
    let mut deposit_data = DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature: BLSSignature::infinity(),
    };
    let domain = compute_domain(DOMAIN_DEPOSIT, spec.genesis_fork_version, B256::ZERO);
    deposit_data.signature = sign(key, &deposit_data.as_message(), domain)?;
    Ok(deposit_data)
}

/// Wraps each deposit with its proof against the tree of itself and every deposit before it.
pub fn deposits_with_proofs(deposit_data: &[DepositData]) -> anyhow::Result<Vec<Deposit>> {
    let mut tree = DepositTree::new(DEPOSIT_CONTRACT_TREE_DEPTH as usize);
    let mut deposits = vec![];
    for (index, data) in deposit_data.iter().enumerate() {
        tree.push_leaf(data.tree_hash_root())?;
        let proof = FixedVector::new(tree.generate_proof(index)?)
            .map_err(|err| anyhow!("Deposit proof has the wrong depth: {err:?}"))?;
        deposits.push(Deposit {
            proof,
            data: data.clone(),
        });
    }
    Ok(deposits)
}

pub fn deposit_root(deposit_data: &[DepositData]) -> anyhow::Result<B256> {
    let mut tree = DepositTree::new(DEPOSIT_CONTRACT_TREE_DEPTH as usize);
    for data in deposit_data {
        tree.push_leaf(data.tree_hash_root())?;
    }
    Ok(tree.root())
}

/// Operations to include in a produced block.
#[derive(Debug, Clone, Default)]
pub struct BlockOperations {
    pub proposer_slashings: Vec<ProposerSlashing>,
    pub attester_slashings: Vec<AttesterSlashing>,
    pub attestations: Vec<Attestation>,
    pub deposits: Vec<Deposit>,
    pub voluntary_exits: Vec<SignedVoluntaryExit>,
}

pub struct Harness {
    pub spec: ChainSpec,
    pub keys: Vec<PrivateKey>,
    pub deposit_data: Vec<DepositData>,
}

impl Harness {
    /// Keys and full deposits for `validator_count` validators.
    pub fn new(validator_count: u64, spec: ChainSpec) -> anyhow::Result<Self> {
        let keys = (0..validator_count)
            .map(interop_key)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let deposit_data = keys
            .iter()
            .map(|key| deposit_data(key, spec.max_effective_balance, &spec))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            spec,
            keys,
            deposit_data,
        })
    }

    pub fn key(&self, index: u64) -> anyhow::Result<&PrivateKey> {
        self.keys
            .get(index as usize)
            .with_context(|| format!("No key for validator {index}"))
    }

    /// The genesis state, at altair if the fork is scheduled at genesis, with its epochs context.
    pub fn genesis(&self, ctx: &TransitionContext) -> anyhow::Result<(ForkedBeaconState, EpochsContext)> {
        let deposits = deposits_with_proofs(&self.deposit_data)?;
        let state = initialize_beacon_state_from_eth1(ETH1_BLOCK_HASH, 0, &deposits, ctx)?;
        let epochs_ctx = map_forked_state!(&state, |inner| EpochsContext::new(inner, ctx.spec))?;
        Ok((state, epochs_ctx))
    }

    /// Attestations from every committee of `slot`, signed by all members and voting for the
    /// chain `state` is on. `state` must be past `slot`.
    pub fn attestations_for_slot<S: BeaconStateView>(
        &self,
        state: &S,
        epochs_ctx: &EpochsContext,
        slot: u64,
    ) -> anyhow::Result<Vec<Attestation>> {
        let spec = &self.spec;
        let epoch = spec.compute_epoch_at_slot(slot);
        let source = if epoch == state.get_current_epoch(spec) {
            *state.current_justified_checkpoint()
        } else {
            *state.previous_justified_checkpoint()
        };
        let target = Checkpoint {
            epoch,
            root: state.get_block_root(epoch, spec)?,
        };
        let beacon_block_root = state.get_block_root_at_slot(slot)?;
        let domain = state.get_domain(DOMAIN_BEACON_ATTESTER, Some(epoch), spec);

        let mut attestations = vec![];
        for index in 0..epochs_ctx.get_committee_count_per_slot(epoch)? {
            let committee = epochs_ctx.get_beacon_committee(slot, index)?;
            let data = AttestationData {
                slot,
                index,
                beacon_block_root,
                source,
                target,
            };
            let mut aggregation_bits = BitList::with_capacity(committee.len())
                .map_err(|err| anyhow!("Committee too large: {err:?}"))?;
            let mut signatures = vec![];
            for (position, &validator_index) in committee.iter().enumerate() {
                aggregation_bits
                    .set(position, true)
                    .map_err(|err| anyhow!("Bit out of range: {err:?}"))?;
                signatures.push(sign(self.key(validator_index)?, &data, domain)?);
            }
            attestations.push(Attestation {
                aggregation_bits,
                data,
                signature: BLSSignature::aggregate(&signatures.iter().collect::<Vec<_>>())?,
            });
        }
        Ok(attestations)
    }

    /// A block at `slot` on top of `state` carrying `operations`, with the state root it
    /// produces and the proposer's signature.
    pub fn produce_block(
        &self,
        state: &ForkedBeaconState,
        epochs_ctx: &EpochsContext,
        slot: u64,
        operations: BlockOperations,
        ctx: &TransitionContext,
    ) -> anyhow::Result<ForkedSignedBeaconBlock> {
        let spec = &self.spec;
        let mut pre = state.clone();
        let mut pre_epochs_ctx = epochs_ctx.clone();
        process_slots(&mut pre, &mut pre_epochs_ctx, slot, ctx)?;

        let proposer_index = pre_epochs_ctx.get_beacon_proposer(slot)?;
        let key = self.key(proposer_index)?;
        let epoch = spec.compute_epoch_at_slot(slot);
        let randao_domain = map_forked_state!(&pre, |inner| inner.get_domain(
            DOMAIN_RANDAO,
            None,
            spec
        ));
        let randao_reveal = sign(key, &epoch, randao_domain)?;
        let parent_root =
            map_forked_state!(&pre, |inner| inner.latest_block_header().tree_hash_root());
        let eth1_data = map_forked_state!(&pre, |inner| inner.eth1_data().clone());

        let BlockOperations {
            proposer_slashings,
            attester_slashings,
            attestations,
            deposits,
            voluntary_exits,
        } = operations;
        let mut block = match &pre {
            ForkedBeaconState::Phase0(_) => {
                ForkedSignedBeaconBlock::from(phase0::beacon_block::SignedBeaconBlock {
                    message: phase0::beacon_block::BeaconBlock {
                        slot,
                        proposer_index,
                        parent_root,
                        state_root: B256::ZERO,
                        body: phase0::beacon_block::BeaconBlockBody {
                            randao_reveal,
                            eth1_data,
                            graffiti: B256::ZERO,
                            proposer_slashings: VariableList::from(proposer_slashings),
                            attester_slashings: VariableList::from(attester_slashings),
                            attestations: VariableList::from(attestations),
                            deposits: VariableList::from(deposits),
                            voluntary_exits: VariableList::from(voluntary_exits),
                        },
                    },
                    signature: BLSSignature::infinity(),
                })
            }
            ForkedBeaconState::Altair(_) => {
                ForkedSignedBeaconBlock::from(altair::beacon_block::SignedBeaconBlock {
                    message: altair::beacon_block::BeaconBlock {
                        slot,
                        proposer_index,
                        parent_root,
                        state_root: B256::ZERO,
                        body: altair::beacon_block::BeaconBlockBody {
                            randao_reveal,
                            eth1_data,
                            graffiti: B256::ZERO,
                            proposer_slashings: VariableList::from(proposer_slashings),
                            attester_slashings: VariableList::from(attester_slashings),
                            attestations: VariableList::from(attestations),
                            deposits: VariableList::from(deposits),
                            voluntary_exits: VariableList::from(voluntary_exits),
                            // Nobody signs, which the infinity signature of the default covers
                            sync_aggregate: Default::default(),
                        },
                    },
                    signature: BLSSignature::infinity(),
                })
            }
        };

        process_forked_block(&mut pre, &block, &mut pre_epochs_ctx, ctx)?;
        let state_root = pre.state_root();
        let domain = map_forked_state!(&pre, |inner| inner.get_domain(
            DOMAIN_BEACON_PROPOSER,
            None,
            spec
        ));
        match &mut block {
            ForkedSignedBeaconBlock::Phase0(block) => {
                block.message.state_root = state_root;
                block.signature = sign(key, &block.message, domain)?;
            }
            ForkedSignedBeaconBlock::Altair(block) => {
                block.message.state_root = state_root;
                block.signature = sign(key, &block.message, domain)?;
            }
        }
        Ok(block)
    }

    /// A block at `slot` carrying full attestations for the slot before it.
    pub fn produce_attested_block(
        &self,
        state: &ForkedBeaconState,
        epochs_ctx: &EpochsContext,
        slot: u64,
        ctx: &TransitionContext,
    ) -> anyhow::Result<ForkedSignedBeaconBlock> {
        let mut pre = state.clone();
        let mut pre_epochs_ctx = epochs_ctx.clone();
        process_slots(&mut pre, &mut pre_epochs_ctx, slot, ctx)?;
        let attestations = map_forked_state!(&pre, |inner| self.attestations_for_slot(
            inner,
            &pre_epochs_ctx,
            slot - 1
        ))?;
        self.produce_block(
            state,
            epochs_ctx,
            slot,
            BlockOperations {
                attestations,
                ..Default::default()
            },
            ctx,
        )
    }

    /// Applies a fully attested block at every slot of `slots`, validating each transition.
    pub fn extend_chain(
        &self,
        state: &mut ForkedBeaconState,
        epochs_ctx: &mut EpochsContext,
        slots: std::ops::RangeInclusive<u64>,
        ctx: &TransitionContext,
    ) -> anyhow::Result<()> {
        for slot in slots {
            let block = self.produce_attested_block(state, epochs_ctx, slot, ctx)?;
            state_transition(state, epochs_ctx, &block, true, ctx)
                .with_context(|| format!("Block at slot {slot} did not apply"))?;
        }
        Ok(())
    }
}
