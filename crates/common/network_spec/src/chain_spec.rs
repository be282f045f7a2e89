use std::{
    path::Path,
    sync::{Arc, LazyLock},
};

use alloy_primitives::{aliases::B32, fixed_bytes};
use anyhow::{Context, bail};
use ember_consensus_misc::{
    constants::FAR_FUTURE_EPOCH,
    fork::ForkName,
    misc::{compute_activation_exit_epoch, compute_epoch_at_slot, compute_start_slot_at_epoch},
};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Every arithmetic parameter of the state transition.
///
/// Keys follow the upper-case naming of the consensus-specs preset and config files so a
/// `ChainSpec` can be assembled from those YAML documents directly.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ChainSpec {
    pub preset_base: String,
    pub config_name: String,

    // Genesis
    pub min_genesis_active_validator_count: u64,
    pub min_genesis_time: u64,
    #[serde(with = "crate::b32_hex")]
    pub genesis_fork_version: B32,
    pub genesis_delay: u64,

    // Forking
    #[serde(with = "crate::b32_hex")]
    pub altair_fork_version: B32,
    pub altair_fork_epoch: u64,

    // Time parameters
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub min_attestation_inclusion_delay: u64,
    pub min_seed_lookahead: u64,
    pub max_seed_lookahead: u64,
    pub min_epochs_to_inactivity_penalty: u64,
    pub epochs_per_eth1_voting_period: u64,
    pub epochs_per_sync_committee_period: u64,
    pub shard_committee_period: u64,
    pub min_validator_withdrawability_delay: u64,

    // Committees
    pub max_committees_per_slot: u64,
    pub target_committee_size: u64,
    pub shuffle_round_count: u8,

    // Validator cycle
    pub ejection_balance: u64,
    pub min_per_epoch_churn_limit: u64,
    pub churn_limit_quotient: u64,
    pub inactivity_score_bias: u64,
    pub inactivity_score_recovery_rate: u64,

    // Gwei values
    pub min_deposit_amount: u64,
    pub max_effective_balance: u64,
    pub effective_balance_increment: u64,
    pub hysteresis_quotient: u64,
    pub hysteresis_downward_multiplier: u64,
    pub hysteresis_upward_multiplier: u64,

    // Rewards and penalties
    pub base_reward_factor: u64,
    pub whistleblower_reward_quotient: u64,
    pub proposer_reward_quotient: u64,
    pub inactivity_penalty_quotient: u64,
    pub min_slashing_penalty_quotient: u64,
    pub proportional_slashing_multiplier: u64,
    pub inactivity_penalty_quotient_altair: u64,
    pub min_slashing_penalty_quotient_altair: u64,
    pub proportional_slashing_multiplier_altair: u64,

    // Max operations per block
    pub max_proposer_slashings: u64,
    pub max_attester_slashings: u64,
    pub max_attestations: u64,
    pub max_deposits: u64,
    pub max_voluntary_exits: u64,
}

impl ChainSpec {
    /// Parses a single YAML document holding every key.
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Self::from_yaml_documents(&[yaml])
    }

    /// Merges several YAML mappings (later documents win) and parses the result. This is how the
    /// per-fork preset files and a network config file combine into one `ChainSpec`.
    pub fn from_yaml_documents(documents: &[&str]) -> anyhow::Result<Self> {
        let mut merged = Mapping::new();
        for (index, document) in documents.iter().enumerate() {
            match serde_yaml::from_str::<Value>(document)
                .with_context(|| format!("YAML document {index} is malformed"))?
            {
                Value::Mapping(mapping) => merged.extend(mapping),
                Value::Null => {}
                other => bail!("YAML document {index} is not a mapping: {other:?}"),
            }
        }
        serde_yaml::from_value(Value::Mapping(merged)).context("Failed to parse chain spec")
    }

    pub fn from_yaml_files<P: AsRef<Path>>(paths: &[P]) -> anyhow::Result<Self> {
        let documents = paths
            .iter()
            .map(|path| {
                std::fs::read_to_string(path.as_ref()).with_context(|| {
                    format!("Failed to read chain spec file {}", path.as_ref().display())
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::from_yaml_documents(&documents.iter().map(String::as_str).collect::<Vec<_>>())
    }

    pub fn fork_name_at_epoch(&self, epoch: u64) -> ForkName {
        if epoch >= self.altair_fork_epoch {
            ForkName::Altair
        } else {
            ForkName::Phase0
        }
    }

    pub fn fork_version(&self, fork: ForkName) -> B32 {
        match fork {
            ForkName::Phase0 => self.genesis_fork_version,
            ForkName::Altair => self.altair_fork_version,
        }
    }

    pub fn compute_epoch_at_slot(&self, slot: u64) -> u64 {
        compute_epoch_at_slot(slot, self.slots_per_epoch)
    }

    pub fn compute_start_slot_at_epoch(&self, epoch: u64) -> u64 {
        compute_start_slot_at_epoch(epoch, self.slots_per_epoch)
    }

    pub fn compute_activation_exit_epoch(&self, epoch: u64) -> u64 {
        compute_activation_exit_epoch(epoch, self.max_seed_lookahead)
    }

    pub fn compute_sync_committee_period(&self, epoch: u64) -> u64 {
        epoch / self.epochs_per_sync_committee_period
    }

    pub fn slots_per_eth1_voting_period(&self) -> u64 {
        self.epochs_per_eth1_voting_period * self.slots_per_epoch
    }

    pub fn inactivity_penalty_quotient_for(&self, fork: ForkName) -> u64 {
        match fork {
            ForkName::Phase0 => self.inactivity_penalty_quotient,
            ForkName::Altair => self.inactivity_penalty_quotient_altair,
        }
    }

    pub fn min_slashing_penalty_quotient_for(&self, fork: ForkName) -> u64 {
        match fork {
            ForkName::Phase0 => self.min_slashing_penalty_quotient,
            ForkName::Altair => self.min_slashing_penalty_quotient_altair,
        }
    }

    pub fn proportional_slashing_multiplier_for(&self, fork: ForkName) -> u64 {
        match fork {
            ForkName::Phase0 => self.proportional_slashing_multiplier,
            ForkName::Altair => self.proportional_slashing_multiplier_altair,
        }
    }
}

pub static MAINNET: LazyLock<Arc<ChainSpec>> = LazyLock::new(|| {
    ChainSpec {
        preset_base: "mainnet".to_string(),
        config_name: "mainnet".to_string(),
        min_genesis_active_validator_count: 16384,
        min_genesis_time: 1606824000,
        genesis_fork_version: fixed_bytes!("0x00000000"),
        genesis_delay: 604800,
        altair_fork_version: fixed_bytes!("0x01000000"),
        altair_fork_epoch: 74240,
        seconds_per_slot: 12,
        slots_per_epoch: 32,
        min_attestation_inclusion_delay: 1,
        min_seed_lookahead: 1,
        max_seed_lookahead: 4,
        min_epochs_to_inactivity_penalty: 4,
        epochs_per_eth1_voting_period: 64,
        epochs_per_sync_committee_period: 256,
        shard_committee_period: 256,
        min_validator_withdrawability_delay: 256,
        max_committees_per_slot: 64,
        target_committee_size: 128,
        shuffle_round_count: 90,
        ejection_balance: 16_000_000_000,
        min_per_epoch_churn_limit: 4,
        churn_limit_quotient: 65536,
        inactivity_score_bias: 4,
        inactivity_score_recovery_rate: 16,
        min_deposit_amount: 1_000_000_000,
        max_effective_balance: 32_000_000_000,
        effective_balance_increment: 1_000_000_000,
        hysteresis_quotient: 4,
        hysteresis_downward_multiplier: 1,
        hysteresis_upward_multiplier: 5,
        base_reward_factor: 64,
        whistleblower_reward_quotient: 512,
        proposer_reward_quotient: 8,
        inactivity_penalty_quotient: 67_108_864,
        min_slashing_penalty_quotient: 128,
        proportional_slashing_multiplier: 1,
        inactivity_penalty_quotient_altair: 50_331_648,
        min_slashing_penalty_quotient_altair: 64,
        proportional_slashing_multiplier_altair: 2,
        max_proposer_slashings: 16,
        max_attester_slashings: 2,
        max_attestations: 128,
        max_deposits: 16,
        max_voluntary_exits: 16,
    }
    .into()
});

/// Small-committee parameters for tests and local devnets. Altair is not scheduled.
pub static MINIMAL: LazyLock<Arc<ChainSpec>> = LazyLock::new(|| {
    ChainSpec {
        preset_base: "minimal".to_string(),
        config_name: "minimal".to_string(),
        min_genesis_active_validator_count: 64,
        min_genesis_time: 1578009600,
        genesis_fork_version: fixed_bytes!("0x00000001"),
        genesis_delay: 300,
        altair_fork_version: fixed_bytes!("0x01000001"),
        altair_fork_epoch: FAR_FUTURE_EPOCH,
        seconds_per_slot: 6,
        slots_per_epoch: 8,
        min_attestation_inclusion_delay: 1,
        min_seed_lookahead: 1,
        max_seed_lookahead: 4,
        min_epochs_to_inactivity_penalty: 4,
        epochs_per_eth1_voting_period: 4,
        epochs_per_sync_committee_period: 8,
        shard_committee_period: 64,
        min_validator_withdrawability_delay: 256,
        max_committees_per_slot: 4,
        target_committee_size: 4,
        shuffle_round_count: 10,
        ejection_balance: 16_000_000_000,
        min_per_epoch_churn_limit: 2,
        churn_limit_quotient: 32,
        inactivity_score_bias: 4,
        inactivity_score_recovery_rate: 16,
        min_deposit_amount: 1_000_000_000,
        max_effective_balance: 32_000_000_000,
        effective_balance_increment: 1_000_000_000,
        hysteresis_quotient: 4,
        hysteresis_downward_multiplier: 1,
        hysteresis_upward_multiplier: 5,
        base_reward_factor: 64,
        whistleblower_reward_quotient: 512,
        proposer_reward_quotient: 8,
        inactivity_penalty_quotient: 33_554_432,
        min_slashing_penalty_quotient: 64,
        proportional_slashing_multiplier: 2,
        inactivity_penalty_quotient_altair: 50_331_648,
        min_slashing_penalty_quotient_altair: 64,
        proportional_slashing_multiplier_altair: 2,
        max_proposer_slashings: 16,
        max_attester_slashings: 2,
        max_attestations: 128,
        max_deposits: 16,
        max_voluntary_exits: 16,
    }
    .into()
});

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_yaml_round_trip() {
        let yaml = serde_yaml::to_string(MAINNET.as_ref()).unwrap();
        assert!(yaml.contains("SLOTS_PER_EPOCH: 32"));
        let parsed = ChainSpec::from_yaml_str(&yaml).unwrap();
        assert_eq!(&parsed, MAINNET.as_ref());
    }

    #[test]
    fn test_later_documents_override_earlier_ones() {
        let base = serde_yaml::to_string(MINIMAL.as_ref()).unwrap();
        let overrides = "ALTAIR_FORK_EPOCH: 2\nCONFIG_NAME: devnet\n";
        let spec = ChainSpec::from_yaml_documents(&[&base, overrides]).unwrap();
        assert_eq!(spec.altair_fork_epoch, 2);
        assert_eq!(spec.config_name, "devnet");
        assert_eq!(spec.slots_per_epoch, MINIMAL.slots_per_epoch);
    }

    #[test]
    fn test_missing_key_is_an_error() {
        assert!(ChainSpec::from_yaml_str("SLOTS_PER_EPOCH: 8\n").is_err());
        assert!(ChainSpec::from_yaml_str("- not\n- a mapping\n").is_err());
    }

    #[rstest]
    #[case(0, ForkName::Phase0)]
    #[case(74239, ForkName::Phase0)]
    #[case(74240, ForkName::Altair)]
    fn test_fork_name_at_epoch(#[case] epoch: u64, #[case] fork: ForkName) {
        assert_eq!(MAINNET.fork_name_at_epoch(epoch), fork);
    }
}
