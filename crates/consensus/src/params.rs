//! Runtime parameters, derived from a validated [`Config`].

use cadence_config::{Config, ConfigError, ConfigResult, GenesisConfig};
use cadence_types::{Address, BasisPoints, Role, Stake};
use std::collections::BTreeSet;

use crate::slashing::PenaltyTable;

/// Parameters the consensus core runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusParams {
    /// Chain identifier mixed into attestation bytes
    pub chain_id: u64,
    /// Minimum sequencer stake
    pub min_sequencer_stake: Stake,
    /// Minimum validator stake
    pub min_validator_stake: Stake,
    /// Identities allowed to act on behalf of others
    pub managers: BTreeSet<Address>,
    /// Account holding all participant stake
    pub escrow: Address,
    /// Account receiving slashed stake
    pub treasury: Address,
    /// Produced blocks per scheduled rotation
    pub rotation_interval_blocks: u64,
    /// Inactivity window before a leader timeout
    pub timeout_blocks: u64,
    /// Cumulative timeouts that jail a sequencer
    pub max_timeouts: u32,
    /// Stake units per unit of voting power
    pub stake_per_power: Stake,
    /// Attestation acceptance window
    pub max_attestation_age: u64,
    /// Penalty per offense
    pub penalties: PenaltyTable,
    /// Jail term in blocks
    pub jail_duration_blocks: u64,
    /// Uptime below which a participant is slashed
    pub uptime_threshold_bps: BasisPoints,
    /// Epoch length in seconds
    pub epoch_duration_secs: u64,
    /// Blocks a force-inclusion request may stay pending
    pub inclusion_window_blocks: u64,
    /// Identity confirming force inclusion
    pub inclusion_oracle: Address,
}

impl ConsensusParams {
    /// Minimum stake for `role`.
    pub fn min_stake(&self, role: Role) -> Stake {
        match role {
            Role::Sequencer => self.min_sequencer_stake,
            Role::Validator => self.min_validator_stake,
        }
    }

    /// Whether `caller` is a configured manager.
    pub fn is_manager(&self, caller: &Address) -> bool {
        self.managers.contains(caller)
    }
}

const ETHER: Stake = 1_000_000_000_000_000_000;

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            chain_id: 6174,
            min_sequencer_stake: 100_000 * ETHER,
            min_validator_stake: 10_000 * ETHER,
            managers: BTreeSet::new(),
            escrow: Address::from_low_u64_be(0xE5C0),
            treasury: Address::from_low_u64_be(0x7EA5),
            rotation_interval_blocks: 100,
            timeout_blocks: 10,
            max_timeouts: 3,
            stake_per_power: ETHER,
            max_attestation_age: 100,
            penalties: PenaltyTable::default(),
            jail_duration_blocks: 1_000,
            uptime_threshold_bps: 9_900,
            epoch_duration_secs: 86_400,
            inclusion_window_blocks: 50,
            inclusion_oracle: Address::from_low_u64_be(0x0AC1E),
        }
    }
}

impl TryFrom<&Config> for ConsensusParams {
    type Error = ConfigError;

    fn try_from(config: &Config) -> ConfigResult<Self> {
        config.validate()?;
        let slashing = &config.slashing;
        Ok(Self {
            chain_id: config.chain.chain_id,
            min_sequencer_stake: config.registry.min_sequencer_stake_u128()?,
            min_validator_stake: config.registry.min_validator_stake_u128()?,
            managers: config.registry.managers.iter().copied().collect(),
            escrow: config.registry.escrow,
            treasury: config.registry.treasury,
            rotation_interval_blocks: config.rotation.rotation_interval_blocks,
            timeout_blocks: config.rotation.timeout_blocks,
            max_timeouts: config.rotation.max_timeouts,
            stake_per_power: config.election.stake_per_power_u128()?,
            max_attestation_age: config.attestation.max_age_blocks,
            penalties: PenaltyTable {
                timeout_bps: slashing.timeout_bps,
                invalid_block_bps: slashing.invalid_block_bps,
                double_sign_bps: slashing.double_sign_bps,
                downtime_bps: slashing.downtime_bps,
                censorship_bps: slashing.censorship_bps,
            },
            jail_duration_blocks: slashing.jail_duration_blocks,
            uptime_threshold_bps: slashing.uptime_threshold_bps,
            epoch_duration_secs: config.epoch.duration_secs,
            inclusion_window_blocks: config.force_inclusion.window_blocks,
            inclusion_oracle: config.force_inclusion.oracle,
        })
    }
}

/// A participant registered at genesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisParticipant {
    /// Identity
    pub address: Address,
    /// Registry
    pub role: Role,
    /// Stake moved into escrow
    pub stake: Stake,
    /// Endpoint metadata
    pub endpoint: String,
    /// Bootstrap flag
    pub permanent: bool,
}

/// Opening balances and participants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Genesis {
    /// Opening ledger balances
    pub balances: Vec<(Address, Stake)>,
    /// Participants in registration order
    pub participants: Vec<GenesisParticipant>,
}

impl TryFrom<&GenesisConfig> for Genesis {
    type Error = ConfigError;

    fn try_from(genesis: &GenesisConfig) -> ConfigResult<Self> {
        let balances = genesis
            .balances
            .iter()
            .map(|b| Ok((b.address, b.balance_u128()?)))
            .collect::<ConfigResult<Vec<_>>>()?;
        let participants = genesis
            .participants
            .iter()
            .map(|p| {
                Ok(GenesisParticipant {
                    address: p.address,
                    role: p.role,
                    stake: p.stake_u128()?,
                    endpoint: p.endpoint.clone(),
                    permanent: p.permanent,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self {
            balances,
            participants,
        })
    }
}
