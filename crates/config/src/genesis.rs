//! Genesis participants
//!
//! The `[genesis]` section names the participants that exist before the first
//! operation: the permanent bootstrap entity and any initial sequencers and
//! validators. Each participant stakes from its own funded balance, so the
//! section also lists the opening balances of the staking ledger.

use crate::config::{parse_amount, ElectionConfig, RegistryConfig};
use crate::error::{ConfigError, ConfigResult};
use cadence_types::{Address, Role};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Genesis configuration containing initial participants and balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Opening balances of the staking ledger
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,

    /// Participants registered at genesis
    #[serde(default)]
    pub participants: Vec<GenesisParticipant>,
}

impl GenesisConfig {
    /// Validate the genesis participants against registry minimums.
    pub fn validate(&self, registry: &RegistryConfig, election: &ElectionConfig) -> ConfigResult<()> {
        let min_sequencer = registry.min_sequencer_stake_u128()?;
        let min_validator = registry.min_validator_stake_u128()?;
        let stake_per_power = election.stake_per_power_u128()?;

        let mut funded: HashMap<Address, u128> = HashMap::new();
        for entry in &self.balances {
            let amount = entry.balance_u128()?;
            let slot = funded.entry(entry.address).or_default();
            *slot = slot.saturating_add(amount);
        }

        let mut seen = HashSet::new();
        let mut staked: HashMap<Address, u128> = HashMap::new();

        for participant in &self.participants {
            if !seen.insert((participant.role, participant.address)) {
                return Err(ConfigError::DuplicateParticipant {
                    role: participant.role.to_string(),
                    address: participant.address.to_string(),
                });
            }

            let stake = participant.stake_u128()?;
            let min_stake = match participant.role {
                Role::Sequencer => min_sequencer,
                Role::Validator => min_validator,
            };
            if !participant.permanent && stake < min_stake {
                return Err(ConfigError::StakeBelowMinimum {
                    role: participant.role.to_string(),
                    address: participant.address.to_string(),
                    stake: participant.stake.clone(),
                    min_stake: min_stake.to_string(),
                });
            }
            if participant.role == Role::Validator && stake / stake_per_power == 0 {
                return Err(ConfigError::ZeroVotingPower(participant.address.to_string()));
            }

            let total = staked.entry(participant.address).or_default();
            *total = total.saturating_add(stake);
        }

        for (address, stake) in &staked {
            let balance = funded.get(address).copied().unwrap_or(0);
            if *stake > balance {
                return Err(ConfigError::UnfundedStake {
                    address: address.to_string(),
                    stake: stake.to_string(),
                    balance: balance.to_string(),
                });
            }
        }

        debug!(
            balances = self.balances.len(),
            participants = self.participants.len(),
            "Genesis validation passed"
        );
        Ok(())
    }

    /// Participants of one role, in listing order.
    pub fn participants_with_role(&self, role: Role) -> impl Iterator<Item = &GenesisParticipant> {
        self.participants.iter().filter(move |p| p.role == role)
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            balances: Vec::new(),
            participants: vec![GenesisParticipant {
                address: Address::from_low_u64_be(0xB007),
                role: Role::Sequencer,
                stake: "0".to_string(),
                endpoint: "http://127.0.0.1:8545".to_string(),
                permanent: true,
            }],
        }
    }
}

// =============================================================================
// Genesis Balance
// =============================================================================

/// Opening ledger balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisBalance {
    /// Account address
    pub address: Address,

    /// Balance (decimal string)
    pub balance: String,
}

impl GenesisBalance {
    /// Balance as an integer.
    pub fn balance_u128(&self) -> ConfigResult<u128> {
        parse_amount("genesis.balances.balance", &self.balance)
    }
}

// =============================================================================
// Genesis Participant
// =============================================================================

/// Participant registered at genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisParticipant {
    /// Participant identity
    pub address: Address,

    /// Sequencer or validator
    pub role: Role,

    /// Stake moved to escrow at genesis (decimal string)
    pub stake: String,

    /// Endpoint metadata
    #[serde(default)]
    pub endpoint: String,

    /// Permanent participants cannot be deactivated and are exempt from the stake minimum
    #[serde(default)]
    pub permanent: bool,
}

impl GenesisParticipant {
    /// Stake as an integer.
    pub fn stake_u128(&self) -> ConfigResult<u128> {
        parse_amount("genesis.participants.stake", &self.stake)
    }
}
