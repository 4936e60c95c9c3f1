//! Participant roles and the scalar units shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Height in the externally supplied block order.
pub type BlockNumber = u64;

/// Unix timestamp in seconds, as carried by the ordering layer.
pub type Timestamp = u64;

/// Staked amount in the smallest unit of the staking asset.
pub type Stake = u128;

/// Weight of a validator in elections and attestation quorums.
pub type VotingPower = u64;

/// Parts per ten thousand (10000 = 100%).
pub type BasisPoints = u32;

/// `BasisPoints` value representing 100%.
pub const BPS_DENOMINATOR: BasisPoints = 10_000;

/// The two participant roles.
///
/// Sequencers take turns producing blocks; validators attest to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Block producer under round-robin rotation
    Sequencer,
    /// Attester under weighted election
    Validator,
}

impl Role {
    /// Both roles, in a fixed order.
    pub const ALL: [Role; 2] = [Role::Sequencer, Role::Validator];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sequencer => write!(f, "sequencer"),
            Role::Validator => write!(f, "validator"),
        }
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequencer" => Ok(Role::Sequencer),
            "validator" => Ok(Role::Validator),
            other => Err(crate::Error::InvalidRole(other.to_string())),
        }
    }
}
