//! Main configuration module for Cadence
//!
//! Every consensus parameter lives in one `cadence.toml` file. Amounts are
//! written as decimal strings because TOML integers stop at 64 bits.

use crate::error::{ConfigError, ConfigResult};
use crate::genesis::GenesisConfig;
use cadence_types::{Address, BasisPoints, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct containing all Cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chain identity
    pub chain: ChainConfig,

    /// Registration parameters and system accounts
    pub registry: RegistryConfig,

    /// Sequencer rotation parameters
    pub rotation: RotationConfig,

    /// Validator election parameters
    pub election: ElectionConfig,

    /// Attestation acceptance parameters
    #[serde(default)]
    pub attestation: AttestationConfig,

    /// Penalty table and jail parameters
    pub slashing: SlashingConfig,

    /// Epoch length
    pub epoch: EpochConfig,

    /// Censorship-resistance queue parameters
    pub force_inclusion: ForceInclusionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Genesis participants and balances
    #[serde(default)]
    pub genesis: GenesisConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// The file is parsed and validated; an invalid file is an error.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::from_str(&content)?;

        info!(
            chain_id = config.chain.chain_id,
            chain_name = %config.chain.chain_name,
            participants = config.genesis.participants.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        debug!("Configuration parsed, validating");
        config.validate()?;
        Ok(config)
    }

    /// Validate every section and the cross-section constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        self.chain.validate()?;
        self.registry.validate()?;
        self.rotation.validate()?;
        self.election.validate()?;
        self.attestation.validate()?;
        self.slashing.validate()?;
        self.epoch.validate()?;
        self.force_inclusion.validate()?;
        self.logging.validate()?;
        self.genesis
            .validate(&self.registry, &self.election)?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

/// Parses a decimal amount string.
pub fn parse_amount(name: &'static str, value: &str) -> ConfigResult<u128> {
    value
        .trim()
        .replace('_', "")
        .parse::<u128>()
        .map_err(|_| ConfigError::InvalidAmount {
            name,
            value: value.to_string(),
        })
}

fn check_bps(name: &'static str, value: BasisPoints) -> ConfigResult<()> {
    if value > BPS_DENOMINATOR {
        return Err(ConfigError::InvalidBasisPoints { name, value });
    }
    Ok(())
}

fn check_positive(name: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::ZeroInterval { name });
    }
    Ok(())
}

// =============================================================================
// Chain Configuration
// =============================================================================

/// Chain identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier, mixed into every signed attestation
    pub chain_id: u64,

    /// Human-readable chain name
    pub chain_name: String,
}

impl ChainConfig {
    /// Validate chain identity.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chain_id == 0 {
            return Err(ConfigError::InvalidChainId);
        }
        Ok(())
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 6174,
            chain_name: "cadence-devnet".to_string(),
        }
    }
}

// =============================================================================
// Registry Configuration
// =============================================================================

/// Registration minimums, authorized managers and system accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Minimum stake for a sequencer (decimal string)
    pub min_sequencer_stake: String,

    /// Minimum stake for a validator (decimal string)
    pub min_validator_stake: String,

    /// Accounts allowed to register, deactivate and administer on behalf of others
    #[serde(default)]
    pub managers: Vec<Address>,

    /// Account that custodies all staked funds
    pub escrow: Address,

    /// Account that receives slashed funds
    pub treasury: Address,
}

impl RegistryConfig {
    /// Validate minimums and system accounts.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_sequencer_stake_u128()? == 0 {
            return Err(ConfigError::ZeroMinStake("min_sequencer_stake"));
        }
        if self.min_validator_stake_u128()? == 0 {
            return Err(ConfigError::ZeroMinStake("min_validator_stake"));
        }
        if self.escrow.is_zero() {
            return Err(ConfigError::InvalidSystemAccount {
                name: "escrow",
                reason: "must not be the zero address",
            });
        }
        if self.treasury.is_zero() {
            return Err(ConfigError::InvalidSystemAccount {
                name: "treasury",
                reason: "must not be the zero address",
            });
        }
        if self.escrow == self.treasury {
            return Err(ConfigError::InvalidSystemAccount {
                name: "treasury",
                reason: "must differ from escrow",
            });
        }
        Ok(())
    }

    /// Minimum sequencer stake as an integer.
    pub fn min_sequencer_stake_u128(&self) -> ConfigResult<u128> {
        parse_amount("min_sequencer_stake", &self.min_sequencer_stake)
    }

    /// Minimum validator stake as an integer.
    pub fn min_validator_stake_u128(&self) -> ConfigResult<u128> {
        parse_amount("min_validator_stake", &self.min_validator_stake)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_sequencer_stake: "100000000000000000000000".to_string(), // 100,000 tokens
            min_validator_stake: "10000000000000000000000".to_string(),  // 10,000 tokens
            managers: Vec::new(),
            escrow: Address::from_low_u64_be(0xE5C0),
            treasury: Address::from_low_u64_be(0x7EA5),
        }
    }
}

// =============================================================================
// Rotation Configuration
// =============================================================================

/// Sequencer rotation and liveness parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Blocks a leader produces before a scheduled rotation
    pub rotation_interval_blocks: u64,

    /// Blocks without activity before the leader is timed out
    pub timeout_blocks: u64,

    /// Cumulative timeouts after which a sequencer is jailed
    pub max_timeouts: u32,
}

impl RotationConfig {
    /// Validate rotation windows.
    pub fn validate(&self) -> ConfigResult<()> {
        check_positive("rotation_interval_blocks", self.rotation_interval_blocks)?;
        check_positive("timeout_blocks", self.timeout_blocks)?;
        check_positive("max_timeouts", u64::from(self.max_timeouts))?;
        if self.timeout_blocks >= self.rotation_interval_blocks {
            return Err(ConfigError::TimeoutExceedsRotation {
                timeout: self.timeout_blocks,
                interval: self.rotation_interval_blocks,
            });
        }
        Ok(())
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rotation_interval_blocks: 100,
            timeout_blocks: 10,
            max_timeouts: 3,
        }
    }
}

// =============================================================================
// Election Configuration
// =============================================================================

/// Validator voting power derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Stake required per unit of voting power (decimal string)
    pub stake_per_power: String,
}

impl ElectionConfig {
    /// Validate the power divisor.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.stake_per_power_u128()? == 0 {
            return Err(ConfigError::ZeroInterval {
                name: "stake_per_power",
            });
        }
        Ok(())
    }

    /// Stake per unit of voting power as an integer.
    pub fn stake_per_power_u128(&self) -> ConfigResult<u128> {
        parse_amount("stake_per_power", &self.stake_per_power)
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            stake_per_power: "1000000000000000000".to_string(), // 1 token
        }
    }
}

// =============================================================================
// Attestation Configuration
// =============================================================================

/// Attestation acceptance window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationConfig {
    /// Attestations for blocks older than this many blocks are refused
    pub max_age_blocks: u64,
}

impl AttestationConfig {
    /// Validate the acceptance window.
    pub fn validate(&self) -> ConfigResult<()> {
        check_positive("max_age_blocks", self.max_age_blocks)
    }
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            max_age_blocks: 100,
        }
    }
}

// =============================================================================
// Slashing Configuration
// =============================================================================

/// Penalty rates (basis points of current stake) and jail parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashingConfig {
    /// Slash for a leader timeout
    pub timeout_bps: BasisPoints,

    /// Slash for producing an invalid block
    pub invalid_block_bps: BasisPoints,

    /// Slash for signing two hashes at the same height
    pub double_sign_bps: BasisPoints,

    /// Slash for uptime below the threshold
    pub downtime_bps: BasisPoints,

    /// Slash for ignoring a force-inclusion request
    pub censorship_bps: BasisPoints,

    /// Blocks a jailed participant must wait before unjailing
    pub jail_duration_blocks: u64,

    /// Uptime below this value (basis points) is a downtime offense
    pub uptime_threshold_bps: BasisPoints,
}

impl SlashingConfig {
    /// Validate every rate is a fraction of stake.
    pub fn validate(&self) -> ConfigResult<()> {
        check_bps("timeout_bps", self.timeout_bps)?;
        check_bps("invalid_block_bps", self.invalid_block_bps)?;
        check_bps("double_sign_bps", self.double_sign_bps)?;
        check_bps("downtime_bps", self.downtime_bps)?;
        check_bps("censorship_bps", self.censorship_bps)?;
        check_bps("uptime_threshold_bps", self.uptime_threshold_bps)?;
        Ok(())
    }
}

impl Default for SlashingConfig {
    fn default() -> Self {
        Self {
            timeout_bps: 1000,       // 10%
            invalid_block_bps: 5000, // 50%
            double_sign_bps: 5000,   // 50%
            downtime_bps: 500,       // 5%
            censorship_bps: 500,     // 5%
            jail_duration_blocks: 1000,
            uptime_threshold_bps: 9900, // 99%
        }
    }
}

// =============================================================================
// Epoch Configuration
// =============================================================================

/// Epoch length in wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Seconds an epoch lasts before it may be advanced
    pub duration_secs: u64,
}

impl EpochConfig {
    /// Validate the epoch length.
    pub fn validate(&self) -> ConfigResult<()> {
        check_positive("duration_secs", self.duration_secs)
    }
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            duration_secs: 86_400,
        }
    }
}

// =============================================================================
// Force Inclusion Configuration
// =============================================================================

/// Censorship-resistance queue parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceInclusionConfig {
    /// Blocks a request may stay pending before the leader is charged
    pub window_blocks: u64,

    /// The only account allowed to confirm inclusion
    pub oracle: Address,
}

impl ForceInclusionConfig {
    /// Validate the window and oracle.
    pub fn validate(&self) -> ConfigResult<()> {
        check_positive("window_blocks", self.window_blocks)?;
        if self.oracle.is_zero() {
            return Err(ConfigError::InvalidSystemAccount {
                name: "oracle",
                reason: "must not be the zero address",
            });
        }
        Ok(())
    }
}

impl Default for ForceInclusionConfig {
    fn default() -> Self {
        Self {
            window_blocks: 50,
            oracle: Address::from_low_u64_be(0x0AC1E),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl LoggingConfig {
    /// Validate level and format names.
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
