//! Tests for Config module

use cadence_config::{
    parse_amount, ChainConfig, Config, ConfigError, ForceInclusionConfig, LoggingConfig,
    RegistryConfig, RotationConfig, SlashingConfig,
};
use cadence_types::Address;
use std::io::Write;

const SAMPLE: &str = r#"
[chain]
chain_id = 42
chain_name = "cadence-test"

[registry]
min_sequencer_stake = "1000"
min_validator_stake = "100"
managers = ["0x00000000000000000000000000000000000000aa"]
escrow = "0x000000000000000000000000000000000000e5c0"
treasury = "0x0000000000000000000000000000000000007ea5"

[rotation]
rotation_interval_blocks = 100
timeout_blocks = 10
max_timeouts = 3

[election]
stake_per_power = "1"

[slashing]
timeout_bps = 1000
invalid_block_bps = 5000
double_sign_bps = 5000
downtime_bps = 500
censorship_bps = 500
jail_duration_blocks = 20
uptime_threshold_bps = 9900

[epoch]
duration_secs = 3600

[force_inclusion]
window_blocks = 50
oracle = "0x00000000000000000000000000000000000000cc"

[logging]
level = "debug"
format = "json"

[[genesis.balances]]
address = "0x0000000000000000000000000000000000000001"
balance = "5000"

[[genesis.participants]]
address = "0x0000000000000000000000000000000000000001"
role = "sequencer"
stake = "1000"
endpoint = "http://seq-1:8545"

[[genesis.participants]]
address = "0x0000000000000000000000000000000000000001"
role = "validator"
stake = "300"
"#;

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    config.validate().unwrap();
    assert_eq!(config.rotation.rotation_interval_blocks, 100);
    assert_eq!(config.rotation.timeout_blocks, 10);
    assert_eq!(config.force_inclusion.window_blocks, 50);
    assert_eq!(config.slashing.uptime_threshold_bps, 9900);
}

#[test]
fn test_parse_sample() {
    let config = Config::from_str(SAMPLE).unwrap();
    assert_eq!(config.chain.chain_id, 42);
    assert_eq!(config.registry.min_sequencer_stake_u128().unwrap(), 1000);
    assert_eq!(config.registry.managers, vec![Address::from_low_u64_be(0xaa)]);
    assert_eq!(config.force_inclusion.oracle, Address::from_low_u64_be(0xcc));
    assert_eq!(config.genesis.participants.len(), 2);
    assert_eq!(config.logging.format, "json");
    // [attestation] omitted, default applies
    assert_eq!(config.attestation.max_age_blocks, 100);
}

#[test]
fn test_invalid_chain_id() {
    let config = ChainConfig {
        chain_id: 0,
        ..ChainConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidChainId)));
}

#[test]
fn test_timeout_must_be_shorter_than_rotation() {
    let config = RotationConfig {
        rotation_interval_blocks: 10,
        timeout_blocks: 10,
        max_timeouts: 3,
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::TimeoutExceedsRotation { timeout: 10, interval: 10 })
    ));
}

#[test]
fn test_zero_rotation_interval() {
    let config = RotationConfig {
        rotation_interval_blocks: 0,
        ..RotationConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ZeroInterval { name: "rotation_interval_blocks" })
    ));
}

#[test]
fn test_slash_rate_over_100_percent() {
    let config = SlashingConfig {
        double_sign_bps: 10_001,
        ..SlashingConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidBasisPoints { name: "double_sign_bps", value: 10_001 })
    ));
}

#[test]
fn test_escrow_and_treasury_must_differ() {
    let mut config = RegistryConfig::default();
    config.treasury = config.escrow;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidSystemAccount { name: "treasury", .. })
    ));
}

#[test]
fn test_zero_min_stake_rejected() {
    let config = RegistryConfig {
        min_validator_stake: "0".to_string(),
        ..RegistryConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ZeroMinStake("min_validator_stake"))
    ));
}

#[test]
fn test_oracle_required() {
    let config = ForceInclusionConfig {
        oracle: Address::ZERO,
        ..ForceInclusionConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_logging_validation() {
    let mut config = LoggingConfig::default();
    config.validate().unwrap();
    config.level = "verbose".to_string();
    assert!(matches!(config.validate(), Err(ConfigError::InvalidLogLevel(_))));
    config.level = "info".to_string();
    config.format = "xml".to_string();
    assert!(matches!(config.validate(), Err(ConfigError::InvalidLogFormat(_))));
}

#[test]
fn test_parse_amount_accepts_underscores() {
    assert_eq!(parse_amount("x", "1_000_000").unwrap(), 1_000_000);
    assert!(matches!(
        parse_amount("x", "-5"),
        Err(ConfigError::InvalidAmount { name: "x", .. })
    ));
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence.toml");

    let original = Config::from_str(SAMPLE).unwrap();
    original.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.chain.chain_id, original.chain.chain_id);
    assert_eq!(loaded.registry.escrow, original.registry.escrow);
    assert_eq!(loaded.genesis.participants.len(), 2);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }));
}

#[test]
fn test_load_malformed_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[chain\nchain_id = ").unwrap();
    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::TomlParse(_)));
}
