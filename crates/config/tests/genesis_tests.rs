//! Tests for genesis participant validation

use cadence_config::{
    ConfigError, ElectionConfig, GenesisBalance, GenesisConfig, GenesisParticipant,
    RegistryConfig,
};
use cadence_types::{Address, Role};

fn registry() -> RegistryConfig {
    RegistryConfig {
        min_sequencer_stake: "1000".to_string(),
        min_validator_stake: "100".to_string(),
        ..RegistryConfig::default()
    }
}

fn election() -> ElectionConfig {
    ElectionConfig {
        stake_per_power: "10".to_string(),
    }
}

fn participant(id: u64, role: Role, stake: &str) -> GenesisParticipant {
    GenesisParticipant {
        address: Address::from_low_u64_be(id),
        role,
        stake: stake.to_string(),
        endpoint: String::new(),
        permanent: false,
    }
}

fn funded(id: u64, balance: &str) -> GenesisBalance {
    GenesisBalance {
        address: Address::from_low_u64_be(id),
        balance: balance.to_string(),
    }
}

#[test]
fn test_default_genesis_has_permanent_bootstrap() {
    let genesis = GenesisConfig::default();
    genesis.validate(&RegistryConfig::default(), &ElectionConfig::default()).unwrap();
    let bootstrap = &genesis.participants[0];
    assert!(bootstrap.permanent);
    assert_eq!(bootstrap.stake_u128().unwrap(), 0);
}

#[test]
fn test_valid_genesis() {
    let genesis = GenesisConfig {
        balances: vec![funded(1, "2000"), funded(2, "500")],
        participants: vec![
            participant(1, Role::Sequencer, "1000"),
            participant(1, Role::Validator, "200"),
            participant(2, Role::Validator, "500"),
        ],
    };
    genesis.validate(&registry(), &election()).unwrap();
    assert_eq!(genesis.participants_with_role(Role::Validator).count(), 2);
}

#[test]
fn test_duplicate_in_same_role() {
    let genesis = GenesisConfig {
        balances: vec![funded(1, "5000")],
        participants: vec![
            participant(1, Role::Sequencer, "1000"),
            participant(1, Role::Sequencer, "1000"),
        ],
    };
    assert!(matches!(
        genesis.validate(&registry(), &election()),
        Err(ConfigError::DuplicateParticipant { .. })
    ));
}

#[test]
fn test_stake_below_minimum() {
    let genesis = GenesisConfig {
        balances: vec![funded(1, "5000")],
        participants: vec![participant(1, Role::Sequencer, "999")],
    };
    assert!(matches!(
        genesis.validate(&registry(), &election()),
        Err(ConfigError::StakeBelowMinimum { .. })
    ));
}

#[test]
fn test_permanent_exempt_from_minimum() {
    let mut bootstrap = participant(9, Role::Sequencer, "0");
    bootstrap.permanent = true;
    let genesis = GenesisConfig {
        balances: Vec::new(),
        participants: vec![bootstrap],
    };
    genesis.validate(&registry(), &election()).unwrap();
}

#[test]
fn test_validator_without_power() {
    let mut validator = participant(3, Role::Validator, "9");
    validator.permanent = true;
    let genesis = GenesisConfig {
        balances: vec![funded(3, "9")],
        participants: vec![validator],
    };
    assert!(matches!(
        genesis.validate(&registry(), &election()),
        Err(ConfigError::ZeroVotingPower(_))
    ));
}

#[test]
fn test_unfunded_stake() {
    let genesis = GenesisConfig {
        balances: vec![funded(1, "1100")],
        participants: vec![
            participant(1, Role::Sequencer, "1000"),
            participant(1, Role::Validator, "200"),
        ],
    };
    assert!(matches!(
        genesis.validate(&registry(), &election()),
        Err(ConfigError::UnfundedStake { .. })
    ));
}
