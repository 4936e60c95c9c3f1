//! # Block Attestations
//!
//! Validators sign `(block_number, block_hash)` under the attestation domain.
//! Each accepted attestation adds the validator's current voting power to the
//! aggregate for that hash; a hash is final once its aggregate reaches the
//! quorum of the current total power.
//!
//! Re-submitting an attestation for a hash already attested by the same
//! validator is accepted without counting it again. Attesting a different hash
//! at an already-attested height is accepted and reported as an equivocation;
//! punishing it requires explicit double-sign evidence.
//!
//! Only heights within `max_age_blocks` of the current block accept
//! attestations or evidence, so [`AttestationLedger::prune`] drops everything
//! recorded for older heights.

use cadence_crypto::Signature;
use cadence_types::{Address, BlockNumber, Role, VotingPower, H256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::election::{quorum_threshold, WeightedElection};
use crate::error::{ConsensusError, ConsensusResult};
use crate::registry::ParticipantRegistry;
use crate::signer::SignerRecovery;
use crate::types::{domains, ParticipantStatus};

/// Bytes a validator signs to attest `block_hash` at `block_number`.
pub fn attestation_signing_bytes(chain_id: u64, block_number: BlockNumber, block_hash: &H256) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(domains::ATTESTATION.len() + 8 + 8 + 32);
    bytes.extend_from_slice(domains::ATTESTATION);
    bytes.extend_from_slice(&chain_id.to_be_bytes());
    bytes.extend_from_slice(&block_number.to_be_bytes());
    bytes.extend_from_slice(block_hash.as_bytes());
    bytes
}

/// An accepted attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Attesting validator
    pub validator: Address,
    /// Attested height
    pub block_number: BlockNumber,
    /// Attested hash
    pub block_hash: H256,
    /// Validator's signature over the attestation bytes
    pub signature: Signature,
    /// Power counted for this attestation
    pub voting_power: VotingPower,
    /// Block at which it was accepted
    pub submitted_at: BlockNumber,
}

/// Attestations collected for one block hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAttestations {
    /// Height of the hash
    pub block_number: BlockNumber,
    /// Attestations by validator
    pub attesters: BTreeMap<Address, Attestation>,
    /// Summed power of the attestations
    pub aggregate_power: VotingPower,
    /// Block at which the aggregate first reached quorum
    pub finalized_at: Option<BlockNumber>,
}

/// Result of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Counted toward the aggregate
    Accepted {
        /// Aggregate after counting
        aggregate_power: VotingPower,
        /// Whether this attestation brought the hash to quorum
        finalized: bool,
        /// Hash the validator attested earlier at the same height, if different
        conflicting: Option<H256>,
    },
    /// Already counted; nothing changed
    Duplicate,
}

/// Two signed attestations by one validator for different hashes at one height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleSignEvidence {
    /// Accused validator
    pub validator: Address,
    /// Height of both attestations
    pub block_number: BlockNumber,
    /// First hash
    pub hash_a: H256,
    /// Signature over the first hash
    pub signature_a: Signature,
    /// Second hash
    pub hash_b: H256,
    /// Signature over the second hash
    pub signature_b: Signature,
}

impl DoubleSignEvidence {
    /// Identifier of the evidence, independent of the order of the two hashes.
    pub fn evidence_hash(&self) -> H256 {
        let (low, high) = if self.hash_a <= self.hash_b {
            (self.hash_a, self.hash_b)
        } else {
            (self.hash_b, self.hash_a)
        };
        H256::keccak256_concat(&[
            domains::EVIDENCE,
            self.validator.as_bytes(),
            &self.block_number.to_be_bytes(),
            low.as_bytes(),
            high.as_bytes(),
        ])
    }
}

/// Attestation aggregates, finality and processed evidence for recent heights.
#[derive(Debug, Clone)]
pub struct AttestationLedger {
    chain_id: u64,
    max_age_blocks: u64,
    blocks: BTreeMap<H256, BlockAttestations>,
    first_seen: HashMap<(Address, BlockNumber), H256>,
    processed_evidence: BTreeMap<H256, BlockNumber>,
}

impl AttestationLedger {
    /// Creates an empty ledger.
    pub fn new(chain_id: u64, max_age_blocks: u64) -> Self {
        Self {
            chain_id,
            max_age_blocks,
            blocks: BTreeMap::new(),
            first_seen: HashMap::new(),
            processed_evidence: BTreeMap::new(),
        }
    }

    /// Chain identifier mixed into signed bytes.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Bytes to sign for an attestation on this chain.
    pub fn signing_bytes(&self, block_number: BlockNumber, block_hash: &H256) -> Vec<u8> {
        attestation_signing_bytes(self.chain_id, block_number, block_hash)
    }

    /// Collected attestations for a hash.
    pub fn attestations(&self, block_hash: &H256) -> Option<&BlockAttestations> {
        self.blocks.get(block_hash)
    }

    /// Aggregate power attested for a hash.
    pub fn aggregate_power(&self, block_hash: &H256) -> VotingPower {
        self.blocks.get(block_hash).map_or(0, |b| b.aggregate_power)
    }

    /// Whether the hash's aggregate meets the quorum of `total_power`.
    pub fn is_finalized(&self, block_hash: &H256, total_power: VotingPower) -> bool {
        self.aggregate_power(block_hash) >= quorum_threshold(total_power)
    }

    /// Whether evidence with this hash was already acted on.
    pub fn is_evidence_processed(&self, evidence_hash: &H256) -> bool {
        self.processed_evidence.contains_key(evidence_hash)
    }

    /// Number of hashes with collected attestations.
    pub fn tracked_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn check_age(&self, block_number: BlockNumber, now: BlockNumber) -> ConsensusResult<()> {
        if block_number.saturating_add(self.max_age_blocks) < now {
            return Err(ConsensusError::AttestationTooOld {
                block_number,
                current: now,
                max_age: self.max_age_blocks,
            });
        }
        Ok(())
    }

    /// Drops attestations, equivocation tracking and processed evidence for
    /// heights that can no longer be attested at `now`.
    pub fn prune(&mut self, now: BlockNumber) -> usize {
        let max_age = self.max_age_blocks;
        let live = |height: BlockNumber| height.saturating_add(max_age) >= now;

        let before = self.blocks.len();
        self.blocks.retain(|_, block| live(block.block_number));
        self.first_seen.retain(|(_, height), _| live(*height));
        self.processed_evidence.retain(|_, height| live(*height));

        let pruned = before - self.blocks.len();
        if pruned > 0 {
            debug!(pruned, now, max_age, "Pruned expired attestations");
        }
        pruned
    }

    /// Validates and counts an attestation.
    pub fn submit<R: SignerRecovery>(
        &mut self,
        validators: &ParticipantRegistry<WeightedElection>,
        recovery: &R,
        attestation: Attestation,
        now: BlockNumber,
    ) -> ConsensusResult<SubmitOutcome> {
        let validator = validators.require_active(&attestation.validator)?;
        let power = validator.voting_power;
        self.check_age(attestation.block_number, now)?;

        let message = self.signing_bytes(attestation.block_number, &attestation.block_hash);
        let signer = recovery.recover_signer(&message, &attestation.signature);
        if signer != Some(attestation.validator) {
            return Err(ConsensusError::InvalidSignature(format!(
                "attestation for {} at block {} not signed by {}",
                attestation.block_hash, attestation.block_number, attestation.validator
            )));
        }

        let key = (attestation.validator, attestation.block_number);
        let conflicting = match self.first_seen.get(&key) {
            Some(first) if *first != attestation.block_hash => Some(*first),
            Some(_) => None,
            None => {
                self.first_seen.insert(key, attestation.block_hash);
                None
            }
        };

        let quorum = validators.quorum();
        let entry = self
            .blocks
            .entry(attestation.block_hash)
            .or_insert_with(|| BlockAttestations {
                block_number: attestation.block_number,
                ..Default::default()
            });
        if entry.attesters.contains_key(&attestation.validator) {
            debug!(
                validator = %attestation.validator,
                block_hash = %attestation.block_hash,
                "Duplicate attestation ignored"
            );
            return Ok(SubmitOutcome::Duplicate);
        }

        let validator_address = attestation.validator;
        let block_hash = attestation.block_hash;
        entry.aggregate_power = entry.aggregate_power.saturating_add(power);
        entry.attesters.insert(
            validator_address,
            Attestation {
                voting_power: power,
                submitted_at: now,
                ..attestation
            },
        );

        let finalized = entry.finalized_at.is_none() && entry.aggregate_power >= quorum;
        if finalized {
            entry.finalized_at = Some(now);
            info!(
                block_hash = %block_hash,
                block_number = entry.block_number,
                aggregate = entry.aggregate_power,
                quorum,
                "Block finalized"
            );
        }
        if let Some(first) = conflicting {
            warn!(
                validator = %validator_address,
                block_number = entry.block_number,
                first = %first,
                second = %block_hash,
                "Conflicting attestations observed"
            );
        }
        debug!(
            validator = %validator_address,
            block_hash = %block_hash,
            power,
            aggregate = entry.aggregate_power,
            "Attestation accepted"
        );

        Ok(SubmitOutcome::Accepted {
            aggregate_power: entry.aggregate_power,
            finalized,
            conflicting,
        })
    }

    /// Verifies double-sign evidence and returns its hash.
    ///
    /// The validator must be registered and not deactivated (jailed is fine),
    /// the height must still be within the attestation window, the hashes
    /// must differ and both signatures must recover to the validator.
    pub fn verify_double_sign<R: SignerRecovery>(
        &self,
        validators: &ParticipantRegistry<WeightedElection>,
        recovery: &R,
        evidence: &DoubleSignEvidence,
        now: BlockNumber,
    ) -> ConsensusResult<H256> {
        let accused = validators.require(&evidence.validator)?;
        if accused.status == ParticipantStatus::Deactivated {
            return Err(ConsensusError::NotActive {
                role: Role::Validator,
                identity: evidence.validator,
            });
        }
        self.check_age(evidence.block_number, now)?;

        if evidence.hash_a == evidence.hash_b {
            return Err(ConsensusError::InvalidSignature(
                "double-sign evidence must cover two different hashes".into(),
            ));
        }
        for (hash, signature) in [
            (&evidence.hash_a, &evidence.signature_a),
            (&evidence.hash_b, &evidence.signature_b),
        ] {
            let message = self.signing_bytes(evidence.block_number, hash);
            if recovery.recover_signer(&message, signature) != Some(evidence.validator) {
                return Err(ConsensusError::InvalidSignature(format!(
                    "evidence signature over {} not by {}",
                    hash, evidence.validator
                )));
            }
        }

        let evidence_hash = evidence.evidence_hash();
        if self.is_evidence_processed(&evidence_hash) {
            return Err(ConsensusError::EvidenceAlreadyProcessed(evidence_hash));
        }
        Ok(evidence_hash)
    }

    /// Marks evidence for a height as acted on.
    pub fn record_evidence(&mut self, evidence_hash: H256, block_number: BlockNumber) {
        self.processed_evidence.insert(evidence_hash, block_number);
    }
}
