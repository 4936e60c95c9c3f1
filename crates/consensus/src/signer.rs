//! Attribution of signatures to identities.

use cadence_crypto::Signature;
use cadence_types::Address;
use tracing::trace;

/// Recovers the identity that signed a message.
///
/// Returns `None` when the signature is malformed or does not recover.
pub trait SignerRecovery {
    /// Signer of `message` under `signature`, if any.
    fn recover_signer(&self, message: &[u8], signature: &Signature) -> Option<Address>;
}

/// secp256k1 recovery over `keccak256(message)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaRecovery;

impl SignerRecovery for EcdsaRecovery {
    fn recover_signer(&self, message: &[u8], signature: &Signature) -> Option<Address> {
        match signature.recover_address(message) {
            Ok(address) => Some(address),
            Err(err) => {
                trace!(error = %err, "Signature recovery failed");
                None
            }
        }
    }
}
