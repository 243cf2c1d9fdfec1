//! Cryptographic primitives behind the host function surface.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as Secp256k1Signature, VerifyingKey};
use thiserror::Error;

/// Length of a secp256k1 message hash.
const MESSAGE_HASH_LENGTH: usize = 32;
/// Length of a compact secp256k1 signature (r || s).
const SECP256K1_SIGNATURE_LENGTH: usize = 64;
/// Length of an ed25519 public key.
const ED25519_PUBKEY_LENGTH: usize = 32;
/// Length of an ed25519 signature.
const ED25519_SIGNATURE_LENGTH: usize = 64;

/// Malformed input to a cryptographic host function.
///
/// Verify-style functions surface these as numeric result codes; the codes
/// are part of the contract-facing ABI and must stay stable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CryptoError {
    #[error("invalid message hash format")]
    InvalidHashFormat,
    #[error("invalid signature format")]
    InvalidSignatureFormat,
    #[error("invalid public key format")]
    InvalidPubkeyFormat,
    #[error("invalid recovery parameter, must be 0 or 1")]
    InvalidRecoveryParam,
    #[error("batch verify error: {0}")]
    BatchErr(&'static str),
    #[error("{0}")]
    GenericErr(String),
}

impl CryptoError {
    /// Result code reported to the contract in place of a trap.
    /// 0 and 1 mean verified / not verified and are never produced here.
    pub(crate) fn code(&self) -> u32 {
        match self {
            CryptoError::InvalidHashFormat => 3,
            CryptoError::InvalidSignatureFormat => 4,
            CryptoError::InvalidPubkeyFormat => 5,
            CryptoError::InvalidRecoveryParam => 6,
            CryptoError::BatchErr(_) => 7,
            CryptoError::GenericErr(_) => 10,
        }
    }
}

/// ECDSA signature verification over secp256k1.
///
/// `message_hash` is the 32-byte digest the signer hashed; `signature` is the
/// 64-byte compact form; `public_key` is SEC1-encoded, compressed or not.
/// High-S signatures are normalized before verification.
pub(crate) fn secp256k1_verify(
    message_hash: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> Result<bool, CryptoError> {
    if message_hash.len() != MESSAGE_HASH_LENGTH {
        return Err(CryptoError::InvalidHashFormat);
    }
    if signature.len() != SECP256K1_SIGNATURE_LENGTH {
        return Err(CryptoError::InvalidSignatureFormat);
    }
    let signature = Secp256k1Signature::from_slice(signature)
        .map_err(|_| CryptoError::InvalidSignatureFormat)?;
    let signature = signature.normalize_s().unwrap_or(signature);
    let verifying_key =
        VerifyingKey::from_sec1_bytes(public_key).map_err(|_| CryptoError::InvalidPubkeyFormat)?;
    Ok(verifying_key.verify_prehash(message_hash, &signature).is_ok())
}

/// Recovers the uncompressed SEC1 public key (65 bytes) from a signature
/// over `message_hash`.
pub(crate) fn secp256k1_recover_pubkey(
    message_hash: &[u8],
    signature: &[u8],
    recovery_param: u8,
) -> Result<Vec<u8>, CryptoError> {
    if message_hash.len() != MESSAGE_HASH_LENGTH {
        return Err(CryptoError::InvalidHashFormat);
    }
    if signature.len() != SECP256K1_SIGNATURE_LENGTH {
        return Err(CryptoError::InvalidSignatureFormat);
    }
    if recovery_param > 1 {
        return Err(CryptoError::InvalidRecoveryParam);
    }
    let signature = Secp256k1Signature::from_slice(signature)
        .map_err(|_| CryptoError::InvalidSignatureFormat)?;
    let recovery_id =
        RecoveryId::try_from(recovery_param).map_err(|_| CryptoError::InvalidRecoveryParam)?;
    let recovered = VerifyingKey::recover_from_prehash(message_hash, &signature, recovery_id)
        .map_err(|e| CryptoError::GenericErr(e.to_string()))?;
    Ok(recovered.to_encoded_point(false).as_bytes().to_vec())
}

/// EdDSA signature verification over ed25519, using strict validation rules.
pub(crate) fn ed25519_verify(
    message: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> Result<bool, CryptoError> {
    if signature.len() != ED25519_SIGNATURE_LENGTH {
        return Err(CryptoError::InvalidSignatureFormat);
    }
    if public_key.len() != ED25519_PUBKEY_LENGTH {
        return Err(CryptoError::InvalidPubkeyFormat);
    }
    let public_key = ed25519_dalek::PublicKey::from_bytes(public_key)
        .map_err(|_| CryptoError::InvalidPubkeyFormat)?;
    let signature = ed25519_dalek::Signature::from_bytes(signature)
        .map_err(|_| CryptoError::InvalidSignatureFormat)?;
    Ok(public_key.verify_strict(message, &signature).is_ok())
}

/// Verifies a batch of ed25519 signatures.
///
/// `messages` and `public_keys` may each contain either one element applied
/// to every signature or exactly one element per signature. An empty batch
/// verifies trivially.
pub(crate) fn ed25519_batch_verify(
    messages: &[Vec<u8>],
    signatures: &[Vec<u8>],
    public_keys: &[Vec<u8>],
) -> Result<bool, CryptoError> {
    let count = signatures.len();
    if count == 0 {
        return if messages.is_empty() && public_keys.is_empty() {
            Ok(true)
        } else {
            Err(CryptoError::BatchErr("mismatched batch lengths"))
        };
    }
    if messages.len() != count && messages.len() != 1 {
        return Err(CryptoError::BatchErr(
            "number of messages must match signatures or be one",
        ));
    }
    if public_keys.len() != count && public_keys.len() != 1 {
        return Err(CryptoError::BatchErr(
            "number of public keys must match signatures or be one",
        ));
    }
    for i in 0..count {
        let message = if messages.len() == 1 { &messages[0] } else { &messages[i] };
        let public_key = if public_keys.len() == 1 {
            &public_keys[0]
        } else {
            &public_keys[i]
        };
        if !ed25519_verify(message, &signatures[i], public_key)? {
            return Ok(false);
        }
    }
    Ok(true)
}
