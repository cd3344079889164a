use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the key custodian and the field cipher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The secure key store could not be reached or key generation failed.
    /// Fatal to every encrypt/decrypt attempt until resolved.
    #[error("encryption key unavailable: {reason}")]
    KeyUnavailable { reason: String },
    /// Cipher initialization or transformation failed; nothing was produced.
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },
    /// Malformed encoding, wrong key, or tampered ciphertext.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },
}

impl CryptoError {
    pub fn key_unavailable(reason: impl ToString) -> Self {
        Self::KeyUnavailable {
            reason: reason.to_string(),
        }
    }

    pub fn encryption_failed(reason: impl ToString) -> Self {
        Self::EncryptionFailed {
            reason: reason.to_string(),
        }
    }

    pub fn decryption_failed(reason: impl ToString) -> Self {
        Self::DecryptionFailed {
            reason: reason.to_string(),
        }
    }

    /// Whether the failure is confined to a single record.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DecryptionFailed { .. })
    }
}

/// One encrypted text field as stored: ciphertext and IV, each standard Base64.
/// The two values are only meaningful together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    pub ciphertext: String,
    pub iv: String,
}

impl EncryptedField {
    pub fn new(ciphertext: impl Into<String>, iv: impl Into<String>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            iv: iv.into(),
        }
    }
}
