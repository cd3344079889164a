//! AES-256-CBC/PKCS#7 encryption of single text fields.
//!
//! Every call draws a fresh 16-byte IV from the OS RNG; ciphertext and IV leave as
//! standard Base64 (padded) so they can sit in text columns. There is no MAC: a bad
//! padding block or invalid UTF-8 after decryption is the only tamper signal.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use nousguard_core::crypto::{CryptoError, EncryptedField};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::key_provider::KeyHandle;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size; also the IV length.
pub const BLOCK_LEN: usize = 16;

/// Encrypt `plaintext` under `key` with a freshly generated IV.
#[instrument(skip_all, fields(alias = %key.alias(), len = plaintext.len()))]
pub fn encrypt(plaintext: &str, key: &KeyHandle) -> Result<EncryptedField, CryptoError> {
    let mut iv = [0u8; BLOCK_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::encryption_failed(format!("iv generation failed: {e}")))?;

    let cipher = Aes256CbcEnc::new_from_slices(key.bytes(), &iv)
        .map_err(|e| CryptoError::encryption_failed(format!("cipher init failed: {e}")))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    debug!("field encrypted");
    Ok(EncryptedField {
        ciphertext: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(iv),
    })
}

/// Recover the plaintext of a `(ciphertext, iv)` pair produced by [`encrypt`].
#[instrument(skip_all, fields(alias = %key.alias()))]
pub fn decrypt(ciphertext: &str, iv: &str, key: &KeyHandle) -> Result<String, CryptoError> {
    let result = decrypt_inner(ciphertext, iv, key);
    match &result {
        Ok(_) => debug!("field decrypted"),
        Err(err) => warn!(error = %err, "field decryption failed"),
    }
    result
}

pub fn decrypt_field(field: &EncryptedField, key: &KeyHandle) -> Result<String, CryptoError> {
    decrypt(&field.ciphertext, &field.iv, key)
}

fn decrypt_inner(ciphertext: &str, iv: &str, key: &KeyHandle) -> Result<String, CryptoError> {
    let ciphertext = decode("ciphertext", ciphertext)?;
    let iv = decode("iv", iv)?;

    if iv.len() != BLOCK_LEN {
        return Err(CryptoError::decryption_failed(format!(
            "iv must be {BLOCK_LEN} bytes, got {}",
            iv.len()
        )));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::decryption_failed(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_LEN}",
            ciphertext.len()
        )));
    }

    let cipher = Aes256CbcDec::new_from_slices(key.bytes(), &iv)
        .map_err(|e| CryptoError::decryption_failed(format!("cipher init failed: {e}")))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CryptoError::decryption_failed("invalid padding"))?,
    );

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CryptoError::decryption_failed("plaintext is not valid UTF-8"))
}

/// Standard Base64 decode. Embedded line breaks are tolerated since some
/// encoders wrap long output.
fn decode(label: &str, text: &str) -> Result<Vec<u8>, CryptoError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| CryptoError::decryption_failed(format!("{label} is not valid base64: {e}")))
}
