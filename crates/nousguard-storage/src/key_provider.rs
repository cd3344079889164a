use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use nousguard_core::crypto::CryptoError;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use zeroize::ZeroizeOnDrop;

/// Alias the journal key is stored under.
pub const DEFAULT_KEY_ALIAS: &str = "nousguard_encryption_key";

pub const KEY_LEN: usize = 32;

const LOAD_CHECK_ACCOUNT: &str = "nousguard-load-check";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Aes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Cbc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    Pkcs7,
}

/// Generation parameters registered with the key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub algorithm: KeyAlgorithm,
    pub key_size_bits: u16,
    pub block_mode: BlockMode,
    pub padding: Padding,
    pub purpose_encrypt: bool,
    pub purpose_decrypt: bool,
    /// Callers may not supply their own IV when encrypting.
    pub randomized_encryption_required: bool,
    /// Presence is checked once at startup, not per key use.
    pub user_authentication_required: bool,
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Aes,
            key_size_bits: 256,
            block_mode: BlockMode::Cbc,
            padding: Padding::Pkcs7,
            purpose_encrypt: true,
            purpose_decrypt: true,
            randomized_encryption_required: true,
            user_authentication_required: false,
        }
    }
}

impl KeySpec {
    fn validate(&self) -> Result<(), KeyStoreError> {
        if self.key_size_bits as usize != KEY_LEN * 8 {
            return Err(KeyStoreError::Generation(format!(
                "unsupported key size: {} bits",
                self.key_size_bits
            )));
        }
        if !(self.purpose_encrypt && self.purpose_decrypt) {
            return Err(KeyStoreError::Generation(
                "key must allow both encrypt and decrypt".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(ZeroizeOnDrop)]
struct KeyMaterial {
    #[zeroize(skip)]
    alias: String,
    bytes: [u8; KEY_LEN],
}

/// Reference to the symmetric key. Raw bytes are only reachable by the field cipher
/// and are wiped when the last handle is dropped.
#[derive(Clone)]
pub struct KeyHandle {
    inner: Arc<KeyMaterial>,
}

impl KeyHandle {
    pub fn from_bytes(alias: impl Into<String>, bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Arc::new(KeyMaterial {
                alias: alias.into(),
                bytes,
            }),
        }
    }

    pub fn alias(&self) -> &str {
        &self.inner.alias
    }

    /// True when both handles refer to identical key material.
    pub fn same_key(&self, other: &KeyHandle) -> bool {
        self.inner
            .bytes
            .iter()
            .zip(other.inner.bytes.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.inner.bytes
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("alias", &self.inner.alias)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("key store unavailable: {0}")]
    Unavailable(String),
}

impl From<KeyStoreError> for CryptoError {
    fn from(err: KeyStoreError) -> Self {
        CryptoError::key_unavailable(err)
    }
}

/// Secure key store capability (OS keychain in production; memory in tests).
#[async_trait]
pub trait SecureKeyStore: Send + Sync {
    /// Open the store. Called before every lookup.
    async fn load(&self) -> Result<(), KeyStoreError>;

    async fn get_key(&self, alias: &str) -> Result<Option<KeyHandle>, KeyStoreError>;

    async fn generate_and_store_key(
        &self,
        alias: &str,
        spec: &KeySpec,
    ) -> Result<KeyHandle, KeyStoreError>;
}

/// Owns the lifecycle of the single journal key: loaded if present, generated once if not.
pub struct KeyCustodian<S: SecureKeyStore> {
    store: S,
    alias: String,
    spec: KeySpec,
    key: OnceCell<KeyHandle>,
}

impl<S: SecureKeyStore> KeyCustodian<S> {
    pub fn new(store: S) -> Self {
        Self::with_alias(store, DEFAULT_KEY_ALIAS)
    }

    pub fn with_alias(store: S, alias: impl Into<String>) -> Self {
        Self {
            store,
            alias: alias.into(),
            spec: KeySpec::default(),
            key: OnceCell::new(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the key under the alias, generating and storing it on first use.
    /// Concurrent first-time callers wait on a single creation; a failed attempt
    /// leaves nothing cached so a later call starts over.
    #[instrument(skip_all, fields(alias = %self.alias))]
    pub async fn get_or_create_key(&self) -> Result<KeyHandle, CryptoError> {
        self.key
            .get_or_try_init(|| self.load_or_generate())
            .await
            .cloned()
    }

    async fn load_or_generate(&self) -> Result<KeyHandle, CryptoError> {
        self.try_load_or_generate().await.map_err(|err| {
            warn!(error = %err, "key custodian could not provide a key");
            CryptoError::from(err)
        })
    }

    async fn try_load_or_generate(&self) -> Result<KeyHandle, KeyStoreError> {
        self.store.load().await?;
        if let Some(existing) = self.store.get_key(&self.alias).await? {
            debug!("existing key retrieved from key store");
            return Ok(existing);
        }
        let created = self
            .store
            .generate_and_store_key(&self.alias, &self.spec)
            .await?;
        info!("new key generated and stored");
        Ok(created)
    }
}

/// OS keyring-backed store. Uses the `keyring` crate; the key is kept Base64 encoded
/// under `(service, alias)`.
pub struct KeyringKeyStore {
    service: String,
}

impl KeyringKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(service: &str, alias: &str) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(service, alias).map_err(|e| KeyStoreError::Keyring(e.to_string()))
    }
}

#[async_trait]
impl SecureKeyStore for KeyringKeyStore {
    /// Opens an entry handle against the platform backend without reading a secret.
    async fn load(&self) -> Result<(), KeyStoreError> {
        if self.service.trim().is_empty() {
            return Err(KeyStoreError::Unavailable(
                "keyring service name is empty".to_string(),
            ));
        }
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || {
            Self::entry(&service, LOAD_CHECK_ACCOUNT)
                .map(|_| ())
                .map_err(|e| KeyStoreError::Unavailable(e.to_string()))
        })
        .await
        .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?
    }

    async fn get_key(&self, alias: &str) -> Result<Option<KeyHandle>, KeyStoreError> {
        let service = self.service.clone();
        let alias = alias.to_string();
        // Keyring calls block on platform IPC.
        tokio::task::spawn_blocking(move || {
            let entry = Self::entry(&service, &alias)?;
            key_from_secret(&alias, entry.get_password())
        })
        .await
        .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?
    }

    async fn generate_and_store_key(
        &self,
        alias: &str,
        spec: &KeySpec,
    ) -> Result<KeyHandle, KeyStoreError> {
        spec.validate()?;
        let service = self.service.clone();
        let alias = alias.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Self::entry(&service, &alias)?;
            let key = generate_key(&alias)?;
            entry
                .set_password(&encode_key(&key))
                .map_err(|e| KeyStoreError::Keyring(e.to_string()))?;
            // Read back through a fresh entry so a backend that drops writes fails here
            // instead of yielding a new key on every start.
            let stored = key_from_secret(&alias, Self::entry(&service, &alias)?.get_password());
            verify_persisted(&key, stored)?;
            Ok(key)
        })
        .await
        .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?
    }
}

/// In-memory key store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    keys: Arc<Mutex<HashMap<String, KeyHandle>>>,
    generated: Arc<AtomicUsize>,
    failures_remaining: Arc<AtomicUsize>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `load` fails the next `failures` times.
    pub fn failing(failures: usize) -> Self {
        let store = Self::default();
        store.failures_remaining.store(failures, Ordering::SeqCst);
        store
    }

    /// A store that never becomes available.
    pub fn unavailable() -> Self {
        Self::failing(usize::MAX)
    }

    /// Number of keys generated so far.
    pub fn generated_count(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, KeyHandle>>, KeyStoreError> {
        self.keys
            .lock()
            .map_err(|err| KeyStoreError::Unavailable(format!("lock poisoned: {err}")))
    }
}

#[async_trait]
impl SecureKeyStore for InMemoryKeyStore {
    async fn load(&self) -> Result<(), KeyStoreError> {
        let outcome =
            self.failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                    match remaining {
                        0 => None,
                        usize::MAX => Some(usize::MAX),
                        n => Some(n - 1),
                    }
                });
        match outcome {
            Ok(_) => Err(KeyStoreError::Unavailable(
                "simulated key store outage".to_string(),
            )),
            Err(_) => Ok(()),
        }
    }

    async fn get_key(&self, alias: &str) -> Result<Option<KeyHandle>, KeyStoreError> {
        Ok(self.lock()?.get(alias).cloned())
    }

    async fn generate_and_store_key(
        &self,
        alias: &str,
        spec: &KeySpec,
    ) -> Result<KeyHandle, KeyStoreError> {
        spec.validate()?;
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        let key = generate_key(alias)?;
        self.lock()?.insert(alias.to_string(), key.clone());
        self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }
}

fn generate_key(alias: &str) -> Result<KeyHandle, KeyStoreError> {
    let mut bytes = [0u8; KEY_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| KeyStoreError::Generation(e.to_string()))?;
    Ok(KeyHandle::from_bytes(alias, bytes))
}

fn key_from_secret(
    alias: &str,
    secret: Result<String, keyring::Error>,
) -> Result<Option<KeyHandle>, KeyStoreError> {
    match secret {
        Ok(secret) => decode_key(alias, &secret).map(Some),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(KeyStoreError::Keyring(err.to_string())),
    }
}

fn verify_persisted(
    expected: &KeyHandle,
    stored: Result<Option<KeyHandle>, KeyStoreError>,
) -> Result<(), KeyStoreError> {
    match stored {
        Ok(Some(stored)) if stored.same_key(expected) => Ok(()),
        Ok(Some(_)) => Err(KeyStoreError::Unavailable(
            "key read back from keyring differs from the stored key".to_string(),
        )),
        Ok(None) => Err(KeyStoreError::Unavailable(
            "keyring did not persist the generated key".to_string(),
        )),
        Err(err) => Err(KeyStoreError::Unavailable(format!(
            "key read-back failed: {err}"
        ))),
    }
}

fn encode_key(key: &KeyHandle) -> String {
    general_purpose::STANDARD.encode(key.bytes())
}

fn decode_key(alias: &str, secret: &str) -> Result<KeyHandle, KeyStoreError> {
    let mut bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyStoreError::Decode(e.to_string()))?;

    if bytes.len() != KEY_LEN {
        return Err(KeyStoreError::Decode(format!(
            "expected {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&bytes);
    zeroize::Zeroize::zeroize(&mut bytes);
    Ok(KeyHandle::from_bytes(alias, out))
}
