//! Two-phase startup: key and store setup run once in the background, and
//! consumers await a single readiness result instead of polling for globals.

use std::{sync::Arc, time::Duration};

use nousguard_core::storage::JournalStore;
use nousguard_storage::key_provider::{KeyCustodian, SecureKeyStore};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::EncryptedJournalRepo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("initialization failed after {attempts} attempt(s): {reason}")]
    Exhausted { attempts: u32, reason: String },
    #[error("initialization task ended before reporting a result")]
    Aborted,
}

/// State published by a running bootstrap.
pub enum Readiness<S: JournalStore> {
    Pending,
    Ready(Arc<EncryptedJournalRepo<S>>),
    Failed(BootstrapError),
}

impl<S: JournalStore> Clone for Readiness<S> {
    fn clone(&self) -> Self {
        match self {
            Readiness::Pending => Readiness::Pending,
            Readiness::Ready(repo) => Readiness::Ready(Arc::clone(repo)),
            Readiness::Failed(err) => Readiness::Failed(err.clone()),
        }
    }
}

impl<S: JournalStore> Readiness<S> {
    fn is_terminal(&self) -> bool {
        !matches!(self, Readiness::Pending)
    }

    fn into_result(self) -> Result<Arc<EncryptedJournalRepo<S>>, BootstrapError> {
        match self {
            Readiness::Ready(repo) => Ok(repo),
            Readiness::Failed(err) => Err(err),
            Readiness::Pending => Err(BootstrapError::Aborted),
        }
    }
}

/// Obtain the journal key and check that the row store answers, retrying both
/// up to `policy.max_attempts` times.
#[instrument(skip_all, fields(max_attempts = policy.max_attempts))]
pub async fn initialize<K, S>(
    custodian: &KeyCustodian<K>,
    store: Arc<S>,
    policy: &RetryPolicy,
) -> Result<EncryptedJournalRepo<S>, BootstrapError>
where
    K: SecureKeyStore,
    S: JournalStore,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let reason = match custodian.get_or_create_key().await {
            Ok(key) => match store.list().await {
                Ok(rows) => {
                    info!(attempt, entries = rows.len(), "journal ready");
                    return Ok(EncryptedJournalRepo::from_shared(store, key));
                }
                Err(err) => format!("journal store: {err}"),
            },
            Err(err) => err.to_string(),
        };

        warn!(attempt, %reason, "journal initialization attempt failed");
        if attempt >= max_attempts {
            return Err(BootstrapError::Exhausted {
                attempts: attempt,
                reason,
            });
        }
        tokio::time::sleep(policy.delay).await;
    }
}

/// Receiving side of a spawned bootstrap.
pub struct ReadyHandle<S: JournalStore> {
    rx: watch::Receiver<Readiness<S>>,
}

impl<S: JournalStore> Clone for ReadyHandle<S> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<S: JournalStore> ReadyHandle<S> {
    /// Wait until initialization has either succeeded or permanently failed.
    pub async fn wait(&mut self) -> Result<Arc<EncryptedJournalRepo<S>>, BootstrapError> {
        let state = self
            .rx
            .wait_for(Readiness::is_terminal)
            .await
            .map_err(|_| BootstrapError::Aborted)?
            .clone();
        state.into_result()
    }

    /// Current state without waiting.
    pub fn current(&self) -> Readiness<S> {
        self.rx.borrow().clone()
    }
}

pub struct Bootstrap;

impl Bootstrap {
    /// Run [`initialize`] on a background task and return a handle to await it.
    pub fn spawn<K, S>(
        custodian: Arc<KeyCustodian<K>>,
        store: S,
        policy: RetryPolicy,
    ) -> ReadyHandle<S>
    where
        K: SecureKeyStore + 'static,
        S: JournalStore + 'static,
    {
        let (tx, rx) = watch::channel(Readiness::Pending);
        tokio::spawn(async move {
            let state = match initialize(&custodian, Arc::new(store), &policy).await {
                Ok(repo) => Readiness::Ready(Arc::new(repo)),
                Err(err) => Readiness::Failed(err),
            };
            tx.send_replace(state);
        });
        ReadyHandle { rx }
    }
}
