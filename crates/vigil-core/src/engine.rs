//! Top-level supervisor engine.
//!
//! The engine owns the durable daemon registry and the map of currently
//! supervised daemons. Every control-plane operation goes through here;
//! the per-daemon work (spawning, waiting, signalling) is delegated to
//! supervisor tasks that call back into the engine to update records and
//! to deregister themselves.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::active::ActiveDaemon;
use crate::daemon::DaemonRecord;
use crate::key::{INITIAL_KEY_BYTES, MAX_KEY_COLLISIONS, generate_key};
use crate::store::{DaemonStore, StoreError};

/// How long engine shutdown waits for supervisor tasks to finish.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No record exists for the requested key.
    #[error("daemon not found")]
    NotFound,

    /// A caller-supplied key collides with an existing record.
    #[error("key already exists")]
    KeyConflict,

    /// Start was requested while the daemon is already supervised, or
    /// remove while a supervisor is still live.
    #[error("daemon already started")]
    AlreadyStarted,

    /// Stop, pause, or continue was requested with no live supervisor.
    #[error("daemon not started")]
    NotStarted,

    /// A signal was requested before the child produced a process group
    /// (the last spawn failed and the supervisor is in backoff).
    #[error("no live process group")]
    BadPid,

    /// Delivering a signal to the process group failed.
    #[error("failed to signal process group: {0}")]
    Signal(#[source] nix::errno::Errno),

    /// Durable-state failure.
    #[error(transparent)]
    Store(StoreError),

    /// The OS entropy source failed during key generation.
    #[error("entropy source failure: {0}")]
    Random(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::KeyConflict => Self::KeyConflict,
            other => Self::Store(other),
        }
    }
}

struct EngineInner {
    store: DaemonStore,
    /// The activity lock: writers are start, remove, and supervisor
    /// cleanup; everything else reads.
    active: RwLock<HashMap<String, Arc<ActiveDaemon>>>,
    shutting_down: AtomicBool,
}

/// Handle to the supervisor engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Opens the engine over `store` and resumes every enabled daemon.
    ///
    /// # Errors
    ///
    /// Returns any store failure; a failure here is fatal and the engine
    /// must not be used.
    pub async fn open(store: DaemonStore) -> Result<Self, EngineError> {
        let engine = Self {
            inner: Arc::new(EngineInner {
                store,
                active: RwLock::new(HashMap::new()),
                shutting_down: AtomicBool::new(false),
            }),
        };
        for record in engine.inner.store.list()? {
            if !record.disabled {
                info!(key = %record.key, "resuming daemon");
                engine.start(&record.key).await?;
            }
        }
        Ok(engine)
    }

    pub(crate) fn store(&self) -> &DaemonStore {
        &self.inner.store
    }

    pub(crate) fn active_map(&self) -> &RwLock<HashMap<String, Arc<ActiveDaemon>>> {
        &self.inner.active
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Every record in the store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on store failure.
    pub fn list(&self) -> Result<Vec<DaemonRecord>, EngineError> {
        Ok(self.inner.store.list()?)
    }

    /// A single record by key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when no record exists.
    pub fn get(&self, key: &str) -> Result<DaemonRecord, EngineError> {
        Ok(self.inner.store.get(key)?)
    }

    /// Registers a new daemon, born stopped and disabled.
    ///
    /// With `key = None` (or empty) a fresh short key is allocated; a
    /// caller-supplied key is used verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::KeyConflict`] when a caller-supplied key
    /// already exists and [`EngineError::Random`] when the entropy source
    /// fails.
    pub fn add(&self, key: Option<&str>, cmd: &str, dir: &str) -> Result<DaemonRecord, EngineError> {
        match key {
            Some(key) if !key.is_empty() => {
                let record = DaemonRecord::new(key.to_string(), cmd.to_string(), dir.to_string());
                self.inner.store.insert(&record)?;
                Ok(record)
            },
            _ => self.add_with_generated_key(cmd, dir),
        }
    }

    /// Allocates a fresh short key, retrying on collisions and growing
    /// the key length once the short namespace gets dense.
    fn add_with_generated_key(&self, cmd: &str, dir: &str) -> Result<DaemonRecord, EngineError> {
        let mut n = INITIAL_KEY_BYTES;
        let mut collisions = 0;
        loop {
            let key = generate_key(n).map_err(|e| EngineError::Random(e.to_string()))?;
            let record = DaemonRecord::new(key, cmd.to_string(), dir.to_string());
            match self.inner.store.insert(&record) {
                Ok(()) => return Ok(record),
                Err(StoreError::KeyConflict) => {
                    collisions += 1;
                    if collisions > MAX_KEY_COLLISIONS {
                        collisions = 0;
                        n += 1;
                    }
                },
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Deletes a daemon that is not currently supervised.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyStarted`] while a supervisor is live
    /// for the key and [`EngineError::NotFound`] for unknown keys.
    pub async fn remove(&self, key: &str) -> Result<(), EngineError> {
        let active = self.inner.active.write().await;
        if active.contains_key(key) {
            return Err(EngineError::AlreadyStarted);
        }
        // Unknown keys are an error at this level even though the store
        // delete itself is idempotent.
        self.inner.store.get(key)?;
        self.inner.store.delete(key)?;
        Ok(())
    }

    /// Enables a daemon and begins supervising it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyStarted`] when a supervisor already
    /// exists and [`EngineError::NotFound`] for unknown keys.
    pub async fn start(&self, key: &str) -> Result<(), EngineError> {
        let mut active = self.inner.active.write().await;
        if active.contains_key(key) {
            return Err(EngineError::AlreadyStarted);
        }
        self.inner.store.update(key, |d| d.disabled = false)?;
        let daemon = ActiveDaemon::spawn(self.clone(), key.to_string());
        active.insert(key.to_string(), daemon);
        Ok(())
    }

    /// Looks up the live supervisor for `key`.
    ///
    /// Takes the activity lock only for the lookup; the caller operates
    /// on the returned handle with the lock released.
    async fn active_daemon(&self, key: &str) -> Result<Arc<ActiveDaemon>, EngineError> {
        let active = self.inner.active.read().await;
        active.get(key).cloned().ok_or(EngineError::NotStarted)
    }

    /// Stops a daemon: SIGKILL to its process group, no respawn.
    ///
    /// Returns once the signal is sent. The record settles at
    /// `stopped`/disabled only after the child is reaped and the
    /// supervisor task has cleaned up.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotStarted`] with no live supervisor and
    /// [`EngineError::BadPid`] when the last spawn failed and there is no
    /// process group to signal.
    pub async fn stop(&self, key: &str) -> Result<(), EngineError> {
        self.active_daemon(key).await?.kill()
    }

    /// Pauses a daemon (SIGSTOP to its process group).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotStarted`] with no live supervisor.
    pub async fn pause(&self, key: &str) -> Result<(), EngineError> {
        self.active_daemon(key).await?.pause()
    }

    /// Resumes a paused daemon (SIGCONT to its process group).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotStarted`] with no live supervisor.
    pub async fn resume(&self, key: &str) -> Result<(), EngineError> {
        self.active_daemon(key).await?.resume()
    }

    /// Whether a supervisor is currently live for `key`.
    pub async fn is_active(&self, key: &str) -> bool {
        self.inner.active.read().await.contains_key(key)
    }

    /// Keys of all currently supervised daemons.
    pub async fn active_keys(&self) -> Vec<String> {
        self.inner.active.read().await.keys().cloned().collect()
    }

    /// Stops every supervised daemon for supervisor shutdown.
    ///
    /// Unlike an operator stop this keeps the records enabled, so the
    /// next engine launch resumes them. Waits briefly for supervisor
    /// tasks to drain; daemons stuck in spawn backoff are left for the
    /// process exit to collect.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        {
            let active = self.inner.active.read().await;
            if active.is_empty() {
                return;
            }
            info!(count = active.len(), "stopping supervised daemons");
        }
        // Kill on every drain pass: a daemon whose first spawn raced the
        // shutdown has no process group yet, so a single kill could miss
        // the child that lands a moment later.
        let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        loop {
            let remaining: Vec<Arc<ActiveDaemon>> =
                self.inner.active.read().await.values().cloned().collect();
            if remaining.is_empty() {
                return;
            }
            for daemon in &remaining {
                if let Err(err) = daemon.kill() {
                    debug!(%err, "shutdown kill");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    count = remaining.len(),
                    "supervisors did not drain before shutdown deadline"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
