//! Log registry implementation
//!
//! The table that maps publisher ids to stream logs. It is the only state
//! touched by both the ingest path and the viewer path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tokio::sync::watch;

use crate::stats::StreamStats;
use crate::stream_log::{LogWriter, MemoryBackend, StorageBackend, StreamLog};

use super::config::{CreationWait, RegistryConfig};
use super::entry::{is_expired, Slot, SlotState};
use super::error::RegistryError;
use super::key::PublisherId;

#[derive(Default)]
struct Inner {
    /// Addressable logs and in-flight reservations
    logs: HashMap<PublisherId, Slot>,
    /// Logs replaced by a newer generation; kept until their viewers drain
    retired: Vec<Arc<StreamLog>>,
}

/// Process-wide table of stream logs
///
/// The map lock is a plain `std::sync::RwLock` that is never held across an
/// `.await`: storage for a new log is created outside the lock behind a
/// `Pending` reservation, so lookups for other publishers never wait on I/O.
pub struct LogRegistry {
    inner: RwLock<Inner>,
    backend: Arc<dyn StorageBackend>,
    config: RegistryConfig,
    next_generation: AtomicU64,
    /// Bumped whenever a log becomes addressable
    created: watch::Sender<u64>,
}

impl LogRegistry {
    /// Create a registry backed by in-memory storage
    pub fn new() -> Self {
        Self::with_backend(RegistryConfig::default(), Arc::new(MemoryBackend::new()))
    }

    /// Create a registry with custom configuration and storage
    pub fn with_backend(config: RegistryConfig, backend: Arc<dyn StorageBackend>) -> Self {
        let (created, _) = watch::channel(0);

        Self {
            inner: RwLock::new(Inner::default()),
            backend,
            config,
            next_generation: AtomicU64::new(1),
            created,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the exclusive writer for `id`, creating a fresh log
    ///
    /// Fails with `AlreadyPublishing` while another writer holds the id. A
    /// closed log left by an earlier publisher is replaced, never appended
    /// to; viewers already reading it keep draining it.
    pub async fn lookup_or_create(
        &self,
        id: &PublisherId,
        title: Option<String>,
    ) -> Result<LogWriter, RegistryError> {
        let reservation = self.reserve(id)?;

        let storage = match self.backend.create(id, reservation.generation).await {
            Ok(storage) => storage,
            Err(e) => {
                tracing::warn!(publisher = %id, error = %e, "Failed to create stream storage");
                return Err(RegistryError::Storage(e));
            }
        };

        let log = Arc::new(StreamLog::new(
            id.clone(),
            reservation.generation,
            title,
            storage,
            self.config.read_chunk_size,
        ));
        reservation.fulfill(Arc::clone(&log));
        self.created.send_modify(|n| *n = n.wrapping_add(1));

        tracing::info!(
            publisher = %id,
            generation = log.generation(),
            location = %log.location(),
            "Publisher registered"
        );

        Ok(LogWriter::new(log))
    }

    fn reserve<'a>(&'a self, id: &'a PublisherId) -> Result<Reservation<'a>, RegistryError> {
        let mut inner = self.write();

        if let Some(slot) = inner.logs.get(id) {
            if !slot.is_claimable() {
                tracing::warn!(publisher = %id, "Rejected second publisher");
                return Err(RegistryError::AlreadyPublishing(id.clone()));
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if let Some(Slot::Ready(stale)) = inner.logs.insert(id.clone(), Slot::Pending { generation }) {
            stale.close();
            tracing::info!(
                publisher = %id,
                generation = stale.generation(),
                viewers = stale.viewer_count(),
                "Replacing closed stream log"
            );
            inner.retired.push(stale);
        }

        Ok(Reservation {
            registry: self,
            id,
            generation,
            fulfilled: false,
        })
    }

    /// Resolve `id` to its log
    ///
    /// A log is visible from the moment it is created, before any bytes are
    /// appended, and stays visible after it closes until it is removed.
    pub fn lookup(&self, id: &PublisherId) -> Result<Arc<StreamLog>, RegistryError> {
        self.read()
            .logs
            .get(id)
            .and_then(Slot::log)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Resolve `id`, waiting up to `grace` for its log to be created
    ///
    /// Returns `NotFound` only once the full grace period has elapsed.
    pub async fn wait_for(
        &self,
        id: &PublisherId,
        grace: std::time::Duration,
    ) -> Result<Arc<StreamLog>, RegistryError> {
        let deadline = tokio::time::Instant::now() + grace;

        match self.config.creation_wait {
            CreationWait::Notify => {
                let mut created = self.created.subscribe();
                loop {
                    created.borrow_and_update();
                    if let Ok(log) = self.lookup(id) {
                        return Ok(log);
                    }

                    match tokio::time::timeout_at(deadline, created.changed()).await {
                        Ok(Ok(())) => continue,
                        Ok(Err(_)) | Err(_) => break,
                    }
                }
            }
            CreationWait::Poll => loop {
                if let Ok(log) = self.lookup(id) {
                    return Ok(log);
                }

                let now = tokio::time::Instant::now();
                if now >= deadline {
                    break;
                }
                let remaining = deadline - now;
                tokio::time::sleep(self.config.poll_interval.min(remaining)).await;
            },
        }

        tracing::debug!(publisher = %id, grace_ms = grace.as_millis() as u64, "Stream did not appear");
        Err(RegistryError::NotFound(id.clone()))
    }

    /// Release a writer whose ingest session has ended
    ///
    /// Closes the log; it stays readable until cleanup removes it.
    pub fn release(&self, writer: LogWriter) {
        let log = Arc::clone(writer.log());
        writer.close();

        tracing::info!(
            publisher = %log.id(),
            generation = log.generation(),
            bytes = log.write_offset(),
            viewers = log.viewer_count(),
            retention_secs = self.config.retention.as_secs(),
            "Publisher released"
        );
    }

    /// Remove `id` from the registry now
    ///
    /// An active writer is cut off (its next append fails with `Closed`).
    /// Storage is released once the log's viewers have drained.
    pub fn remove(&self, id: &PublisherId) -> Option<Arc<StreamLog>> {
        let mut inner = self.write();
        let log = match inner.logs.remove(id)? {
            Slot::Ready(log) => log,
            pending @ Slot::Pending { .. } => {
                inner.logs.insert(id.clone(), pending);
                return None;
            }
        };

        log.close();
        inner.retired.push(Arc::clone(&log));
        tracing::info!(publisher = %id, generation = log.generation(), "Stream removed");
        Some(log)
    }

    /// State of the slot for `id`, if any
    pub fn slot_state(&self, id: &PublisherId) -> Option<SlotState> {
        self.read().logs.get(id).map(Slot::state)
    }

    /// Check if `id` has a log with an active writer
    pub fn is_publishing(&self, id: &PublisherId) -> bool {
        self.slot_state(id) == Some(SlotState::Publishing)
    }

    /// Statistics for one stream
    pub fn stream_stats(&self, id: &PublisherId) -> Option<StreamStats> {
        self.lookup(id).ok().map(|log| log.stats())
    }

    /// Statistics for every addressable stream, ordered by publisher id
    pub fn list(&self) -> Vec<StreamStats> {
        let inner = self.read();
        let mut logs: Vec<&Arc<StreamLog>> = inner.logs.values().filter_map(Slot::log).collect();
        logs.sort_by(|a, b| a.id().cmp(b.id()));
        logs.into_iter().map(|log| log.stats()).collect()
    }

    /// Number of addressable streams
    pub fn stream_count(&self) -> usize {
        self.read().logs.values().filter(|s| s.log().is_some()).count()
    }

    /// Run cleanup once
    ///
    /// Removes logs that are closed, have no viewers, and have been closed
    /// for at least `retention`; releases storage of replaced logs once
    /// their viewers are gone. Returns the number of logs destroyed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.retention;

        let expired: Vec<Arc<StreamLog>> = {
            let mut inner = self.write();

            // `try_destroy` fails if a reader resolved the log and pinned it
            // since the expiry check; such a log survives this pass.
            let keys: Vec<PublisherId> = inner
                .logs
                .iter()
                .filter_map(|(key, slot)| match slot.log() {
                    Some(log) if is_expired(log, retention, now) && log.try_destroy() => {
                        Some(key.clone())
                    }
                    _ => None,
                })
                .collect();

            let mut expired: Vec<Arc<StreamLog>> = keys
                .iter()
                .filter_map(|key| match inner.logs.remove(key) {
                    Some(Slot::Ready(log)) => Some(log),
                    _ => None,
                })
                .collect();

            let (drained, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.retired)
                .into_iter()
                .partition(|log| log.try_destroy());
            inner.retired = waiting;
            expired.extend(drained);

            expired
        };

        for log in &expired {
            if self.config.remove_storage_on_expire {
                if let Err(e) = log.remove_storage().await {
                    tracing::warn!(
                        publisher = %log.id(),
                        location = %log.location(),
                        error = %e,
                        "Failed to remove stream storage"
                    );
                }
            }
            tracing::info!(
                publisher = %log.id(),
                generation = log.generation(),
                "Stream destroyed by cleanup"
            );
        }

        expired.len()
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }
}

impl Default for LogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// In-flight claim on a publisher slot
///
/// If the claiming future is dropped before storage is ready, the pending
/// slot is removed so the id does not stay locked.
struct Reservation<'a> {
    registry: &'a LogRegistry,
    id: &'a PublisherId,
    generation: u64,
    fulfilled: bool,
}

impl Reservation<'_> {
    fn fulfill(mut self, log: Arc<StreamLog>) {
        self.registry
            .write()
            .logs
            .insert(self.id.clone(), Slot::Ready(log));
        self.fulfilled = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.fulfilled {
            return;
        }

        let mut inner = self.registry.write();
        if matches!(
            inner.logs.get(self.id),
            Some(Slot::Pending { generation }) if *generation == self.generation
        ) {
            inner.logs.remove(self.id);
        }
    }
}
