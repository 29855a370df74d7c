//! Single-flight coordination of fetch jobs
//!
//! The registry is the only mutable state shared between requests. Each entry
//! marks an identifier whose fetch pipeline is currently running; insertion is
//! an atomic insert-if-absent under one mutex, so two requests can never both
//! believe they own the same fetch.

use crate::models::AssetId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Tracks identifiers with a fetch in progress
#[derive(Debug, Default)]
pub struct JobRegistry {
    // The sender is never written to; dropping it on `end` wakes subscribers.
    jobs: Mutex<HashMap<AssetId, watch::Sender<()>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AssetId, watch::Sender<()>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id` if no job is running for it
    ///
    /// # Returns
    /// * `true` if the caller now owns the fetch and must call [`end`](Self::end)
    /// * `false` if another caller already owns it
    pub fn try_begin(&self, id: &AssetId) -> bool {
        let mut jobs = self.lock();
        if jobs.contains_key(id) {
            debug!("Fetch already in flight for {}", id);
            return false;
        }
        let (tx, _rx) = watch::channel(());
        jobs.insert(id.clone(), tx);
        debug!("Fetch registered for {} ({} in flight)", id, jobs.len());
        true
    }

    /// Deregister `id`
    ///
    /// Must be called exactly once per successful [`try_begin`](Self::try_begin),
    /// whatever the outcome of the fetch.
    pub fn end(&self, id: &AssetId) {
        let removed = self.lock().remove(id);
        if removed.is_none() {
            warn!("end() called for {} which was not registered", id);
        }
    }

    /// Scoped form of [`try_begin`](Self::try_begin)
    ///
    /// The returned guard deregisters `id` when dropped, including on panic or
    /// when the owning future is cancelled.
    pub fn try_acquire(self: &Arc<Self>, id: &AssetId) -> Option<JobGuard> {
        self.try_begin(id).then(|| JobGuard {
            registry: Arc::clone(self),
            id: id.clone(),
        })
    }

    /// Observe the end of the job running for `id`
    ///
    /// # Returns
    /// * `Some(receiver)` whose `changed()` resolves with an error once the job ends
    /// * `None` if no job is running
    pub fn subscribe(&self, id: &AssetId) -> Option<watch::Receiver<()>> {
        self.lock().get(id).map(|tx| tx.subscribe())
    }

    pub fn is_running(&self, id: &AssetId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of jobs in flight
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ownership of one in-flight fetch; releases the registry entry on drop
#[derive(Debug)]
pub struct JobGuard {
    registry: Arc<JobRegistry>,
    id: AssetId,
}

impl JobGuard {
    pub fn id(&self) -> &AssetId {
        &self.id
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.end(&self.id);
    }
}
