//! Worker registry: the live set of agents that can execute plan steps.
//!
//! Each worker has:
//! - A fixed capability set (action names it can handle)
//! - A status (Available, Busy, Offline)
//! - A heartbeat timestamp used for liveness detection
//!
//! Entries live in a [`DashMap`]. Every status change is a pure
//! copy-with-change on [`WorkerInfo`] written back under the entry's shard
//! lock, so concurrent updates never interleave on one worker.

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, OrchestrationEvent};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Idle and accepting work
    Available,
    /// Running at least one assignment
    Busy,
    /// Missed its heartbeat window
    Offline,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Busy => write!(f, "busy"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A registered worker ("agent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Unique worker id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Actions this worker can handle
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Current status
    #[serde(default = "default_status")]
    pub status: WorkerStatus,
    /// Last liveness signal
    #[serde(default = "Utc::now")]
    pub last_heartbeat: DateTime<Utc>,
    /// When the worker was (last) registered
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
    /// Assignments currently running on this worker
    #[serde(default)]
    pub active_tasks: u32,
    #[serde(skip)]
    sequence: u64,
}

fn default_status() -> WorkerStatus {
    WorkerStatus::Available
}

impl WorkerInfo {
    /// Create an available worker with no capabilities
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            capabilities: BTreeSet::new(),
            status: WorkerStatus::Available,
            last_heartbeat: now,
            registered_at: now,
            active_tasks: 0,
            sequence: 0,
        }
    }

    /// Add a capability
    #[must_use]
    pub fn with_capability(mut self, action: impl Into<String>) -> Self {
        self.capabilities.insert(action.into());
        self
    }

    /// Add several capabilities
    #[must_use]
    pub fn with_capabilities<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Override the last heartbeat (e.g. when restoring a known worker)
    #[must_use]
    pub fn with_last_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.last_heartbeat = at;
        self
    }

    /// Whether the worker declares `action`
    #[must_use]
    pub fn can_handle(&self, action: &str) -> bool {
        self.capabilities.contains(action)
    }

    /// Whether the worker is Available
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == WorkerStatus::Available
    }

    /// Time since the last heartbeat (zero if the heartbeat is in the future)
    #[must_use]
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_heartbeat).to_std().unwrap_or_default()
    }

    /// Copy with a new status
    #[must_use]
    pub fn with_status(&self, status: WorkerStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Copy with a fresh heartbeat
    #[must_use]
    pub fn heartbeat_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            last_heartbeat: at,
            ..self.clone()
        }
    }

    fn acquired(&self) -> Self {
        let status = match self.status {
            WorkerStatus::Offline => WorkerStatus::Offline,
            _ => WorkerStatus::Busy,
        };
        Self {
            status,
            active_tasks: self.active_tasks.saturating_add(1),
            ..self.clone()
        }
    }

    fn released(&self) -> Self {
        let active_tasks = self.active_tasks.saturating_sub(1);
        let status = if active_tasks == 0 && self.status == WorkerStatus::Busy {
            WorkerStatus::Available
        } else {
            self.status
        };
        Self {
            status,
            active_tasks,
            ..self.clone()
        }
    }
}

/// Registry of live workers.
///
/// Cloning is cheap; clones share the same underlying map.
#[derive(Debug, Clone)]
pub struct WorkerRegistry {
    workers: Arc<DashMap<String, WorkerInfo>>,
    count: Arc<AtomicUsize>,
    sequence: Arc<AtomicU64>,
    config: RegistryConfig,
    events: Option<EventBus>,
}

impl WorkerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            workers: Arc::new(DashMap::new()),
            count: Arc::new(AtomicUsize::new(0)),
            sequence: Arc::new(AtomicU64::new(0)),
            config,
            events: None,
        }
    }

    /// Publish registry events on `bus`
    #[must_use]
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Registry settings
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a worker, replacing any entry with the same id.
    ///
    /// Fails with [`Error::Capacity`] when the id is new and the registry
    /// already holds `max_agents` workers.
    pub fn register(&self, worker: WorkerInfo) -> Result<()> {
        let id = worker.id.clone();
        let mut worker = WorkerInfo {
            active_tasks: 0,
            registered_at: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            ..worker
        };

        match self.workers.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                // keep in-flight leases balanced across re-registration
                worker.active_tasks = entry.get().active_tasks;
                entry.insert(worker);
                debug!(worker_id = %id, "Worker re-registered");
            }
            Entry::Vacant(entry) => {
                let max = self.config.max_agents;
                let reserved = self
                    .count
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .is_ok();
                if !reserved {
                    warn!(worker_id = %id, max, "Registry full, rejecting worker");
                    return Err(Error::Capacity { max });
                }
                entry.insert(worker);
                info!(worker_id = %id, "Registering worker");
            }
        }

        if let Some(bus) = &self.events {
            bus.publish(OrchestrationEvent::WorkerRegistered { worker_id: id });
        }
        Ok(())
    }

    /// Remove a worker. Unknown ids are ignored.
    ///
    /// Returns whether an entry was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.workers.remove(id).is_some();
        if removed {
            self.count.fetch_sub(1, Ordering::SeqCst);
            info!(worker_id = %id, "Worker unregistered");
        }
        removed
    }

    /// Refresh a worker's heartbeat. Unknown ids are ignored.
    ///
    /// An Offline worker stays Offline unless `revive_on_heartbeat` is set;
    /// otherwise [`reset_status`](Self::reset_status) brings it back.
    pub fn heartbeat(&self, id: &str) -> bool {
        let revive = self.config.revive_on_heartbeat;
        match self.workers.get_mut(id) {
            Some(mut entry) => {
                let mut next = entry.heartbeat_at(Utc::now());
                if revive && next.status == WorkerStatus::Offline {
                    next = next.with_status(if next.active_tasks > 0 {
                        WorkerStatus::Busy
                    } else {
                        WorkerStatus::Available
                    });
                    info!(worker_id = %id, "Heartbeat revived offline worker");
                }
                *entry = next;
                true
            }
            None => {
                debug!(worker_id = %id, "Heartbeat from unknown worker ignored");
                false
            }
        }
    }

    /// Bring an Offline worker back to Available.
    ///
    /// Requires a heartbeat newer than the configured timeout. Workers that
    /// are not Offline are returned unchanged.
    pub fn reset_status(&self, id: &str) -> Result<WorkerInfo> {
        let timeout = self.config.heartbeat_timeout();
        let mut entry = self
            .workers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("worker '{}'", id)))?;

        if entry.status != WorkerStatus::Offline {
            return Ok(entry.clone());
        }
        if entry.heartbeat_age(Utc::now()) > timeout {
            return Err(Error::Unavailable(format!(
                "worker '{}' has no heartbeat within {}s",
                id,
                timeout.as_secs()
            )));
        }

        let next = entry.with_status(if entry.active_tasks > 0 {
            WorkerStatus::Busy
        } else {
            WorkerStatus::Available
        });
        *entry = next.clone();
        info!(worker_id = %id, "Worker status reset");
        Ok(next)
    }

    /// Mark every worker whose heartbeat is older than `timeout` as Offline.
    ///
    /// Entries are never removed. Returns the ids that changed.
    pub fn sweep_expired(&self, timeout: Duration) -> Vec<String> {
        let now = Utc::now();
        let mut expired = Vec::new();

        for mut entry in self.workers.iter_mut() {
            if entry.status != WorkerStatus::Offline && entry.heartbeat_age(now) > timeout {
                let next = entry.with_status(WorkerStatus::Offline);
                expired.push(next.id.clone());
                *entry = next;
            }
        }

        for id in &expired {
            warn!(worker_id = %id, timeout_secs = timeout.as_secs(), "Worker heartbeat expired");
            if let Some(bus) = &self.events {
                bus.publish(OrchestrationEvent::WorkerOffline {
                    worker_id: id.clone(),
                });
            }
        }
        expired
    }

    /// Sweep with the configured heartbeat timeout
    pub fn sweep(&self) -> Vec<String> {
        self.sweep_expired(self.config.heartbeat_timeout())
    }

    /// Mark a worker Busy until the returned lease is dropped.
    ///
    /// Leases stack: the worker returns to Available only when its last lease
    /// is released, and never leaves Offline because of a lease.
    #[must_use]
    pub fn lease(&self, id: &str) -> WorkerLease {
        if let Some(mut entry) = self.workers.get_mut(id) {
            let next = entry.acquired();
            *entry = next;
        }
        WorkerLease {
            registry: self.clone(),
            worker_id: id.to_string(),
        }
    }

    fn release(&self, id: &str) {
        if let Some(mut entry) = self.workers.get_mut(id) {
            let next = entry.released();
            *entry = next;
        }
    }

    /// Get a worker snapshot
    #[must_use]
    pub fn get(&self, id: &str) -> Option<WorkerInfo> {
        self.workers.get(id).map(|entry| entry.value().clone())
    }

    /// All workers, in registration order
    #[must_use]
    pub fn list_workers(&self) -> Vec<WorkerInfo> {
        let mut workers: Vec<WorkerInfo> = self.workers.iter().map(|e| e.value().clone()).collect();
        workers.sort_by_key(|w| w.sequence);
        workers
    }

    /// Available workers, in registration order
    #[must_use]
    pub fn list_available(&self) -> Vec<WorkerInfo> {
        let mut workers: Vec<WorkerInfo> = self
            .workers
            .iter()
            .filter(|e| e.is_available())
            .map(|e| e.value().clone())
            .collect();
        workers.sort_by_key(|w| w.sequence);
        workers
    }

    /// Number of registered workers
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Keeps a worker Busy while alive; restores it on drop.
#[derive(Debug)]
pub struct WorkerLease {
    registry: WorkerRegistry,
    worker_id: String,
}

impl WorkerLease {
    /// Leased worker id
    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.registry.release(&self.worker_id);
    }
}

#[cfg(test)]
mod tests;
