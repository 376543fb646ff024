//! Orchestration events and the bus that carries them.
//!
//! The scheduler, registry, assigner and router publish here so that
//! dashboards and internal subscribers can follow a run as it happens.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// A scheduling or distributed run has started
    RunStarted {
        /// Run identifier
        run_id: Uuid,
        /// Number of steps in the plan
        steps: usize,
    },
    /// A wave is about to launch
    WaveStarted {
        /// Run identifier
        run_id: Uuid,
        /// Zero-based wave number
        wave: usize,
        /// Step indices in the wave
        steps: Vec<usize>,
    },
    /// One step finished (successfully or not)
    StepCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Step index
        index: usize,
        /// Whether the step succeeded
        success: bool,
        /// Execution duration in milliseconds
        duration_ms: u64,
    },
    /// The run finished
    RunCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Aggregate success
        success: bool,
    },
    /// Cancellation stopped the run at a wave boundary
    RunCancelled {
        /// Run identifier
        run_id: Uuid,
        /// Waves that fully ran before cancellation
        waves_completed: usize,
    },
    /// A distributed run ended early because no worker was left
    RunStopped {
        /// Run identifier
        run_id: Uuid,
        /// Waves that fully ran before the stop
        waves_completed: usize,
        /// Why the next wave could not be assigned
        reason: String,
    },
    /// A worker joined the registry
    WorkerRegistered {
        /// Worker id
        worker_id: String,
    },
    /// A worker missed its heartbeat window
    WorkerOffline {
        /// Worker id
        worker_id: String,
    },
    /// The router fell back instead of using the model's route
    RouteFallback {
        /// Route proposed by the decision source
        original_route: String,
        /// Route actually chosen
        route: String,
        /// Confidence that triggered the fallback
        confidence: f64,
    },
}

impl OrchestrationEvent {
    /// Run id for run-scoped events
    #[must_use]
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::WaveStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunCancelled { run_id, .. }
            | Self::RunStopped { run_id, .. } => Some(*run_id),
            Self::WorkerRegistered { .. }
            | Self::WorkerOffline { .. }
            | Self::RouteFallback { .. } => None,
        }
    }
}

/// Fan-out of [`OrchestrationEvent`]s to any number of listeners.
///
/// Cloning shares the channel. Publishing never waits: a listener that
/// falls more than `capacity` events behind gets `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrchestrationEvent>,
}

impl EventBus {
    /// Bus buffering up to `capacity` undelivered events per listener
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Listen from now on; earlier events are not replayed
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.tx.subscribe()
    }

    /// Deliver `event`, returning the number of listeners reached (0 when
    /// nobody listens)
    pub fn publish(&self, event: OrchestrationEvent) -> usize {
        match self.tx.send(event) {
            Ok(reached) => reached,
            Err(_) => 0,
        }
    }

    /// Listeners currently attached
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
