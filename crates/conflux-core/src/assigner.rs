//! Task assigner
//!
//! Binds plan steps to live workers and tracks each binding as a
//! [`TaskAssignment`] through Pending → InProgress → Completed | Failed.
//!
//! Two execution paths are offered:
//! - [`TaskAssigner::execute_distributed`] assigns the whole plan at once and
//!   runs every step concurrently, ignoring inferred dependencies.
//! - [`TaskAssigner::execute_waves_distributed`] assigns and runs one
//!   dependency wave at a time.
//!
//! Workers are held Busy through a [`WorkerLease`](crate::registry::WorkerLease)
//! for as long as their step runs.

use crate::config::AssignerConfig;
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, OrchestrationEvent};
use crate::plan::{Plan, PlanStep, StepResult};
use crate::registry::{WorkerInfo, WorkerRegistry};
use crate::scheduler::{join_outputs, run_guarded, ParallelScheduler};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How steps are bound to workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// k-th step of a batch goes to worker `k mod N`
    RoundRobin,
    /// First worker declaring the action, else the first available worker
    #[default]
    CapabilityMatch,
}

impl std::fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::CapabilityMatch => write!(f, "capability_match"),
        }
    }
}

/// Lifecycle of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Bound to a worker, not started
    Pending,
    /// Running on its worker
    InProgress,
    /// Step succeeded
    Completed,
    /// Step failed or never completed
    Failed,
}

impl AssignmentStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether moving to `next` keeps the lifecycle monotonic
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }

    /// Completed or Failed
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

/// A step bound to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// Unique task id
    pub task_id: Uuid,
    /// Worker the step is bound to
    pub agent_id: String,
    /// Index of the step in its plan
    pub step_index: usize,
    /// The step itself
    pub step: PlanStep,
    /// When the binding was made
    pub assigned_at: DateTime<Utc>,
    /// Current lifecycle state
    pub status: AssignmentStatus,
}

impl TaskAssignment {
    /// A fresh Pending assignment
    #[must_use]
    pub fn new(agent_id: impl Into<String>, step_index: usize, step: PlanStep) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            step_index,
            step,
            assigned_at: Utc::now(),
            status: AssignmentStatus::Pending,
        }
    }

    /// Copy in a later state, or `None` if that would move backwards
    #[must_use]
    pub fn advanced(&self, status: AssignmentStatus) -> Option<Self> {
        self.status.can_advance_to(status).then(|| Self {
            status,
            ..self.clone()
        })
    }
}

/// Bind `(index, step)` pairs to `workers`.
///
/// With no workers every step is dropped and the result is empty.
#[must_use]
pub fn assign_steps<'a>(
    steps: impl IntoIterator<Item = (usize, &'a PlanStep)>,
    workers: &[WorkerInfo],
    strategy: AssignmentStrategy,
) -> Vec<TaskAssignment> {
    let Some(first) = workers.first() else {
        return Vec::new();
    };

    steps
        .into_iter()
        .enumerate()
        .map(|(k, (index, step))| {
            let worker = match strategy {
                AssignmentStrategy::RoundRobin => &workers[k % workers.len()],
                AssignmentStrategy::CapabilityMatch => workers
                    .iter()
                    .find(|w| w.can_handle(&step.action))
                    .unwrap_or(first),
            };
            TaskAssignment::new(worker.id.clone(), index, step.clone())
        })
        .collect()
}

/// Worker utilization of a distributed run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMetadata {
    /// Strategy used to bind steps
    pub strategy: AssignmentStrategy,
    /// Most workers available in any assignment round
    pub agents_available: usize,
    /// Distinct workers that received a step
    pub agents_used: usize,
    /// Steps run per worker id
    pub steps_per_agent: BTreeMap<String, usize>,
    /// Assignment rounds (1 for the whole-plan path)
    pub rounds: usize,
    /// Why a wave-aware run stopped before its last wave
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Result of a distributed run
#[derive(Debug, Clone, Serialize)]
pub struct PlanExecutionResult {
    /// Run identifier (matches published events)
    pub run_id: Uuid,
    /// Results ascending by step index
    pub results: Vec<StepResult>,
    /// AND of every result; false when cancelled or nothing ran
    pub success: bool,
    /// Newline-joined non-empty outputs
    pub output: String,
    /// Final state of every assignment made for this run
    pub assignments: Vec<TaskAssignment>,
    /// Steps that never ran because the run was cancelled
    pub skipped: Vec<usize>,
    /// Whether cancellation stopped the run early
    pub cancelled: bool,
    /// Worker utilization
    pub metadata: ExecutionMetadata,
}

/// What a distributed run collected before it was summarised
struct RunTally {
    results: BTreeMap<usize, StepResult>,
    task_ids: Vec<Uuid>,
    available: usize,
    rounds: usize,
    cancelled: bool,
    stop_reason: Option<String>,
}

/// Maps steps to workers and runs them under worker leases
#[derive(Debug, Clone)]
pub struct TaskAssigner {
    registry: WorkerRegistry,
    config: AssignerConfig,
    ledger: Arc<DashMap<Uuid, TaskAssignment>>,
    events: Option<EventBus>,
}

impl TaskAssigner {
    /// Create an assigner over `registry`
    #[must_use]
    pub fn new(registry: WorkerRegistry, config: AssignerConfig) -> Self {
        Self {
            registry,
            config,
            ledger: Arc::new(DashMap::new()),
            events: None,
        }
    }

    /// Publish run events on `bus`
    #[must_use]
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Active strategy
    #[must_use]
    pub fn strategy(&self) -> AssignmentStrategy {
        self.config.strategy
    }

    /// Registry the assigner draws workers from
    #[must_use]
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Sweep stale workers, then bind `steps` to the available ones.
    ///
    /// Returns the new (Pending, already recorded) assignments together with
    /// the number of workers that were available. Fails with
    /// [`Error::Unavailable`] when there were none.
    pub fn assign<'a>(
        &self,
        steps: impl IntoIterator<Item = (usize, &'a PlanStep)>,
    ) -> Result<(Vec<TaskAssignment>, usize)> {
        self.registry.sweep();
        let workers = self.registry.list_available();
        if workers.is_empty() {
            warn!("No agents available for assignment");
            return Err(Error::Unavailable("no agents available".to_string()));
        }

        let assignments = assign_steps(steps, &workers, self.config.strategy);
        for assignment in &assignments {
            debug!(
                task_id = %assignment.task_id,
                agent_id = %assignment.agent_id,
                step = assignment.step_index,
                "Step assigned"
            );
            self.ledger.insert(assignment.task_id, assignment.clone());
        }
        Ok((assignments, workers.len()))
    }

    /// Look up an assignment
    pub fn assignment(&self, task_id: Uuid) -> Result<TaskAssignment> {
        self.ledger
            .get(&task_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(format!("assignment {}", task_id)))
    }

    /// Every assignment ever made to `agent_id`, oldest first
    #[must_use]
    pub fn assignments_for(&self, agent_id: &str) -> Vec<TaskAssignment> {
        let mut found: Vec<TaskAssignment> = self
            .ledger
            .iter()
            .filter(|entry| entry.agent_id == agent_id)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|a| (a.assigned_at, a.step_index));
        found
    }

    fn advance(&self, task_id: Uuid, status: AssignmentStatus) -> bool {
        match self.ledger.get_mut(&task_id) {
            Some(mut entry) => match entry.advanced(status) {
                Some(next) => {
                    *entry = next;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Assign the whole plan and run every step concurrently.
    ///
    /// Dependencies between steps are not honoured on this path.
    pub async fn execute_distributed(
        &self,
        plan: &Plan,
        scheduler: &ParallelScheduler,
        cancel: &CancellationToken,
    ) -> Result<PlanExecutionResult> {
        if plan.is_empty() {
            return Err(Error::Degenerate("plan has no steps".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (assignments, available) = self.assign(plan.steps.iter().enumerate())?;
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            goal = %plan.goal,
            steps = plan.len(),
            agents = available,
            strategy = %self.config.strategy,
            "Distributing plan"
        );
        self.publish(OrchestrationEvent::RunStarted {
            run_id,
            steps: plan.len(),
        });

        let task_ids: Vec<Uuid> = assignments.iter().map(|a| a.task_id).collect();
        let results = self
            .run_assignments(run_id, plan, assignments, scheduler, cancel)
            .await;

        self.finish(
            run_id,
            plan,
            RunTally {
                results,
                task_ids,
                available,
                rounds: 1,
                cancelled: false,
                stop_reason: None,
            },
        )
    }

    /// Assign and run one dependency wave at a time.
    ///
    /// Stale workers are swept before every wave; cancellation is checked
    /// at wave boundaries. If no worker is left for a later wave the run
    /// stops there and the finished waves are still returned, with
    /// `metadata.stop_reason` set. Only the first wave's
    /// [`Error::Unavailable`] is returned as an error.
    pub async fn execute_waves_distributed(
        &self,
        plan: &Plan,
        scheduler: &ParallelScheduler,
        cancel: &CancellationToken,
    ) -> Result<PlanExecutionResult> {
        if plan.is_empty() {
            return Err(Error::Degenerate("plan has no steps".to_string()));
        }
        let waves = scheduler.waves_for(plan)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            goal = %plan.goal,
            steps = plan.len(),
            waves = waves.len(),
            strategy = %self.config.strategy,
            "Distributing plan by wave"
        );
        self.publish(OrchestrationEvent::RunStarted {
            run_id,
            steps: plan.len(),
        });

        let mut results = BTreeMap::new();
        let mut task_ids = Vec::new();
        let mut available = 0;
        let mut rounds = 0;
        let mut cancelled = false;
        let mut stop_reason = None;

        for (number, wave) in waves.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(%run_id, waves_completed = rounds, "Distributed run cancelled at wave boundary");
                self.publish(OrchestrationEvent::RunCancelled {
                    run_id,
                    waves_completed: rounds,
                });
                cancelled = true;
                break;
            }

            let steps = wave
                .iter()
                .filter_map(|&i| plan.steps.get(i).map(|step| (i, step)));
            let (assignments, round_available) = match self.assign(steps) {
                Ok(assigned) => assigned,
                Err(e) => {
                    warn!(%run_id, waves_completed = rounds, error = %e, "Distributed run stopped");
                    self.publish(OrchestrationEvent::RunStopped {
                        run_id,
                        waves_completed: rounds,
                        reason: e.to_string(),
                    });
                    if rounds == 0 {
                        return Err(e);
                    }
                    stop_reason = Some(e.to_string());
                    break;
                }
            };
            available = available.max(round_available);
            task_ids.extend(assignments.iter().map(|a| a.task_id));

            self.publish(OrchestrationEvent::WaveStarted {
                run_id,
                wave: number,
                steps: wave.clone(),
            });
            let wave_results = self
                .run_assignments(run_id, plan, assignments, scheduler, cancel)
                .await;
            results.extend(wave_results);
            rounds += 1;
        }

        self.finish(
            run_id,
            plan,
            RunTally {
                results,
                task_ids,
                available,
                rounds,
                cancelled,
                stop_reason,
            },
        )
    }

    async fn run_assignments(
        &self,
        run_id: Uuid,
        plan: &Plan,
        assignments: Vec<TaskAssignment>,
        scheduler: &ParallelScheduler,
        cancel: &CancellationToken,
    ) -> BTreeMap<usize, StepResult> {
        let by_index: BTreeMap<usize, Uuid> = assignments
            .iter()
            .map(|a| (a.step_index, a.task_id))
            .collect();

        let mut set = JoinSet::new();
        for assignment in assignments {
            let lease = self.registry.lease(&assignment.agent_id);
            self.advance(assignment.task_id, AssignmentStatus::InProgress);

            let assigner = self.clone();
            let executor = scheduler.executor();
            let guard = scheduler.guard();
            let token = cancel.child_token();
            set.spawn(async move {
                let _lease = lease;
                let result = run_guarded(executor, guard, assignment.step, token).await;
                let status = if result.success {
                    AssignmentStatus::Completed
                } else {
                    AssignmentStatus::Failed
                };
                assigner.advance(assignment.task_id, status);
                (assignment.step_index, result)
            });
        }

        let mut collected = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    self.publish(OrchestrationEvent::StepCompleted {
                        run_id,
                        index,
                        success: result.success,
                        duration_ms: result.duration_ms,
                    });
                    collected.insert(index, result);
                }
                Err(e) => warn!(%run_id, error = %e, "Assigned step did not complete"),
            }
        }

        for (index, task_id) in by_index {
            if collected.contains_key(&index) {
                continue;
            }
            self.advance(task_id, AssignmentStatus::Failed);
            if let Some(step) = plan.steps.get(index) {
                collected.insert(
                    index,
                    StepResult::failure(step.clone(), "assigned step did not complete"),
                );
            }
        }
        collected
    }

    /// Build the aggregate result.
    ///
    /// A run in which every step ran and every step failed is reported as
    /// [`Error::Execution`]; anything less keeps failures inside the results.
    fn finish(&self, run_id: Uuid, plan: &Plan, tally: RunTally) -> Result<PlanExecutionResult> {
        let RunTally {
            results,
            task_ids,
            available,
            rounds,
            cancelled,
            stop_reason,
        } = tally;

        let skipped: Vec<usize> = (0..plan.len())
            .filter(|i| !results.contains_key(i))
            .collect();
        let results: Vec<StepResult> = results.into_values().collect();
        let assignments: Vec<TaskAssignment> = task_ids
            .iter()
            .filter_map(|id| self.ledger.get(id).map(|entry| entry.value().clone()))
            .collect();

        let mut steps_per_agent = BTreeMap::new();
        for assignment in &assignments {
            *steps_per_agent
                .entry(assignment.agent_id.clone())
                .or_insert(0) += 1;
        }

        let interrupted = cancelled || stop_reason.is_some();
        let success = !interrupted && !results.is_empty() && results.iter().all(|r| r.success);
        if !interrupted {
            info!(%run_id, success, agents_used = steps_per_agent.len(), "Distributed run finished");
            self.publish(OrchestrationEvent::RunCompleted { run_id, success });
        }

        if !interrupted && skipped.is_empty() && results.iter().all(|r| !r.success) {
            let first = results
                .first()
                .and_then(|r| r.error.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            warn!(%run_id, steps = results.len(), "Every step failed");
            return Err(Error::Execution(format!(
                "all {} steps failed (first error: {})",
                results.len(),
                first
            )));
        }

        let output = join_outputs(&results);
        Ok(PlanExecutionResult {
            run_id,
            results,
            success,
            output,
            assignments,
            skipped,
            cancelled,
            metadata: ExecutionMetadata {
                strategy: self.config.strategy,
                agents_available: available,
                agents_used: steps_per_agent.len(),
                steps_per_agent,
                rounds,
                stop_reason,
            },
        })
    }

    fn publish(&self, event: OrchestrationEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
