//! Parallel scheduler
//!
//! Runs a plan wave by wave. Every step of a wave is spawned as its own
//! tokio task; the next wave starts only when the current one has fully
//! completed. Results are re-emitted in ascending step index regardless of
//! completion order.
//!
//! Cancellation is cooperative and checked only at wave boundaries: steps
//! already running receive a child token but are never aborted by the
//! scheduler.

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, OrchestrationEvent};
use crate::graph::{DependencyGraph, Wave};
use crate::plan::{Plan, PlanStep, StepResult};
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Executes a single (already sandboxed) step
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run `step`; failures are reported inside the returned [`StepResult`]
    async fn execute(&self, step: PlanStep, cancel: CancellationToken) -> StepResult;
}

/// Rewrites a step before it is executed (parameter scrubbing, limits, ...)
pub trait SafetyGuard: Send + Sync {
    /// Return the step that will actually run
    fn sandbox(&self, step: PlanStep) -> PlanStep;
}

/// Guard that runs steps unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughGuard;

impl SafetyGuard for PassthroughGuard {
    fn sandbox(&self, step: PlanStep) -> PlanStep {
        step
    }
}

/// Adapts an async closure into a [`StepExecutor`]
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> StepExecutor for FnExecutor<F>
where
    F: Fn(PlanStep) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
{
    async fn execute(&self, step: PlanStep, _cancel: CancellationToken) -> StepResult {
        (self.f)(step).await
    }
}

/// Sandbox and execute one step, turning a panic into a failed result.
///
/// A result reporting zero duration gets the measured wall time.
pub(crate) async fn run_guarded(
    executor: Arc<dyn StepExecutor>,
    guard: Arc<dyn SafetyGuard>,
    step: PlanStep,
    cancel: CancellationToken,
) -> StepResult {
    let started = Instant::now();
    let sandboxed = guard.sandbox(step);
    let ran = sandboxed.clone();

    let result = match AssertUnwindSafe(executor.execute(sandboxed, cancel))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(action = %ran.action, error = %message, "Step executor panicked");
            StepResult::failure(ran, format!("executor panicked: {}", message))
        }
    };

    if result.duration_ms == 0 {
        let elapsed = started.elapsed().as_millis() as u64;
        result.with_duration_ms(elapsed)
    } else {
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Newline-join of the non-empty outputs, in the given order
pub(crate) fn join_outputs<'a>(results: impl IntoIterator<Item = &'a StepResult>) -> String {
    results
        .into_iter()
        .map(|r| r.output.as_str())
        .filter(|o| !o.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `step_count / wave_count` for a plan (1.0 when empty)
#[must_use]
pub fn estimate_speedup(plan: &Plan) -> f64 {
    if plan.is_empty() {
        return 1.0;
    }
    let layout = DependencyGraph::from_plan(plan).waves();
    let waves = layout.waves.len() + usize::from(!layout.is_complete());
    plan.len() as f64 / waves.max(1) as f64
}

/// Result of a scheduling run
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutcome {
    /// Run identifier (matches published events)
    pub run_id: Uuid,
    /// Results of every executed step, ascending by step index
    pub results: Vec<StepResult>,
    /// Steps that never ran because the run was cancelled
    pub skipped: Vec<usize>,
    /// AND of every result; false when cancelled
    pub success: bool,
    /// Newline-joined non-empty outputs
    pub output: String,
    /// Waves that ran to completion
    pub waves_executed: usize,
    /// Whether cancellation stopped the run early
    pub cancelled: bool,
}

/// Wave-by-wave concurrent plan executor
#[derive(Clone)]
pub struct ParallelScheduler {
    executor: Arc<dyn StepExecutor>,
    guard: Arc<dyn SafetyGuard>,
    config: SchedulerConfig,
    events: Option<EventBus>,
}

impl ParallelScheduler {
    /// Create a scheduler around an executor and a sandboxing guard
    #[must_use]
    pub fn new(
        executor: Arc<dyn StepExecutor>,
        guard: Arc<dyn SafetyGuard>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            executor,
            guard,
            config,
            events: None,
        }
    }

    /// Publish run events on `bus`
    #[must_use]
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Scheduler settings
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Executor shared with the distributed path
    pub(crate) fn executor(&self) -> Arc<dyn StepExecutor> {
        Arc::clone(&self.executor)
    }

    /// Guard shared with the distributed path
    pub(crate) fn guard(&self) -> Arc<dyn SafetyGuard> {
        Arc::clone(&self.guard)
    }

    /// Waves for `plan` after applying the cycle policy
    pub fn waves_for(&self, plan: &Plan) -> Result<Vec<Wave>> {
        DependencyGraph::from_plan(plan)
            .waves()
            .resolve(self.config.cycle_policy)
    }

    /// Execute `plan` using dependencies inferred from its parameters
    pub async fn schedule(
        &self,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<ScheduleOutcome> {
        self.schedule_with_graph(plan, &DependencyGraph::from_plan(plan), cancel)
            .await
    }

    /// Execute `plan` against an explicit dependency graph
    pub async fn schedule_with_graph(
        &self,
        plan: &Plan,
        graph: &DependencyGraph,
        cancel: &CancellationToken,
    ) -> Result<ScheduleOutcome> {
        if plan.is_empty() {
            return Err(Error::Degenerate("plan has no steps".to_string()));
        }
        if graph.len() != plan.len() {
            return Err(Error::Degenerate(format!(
                "graph covers {} steps but plan has {}",
                graph.len(),
                plan.len()
            )));
        }
        let waves = graph.waves().resolve(self.config.cycle_policy)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            goal = %plan.goal,
            steps = plan.len(),
            waves = waves.len(),
            "Scheduling plan"
        );
        self.publish(OrchestrationEvent::RunStarted {
            run_id,
            steps: plan.len(),
        });

        let limiter = (self.config.max_parallel > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_parallel)));
        let mut collected: BTreeMap<usize, StepResult> = BTreeMap::new();
        let mut waves_executed = 0;
        let mut cancelled = false;

        for (number, wave) in waves.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(%run_id, waves_completed = waves_executed, "Run cancelled at wave boundary");
                self.publish(OrchestrationEvent::RunCancelled {
                    run_id,
                    waves_completed: waves_executed,
                });
                cancelled = true;
                break;
            }

            debug!(%run_id, wave = number, steps = ?wave, "Launching wave");
            self.publish(OrchestrationEvent::WaveStarted {
                run_id,
                wave: number,
                steps: wave.clone(),
            });
            let wave_results = self
                .run_wave(run_id, plan, wave, limiter.clone(), cancel)
                .await;
            collected.extend(wave_results);
            waves_executed += 1;
        }

        let skipped: Vec<usize> = (0..plan.len())
            .filter(|i| !collected.contains_key(i))
            .collect();
        let results: Vec<StepResult> = collected.into_values().collect();
        let success = !cancelled && results.iter().all(|r| r.success);
        let output = join_outputs(&results);

        if !cancelled {
            info!(%run_id, success, waves = waves_executed, "Plan finished");
            self.publish(OrchestrationEvent::RunCompleted { run_id, success });
        }

        Ok(ScheduleOutcome {
            run_id,
            results,
            skipped,
            success,
            output,
            waves_executed,
            cancelled,
        })
    }

    async fn run_wave(
        &self,
        run_id: Uuid,
        plan: &Plan,
        wave: &Wave,
        limiter: Option<Arc<Semaphore>>,
        cancel: &CancellationToken,
    ) -> BTreeMap<usize, StepResult> {
        let mut set = JoinSet::new();
        for &index in wave {
            let Some(step) = plan.steps.get(index).cloned() else {
                continue;
            };
            let executor = self.executor();
            let guard = self.guard();
            let limiter = limiter.clone();
            let token = cancel.child_token();
            set.spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                (index, run_guarded(executor, guard, step, token).await)
            });
        }

        let mut collected = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    debug!(
                        %run_id,
                        index,
                        success = result.success,
                        duration_ms = result.duration_ms,
                        "Step completed"
                    );
                    self.publish(OrchestrationEvent::StepCompleted {
                        run_id,
                        index,
                        success: result.success,
                        duration_ms: result.duration_ms,
                    });
                    collected.insert(index, result);
                }
                Err(e) => warn!(%run_id, error = %e, "Step task did not complete"),
            }
        }

        for &index in wave {
            if let Some(step) = plan.steps.get(index) {
                collected
                    .entry(index)
                    .or_insert_with(|| StepResult::failure(step.clone(), "step task did not complete"));
            }
        }
        collected
    }

    fn publish(&self, event: OrchestrationEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
