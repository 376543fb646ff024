//! Engine facade
//!
//! Wires the registry, assigner, scheduler and router to one event bus and
//! one root cancellation token, and exposes the operations callers use.

use crate::assigner::{PlanExecutionResult, TaskAssigner, TaskAssignment};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::event_bus::{EventBus, OrchestrationEvent};
use crate::graph::Wave;
use crate::plan::{Context, Plan, Planner};
use crate::registry::{WorkerInfo, WorkerRegistry};
use crate::router::{AdaptiveRouter, ModelDecisionSource, RouteStats, RoutingDecision};
use crate::scheduler::{self, ParallelScheduler, SafetyGuard, ScheduleOutcome, StepExecutor};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Orchestration engine
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    events: EventBus,
    registry: WorkerRegistry,
    assigner: TaskAssigner,
    scheduler: ParallelScheduler,
    router: AdaptiveRouter,
    cancel: CancellationToken,
}

impl Engine {
    /// Build an engine from a validated configuration and its collaborators
    pub fn new(
        config: EngineConfig,
        executor: Arc<dyn StepExecutor>,
        guard: Arc<dyn SafetyGuard>,
        source: Arc<dyn ModelDecisionSource>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);
        let registry = WorkerRegistry::new(config.registry.clone()).with_events(events.clone());
        let assigner =
            TaskAssigner::new(registry.clone(), config.assigner.clone()).with_events(events.clone());
        let scheduler = ParallelScheduler::new(executor, guard, config.scheduler.clone())
            .with_events(events.clone());
        let router = AdaptiveRouter::new(source, config.router.clone()).with_events(events.clone());

        info!(
            max_agents = config.registry.max_agents,
            strategy = %config.assigner.strategy,
            cycle_policy = %config.scheduler.cycle_policy,
            threshold = config.router.confidence_threshold,
            "Engine initialized"
        );

        Ok(Self {
            config,
            events,
            registry,
            assigner,
            scheduler,
            router,
            cancel: CancellationToken::new(),
        })
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Event bus shared by every component
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to orchestration events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.events.subscribe()
    }

    /// Worker registry
    #[must_use]
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Task assigner
    #[must_use]
    pub fn assigner(&self) -> &TaskAssigner {
        &self.assigner
    }

    /// Parallel scheduler
    #[must_use]
    pub fn scheduler(&self) -> &ParallelScheduler {
        &self.scheduler
    }

    /// Adaptive router
    #[must_use]
    pub fn router(&self) -> &AdaptiveRouter {
        &self.router
    }

    /// Register (or replace) a worker
    pub fn register_worker(&self, worker: WorkerInfo) -> Result<()> {
        self.registry.register(worker)
    }

    /// Remove a worker; unknown ids are ignored
    pub fn unregister_worker(&self, id: &str) -> bool {
        self.registry.unregister(id)
    }

    /// Refresh a worker's heartbeat
    pub fn heartbeat(&self, id: &str) -> bool {
        self.registry.heartbeat(id)
    }

    /// Bring an Offline worker with a fresh heartbeat back
    pub fn reset_worker(&self, id: &str) -> Result<WorkerInfo> {
        self.registry.reset_status(id)
    }

    /// Mark stale workers Offline
    pub fn sweep_workers(&self) -> Vec<String> {
        self.registry.sweep()
    }

    /// All workers in registration order
    #[must_use]
    pub fn list_workers(&self) -> Vec<WorkerInfo> {
        self.registry.list_workers()
    }

    /// Available workers in registration order
    #[must_use]
    pub fn list_available_workers(&self) -> Vec<WorkerInfo> {
        self.registry.list_available()
    }

    /// Waves the scheduler would run for `plan`
    pub fn waves(&self, plan: &Plan) -> Result<Vec<Wave>> {
        self.scheduler.waves_for(plan)
    }

    /// `step_count / wave_count` for `plan`
    #[must_use]
    pub fn estimate_speedup(&self, plan: &Plan) -> f64 {
        scheduler::estimate_speedup(plan)
    }

    /// Run `plan` wave by wave on the local executor
    pub async fn schedule_parallel(&self, plan: &Plan) -> Result<ScheduleOutcome> {
        self.scheduler.schedule(plan, &self.cancel).await
    }

    /// Assign every step to a worker and run them all concurrently
    pub async fn execute_distributed(&self, plan: &Plan) -> Result<PlanExecutionResult> {
        self.assigner
            .execute_distributed(plan, &self.scheduler, &self.cancel)
            .await
    }

    /// Assign and run one dependency wave at a time
    pub async fn execute_waves_distributed(&self, plan: &Plan) -> Result<PlanExecutionResult> {
        self.assigner
            .execute_waves_distributed(plan, &self.scheduler, &self.cancel)
            .await
    }

    /// Ask `planner` for a plan, then schedule it
    pub async fn plan_and_schedule(
        &self,
        planner: &dyn Planner,
        goal: &str,
        context: &Context,
    ) -> Result<ScheduleOutcome> {
        let plan = planner.plan(goal, context).await.map_err(|e| {
            warn!(goal = %goal, error = %e, "Planner failed");
            e
        })?;
        info!(goal = %goal, steps = plan.len(), "Plan received");
        self.schedule_parallel(&plan).await
    }

    /// Look up an assignment by task id
    pub fn assignment(&self, task_id: Uuid) -> Result<TaskAssignment> {
        self.assigner.assignment(task_id)
    }

    /// Every assignment made to `agent_id`
    #[must_use]
    pub fn assignments_for(&self, agent_id: &str) -> Vec<TaskAssignment> {
        self.assigner.assignments_for(agent_id)
    }

    /// Route a task
    pub async fn route(&self, task: &str, context: &Context) -> Result<RoutingDecision> {
        self.router.route(task, context).await
    }

    /// Estimate confidence for sending `task` to `route`
    #[must_use]
    pub fn calculate_confidence(&self, task: &str, route: &str, context: &Context) -> f64 {
        self.router.calculate_confidence(task, route, context)
    }

    /// Record the outcome of a routing decision
    pub fn record_outcome(&self, decision: &RoutingDecision, success: bool) {
        self.router.record_outcome(decision, success);
    }

    /// Outcome statistics for a route
    #[must_use]
    pub fn route_stats(&self, route: &str) -> Option<RouteStats> {
        self.router.route_stats(route)
    }

    /// Stop running plans at their next wave boundary and refuse new ones
    pub fn cancel(&self) {
        info!("Engine cancellation requested");
        self.cancel.cancel();
    }

    /// Root cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether [`cancel`](Self::cancel) was called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::error::Error;
    use crate::plan::{PlanStep, StepResult};
    use crate::router::StaticDecisionSource;
    use crate::scheduler::{FnExecutor, PassthroughGuard};
    use async_trait::async_trait;

    fn engine(config: EngineConfig) -> Engine {
        let executor = FnExecutor::new(|step: PlanStep| async move {
            let output = step.action.clone();
            StepResult::success(step, output)
        });
        Engine::new(
            config,
            Arc::new(executor),
            Arc::new(PassthroughGuard),
            Arc::new(StaticDecisionSource::new("default_route", 0.8)),
        )
        .unwrap()
    }

    struct FixedPlanner;

    #[async_trait]
    impl Planner for FixedPlanner {
        async fn plan(&self, goal: &str, _context: &Context) -> Result<Plan> {
            if goal.is_empty() {
                return Err(Error::Planning("empty goal".to_string()));
            }
            Ok(Plan::new(goal).with_steps(vec![
                PlanStep::new("research"),
                PlanStep::new("write").with_parameter("notes", "$research"),
            ]))
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig::new().with_registry(RegistryConfig::default().with_max_agents(0));
        let result = Engine::new(
            config,
            Arc::new(FnExecutor::new(|step: PlanStep| async move {
                StepResult::success(step, "")
            })),
            Arc::new(PassthroughGuard),
            Arc::new(StaticDecisionSource::new("r", 1.0)),
        );
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_plan_and_schedule() {
        let engine = engine(EngineConfig::default());
        let outcome = engine
            .plan_and_schedule(&FixedPlanner, "write a report", &Context::new())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.waves_executed, 2);
        assert_eq!(outcome.output, "research\nwrite");
    }

    #[tokio::test]
    async fn test_planner_error_propagates() {
        let engine = engine(EngineConfig::default());
        let result = engine
            .plan_and_schedule(&FixedPlanner, "", &Context::new())
            .await;
        assert!(matches!(result, Err(Error::Planning(_))));
    }

    #[tokio::test]
    async fn test_cancel_refuses_new_runs() {
        let engine = engine(EngineConfig::default());
        engine.register_worker(WorkerInfo::new("w", "W")).unwrap();
        engine.cancel();
        assert!(engine.is_cancelled());
        assert!(engine.cancel_token().is_cancelled());

        let plan = Plan::new("late").with_step(PlanStep::new("a"));
        assert!(matches!(
            engine.schedule_parallel(&plan).await,
            Err(Error::Cancelled)
        ));
        assert!(matches!(
            engine.execute_distributed(&plan).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_worker_operations_publish_events() {
        let engine = engine(EngineConfig::default());
        let mut rx = engine.subscribe();

        engine.register_worker(WorkerInfo::new("w1", "One")).unwrap();
        assert!(engine.heartbeat("w1"));
        assert_eq!(engine.list_workers().len(), 1);
        assert!(engine.unregister_worker("w1"));
        assert!(engine.list_available_workers().is_empty());

        assert!(matches!(
            rx.recv().await.unwrap(),
            OrchestrationEvent::WorkerRegistered { .. }
        ));
    }

    #[tokio::test]
    async fn test_route_and_record() {
        let engine = engine(EngineConfig::default());
        let decision = engine.route("summarize", &Context::new()).await.unwrap();
        assert_eq!(decision.route, "default_route");

        engine.record_outcome(&decision, true);
        let stats = engine.route_stats("default_route").unwrap();
        assert_eq!(stats.total, 1);
        assert!(engine.calculate_confidence("summarize", "default_route", &Context::new()) > 0.5);
    }
}
