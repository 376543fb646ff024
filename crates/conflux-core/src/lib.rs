//! Conflux Core - Orchestration Engine
//!
//! This crate turns declarative plans into concurrent work, including:
//! - Graph: inferring step dependencies and execution waves
//! - Scheduler: running waves concurrently through a pluggable executor
//! - Registry: tracking worker capabilities, status and liveness
//! - Assigner: binding steps to workers (round-robin or capability match)
//! - Router: confidence-based routing with a fallback ladder
//! - Engine: a facade over all of the above, sharing one event bus

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assigner;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod graph;
pub mod plan;
pub mod registry;
pub mod router;
pub mod scheduler;

pub use assigner::{
    assign_steps, AssignmentStatus, AssignmentStrategy, ExecutionMetadata, PlanExecutionResult,
    TaskAssigner, TaskAssignment,
};
pub use config::{AssignerConfig, EngineConfig, RegistryConfig, RouterConfig, SchedulerConfig};
pub use engine::Engine;
pub use error::{format_error_for_cli, Error, Result, UserFriendlyError};
pub use event_bus::{EventBus, OrchestrationEvent};
pub use graph::{CyclePolicy, DependencyGraph, Wave, WaveLayout};
pub use plan::{Context, Plan, PlanStep, Planner, StepResult};
pub use registry::{WorkerInfo, WorkerLease, WorkerRegistry, WorkerStatus};
pub use router::{
    AdaptiveRouter, FallbackStrategy, ModelDecisionSource, RouteCandidate, RouteHistory,
    RouteOutcome, RouteStats, RoutingDecision, StaticDecisionSource,
};
pub use scheduler::{
    estimate_speedup, FnExecutor, ParallelScheduler, PassthroughGuard, SafetyGuard,
    ScheduleOutcome, StepExecutor,
};
