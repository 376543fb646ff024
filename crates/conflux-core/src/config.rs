//! Engine configuration
//!
//! Every section deserializes with per-field defaults so a partial TOML
//! table (or none at all) yields a usable configuration.

use crate::assigner::AssignmentStrategy;
use crate::error::{Error, Result};
use crate::graph::CyclePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of registered agents
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Seconds without heartbeat before a worker is swept Offline
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    /// Whether a heartbeat alone brings an Offline worker back
    #[serde(default)]
    pub revive_on_heartbeat: bool,
}

fn default_max_agents() -> usize {
    16
}

fn default_heartbeat_timeout_secs() -> u64 {
    300
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            revive_on_heartbeat: false,
        }
    }
}

impl RegistryConfig {
    /// Set the maximum number of agents
    #[must_use]
    pub fn with_max_agents(mut self, max: usize) -> Self {
        self.max_agents = max;
        self
    }

    /// Set the heartbeat timeout
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout_secs = timeout.as_secs();
        self
    }

    /// Let heartbeats revive Offline workers
    #[must_use]
    pub fn with_revive_on_heartbeat(mut self, enabled: bool) -> Self {
        self.revive_on_heartbeat = enabled;
        self
    }

    /// Heartbeat timeout as a duration
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Task assigner settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignerConfig {
    /// How steps are bound to workers
    #[serde(default)]
    pub strategy: AssignmentStrategy,
}

impl AssignerConfig {
    /// Set the assignment strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: AssignmentStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Parallel scheduler settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// What to do with steps caught in a dependency cycle
    #[serde(default)]
    pub cycle_policy: CyclePolicy,
    /// Max concurrently running steps per wave (0 = unlimited)
    #[serde(default)]
    pub max_parallel: usize,
}

impl SchedulerConfig {
    /// Set the cycle policy
    #[must_use]
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    /// Cap concurrently running steps
    #[must_use]
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max;
        self
    }
}

/// Adaptive router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum confidence for a direct decision
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Outcomes kept per route
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_history_capacity() -> usize {
    100
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl RouterConfig {
    /// Set the confidence threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the per-route history capacity
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker registry
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Task assigner
    #[serde(default)]
    pub assigner: AssignerConfig,
    /// Parallel scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Adaptive router
    #[serde(default)]
    pub router: RouterConfig,
    /// Event bus buffer size
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            assigner: AssignerConfig::default(),
            scheduler: SchedulerConfig::default(),
            router: RouterConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    /// Create a default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set registry settings
    #[must_use]
    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Set assigner settings
    #[must_use]
    pub fn with_assigner(mut self, assigner: AssignerConfig) -> Self {
        self.assigner = assigner;
        self
    }

    /// Set scheduler settings
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set router settings
    #[must_use]
    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.registry.max_agents == 0 {
            return Err(invalid("registry.max_agents", "must be at least 1"));
        }
        let threshold = self.router.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "router.confidence_threshold",
                "must be within 0..=1",
            ));
        }
        if self.router.history_capacity == 0 {
            return Err(invalid("router.history_capacity", "must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> Error {
    Error::InvalidConfig {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.registry.max_agents, 16);
        assert_eq!(config.registry.heartbeat_timeout(), Duration::from_secs(300));
        assert!(!config.registry.revive_on_heartbeat);
        assert_eq!(config.assigner.strategy, AssignmentStrategy::CapabilityMatch);
        assert_eq!(config.scheduler.cycle_policy, CyclePolicy::Reject);
        assert_eq!(config.router.confidence_threshold, 0.7);
        assert_eq!(config.router.history_capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"registry": {"max_agents": 2}, "assigner": {"strategy": "round_robin"}}"#,
        )
        .unwrap();
        assert_eq!(config.registry.max_agents, 2);
        assert_eq!(config.registry.heartbeat_timeout_secs, 300);
        assert_eq!(config.assigner.strategy, AssignmentStrategy::RoundRobin);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = EngineConfig::new().with_router(RouterConfig::default().with_threshold(1.5));
        match config.validate() {
            Err(Error::InvalidConfig { field, .. }) => {
                assert_eq!(field, "router.confidence_threshold")
            }
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_agents() {
        let config =
            EngineConfig::new().with_registry(RegistryConfig::default().with_max_agents(0));
        assert!(config.validate().is_err());
    }
}
