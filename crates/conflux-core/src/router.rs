//! Adaptive Router
//!
//! Picks a route for a task. A [`ModelDecisionSource`] proposes a route with
//! a confidence; when that confidence is below the configured threshold the
//! router falls back through a ladder of strategies:
//!
//! ```text
//! confidence < 0.3   short task (< 50 chars)  -> clarification_needed
//!                    otherwise                -> context_gatherer
//! 0.3 .. 0.5         more than 20 words       -> task_decomposer
//!                    otherwise                -> ensemble:<route>
//! 0.5 .. threshold                            -> ensemble:<route>
//! ```
//!
//! Outcomes recorded through [`AdaptiveRouter::record_outcome`] feed the
//! historical base rate used by [`AdaptiveRouter::calculate_confidence`].

mod history;

pub use history::{RouteHistory, RouteOutcome};

use crate::config::RouterConfig;
use crate::error::Result;
use crate::event_bus::{EventBus, OrchestrationEvent};
use crate::plan::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const LOW_CONFIDENCE: f64 = 0.3;
const MEDIUM_CONFIDENCE: f64 = 0.5;
const SHORT_TASK_CHARS: usize = 50;
const COMPLEX_TASK_WORDS: usize = 20;
const DEFAULT_BASE_RATE: f64 = 0.5;

/// A route proposed by a decision source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    /// Proposed route
    pub route: String,
    /// Confidence in the proposal (0..1)
    pub confidence: f64,
    /// Why the source chose it
    #[serde(default)]
    pub reason: String,
}

impl RouteCandidate {
    /// Create a candidate
    #[must_use]
    pub fn new(route: impl Into<String>, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            confidence,
            reason: reason.into(),
        }
    }
}

/// Proposes routes (backed by a language model elsewhere)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelDecisionSource: Send + Sync {
    /// Propose a route for `task`
    async fn select(&self, task: &str, context: &Context) -> Result<RouteCandidate>;
}

/// Decision source that always proposes the same candidate
#[derive(Debug, Clone)]
pub struct StaticDecisionSource {
    candidate: RouteCandidate,
}

impl StaticDecisionSource {
    /// Always propose `route` with `confidence`
    #[must_use]
    pub fn new(route: impl Into<String>, confidence: f64) -> Self {
        let route = route.into();
        let reason = format!("static route {}", route);
        Self {
            candidate: RouteCandidate::new(route, confidence, reason),
        }
    }

    /// Override the reason text
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.candidate.reason = reason.into();
        self
    }
}

#[async_trait]
impl ModelDecisionSource for StaticDecisionSource {
    async fn select(&self, _task: &str, _context: &Context) -> Result<RouteCandidate> {
        Ok(self.candidate.clone())
    }
}

/// Strategy applied when confidence is below the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Ask the requester to clarify a short, vague task
    RequestClarification,
    /// Collect more context before deciding
    GatherMoreContext,
    /// Split a long task into smaller ones
    DecomposeTask,
    /// Combine the proposed route with others
    UseEnsemble,
    /// Route to the default handler
    UseDefault,
}

impl FallbackStrategy {
    /// Choose a strategy for a below-threshold `confidence`
    #[must_use]
    pub fn select(confidence: f64, task: &str, threshold: f64) -> Self {
        if confidence < LOW_CONFIDENCE {
            if task.chars().count() < SHORT_TASK_CHARS {
                Self::RequestClarification
            } else {
                Self::GatherMoreContext
            }
        } else if confidence < MEDIUM_CONFIDENCE {
            if task.split_whitespace().count() > COMPLEX_TASK_WORDS {
                Self::DecomposeTask
            } else {
                Self::UseEnsemble
            }
        } else if confidence < threshold {
            Self::UseEnsemble
        } else {
            Self::UseDefault
        }
    }

    /// Route this strategy sends the task to
    #[must_use]
    pub fn route_for(self, original: &str) -> String {
        match self {
            Self::RequestClarification => "clarification_needed".to_string(),
            Self::GatherMoreContext => "context_gatherer".to_string(),
            Self::DecomposeTask => "task_decomposer".to_string(),
            Self::UseEnsemble => format!("ensemble:{}", original),
            Self::UseDefault => "default".to_string(),
        }
    }
}

impl std::fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestClarification => write!(f, "request_clarification"),
            Self::GatherMoreContext => write!(f, "gather_more_context"),
            Self::DecomposeTask => write!(f, "decompose_task"),
            Self::UseEnsemble => write!(f, "use_ensemble"),
            Self::UseDefault => write!(f, "use_default"),
        }
    }
}

/// A routing decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Chosen route
    pub route: String,
    /// Human-readable explanation
    pub reason: String,
    /// Confidence reported by the decision source
    pub confidence: f64,
    /// Fallback applied, if any
    #[serde(default)]
    pub fallback: Option<FallbackStrategy>,
    /// Extra details (original route, threshold, ...)
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl RoutingDecision {
    /// A decision taken as proposed
    #[must_use]
    pub fn direct(route: impl Into<String>, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            reason: reason.into(),
            confidence,
            fallback: None,
            metadata: HashMap::new(),
        }
    }

    /// Whether a fallback strategy replaced the proposed route
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Aggregate outcomes for one route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStats {
    /// Route name
    pub route: String,
    /// Outcomes currently retained
    pub total: usize,
    /// Successful outcomes among them
    pub successes: usize,
    /// `successes / total`
    pub success_rate: f64,
}

/// Confidence-based router that learns from recorded outcomes
#[derive(Clone)]
pub struct AdaptiveRouter {
    source: Arc<dyn ModelDecisionSource>,
    config: RouterConfig,
    history: Arc<DashMap<String, RouteHistory>>,
    events: Option<EventBus>,
}

impl AdaptiveRouter {
    /// Create a router around a decision source
    #[must_use]
    pub fn new(source: Arc<dyn ModelDecisionSource>, config: RouterConfig) -> Self {
        Self {
            source,
            config,
            history: Arc::new(DashMap::new()),
            events: None,
        }
    }

    /// Publish fallback events on `bus`
    #[must_use]
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Router settings
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route `task`, falling back when the source is not confident enough
    pub async fn route(&self, task: &str, context: &Context) -> Result<RoutingDecision> {
        let candidate = self.source.select(task, context).await?;
        let threshold = self.config.confidence_threshold;

        if candidate.confidence >= threshold {
            debug!(
                route = %candidate.route,
                confidence = candidate.confidence,
                "Direct routing decision"
            );
            return Ok(RoutingDecision::direct(
                candidate.route,
                candidate.confidence,
                candidate.reason,
            ));
        }

        let strategy = FallbackStrategy::select(candidate.confidence, task, threshold);
        let route = strategy.route_for(&candidate.route);
        info!(
            original_route = %candidate.route,
            route = %route,
            confidence = candidate.confidence,
            strategy = %strategy,
            "Low confidence, applying fallback"
        );
        if let Some(bus) = &self.events {
            bus.publish(OrchestrationEvent::RouteFallback {
                original_route: candidate.route.clone(),
                route: route.clone(),
                confidence: candidate.confidence,
            });
        }

        let mut metadata = HashMap::new();
        metadata.insert("original_route".to_string(), Value::from(candidate.route));
        metadata.insert("original_reason".to_string(), Value::from(candidate.reason));
        metadata.insert("threshold".to_string(), Value::from(threshold));

        Ok(RoutingDecision {
            route,
            reason: format!(
                "confidence {:.2} below threshold {:.2}, using fallback strategy {}",
                candidate.confidence, threshold, strategy
            ),
            confidence: candidate.confidence,
            fallback: Some(strategy),
            metadata,
        })
    }

    /// Estimate confidence for sending `task` to `route`.
    ///
    /// `base_rate × complexity × context_factor`, clamped to `[0, 1]`.
    #[must_use]
    pub fn calculate_confidence(&self, task: &str, route: &str, context: &Context) -> f64 {
        let base_rate = self
            .history
            .get(route)
            .and_then(|h| h.success_rate())
            .unwrap_or(DEFAULT_BASE_RATE);
        let words = task.split_whitespace().count() as f64;
        let complexity = (1.0 - words / 100.0).clamp(0.5, 1.0);
        let context_factor = if context.is_empty() { 0.9 } else { 1.1 };

        (base_rate * complexity * context_factor).clamp(0.0, 1.0)
    }

    /// Record whether acting on `decision` succeeded
    pub fn record_outcome(&self, decision: &RoutingDecision, success: bool) {
        let capacity = self.config.history_capacity;
        self.history
            .entry(decision.route.clone())
            .or_insert_with(|| RouteHistory::new(capacity))
            .push(decision.clone(), success);
        debug!(route = %decision.route, success, "Routing outcome recorded");
    }

    /// Retained outcome statistics for `route`
    #[must_use]
    pub fn route_stats(&self, route: &str) -> Option<RouteStats> {
        self.history.get(route).map(|h| RouteStats {
            route: route.to_string(),
            total: h.len(),
            successes: h.successes(),
            success_rate: h.success_rate().unwrap_or(0.0),
        })
    }

    /// Number of retained outcomes for `route`
    #[must_use]
    pub fn history_len(&self, route: &str) -> usize {
        self.history.get(route).map(|h| h.len()).unwrap_or(0)
    }

    /// Retained outcomes for `route`, oldest first
    #[must_use]
    pub fn history(&self, route: &str) -> Vec<RouteOutcome> {
        self.history
            .get(route)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}
