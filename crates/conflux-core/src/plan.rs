//! Plan model
//!
//! A [`Plan`] is an ordered list of [`PlanStep`]s produced by an external
//! [`Planner`]. Step order is significant: the position of a step in
//! `Plan::steps` is its index for the whole scheduling run.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

/// Free-form context passed to planners and routers
pub type Context = HashMap<String, String>;

fn default_confidence() -> f64 {
    1.0
}

/// A single abstract step of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Action identifier (e.g. "compile", "fetch")
    pub action: String,
    /// Named parameters
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// Planner confidence in this step (0..1)
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    /// What the planner expects this step to produce
    #[serde(default)]
    pub expected_outcome: String,
}

impl PlanStep {
    /// Create a step with no parameters
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            parameters: HashMap::new(),
            confidence_score: default_confidence(),
            expected_outcome: String::new(),
        }
    }

    /// Add a parameter
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Set the confidence score
    #[must_use]
    pub fn with_confidence(mut self, score: f64) -> Self {
        self.confidence_score = score;
        self
    }

    /// Set the expected outcome
    #[must_use]
    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }

    /// Parameter values rendered as text.
    ///
    /// Strings are yielded verbatim; every other JSON value uses its JSON text.
    pub fn parameter_texts(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.parameters.values().map(|value| match value {
            Value::String(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        })
    }
}

/// An ordered, immutable plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Goal the plan was produced for
    pub goal: String,
    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    /// Planner confidence by label
    #[serde(default)]
    pub confidence_scores: HashMap<String, f64>,
    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Create an empty plan for a goal
    #[must_use]
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
            confidence_scores: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a step
    #[must_use]
    pub fn with_step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append several steps
    #[must_use]
    pub fn with_steps(mut self, steps: impl IntoIterator<Item = PlanStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Record a labelled confidence score
    #[must_use]
    pub fn with_confidence(mut self, label: impl Into<String>, score: f64) -> Self {
        self.confidence_scores.insert(label.into(), score);
        self
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of executing one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The (sandboxed) step that was actually run
    pub step: PlanStep,
    /// Whether the step succeeded
    pub success: bool,
    /// Step output
    pub output: String,
    /// Error message if failed
    pub error: Option<String>,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
    /// State observed by the executor after the step
    #[serde(default)]
    pub observed_state: HashMap<String, Value>,
}

impl StepResult {
    /// A successful result
    #[must_use]
    pub fn success(step: PlanStep, output: impl Into<String>) -> Self {
        Self {
            step,
            success: true,
            output: output.into(),
            error: None,
            duration_ms: 0,
            observed_state: HashMap::new(),
        }
    }

    /// A failed result
    #[must_use]
    pub fn failure(step: PlanStep, error: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            output: String::new(),
            error: Some(error.into()),
            duration_ms: 0,
            observed_state: HashMap::new(),
        }
    }

    /// Set the duration
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Record an observed state entry
    #[must_use]
    pub fn with_observed(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.observed_state.insert(key.into(), value.into());
        self
    }
}

/// Produces plans from goals (backed by a language model elsewhere)
#[async_trait]
pub trait Planner: Send + Sync {
    /// Build a plan for `goal`
    async fn plan(&self, goal: &str, context: &Context) -> Result<Plan>;
}
