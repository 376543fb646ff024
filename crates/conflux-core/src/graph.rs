//! Dependency graph between plan steps
//!
//! Step `i` depends on an earlier step `j` when one of its parameter values
//! mentions `$<action_j>` or `output_<action_j>`. Only earlier steps are
//! considered, so graphs inferred from a plan are always acyclic; graphs
//! built from explicit edges ([`DependencyGraph::from_edges`]) may not be.
//!
//! [`DependencyGraph::waves`] performs a layered topological sort: every wave
//! holds the steps whose dependencies all sit in earlier waves.

use crate::error::{Error, Result};
use crate::plan::{Plan, PlanStep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Indices of steps that may run concurrently
pub type Wave = Vec<usize>;

/// What to do with steps whose dependencies can never be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Fail the run with [`Error::Degenerate`]
    #[default]
    Reject,
    /// Run the stuck steps together in one final wave
    BestEffort,
}

impl std::fmt::Display for CyclePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::BestEffort => write!(f, "best_effort"),
        }
    }
}

/// Result of a layered topological sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveLayout {
    /// Waves in execution order
    pub waves: Vec<Wave>,
    /// Steps that could not be placed (cycle or missing dependency)
    pub unresolved: Vec<usize>,
}

impl WaveLayout {
    /// Whether every step was placed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Apply a cycle policy and return the waves to execute
    pub fn resolve(self, policy: CyclePolicy) -> Result<Vec<Wave>> {
        if self.is_complete() {
            return Ok(self.waves);
        }
        match policy {
            CyclePolicy::Reject => Err(Error::Degenerate(format!(
                "dependency cycle among steps {:?}",
                self.unresolved
            ))),
            CyclePolicy::BestEffort => {
                warn!(
                    steps = ?self.unresolved,
                    "Unresolvable dependencies, running remaining steps in a final wave"
                );
                let mut waves = self.waves;
                waves.push(self.unresolved);
                Ok(waves)
            }
        }
    }
}

/// Inferred ordering constraints between the steps of one plan
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    deps: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    /// Infer dependencies from a plan's step parameters
    #[must_use]
    pub fn from_plan(plan: &Plan) -> Self {
        Self::from_steps(&plan.steps)
    }

    /// Infer dependencies from an ordered slice of steps
    #[must_use]
    pub fn from_steps(steps: &[PlanStep]) -> Self {
        let deps = steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let texts: Vec<_> = step.parameter_texts().collect();
                steps[..i]
                    .iter()
                    .enumerate()
                    .filter(|(_, earlier)| {
                        let by_ref = format!("${}", earlier.action);
                        let by_output = format!("output_{}", earlier.action);
                        texts
                            .iter()
                            .any(|t| t.contains(&by_ref) || t.contains(&by_output))
                    })
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();
        Self { deps }
    }

    /// Build a graph from explicit `(step, depends_on)` edges.
    ///
    /// Edges pointing outside `0..len` are kept and leave the step unresolvable.
    #[must_use]
    pub fn from_edges(len: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut deps = vec![BTreeSet::new(); len];
        for (step, dependency) in edges {
            if let Some(set) = deps.get_mut(step) {
                set.insert(dependency);
            }
        }
        Self { deps }
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.deps.len()
    }

    /// Whether the graph has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Steps that `index` waits for
    #[must_use]
    pub fn dependencies_of(&self, index: usize) -> Option<&BTreeSet<usize>> {
        self.deps.get(index)
    }

    /// Steps that wait for `index`
    #[must_use]
    pub fn dependents_of(&self, index: usize) -> Vec<usize> {
        self.deps
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.contains(&index))
            .map(|(i, _)| i)
            .collect()
    }

    /// Layered topological sort
    #[must_use]
    pub fn waves(&self) -> WaveLayout {
        let mut placed = vec![false; self.deps.len()];
        let mut remaining = self.deps.len();
        let mut waves = Vec::new();

        while remaining > 0 {
            let wave: Wave = (0..self.deps.len())
                .filter(|&i| !placed[i])
                .filter(|&i| {
                    self.deps[i]
                        .iter()
                        .all(|&d| placed.get(d).copied().unwrap_or(false))
                })
                .collect();

            if wave.is_empty() {
                break;
            }

            for &i in &wave {
                placed[i] = true;
            }
            remaining -= wave.len();
            debug!(wave = waves.len(), steps = ?wave, "Wave formed");
            waves.push(wave);
        }

        let unresolved = (0..self.deps.len()).filter(|&i| !placed[i]).collect();
        WaveLayout { waves, unresolved }
    }

    /// Whether some steps can never become ready
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        !self.waves().is_complete()
    }
}
