//! Bounded per-route outcome history

use super::RoutingDecision;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One recorded routing outcome
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    /// Decision that was acted on
    pub decision: RoutingDecision,
    /// Whether acting on it succeeded
    pub success: bool,
    /// When the outcome was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Fixed-capacity ring buffer of outcomes; the oldest entry is evicted first
#[derive(Debug, Clone)]
pub struct RouteHistory {
    entries: Vec<RouteOutcome>,
    capacity: usize,
    head: usize,
}

impl RouteHistory {
    /// Create an empty history (capacity is at least 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Record an outcome, evicting the oldest when full
    pub fn push(&mut self, decision: RoutingDecision, success: bool) {
        let outcome = RouteOutcome {
            decision,
            success,
            recorded_at: Utc::now(),
        };
        if self.entries.len() < self.capacity {
            self.entries.push(outcome);
        } else {
            self.entries[self.head] = outcome;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Number of stored outcomes
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of stored outcomes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Outcomes, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &RouteOutcome> {
        let (newer, older) = self.entries.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Number of successful outcomes
    #[must_use]
    pub fn successes(&self) -> usize {
        self.entries.iter().filter(|o| o.success).count()
    }

    /// Fraction of successful outcomes, `None` when empty
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.successes() as f64 / self.entries.len() as f64)
        }
    }
}
