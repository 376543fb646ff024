//! Simulated step executor
//!
//! Stands in for real workers when running plans from the CLI: every step
//! sleeps for a while and then succeeds, unless its action is listed in
//! `simulation.fail_actions`.

use super::config::SimulationConfig;
use async_trait::async_trait;
use conflux_core::{PlanStep, StepExecutor, StepResult};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct SimulatedExecutor {
    delay: Duration,
    fail_actions: HashSet<String>,
}

impl SimulatedExecutor {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.step_delay_ms),
            fail_actions: config.fail_actions.iter().cloned().collect(),
        }
    }
}

#[async_trait]
impl StepExecutor for SimulatedExecutor {
    async fn execute(&self, step: PlanStep, cancel: CancellationToken) -> StepResult {
        // a step may ask for its own delay
        let delay = step
            .parameters
            .get("delay_ms")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or(self.delay);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                debug!(action = %step.action, "Simulated step interrupted");
                return StepResult::failure(step, "cancelled");
            }
        }

        if self.fail_actions.contains(&step.action) {
            let error = format!("simulated failure for '{}'", step.action);
            return StepResult::failure(step, error);
        }

        let output = format!("{} completed", step.action);
        StepResult::success(step, output).with_observed("simulated", true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(fail: &[&str]) -> SimulatedExecutor {
        SimulatedExecutor::new(&SimulationConfig {
            step_delay_ms: 1,
            fail_actions: fail.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn test_success_and_configured_failure() {
        let exec = executor(&["deploy"]);

        let ok = exec
            .execute(PlanStep::new("build"), CancellationToken::new())
            .await;
        assert!(ok.success);
        assert_eq!(ok.output, "build completed");

        let failed = exec
            .execute(PlanStep::new("deploy"), CancellationToken::new())
            .await;
        assert!(!failed.success);
        assert!(failed.error.unwrap().contains("deploy"));
    }

    #[tokio::test]
    async fn test_cancelled_step_stops_early() {
        let exec = executor(&[]);
        let token = CancellationToken::new();
        token.cancel();

        let result = exec
            .execute(
                PlanStep::new("slow").with_parameter("delay_ms", 10_000),
                token,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }
}
