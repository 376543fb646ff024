//! `conflux run`

use crate::app::config::AppConfig;
use crate::app::plan_file::load_plan;
use crate::app::simulate::SimulatedExecutor;
use anyhow::{bail, Result};
use conflux_core::{
    format_error_for_cli, Engine, ModelDecisionSource, PassthroughGuard, StaticDecisionSource,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Build an engine backed by the simulated executor
pub(crate) fn build_engine(
    config: &AppConfig,
    source: Arc<dyn ModelDecisionSource>,
) -> Result<Engine> {
    let engine = Engine::new(
        config.engine.clone(),
        Arc::new(SimulatedExecutor::new(&config.simulation)),
        Arc::new(PassthroughGuard),
        source,
    )
    .map_err(|e| anyhow::anyhow!(format_error_for_cli(&e)))?;

    for worker in &config.workers {
        if let Err(e) = engine.register_worker(worker.to_worker()) {
            warn!(worker = %worker.id, error = %e, "Skipping worker");
        }
    }
    Ok(engine)
}

pub async fn run(path: &Path, config: AppConfig, distributed: bool, wave_aware: bool) -> Result<()> {
    let plan = load_plan(path)?;
    let engine = build_engine(
        &config,
        Arc::new(StaticDecisionSource::new("general", 1.0)),
    )?;

    // Ctrl+C stops the run at the next wave boundary
    let on_interrupt = engine.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling run");
            on_interrupt.cancel();
        }
    });

    info!(goal = %plan.goal, steps = plan.len(), distributed, wave_aware, "Running plan");
    let (success, report) = if distributed {
        let result = if wave_aware {
            engine.execute_waves_distributed(&plan).await
        } else {
            engine.execute_distributed(&plan).await
        }
        .map_err(|e| anyhow::anyhow!(format_error_for_cli(&e)))?;
        (result.success, serde_json::to_string_pretty(&result)?)
    } else {
        let outcome = engine
            .schedule_parallel(&plan)
            .await
            .map_err(|e| anyhow::anyhow!(format_error_for_cli(&e)))?;
        (outcome.success, serde_json::to_string_pretty(&outcome)?)
    };
    interrupt.abort();

    println!("{report}");
    if !success {
        bail!("Plan '{}' did not complete successfully", plan.goal);
    }
    Ok(())
}
