//! `conflux waves`

use crate::app::config::AppConfig;
use crate::app::plan_file::load_plan;
use anyhow::Result;
use conflux_core::{estimate_speedup, DependencyGraph};
use std::path::Path;

pub fn run(path: &Path, config: &AppConfig) -> Result<()> {
    let plan = load_plan(path)?;
    let layout = DependencyGraph::from_plan(&plan).waves();

    println!("🌊 {} ({} steps)\n", plan.goal, plan.len());
    for (n, wave) in layout.waves.iter().enumerate() {
        let actions: Vec<String> = wave
            .iter()
            .map(|&i| format!("[{}] {}", i, plan.steps[i].action))
            .collect();
        println!("  wave {}: {}", n + 1, actions.join(", "));
    }

    if !layout.is_complete() {
        println!(
            "\n⚠️  Unresolved steps {:?} (cycle policy: {})",
            layout.unresolved, config.engine.scheduler.cycle_policy
        );
    }

    println!("\nEstimated speedup: {:.2}x", estimate_speedup(&plan));
    Ok(())
}
