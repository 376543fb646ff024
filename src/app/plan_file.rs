//! Reading plans from disk

use anyhow::{Context, Result};
use conflux_core::Plan;
use std::path::Path;

/// Load a plan from a `.yaml`/`.yml` file, or JSON otherwise
pub fn load_plan(path: &Path) -> Result<Plan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML plan in {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON plan in {}", path.display()))
    }
}
