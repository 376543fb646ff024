//! `conflux route`

use super::run::build_engine;
use crate::app::config::AppConfig;
use anyhow::Result;
use conflux_core::{format_error_for_cli, Context, StaticDecisionSource};
use std::sync::Arc;

pub async fn run(
    task: &str,
    route: &str,
    confidence: f64,
    context: Vec<(String, String)>,
    config: AppConfig,
) -> Result<()> {
    let source = StaticDecisionSource::new(route, confidence).with_reason("requested on the command line");
    let engine = build_engine(&config, Arc::new(source))?;

    let context: Context = context.into_iter().collect();
    let decision = engine
        .route(task, &context)
        .await
        .map_err(|e| anyhow::anyhow!(format_error_for_cli(&e)))?;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
