//! `conflux config`

use crate::app::config::AppConfig;
use anyhow::Result;

pub fn run(config: &AppConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
