//! Application configuration types

use conflux_core::{EngineConfig, WorkerInfo};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub workers: Vec<WorkerSpec>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for conflux crates (overridden by RUST_LOG)
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Also write daily-rolling log files here
    #[serde(default)]
    pub directory: Option<String>,
    /// File name prefix for rolling log files
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "conflux.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

/// Settings for the simulated executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Delay per step unless the step sets `delay_ms`
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Actions that always fail
    #[serde(default)]
    pub fail_actions: Vec<String>,
}

fn default_step_delay_ms() -> u64 {
    50
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            fail_actions: Vec::new(),
        }
    }
}

/// A worker registered at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl WorkerSpec {
    pub fn to_worker(&self) -> WorkerInfo {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        WorkerInfo::new(self.id.clone(), name).with_capabilities(self.capabilities.iter().cloned())
    }
}
