//! Application wiring for the CLI
//!
//! - `config`: TOML-facing configuration types
//! - `loader`: layered configuration loading
//! - `logging`: tracing subscriber setup
//! - `plan_file`: reading plans from JSON or YAML
//! - `simulate`: the simulated step executor used by `conflux run`

pub mod config;
pub mod loader;
pub mod logging;
pub mod plan_file;
pub mod simulate;
