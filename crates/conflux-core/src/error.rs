//! Error types for conflux-core
//!
//! This module provides error types and user-friendly error formatting.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Worker registry is full
    #[error("registry full: {max} agents already registered")]
    Capacity {
        /// Configured maximum number of agents
        max: usize,
    },

    /// Unknown worker, route or assignment
    #[error("not found: {0}")]
    NotFound(String),

    /// No workers can take the work
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Dependency cycle or empty plan
    #[error("degenerate plan: {0}")]
    Degenerate(String),

    /// Every step of a distributed run failed
    #[error("execution error: {0}")]
    Execution(String),

    /// The external planner failed
    #[error("planning error: {0}")]
    Planning(String),

    /// The decision source failed to produce a route
    #[error("routing error: {0}")]
    Routing(String),

    /// Invalid configuration
    #[error("invalid configuration: {field}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Run was cancelled before any work started
    #[error("cancelled")]
    Cancelled,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages and suggestions for fixing.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::Capacity { max } => {
                format!("🚫 Worker registry is full ({} agents).", max)
            }
            Error::NotFound(what) => format!("🔍 Not found: {}", what),
            Error::Unavailable(msg) => format!("💤 Unavailable: {}", msg),
            Error::Degenerate(msg) => format!("🔁 Plan cannot be scheduled: {}", msg),
            Error::Execution(msg) => format!("⚡ Execution failed: {}", msg),
            Error::Planning(msg) => format!("📋 Planning failed: {}", msg),
            Error::Routing(msg) => format!("🧭 Routing failed: {}", msg),
            Error::InvalidConfig { field, message } => {
                format!("⚙️ Configuration error in '{}': {}", field, message)
            }
            Error::Cancelled => "✋ Run cancelled.".to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::Capacity { .. } => Some(
                "💡 Unregister idle workers or raise registry.max_agents.".to_string(),
            ),
            Error::Unavailable(_) => Some(
                "💡 Register a worker or send heartbeats before dispatching work.".to_string(),
            ),
            Error::Degenerate(_) => Some(
                "💡 Check step parameters for circular `$action` / `output_action` references."
                    .to_string(),
            ),
            Error::InvalidConfig { field, .. } => Some(format!(
                "💡 Check the '{}' setting in config/default.toml or CONFLUX_* variables.",
                field
            )),
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = String::new();

    output.push_str(&error.user_message());
    output.push('\n');

    if let Some(suggestion) = error.suggestion() {
        output.push('\n');
        output.push_str(&suggestion);
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests;
