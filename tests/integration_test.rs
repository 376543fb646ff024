//! Integration tests for the conflux binary
//!
//! CLI tests run the compiled binary in a scratch directory so only the
//! embedded defaults and the test's own `--config` file apply. The demo
//! plans shipped in `demos/` are checked against the engine directly.

use conflux_core::{
    DependencyGraph, Engine, EngineConfig, FnExecutor, PassthroughGuard, Plan, StaticDecisionSource,
    StepResult,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::assert_ok;

const FANOUT_PLAN: &str = r#"{
  "goal": "collect",
  "steps": [
    { "action": "fetch", "parameters": { "region": "eu" } },
    { "action": "fetch", "parameters": { "region": "us" } },
    { "action": "fetch", "parameters": { "region": "ap" } },
    { "action": "compile", "parameters": { "inputs": "$fetch" } }
  ]
}"#;

const FAST_CONFIG: &str = r#"
[simulation]
step_delay_ms = 1

[engine.assigner]
strategy = "round_robin"

[[workers]]
id = "alpha"
capabilities = ["fetch", "compile"]

[[workers]]
id = "beta"
capabilities = ["fetch"]
"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        ws.write("plan.json", FANOUT_PLAN);
        ws.write("fast.toml", FAST_CONFIG);
        ws
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn conflux(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_conflux"))
            .args(args)
            .current_dir(self.path())
            .env_remove("CONFLUX_ENV")
            .env("RUST_LOG", "error")
            .output()
            .unwrap()
    }
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn test_waves_command_lists_waves_and_speedup() {
    let ws = Workspace::new();
    let output = ws.conflux(&["waves", "plan.json"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("wave 1: [0] fetch, [1] fetch, [2] fetch"));
    assert!(stdout.contains("wave 2: [3] compile"));
    assert!(stdout.contains("2.00x"));
}

#[test]
fn test_run_schedules_plan_locally() {
    let ws = Workspace::new();
    let output = ws.conflux(&["--config", "fast.toml", "run", "plan.json"]);
    assert!(output.status.success());

    let outcome = stdout_json(&output);
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["waves_executed"], 2);
    assert_eq!(outcome["results"].as_array().unwrap().len(), 4);
    assert_eq!(outcome["results"][3]["output"], "compile completed");
}

#[test]
fn test_run_distributed_uses_configured_workers() {
    let ws = Workspace::new();
    let output = ws.conflux(&[
        "--config",
        "fast.toml",
        "run",
        "plan.json",
        "--distributed",
    ]);
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["success"], true);
    assert_eq!(result["metadata"]["strategy"], "round_robin");
    assert_eq!(result["metadata"]["agents_available"], 2);
    assert_eq!(result["metadata"]["agents_used"], 2);
    assert_eq!(result["assignments"].as_array().unwrap().len(), 4);
}

#[test]
fn test_run_wave_aware_counts_rounds() {
    let ws = Workspace::new();
    let output = ws.conflux(&[
        "--config",
        "fast.toml",
        "run",
        "plan.json",
        "--distributed",
        "--wave-aware",
    ]);
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["metadata"]["rounds"], 2);
    // round-robin restarts every wave, so the lone compile step goes to alpha
    assert_eq!(result["assignments"][3]["agent_id"], "alpha");
}

#[test]
fn test_failed_step_exits_nonzero() {
    let ws = Workspace::new();
    ws.write(
        "failing.toml",
        "[simulation]\nstep_delay_ms = 1\nfail_actions = [\"compile\"]\n",
    );
    let output = ws.conflux(&["--config", "failing.toml", "run", "plan.json"]);
    assert!(!output.status.success());

    let outcome = stdout_json(&output);
    assert_eq!(outcome["success"], false);
    assert_eq!(outcome["results"][0]["success"], true);
    assert_eq!(outcome["results"][3]["success"], false);
}

#[test]
fn test_route_low_confidence_falls_back() {
    let ws = Workspace::new();
    let output = ws.conflux(&[
        "route",
        "fix it",
        "--route",
        "code",
        "--confidence",
        "0.2",
        "--context",
        "repo=conflux",
    ]);
    assert!(output.status.success());

    let decision = stdout_json(&output);
    assert_eq!(decision["route"], "clarification_needed");
    assert_eq!(decision["fallback"], "request_clarification");
    assert_eq!(decision["metadata"]["original_route"], "code");
}

#[test]
fn test_invalid_config_is_reported() {
    let ws = Workspace::new();
    ws.write("bad.toml", "[engine.registry]\nmax_agents = 0\n");
    let output = ws.conflux(&["--config", "bad.toml", "config"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("registry.max_agents"));
}

#[test]
fn test_config_command_prints_effective_config() {
    let ws = Workspace::new();
    let output = ws.conflux(&["--config", "fast.toml", "config"]);
    assert!(output.status.success());

    let config = stdout_json(&output);
    assert_eq!(config["engine"]["assigner"]["strategy"], "round_robin");
    assert_eq!(config["simulation"]["step_delay_ms"], 1);
    assert_eq!(config["workers"].as_array().unwrap().len(), 2);
}

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[test]
fn test_release_demo_waves() {
    let content = assert_ok!(std::fs::read_to_string(demo("release.yaml")));
    let plan: Plan = assert_ok!(serde_yaml::from_str(&content));

    let layout = DependencyGraph::from_plan(&plan).waves();
    assert!(layout.is_complete());
    assert_eq!(layout.waves, vec![vec![0, 5], vec![1], vec![2, 3], vec![4]]);
}

#[tokio::test]
async fn test_fanout_demo_runs_on_engine() {
    let content = assert_ok!(std::fs::read_to_string(demo("fanout.json")));
    let plan: Plan = assert_ok!(serde_json::from_str(&content));

    let engine = assert_ok!(Engine::new(
        EngineConfig::default(),
        Arc::new(FnExecutor::new(|step: conflux_core::PlanStep| async move {
            let region = step.parameters.get("region").cloned();
            let output = format!("{} {}", step.action, region.unwrap_or_default());
            StepResult::success(step, output)
        })),
        Arc::new(PassthroughGuard),
        Arc::new(StaticDecisionSource::new("general", 1.0)),
    ));

    assert_eq!(engine.estimate_speedup(&plan), 2.0);
    let outcome = assert_ok!(engine.schedule_parallel(&plan).await);
    assert!(outcome.success);
    assert_eq!(outcome.waves_executed, 2);
    assert_eq!(outcome.results[1].output, "fetch \"us\"");
}
