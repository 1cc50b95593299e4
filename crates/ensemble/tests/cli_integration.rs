//! CLI integration tests for the Ensemble command-line interface.
//!
//! Every test runs with a throwaway config directory and working directory,
//! so no user or project config leaks in. All runs use the dry-run invoker.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// An ensemble command isolated in its own config and project directories.
struct Sandbox {
    config: TempDir,
    project: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            config: TempDir::new().unwrap(),
            project: TempDir::new().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("ensemble").unwrap();
        cmd.env("ENSEMBLE_CONFIG_DIR", self.config.path())
            .current_dir(self.project.path());
        cmd
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().arg("--json").args(args).output().unwrap();
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    Sandbox::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pipelines"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("dispatch"))
        .stdout(predicate::str::contains("capabilities"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    Sandbox::new()
        .cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ensemble"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    Sandbox::new().cmd().arg("frobnicate").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_pipelines_list_json() {
    let rows = Sandbox::new().json(&["pipelines", "list"]);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 61);
    assert!(rows.iter().any(|r| r["name"] == "Lead Generation"));
}

#[test]
fn test_pipelines_list_filters() {
    let sandbox = Sandbox::new();
    let marketing = sandbox.json(&["pipelines", "list", "--category", "Marketing"]);
    assert_eq!(marketing.as_array().unwrap().len(), 10);

    let support = sandbox.json(&["pipelines", "list", "--member", "support"]);
    let names: Vec<&str> = support
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Customer Journey Mapping"]);
}

#[test]
fn test_pipelines_show() {
    Sandbox::new()
        .cmd()
        .args(["pipelines", "show", "Lead Generation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sales"))
        .stdout(predicate::str::contains("marketing, content, data"));
}

#[test]
fn test_pipelines_show_unknown_fails() {
    Sandbox::new()
        .cmd()
        .args(["pipelines", "show", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pipeline not found: Nope"));
}

#[test]
fn test_status_json_counts() {
    let status = Sandbox::new().json(&["status"]);
    assert_eq!(status["total"], 61);
    assert_eq!(status["capabilities"], 10);
    assert_eq!(status["by_pattern"]["loop"], 13);
    assert!(status["skipped"].as_array().unwrap().is_empty());
}

#[test]
fn test_capabilities_json() {
    let caps = Sandbox::new().json(&["capabilities"]);
    let ids: Vec<&str> = caps
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["id"].as_str())
        .collect();
    assert_eq!(ids.len(), 10);
    assert!(ids.contains(&"financial"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Running
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_catalog_pipeline() {
    Sandbox::new()
        .cmd()
        .args(["run", "Lead Generation", "--input", "fintech prospects"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fintech prospects"))
        .stdout(predicate::str::contains("completed"));
}

#[test]
fn test_run_json_outcome() {
    let outcome = Sandbox::new().json(&["run", "Lead Generation", "-i", "q3", "-s", "seed=1"]);
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["events"].as_array().unwrap().len(), 3);
    assert_eq!(outcome["state"]["seed"], 1);
    assert!(outcome["state"]["data_output"].is_string());
}

#[test]
fn test_run_unknown_pipeline_fails() {
    Sandbox::new()
        .cmd()
        .args(["run", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pipeline not found"));
}

#[test]
fn test_dispatch_classify_only() {
    let classification = Sandbox::new().json(&[
        "dispatch",
        "Plan Q2 OKRs for the product team",
        "--classify-only",
    ]);
    assert_eq!(classification["members"], serde_json::json!(["strategic"]));
    assert_eq!(classification["pattern"], "sequential");
}

#[test]
fn test_dispatch_parallel_run() {
    Sandbox::new()
        .cmd()
        .args(["dispatch", "compare perspectives on EU expansion"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dynamic-parallel-2"))
        .stdout(predicate::str::contains("StrategicPlanningAgent_dynamic"))
        .stdout(predicate::str::contains("DataAnalysisAgent_dynamic"));
}

#[test]
fn test_dispatch_history_fallback() {
    let classification = Sandbox::new().json(&[
        "dispatch",
        "--history",
        "hello",
        "--history",
        "what is our budget?",
        "--classify-only",
    ]);
    assert_eq!(classification["members"], serde_json::json!(["financial"]));
    assert_eq!(classification["request"], "what is our budget?");
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_and_which() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(sandbox.config.path().join("config.toml").exists());

    sandbox
        .cmd()
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    sandbox
        .cmd()
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓"));
}

#[test]
fn test_project_pipeline_is_registered() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.project.path().join("ensemble.toml"),
        r#"
[[pipeline]]
name = "Board Prep"
kind = "parallel"
members = ["financial", "strategic"]
"#,
    )
    .unwrap();

    let status = sandbox.json(&["status"]);
    assert_eq!(status["total"], 62);
    assert_eq!(status["by_category"]["Custom"], 1);

    sandbox
        .cmd()
        .args(["run", "Board Prep", "--input", "Q4 board"])
        .assert()
        .success()
        .stdout(predicate::str::contains("FinancialAnalysisAgent"));
}

#[test]
fn test_malformed_project_config_is_a_warning() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.project.path().join("ensemble.toml"), "[[pipeline]\n").unwrap();

    let status = sandbox.json(&["status"]);
    assert_eq!(status["total"], 61);
}
