//! Integration tests for the domain facade: bootstrap from configuration,
//! catalog pipeline runs and dynamic dispatch.

use std::sync::Arc;

use ensemble_config::{DispatcherConfig, EnsembleConfig, IntentRule};
use ensemble_domain::{
    DISPATCH_STATE_KEY, DomainConfig, DomainServices, DryRunInvoker, SessionState,
};
use ensemble_pipeline::{CapabilityCatalog, CategoryRegistrar, DefinitionCompiler};
use ensemble_types::{CapabilityDescriptor, EventPayload};

fn services() -> DomainServices {
    DomainServices::from_config(&EnsembleConfig::default(), Arc::new(DryRunInvoker))
        .expect("default config bootstraps")
}

fn services_with_dispatcher(dispatcher: DispatcherConfig) -> DomainServices {
    let config = EnsembleConfig {
        dispatcher: Some(dispatcher),
        ..Default::default()
    };
    DomainServices::from_config(&config, Arc::new(DryRunInvoker)).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Bootstrap
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_default_bootstrap_registers_builtin_catalog() {
    let services = services();
    let report = services.bootstrap_report();
    assert!(report.failed.is_empty(), "failed: {:?}", report.failed);
    assert_eq!(report.registered.len(), 11);
    assert_eq!(services.pipelines().status_report().total, 61);
    assert_eq!(services.catalog().len(), 10);
}

#[test]
fn test_user_definitions_register_under_custom() {
    let config = EnsembleConfig::from_toml(
        r#"
[[pipeline]]
name = "Weekly Review"
members = ["data", "strategic"]

[[pipeline]]
name = "Broken"
members = ["ghost"]
"#,
    )
    .unwrap();
    let services = DomainServices::from_config(&config, Arc::new(DryRunInvoker)).unwrap();

    let meta = services.pipelines().pipeline_metadata("Weekly Review").unwrap();
    assert_eq!(meta.category, "Custom");
    assert_eq!(meta.members, vec!["data", "strategic"]);
    assert!(services.pipelines().pipeline_metadata("Broken").is_err());

    let report = services.bootstrap_report();
    assert!(report.registered.contains(&("Custom".to_string(), 1)));
    assert!(report.failed.iter().any(|(name, _)| name == "Broken"));
    assert_eq!(services.pipelines().status_report().total, 62);
}

#[test]
fn test_failing_registrar_is_skipped() {
    let catalog = Arc::new(CapabilityCatalog::from_descriptors([
        CapabilityDescriptor::new("data", "DataAnalysisAgent"),
    ]));
    let compiler = DefinitionCompiler::new(Arc::clone(&catalog), Default::default());
    let registrars: Vec<Box<dyn CategoryRegistrar>> =
        ensemble_workflows::builtin_registrars(&compiler);

    let services = DomainServices::new(
        catalog,
        Arc::new(DryRunInvoker),
        &registrars,
        &DomainConfig::default(),
    );
    let report = services.bootstrap_report();
    assert_eq!(
        report.registered.len() + report.failed.len(),
        11,
        "every routine is accounted for"
    );
    assert!(!report.failed.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog runs
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_catalog_pipeline() {
    let services = services();
    let outcome = services
        .pipelines()
        .run_pipeline("Lead Generation", "Find fintech prospects", SessionState::new("s1"))
        .unwrap()
        .finish()
        .await;

    assert!(outcome.is_success());
    let producers: Vec<&str> = outcome.events.iter().map(|e| e.producer.as_str()).collect();
    assert_eq!(producers.len(), 3);
    assert!(outcome.output().unwrap().contains("Find fintech prospects"));
    assert!(outcome.state.contains("marketing_tools"));
    assert!(outcome.state.contains("data_output"));
}

#[tokio::test]
async fn test_run_unknown_pipeline() {
    let err = services()
        .pipelines()
        .run_pipeline("Nope", "x", SessionState::new("s1"))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_catalog_runs_do_not_share_units() {
    let services = services();
    let a = services.pipelines().build_pipeline("Lead Generation").unwrap();
    let b = services.pipelines().build_pipeline("Lead Generation").unwrap();
    for instance in a.unit_instances() {
        assert!(!b.unit_instances().contains(&instance));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dynamic dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dispatch_single_capability() {
    let services = services();
    let execution = services
        .dispatcher()
        .run_dynamic("Plan Q2 OKRs for the product team", SessionState::new("s1"));
    assert_eq!(execution.pipeline_name(), "dynamic-sequential-1");

    let outcome = execution.finish().await;
    assert!(outcome.is_success());
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].producer, "StrategicPlanningAgent_dynamic");

    let record = outcome.state.get(DISPATCH_STATE_KEY).unwrap();
    assert_eq!(record["members"], serde_json::json!(["strategic"]));
    assert_eq!(record["pattern"], "sequential");
    assert_eq!(record["request"], "Plan Q2 OKRs for the product team");
}

#[tokio::test]
async fn test_dispatch_parallel_fallback() {
    let services = services();
    let execution = services
        .dispatcher()
        .run_dynamic("compare perspectives on EU expansion", SessionState::new("s1"));
    assert_eq!(execution.pipeline_name(), "dynamic-parallel-2");

    let outcome = execution.finish().await;
    assert!(outcome.is_success());
    let mut producers: Vec<&str> = outcome.events.iter().map(|e| e.producer.as_str()).collect();
    producers.sort();
    assert_eq!(
        producers,
        vec!["DataAnalysisAgent_dynamic", "StrategicPlanningAgent_dynamic"]
    );
}

#[tokio::test]
async fn test_dispatch_uses_history_when_request_empty() {
    let services = services();
    let mut state = SessionState::new("s1");
    state.push_turn("user", "What does our budget look like?");
    state.push_turn("assistant", "");

    let outcome = services.dispatcher().run_dynamic("  ", state).finish().await;
    assert!(outcome.is_success());
    let record = outcome.state.get(DISPATCH_STATE_KEY).unwrap();
    assert_eq!(record["members"], serde_json::json!(["financial"]));
    assert_eq!(record["request"], "What does our budget look like?");
}

#[tokio::test]
async fn test_dispatch_without_request_or_history_emits_notice() {
    let outcome = services()
        .dispatcher()
        .run_dynamic("", SessionState::new("s1"))
        .finish()
        .await;
    assert!(outcome.is_success());
    assert_eq!(outcome.events.len(), 1);
    assert!(matches!(outcome.events[0].payload, EventPayload::Notice { .. }));
    assert!(!outcome.state.contains(DISPATCH_STATE_KEY));
}

#[tokio::test]
async fn test_dispatch_skips_unknown_capabilities() {
    let services = services_with_dispatcher(DispatcherConfig {
        rules: vec![
            IntentRule::new("ghost", &["forecast"]),
            IntentRule::new("data", &["forecast"]),
        ],
        ..Default::default()
    });
    let outcome = services
        .dispatcher()
        .run_dynamic("forecast next quarter", SessionState::new("s1"))
        .finish()
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].producer, "DataAnalysisAgent_dynamic");
    let record = outcome.state.get(DISPATCH_STATE_KEY).unwrap();
    assert_eq!(record["members"], serde_json::json!(["data"]));
}

#[tokio::test]
async fn test_dispatch_with_nothing_buildable_lists_available() {
    let services = services_with_dispatcher(DispatcherConfig {
        rules: vec![],
        fallback: vec!["ghost".to_string()],
        ..Default::default()
    });
    let outcome = services
        .dispatcher()
        .run_dynamic("anything", SessionState::new("s1"))
        .finish()
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.events.len(), 1);
    let text = outcome.events[0].text().unwrap_or_default().to_string();
    assert!(text.contains("Available capabilities"));
    assert!(text.contains("strategic"));
}

#[tokio::test]
async fn test_dispatched_units_are_fresh_per_call() {
    let services = services();
    let first = services
        .dispatcher()
        .run_dynamic("analyze the dashboard", SessionState::new("a"));
    let second = services
        .dispatcher()
        .run_dynamic("analyze the dashboard", SessionState::new("b"));
    let (a, b) = tokio::join!(first.finish(), second.finish());
    assert!(a.is_success());
    assert!(b.is_success());
}

#[test]
fn test_determine_pattern() {
    let services = services();
    let dispatcher = services.dispatcher();
    assert_eq!(
        dispatcher.determine_pattern("Run these simultaneously"),
        ensemble_domain::CompositionKind::Parallel
    );
    assert_eq!(
        dispatcher.determine_pattern("Draft a hiring plan"),
        ensemble_domain::CompositionKind::Sequential
    );
}
