//! Configuration types.

use ensemble_types::{CapabilityDescriptor, FailurePolicy, PipelineDefinition};
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root configuration.
///
/// Every section is optional so that layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatcher: Option<DispatcherConfig>,
    /// Capability descriptor catalog (`[[capability]]`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capability: Vec<CapabilityDescriptor>,
    /// User-defined catalog pipelines (`[[pipeline]]`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pipeline: Vec<PipelineDefinition>,
}

impl EnsembleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Capabilities merge by `id` and pipelines by `name`; the `[engine]`
    /// and `[dispatcher]` sections are replaced wholesale.
    pub fn merge(&mut self, other: EnsembleConfig) {
        if other.engine.is_some() {
            self.engine = other.engine;
        }
        if other.dispatcher.is_some() {
            self.dispatcher = other.dispatcher;
        }

        for desc in other.capability {
            match self.capability.iter_mut().find(|c| c.id == desc.id) {
                Some(existing) => *existing = desc,
                None => self.capability.push(desc),
            }
        }

        for def in other.pipeline {
            match self.pipeline.iter_mut().find(|p| p.name == def.name) {
                Some(existing) => *existing = def,
                None => self.pipeline.push(def),
            }
        }
    }

    /// Effective engine settings.
    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    /// Effective dispatcher settings.
    pub fn dispatcher(&self) -> DispatcherConfig {
        self.dispatcher.clone().unwrap_or_default()
    }

    /// Effective capability catalog: the configured entries, or the embedded
    /// defaults when none are configured.
    pub fn capabilities(&self) -> crate::Result<Vec<CapabilityDescriptor>> {
        if self.capability.is_empty() {
            defaults::default_capabilities()
        } else {
            Ok(self.capability.clone())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Execution engine defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Iteration bound used by loop definitions that omit `max_iterations`.
    pub default_max_iterations: u32,
    /// Parallel failure policy used by definitions that omit one.
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: 3,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// One row of the intent table: any keyword selects the capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRule {
    pub capability: String,
    pub keywords: Vec<String>,
}

impl IntentRule {
    pub fn new(capability: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            capability: capability.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Dynamic dispatcher settings.
///
/// Rule order is significant: classification lists capabilities in the order
/// their rules appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Suffix appended to the names of units built for ad hoc pipelines.
    pub name_suffix: String,
    /// Capabilities used when no rule matches.
    pub fallback: Vec<String>,
    /// Words that switch the pattern from sequential to parallel.
    pub parallel_triggers: Vec<String>,
    pub rules: Vec<IntentRule>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name_suffix: "_dynamic".to_string(),
            fallback: vec!["strategic".to_string(), "data".to_string()],
            parallel_triggers: ["compare", "simultaneously", "all perspectives", "consensus"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rules: vec![
                IntentRule::new(
                    "financial",
                    &["financial", "revenue", "cost", "budget", "profit", "money", "pricing"],
                ),
                IntentRule::new(
                    "strategic",
                    &["strategy", "plan", "goal", "objective", "okr", "initiative"],
                ),
                IntentRule::new(
                    "data",
                    &["data", "analysis", "metrics", "kpi", "dashboard", "analytics"],
                ),
                IntentRule::new(
                    "content",
                    &["content", "blog", "article", "write", "copy", "newsletter"],
                ),
                IntentRule::new(
                    "marketing",
                    &["marketing", "campaign", "email", "social", "brand", "advertising"],
                ),
                IntentRule::new(
                    "sales",
                    &["sales", "lead", "deal", "crm", "outreach", "pipeline"],
                ),
                IntentRule::new(
                    "hr",
                    &["hr", "hiring", "recruit", "employee", "onboard", "training", "performance"],
                ),
                IntentRule::new(
                    "operations",
                    &["operations", "process", "efficiency", "rollout", "workflow"],
                ),
                IntentRule::new(
                    "compliance",
                    &["compliance", "legal", "risk", "policy", "audit", "gdpr"],
                ),
                IntentRule::new(
                    "support",
                    &["support", "customer", "ticket", "help desk", "service"],
                ),
            ],
        }
    }
}
