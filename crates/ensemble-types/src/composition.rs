//! Composition kinds and declarative pipeline definitions.
//!
//! A [`PipelineDefinition`] is the serializable description of a catalog
//! pipeline. It is compiled into a runnable pipeline by `ensemble-pipeline`;
//! nothing in this module touches unit instances.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a pipeline schedules its members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionKind {
    /// Members run one after another, each seeing the state left by the last.
    #[default]
    Sequential,
    /// Members run concurrently against a snapshot and merge at a barrier.
    Parallel,
    /// A sequential or parallel body repeated up to a bound.
    Loop,
}

impl CompositionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Loop => "loop",
        }
    }
}

impl fmt::Display for CompositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a parallel fan-out does when one branch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Cancel the remaining branches and fail the pipeline.
    #[default]
    Abort,
    /// Record the failure as an event, drop that branch's state and keep going.
    Continue,
}

/// Declarative loop exit condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCondition {
    /// Exit after the first iteration in which a unit escalated.
    #[default]
    Escalation,
    /// Never exit early; run exactly `max_iterations` times.
    Never,
    /// Exit once the named state key holds a truthy value.
    StateKey(String),
}

/// A member of a stage: a capability id or a nested stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberDefinition {
    Capability(String),
    Stage(StageDefinition),
}

/// One composition node of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: CompositionKind,
    /// Body composition of a loop. Only valid when `kind` is `loop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<CompositionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub exit_when: ExitCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
    pub members: Vec<MemberDefinition>,
}

/// A named catalog pipeline.
///
/// ```toml
/// [[pipeline]]
/// name = "Report Creation"
/// pipeline_name = "ReportCreationPipeline"
/// description = "Gather data in parallel, then write the report"
/// members = [
///     { name = "ReportDataGathering", kind = "parallel", members = ["data", "financial"] },
///     "content",
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Catalog name, unique within a registry.
    pub name: String,
    /// Name given to built pipeline instances. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: CompositionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<CompositionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub exit_when: ExitCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
    pub members: Vec<MemberDefinition>,
}

impl PipelineDefinition {
    /// The root stage of this definition.
    pub fn root_stage(&self) -> StageDefinition {
        StageDefinition {
            name: self
                .pipeline_name
                .clone()
                .unwrap_or_else(|| self.name.clone()),
            kind: self.kind,
            body: self.body,
            max_iterations: self.max_iterations,
            exit_when: self.exit_when.clone(),
            failure_policy: self.failure_policy,
            members: self.members.clone(),
        }
    }

    /// Capability ids referenced anywhere in the definition, first
    /// appearance first.
    pub fn capability_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        collect_ids(&self.members, &mut ids);
        ids
    }
}

fn collect_ids(members: &[MemberDefinition], ids: &mut Vec<String>) {
    for member in members {
        match member {
            MemberDefinition::Capability(id) => {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
            MemberDefinition::Stage(stage) => collect_ids(&stage.members, ids),
        }
    }
}
