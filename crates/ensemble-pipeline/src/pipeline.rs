//! Pipelines: composed execution graphs of capability units.
//!
//! A [`Pipeline`] is built once by [`PipelineBuilder::build`], which takes
//! its member list by value and attaches every unit member in one atomic
//! step. Members are either units or nested pipelines, so a sequential
//! pipeline can contain a parallel fan-out stage and vice versa.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use ensemble_types::{
    CompositionKind, ExecutionEvent, ExitCondition, FailurePolicy, PipelineId, SessionState,
    UnitInstanceId,
};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::unit::{CapabilityUnit, assign_owner};

// ─────────────────────────────────────────────────────────────────────────────
// Exit predicate
// ─────────────────────────────────────────────────────────────────────────────

/// What a loop's exit predicate gets to look at after each iteration.
pub struct IterationView<'a> {
    /// 1-based iteration number.
    pub iteration: u32,
    /// Events produced during this iteration.
    pub events: &'a [ExecutionEvent],
    /// State after this iteration's updates were merged.
    pub state: &'a SessionState,
}

/// Loop exit predicate.
#[derive(Clone)]
pub struct ExitPredicate(Arc<dyn Fn(&IterationView<'_>) -> bool + Send + Sync>);

impl ExitPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&IterationView<'_>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Exit after any iteration in which a unit escalated.
    pub fn on_escalation() -> Self {
        Self::new(|view| view.events.iter().any(ExecutionEvent::is_escalation))
    }

    pub fn never() -> Self {
        Self::new(|_| false)
    }

    /// Exit once `key` holds a truthy value.
    pub fn state_key(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(move |view| view.state.is_truthy(&key))
    }

    pub fn evaluate(&self, view: &IterationView<'_>) -> bool {
        (self.0)(view)
    }
}

impl Default for ExitPredicate {
    fn default() -> Self {
        Self::on_escalation()
    }
}

impl From<&ExitCondition> for ExitPredicate {
    fn from(condition: &ExitCondition) -> Self {
        match condition {
            ExitCondition::Escalation => Self::on_escalation(),
            ExitCondition::Never => Self::never(),
            ExitCondition::StateKey(key) => Self::state_key(key.clone()),
        }
    }
}

impl fmt::Debug for ExitPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExitPredicate(..)")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// How a built pipeline runs its members.
#[derive(Debug, Clone)]
pub enum Composition {
    Sequential,
    Parallel,
    Loop {
        /// Either `Sequential` or `Parallel`.
        body: CompositionKind,
        max_iterations: NonZeroU32,
        exit: ExitPredicate,
    },
}

impl Composition {
    pub fn kind(&self) -> CompositionKind {
        match self {
            Self::Sequential => CompositionKind::Sequential,
            Self::Parallel => CompositionKind::Parallel,
            Self::Loop { .. } => CompositionKind::Loop,
        }
    }
}

/// A pipeline member.
#[derive(Debug)]
pub enum Member {
    Unit(Arc<CapabilityUnit>),
    Pipeline(Box<Pipeline>),
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Self::Unit(unit) => unit.name(),
            Self::Pipeline(p) => p.name(),
        }
    }
}

impl From<CapabilityUnit> for Member {
    fn from(unit: CapabilityUnit) -> Self {
        Self::Unit(Arc::new(unit))
    }
}

impl From<Arc<CapabilityUnit>> for Member {
    fn from(unit: Arc<CapabilityUnit>) -> Self {
        Self::Unit(unit)
    }
}

impl From<Pipeline> for Member {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipeline(Box::new(pipeline))
    }
}

/// A composed, immutable execution graph.
#[derive(Debug)]
pub struct Pipeline {
    id: PipelineId,
    name: String,
    description: String,
    composition: Composition,
    failure_policy: FailurePolicy,
    members: Vec<Member>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn kind(&self) -> CompositionKind {
        self.composition.kind()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// All units in the graph, depth first.
    pub fn units(&self) -> Vec<&Arc<CapabilityUnit>> {
        let mut out = Vec::new();
        self.collect_units(&mut out);
        out
    }

    fn collect_units<'a>(&'a self, out: &mut Vec<&'a Arc<CapabilityUnit>>) {
        for member in &self.members {
            match member {
                Member::Unit(unit) => out.push(unit),
                Member::Pipeline(p) => p.collect_units(out),
            }
        }
    }

    pub fn unit_instances(&self) -> Vec<UnitInstanceId> {
        self.units().iter().map(|u| u.instance()).collect()
    }

    /// Distinct capability ids in the graph, first appearance first.
    pub fn capability_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for unit in self.units() {
            if !ids.iter().any(|id| id == unit.capability()) {
                ids.push(unit.capability().to_string());
            }
        }
        ids
    }

    /// Pattern label used for reporting.
    ///
    /// `loop` when any stage loops; otherwise the distinct kinds of the
    /// graph joined with ` + `. A sequential stage whose only member is a
    /// nested pipeline does not count.
    pub fn pattern(&self) -> String {
        let mut kinds = Vec::new();
        self.collect_kinds(&mut kinds);
        if kinds.contains(&CompositionKind::Loop) {
            return CompositionKind::Loop.to_string();
        }
        kinds.sort_by_key(|k| k.as_str());
        kinds
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    }

    fn collect_kinds(&self, kinds: &mut Vec<CompositionKind>) {
        let wrapper = matches!(self.composition, Composition::Sequential)
            && matches!(self.members.as_slice(), [Member::Pipeline(_)]);
        if !wrapper && !kinds.contains(&self.kind()) {
            kinds.push(self.kind());
        }
        for member in &self.members {
            if let Member::Pipeline(p) = member {
                p.collect_kinds(kinds);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`Pipeline`].
///
/// ```ignore
/// let pipeline = Pipeline::builder("LeadNurturingPipeline")
///     .looping(10)
///     .member(catalog.create_unit("content", None)?)
///     .member(catalog.create_unit("sales", None)?)
///     .build()?;
/// ```
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    description: String,
    kind: CompositionKind,
    body: Option<CompositionKind>,
    max_iterations: Option<u32>,
    exit: ExitPredicate,
    failure_policy: FailurePolicy,
    members: Vec<Member>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: CompositionKind::Sequential,
            body: None,
            max_iterations: None,
            exit: ExitPredicate::default(),
            failure_policy: FailurePolicy::default(),
            members: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(mut self, kind: CompositionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn sequential(self) -> Self {
        self.kind(CompositionKind::Sequential)
    }

    pub fn parallel(self) -> Self {
        self.kind(CompositionKind::Parallel)
    }

    /// Loop with a sequential body, at most `max_iterations` times.
    pub fn looping(mut self, max_iterations: u32) -> Self {
        self.kind = CompositionKind::Loop;
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Body composition of a loop.
    pub fn body(mut self, body: CompositionKind) -> Self {
        self.body = Some(body);
        self
    }

    pub fn exit_when(mut self, exit: ExitPredicate) -> Self {
        self.exit = exit;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn member(mut self, member: impl Into<Member>) -> Self {
        self.members.push(member.into());
        self
    }

    pub fn members<I, M>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Member>,
    {
        self.members.extend(members.into_iter().map(Into::into));
        self
    }

    /// Validate, attach every unit member and return the pipeline.
    ///
    /// Fails with [`PipelineError::OwnershipConflict`] if any unit member is
    /// already owned; in that case no member is attached.
    pub fn build(self) -> Result<Pipeline> {
        if self.members.is_empty() {
            return Err(PipelineError::invalid(format!(
                "pipeline '{}' has no members",
                self.name
            )));
        }

        let composition = match self.kind {
            CompositionKind::Loop => {
                let body = self.body.unwrap_or(CompositionKind::Sequential);
                if body == CompositionKind::Loop {
                    return Err(PipelineError::invalid(format!(
                        "loop '{}' must have a sequential or parallel body",
                        self.name
                    )));
                }
                let max_iterations = self
                    .max_iterations
                    .and_then(NonZeroU32::new)
                    .ok_or_else(|| {
                        PipelineError::invalid(format!(
                            "loop '{}' needs max_iterations of at least 1",
                            self.name
                        ))
                    })?;
                Composition::Loop {
                    body,
                    max_iterations,
                    exit: self.exit,
                }
            }
            other => {
                if self.body.is_some() {
                    return Err(PipelineError::invalid(format!(
                        "'{}' is {} but declares a loop body",
                        self.name, other
                    )));
                }
                if other == CompositionKind::Parallel {
                    Composition::Parallel
                } else {
                    Composition::Sequential
                }
            }
        };

        let id = PipelineId::new();
        let units: Vec<&Arc<CapabilityUnit>> = self
            .members
            .iter()
            .filter_map(|m| match m {
                Member::Unit(unit) => Some(unit),
                Member::Pipeline(_) => None,
            })
            .collect();
        assign_owner(&units, id)?;

        debug!(
            pipeline = %self.name,
            id = %id,
            kind = %composition.kind(),
            members = self.members.len(),
            "Built pipeline"
        );

        Ok(Pipeline {
            id,
            name: self.name,
            description: self.description,
            composition,
            failure_policy: self.failure_policy,
            members: self.members,
        })
    }
}
