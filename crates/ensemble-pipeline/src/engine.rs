//! Execution engine.
//!
//! Runs a built [`Pipeline`] according to its composition and streams the
//! resulting [`ExecutionEvent`]s to the caller.
//!
//! # Execution model
//!
//! ```text
//! ┌──────────────┐  run()   ┌───────────────────────────────────────────┐
//! │   caller     │ ───────▶ │ spawned task                              │
//! │              │          │  sequential: member → merge → member ...  │
//! │  Execution   │ ◀─────── │  parallel:   snapshot → branches → barrier│
//! │  (events rx) │  events  │  loop:       body × n, exit predicate     │
//! └──────────────┘          └───────────────────────────────────────────┘
//! ```
//!
//! All composition runs inside one task and is cooperatively scheduled.
//! Parallel branches read a snapshot of the state and return deltas; only
//! the pipeline merges them, at the fan-in barrier, in member order. Events
//! from concurrent branches are numbered in order of arrival.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use ensemble_types::{
    CompositionKind, EventPayload, ExecutionEvent, FailurePolicy, SessionState, StateDelta,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result, panic_message};
use crate::execution::{Execution, RunOutcome};
use crate::invoker::{SharedUnitInvoker, UnitInput};
use crate::pipeline::{Composition, ExitPredicate, IterationView, Member, Pipeline};
use crate::unit::CapabilityUnit;

/// Runs pipelines against a unit invoker.
#[derive(Clone)]
pub struct ExecutionEngine {
    invoker: SharedUnitInvoker,
}

impl ExecutionEngine {
    pub fn new(invoker: SharedUnitInvoker) -> Self {
        Self { invoker }
    }

    /// Start running `pipeline` and return a handle to its event stream.
    ///
    /// The pipeline is consumed: its units live exactly as long as the run.
    /// Must be called from within a Tokio runtime.
    pub fn run(
        &self,
        pipeline: Pipeline,
        request: impl Into<String>,
        state: SessionState,
    ) -> Execution {
        let request = request.into();
        let name = pipeline.name().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let runner = Runner {
            invoker: Arc::clone(&self.invoker),
            request,
            sink: EventSink::new(tx),
        };

        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            info!(pipeline = %pipeline.name(), kind = %pipeline.kind(), "Starting pipeline run");
            let result = AssertUnwindSafe(runner.run_pipeline(&pipeline, &state, &token, None))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(PipelineError::Internal(panic_message(payload.as_ref())))
                });
            let events = runner.sink.history();
            drop(runner);

            let mut state = state;
            let error = match result {
                Ok(delta) => {
                    state.merge(&delta);
                    info!(
                        pipeline = %pipeline.name(),
                        events = events.len(),
                        "Pipeline run completed"
                    );
                    None
                }
                Err(err) => {
                    warn!(pipeline = %pipeline.name(), error = %err, "Pipeline run failed");
                    Some(err)
                }
            };
            RunOutcome {
                pipeline: pipeline.name().to_string(),
                events,
                state,
                error,
            }
        });

        Execution::new(name, rx, cancel, handle)
    }

    /// An execution that emits a single informational event and completes.
    pub fn notice(
        &self,
        producer: impl Into<String>,
        text: impl Into<String>,
        state: SessionState,
    ) -> Execution {
        let producer = producer.into();
        let text = text.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        let name = producer.clone();

        let handle = tokio::spawn(async move {
            sink.emit(&producer, &producer, EventPayload::Notice { text });
            RunOutcome {
                pipeline: producer,
                events: sink.history(),
                state,
                error: None,
            }
        });

        Execution::new(name, rx, CancellationToken::new(), handle)
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event sink
// ─────────────────────────────────────────────────────────────────────────────

struct SinkInner {
    next_seq: u64,
    history: Vec<ExecutionEvent>,
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

/// Numbers, records and forwards events.
///
/// Sequence assignment and the send happen under one lock, so the receiver
/// sees events in sequence order.
struct EventSink {
    inner: Mutex<SinkInner>,
}

impl EventSink {
    fn new(tx: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                next_seq: 0,
                history: Vec::new(),
                tx,
            }),
        }
    }

    fn emit(&self, producer: &str, pipeline: &str, payload: EventPayload) {
        let mut inner = self.inner.lock();
        let event = ExecutionEvent {
            seq: inner.next_seq,
            producer: producer.to_string(),
            pipeline: pipeline.to_string(),
            payload,
            timestamp: Utc::now(),
        };
        inner.next_seq += 1;
        inner.history.push(event.clone());
        // The receiver may be gone; the history still records the event.
        let _ = inner.tx.send(event);
    }

    fn len(&self) -> usize {
        self.inner.lock().history.len()
    }

    fn since(&self, start: usize) -> Vec<ExecutionEvent> {
        self.inner.lock().history[start..].to_vec()
    }

    fn history(&self) -> Vec<ExecutionEvent> {
        self.inner.lock().history.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runner
// ─────────────────────────────────────────────────────────────────────────────

struct Runner {
    invoker: SharedUnitInvoker,
    request: String,
    sink: EventSink,
}

/// Where in the graph a member runs.
#[derive(Clone, Copy)]
struct Scope<'a> {
    pipeline: &'a str,
    iteration: Option<u32>,
    cancel: &'a CancellationToken,
}

impl Runner {
    /// Run a pipeline against `state` and return the updates it made.
    fn run_pipeline<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        state: &'a SessionState,
        cancel: &'a CancellationToken,
        iteration: Option<u32>,
    ) -> BoxFuture<'a, Result<StateDelta>> {
        Box::pin(async move {
            let scope = Scope {
                pipeline: pipeline.name(),
                iteration,
                cancel,
            };
            match pipeline.composition() {
                Composition::Sequential => {
                    self.run_sequential(pipeline.members(), state, scope).await
                }
                Composition::Parallel => {
                    let policy = pipeline.failure_policy();
                    self.run_parallel(pipeline.members(), state, scope, policy)
                        .await
                }
                Composition::Loop {
                    body,
                    max_iterations,
                    exit,
                } => {
                    self.run_loop(pipeline, *body, max_iterations.get(), exit, state, cancel)
                        .await
                }
            }
        })
    }

    async fn run_sequential(
        &self,
        members: &[Member],
        state: &SessionState,
        scope: Scope<'_>,
    ) -> Result<StateDelta> {
        let mut working = state.clone();
        let mut accumulated = StateDelta::new();
        for member in members {
            if scope.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let delta = self.run_member(member, &working, scope).await?;
            working.merge(&delta);
            accumulated.extend(delta);
        }
        Ok(accumulated)
    }

    async fn run_parallel(
        &self,
        members: &[Member],
        state: &SessionState,
        scope: Scope<'_>,
        policy: FailurePolicy,
    ) -> Result<StateDelta> {
        if scope.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Branches observe both the run's token and sibling aborts.
        let branches = scope.cancel.child_token();
        let branch_scope = Scope {
            cancel: &branches,
            ..scope
        };

        let mut pending: FuturesUnordered<_> = members
            .iter()
            .enumerate()
            .map(|(index, member)| async move {
                (index, self.run_member(member, state, branch_scope).await)
            })
            .collect();

        let mut deltas: Vec<Option<StateDelta>> = vec![None; members.len()];
        let mut failure: Option<PipelineError> = None;

        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(delta) => deltas[index] = Some(delta),
                Err(err) if failure.is_some() => {
                    debug!(
                        pipeline = scope.pipeline,
                        member = members[index].name(),
                        error = %err,
                        "Branch ended after abort"
                    );
                }
                Err(PipelineError::Cancelled) => {
                    failure = Some(PipelineError::Cancelled);
                    branches.cancel();
                }
                Err(err) => match policy {
                    FailurePolicy::Abort => {
                        warn!(
                            pipeline = scope.pipeline,
                            member = members[index].name(),
                            error = %err,
                            "Branch failed, aborting fan-out"
                        );
                        failure = Some(err);
                        branches.cancel();
                    }
                    FailurePolicy::Continue => {
                        warn!(
                            pipeline = scope.pipeline,
                            member = members[index].name(),
                            error = %err,
                            "Branch failed, continuing"
                        );
                        self.sink.emit(
                            members[index].name(),
                            scope.pipeline,
                            EventPayload::BranchFailed {
                                member: members[index].name().to_string(),
                                message: err.to_string(),
                            },
                        );
                    }
                },
            }
        }
        drop(pending);

        if let Some(err) = failure {
            return Err(err);
        }
        if scope.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Fan-in barrier: merge in member order, later members win.
        let mut merged = StateDelta::new();
        for delta in deltas.into_iter().flatten() {
            merged.extend(delta);
        }
        Ok(merged)
    }

    async fn run_loop(
        &self,
        pipeline: &Pipeline,
        body: CompositionKind,
        max_iterations: u32,
        exit: &ExitPredicate,
        state: &SessionState,
        cancel: &CancellationToken,
    ) -> Result<StateDelta> {
        let mut working = state.clone();
        let mut accumulated = StateDelta::new();

        for iteration in 1..=max_iterations {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let scope = Scope {
                pipeline: pipeline.name(),
                iteration: Some(iteration),
                cancel,
            };
            let start = self.sink.len();

            let delta = match body {
                CompositionKind::Parallel => {
                    let policy = pipeline.failure_policy();
                    self.run_parallel(pipeline.members(), &working, scope, policy)
                        .await?
                }
                _ => self.run_sequential(pipeline.members(), &working, scope).await?,
            };
            working.merge(&delta);
            accumulated.extend(delta);

            let events = self.sink.since(start);
            let done = exit.evaluate(&IterationView {
                iteration,
                events: &events,
                state: &working,
            });
            self.sink.emit(
                pipeline.name(),
                pipeline.name(),
                EventPayload::IterationCompleted {
                    iteration,
                    exit: done,
                },
            );
            debug!(pipeline = %pipeline.name(), iteration, exit = done, "Loop iteration completed");
            if done {
                break;
            }
        }

        Ok(accumulated)
    }

    fn run_member<'a>(
        &'a self,
        member: &'a Member,
        state: &'a SessionState,
        scope: Scope<'a>,
    ) -> BoxFuture<'a, Result<StateDelta>> {
        Box::pin(async move {
            match member {
                Member::Unit(unit) => self.run_unit(unit, state, scope).await,
                Member::Pipeline(nested) => {
                    self.run_pipeline(nested, state, scope.cancel, scope.iteration)
                        .await
                }
            }
        })
    }

    async fn run_unit(
        &self,
        unit: &CapabilityUnit,
        state: &SessionState,
        scope: Scope<'_>,
    ) -> Result<StateDelta> {
        if scope.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        debug!(pipeline = scope.pipeline, unit = unit.name(), "Invoking unit");

        // A panicking invoker fails this member only.
        let (mut delta, last_text) = match AssertUnwindSafe(self.drain_unit(unit, state, scope))
            .catch_unwind()
            .await
        {
            Ok(drained) => drained?,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(pipeline = scope.pipeline, unit = unit.name(), %message, "Unit panicked");
                return Err(branch_failed(scope, unit, message));
            }
        };

        if scope.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(text) = last_text {
            delta.insert(unit.descriptor().output_key(), Value::String(text));
        }
        Ok(delta)
    }

    /// Invoke `unit` and forward its events; returns its updates and last text.
    async fn drain_unit(
        &self,
        unit: &CapabilityUnit,
        state: &SessionState,
        scope: Scope<'_>,
    ) -> Result<(StateDelta, Option<String>)> {
        let input = UnitInput {
            request: self.request.clone(),
            state: state.clone(),
            iteration: scope.iteration,
        };
        let mut stream = self
            .invoker
            .invoke(unit, input)
            .await
            .map_err(|e| branch_failed(scope, unit, e.to_string()))?;

        // Once invoked, a unit runs to completion. Output arriving after
        // cancellation is dropped along with its state updates.
        let mut delta = StateDelta::new();
        let mut last_text: Option<String> = None;
        while let Some(item) = stream.next().await {
            let event = item.map_err(|e| branch_failed(scope, unit, e.to_string()))?;
            if scope.cancel.is_cancelled() {
                continue;
            }
            delta.extend(event.state_delta.clone());
            if !event.text.is_empty() {
                last_text = Some(event.text.clone());
            }
            self.sink.emit(
                unit.name(),
                scope.pipeline,
                EventPayload::Output {
                    text: event.text,
                    state_delta: event.state_delta,
                    escalate: event.escalate,
                },
            );
        }
        Ok((delta, last_text))
    }
}

fn branch_failed(scope: Scope<'_>, unit: &CapabilityUnit, message: String) -> PipelineError {
    PipelineError::BranchFailed {
        pipeline: scope.pipeline.to_string(),
        member: unit.name().to_string(),
        message,
    }
}
