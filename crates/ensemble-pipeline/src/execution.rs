//! Handles to running and finished pipeline executions.

use std::pin::Pin;

use ensemble_types::{EventPayload, ExecutionEvent, SessionState};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Events of a run; a trailing `Err` reports why the run failed.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ExecutionEvent, PipelineError>> + Send>>;

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub pipeline: String,
    /// Every event the run produced, in sequence order. On failure these are
    /// the events produced before the failure.
    pub events: Vec<ExecutionEvent>,
    /// The input state with the run's updates merged. On failure, the input
    /// state unchanged.
    pub state: SessionState,
    pub error: Option<PipelineError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Text of the last unit output.
    pub fn output(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match &e.payload {
            EventPayload::Output { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Number of loop iterations completed across all loops in the run.
    pub fn iterations(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::IterationCompleted { .. }))
            .count()
    }

    pub fn into_result(self) -> Result<Self, PipelineError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// A running pipeline.
///
/// Events can be consumed one at a time with [`Execution::next_event`] or as
/// a stream with [`Execution::into_stream`]; [`Execution::finish`] waits for
/// the run and returns its full outcome either way.
pub struct Execution {
    pipeline: String,
    events: mpsc::UnboundedReceiver<ExecutionEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<RunOutcome>,
}

impl Execution {
    pub(crate) fn new(
        pipeline: String,
        events: mpsc::UnboundedReceiver<ExecutionEvent>,
        cancel: CancellationToken,
        handle: JoinHandle<RunOutcome>,
    ) -> Self {
        Self {
            pipeline,
            events,
            cancel,
            handle,
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    /// The next event, or `None` once the run has ended and every event has
    /// been delivered.
    pub async fn next_event(&mut self) -> Option<ExecutionEvent> {
        self.events.recv().await
    }

    /// Request cancellation. Units already invoked run to completion; their
    /// results are discarded and nothing new is started.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to end.
    pub async fn finish(self) -> RunOutcome {
        let pipeline = self.pipeline;
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => RunOutcome {
                pipeline,
                events: Vec::new(),
                state: SessionState::default(),
                error: Some(PipelineError::Internal(format!("run task failed: {err}"))),
            },
        }
    }

    /// Convert into a stream of events followed by the run's error, if any.
    pub fn into_stream(self) -> EventStream {
        let Execution {
            mut events, handle, ..
        } = self;
        Box::pin(async_stream::stream! {
            while let Some(event) = events.recv().await {
                yield Ok(event);
            }
            match handle.await {
                Ok(outcome) => {
                    if let Some(err) = outcome.error {
                        yield Err(err);
                    }
                }
                Err(err) => yield Err(PipelineError::Internal(format!("run task failed: {err}"))),
            }
        })
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("pipeline", &self.pipeline)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
