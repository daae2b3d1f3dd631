//! Staged pipeline execution.
//!
//! A pipeline is an ordered list of named [`Stage`]s sharing a typed state.
//! [`StageExecutor`] runs them in order, checks the cancellation token before
//! each one, bumps progress to the stage checkpoint on success and fails the
//! execution with a critical error on the first failure.

use std::time::Instant;

use async_trait::async_trait;

use super::execution::{ExecutionError, Severity};
use super::tracker::ExecutionTracker;
use crate::error::OrchestratorError;

/// One step of a pipeline.
#[async_trait]
pub trait Stage<S: Send>: Send + Sync {
    /// Name recorded as `current_step` and in error context.
    fn name(&self) -> &'static str;

    /// Progress reached when the stage succeeds.
    fn checkpoint(&self) -> f64;

    async fn run(
        &self,
        state: &mut S,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError>;
}

/// Runs stages in order against one execution.
pub struct StageExecutor<S> {
    pipeline: &'static str,
    stages: Vec<Box<dyn Stage<S>>>,
    recoverable_failures: bool,
}

impl<S: Send> std::fmt::Debug for StageExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("pipeline", &self.pipeline)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("recoverable_failures", &self.recoverable_failures)
            .finish()
    }
}

impl<S: Send> StageExecutor<S> {
    #[must_use]
    pub fn new(pipeline: &'static str) -> Self {
        Self {
            pipeline,
            stages: Vec::new(),
            recoverable_failures: false,
        }
    }

    /// Append a stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage<S> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Mark stage failures of this pipeline as recoverable.
    #[must_use]
    pub fn recoverable_failures(mut self, recoverable: bool) -> Self {
        self.recoverable_failures = recoverable;
        self
    }

    /// Run every stage, then complete the execution.
    pub async fn run(
        &self,
        state: &mut S,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let execution_id = tracker.id().to_string();

        for stage in &self.stages {
            let name = stage.name();
            if tracker.is_cancelled() {
                return Err(Self::cancel(tracker, name));
            }

            tracker.set_step(name);
            let token = tracker.cancel_token().clone();
            let started = Instant::now();

            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Err(OrchestratorError::Cancelled(execution_id.clone())),
                result = stage.run(state, tracker) => result,
            };
            let duration_ms = started.elapsed().as_millis();

            match outcome {
                Ok(()) => {
                    tracker.advance(stage.checkpoint());
                    tracing::info!(
                        execution_id = %execution_id,
                        pipeline = self.pipeline,
                        stage = name,
                        duration_ms = duration_ms,
                        "Stage completed"
                    );
                }
                Err(OrchestratorError::Cancelled(_)) => {
                    return Err(Self::cancel(tracker, name));
                }
                Err(e) => {
                    tracing::error!(
                        execution_id = %execution_id,
                        pipeline = self.pipeline,
                        stage = name,
                        duration_ms = duration_ms,
                        error = %e,
                        "Stage failed"
                    );
                    tracker.fail(
                        ExecutionError::new(
                            "STAGE_FAILED",
                            format!("Stage '{name}' failed: {e}"),
                            Severity::Critical,
                        )
                        .recoverable(self.recoverable_failures)
                        .with_context("stage", name)
                        .with_context("pipeline", self.pipeline),
                    );
                    return Err(match e {
                        OrchestratorError::Validation(_) | OrchestratorError::Stage { .. } => e,
                        other => OrchestratorError::stage(name, other.to_string()),
                    });
                }
            }
        }

        tracker.complete();
        Ok(())
    }

    fn cancel(tracker: &mut ExecutionTracker, stage: &str) -> OrchestratorError {
        tracing::warn!(execution_id = %tracker.id(), stage = stage, "Execution cancelled");
        tracker.fail(
            ExecutionError::new(
                "EXECUTION_CANCELLED",
                format!("Execution cancelled at stage '{stage}'"),
                Severity::Critical,
            )
            .recoverable(false)
            .with_context("stage", stage),
        );
        OrchestratorError::Cancelled(tracker.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::workflow::events::EventBus;
    use crate::workflow::execution::{ExecutionStatus, WorkflowExecution, WorkflowKind};
    use crate::workflow::registry::{ExecutionRepository, InMemoryExecutionRepository};

    struct Push {
        name: &'static str,
        checkpoint: f64,
        fail: bool,
    }

    #[async_trait]
    impl Stage<Vec<&'static str>> for Push {
        fn name(&self) -> &'static str {
            self.name
        }

        fn checkpoint(&self) -> f64 {
            self.checkpoint
        }

        async fn run(
            &self,
            state: &mut Vec<&'static str>,
            _tracker: &mut ExecutionTracker,
        ) -> Result<(), OrchestratorError> {
            if self.fail {
                return Err(OrchestratorError::Internal("exploded".to_string()));
            }
            state.push(self.name);
            Ok(())
        }
    }

    fn push(name: &'static str, checkpoint: f64, fail: bool) -> Push {
        Push {
            name,
            checkpoint,
            fail,
        }
    }

    fn tracker(token: CancellationToken) -> ExecutionTracker {
        let repository: Arc<dyn ExecutionRepository> =
            Arc::new(InMemoryExecutionRepository::default());
        let execution = WorkflowExecution::new(WorkflowKind::Classification);
        repository.insert(execution.clone()).unwrap();
        let mut tracker = ExecutionTracker::new(execution, repository, EventBus::new(), token);
        tracker.start();
        tracker
    }

    #[tokio::test]
    async fn test_runs_stages_in_order_and_completes() {
        let executor = StageExecutor::new("test")
            .stage(push("a", 10.0, false))
            .stage(push("b", 60.0, false))
            .stage(push("c", 100.0, false));
        let mut state = Vec::new();
        let mut tracker = tracker(CancellationToken::new());

        executor.run(&mut state, &mut tracker).await.unwrap();

        assert_eq!(state, vec!["a", "b", "c"]);
        assert_eq!(tracker.execution().status, ExecutionStatus::Completed);
        assert!((tracker.execution().progress - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failure_stops_pipeline_with_critical_error() {
        let executor = StageExecutor::new("test")
            .stage(push("a", 10.0, false))
            .stage(push("b", 60.0, true))
            .stage(push("c", 100.0, false))
            .recoverable_failures(true);
        let mut state = Vec::new();
        let mut tracker = tracker(CancellationToken::new());

        let err = executor.run(&mut state, &mut tracker).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Stage { ref stage, .. } if stage == "b"));
        assert_eq!(state, vec!["a"]);
        let execution = tracker.execution();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!((execution.progress - 10.0).abs() < f64::EPSILON);
        let error = execution.errors.last().unwrap();
        assert_eq!(error.severity, Severity::Critical);
        assert!(error.recoverable);
        assert_eq!(error.context["stage"], "b");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_stage() {
        let token = CancellationToken::new();
        token.cancel();
        let executor = StageExecutor::new("test").stage(push("a", 50.0, false));
        let mut state = Vec::new();
        let mut tracker = tracker(token);

        let err = executor.run(&mut state, &mut tracker).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Cancelled(_)));
        assert!(state.is_empty());
        let error = tracker.execution().errors.last().unwrap();
        assert_eq!(error.code, "EXECUTION_CANCELLED");
        assert!(!error.recoverable);
        assert_eq!(tracker.execution().status, ExecutionStatus::Failed);
    }
}
