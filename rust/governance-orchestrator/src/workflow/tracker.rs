//! Single writer of an execution.
//!
//! Every mutation is followed by a snapshot write to the repository so
//! readers always see a consistent copy, and by an event on the bus.

use std::sync::Arc;

use chrono::Utc;
use governance_services::ClassificationItem;
use tokio_util::sync::CancellationToken;

use super::events::{EventBus, ExecutionEvent};
use super::execution::{
    ExecutionError, ExecutionMetrics, ExecutionStatus, Severity, VersionResults,
    WorkflowExecution,
};
use super::output::FormattedOutput;
use super::registry::ExecutionRepository;

/// Highest progress an unfinished execution may report.
const MAX_RUNNING_PROGRESS: f64 = 99.0;

/// Owns an execution while it runs.
pub struct ExecutionTracker {
    execution: WorkflowExecution,
    repository: Arc<dyn ExecutionRepository>,
    events: EventBus,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ExecutionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTracker")
            .field("execution_id", &self.execution.id)
            .field("status", &self.execution.status)
            .field("progress", &self.execution.progress)
            .finish_non_exhaustive()
    }
}

impl ExecutionTracker {
    /// Wrap an execution already stored in `repository`.
    #[must_use]
    pub fn new(
        execution: WorkflowExecution,
        repository: Arc<dyn ExecutionRepository>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            execution,
            repository,
            events,
            cancel,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.execution.id
    }

    #[must_use]
    pub fn execution(&self) -> &WorkflowExecution {
        &self.execution
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `running`.
    pub fn start(&mut self) {
        self.execution.status = ExecutionStatus::Running;
        self.execution.current_step = "starting".to_string();
        self.persist();
        self.events.publish(ExecutionEvent::ExecutionStarted {
            execution_id: self.execution.id.clone(),
            kind: self.execution.kind,
            parent_id: self.execution.parent_id.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn set_step(&mut self, step: impl Into<String>) {
        self.execution.current_step = step.into();
        self.persist();
        self.events.publish(ExecutionEvent::StepStarted {
            execution_id: self.execution.id.clone(),
            step: self.execution.current_step.clone(),
        });
    }

    /// Raise progress to `checkpoint`. Progress never decreases, and 100 is
    /// reserved for [`Self::complete`].
    pub fn advance(&mut self, checkpoint: f64) {
        let target = checkpoint.clamp(0.0, MAX_RUNNING_PROGRESS);
        if target <= self.execution.progress {
            return;
        }
        self.execution.progress = target;
        self.update_estimate();
        self.persist();
        self.events.publish(ExecutionEvent::Progress {
            execution_id: self.execution.id.clone(),
            step: self.execution.current_step.clone(),
            progress: target,
        });
    }

    /// Append an error. Errors are never removed.
    pub fn record_error(&mut self, error: ExecutionError) {
        match error.severity {
            Severity::Critical | Severity::High => tracing::error!(
                execution_id = %self.execution.id,
                code = %error.code,
                severity = %error.severity,
                "{}",
                error.message
            ),
            Severity::Medium => tracing::warn!(
                execution_id = %self.execution.id,
                code = %error.code,
                "{}",
                error.message
            ),
            Severity::Low => tracing::info!(
                execution_id = %self.execution.id,
                code = %error.code,
                "{}",
                error.message
            ),
        }
        self.events.publish(ExecutionEvent::ErrorRecorded {
            execution_id: self.execution.id.clone(),
            code: error.code.clone(),
            severity: error.severity,
            message: error.message.clone(),
        });
        self.execution.errors.push(error);
        self.persist();
    }

    pub fn set_results(&mut self, results: Vec<ClassificationItem>) {
        self.execution.results = results;
        self.persist();
    }

    pub fn set_version_results(&mut self, results: VersionResults) {
        self.execution.version_results = Some(results);
        self.persist();
    }

    pub fn set_output(&mut self, output: FormattedOutput) {
        self.execution.output = Some(output);
        self.persist();
    }

    /// Mutate the metrics and persist.
    pub fn update_metrics(&mut self, f: impl FnOnce(&mut ExecutionMetrics)) {
        f(&mut self.execution.metrics);
        self.persist();
    }

    /// Finish successfully with progress 100.
    pub fn complete(&mut self) {
        if self.execution.is_terminal() {
            return;
        }
        self.execution.status = ExecutionStatus::Completed;
        self.execution.progress = 100.0;
        self.execution.current_step = "completed".to_string();
        self.finish();
    }

    /// Finish with a failure. `error` is recorded as critical.
    pub fn fail(&mut self, mut error: ExecutionError) {
        if self.execution.is_terminal() {
            return;
        }
        error.severity = Severity::Critical;
        self.record_error(error);
        self.execution.status = ExecutionStatus::Failed;
        self.finish();
    }

    /// Consume the tracker, returning the final snapshot.
    #[must_use]
    pub fn into_execution(self) -> WorkflowExecution {
        self.execution
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.execution.end_time = Some(now);
        self.execution.estimated_completion = None;
        self.persist();
        self.events.publish(ExecutionEvent::ExecutionFinished {
            execution_id: self.execution.id.clone(),
            status: self.execution.status,
            timestamp: now,
        });
    }

    /// Linear extrapolation of the elapsed time.
    fn update_estimate(&mut self) {
        let progress = self.execution.progress;
        if progress <= 0.0 {
            return;
        }
        let elapsed = Utc::now().signed_duration_since(self.execution.start_time);
        let remaining_ms =
            (elapsed.num_milliseconds() as f64 * (100.0 - progress) / progress) as i64;
        self.execution.estimated_completion =
            Some(Utc::now() + chrono::Duration::milliseconds(remaining_ms));
    }

    fn persist(&self) {
        if let Err(e) = self.repository.update(self.execution.clone()) {
            // Pruned from under us; the run itself carries on.
            tracing::warn!(
                execution_id = %self.execution.id,
                error = %e,
                "Failed to persist execution snapshot"
            );
        }
    }
}
