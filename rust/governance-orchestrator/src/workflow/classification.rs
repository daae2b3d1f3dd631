//! Rule-based classification pipeline.
//!
//! ```text
//! validate (10) → initialize_frameworks (25) → load_rules (40)
//!   → preprocess_data (60) → classify (80) → quality_filter (90)
//!   → format_output (100)
//! ```
//!
//! Framework failures never fail the run: each failing framework records a
//! medium error and contributes its fallback's results or nothing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use governance_services::classification::{
    AuditEntry, ClassificationRequest, ClassificationRule, ClassificationService, DataFormat,
    Framework, MetricsRecord,
};
use governance_services::{ClassificationItem, ServiceResponse};
use serde_json::Value;

use super::configs::ClassificationWorkflowConfig;
use super::execution::{ExecutionError, Severity, WorkflowKind};
use super::output::{OutputFormatter, OutputMetadata};
use super::preprocessing::{self, PreparedData};
use super::stage::{Stage, StageExecutor};
use super::tracker::ExecutionTracker;
use super::validation::{estimate_resources, ValidationPipeline};
use crate::config::ExecutionConfig;
use crate::error::OrchestratorError;

/// Confidence threshold factor applied to fallback frameworks.
const FALLBACK_THRESHOLD_FACTOR: f64 = 0.8;

/// Shared by every classification stage.
struct ClassificationContext {
    service: Arc<dyn ClassificationService>,
    validation: Arc<ValidationPipeline>,
    formatter: OutputFormatter,
    execution: ExecutionConfig,
}

/// State threaded through the classification stages.
#[derive(Debug)]
pub struct ClassificationState {
    pub config: Arc<ClassificationWorkflowConfig>,
    pub caller: String,
    pub frameworks: Vec<Framework>,
    pub rules: Vec<ClassificationRule>,
    pub format: DataFormat,
    pub data: Option<PreparedData>,
    pub results: Vec<ClassificationItem>,
}

impl ClassificationState {
    #[must_use]
    pub fn new(config: Arc<ClassificationWorkflowConfig>, caller: impl Into<String>) -> Self {
        Self {
            config,
            caller: caller.into(),
            frameworks: Vec::new(),
            rules: Vec::new(),
            format: DataFormat::Json,
            data: None,
            results: Vec::new(),
        }
    }
}

/// Runs classification workflows.
pub struct ClassificationPipeline {
    executor: StageExecutor<ClassificationState>,
}

impl std::fmt::Debug for ClassificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationPipeline")
            .field("executor", &self.executor)
            .finish()
    }
}

impl ClassificationPipeline {
    #[must_use]
    pub fn new(
        service: Arc<dyn ClassificationService>,
        validation: Arc<ValidationPipeline>,
        formatter: OutputFormatter,
        execution: ExecutionConfig,
    ) -> Self {
        let ctx = Arc::new(ClassificationContext {
            service,
            validation,
            formatter,
            execution,
        });
        let executor = StageExecutor::new("classification")
            .stage(ValidateStage(Arc::clone(&ctx)))
            .stage(InitializeFrameworksStage(Arc::clone(&ctx)))
            .stage(LoadRulesStage(Arc::clone(&ctx)))
            .stage(PreprocessStage(Arc::clone(&ctx)))
            .stage(ClassifyStage(Arc::clone(&ctx)))
            .stage(QualityFilterStage)
            .stage(OutputStage(ctx));
        Self { executor }
    }

    /// Run every stage against `tracker`'s execution.
    pub async fn run(
        &self,
        config: Arc<ClassificationWorkflowConfig>,
        caller: &str,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let mut state = ClassificationState::new(config, caller);
        self.executor.run(&mut state, tracker).await
    }
}

struct ValidateStage(Arc<ClassificationContext>);

#[async_trait]
impl Stage<ClassificationState> for ValidateStage {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn checkpoint(&self) -> f64 {
        10.0
    }

    async fn run(
        &self,
        state: &mut ClassificationState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let outcome = self.0.validation.validate(&state.config, &state.caller).await;
        for warning in outcome.warnings() {
            tracker.record_error(warning.clone().into_execution_error());
        }
        outcome.into_result().map(|_| ())
    }
}

struct InitializeFrameworksStage(Arc<ClassificationContext>);

#[async_trait]
impl Stage<ClassificationState> for InitializeFrameworksStage {
    fn name(&self) -> &'static str {
        "initialize_frameworks"
    }

    fn checkpoint(&self) -> f64 {
        25.0
    }

    async fn run(
        &self,
        state: &mut ClassificationState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let ids = &state.config.frameworks;
        let responses = join_all(ids.iter().map(|id| self.0.service.get_framework(id))).await;

        for (id, response) in ids.iter().zip(responses) {
            match response {
                ServiceResponse::Success(framework) => state.frameworks.push(framework),
                ServiceResponse::Failure { error, .. } => tracker.record_error(
                    ExecutionError::new(
                        "FRAMEWORK_UNAVAILABLE",
                        format!("Framework '{id}' could not be initialized: {error}"),
                        Severity::Medium,
                    )
                    .with_context("framework", id.as_str()),
                ),
            }
        }

        if state.frameworks.is_empty() {
            return Err(OrchestratorError::Unavailable(
                "no classification framework could be initialized".to_string(),
            ));
        }
        Ok(())
    }
}

struct LoadRulesStage(Arc<ClassificationContext>);

#[async_trait]
impl Stage<ClassificationState> for LoadRulesStage {
    fn name(&self) -> &'static str {
        "load_rules"
    }

    fn checkpoint(&self) -> f64 {
        40.0
    }

    async fn run(
        &self,
        state: &mut ClassificationState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let ids = &state.config.rules;
        let responses = join_all(ids.iter().map(|id| self.0.service.get_rule(id))).await;

        for (id, response) in ids.iter().zip(responses) {
            match response {
                ServiceResponse::Success(rule) => state.rules.push(rule),
                ServiceResponse::Failure { error, .. } => tracker.record_error(
                    ExecutionError::new(
                        "RULE_UNAVAILABLE",
                        format!("Rule '{id}' could not be loaded: {error}"),
                        Severity::Medium,
                    )
                    .with_context("rule", id.as_str()),
                ),
            }
        }
        Ok(())
    }
}

struct PreprocessStage(Arc<ClassificationContext>);

#[async_trait]
impl Stage<ClassificationState> for PreprocessStage {
    fn name(&self) -> &'static str {
        "preprocess_data"
    }

    fn checkpoint(&self) -> f64 {
        60.0
    }

    async fn run(
        &self,
        state: &mut ClassificationState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let batch = self
            .0
            .service
            .load_data(&state.config.data_source)
            .await
            .into_result("load_data")?;

        let data = preprocessing::prepare(batch.records, batch.format, &self.0.execution);
        if data.sampled {
            tracker.record_error(
                ExecutionError::new(
                    "DATA_SAMPLED",
                    format!(
                        "Sampled {} of {} records for classification",
                        data.records.len(),
                        data.original_count
                    ),
                    Severity::Low,
                )
                .with_context("original_count", data.original_count)
                .with_context("sample_size", data.records.len()),
            );
        }
        state.format = batch.format;
        state.data = Some(data);
        Ok(())
    }
}

struct ClassifyStage(Arc<ClassificationContext>);

#[async_trait]
impl Stage<ClassificationState> for ClassifyStage {
    fn name(&self) -> &'static str {
        "classify"
    }

    fn checkpoint(&self) -> f64 {
        80.0
    }

    async fn run(
        &self,
        state: &mut ClassificationState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let records: &[Value] = state.data.as_ref().map_or(&[], |d| d.records.as_slice());
        let rules = order_rules(&state.rules);
        let job = FrameworkJob {
            ctx: &self.0,
            config: &state.config,
            execution_id: tracker.id().to_string(),
            records,
            rules: &rules,
        };

        let runs = if state.config.parallel_processing {
            join_all(state.frameworks.iter().map(|f| job.run(f))).await
        } else {
            let mut runs = Vec::with_capacity(state.frameworks.len());
            for framework in &state.frameworks {
                runs.push(job.run(framework).await);
            }
            runs
        };

        let mut results = Vec::new();
        for run in runs {
            results.extend(run.items);
            if let Some(error) = run.error {
                tracker.record_error(error);
            }
        }

        let estimate = estimate_resources(records.len() as u64, &state.frameworks, &self.0.execution);
        tracker.update_metrics(|m| {
            m.resource_usage.memory = estimate.memory_mb;
            m.resource_usage.cpu = estimate.cpu_cores;
        });
        state.results = results;
        Ok(())
    }
}

/// Result of one framework's classification.
struct FrameworkRun {
    items: Vec<ClassificationItem>,
    error: Option<ExecutionError>,
}

/// Inputs shared by every framework of one run.
struct FrameworkJob<'a> {
    ctx: &'a ClassificationContext,
    config: &'a ClassificationWorkflowConfig,
    execution_id: String,
    records: &'a [Value],
    rules: &'a [ClassificationRule],
}

impl FrameworkJob<'_> {
    async fn run(&self, framework: &Framework) -> FrameworkRun {
        let threshold = self.config.quality_threshold;
        let started = Instant::now();

        match self.classify(framework, threshold).await {
            Ok(items) => {
                tracing::info!(
                    execution_id = %self.execution_id,
                    framework = %framework.id,
                    items = items.len(),
                    duration_ms = started.elapsed().as_millis(),
                    "Framework classified records"
                );
                FrameworkRun { items, error: None }
            }
            Err(e) => {
                let mut error = ExecutionError::new(
                    "FRAMEWORK_FAILED",
                    format!("Framework '{}' failed: {e}", framework.id),
                    Severity::Medium,
                )
                .with_context("framework", framework.id.as_str());

                let Some(fallback_id) = &framework.fallback_framework else {
                    return FrameworkRun {
                        items: Vec::new(),
                        error: Some(error),
                    };
                };
                error = error.with_context("fallback", fallback_id.as_str());

                let fallback = match self.ctx.service.get_framework(fallback_id).await {
                    ServiceResponse::Success(fallback) => fallback,
                    ServiceResponse::Failure { error: cause, .. } => {
                        error.message =
                            format!("{}; fallback '{fallback_id}' unavailable: {cause}", error.message);
                        return FrameworkRun {
                            items: Vec::new(),
                            error: Some(error),
                        };
                    }
                };

                match self
                    .classify(&fallback, threshold * FALLBACK_THRESHOLD_FACTOR)
                    .await
                {
                    Ok(items) => {
                        tracing::info!(
                            execution_id = %self.execution_id,
                            framework = %framework.id,
                            fallback = %fallback.id,
                            items = items.len(),
                            "Fallback framework classified records"
                        );
                        error.message = format!("{}; used fallback '{fallback_id}'", error.message);
                        FrameworkRun {
                            items,
                            error: Some(error),
                        }
                    }
                    Err(cause) => {
                        error.message =
                            format!("{}; fallback '{fallback_id}' failed: {cause}", error.message);
                        FrameworkRun {
                            items: Vec::new(),
                            error: Some(error),
                        }
                    }
                }
            }
        }
    }

    /// Prepare, batch, classify, calibrate and filter.
    async fn classify(
        &self,
        framework: &Framework,
        threshold: f64,
    ) -> Result<Vec<ClassificationItem>, OrchestratorError> {
        let prepared = preprocessing::prepare_for(framework.kind, self.records);
        let budget_kb = self.ctx.execution.memory_budget_mb.saturating_mul(1024);
        let batch_size = batch_size(framework, prepared.len(), budget_kb);
        let real_time = self.config.real_time_processing;
        let timeout = self.ctx.execution.classify_timeout(real_time);

        let calls = async {
            let mut items = Vec::new();
            for chunk in prepared.chunks(batch_size) {
                let request = ClassificationRequest {
                    execution_id: self.execution_id.clone(),
                    framework_id: framework.id.clone(),
                    records: chunk.to_vec(),
                    rules: self.rules.to_vec(),
                    batch_size,
                    real_time,
                    timeout_secs: timeout.as_secs(),
                };
                items.extend(self.ctx.service.classify(request).await.into_result("classify")?);
            }
            Ok::<_, OrchestratorError>(items)
        };

        let items = tokio::time::timeout(timeout, calls)
            .await
            .map_err(|_elapsed| OrchestratorError::Timeout {
                operation: format!("classify with framework '{}'", framework.id),
                seconds: timeout.as_secs(),
            })??;

        Ok(items
            .into_iter()
            .map(|mut item| {
                if let Some(calibration) = &framework.calibration {
                    item.confidence = calibration.apply(item.confidence);
                }
                if item.source.is_empty() {
                    item.source.clone_from(&framework.id);
                }
                item
            })
            .filter(|item| item.confidence >= threshold)
            .collect())
    }
}

/// Cheapest rules first, then highest priority.
fn order_rules(rules: &[ClassificationRule]) -> Vec<ClassificationRule> {
    let mut ordered = rules.to_vec();
    ordered.sort_by(|a, b| {
        a.estimated_cost
            .total_cmp(&b.estimated_cost)
            .then(b.priority.cmp(&a.priority))
    });
    ordered
}

/// `min(max_batch, max(recommended, budget / item_cost))` clamped to
/// `[1, records]`.
fn batch_size(framework: &Framework, records: usize, budget_kb: u64) -> usize {
    let by_memory = budget_kb
        .checked_div(framework.item_memory_kb)
        .map_or(framework.max_batch_size, |n| {
            usize::try_from(n).unwrap_or(usize::MAX)
        });
    framework
        .max_batch_size
        .min(framework.recommended_batch_size.max(by_memory))
        .clamp(1, records.max(1))
}

struct QualityFilterStage;

#[async_trait]
impl Stage<ClassificationState> for QualityFilterStage {
    fn name(&self) -> &'static str {
        "quality_filter"
    }

    fn checkpoint(&self) -> f64 {
        90.0
    }

    async fn run(
        &self,
        state: &mut ClassificationState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let before = state.results.len();
        let mut seen = HashSet::new();
        state.results.retain(|item| {
            (0.0..=1.0).contains(&item.confidence)
                && seen.insert((item.id.clone(), item.label.clone(), item.source.clone()))
        });
        let dropped = before - state.results.len();
        if dropped > 0 {
            tracing::debug!(execution_id = %tracker.id(), dropped = dropped, "Dropped invalid or duplicate results");
        }

        let completeness = state.data.as_ref().map_or(0.0, |d| d.quality_score);
        let processed = state.data.as_ref().map_or(0, |d| d.records.len());
        let metrics = summarize(&state.results, completeness, processed, tracker);
        tracker.update_metrics(|m| {
            m.accuracy = metrics.accuracy;
            m.quality_score = metrics.quality_score;
            m.throughput = metrics.throughput;
            m.latency = metrics.latency;
            m.cost_efficiency = metrics.cost_efficiency;
        });
        tracker.set_results(state.results.clone());
        Ok(())
    }
}

struct RunSummary {
    accuracy: f64,
    quality_score: f64,
    throughput: f64,
    latency: f64,
    cost_efficiency: f64,
}

#[allow(clippy::cast_precision_loss, reason = "item counts are far below 2^52")]
fn summarize(
    results: &[ClassificationItem],
    completeness: f64,
    processed: usize,
    tracker: &ExecutionTracker,
) -> RunSummary {
    let accuracy = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64
    };
    let elapsed = Utc::now()
        .signed_duration_since(tracker.execution().start_time)
        .to_std()
        .unwrap_or(Duration::ZERO);
    let secs = elapsed.as_secs_f64();
    RunSummary {
        accuracy,
        quality_score: (completeness + accuracy) / 2.0,
        throughput: if secs > 0.0 { processed as f64 / secs } else { 0.0 },
        latency: secs * 1000.0,
        cost_efficiency: if processed == 0 {
            0.0
        } else {
            results.len() as f64 / processed as f64
        },
    }
}

struct OutputStage(Arc<ClassificationContext>);

#[async_trait]
impl Stage<ClassificationState> for OutputStage {
    fn name(&self) -> &'static str {
        "format_output"
    }

    fn checkpoint(&self) -> f64 {
        100.0
    }

    async fn run(
        &self,
        state: &mut ClassificationState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let execution_id = tracker.id().to_string();
        let metadata = OutputMetadata::new(execution_id.clone(), WorkflowKind::Classification)
            .started_at(tracker.execution().start_time);
        let outcome = self
            .0
            .formatter
            .format(&state.results, &state.config.output_format, &metadata);
        for warning in outcome.warnings {
            tracker.record_error(warning.into_execution_error());
        }
        tracker.set_output(outcome.output);

        let metrics = tracker.execution().metrics;

        if state.config.audit_enabled {
            let entry = AuditEntry {
                execution_id: execution_id.clone(),
                action: state.config.workflow_type.clone(),
                actor: state.caller.clone(),
                frameworks: state.frameworks.iter().map(|f| f.id.clone()).collect(),
                data_source: state.config.data_source.clone(),
                result_count: state.results.len(),
                quality_score: metrics.quality_score,
                timestamp: Utc::now(),
            };
            match self.0.service.create_audit_entry(entry).await {
                ServiceResponse::Success(receipt) => tracing::info!(
                    execution_id = %execution_id,
                    audit_id = %receipt.audit_id,
                    "Audit entry recorded"
                ),
                ServiceResponse::Failure { error, .. } => tracker.record_error(ExecutionError::new(
                    "AUDIT_FAILED",
                    format!("Audit entry could not be recorded: {error}"),
                    Severity::Medium,
                )),
            }
        }

        let record = MetricsRecord {
            execution_id,
            workflow_type: state.config.workflow_type.clone(),
            item_count: state.results.len(),
            throughput: metrics.throughput,
            accuracy: metrics.accuracy,
            latency_ms: metrics.latency,
            quality_score: metrics.quality_score,
        };
        if let ServiceResponse::Failure { error, .. } = self.0.service.record_metrics(record).await {
            tracker.record_error(ExecutionError::new(
                "METRICS_NOT_RECORDED",
                format!("Execution metrics could not be recorded: {error}"),
                Severity::Low,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framework(max: usize, recommended: usize, item_kb: u64) -> Framework {
        serde_json::from_value(serde_json::json!({
            "id": "nlp",
            "name": "NLP",
            "kind": "nlp",
            "max_batch_size": max,
            "recommended_batch_size": recommended,
            "item_memory_kb": item_kb
        }))
        .unwrap()
    }

    fn rule(id: &str, cost: f64, priority: i32) -> ClassificationRule {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": id,
            "expression": "true",
            "estimated_cost": cost,
            "priority": priority
        }))
        .unwrap()
    }

    #[test]
    fn test_order_rules_by_cost_then_priority() {
        let ordered = order_rules(&[rule("a", 5.0, 1), rule("b", 1.0, 1), rule("c", 1.0, 9)]);
        let ids: Vec<&str> = ordered.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_batch_size_bounds() {
        // Memory allows 512 items, capped by the framework maximum.
        assert_eq!(batch_size(&framework(100, 10, 1024), 1_000, 512 * 1024), 100);
        // Memory allows 4 items, recommended size wins.
        assert_eq!(batch_size(&framework(100, 10, 1024), 1_000, 4 * 1024), 10);
        // Never larger than the dataset.
        assert_eq!(batch_size(&framework(100, 10, 1024), 7, 512 * 1024), 7);
        // Never zero.
        assert_eq!(batch_size(&framework(0, 0, 1024), 0, 0), 1);
        // Zero item cost falls back to the maximum.
        assert_eq!(batch_size(&framework(64, 10, 0), 1_000, 1024), 64);
    }
}
