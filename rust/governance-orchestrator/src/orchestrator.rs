//! Workflow orchestrator.
//!
//! Entry point for running classification, ML and AI workflows, combining
//! them into multi-version runs, and reading platform health and resource
//! recommendations.
//!
//! ```text
//! execute_* / submit_*  → prepare (insert pending, register token)
//!                       → pipeline (StageExecutor over ExecutionTracker)
//!                       → release token
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use governance_services::{
    AiService, ClassificationItem, ClassificationService, MlService, PlatformMonitor,
};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::health::{HealthMonitor, SystemHealthMetrics};
use crate::logging::OpTimer;
use crate::optimizer::{ResourceOptimizationResult, ResourceOptimizer};
use crate::workflow::ai::mean_confidence;
use crate::workflow::{
    AiPipeline, AiReasoningConfig, ClassificationPipeline, ClassificationWorkflowConfig,
    ConsensusEngine, EventBus, ExecutionArchive, ExecutionError, ExecutionEvent, ExecutionFilter,
    ExecutionRepository, ExecutionTracker, InMemoryExecutionRepository, MlPipeline,
    MlPipelineConfig, MultiVersionWorkflowConfig, OrchestrationStrategy, OutputFormatter,
    OutputMetadata, RetentionPolicy, Severity, ValidationPipeline, VersionResults,
    WorkflowExecution, WorkflowKind,
};

/// System load below which the adaptive strategy runs versions in parallel.
const ADAPTIVE_PARALLEL_LOAD: f64 = 0.7;

/// Remote collaborators of the orchestrator.
#[derive(Clone)]
pub struct ServiceSet {
    pub classification: Arc<dyn ClassificationService>,
    pub platform: Arc<dyn PlatformMonitor>,
    pub ml: Arc<dyn MlService>,
    pub ai: Arc<dyn AiService>,
}

impl std::fmt::Debug for ServiceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSet").finish_non_exhaustive()
    }
}

/// Parent of a multi-version child execution.
#[derive(Debug, Clone)]
struct ParentRef {
    id: String,
    token: CancellationToken,
}

/// Drives workflow executions.
pub struct WorkflowOrchestrator {
    classification: ClassificationPipeline,
    ml: MlPipeline,
    ai: AiPipeline,
    consensus: ConsensusEngine,
    formatter: OutputFormatter,
    health: HealthMonitor,
    optimizer: ResourceOptimizer,
    platform: Arc<dyn PlatformMonitor>,
    repository: Arc<dyn ExecutionRepository>,
    archive: Option<Arc<dyn ExecutionArchive>>,
    events: EventBus,
    /// Cancellation tokens of executions that have not finished.
    running: RwLock<HashMap<String, CancellationToken>>,
    prune_interval: Duration,
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("stored_executions", &self.repository.len())
            .field("running", &self.running.read().len())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl WorkflowOrchestrator {
    /// Build an orchestrator with an in-memory repository.
    #[must_use]
    pub fn new(services: ServiceSet, config: &OrchestratorConfig) -> Self {
        let formatter = OutputFormatter::new();
        let validation = Arc::new(ValidationPipeline::new(
            Arc::clone(&services.classification),
            config.validation.clone(),
            config.execution.clone(),
        ));

        Self {
            classification: ClassificationPipeline::new(
                Arc::clone(&services.classification),
                validation,
                formatter,
                config.execution.clone(),
            ),
            ml: MlPipeline::new(Arc::clone(&services.ml), formatter),
            ai: AiPipeline::new(Arc::clone(&services.ai), formatter, config.execution.clone()),
            consensus: ConsensusEngine::new(&config.consensus),
            formatter,
            health: HealthMonitor::new(Arc::clone(&services.platform), config.health.clone()),
            optimizer: ResourceOptimizer::new(Arc::clone(&services.platform), &config.optimizer),
            platform: services.platform,
            repository: InMemoryExecutionRepository::shared(RetentionPolicy::from(&config.retention)),
            archive: None,
            events: EventBus::new(),
            running: RwLock::new(HashMap::new()),
            prune_interval: Duration::from_secs(config.retention.prune_interval_secs.max(1)),
        }
    }

    /// Replace the execution repository.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn ExecutionRepository>) -> Self {
        self.repository = repository;
        self
    }

    /// Hand pruned executions to `archive`.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn ExecutionArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    // ========================================================================
    // Workflow execution
    // ========================================================================

    /// Run a classification workflow to completion.
    pub async fn execute_classification_workflow(
        &self,
        config: ClassificationWorkflowConfig,
        caller: &str,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::Classification, None)?;
        self.run_classification(Arc::new(config), caller, tracker).await
    }

    /// Run an ML pipeline to completion.
    pub async fn execute_ml_pipeline(
        &self,
        config: MlPipelineConfig,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::MlPipeline, None)?;
        self.run_ml(Arc::new(config), tracker).await
    }

    /// Run an AI reasoning workflow to completion.
    pub async fn execute_ai_reasoning(
        &self,
        config: AiReasoningConfig,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::AiReasoning, None)?;
        self.run_ai(Arc::new(config), tracker).await
    }

    /// Run v1, v2 and v3 and merge their results.
    ///
    /// A failing version contributes no results and a medium error; the
    /// multi-version execution still completes.
    pub async fn orchestrate_multi_version_workflow(
        &self,
        config: MultiVersionWorkflowConfig,
        caller: &str,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::MultiVersion, None)?;
        self.run_multi_version(&config, caller, tracker).await
    }

    // ========================================================================
    // Background submission
    // ========================================================================

    /// Start a classification workflow in the background.
    pub fn submit_classification(
        self: &Arc<Self>,
        config: ClassificationWorkflowConfig,
        caller: impl Into<String>,
    ) -> Result<String, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::Classification, None)?;
        let id = tracker.id().to_string();
        let this = Arc::clone(self);
        let caller = caller.into();
        tokio::spawn(async move {
            let result = this
                .run_classification(Arc::new(config), &caller, tracker)
                .await;
            log_background_result("classification", result);
        });
        Ok(id)
    }

    /// Start an ML pipeline in the background.
    pub fn submit_ml_pipeline(
        self: &Arc<Self>,
        config: MlPipelineConfig,
    ) -> Result<String, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::MlPipeline, None)?;
        let id = tracker.id().to_string();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.run_ml(Arc::new(config), tracker).await;
            log_background_result("ml_pipeline", result);
        });
        Ok(id)
    }

    /// Start an AI reasoning workflow in the background.
    pub fn submit_ai_reasoning(
        self: &Arc<Self>,
        config: AiReasoningConfig,
    ) -> Result<String, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::AiReasoning, None)?;
        let id = tracker.id().to_string();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.run_ai(Arc::new(config), tracker).await;
            log_background_result("ai_reasoning", result);
        });
        Ok(id)
    }

    /// Start a multi-version workflow in the background.
    pub fn submit_multi_version(
        self: &Arc<Self>,
        config: MultiVersionWorkflowConfig,
        caller: impl Into<String>,
    ) -> Result<String, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::MultiVersion, None)?;
        let id = tracker.id().to_string();
        let this = Arc::clone(self);
        let caller = caller.into();
        tokio::spawn(async move {
            let result = this.run_multi_version(&config, &caller, tracker).await;
            log_background_result("multi_version", result);
        });
        Ok(id)
    }

    // ========================================================================
    // Queries and control
    // ========================================================================

    pub fn get_execution(&self, id: &str) -> Result<WorkflowExecution, OrchestratorError> {
        self.repository
            .get(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    /// Stored executions matching `filter`, oldest first.
    pub fn list_executions(&self, filter: &ExecutionFilter) -> Vec<WorkflowExecution> {
        self.repository
            .list()
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect()
    }

    /// Cancel a running execution and its children.
    pub fn cancel_execution(&self, id: &str) -> Result<(), OrchestratorError> {
        if let Some(token) = self.running.read().get(id) {
            tracing::info!(execution_id = %id, "Cancelling execution");
            token.cancel();
            return Ok(());
        }
        if self.repository.get(id).is_some() {
            Err(OrchestratorError::NotRunning(id.to_string()))
        } else {
            Err(OrchestratorError::NotFound(id.to_string()))
        }
    }

    /// Events of every execution.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Events of one unfinished execution.
    ///
    /// Finished executions have no further events; read their snapshot
    /// with [`Self::get_execution`] instead.
    pub fn subscribe_execution(
        &self,
        id: &str,
    ) -> Result<broadcast::Receiver<ExecutionEvent>, OrchestratorError> {
        {
            // Held across the subscribe so `release` cannot close the
            // channel in between.
            let running = self.running.read();
            if running.contains_key(id) {
                return Ok(self.events.subscribe_execution(id));
            }
        }
        if self.repository.get(id).is_some() {
            Err(OrchestratorError::NotRunning(id.to_string()))
        } else {
            Err(OrchestratorError::NotFound(id.to_string()))
        }
    }

    /// Remove expired and excess finished executions, archiving them when an
    /// archive is configured. Returns the number pruned.
    pub async fn prune_executions(&self) -> usize {
        let pruned = self.repository.prune(Utc::now());
        let count = pruned.len();
        if count == 0 {
            return 0;
        }
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.archive(pruned).await {
                tracing::warn!(error = %e, count, "Failed to archive pruned executions");
            }
        }
        tracing::info!(count, "Pruned executions");
        count
    }

    /// Prune on the configured interval until `shutdown` fires.
    pub fn spawn_retention_task(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.prune_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        this.prune_executions().await;
                    }
                }
            }
            tracing::debug!("Retention task stopped");
        })
    }

    // ========================================================================
    // Platform
    // ========================================================================

    pub async fn monitor_system_health(&self) -> SystemHealthMetrics {
        let timer = OpTimer::new("health", "monitor");
        let metrics = self.health.monitor().await;
        timer.finish();
        metrics
    }

    pub async fn optimize_resource_allocation(
        &self,
    ) -> Result<ResourceOptimizationResult, OrchestratorError> {
        let timer = OpTimer::new("optimizer", "optimize");
        let result = self.optimizer.optimize().await;
        timer.finish_with_result(result.as_ref());
        result
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Store a pending execution and register its cancellation token.
    fn prepare(
        &self,
        kind: WorkflowKind,
        parent: Option<&ParentRef>,
    ) -> Result<ExecutionTracker, OrchestratorError> {
        let execution = WorkflowExecution::new(kind).with_parent(parent.map(|p| p.id.clone()));
        let token = parent.map_or_else(CancellationToken::new, |p| p.token.child_token());
        self.repository.insert(execution.clone())?;
        self.running
            .write()
            .insert(execution.id.clone(), token.clone());
        tracing::debug!(execution_id = %execution.id, kind = %kind, "Execution registered");
        Ok(ExecutionTracker::new(
            execution,
            Arc::clone(&self.repository),
            self.events.clone(),
            token,
        ))
    }

    fn release(&self, id: &str) {
        self.running.write().remove(id);
        self.events.close_execution(id);
    }

    async fn run_classification(
        &self,
        config: Arc<ClassificationWorkflowConfig>,
        caller: &str,
        mut tracker: ExecutionTracker,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        tracker.start();
        let result = self.classification.run(config, caller, &mut tracker).await;
        self.release(tracker.id());
        result.map(|()| tracker.into_execution())
    }

    async fn run_ml(
        &self,
        config: Arc<MlPipelineConfig>,
        mut tracker: ExecutionTracker,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        tracker.start();
        let result = self.ml.run(config, &mut tracker).await;
        self.release(tracker.id());
        result.map(|()| tracker.into_execution())
    }

    async fn run_ai(
        &self,
        config: Arc<AiReasoningConfig>,
        mut tracker: ExecutionTracker,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        tracker.start();
        let result = self.ai.run(config, &mut tracker).await;
        self.release(tracker.id());
        result.map(|()| tracker.into_execution())
    }

    async fn run_multi_version(
        &self,
        config: &MultiVersionWorkflowConfig,
        caller: &str,
        mut tracker: ExecutionTracker,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        tracker.start();
        let result = self.multi_version_steps(config, caller, &mut tracker).await;
        self.release(tracker.id());
        result.map(|()| tracker.into_execution())
    }

    async fn multi_version_steps(
        &self,
        config: &MultiVersionWorkflowConfig,
        caller: &str,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let parent = ParentRef {
            id: tracker.id().to_string(),
            token: tracker.cancel_token().clone(),
        };

        let parallel = match config.orchestration_strategy {
            OrchestrationStrategy::Parallel => true,
            OrchestrationStrategy::Sequential => false,
            OrchestrationStrategy::Adaptive => {
                let load = self.platform.system_load().await.ok().unwrap_or(1.0);
                let parallel = load < ADAPTIVE_PARALLEL_LOAD;
                tracing::info!(
                    execution_id = %parent.id,
                    load = load,
                    parallel = parallel,
                    "Adaptive strategy resolved"
                );
                parallel
            }
        };

        tracker.set_step("versions");
        let results = if parallel {
            let (v1, v2, v3) = tokio::join!(
                self.run_v1(config, caller, &parent),
                self.run_v2(config, &parent),
                self.run_v3(config, &parent),
            );
            let results = VersionResults {
                v1: settle_version(tracker, "v1", v1),
                v2: settle_version(tracker, "v2", v2),
                v3: settle_version(tracker, "v3", v3),
            };
            ensure_not_cancelled(tracker, "versions")?;
            tracker.advance(90.0);
            results
        } else {
            let v1 = self.run_v1(config, caller, &parent).await;
            let v1 = settle_version(tracker, "v1", v1);
            ensure_not_cancelled(tracker, "versions")?;
            tracker.advance(33.0);

            let v2 = self.run_v2(config, &parent).await;
            let v2 = settle_version(tracker, "v2", v2);
            ensure_not_cancelled(tracker, "versions")?;
            tracker.advance(66.0);

            let v3 = self.run_v3(config, &parent).await;
            let v3 = settle_version(tracker, "v3", v3);
            ensure_not_cancelled(tracker, "versions")?;
            tracker.advance(90.0);

            VersionResults { v1, v2, v3 }
        };

        tracker.set_step("consensus");
        let combined = self.consensus.combine(&results, config.consensus_algorithm);
        tracing::info!(
            execution_id = %parent.id,
            algorithm = %config.consensus_algorithm,
            v1 = results.v1.len(),
            v2 = results.v2.len(),
            v3 = results.v3.len(),
            consensus = combined.len(),
            "Consensus computed"
        );
        tracker.set_version_results(results);
        tracker.set_results(combined.clone());
        tracker.advance(95.0);

        if config.quality_assurance {
            ensure_not_cancelled(tracker, "quality_assurance")?;
            tracker.set_step("quality_assurance");
            let quality = ConsensusEngine::quality_score(&combined);
            tracker.update_metrics(|m| m.quality_score = quality);
        }

        let accuracy = mean_confidence(&combined);
        tracker.update_metrics(|m| m.accuracy = accuracy);

        let metadata = OutputMetadata::new(tracker.id(), WorkflowKind::MultiVersion)
            .started_at(tracker.execution().start_time);
        let outcome =
            self.formatter
                .format(&combined, &config.v1_config.output_format, &metadata);
        for warning in outcome.warnings {
            tracker.record_error(warning.into_execution_error());
        }
        tracker.set_output(outcome.output);
        tracker.complete();
        Ok(())
    }

    async fn run_v1(
        &self,
        config: &MultiVersionWorkflowConfig,
        caller: &str,
        parent: &ParentRef,
    ) -> Result<Vec<ClassificationItem>, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::Classification, Some(parent))?;
        let execution = self
            .run_classification(Arc::new(config.v1_config.clone()), caller, tracker)
            .await?;
        Ok(execution.results)
    }

    async fn run_v2(
        &self,
        config: &MultiVersionWorkflowConfig,
        parent: &ParentRef,
    ) -> Result<Vec<ClassificationItem>, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::MlPipeline, Some(parent))?;
        let execution = self
            .run_ml(Arc::new(config.v2_config.clone()), tracker)
            .await?;
        Ok(execution.results)
    }

    async fn run_v3(
        &self,
        config: &MultiVersionWorkflowConfig,
        parent: &ParentRef,
    ) -> Result<Vec<ClassificationItem>, OrchestratorError> {
        let tracker = self.prepare(WorkflowKind::AiReasoning, Some(parent))?;
        let execution = self
            .run_ai(Arc::new(config.v3_config.clone()), tracker)
            .await?;
        Ok(execution.results)
    }
}

/// Results of one version, or nothing plus a medium error.
fn settle_version(
    tracker: &mut ExecutionTracker,
    version: &str,
    result: Result<Vec<ClassificationItem>, OrchestratorError>,
) -> Vec<ClassificationItem> {
    match result {
        Ok(items) => items,
        Err(e) => {
            tracker.record_error(
                ExecutionError::new(
                    "VERSION_FAILED",
                    format!("Version {version} failed: {e}"),
                    Severity::Medium,
                )
                .recoverable(true)
                .with_context("version", version)
                .with_context("cause", e.code()),
            );
            Vec::new()
        }
    }
}

fn ensure_not_cancelled(tracker: &mut ExecutionTracker, step: &str) -> Result<(), OrchestratorError> {
    if !tracker.is_cancelled() {
        return Ok(());
    }
    tracker.fail(
        ExecutionError::new(
            "EXECUTION_CANCELLED",
            format!("Execution cancelled during '{step}'"),
            Severity::Critical,
        )
        .with_context("stage", step),
    );
    Err(OrchestratorError::Cancelled(tracker.id().to_string()))
}

fn log_background_result(workflow: &str, result: Result<WorkflowExecution, OrchestratorError>) {
    match result {
        Ok(execution) => tracing::info!(
            execution_id = %execution.id,
            workflow,
            status = %execution.status,
            "Background workflow finished"
        ),
        Err(e) => tracing::warn!(workflow, error = %e, "Background workflow failed"),
    }
}
