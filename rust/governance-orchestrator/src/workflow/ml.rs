//! ML training, validation and deployment pipeline.
//!
//! ```text
//! validate_models (10) → prepare_training_data (20) → optimize_hyperparameters (35)
//!   → train_ensemble (60) → validate_ensemble (80) → drift_detection (90)
//!   → deploy (100)
//! ```
//!
//! Training calls return job handles immediately. Stage failures of this
//! pipeline are recorded as recoverable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use governance_services::ml::{
    DeploymentRequest, DriftMonitorRequest, EnsembleMethod, HyperparameterRequest, MlService,
    ModelInfo, ModelValidation, ModelValidationRequest, TrainingDataRequest, TrainingDataset,
    TrainingJob, TrainingRequest,
};
use governance_services::{ClassificationItem, ServiceResponse};
use serde_json::{json, Map, Value};

use super::configs::MlPipelineConfig;
use super::execution::{ExecutionError, Severity, WorkflowKind};
use super::output::{OutputFormatter, OutputMetadata};
use super::stage::{Stage, StageExecutor};
use super::tracker::ExecutionTracker;
use super::validation::validate_ml;
use crate::error::OrchestratorError;

/// Source recorded on ensemble items.
pub const ENSEMBLE_SOURCE: &str = "ensemble";

struct MlContext {
    service: Arc<dyn MlService>,
    formatter: OutputFormatter,
}

/// State threaded through the ML stages.
#[derive(Debug)]
pub struct MlState {
    pub config: Arc<MlPipelineConfig>,
    pub models: Vec<ModelInfo>,
    pub dataset: Option<TrainingDataset>,
    /// Tuned parameters per model id.
    pub hyperparameters: HashMap<String, Map<String, Value>>,
    pub jobs: Vec<TrainingJob>,
    pub validations: Vec<ModelValidation>,
    pub results: Vec<ClassificationItem>,
}

impl MlState {
    #[must_use]
    pub fn new(config: Arc<MlPipelineConfig>) -> Self {
        Self {
            config,
            models: Vec::new(),
            dataset: None,
            hyperparameters: HashMap::new(),
            jobs: Vec::new(),
            validations: Vec::new(),
            results: Vec::new(),
        }
    }

    fn dataset_id(&self) -> Result<&str, OrchestratorError> {
        self.dataset
            .as_ref()
            .map(|d| d.dataset_id.as_str())
            .ok_or_else(|| OrchestratorError::Internal("training data was not prepared".to_string()))
    }
}

/// Runs ML pipelines.
pub struct MlPipeline {
    executor: StageExecutor<MlState>,
}

impl std::fmt::Debug for MlPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlPipeline")
            .field("executor", &self.executor)
            .finish()
    }
}

impl MlPipeline {
    #[must_use]
    pub fn new(service: Arc<dyn MlService>, formatter: OutputFormatter) -> Self {
        let ctx = Arc::new(MlContext { service, formatter });
        let executor = StageExecutor::new("ml_pipeline")
            .stage(ValidateModelsStage(Arc::clone(&ctx)))
            .stage(PrepareTrainingDataStage(Arc::clone(&ctx)))
            .stage(HyperparameterStage(Arc::clone(&ctx)))
            .stage(TrainStage(Arc::clone(&ctx)))
            .stage(ValidateEnsembleStage(Arc::clone(&ctx)))
            .stage(DriftDetectionStage(Arc::clone(&ctx)))
            .stage(DeployStage(ctx))
            .recoverable_failures(true);
        Self { executor }
    }

    pub async fn run(
        &self,
        config: Arc<MlPipelineConfig>,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let mut state = MlState::new(config);
        self.executor.run(&mut state, tracker).await
    }
}

struct ValidateModelsStage(Arc<MlContext>);

#[async_trait]
impl Stage<MlState> for ValidateModelsStage {
    fn name(&self) -> &'static str {
        "validate_models"
    }

    fn checkpoint(&self) -> f64 {
        10.0
    }

    async fn run(
        &self,
        state: &mut MlState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        validate_ml(&state.config).into_result()?;

        let ids = &state.config.model_ids;
        let responses = join_all(ids.iter().map(|id| self.0.service.get_model(id))).await;
        for (id, response) in ids.iter().zip(responses) {
            match response {
                ServiceResponse::Success(model) => state.models.push(model),
                ServiceResponse::Failure { error, .. } => tracker.record_error(
                    ExecutionError::new(
                        "MODEL_UNAVAILABLE",
                        format!("Model '{id}' could not be loaded: {error}"),
                        Severity::Medium,
                    )
                    .with_context("model", id.as_str()),
                ),
            }
        }

        if state.models.is_empty() {
            return Err(OrchestratorError::Unavailable(
                "no model could be loaded".to_string(),
            ));
        }
        Ok(())
    }
}

struct PrepareTrainingDataStage(Arc<MlContext>);

#[async_trait]
impl Stage<MlState> for PrepareTrainingDataStage {
    fn name(&self) -> &'static str {
        "prepare_training_data"
    }

    fn checkpoint(&self) -> f64 {
        20.0
    }

    async fn run(
        &self,
        state: &mut MlState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let request = TrainingDataRequest {
            execution_id: tracker.id().to_string(),
            source: state.config.training_data.clone(),
            validation_split: state.config.validation_split,
        };
        let dataset = self
            .0
            .service
            .prepare_training_data(request)
            .await
            .into_result("prepare_training_data")?;
        tracing::info!(
            execution_id = %tracker.id(),
            dataset_id = %dataset.dataset_id,
            training_records = dataset.training_records,
            validation_records = dataset.validation_records,
            "Training data prepared"
        );
        state.dataset = Some(dataset);
        Ok(())
    }
}

struct HyperparameterStage(Arc<MlContext>);

#[async_trait]
impl Stage<MlState> for HyperparameterStage {
    fn name(&self) -> &'static str {
        "optimize_hyperparameters"
    }

    fn checkpoint(&self) -> f64 {
        35.0
    }

    async fn run(
        &self,
        state: &mut MlState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        if !state.config.hyperparameter_optimization {
            return Ok(());
        }
        let dataset_id = state.dataset_id()?.to_string();

        let requests = state.models.iter().map(|model| {
            self.0.service.optimize_hyperparameters(HyperparameterRequest {
                model_id: model.id.clone(),
                dataset_id: dataset_id.clone(),
            })
        });
        let responses = join_all(requests).await;

        for (model, response) in state.models.iter().zip(responses) {
            match response {
                ServiceResponse::Success(result) => {
                    state.hyperparameters.insert(model.id.clone(), result.parameters);
                }
                ServiceResponse::Failure { error, .. } => tracker.record_error(
                    ExecutionError::new(
                        "HYPERPARAMETER_SEARCH_FAILED",
                        format!(
                            "Hyperparameter search failed for model '{}', using defaults: {error}",
                            model.id
                        ),
                        Severity::Medium,
                    )
                    .with_context("model", model.id.as_str()),
                ),
            }
        }
        Ok(())
    }
}

struct TrainStage(Arc<MlContext>);

#[async_trait]
impl Stage<MlState> for TrainStage {
    fn name(&self) -> &'static str {
        "train_ensemble"
    }

    fn checkpoint(&self) -> f64 {
        60.0
    }

    async fn run(
        &self,
        state: &mut MlState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let dataset_id = state.dataset_id()?.to_string();
        let execution_id = tracker.id().to_string();

        let requests = state.models.iter().map(|model| {
            self.0.service.start_training(TrainingRequest {
                execution_id: execution_id.clone(),
                model_id: model.id.clone(),
                dataset_id: dataset_id.clone(),
                parameters: state
                    .hyperparameters
                    .get(&model.id)
                    .cloned()
                    .unwrap_or_default(),
            })
        });
        let responses = join_all(requests).await;

        let mut jobs = Vec::new();
        for (model, response) in state.models.iter().zip(responses) {
            match response {
                ServiceResponse::Success(job) => {
                    tracing::info!(
                        execution_id = %execution_id,
                        model = %model.id,
                        job_id = %job.job_id,
                        "Training started"
                    );
                    jobs.push(job);
                }
                ServiceResponse::Failure { error, .. } => tracker.record_error(
                    ExecutionError::new(
                        "TRAINING_FAILED",
                        format!("Training could not start for model '{}': {error}", model.id),
                        Severity::Medium,
                    )
                    .with_context("model", model.id.as_str()),
                ),
            }
        }

        if jobs.is_empty() {
            return Err(OrchestratorError::Unavailable(
                "no training job could be started".to_string(),
            ));
        }
        state.jobs = jobs;
        Ok(())
    }
}

struct ValidateEnsembleStage(Arc<MlContext>);

#[async_trait]
impl Stage<MlState> for ValidateEnsembleStage {
    fn name(&self) -> &'static str {
        "validate_ensemble"
    }

    fn checkpoint(&self) -> f64 {
        80.0
    }

    async fn run(
        &self,
        state: &mut MlState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let dataset_id = state.dataset_id()?.to_string();
        let split = state.config.validation_split;

        let requests = state.jobs.iter().map(|job| {
            self.0.service.validate_model(ModelValidationRequest {
                model_id: job.model_id.clone(),
                dataset_id: dataset_id.clone(),
                validation_split: split,
            })
        });
        let responses = join_all(requests).await;

        let mut validations = Vec::new();
        for (job, response) in state.jobs.iter().zip(responses) {
            match response {
                ServiceResponse::Success(validation) => validations.push(validation),
                ServiceResponse::Failure { error, .. } => tracker.record_error(
                    ExecutionError::new(
                        "MODEL_VALIDATION_FAILED",
                        format!("Model '{}' could not be validated: {error}", job.model_id),
                        Severity::Medium,
                    )
                    .with_context("model", job.model_id.as_str()),
                ),
            }
        }
        if validations.is_empty() {
            return Err(OrchestratorError::Unavailable(
                "no model passed validation".to_string(),
            ));
        }

        let method = state.config.ensemble_method;
        let accuracy = ensemble_accuracy(&validations);
        if accuracy < state.config.performance_threshold {
            tracker.record_error(
                ExecutionError::new(
                    "ENSEMBLE_BELOW_THRESHOLD",
                    format!(
                        "Ensemble accuracy {accuracy:.3} is below the performance threshold {}",
                        state.config.performance_threshold
                    ),
                    Severity::Medium,
                )
                .with_context("accuracy", accuracy),
            );
        }

        state.results = combine_predictions(&validations, method);
        state.validations = validations;
        tracker.update_metrics(|m| {
            m.accuracy = accuracy;
            m.quality_score = accuracy;
        });
        tracker.set_results(state.results.clone());
        Ok(())
    }
}

struct DriftDetectionStage(Arc<MlContext>);

#[async_trait]
impl Stage<MlState> for DriftDetectionStage {
    fn name(&self) -> &'static str {
        "drift_detection"
    }

    fn checkpoint(&self) -> f64 {
        90.0
    }

    async fn run(
        &self,
        state: &mut MlState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        if !state.config.drift_detection {
            return Ok(());
        }
        let request = DriftMonitorRequest {
            execution_id: tracker.id().to_string(),
            model_ids: state.jobs.iter().map(|j| j.model_id.clone()).collect(),
            auto_retraining: state.config.auto_retraining,
        };
        match self.0.service.setup_drift_detection(request).await {
            ServiceResponse::Success(monitor) => tracing::info!(
                execution_id = %tracker.id(),
                monitor_id = %monitor.monitor_id,
                "Drift detection registered"
            ),
            ServiceResponse::Failure { error, .. } => tracker.record_error(ExecutionError::new(
                "DRIFT_DETECTION_FAILED",
                format!("Drift detection could not be registered: {error}"),
                Severity::Medium,
            )),
        }
        Ok(())
    }
}

struct DeployStage(Arc<MlContext>);

#[async_trait]
impl Stage<MlState> for DeployStage {
    fn name(&self) -> &'static str {
        "deploy"
    }

    fn checkpoint(&self) -> f64 {
        100.0
    }

    async fn run(
        &self,
        state: &mut MlState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let request = DeploymentRequest {
            execution_id: tracker.id().to_string(),
            model_ids: state.validations.iter().map(|v| v.model_id.clone()).collect(),
            ensemble_method: state.config.ensemble_method,
        };
        let deployment = self.0.service.deploy(request).await.into_result("deploy")?;
        tracing::info!(
            execution_id = %tracker.id(),
            deployment_id = %deployment.deployment_id,
            endpoint = deployment.endpoint.as_deref().unwrap_or("-"),
            "Ensemble deployment started"
        );

        let metadata = OutputMetadata::new(tracker.id(), WorkflowKind::MlPipeline)
            .started_at(tracker.execution().start_time);
        let outcome = self
            .0
            .formatter
            .format(&state.results, &state.config.output_format, &metadata);
        for warning in outcome.warnings {
            tracker.record_error(warning.into_execution_error());
        }
        tracker.set_output(outcome.output);
        Ok(())
    }
}

/// Mean validation accuracy, `0.0` for no models.
#[must_use]
#[allow(clippy::cast_precision_loss, reason = "model counts are tiny")]
pub fn ensemble_accuracy(validations: &[ModelValidation]) -> f64 {
    if validations.is_empty() {
        return 0.0;
    }
    validations.iter().map(|v| v.accuracy).sum::<f64>() / validations.len() as f64
}

/// Per-subject label scores of one ensemble.
struct SubjectVotes<'a> {
    /// Labels in first-appearance order.
    labels: Vec<&'a str>,
    /// `(model index, confidence)` per label.
    votes: HashMap<&'a str, Vec<(usize, f64)>>,
}

/// Combine model predictions per subject.
///
/// - voting: label predicted by the most models, confidence is their mean
/// - averaging: label with the highest confidence averaged over all models
/// - stacking: label with the highest accuracy-weighted confidence
#[must_use]
#[allow(clippy::cast_precision_loss, reason = "model counts are tiny")]
pub fn combine_predictions(
    validations: &[ModelValidation],
    method: EnsembleMethod,
) -> Vec<ClassificationItem> {
    let mut order: Vec<&str> = Vec::new();
    let mut subjects: HashMap<&str, SubjectVotes<'_>> = HashMap::new();
    for (model, validation) in validations.iter().enumerate() {
        for prediction in &validation.predictions {
            let subject = subjects.entry(prediction.id.as_str()).or_insert_with(|| {
                order.push(prediction.id.as_str());
                SubjectVotes {
                    labels: Vec::new(),
                    votes: HashMap::new(),
                }
            });
            let label = prediction.label.as_str();
            let votes = subject.votes.entry(label).or_insert_with(|| {
                subject.labels.push(label);
                Vec::new()
            });
            // One vote per model and label, the most confident one.
            match votes.iter_mut().find(|(m, _)| *m == model) {
                Some(vote) => vote.1 = vote.1.max(prediction.confidence),
                None => votes.push((model, prediction.confidence)),
            }
        }
    }

    let model_count = validations.len().max(1) as f64;
    let accuracy_sum: f64 = validations.iter().map(|v| v.accuracy).sum();
    let models: Vec<&str> = validations.iter().map(|v| v.model_id.as_str()).collect();

    order
        .into_iter()
        .filter_map(|subject| {
            let votes = subjects.get(subject)?;
            let mut best: Option<(f64, f64, &str)> = None;
            for label in &votes.labels {
                let label_votes = votes.votes.get(label)?;
                let (rank, confidence) = match method {
                    EnsembleMethod::Voting => {
                        let count = label_votes.len() as f64;
                        let mean = label_votes.iter().map(|(_, c)| c).sum::<f64>() / count;
                        (count + mean / 2.0, mean)
                    }
                    EnsembleMethod::Averaging => {
                        let mean = label_votes.iter().map(|(_, c)| c).sum::<f64>() / model_count;
                        (mean, mean)
                    }
                    EnsembleMethod::Stacking => {
                        let weighted = if accuracy_sum > 0.0 {
                            label_votes
                                .iter()
                                .map(|(m, c)| validations[*m].accuracy * c)
                                .sum::<f64>()
                                / accuracy_sum
                        } else {
                            0.0
                        };
                        (weighted, weighted)
                    }
                };
                if best.is_none_or(|(r, _, _)| rank > r) {
                    best = Some((rank, confidence, label));
                }
            }

            let (_, confidence, label) = best?;
            let voters: Vec<&str> = votes.votes.get(label)?.iter().map(|(m, _)| models[*m]).collect();
            Some(
                ClassificationItem::new(subject, label, confidence.clamp(0.0, 1.0), ENSEMBLE_SOURCE)
                    .with_attribute(
                        "ensemble",
                        json!({ "method": method.to_string(), "models": voters }),
                    ),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation(model: &str, accuracy: f64, predictions: &[(&str, &str, f64)]) -> ModelValidation {
        ModelValidation {
            model_id: model.to_string(),
            accuracy,
            predictions: predictions
                .iter()
                .map(|(id, label, c)| ClassificationItem::new(*id, *label, *c, model))
                .collect(),
        }
    }

    fn validations() -> Vec<ModelValidation> {
        vec![
            validation("m1", 0.9, &[("a", "pii", 0.6), ("b", "public", 0.9)]),
            validation("m2", 0.6, &[("a", "pii", 0.8), ("b", "pii", 0.7)]),
            validation("m3", 0.3, &[("a", "public", 0.99), ("b", "pii", 0.5)]),
        ]
    }

    #[test]
    fn test_voting_picks_majority_label() {
        let combined = combine_predictions(&validations(), EnsembleMethod::Voting);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].id, "a");
        assert_eq!(combined[0].label, "pii");
        assert!((combined[0].confidence - 0.7).abs() < 1e-9);
        assert_eq!(combined[1].label, "pii");
        assert_eq!(combined[0].source, ENSEMBLE_SOURCE);
        assert_eq!(combined[0].attributes["ensemble"]["models"], json!(["m1", "m2"]));
    }

    #[test]
    fn test_averaging_uses_mean_over_all_models() {
        let combined = combine_predictions(&validations(), EnsembleMethod::Averaging);
        // a: pii (0.6 + 0.8) / 3 ≈ 0.467 beats public 0.99 / 3 = 0.33.
        assert_eq!(combined[0].label, "pii");
        // b: pii (0.7 + 0.5) / 3 = 0.4 beats public 0.3.
        assert_eq!(combined[1].label, "pii");
    }

    #[test]
    fn test_stacking_weights_by_accuracy() {
        let combined = combine_predictions(&validations(), EnsembleMethod::Stacking);
        // b: public 0.9 × 0.9 = 0.81 beats pii 0.6 × 0.7 + 0.3 × 0.5 = 0.57.
        assert_eq!(combined[1].label, "public");
        assert!((combined[1].confidence - 0.81 / 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_ensemble_accuracy() {
        assert!((ensemble_accuracy(&validations()) - 0.6).abs() < 1e-9);
        assert!(ensemble_accuracy(&[]).abs() < f64::EPSILON);
    }
}
