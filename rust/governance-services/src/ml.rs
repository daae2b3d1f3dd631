//! Machine-learning service contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classification::ClassificationItem;
use crate::response::ServiceResponse;

/// How predictions of several models are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleMethod {
    /// Majority label per subject.
    Voting,
    /// Label with the highest mean confidence.
    Averaging,
    /// Accuracy-weighted combination.
    Stacking,
}

impl std::fmt::Display for EnsembleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voting => write!(f, "voting"),
            Self::Averaging => write!(f, "averaging"),
            Self::Stacking => write!(f, "stacking"),
        }
    }
}

/// Registered model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub baseline_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataRequest {
    pub execution_id: String,
    pub source: String,
    pub validation_split: f64,
}

/// Prepared, split training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub dataset_id: String,
    pub training_records: u64,
    pub validation_records: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterRequest {
    pub model_id: String,
    pub dataset_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterResult {
    pub model_id: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub best_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub execution_id: String,
    pub model_id: String,
    pub dataset_id: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// Handle of a training job. Training runs asynchronously on the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub job_id: String,
    pub model_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelValidationRequest {
    pub model_id: String,
    pub dataset_id: String,
    pub validation_split: f64,
}

/// Validation outcome of one model, with its predictions on the hold-out set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelValidation {
    pub model_id: String,
    pub accuracy: f64,
    #[serde(default)]
    pub predictions: Vec<ClassificationItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMonitorRequest {
    pub execution_id: String,
    pub model_ids: Vec<String>,
    pub auto_retraining: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMonitor {
    pub monitor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub execution_id: String,
    pub model_ids: Vec<String>,
    pub ensemble_method: EnsembleMethod,
}

/// Handle of a deployment job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentJob {
    pub deployment_id: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Remote ML service.
#[async_trait]
pub trait MlService: Send + Sync {
    async fn get_model(&self, model_id: &str) -> ServiceResponse<ModelInfo>;

    async fn prepare_training_data(
        &self,
        request: TrainingDataRequest,
    ) -> ServiceResponse<TrainingDataset>;

    async fn optimize_hyperparameters(
        &self,
        request: HyperparameterRequest,
    ) -> ServiceResponse<HyperparameterResult>;

    /// Trigger training. Returns as soon as the job is accepted.
    async fn start_training(&self, request: TrainingRequest) -> ServiceResponse<TrainingJob>;

    async fn validate_model(
        &self,
        request: ModelValidationRequest,
    ) -> ServiceResponse<ModelValidation>;

    async fn setup_drift_detection(
        &self,
        request: DriftMonitorRequest,
    ) -> ServiceResponse<DriftMonitor>;

    async fn deploy(&self, request: DeploymentRequest) -> ServiceResponse<DeploymentJob>;
}
