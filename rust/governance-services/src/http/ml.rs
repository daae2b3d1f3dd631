use async_trait::async_trait;

use super::{HttpServiceConfig, HttpTransport};
use crate::error::ServiceError;
use crate::ml::{
    DeploymentJob, DeploymentRequest, DriftMonitor, DriftMonitorRequest, HyperparameterRequest,
    HyperparameterResult, MlService, ModelInfo, ModelValidation, ModelValidationRequest,
    TrainingDataRequest, TrainingDataset, TrainingJob, TrainingRequest,
};
use crate::response::ServiceResponse;

/// HTTP client of the ML service.
#[derive(Debug, Clone)]
pub struct HttpMlService {
    transport: HttpTransport,
}

impl HttpMlService {
    pub fn new(config: &HttpServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }
}

#[async_trait]
impl MlService for HttpMlService {
    async fn get_model(&self, model_id: &str) -> ServiceResponse<ModelInfo> {
        self.transport.get(&["models", model_id]).await
    }

    async fn prepare_training_data(
        &self,
        request: TrainingDataRequest,
    ) -> ServiceResponse<TrainingDataset> {
        self.transport.post(&["training-data"], &request).await
    }

    async fn optimize_hyperparameters(
        &self,
        request: HyperparameterRequest,
    ) -> ServiceResponse<HyperparameterResult> {
        self.transport
            .post(&["models", &request.model_id, "hyperparameters"], &request)
            .await
    }

    async fn start_training(&self, request: TrainingRequest) -> ServiceResponse<TrainingJob> {
        self.transport
            .post(&["models", &request.model_id, "train"], &request)
            .await
    }

    async fn validate_model(
        &self,
        request: ModelValidationRequest,
    ) -> ServiceResponse<ModelValidation> {
        self.transport
            .post(&["models", &request.model_id, "validate"], &request)
            .await
    }

    async fn setup_drift_detection(
        &self,
        request: DriftMonitorRequest,
    ) -> ServiceResponse<DriftMonitor> {
        self.transport.post(&["drift-monitors"], &request).await
    }

    async fn deploy(&self, request: DeploymentRequest) -> ServiceResponse<DeploymentJob> {
        self.transport.post(&["deployments"], &request).await
    }
}
