use std::time::Duration;

use async_trait::async_trait;

use super::{HttpServiceConfig, HttpTransport};
use crate::classification::{
    AccessCheck, AuditEntry, AuditReceipt, AvailableCapacity, ClassificationItem,
    ClassificationRequest, ClassificationRule, ClassificationService, DataBatch, DataSourceInfo,
    Framework, MetricsRecord, PermissionDecision, RuleValidation, Vulnerability,
};
use crate::error::ServiceError;
use crate::platform::{
    AllocationSnapshot, CapacitySnapshot, ComplianceSnapshot, PerformanceSnapshot,
    PlatformMonitor, SecuritySnapshot, ServiceAvailability, UtilizationSample, WorkloadForecast,
};
use crate::response::ServiceResponse;

/// HTTP client of the classification service.
///
/// The same service exposes the platform telemetry endpoints, so this client
/// also implements [`PlatformMonitor`].
#[derive(Debug, Clone)]
pub struct HttpClassificationService {
    transport: HttpTransport,
}

impl HttpClassificationService {
    pub fn new(config: &HttpServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }
}

#[async_trait]
impl ClassificationService for HttpClassificationService {
    async fn get_framework(&self, framework_id: &str) -> ServiceResponse<Framework> {
        self.transport.get(&["frameworks", framework_id]).await
    }

    async fn get_rule(&self, rule_id: &str) -> ServiceResponse<ClassificationRule> {
        self.transport.get(&["rules", rule_id]).await
    }

    async fn validate_rule(&self, rule: &ClassificationRule) -> ServiceResponse<RuleValidation> {
        self.transport.post(&["rules", "validate"], rule).await
    }

    async fn get_data_source(&self, source_id: &str) -> ServiceResponse<DataSourceInfo> {
        self.transport.get(&["data-sources", source_id]).await
    }

    async fn check_data_access(&self, source_id: &str) -> ServiceResponse<AccessCheck> {
        self.transport
            .get(&["data-sources", source_id, "access"])
            .await
    }

    async fn load_data(&self, source_id: &str) -> ServiceResponse<DataBatch> {
        self.transport
            .get(&["data-sources", source_id, "records"])
            .await
    }

    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> ServiceResponse<Vec<ClassificationItem>> {
        let timeout = Duration::from_secs(request.timeout_secs);
        tracing::debug!(
            framework = %request.framework_id,
            records = request.records.len(),
            timeout_secs = request.timeout_secs,
            "Sending classification request"
        );
        self.transport
            .post_with_timeout(&["classify"], &request, timeout)
            .await
    }

    async fn record_metrics(&self, record: MetricsRecord) -> ServiceResponse<()> {
        self.transport.post(&["metrics"], &record).await
    }

    async fn create_audit_entry(&self, entry: AuditEntry) -> ServiceResponse<AuditReceipt> {
        self.transport.post(&["audit"], &entry).await
    }

    async fn historical_quality_average(&self) -> ServiceResponse<f64> {
        self.transport
            .get(&["quality", "historical-average"])
            .await
    }

    async fn validate_permissions(
        &self,
        caller: &str,
        resources: &[String],
    ) -> ServiceResponse<PermissionDecision> {
        let body = serde_json::json!({
            "caller": caller,
            "resources": resources,
        });
        self.transport
            .post(&["permissions", "validate"], &body)
            .await
    }

    async fn scan_vulnerabilities(
        &self,
        framework_id: &str,
    ) -> ServiceResponse<Vec<Vulnerability>> {
        self.transport
            .get(&["frameworks", framework_id, "vulnerabilities"])
            .await
    }

    async fn available_capacity(&self) -> ServiceResponse<AvailableCapacity> {
        self.transport.get(&["capacity", "available"]).await
    }
}

#[async_trait]
impl PlatformMonitor for HttpClassificationService {
    async fn service_availability(&self) -> ServiceResponse<ServiceAvailability> {
        self.transport.get(&["system", "services"]).await
    }

    async fn performance(&self) -> ServiceResponse<PerformanceSnapshot> {
        self.transport.get(&["system", "performance"]).await
    }

    async fn capacity(&self) -> ServiceResponse<CapacitySnapshot> {
        self.transport.get(&["system", "capacity"]).await
    }

    async fn security(&self) -> ServiceResponse<SecuritySnapshot> {
        self.transport.get(&["system", "security"]).await
    }

    async fn compliance(&self) -> ServiceResponse<ComplianceSnapshot> {
        self.transport.get(&["system", "compliance"]).await
    }

    async fn system_load(&self) -> ServiceResponse<f64> {
        self.transport.get(&["system", "load"]).await
    }

    async fn current_allocation(&self) -> ServiceResponse<AllocationSnapshot> {
        self.transport.get(&["resources", "allocation"]).await
    }

    async fn utilization_history(&self) -> ServiceResponse<Vec<UtilizationSample>> {
        self.transport
            .get(&["resources", "utilization-history"])
            .await
    }

    async fn workload_forecast(&self) -> ServiceResponse<WorkloadForecast> {
        self.transport.get(&["resources", "forecast"]).await
    }
}
