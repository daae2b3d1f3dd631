//! Hand-written service doubles shared by the integration tests.

#![allow(dead_code, reason = "each test binary uses a subset of the doubles")]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use governance_orchestrator::config::OrchestratorConfig;
use governance_orchestrator::workflow::{
    AiReasoningConfig, ClassificationWorkflowConfig, MlPipelineConfig, MultiVersionWorkflowConfig,
};
use governance_orchestrator::{ServiceSet, WorkflowOrchestrator};
use governance_services::prelude::*;
use serde_json::{json, Value};

pub const SUBJECTS: [&str; 3] = ["r1", "r2", "r3"];

// ============================================================================
// Classification service
// ============================================================================

/// Frameworks with this prefix answer below the default quality threshold.
pub const LENIENT_PREFIX: &str = "lenient";

#[derive(Debug, Default)]
pub struct MockClassification {
    /// Frameworks whose classify calls fail.
    pub failing_frameworks: HashSet<String>,
    /// Fallback declared by a framework.
    pub fallbacks: HashMap<String, String>,
    /// Delay before classify answers.
    pub classify_delay: Duration,
}

impl MockClassification {
    pub fn failing(framework: &str) -> Self {
        Self {
            failing_frameworks: HashSet::from([framework.to_string()]),
            ..Self::default()
        }
    }

    pub fn with_fallback(mut self, framework: &str, fallback: &str) -> Self {
        self.fallbacks
            .insert(framework.to_string(), fallback.to_string());
        self
    }
}

fn framework(id: &str) -> Framework {
    Framework {
        id: id.to_string(),
        name: id.to_uppercase(),
        kind: FrameworkKind::RuleBased,
        version: "1.0".to_string(),
        conflicts_with: Vec::new(),
        max_batch_size: 100,
        recommended_batch_size: 10,
        item_memory_kb: 4,
        item_cpu_millis: 1.0,
        fallback_framework: None,
        calibration: None,
    }
}

#[async_trait]
impl ClassificationService for MockClassification {
    async fn get_framework(&self, framework_id: &str) -> ServiceResponse<Framework> {
        if framework_id.starts_with("unknown") {
            return ServiceResponse::failure(format!("framework {framework_id} not found"), false);
        }
        let mut framework = framework(framework_id);
        framework.fallback_framework = self.fallbacks.get(framework_id).cloned();
        ServiceResponse::success(framework)
    }

    async fn get_rule(&self, rule_id: &str) -> ServiceResponse<ClassificationRule> {
        ServiceResponse::success(ClassificationRule {
            id: rule_id.to_string(),
            name: rule_id.to_string(),
            expression: "contains(text, '@')".to_string(),
            priority: 1,
            estimated_cost: 1.0,
            risk_level: RiskLevel::Low,
            category: Some("pii".to_string()),
        })
    }

    async fn validate_rule(&self, _rule: &ClassificationRule) -> ServiceResponse<RuleValidation> {
        ServiceResponse::success(RuleValidation {
            valid: true,
            message: None,
            estimated_cost: 1.0,
        })
    }

    async fn get_data_source(&self, source_id: &str) -> ServiceResponse<DataSourceInfo> {
        ServiceResponse::success(DataSourceInfo {
            id: source_id.to_string(),
            name: source_id.to_string(),
            format: DataFormat::Json,
            record_count: SUBJECTS.len() as u64,
            sensitive: false,
            encrypted: true,
            secure_transport: true,
            schema: Vec::new(),
        })
    }

    async fn check_data_access(&self, _source_id: &str) -> ServiceResponse<AccessCheck> {
        ServiceResponse::success(AccessCheck {
            accessible: true,
            schema_valid: true,
            message: None,
        })
    }

    async fn load_data(&self, source_id: &str) -> ServiceResponse<DataBatch> {
        ServiceResponse::success(DataBatch {
            source_id: source_id.to_string(),
            format: DataFormat::Json,
            records: SUBJECTS
                .iter()
                .map(|id| json!({ "id": id, "text": format!("customer {id}"), "category": "crm" }))
                .collect(),
        })
    }

    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> ServiceResponse<Vec<ClassificationItem>> {
        if !self.classify_delay.is_zero() {
            tokio::time::sleep(self.classify_delay).await;
        }
        if self.failing_frameworks.contains(&request.framework_id) {
            return ServiceResponse::failure("model server unavailable", true);
        }
        let confidence = if request.framework_id.starts_with(LENIENT_PREFIX) {
            0.6
        } else {
            0.9
        };
        let items = request
            .records
            .iter()
            .filter_map(|record| record.get("id").and_then(Value::as_str))
            .map(|id| ClassificationItem::new(id, "confidential", confidence, ""))
            .collect();
        ServiceResponse::success(items)
    }

    async fn record_metrics(&self, _record: MetricsRecord) -> ServiceResponse<()> {
        ServiceResponse::success(())
    }

    async fn create_audit_entry(&self, _entry: AuditEntry) -> ServiceResponse<AuditReceipt> {
        ServiceResponse::success(AuditReceipt {
            audit_id: "audit-1".to_string(),
        })
    }

    async fn historical_quality_average(&self) -> ServiceResponse<f64> {
        ServiceResponse::success(0.7)
    }

    async fn validate_permissions(
        &self,
        _caller: &str,
        _resources: &[String],
    ) -> ServiceResponse<PermissionDecision> {
        ServiceResponse::success(PermissionDecision {
            granted: true,
            missing: Vec::new(),
        })
    }

    async fn scan_vulnerabilities(&self, _framework_id: &str) -> ServiceResponse<Vec<Vulnerability>> {
        ServiceResponse::success(Vec::new())
    }

    async fn available_capacity(&self) -> ServiceResponse<AvailableCapacity> {
        ServiceResponse::success(AvailableCapacity {
            cpu_cores: 64.0,
            memory_mb: 65_536.0,
        })
    }
}

// ============================================================================
// Platform telemetry
// ============================================================================

#[derive(Debug)]
pub struct MockPlatform {
    pub load: f64,
    /// Every telemetry call fails.
    pub unavailable: bool,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            load: 0.3,
            unavailable: false,
        }
    }
}

impl MockPlatform {
    pub fn unavailable() -> Self {
        Self {
            load: 0.0,
            unavailable: true,
        }
    }

    fn answer<T>(&self, value: T) -> ServiceResponse<T> {
        if self.unavailable {
            ServiceResponse::failure("telemetry backend down", true)
        } else {
            ServiceResponse::success(value)
        }
    }
}

fn allocation(allocated: f64, utilized: f64, cost: f64) -> ResourceAllocation {
    ResourceAllocation {
        allocated,
        utilized,
        reserved: allocated * 0.1,
        cost,
    }
}

#[async_trait]
impl PlatformMonitor for MockPlatform {
    async fn service_availability(&self) -> ServiceResponse<ServiceAvailability> {
        self.answer(ServiceAvailability {
            total_services: 12,
            healthy_services: 12,
        })
    }

    async fn performance(&self) -> ServiceResponse<PerformanceSnapshot> {
        self.answer(PerformanceSnapshot {
            avg_response_time_ms: 100.0,
            error_rate: 0.0,
            throughput: 1_200.0,
        })
    }

    async fn capacity(&self) -> ServiceResponse<CapacitySnapshot> {
        self.answer(CapacitySnapshot {
            cpu_utilization: 70.0,
            memory_utilization: 80.0,
            storage_utilization: 40.0,
        })
    }

    async fn security(&self) -> ServiceResponse<SecuritySnapshot> {
        self.answer(SecuritySnapshot {
            threat_level: ThreatLevel::Low,
            active_threats: 0,
        })
    }

    async fn compliance(&self) -> ServiceResponse<ComplianceSnapshot> {
        self.answer(ComplianceSnapshot {
            compliance_score: 100.0,
            open_violations: 0,
        })
    }

    async fn system_load(&self) -> ServiceResponse<f64> {
        self.answer(self.load)
    }

    async fn current_allocation(&self) -> ServiceResponse<AllocationSnapshot> {
        self.answer(AllocationSnapshot {
            cpu: allocation(64.0, 0.25, 3_200.0),
            memory: allocation(256.0, 0.4, 1_800.0),
            storage: allocation(2_000.0, 0.5, 400.0),
            network: allocation(10.0, 0.9, 600.0),
        })
    }

    async fn utilization_history(&self) -> ServiceResponse<Vec<UtilizationSample>> {
        let now = Utc::now();
        let samples = (0..24)
            .map(|hour| UtilizationSample {
                timestamp: now - ChronoDuration::hours(hour),
                cpu: if hour % 3 == 0 { 0.24 } else { 0.2 },
                memory: 0.4,
                storage: 0.5,
                network: 0.85,
            })
            .collect();
        self.answer(samples)
    }

    async fn workload_forecast(&self) -> ServiceResponse<WorkloadForecast> {
        self.answer(WorkloadForecast {
            cpu: 0.25,
            memory: 0.45,
            storage: 0.5,
            network: 0.95,
            horizon_hours: 24,
        })
    }
}

// ============================================================================
// ML service
// ============================================================================

#[derive(Debug, Default)]
pub struct MockMl {
    /// No model can be loaded.
    pub unavailable: bool,
}

#[async_trait]
impl MlService for MockMl {
    async fn get_model(&self, model_id: &str) -> ServiceResponse<ModelInfo> {
        if self.unavailable {
            return ServiceResponse::failure(format!("model {model_id} not registered"), false);
        }
        ServiceResponse::success(ModelInfo {
            id: model_id.to_string(),
            name: model_id.to_string(),
            version: "3".to_string(),
            algorithm: "gradient_boosting".to_string(),
            baseline_accuracy: 0.88,
        })
    }

    async fn prepare_training_data(
        &self,
        request: TrainingDataRequest,
    ) -> ServiceResponse<TrainingDataset> {
        ServiceResponse::success(TrainingDataset {
            dataset_id: format!("ds-{}", request.source),
            training_records: 800,
            validation_records: 200,
        })
    }

    async fn optimize_hyperparameters(
        &self,
        request: HyperparameterRequest,
    ) -> ServiceResponse<HyperparameterResult> {
        let mut parameters = serde_json::Map::new();
        parameters.insert("learning_rate".to_string(), json!(0.05));
        ServiceResponse::success(HyperparameterResult {
            model_id: request.model_id,
            parameters,
            best_score: 0.91,
        })
    }

    async fn start_training(&self, request: TrainingRequest) -> ServiceResponse<TrainingJob> {
        ServiceResponse::success(TrainingJob {
            job_id: format!("job-{}", request.model_id),
            model_id: request.model_id,
            status: "queued".to_string(),
        })
    }

    async fn validate_model(
        &self,
        request: ModelValidationRequest,
    ) -> ServiceResponse<ModelValidation> {
        let predictions = SUBJECTS
            .iter()
            .map(|id| ClassificationItem::new(*id, "confidential", 0.85, request.model_id.as_str()))
            .collect();
        ServiceResponse::success(ModelValidation {
            model_id: request.model_id,
            accuracy: 0.9,
            predictions,
        })
    }

    async fn setup_drift_detection(
        &self,
        request: DriftMonitorRequest,
    ) -> ServiceResponse<DriftMonitor> {
        ServiceResponse::success(DriftMonitor {
            monitor_id: format!("drift-{}", request.execution_id),
        })
    }

    async fn deploy(&self, request: DeploymentRequest) -> ServiceResponse<DeploymentJob> {
        ServiceResponse::success(DeploymentJob {
            deployment_id: format!("deploy-{}", request.execution_id),
            endpoint: Some("http://models.internal/ensemble".to_string()),
        })
    }
}

// ============================================================================
// AI service
// ============================================================================

#[derive(Debug, Default)]
pub struct MockAi {
    /// Delay before reasoning answers.
    pub reasoning_delay: Duration,
}

#[async_trait]
impl AiService for MockAi {
    async fn initialize_agents(&self, request: AgentInitRequest) -> ServiceResponse<AgentHandle> {
        ServiceResponse::success(AgentHandle {
            session_id: format!("session-{}", request.execution_id),
            agent_ids: vec!["agent-1".to_string()],
        })
    }

    async fn load_knowledge(&self, request: KnowledgeLoadRequest) -> ServiceResponse<KnowledgeBase> {
        ServiceResponse::success(KnowledgeBase {
            knowledge_base_id: format!("kb-{}", request.session_id),
            loaded_sources: request.sources,
        })
    }

    async fn reason(&self, _request: ReasoningRequest) -> ServiceResponse<ReasoningOutput> {
        if !self.reasoning_delay.is_zero() {
            tokio::time::sleep(self.reasoning_delay).await;
        }
        let conclusions = SUBJECTS
            .iter()
            .map(|id| Conclusion {
                subject_id: (*id).to_string(),
                label: "confidential".to_string(),
                confidence: 0.8,
                rationale: "contains customer identifiers".to_string(),
                agent_id: "agent-1".to_string(),
            })
            .collect();
        ServiceResponse::success(ReasoningOutput { conclusions })
    }

    async fn explain(&self, request: ExplanationRequest) -> ServiceResponse<Vec<Explanation>> {
        let explanations = request
            .subject_ids
            .into_iter()
            .map(|subject_id| Explanation {
                subject_id,
                text: "Identifier field matched a customer schema".to_string(),
                factors: vec!["schema".to_string()],
            })
            .collect();
        ServiceResponse::success(explanations)
    }
}

// ============================================================================
// Builders
// ============================================================================

#[derive(Debug, Default)]
pub struct Doubles {
    pub classification: MockClassification,
    pub platform: MockPlatform,
    pub ml: MockMl,
    pub ai: MockAi,
}

impl Doubles {
    pub fn services(self) -> ServiceSet {
        ServiceSet {
            classification: Arc::new(self.classification),
            platform: Arc::new(self.platform),
            ml: Arc::new(self.ml),
            ai: Arc::new(self.ai),
        }
    }

    pub fn orchestrator(self) -> Arc<WorkflowOrchestrator> {
        Arc::new(WorkflowOrchestrator::new(
            self.services(),
            &OrchestratorConfig::default(),
        ))
    }
}

pub fn classification_config(frameworks: &[&str]) -> ClassificationWorkflowConfig {
    serde_json::from_value(json!({
        "frameworks": frameworks,
        "rules": ["email-detector"],
        "data_source": "crm-customers",
        "quality_threshold": 0.7,
        "audit_enabled": true
    }))
    .unwrap()
}

pub fn ml_config() -> MlPipelineConfig {
    serde_json::from_value(json!({
        "model_ids": ["gbm", "forest"],
        "training_data": "crm-customers",
        "hyperparameter_optimization": true,
        "drift_detection": true
    }))
    .unwrap()
}

pub fn ai_config() -> AiReasoningConfig {
    serde_json::from_value(json!({
        "knowledge_sources": ["gdpr-policies"],
        "explainability_level": "detailed",
        "confidence_threshold": 0.6
    }))
    .unwrap()
}

pub fn multi_version_config(strategy: &str) -> MultiVersionWorkflowConfig {
    MultiVersionWorkflowConfig {
        v1_config: classification_config(&["nlp-core"]),
        v2_config: ml_config(),
        v3_config: ai_config(),
        orchestration_strategy: serde_json::from_value(json!(strategy)).unwrap(),
        consensus_algorithm: serde_json::from_value(json!("majority")).unwrap(),
        quality_assurance: true,
    }
}
