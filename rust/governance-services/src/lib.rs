//! Remote service contracts for the data-governance workflow orchestrator.
//!
//! The orchestrator never classifies, trains or reasons by itself. It drives
//! three remote collaborators and one metrics source:
//!
//! - [`ClassificationService`]: frameworks, rules, data sources, per-framework
//!   classification, audit trail and security posture
//! - [`PlatformMonitor`]: health, capacity and resource-allocation telemetry
//! - [`MlService`]: model lookup, training, validation, drift detection and
//!   deployment
//! - [`AiService`]: agent initialization, knowledge loading, reasoning and
//!   explanations
//!
//! Every call returns a [`ServiceResponse`], an explicit success/failure
//! tagged union, instead of a loosely typed `{success, data, message}` map.
//!
//! # Usage
//!
//! ```rust,ignore
//! use governance_services::http::{HttpClassificationService, HttpServiceConfig};
//! use governance_services::ClassificationService;
//!
//! let service = HttpClassificationService::new(&HttpServiceConfig::new("http://classifier:8080"))?;
//! let framework = service.get_framework("nlp-core").await.into_result("get_framework")?;
//! ```

pub mod ai;
pub mod classification;
pub mod error;
pub mod http;
pub mod ml;
pub mod platform;
pub mod response;

// Re-exports
pub use ai::AiService;
pub use classification::{ClassificationItem, ClassificationService};
pub use error::ServiceError;
pub use ml::MlService;
pub use platform::PlatformMonitor;
pub use response::ServiceResponse;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::ai::{
        AgentHandle, AgentInitRequest, AiService, Conclusion, ExplainabilityLevel, Explanation,
        ExplanationRequest, KnowledgeBase, KnowledgeLoadRequest, ReasoningOutput,
        ReasoningRequest,
    };
    pub use crate::classification::{
        AccessCheck, AuditEntry, AuditReceipt, AvailableCapacity, Calibration,
        ClassificationItem, ClassificationRequest, ClassificationRule, ClassificationService,
        DataBatch, DataFormat, DataSourceInfo, FieldSchema, Framework, FrameworkKind,
        MetricsRecord, PermissionDecision, RiskLevel, RuleValidation, Vulnerability,
        VulnerabilitySeverity,
    };
    pub use crate::error::ServiceError;
    pub use crate::ml::{
        DeploymentJob, DeploymentRequest, DriftMonitor, DriftMonitorRequest, EnsembleMethod,
        HyperparameterRequest, HyperparameterResult, MlService, ModelInfo, ModelValidation,
        ModelValidationRequest, TrainingDataRequest, TrainingDataset, TrainingJob,
        TrainingRequest,
    };
    pub use crate::platform::{
        AllocationSnapshot, CapacitySnapshot, ComplianceSnapshot, PerformanceSnapshot,
        PlatformMonitor, ResourceAllocation, SecuritySnapshot, ServiceAvailability, ThreatLevel,
        UtilizationSample, WorkloadForecast,
    };
    pub use crate::response::ServiceResponse;
}
