//! Classification service contract.
//!
//! Covers framework and rule lookup, data-source access, per-framework
//! classification, audit entries and the security queries used by
//! pre-flight validation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::response::ServiceResponse;

/// Family of a classification framework, which decides data preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkKind {
    /// Text classification; records are tokenized.
    Nlp,
    /// Tabular classification; numeric fields are normalized.
    Structured,
    /// Image classification; records are resized.
    Vision,
    /// Pure rule evaluation, no preparation.
    RuleBased,
}

/// Confidence calibration declared by a framework.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Calibration {
    /// Temperature scaling in logit space.
    Temperature { temperature: f64 },
    /// Platt scaling: `sigmoid(a * p + b)`.
    Platt { a: f64, b: f64 },
    /// Linear scaling, clamped to `[0, 1]`.
    Scale { factor: f64 },
}

impl Calibration {
    /// Calibrate a raw confidence. The result is always within `[0, 1]`.
    #[must_use]
    pub fn apply(&self, confidence: f64) -> f64 {
        let p = confidence.clamp(0.0, 1.0);
        let calibrated = match *self {
            Self::Temperature { temperature } => {
                if temperature <= 0.0 {
                    return p;
                }
                let p = p.clamp(1e-6, 1.0 - 1e-6);
                let logit = (p / (1.0 - p)).ln();
                sigmoid(logit / temperature)
            }
            Self::Platt { a, b } => sigmoid(a * p + b),
            Self::Scale { factor } => p * factor,
        };
        calibrated.clamp(0.0, 1.0)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// A classification framework registered with the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    pub id: String,
    pub name: String,
    pub kind: FrameworkKind,
    #[serde(default)]
    pub version: String,
    /// Frameworks that cannot run in the same workflow.
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    pub max_batch_size: usize,
    pub recommended_batch_size: usize,
    /// Estimated memory cost per item, in kilobytes.
    pub item_memory_kb: u64,
    /// Estimated CPU cost per item, in milliseconds of one core.
    #[serde(default)]
    pub item_cpu_millis: f64,
    /// Framework used once when this one fails.
    #[serde(default)]
    pub fallback_framework: Option<String>,
    #[serde(default)]
    pub calibration: Option<Calibration>,
}

/// Qualitative risk attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A classification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub id: String,
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub priority: i32,
    /// Estimated evaluation cost per record (relative units).
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default = "default_risk")]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_risk() -> RiskLevel {
    RiskLevel::Low
}

/// Outcome of a remote rule syntax check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleValidation {
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub estimated_cost: f64,
}

/// Storage format of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Json,
    Csv,
    Text,
    Image,
}

/// A field in a data-source schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: String,
}

/// Descriptor of a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub format: DataFormat,
    pub record_count: u64,
    /// Holds regulated or personal data.
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub encrypted: bool,
    /// Data moves over TLS or an equivalent channel.
    #[serde(default)]
    pub secure_transport: bool,
    #[serde(default)]
    pub schema: Vec<FieldSchema>,
}

/// Result of a data-source access check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessCheck {
    pub accessible: bool,
    pub schema_valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Raw records loaded from a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBatch {
    pub source_id: String,
    pub format: DataFormat,
    pub records: Vec<serde_json::Value>,
}

/// Request to classify a batch of records with one framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub execution_id: String,
    pub framework_id: String,
    pub records: Vec<serde_json::Value>,
    pub rules: Vec<ClassificationRule>,
    pub batch_size: usize,
    pub real_time: bool,
    pub timeout_secs: u64,
}

/// One labelled subject produced by a framework, model or agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationItem {
    /// Identifier of the classified subject (record).
    pub id: String,
    pub label: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Framework, model or agent that produced the item.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ClassificationItem {
    /// Create an item with the current timestamp.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            confidence,
            category: None,
            score: None,
            timestamp: Utc::now(),
            source: source.into(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Attach an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Metrics reported back to the classification service after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub execution_id: String,
    pub workflow_type: String,
    pub item_count: usize,
    pub throughput: f64,
    pub accuracy: f64,
    pub latency_ms: f64,
    pub quality_score: f64,
}

/// Audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub execution_id: String,
    pub action: String,
    pub actor: String,
    pub frameworks: Vec<String>,
    pub data_source: String,
    pub result_count: usize,
    pub quality_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Receipt returned for a stored audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReceipt {
    pub audit_id: String,
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub granted: bool,
    #[serde(default)]
    pub missing: Vec<String>,
}

/// Severity of a reported vulnerability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilitySeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A vulnerability reported for a framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub severity: VulnerabilitySeverity,
    #[serde(default)]
    pub description: String,
}

/// Compute capacity currently available to classification jobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvailableCapacity {
    pub cpu_cores: f64,
    pub memory_mb: f64,
}

/// Remote classification service.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Look up a framework by id.
    async fn get_framework(&self, framework_id: &str) -> ServiceResponse<Framework>;

    /// Look up a rule by id.
    async fn get_rule(&self, rule_id: &str) -> ServiceResponse<ClassificationRule>;

    /// Check rule syntax and estimate its evaluation cost.
    async fn validate_rule(&self, rule: &ClassificationRule) -> ServiceResponse<RuleValidation>;

    /// Describe a data source.
    async fn get_data_source(&self, source_id: &str) -> ServiceResponse<DataSourceInfo>;

    /// Check access and schema validity of a data source.
    async fn check_data_access(&self, source_id: &str) -> ServiceResponse<AccessCheck>;

    /// Load the records of a data source.
    async fn load_data(&self, source_id: &str) -> ServiceResponse<DataBatch>;

    /// Classify records with one framework.
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> ServiceResponse<Vec<ClassificationItem>>;

    /// Record execution metrics.
    async fn record_metrics(&self, record: MetricsRecord) -> ServiceResponse<()>;

    /// Store an audit entry.
    async fn create_audit_entry(&self, entry: AuditEntry) -> ServiceResponse<AuditReceipt>;

    /// Average quality threshold used by past workflows.
    async fn historical_quality_average(&self) -> ServiceResponse<f64>;

    /// Check that a caller may touch the given resources.
    async fn validate_permissions(
        &self,
        caller: &str,
        resources: &[String],
    ) -> ServiceResponse<PermissionDecision>;

    /// Known vulnerabilities of a framework.
    async fn scan_vulnerabilities(&self, framework_id: &str)
        -> ServiceResponse<Vec<Vulnerability>>;

    /// Capacity available for new jobs.
    async fn available_capacity(&self) -> ServiceResponse<AvailableCapacity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_calibration_softens() {
        let calibration = Calibration::Temperature { temperature: 2.0 };
        let calibrated = calibration.apply(0.9);
        assert!(calibrated < 0.9);
        assert!(calibrated > 0.5);
    }

    #[test]
    fn test_temperature_calibration_identity() {
        let calibration = Calibration::Temperature { temperature: 1.0 };
        assert!((calibration.apply(0.73) - 0.73).abs() < 1e-9);
    }

    #[test]
    fn test_platt_and_scale_stay_in_range() {
        let platt = Calibration::Platt { a: 10.0, b: -5.0 };
        assert!((platt.apply(0.5) - 0.5).abs() < 1e-9);
        assert!(platt.apply(1.0) <= 1.0);

        let scale = Calibration::Scale { factor: 1.5 };
        assert!((scale.apply(0.9) - 1.0).abs() < f64::EPSILON);
        assert!((scale.apply(0.4) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_calibration_deserialization() {
        let calibration: Calibration =
            serde_json::from_value(serde_json::json!({"method": "scale", "factor": 0.5})).unwrap();
        assert_eq!(calibration, Calibration::Scale { factor: 0.5 });
    }

    #[test]
    fn test_item_builder() {
        let item = ClassificationItem::new("rec-1", "pii", 0.92, "nlp-core")
            .with_category("personal")
            .with_attribute("rule", serde_json::json!("email"));
        assert_eq!(item.category.as_deref(), Some("personal"));
        assert_eq!(item.attributes["rule"], "email");
    }
}
