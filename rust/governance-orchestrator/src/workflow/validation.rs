//! Pre-flight validation of workflow configurations.
//!
//! Classification configs go through six independent checks run
//! concurrently. Critical and high findings block the run; medium and low
//! findings are kept as warnings on the execution. A check whose remote
//! dependency fails reports a medium finding instead of blocking, except
//! the quality range check which never calls a service.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use governance_services::classification::{
    ClassificationRule, ClassificationService, Framework, RiskLevel, VulnerabilitySeverity,
};
use governance_services::ServiceResponse;

use super::configs::{AiReasoningConfig, ClassificationWorkflowConfig, MlPipelineConfig};
use super::execution::{ExecutionError, Severity};
use crate::config::{ExecutionConfig, ValidationConfig};
use crate::error::OrchestratorError;

/// Message of the empty-frameworks finding.
pub const NO_FRAMEWORKS_MESSAGE: &str =
    "Configuration must include at least one classification framework";

/// Check that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCheck {
    Frameworks,
    Rules,
    DataSource,
    QualityThreshold,
    Security,
    ResourceCapacity,
    MlPipeline,
    AiReasoning,
}

impl std::fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frameworks => write!(f, "frameworks"),
            Self::Rules => write!(f, "rules"),
            Self::DataSource => write!(f, "data_source"),
            Self::QualityThreshold => write!(f, "quality_threshold"),
            Self::Security => write!(f, "security"),
            Self::ResourceCapacity => write!(f, "resource_capacity"),
            Self::MlPipeline => write!(f, "ml_pipeline"),
            Self::AiReasoning => write!(f, "ai_reasoning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFinding {
    pub check: ValidationCheck,
    pub severity: Severity,
    pub message: String,
}

impl ValidationFinding {
    #[must_use]
    pub fn new(check: ValidationCheck, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check,
            severity,
            message: message.into(),
        }
    }

    /// Warning entry for the execution's error list.
    #[must_use]
    pub fn into_execution_error(self) -> ExecutionError {
        ExecutionError::new("VALIDATION_WARNING", self.message, self.severity)
            .with_context("check", self.check.to_string())
    }
}

/// Verdict of a validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    /// Blocking messages joined with `"; "`, or a summary when valid.
    pub message: String,
    pub findings: Vec<ValidationFinding>,
}

impl ValidationOutcome {
    #[must_use]
    pub fn from_findings(findings: Vec<ValidationFinding>) -> Self {
        let blocking: Vec<&str> = findings
            .iter()
            .filter(|f| f.severity.is_blocking())
            .map(|f| f.message.as_str())
            .collect();

        let (is_valid, message) = if blocking.is_empty() {
            let warnings = findings.len();
            let message = if warnings == 0 {
                "Configuration is valid".to_string()
            } else {
                format!("Configuration is valid with {warnings} warning(s)")
            };
            (true, message)
        } else {
            (false, blocking.join("; "))
        };

        Self {
            is_valid,
            message,
            findings,
        }
    }

    /// Non-blocking findings.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| !f.severity.is_blocking())
    }

    /// `Err(Validation)` carrying the composite message when invalid.
    pub fn into_result(self) -> Result<Vec<ValidationFinding>, OrchestratorError> {
        if self.is_valid {
            Ok(self.findings)
        } else {
            Err(OrchestratorError::Validation(self.message))
        }
    }
}

/// Checks that need no remote service.
#[must_use]
pub fn classification_preflight(config: &ClassificationWorkflowConfig) -> ValidationOutcome {
    let mut findings = Vec::new();
    if config.frameworks.is_empty() {
        findings.push(ValidationFinding::new(
            ValidationCheck::Frameworks,
            Severity::Critical,
            NO_FRAMEWORKS_MESSAGE,
        ));
    }
    if config.data_source.trim().is_empty() {
        findings.push(ValidationFinding::new(
            ValidationCheck::DataSource,
            Severity::Critical,
            "Configuration must name a data source",
        ));
    }
    findings.extend(quality_range_finding(config.quality_threshold));
    ValidationOutcome::from_findings(findings)
}

fn quality_range_finding(threshold: f64) -> Option<ValidationFinding> {
    (!(0.0..=1.0).contains(&threshold)).then(|| {
        ValidationFinding::new(
            ValidationCheck::QualityThreshold,
            Severity::Critical,
            format!("Quality threshold {threshold} must be between 0 and 1"),
        )
    })
}

/// Validate an ML pipeline configuration.
#[must_use]
pub fn validate_ml(config: &MlPipelineConfig) -> ValidationOutcome {
    let mut findings = Vec::new();
    let mut critical = |message: String| {
        findings.push(ValidationFinding::new(
            ValidationCheck::MlPipeline,
            Severity::Critical,
            message,
        ));
    };

    if config.model_ids.is_empty() {
        critical("ML pipeline must include at least one model".to_string());
    }
    if config.training_data.trim().is_empty() {
        critical("ML pipeline must name a training data source".to_string());
    }
    if !(config.validation_split > 0.0 && config.validation_split < 1.0) {
        critical(format!(
            "Validation split {} must be strictly between 0 and 1",
            config.validation_split
        ));
    }
    if !(0.0..=1.0).contains(&config.performance_threshold) {
        critical(format!(
            "Performance threshold {} must be between 0 and 1",
            config.performance_threshold
        ));
    }
    ValidationOutcome::from_findings(findings)
}

/// Validate an AI reasoning configuration.
#[must_use]
pub fn validate_ai(config: &AiReasoningConfig) -> ValidationOutcome {
    let mut findings = Vec::new();
    if config.reasoning_depth == 0 {
        findings.push(ValidationFinding::new(
            ValidationCheck::AiReasoning,
            Severity::Critical,
            "Reasoning depth must be at least 1",
        ));
    }
    if !(0.0..=1.0).contains(&config.confidence_threshold) {
        findings.push(ValidationFinding::new(
            ValidationCheck::AiReasoning,
            Severity::Critical,
            format!(
                "Confidence threshold {} must be between 0 and 1",
                config.confidence_threshold
            ),
        ));
    }
    if config.knowledge_sources.is_empty() {
        findings.push(ValidationFinding::new(
            ValidationCheck::AiReasoning,
            Severity::Critical,
            "AI reasoning must include at least one knowledge source",
        ));
    }
    ValidationOutcome::from_findings(findings)
}

/// Runs the six classification checks.
pub struct ValidationPipeline {
    classification: Arc<dyn ClassificationService>,
    limits: ValidationConfig,
    execution: ExecutionConfig,
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl ValidationPipeline {
    #[must_use]
    pub fn new(
        classification: Arc<dyn ClassificationService>,
        limits: ValidationConfig,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            classification,
            limits,
            execution,
        }
    }

    /// Run every check concurrently and aggregate the findings.
    pub async fn validate(
        &self,
        config: &ClassificationWorkflowConfig,
        caller: &str,
    ) -> ValidationOutcome {
        let (frameworks, rules, data_source, quality, security, capacity) = futures::join!(
            self.check_frameworks(config),
            self.check_rules(config),
            self.check_data_source(config),
            self.check_quality(config),
            self.check_security(config, caller),
            self.check_capacity(config),
        );

        let findings: Vec<ValidationFinding> = [frameworks, rules, data_source, quality, security, capacity]
            .into_iter()
            .flatten()
            .collect();

        let outcome = ValidationOutcome::from_findings(findings);
        tracing::debug!(
            data_source = %config.data_source,
            is_valid = outcome.is_valid,
            findings = outcome.findings.len(),
            "Validation finished"
        );
        outcome
    }

    async fn load_frameworks(
        &self,
        ids: &[String],
    ) -> Vec<(String, ServiceResponse<Framework>)> {
        let responses = join_all(ids.iter().map(|id| self.classification.get_framework(id))).await;
        ids.iter().cloned().zip(responses).collect()
    }

    async fn check_frameworks(&self, config: &ClassificationWorkflowConfig) -> Vec<ValidationFinding> {
        use ValidationCheck::Frameworks;

        if config.frameworks.is_empty() {
            return vec![ValidationFinding::new(Frameworks, Severity::Critical, NO_FRAMEWORKS_MESSAGE)];
        }

        let mut findings = Vec::new();
        let mut loaded = Vec::new();
        for (id, response) in self.load_frameworks(&config.frameworks).await {
            match response {
                ServiceResponse::Success(framework) => loaded.push(framework),
                ServiceResponse::Failure {
                    error,
                    retryable: false,
                } => findings.push(ValidationFinding::new(
                    Frameworks,
                    Severity::Critical,
                    format!("Unknown classification framework '{id}': {error}"),
                )),
                ServiceResponse::Failure { error, .. } => findings.push(ValidationFinding::new(
                    Frameworks,
                    Severity::Medium,
                    format!("Framework check could not verify '{id}': {error}"),
                )),
            }
        }

        for (i, a) in loaded.iter().enumerate() {
            for b in &loaded[i + 1..] {
                if a.conflicts_with.contains(&b.id) || b.conflicts_with.contains(&a.id) {
                    findings.push(ValidationFinding::new(
                        Frameworks,
                        Severity::High,
                        format!("Frameworks '{}' and '{}' conflict", a.id, b.id),
                    ));
                }
            }
        }
        findings
    }

    async fn check_rules(&self, config: &ClassificationWorkflowConfig) -> Vec<ValidationFinding> {
        let checks = config.rules.iter().map(|id| self.check_rule(id));
        join_all(checks).await.into_iter().flatten().collect()
    }

    async fn check_rule(&self, id: &str) -> Option<ValidationFinding> {
        use ValidationCheck::Rules;

        let rule = match self.classification.get_rule(id).await {
            ServiceResponse::Success(rule) => rule,
            ServiceResponse::Failure {
                error,
                retryable: false,
            } => {
                return Some(ValidationFinding::new(
                    Rules,
                    Severity::High,
                    format!("Unknown classification rule '{id}': {error}"),
                ))
            }
            ServiceResponse::Failure { error, .. } => {
                return Some(ValidationFinding::new(
                    Rules,
                    Severity::Medium,
                    format!("Rule check could not load '{id}': {error}"),
                ))
            }
        };

        match self.classification.validate_rule(&rule).await {
            ServiceResponse::Success(result) if !result.valid => Some(ValidationFinding::new(
                Rules,
                Severity::High,
                format!(
                    "Rule '{id}' failed syntax validation: {}",
                    result.message.as_deref().unwrap_or("invalid expression")
                ),
            )),
            ServiceResponse::Success(result) => {
                let cost = if result.estimated_cost > 0.0 {
                    result.estimated_cost
                } else {
                    rule.estimated_cost
                };
                (cost > self.limits.max_rule_cost).then(|| {
                    ValidationFinding::new(
                        Rules,
                        Severity::Medium,
                        format!(
                            "Rule '{id}' estimated cost {cost} exceeds limit {}",
                            self.limits.max_rule_cost
                        ),
                    )
                })
            }
            ServiceResponse::Failure { error, .. } => Some(ValidationFinding::new(
                Rules,
                Severity::Medium,
                format!("Rule check could not validate '{id}': {error}"),
            )),
        }
    }

    async fn check_data_source(&self, config: &ClassificationWorkflowConfig) -> Vec<ValidationFinding> {
        use ValidationCheck::DataSource;

        let source = &config.data_source;
        if source.trim().is_empty() {
            return vec![ValidationFinding::new(
                DataSource,
                Severity::Critical,
                "Configuration must name a data source",
            )];
        }

        match self.classification.check_data_access(source).await {
            ServiceResponse::Success(access) if !access.accessible => vec![ValidationFinding::new(
                DataSource,
                Severity::Critical,
                format!(
                    "Data source '{source}' is not accessible: {}",
                    access.message.as_deref().unwrap_or("access denied")
                ),
            )],
            ServiceResponse::Success(access) if !access.schema_valid => vec![ValidationFinding::new(
                DataSource,
                Severity::High,
                format!("Data source '{source}' has an invalid schema"),
            )],
            ServiceResponse::Success(_) => Vec::new(),
            ServiceResponse::Failure { error, .. } => vec![ValidationFinding::new(
                DataSource,
                Severity::Medium,
                format!("Data source '{source}' could not be checked: {error}"),
            )],
        }
    }

    async fn check_quality(&self, config: &ClassificationWorkflowConfig) -> Vec<ValidationFinding> {
        use ValidationCheck::QualityThreshold;

        let threshold = config.quality_threshold;
        if let Some(finding) = quality_range_finding(threshold) {
            return vec![finding];
        }

        match self.classification.historical_quality_average().await {
            ServiceResponse::Success(average)
                if (threshold - average).abs() > self.limits.quality_drift_tolerance =>
            {
                vec![ValidationFinding::new(
                    QualityThreshold,
                    Severity::Medium,
                    format!(
                        "Quality threshold {threshold} drifts from historical average {average:.2}"
                    ),
                )]
            }
            ServiceResponse::Success(_) => Vec::new(),
            ServiceResponse::Failure { error, .. } => vec![ValidationFinding::new(
                QualityThreshold,
                Severity::Medium,
                format!("Quality check could not load the historical average: {error}"),
            )],
        }
    }

    async fn check_security(
        &self,
        config: &ClassificationWorkflowConfig,
        caller: &str,
    ) -> Vec<ValidationFinding> {
        use ValidationCheck::Security;

        let resources: Vec<String> = config
            .frameworks
            .iter()
            .chain(&config.rules)
            .chain(std::iter::once(&config.data_source))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (source, vulnerabilities, rules, permissions) = futures::join!(
            self.classification.get_data_source(&config.data_source),
            join_all(
                config
                    .frameworks
                    .iter()
                    .map(|id| self.classification.scan_vulnerabilities(id))
            ),
            join_all(config.rules.iter().map(|id| self.classification.get_rule(id))),
            self.classification.validate_permissions(caller, &resources),
        );

        let mut findings = Vec::new();

        match source {
            ServiceResponse::Success(info) => {
                let name = &info.id;
                if info.sensitive && !config.audit_enabled {
                    findings.push(ValidationFinding::new(
                        Security,
                        Severity::High,
                        format!("Sensitive data source '{name}' requires audit logging"),
                    ));
                }
                if info.sensitive && !info.encrypted {
                    findings.push(ValidationFinding::new(
                        Security,
                        Severity::High,
                        format!("Sensitive data source '{name}' is not encrypted"),
                    ));
                }
                if !info.secure_transport {
                    let severity = if info.sensitive {
                        Severity::High
                    } else {
                        Severity::Medium
                    };
                    findings.push(ValidationFinding::new(
                        Security,
                        severity,
                        format!("Data source '{name}' does not use secure transport"),
                    ));
                }
            }
            ServiceResponse::Failure { error, .. } => findings.push(ValidationFinding::new(
                Security,
                Severity::Medium,
                format!("Security check could not describe the data source: {error}"),
            )),
        }

        for (framework, scan) in config.frameworks.iter().zip(vulnerabilities) {
            match scan {
                ServiceResponse::Success(found) => {
                    findings.extend(found.into_iter().map(|v| {
                        let severity = match v.severity {
                            VulnerabilitySeverity::High | VulnerabilitySeverity::Critical => {
                                Severity::High
                            }
                            VulnerabilitySeverity::Low | VulnerabilitySeverity::Medium => {
                                Severity::Medium
                            }
                        };
                        ValidationFinding::new(
                            Security,
                            severity,
                            format!(
                                "Framework '{framework}' has vulnerability {}: {}",
                                v.id, v.description
                            ),
                        )
                    }));
                }
                ServiceResponse::Failure { error, .. } => findings.push(ValidationFinding::new(
                    Security,
                    Severity::Medium,
                    format!("Security check could not scan framework '{framework}': {error}"),
                )),
            }
        }

        // Unknown rules are reported by the rules check.
        findings.extend(
            rules
                .into_iter()
                .filter_map(ServiceResponse::ok)
                .filter(|rule: &ClassificationRule| rule.risk_level == RiskLevel::High)
                .map(|rule| {
                    ValidationFinding::new(
                        Security,
                        Severity::Medium,
                        format!("Rule '{}' carries high risk", rule.id),
                    )
                }),
        );

        match permissions {
            ServiceResponse::Success(decision) if !decision.granted => {
                findings.push(ValidationFinding::new(
                    Security,
                    Severity::Critical,
                    format!(
                        "Caller '{caller}' lacks permission for: {}",
                        if decision.missing.is_empty() {
                            "requested resources".to_string()
                        } else {
                            decision.missing.join(", ")
                        }
                    ),
                ));
            }
            ServiceResponse::Success(_) => {}
            ServiceResponse::Failure { error, .. } => findings.push(ValidationFinding::new(
                Security,
                Severity::Medium,
                format!("Security check could not verify permissions: {error}"),
            )),
        }

        findings
    }

    async fn check_capacity(&self, config: &ClassificationWorkflowConfig) -> Vec<ValidationFinding> {
        use ValidationCheck::ResourceCapacity;

        if config.frameworks.is_empty() {
            return Vec::new();
        }

        let (source, frameworks, available) = futures::join!(
            self.classification.get_data_source(&config.data_source),
            self.load_frameworks(&config.frameworks),
            self.classification.available_capacity(),
        );

        let (info, available) = match (source, available) {
            (ServiceResponse::Success(info), ServiceResponse::Success(available)) => (info, available),
            (ServiceResponse::Failure { error, .. }, _) | (_, ServiceResponse::Failure { error, .. }) => {
                return vec![ValidationFinding::new(
                    ResourceCapacity,
                    Severity::Medium,
                    format!("Capacity check could not estimate resource needs: {error}"),
                )]
            }
        };

        // Unknown frameworks are reported by the frameworks check.
        let frameworks: Vec<Framework> = frameworks
            .into_iter()
            .filter_map(|(_, response)| response.ok())
            .collect();
        let estimate = estimate_resources(info.record_count, &frameworks, &self.execution);

        let ratio = self.limits.capacity_ratio;
        let mut findings = Vec::new();
        if estimate.memory_mb > ratio * available.memory_mb {
            findings.push(ValidationFinding::new(
                ResourceCapacity,
                Severity::High,
                format!(
                    "Estimated memory {:.0} MB exceeds {:.0}% of available {:.0} MB",
                    estimate.memory_mb,
                    ratio * 100.0,
                    available.memory_mb
                ),
            ));
        }
        if estimate.cpu_cores > ratio * available.cpu_cores {
            findings.push(ValidationFinding::new(
                ResourceCapacity,
                Severity::High,
                format!(
                    "Estimated CPU {:.2} cores exceeds {:.0}% of available {:.2} cores",
                    estimate.cpu_cores,
                    ratio * 100.0,
                    available.cpu_cores
                ),
            ));
        }
        findings
    }
}

/// Resources needed to classify a data source with a set of frameworks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceEstimate {
    pub memory_mb: f64,
    /// Sustained cores needed to finish within the batch timeout.
    pub cpu_cores: f64,
}

/// Estimate resources for `records × frameworks`.
#[must_use]
#[allow(clippy::cast_precision_loss, reason = "record counts are far below 2^52")]
pub fn estimate_resources(
    records: u64,
    frameworks: &[Framework],
    execution: &ExecutionConfig,
) -> ResourceEstimate {
    let records = records as f64;
    let memory_mb = frameworks
        .iter()
        .map(|f| records * f.item_memory_kb as f64 / 1024.0)
        .sum();
    let window_secs = execution.batch_timeout_secs.max(1) as f64;
    let cpu_cores = frameworks
        .iter()
        .map(|f| records * f.item_cpu_millis / 1000.0 / window_secs)
        .sum();
    ResourceEstimate {
        memory_mb,
        cpu_cores,
    }
}
