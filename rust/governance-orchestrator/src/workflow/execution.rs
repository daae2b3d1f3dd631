//! Execution records.
//!
//! A [`WorkflowExecution`] is created by the orchestrator, mutated only by
//! the [`ExecutionTracker`](super::ExecutionTracker) that drives it, and
//! read by everybody else as a snapshot from the repository.

use chrono::{DateTime, Utc};
use governance_services::ClassificationItem;
use serde::{Deserialize, Serialize};

use super::output::FormattedOutput;

/// Kind of workflow an execution runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Classification,
    MlPipeline,
    AiReasoning,
    MultiVersion,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classification => write!(f, "classification"),
            Self::MlPipeline => write!(f, "ml_pipeline"),
            Self::AiReasoning => write!(f, "ai_reasoning"),
            Self::MultiVersion => write!(f, "multi_version"),
        }
    }
}

impl std::str::FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classification" => Ok(Self::Classification),
            "ml_pipeline" | "ml" => Ok(Self::MlPipeline),
            "ai_reasoning" | "ai" => Ok(Self::AiReasoning),
            "multi_version" | "multi-version" => Ok(Self::MultiVersion),
            _ => Err(format!("Unknown workflow kind: {s}")),
        }
    }
}

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Registered, not started yet.
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Completed and failed executions never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown execution status: {s}")),
        }
    }
}

/// Severity of an [`ExecutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical findings block execution.
    #[must_use]
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A problem observed while running a workflow. Errors accumulate and are
/// never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub recoverable: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionError {
    /// Create an error. Everything below critical is recoverable by default.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            recoverable: severity != Severity::Critical,
            timestamp: Utc::now(),
            context: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Resource consumption of an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu: f64,
    pub memory: f64,
    pub network: f64,
    pub storage: f64,
}

/// Execution metrics. All start at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Items per second.
    pub throughput: f64,
    pub accuracy: f64,
    /// Wall-clock latency in milliseconds.
    pub latency: f64,
    pub resource_usage: ResourceUsage,
    pub quality_score: f64,
    pub cost_efficiency: f64,
}

/// Per-version results of a multi-version run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionResults {
    /// Rule-based classification.
    pub v1: Vec<ClassificationItem>,
    /// ML pipeline.
    pub v2: Vec<ClassificationItem>,
    /// AI reasoning.
    pub v3: Vec<ClassificationItem>,
}

/// A workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub kind: WorkflowKind,
    pub status: ExecutionStatus,
    /// Percent complete, never decreasing.
    pub progress: f64,
    pub current_step: String,
    /// Final items. For multi-version runs, the consensus.
    pub results: Vec<ClassificationItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_results: Option<VersionResults>,
    pub metrics: ExecutionMetrics,
    pub errors: Vec<ExecutionError>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub output: Option<FormattedOutput>,
    /// Multi-version parent of a child run.
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl WorkflowExecution {
    /// Create a pending execution with a fresh UUID v4 id.
    #[must_use]
    pub fn new(kind: WorkflowKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            status: ExecutionStatus::Pending,
            progress: 0.0,
            current_step: "pending".to_string(),
            results: Vec::new(),
            version_results: None,
            metrics: ExecutionMetrics::default(),
            errors: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            estimated_completion: None,
            output: None,
            parent_id: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    #[must_use]
    pub fn has_critical_error(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.severity == Severity::Critical)
    }

    /// Errors of the given severity.
    pub fn errors_with(&self, severity: Severity) -> impl Iterator<Item = &ExecutionError> {
        self.errors.iter().filter(move |e| e.severity == severity)
    }
}
