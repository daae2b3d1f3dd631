//! Workflow configurations submitted by callers.
//!
//! Configurations are immutable once submitted; pipelines hold them behind
//! an `Arc` and only read them.

use governance_services::ai::ExplainabilityLevel;
use governance_services::ml::EnsembleMethod;
use serde::{Deserialize, Serialize};

fn default_output_format() -> String {
    "json".to_string()
}

fn default_quality_threshold() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

/// Rule-based classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationWorkflowConfig {
    /// Free-form label of the workflow, echoed in audit entries and metrics.
    #[serde(default = "default_workflow_type")]
    pub workflow_type: String,
    /// Framework ids, in declared order.
    #[serde(default)]
    pub frameworks: Vec<String>,
    /// Rule ids.
    #[serde(default)]
    pub rules: Vec<String>,
    /// Data-source id.
    pub data_source: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default)]
    pub real_time_processing: bool,
    /// Minimum confidence kept, within `[0, 1]`.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_true")]
    pub parallel_processing: bool,
    #[serde(default)]
    pub audit_enabled: bool,
}

fn default_workflow_type() -> String {
    "classification".to_string()
}

/// ML training, validation and deployment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPipelineConfig {
    #[serde(default)]
    pub model_ids: Vec<String>,
    /// Training data source.
    pub training_data: String,
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    #[serde(default)]
    pub hyperparameter_optimization: bool,
    #[serde(default = "default_ensemble_method")]
    pub ensemble_method: EnsembleMethod,
    #[serde(default)]
    pub drift_detection: bool,
    #[serde(default)]
    pub auto_retraining: bool,
    /// Minimum acceptable ensemble accuracy.
    #[serde(default = "default_performance_threshold")]
    pub performance_threshold: f64,
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_ensemble_method() -> EnsembleMethod {
    EnsembleMethod::Voting
}

fn default_performance_threshold() -> f64 {
    0.8
}

/// AI reasoning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReasoningConfig {
    #[serde(default)]
    pub conversation_context: Option<String>,
    #[serde(default = "default_reasoning_depth")]
    pub reasoning_depth: u32,
    #[serde(default = "default_explainability")]
    pub explainability_level: ExplainabilityLevel,
    #[serde(default)]
    pub knowledge_sources: Vec<String>,
    #[serde(default)]
    pub real_time_inference: bool,
    #[serde(default = "default_quality_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub multi_agent_coordination: bool,
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_reasoning_depth() -> u32 {
    3
}

fn default_explainability() -> ExplainabilityLevel {
    ExplainabilityLevel::Basic
}

/// How the three versions of a multi-version run are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStrategy {
    Sequential,
    Parallel,
    /// Parallel under low system load, sequential otherwise.
    #[default]
    Adaptive,
}

impl std::fmt::Display for OrchestrationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// How version results are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusAlgorithm {
    #[default]
    Majority,
    Weighted,
    #[serde(rename = "confidence-based", alias = "confidence_based")]
    ConfidenceBased,
}

impl std::fmt::Display for ConsensusAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Majority => write!(f, "majority"),
            Self::Weighted => write!(f, "weighted"),
            Self::ConfidenceBased => write!(f, "confidence-based"),
        }
    }
}

/// Rule-based, ML and AI runs over the same subjects, merged by consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiVersionWorkflowConfig {
    pub v1_config: ClassificationWorkflowConfig,
    pub v2_config: MlPipelineConfig,
    pub v3_config: AiReasoningConfig,
    #[serde(default)]
    pub orchestration_strategy: OrchestrationStrategy,
    #[serde(default)]
    pub consensus_algorithm: ConsensusAlgorithm,
    #[serde(default = "default_true")]
    pub quality_assurance: bool,
}
