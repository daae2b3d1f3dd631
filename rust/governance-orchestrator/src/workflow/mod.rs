//! Workflow execution.
//!
//! - **Classification** (v1): validation, per-framework classification,
//!   quality filtering and output
//! - **ML pipeline** (v2): model training, ensemble validation, deployment
//! - **AI reasoning** (v3): agents, knowledge, reasoning, explanations
//!
//! Each pipeline is a [`StageExecutor`] over its own state type. Executions
//! are mutated through an [`ExecutionTracker`] that persists every change to
//! the [`ExecutionRepository`] and publishes it on the [`EventBus`].

pub mod ai;
pub mod classification;
pub mod configs;
pub mod consensus;
pub mod events;
pub mod execution;
pub mod ml;
pub mod output;
pub mod preprocessing;
pub mod registry;
pub mod stage;
pub mod tracker;
pub mod validation;

pub use ai::AiPipeline;
pub use classification::ClassificationPipeline;
pub use configs::{
    AiReasoningConfig, ClassificationWorkflowConfig, ConsensusAlgorithm, MlPipelineConfig,
    MultiVersionWorkflowConfig, OrchestrationStrategy,
};
pub use consensus::ConsensusEngine;
pub use events::{EventBus, ExecutionEvent};
pub use execution::{
    ExecutionError, ExecutionMetrics, ExecutionStatus, ResourceUsage, Severity, VersionResults,
    WorkflowExecution, WorkflowKind,
};
pub use ml::MlPipeline;
pub use output::{FormatOutcome, FormattedOutput, OutputFormat, OutputFormatter, OutputMetadata};
pub use registry::{
    ExecutionArchive, ExecutionFilter, ExecutionRepository, InMemoryExecutionRepository,
    RetentionPolicy,
};
pub use stage::{Stage, StageExecutor};
pub use tracker::ExecutionTracker;
pub use validation::{ValidationOutcome, ValidationPipeline};
