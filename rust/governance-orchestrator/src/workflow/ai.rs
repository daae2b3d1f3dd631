//! AI reasoning pipeline: agents, knowledge, reasoning, explanations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use governance_services::ai::{
    AgentHandle, AgentInitRequest, AiService, Conclusion, ExplanationRequest, KnowledgeBase,
    KnowledgeLoadRequest, ReasoningRequest,
};
use governance_services::{ClassificationItem, ServiceResponse};
use serde_json::json;

use super::configs::AiReasoningConfig;
use super::execution::{ExecutionError, Severity, WorkflowKind};
use super::output::{OutputFormatter, OutputMetadata};
use super::stage::{Stage, StageExecutor};
use super::tracker::ExecutionTracker;
use super::validation::validate_ai;
use crate::config::ExecutionConfig;
use crate::error::OrchestratorError;

/// Source used when a conclusion does not name its agent.
pub const AI_SOURCE: &str = "ai-reasoning";

struct AiContext {
    service: Arc<dyn AiService>,
    formatter: OutputFormatter,
    execution: ExecutionConfig,
}

#[derive(Debug)]
pub struct AiState {
    pub config: Arc<AiReasoningConfig>,
    pub agents: Option<AgentHandle>,
    pub knowledge: Option<KnowledgeBase>,
    pub results: Vec<ClassificationItem>,
}

impl AiState {
    #[must_use]
    pub fn new(config: Arc<AiReasoningConfig>) -> Self {
        Self {
            config,
            agents: None,
            knowledge: None,
            results: Vec::new(),
        }
    }

    fn session_id(&self) -> Result<&str, OrchestratorError> {
        self.agents
            .as_ref()
            .map(|a| a.session_id.as_str())
            .ok_or_else(|| OrchestratorError::Internal("agents were not initialized".to_string()))
    }
}

/// Runs AI reasoning workflows.
pub struct AiPipeline {
    executor: StageExecutor<AiState>,
}

impl std::fmt::Debug for AiPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiPipeline")
            .field("executor", &self.executor)
            .finish()
    }
}

impl AiPipeline {
    #[must_use]
    pub fn new(
        service: Arc<dyn AiService>,
        formatter: OutputFormatter,
        execution: ExecutionConfig,
    ) -> Self {
        let ctx = Arc::new(AiContext {
            service,
            formatter,
            execution,
        });
        let executor = StageExecutor::new("ai_reasoning")
            .stage(InitializeAgentsStage(Arc::clone(&ctx)))
            .stage(LoadKnowledgeStage(Arc::clone(&ctx)))
            .stage(ReasoningStage(Arc::clone(&ctx)))
            .stage(ExplainStage(ctx));
        Self { executor }
    }

    pub async fn run(
        &self,
        config: Arc<AiReasoningConfig>,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let mut state = AiState::new(config);
        self.executor.run(&mut state, tracker).await
    }
}

struct InitializeAgentsStage(Arc<AiContext>);

#[async_trait]
impl Stage<AiState> for InitializeAgentsStage {
    fn name(&self) -> &'static str {
        "initialize_agents"
    }

    fn checkpoint(&self) -> f64 {
        15.0
    }

    async fn run(
        &self,
        state: &mut AiState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        validate_ai(&state.config).into_result()?;

        let request = AgentInitRequest {
            execution_id: tracker.id().to_string(),
            multi_agent: state.config.multi_agent_coordination,
            reasoning_depth: state.config.reasoning_depth,
            conversation_context: state.config.conversation_context.clone(),
        };
        let agents = self
            .0
            .service
            .initialize_agents(request)
            .await
            .into_result("initialize_agents")?;
        tracing::info!(
            execution_id = %tracker.id(),
            session_id = %agents.session_id,
            agents = agents.agent_ids.len(),
            "Agents initialized"
        );
        state.agents = Some(agents);
        Ok(())
    }
}

struct LoadKnowledgeStage(Arc<AiContext>);

#[async_trait]
impl Stage<AiState> for LoadKnowledgeStage {
    fn name(&self) -> &'static str {
        "load_knowledge"
    }

    fn checkpoint(&self) -> f64 {
        35.0
    }

    async fn run(
        &self,
        state: &mut AiState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let request = KnowledgeLoadRequest {
            session_id: state.session_id()?.to_string(),
            sources: state.config.knowledge_sources.clone(),
        };
        let knowledge = self
            .0
            .service
            .load_knowledge(request)
            .await
            .into_result("load_knowledge")?;

        let missing: Vec<&str> = state
            .config
            .knowledge_sources
            .iter()
            .filter(|s| !knowledge.loaded_sources.contains(s))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            tracker.record_error(
                ExecutionError::new(
                    "KNOWLEDGE_PARTIALLY_LOADED",
                    format!("Knowledge sources not loaded: {}", missing.join(", ")),
                    Severity::Low,
                )
                .with_context("missing", missing.len()),
            );
        }
        state.knowledge = Some(knowledge);
        Ok(())
    }
}

struct ReasoningStage(Arc<AiContext>);

#[async_trait]
impl Stage<AiState> for ReasoningStage {
    fn name(&self) -> &'static str {
        "reason"
    }

    fn checkpoint(&self) -> f64 {
        75.0
    }

    async fn run(
        &self,
        state: &mut AiState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let knowledge_base_id = state
            .knowledge
            .as_ref()
            .map(|k| k.knowledge_base_id.clone())
            .ok_or_else(|| OrchestratorError::Internal("knowledge was not loaded".to_string()))?;
        let real_time = state.config.real_time_inference;
        let request = ReasoningRequest {
            session_id: state.session_id()?.to_string(),
            knowledge_base_id,
            reasoning_depth: state.config.reasoning_depth,
            real_time,
            conversation_context: state.config.conversation_context.clone(),
        };

        let timeout = self.0.execution.classify_timeout(real_time);
        let output = tokio::time::timeout(timeout, self.0.service.reason(request))
            .await
            .map_err(|_elapsed| OrchestratorError::Timeout {
                operation: "reason".to_string(),
                seconds: timeout.as_secs(),
            })?
            .into_result("reason")?;

        let total = output.conclusions.len();
        state.results = accept_conclusions(output.conclusions, state.config.confidence_threshold);
        tracing::info!(
            execution_id = %tracker.id(),
            conclusions = total,
            accepted = state.results.len(),
            "Reasoning finished"
        );
        Ok(())
    }
}

struct ExplainStage(Arc<AiContext>);

#[async_trait]
impl Stage<AiState> for ExplainStage {
    fn name(&self) -> &'static str {
        "explain"
    }

    fn checkpoint(&self) -> f64 {
        100.0
    }

    async fn run(
        &self,
        state: &mut AiState,
        tracker: &mut ExecutionTracker,
    ) -> Result<(), OrchestratorError> {
        let level = state.config.explainability_level;
        if !state.results.is_empty() {
            let request = ExplanationRequest {
                session_id: state.session_id()?.to_string(),
                level,
                subject_ids: state.results.iter().map(|r| r.id.clone()).collect(),
            };
            match self.0.service.explain(request).await {
                ServiceResponse::Success(explanations) => {
                    let by_subject: HashMap<&str, _> = explanations
                        .iter()
                        .map(|e| (e.subject_id.as_str(), e))
                        .collect();
                    for item in &mut state.results {
                        if let Some(explanation) = by_subject.get(item.id.as_str()) {
                            item.attributes.insert(
                                "explanation".to_string(),
                                json!({
                                    "level": level,
                                    "text": explanation.text,
                                    "factors": explanation.factors,
                                }),
                            );
                        }
                    }
                }
                ServiceResponse::Failure { error, .. } => tracker.record_error(ExecutionError::new(
                    "EXPLANATION_FAILED",
                    format!("Explanations could not be generated: {error}"),
                    Severity::Medium,
                )),
            }
        }

        let accuracy = mean_confidence(&state.results);
        tracker.update_metrics(|m| {
            m.accuracy = accuracy;
            m.quality_score = accuracy;
        });
        tracker.set_results(state.results.clone());

        let metadata = OutputMetadata::new(tracker.id(), WorkflowKind::AiReasoning)
            .started_at(tracker.execution().start_time);
        let outcome = self
            .0
            .formatter
            .format(&state.results, &state.config.output_format, &metadata);
        for warning in outcome.warnings {
            tracker.record_error(warning.into_execution_error());
        }
        tracker.set_output(outcome.output);
        Ok(())
    }
}

/// Keep conclusions at or above `threshold` as result items.
#[must_use]
pub fn accept_conclusions(conclusions: Vec<Conclusion>, threshold: f64) -> Vec<ClassificationItem> {
    conclusions
        .into_iter()
        .filter(|c| c.confidence >= threshold)
        .map(|c| {
            let source = if c.agent_id.is_empty() {
                AI_SOURCE.to_string()
            } else {
                c.agent_id
            };
            let mut item = ClassificationItem::new(c.subject_id, c.label, c.confidence, source);
            if !c.rationale.is_empty() {
                item.attributes
                    .insert("rationale".to_string(), c.rationale.into());
            }
            item
        })
        .collect()
}

/// Mean confidence of `items`, `0.0` when empty.
#[must_use]
#[allow(clippy::cast_precision_loss, reason = "result counts are far below 2^52")]
pub fn mean_confidence(items: &[ClassificationItem]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|i| i.confidence).sum::<f64>() / items.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conclusion(subject: &str, confidence: f64, agent: &str) -> Conclusion {
        Conclusion {
            subject_id: subject.to_string(),
            label: "restricted".to_string(),
            confidence,
            rationale: format!("{subject} holds account numbers"),
            agent_id: agent.to_string(),
        }
    }

    #[test]
    fn test_conclusions_below_threshold_are_dropped() {
        let items = accept_conclusions(
            vec![
                conclusion("a", 0.9, "agent-1"),
                conclusion("b", 0.5, "agent-2"),
                conclusion("c", 0.7, ""),
            ],
            0.7,
        );

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(items[0].source, "agent-1");
        assert_eq!(items[1].source, AI_SOURCE);
        assert_eq!(items[0].attributes["rationale"], "a holds account numbers");
    }

    #[test]
    fn test_mean_confidence() {
        assert!(mean_confidence(&[]).abs() < f64::EPSILON);
        let items = accept_conclusions(vec![conclusion("a", 0.8, ""), conclusion("b", 0.6, "")], 0.0);
        assert!((mean_confidence(&items) - 0.7).abs() < 1e-9);
    }
}
