//! AI reasoning service contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::response::ServiceResponse;

/// Depth of generated explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainabilityLevel {
    Basic,
    Detailed,
    Comprehensive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInitRequest {
    pub execution_id: String,
    /// Spin up coordinated agents instead of a single one.
    pub multi_agent: bool,
    pub reasoning_depth: u32,
    #[serde(default)]
    pub conversation_context: Option<String>,
}

/// Initialized agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHandle {
    pub session_id: String,
    pub agent_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeLoadRequest {
    pub session_id: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub knowledge_base_id: String,
    #[serde(default)]
    pub loaded_sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub session_id: String,
    pub knowledge_base_id: String,
    pub reasoning_depth: u32,
    pub real_time: bool,
    #[serde(default)]
    pub conversation_context: Option<String>,
}

/// One conclusion drawn about a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub subject_id: String,
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningOutput {
    pub conclusions: Vec<Conclusion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRequest {
    pub session_id: String,
    pub level: ExplainabilityLevel,
    pub subject_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub subject_id: String,
    pub text: String,
    #[serde(default)]
    pub factors: Vec<String>,
}

/// Remote AI reasoning service.
#[async_trait]
pub trait AiService: Send + Sync {
    async fn initialize_agents(&self, request: AgentInitRequest) -> ServiceResponse<AgentHandle>;

    async fn load_knowledge(
        &self,
        request: KnowledgeLoadRequest,
    ) -> ServiceResponse<KnowledgeBase>;

    async fn reason(&self, request: ReasoningRequest) -> ServiceResponse<ReasoningOutput>;

    async fn explain(&self, request: ExplanationRequest) -> ServiceResponse<Vec<Explanation>>;
}
