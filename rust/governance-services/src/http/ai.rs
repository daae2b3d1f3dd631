use async_trait::async_trait;

use super::{HttpServiceConfig, HttpTransport};
use crate::ai::{
    AgentHandle, AgentInitRequest, AiService, Explanation, ExplanationRequest, KnowledgeBase,
    KnowledgeLoadRequest, ReasoningOutput, ReasoningRequest,
};
use crate::error::ServiceError;
use crate::response::ServiceResponse;

/// HTTP client of the AI reasoning service.
#[derive(Debug, Clone)]
pub struct HttpAiService {
    transport: HttpTransport,
}

impl HttpAiService {
    pub fn new(config: &HttpServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }
}

#[async_trait]
impl AiService for HttpAiService {
    async fn initialize_agents(&self, request: AgentInitRequest) -> ServiceResponse<AgentHandle> {
        self.transport.post(&["agents"], &request).await
    }

    async fn load_knowledge(
        &self,
        request: KnowledgeLoadRequest,
    ) -> ServiceResponse<KnowledgeBase> {
        self.transport.post(&["knowledge"], &request).await
    }

    async fn reason(&self, request: ReasoningRequest) -> ServiceResponse<ReasoningOutput> {
        self.transport.post(&["reasoning"], &request).await
    }

    async fn explain(&self, request: ExplanationRequest) -> ServiceResponse<Vec<Explanation>> {
        self.transport.post(&["explanations"], &request).await
    }
}
