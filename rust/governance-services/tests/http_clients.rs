//! HTTP client tests against a mock service.

use std::time::Duration;

use governance_services::http::{
    HttpAiService, HttpClassificationService, HttpMlService, HttpServiceConfig,
};
use governance_services::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn framework_json() -> serde_json::Value {
    json!({
        "id": "nlp-core",
        "name": "NLP Core",
        "kind": "nlp",
        "version": "2.1.0",
        "conflicts_with": ["legacy-nlp"],
        "max_batch_size": 500,
        "recommended_batch_size": 100,
        "item_memory_kb": 64,
        "calibration": {"method": "temperature", "temperature": 1.5}
    })
}

// ============================================================================
// Envelope decoding
// ============================================================================

#[tokio::test]
async fn test_get_framework_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/frameworks/nlp-core"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": framework_json()})),
        )
        .mount(&server)
        .await;

    let service = HttpClassificationService::new(&HttpServiceConfig::new(server.uri())).unwrap();
    let framework = tokio_test::assert_ok!(service
        .get_framework("nlp-core")
        .await
        .into_result("get_framework"));

    assert_eq!(framework.kind, FrameworkKind::Nlp);
    assert_eq!(framework.conflicts_with, vec!["legacy-nlp".to_string()]);
    assert_eq!(
        framework.calibration,
        Some(Calibration::Temperature { temperature: 1.5 })
    );
    assert!(framework.fallback_framework.is_none());
}

#[tokio::test]
async fn test_envelope_failure_is_not_retryable_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rules/missing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "message": "rule not found"})),
        )
        .mount(&server)
        .await;

    let service = HttpClassificationService::new(&HttpServiceConfig::new(server.uri())).unwrap();
    let response = service.get_rule("missing").await;

    assert_eq!(response, ServiceResponse::failure("rule not found", false));
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/system/load"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let service = HttpClassificationService::new(&HttpServiceConfig::new(server.uri())).unwrap();
    match service.system_load().await {
        ServiceResponse::Failure { error, retryable } => {
            assert!(retryable);
            assert!(error.contains("503"));
            assert!(error.contains("overloaded"));
        }
        ServiceResponse::Success(_) => panic!("Expected failure"),
    }
}

#[tokio::test]
async fn test_client_error_uses_envelope_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/data-sources/s1"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"success": false, "message": "unknown source"})),
        )
        .mount(&server)
        .await;

    let service = HttpClassificationService::new(&HttpServiceConfig::new(server.uri())).unwrap();
    match service.get_data_source("s1").await {
        ServiceResponse::Failure { error, retryable } => {
            assert!(!retryable);
            assert!(error.contains("unknown source"));
        }
        ServiceResponse::Success(_) => panic!("Expected failure"),
    }
}

#[tokio::test]
async fn test_unit_response_from_null_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let service = HttpClassificationService::new(&HttpServiceConfig::new(server.uri())).unwrap();
    let response = service
        .record_metrics(MetricsRecord {
            execution_id: "e1".to_string(),
            workflow_type: "pii".to_string(),
            item_count: 3,
            throughput: 1.5,
            accuracy: 0.9,
            latency_ms: 12.0,
            quality_score: 0.8,
        })
        .await;

    assert!(response.is_success());
}

// ============================================================================
// Request shape
// ============================================================================

#[tokio::test]
async fn test_api_key_and_body_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/permissions/validate"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_partial_json(json!({"caller": "alice"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": {"granted": true}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpServiceConfig::new(server.uri()).with_api_key("secret");
    let service = HttpClassificationService::new(&config).unwrap();
    let decision = service
        .validate_permissions("alice", &["nlp-core".to_string()])
        .await
        .ok()
        .unwrap();

    assert!(decision.granted);
    assert!(decision.missing.is_empty());
}

#[tokio::test]
async fn test_classify_timeout_maps_to_retryable_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/classify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let service = HttpClassificationService::new(&HttpServiceConfig::new(server.uri())).unwrap();
    let response = service
        .classify(ClassificationRequest {
            execution_id: "e1".to_string(),
            framework_id: "nlp-core".to_string(),
            records: vec![json!({"id": "r1"})],
            rules: Vec::new(),
            batch_size: 1,
            real_time: true,
            timeout_secs: 1,
        })
        .await;

    match response {
        ServiceResponse::Failure { retryable, .. } => assert!(retryable),
        ServiceResponse::Success(_) => panic!("Expected timeout"),
    }
}

// ============================================================================
// ML and AI clients
// ============================================================================

#[tokio::test]
async fn test_ml_validation_returns_predictions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/models/m1/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "model_id": "m1",
                "accuracy": 0.91,
                "predictions": [{
                    "id": "r1",
                    "label": "pii",
                    "confidence": 0.8,
                    "timestamp": "2026-01-01T00:00:00Z",
                    "source": "m1"
                }]
            }
        })))
        .mount(&server)
        .await;

    let service = HttpMlService::new(&HttpServiceConfig::new(server.uri())).unwrap();
    let validation = service
        .validate_model(ModelValidationRequest {
            model_id: "m1".to_string(),
            dataset_id: "d1".to_string(),
            validation_split: 0.2,
        })
        .await
        .into_result("validate_model");
    let validation = tokio_test::assert_ok!(validation);

    assert_eq!(validation.predictions.len(), 1);
    assert_eq!(validation.predictions[0].label, "pii");
}

#[tokio::test]
async fn test_ai_reasoning() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/reasoning"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"conclusions": [
                {"subject_id": "r1", "label": "confidential", "confidence": 0.7}
            ]}
        })))
        .mount(&server)
        .await;

    let service = HttpAiService::new(&HttpServiceConfig::new(server.uri())).unwrap();
    let output = service
        .reason(ReasoningRequest {
            session_id: "s".to_string(),
            knowledge_base_id: "kb".to_string(),
            reasoning_depth: 2,
            real_time: false,
            conversation_context: None,
        })
        .await
        .ok()
        .unwrap();

    assert_eq!(output.conclusions[0].label, "confidential");
    assert!(output.conclusions[0].rationale.is_empty());
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    let service =
        HttpAiService::new(&HttpServiceConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_secs(2)))
            .unwrap();
    let response = service
        .explain(ExplanationRequest {
            session_id: "s".to_string(),
            level: ExplainabilityLevel::Basic,
            subject_ids: vec!["r1".to_string()],
        })
        .await;

    match response {
        ServiceResponse::Failure { retryable, .. } => assert!(retryable),
        ServiceResponse::Success(_) => panic!("Expected connection failure"),
    }
}
