//! End-to-end workflow runs against in-process service doubles.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{
    ai_config, classification_config, ml_config, multi_version_config, Doubles, MockAi,
    MockClassification, MockMl, MockPlatform, SUBJECTS,
};
use governance_orchestrator::workflow::{
    ExecutionArchive, ExecutionEvent, ExecutionFilter, ExecutionStatus, InMemoryExecutionRepository,
    RetentionPolicy, Severity, WorkflowExecution, WorkflowKind,
};
use governance_orchestrator::{OrchestratorError, WorkflowOrchestrator};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Progress checkpoints already published for `execution_id`.
fn progress_of(events: &mut broadcast::Receiver<ExecutionEvent>, execution_id: &str) -> Vec<f64> {
    let mut progress = Vec::new();
    loop {
        match events.try_recv() {
            Ok(ExecutionEvent::Progress {
                execution_id: id,
                progress: p,
                ..
            }) if id == execution_id => progress.push(p),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    progress
}

// ============================================================================
// Classification (v1)
// ============================================================================

#[tokio::test]
async fn test_classification_completes_with_results_and_output() {
    let orchestrator = Doubles::default().orchestrator();

    let execution = orchestrator
        .execute_classification_workflow(classification_config(&["nlp-core", "pii-scan"]), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!((execution.progress - 100.0).abs() < f64::EPSILON);
    assert_eq!(execution.results.len(), SUBJECTS.len() * 2);
    assert!(execution.results.iter().all(|r| r.confidence >= 0.7));
    assert!(execution.output.is_some());
    assert!(execution.metrics.quality_score > 0.0);
    assert!(execution.end_time.is_some());

    let stored = orchestrator.get_execution(&execution.id).unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_100_on_completion() {
    let orchestrator = Doubles::default().orchestrator();
    let mut events = orchestrator.subscribe();

    let execution = orchestrator
        .execute_classification_workflow(classification_config(&["nlp-core"]), "steward")
        .await
        .unwrap();

    let mut progress = Vec::new();
    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        if event.execution_id() != execution.id {
            continue;
        }
        match event {
            ExecutionEvent::Progress { progress: p, .. } => progress.push(p),
            ExecutionEvent::ExecutionFinished { status, .. } => finished = Some(status),
            _ => {}
        }
    }

    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| *p < 100.0));
    assert_eq!(finished, Some(ExecutionStatus::Completed));
    assert!((execution.progress - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_empty_frameworks_fail_validation() {
    let orchestrator = Doubles::default().orchestrator();

    let err = orchestrator
        .execute_classification_workflow(classification_config(&[]), "steward")
        .await
        .unwrap_err();

    let OrchestratorError::Validation(message) = &err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert!(message.contains("at least one classification framework"));

    let failed = orchestrator.list_executions(&ExecutionFilter {
        status: Some(ExecutionStatus::Failed),
        kind: Some(WorkflowKind::Classification),
        parent_id: None,
    });
    assert_eq!(failed.len(), 1);
    assert!(failed[0].has_critical_error());
    assert!(failed[0].progress < 100.0);
}

#[tokio::test]
async fn test_quality_threshold_out_of_range_fails_validation() {
    let orchestrator = Doubles::default().orchestrator();
    let mut config = classification_config(&["nlp-core"]);
    config.quality_threshold = 1.5;

    let err = orchestrator
        .execute_classification_workflow(config, "steward")
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Validation(ref m) if m.contains("between 0 and 1")));
}

#[tokio::test]
async fn test_unknown_framework_blocks_run() {
    let orchestrator = Doubles::default().orchestrator();

    let err = orchestrator
        .execute_classification_workflow(classification_config(&["unknown-x"]), "steward")
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Validation(ref m) if m.contains("unknown-x")));
}

#[tokio::test]
async fn test_failing_framework_is_recoverable() {
    let orchestrator = Doubles {
        classification: MockClassification::failing("pii-scan"),
        ..Doubles::default()
    }
    .orchestrator();

    let execution = orchestrator
        .execute_classification_workflow(classification_config(&["nlp-core", "pii-scan"]), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.results.len(), SUBJECTS.len());
    assert!(execution.results.iter().all(|r| r.source == "nlp-core"));

    let failure = execution
        .errors
        .iter()
        .find(|e| e.code == "FRAMEWORK_FAILED")
        .unwrap();
    assert_eq!(failure.severity, Severity::Medium);
    assert_eq!(failure.context["framework"], "pii-scan");
}

#[tokio::test]
async fn test_fallback_framework_retries_with_relaxed_threshold() {
    let orchestrator = Doubles {
        classification: MockClassification::failing("pii-scan").with_fallback("pii-scan", "lenient-scan"),
        ..Doubles::default()
    }
    .orchestrator();

    let execution = orchestrator
        .execute_classification_workflow(classification_config(&["pii-scan"]), "steward")
        .await
        .unwrap();

    // The fallback answers at 0.6, below the 0.7 threshold but above 0.7 * 0.8.
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.results.len(), SUBJECTS.len());
    assert!(execution
        .results
        .iter()
        .all(|r| r.source == "lenient-scan" && (r.confidence - 0.6).abs() < 1e-9));

    let failure = execution
        .errors
        .iter()
        .find(|e| e.code == "FRAMEWORK_FAILED")
        .unwrap();
    assert_eq!(failure.severity, Severity::Medium);
    assert_eq!(failure.context["framework"], "pii-scan");
    assert_eq!(failure.context["fallback"], "lenient-scan");
    assert!(failure.message.contains("used fallback"));
}

#[tokio::test]
async fn test_lenient_framework_without_fallback_is_filtered_by_threshold() {
    let orchestrator = Doubles::default().orchestrator();

    let execution = orchestrator
        .execute_classification_workflow(classification_config(&["lenient-scan"]), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_classify_timeout_is_a_framework_failure() {
    let orchestrator = Doubles {
        classification: MockClassification {
            classify_delay: Duration::from_secs(600),
            ..MockClassification::default()
        },
        ..Doubles::default()
    }
    .orchestrator();

    let execution = orchestrator
        .execute_classification_workflow(classification_config(&["nlp-core"]), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.results.is_empty());
    let failure = execution
        .errors
        .iter()
        .find(|e| e.code == "FRAMEWORK_FAILED")
        .unwrap();
    assert_eq!(failure.severity, Severity::Medium);
    assert!(failure.message.contains("timed out"), "{}", failure.message);
}

// ============================================================================
// ML pipeline (v2) and AI reasoning (v3)
// ============================================================================

#[tokio::test]
async fn test_ml_pipeline_combines_model_predictions() {
    let orchestrator = Doubles::default().orchestrator();

    let execution = tokio_test::assert_ok!(orchestrator.execute_ml_pipeline(ml_config()).await);

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.results.len(), SUBJECTS.len());
    assert!(execution.results.iter().all(|r| r.label == "confidential"));
    assert!((execution.metrics.accuracy - 0.9).abs() < 1e-9);
    assert!(execution.errors.is_empty());
}

#[tokio::test]
async fn test_ml_pipeline_fails_without_models() {
    let orchestrator = Doubles {
        ml: MockMl { unavailable: true },
        ..Doubles::default()
    }
    .orchestrator();

    let err = orchestrator.execute_ml_pipeline(ml_config()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Stage { ref stage, .. } if stage == "validate_models"));

    let failed = orchestrator.list_executions(&ExecutionFilter {
        status: Some(ExecutionStatus::Failed),
        ..ExecutionFilter::default()
    });
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].errors_with(Severity::Medium).count(), 2);
}

#[tokio::test]
async fn test_ai_reasoning_attaches_explanations() {
    let orchestrator = Doubles::default().orchestrator();

    let execution = orchestrator.execute_ai_reasoning(ai_config()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.results.len(), SUBJECTS.len());
    for item in &execution.results {
        assert_eq!(item.source, "agent-1");
        assert_eq!(item.attributes["explanation"]["level"], "detailed");
    }
}

#[tokio::test(start_paused = true)]
async fn test_reasoning_timeout_fails_execution() {
    let orchestrator = Doubles {
        ai: MockAi {
            reasoning_delay: Duration::from_secs(600),
        },
        ..Doubles::default()
    }
    .orchestrator();

    let err = orchestrator.execute_ai_reasoning(ai_config()).await.unwrap_err();

    let OrchestratorError::Stage { stage, message } = &err else {
        panic!("expected a stage error, got {err:?}");
    };
    assert_eq!(stage, "reason");
    assert!(message.contains("timed out"), "{message}");

    let failed = orchestrator.list_executions(&ExecutionFilter {
        status: Some(ExecutionStatus::Failed),
        ..ExecutionFilter::default()
    });
    assert_eq!(failed.len(), 1);
    assert!(failed[0].has_critical_error());
}

// ============================================================================
// Multi-version
// ============================================================================

#[tokio::test]
async fn test_multi_version_parallel_survives_v2_failure() {
    let orchestrator = Doubles {
        ml: MockMl { unavailable: true },
        ..Doubles::default()
    }
    .orchestrator();

    let execution = orchestrator
        .orchestrate_multi_version_workflow(multi_version_config("parallel"), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!((execution.progress - 100.0).abs() < f64::EPSILON);

    let versions = execution.version_results.as_ref().unwrap();
    assert_eq!(versions.v1.len(), SUBJECTS.len());
    assert!(versions.v2.is_empty());
    assert_eq!(versions.v3.len(), SUBJECTS.len());

    let v2_error = execution
        .errors_with(Severity::Medium)
        .find(|e| e.context.get("version").and_then(|v| v.as_str()) == Some("v2"))
        .unwrap();
    assert_eq!(v2_error.code, "VERSION_FAILED");
    assert!(v2_error.message.contains("v2"));

    // Both surviving versions agree on every subject.
    assert_eq!(execution.results.len(), SUBJECTS.len());
    assert!(execution.results.iter().all(|r| r.label == "confidential"));
    assert!(execution.output.is_some());
}

#[tokio::test]
async fn test_multi_version_sequential_records_children() {
    let orchestrator = Doubles::default().orchestrator();

    let execution = orchestrator
        .orchestrate_multi_version_workflow(multi_version_config("sequential"), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.errors.is_empty());
    assert!(execution.metrics.quality_score > 0.0);

    let children = orchestrator.list_executions(&ExecutionFilter {
        parent_id: Some(execution.id.clone()),
        ..ExecutionFilter::default()
    });
    let mut kinds: Vec<WorkflowKind> = children.iter().map(|c| c.kind).collect();
    kinds.sort_by_key(ToString::to_string);
    assert_eq!(
        kinds,
        vec![
            WorkflowKind::AiReasoning,
            WorkflowKind::Classification,
            WorkflowKind::MlPipeline,
        ]
    );
    assert!(children.iter().all(|c| c.status == ExecutionStatus::Completed));
}

#[tokio::test]
async fn test_multi_version_sequential_survives_v2_failure() {
    let orchestrator = Doubles {
        ml: MockMl { unavailable: true },
        ..Doubles::default()
    }
    .orchestrator();
    let mut events = orchestrator.subscribe();

    let execution = orchestrator
        .orchestrate_multi_version_workflow(multi_version_config("sequential"), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    let progress = progress_of(&mut events, &execution.id);
    for checkpoint in [33.0, 66.0, 90.0, 95.0] {
        assert!(progress.contains(&checkpoint), "missing {checkpoint} in {progress:?}");
    }

    let versions = execution.version_results.as_ref().unwrap();
    assert_eq!(versions.v1.len(), SUBJECTS.len());
    assert!(versions.v2.is_empty());
    assert_eq!(versions.v3.len(), SUBJECTS.len());
    assert!(execution
        .errors_with(Severity::Medium)
        .any(|e| e.code == "VERSION_FAILED" && e.context["version"] == "v2"));
}

#[tokio::test]
async fn test_multi_version_adaptive_under_low_load() {
    let orchestrator = Doubles::default().orchestrator();
    let mut events = orchestrator.subscribe();

    let execution = orchestrator
        .orchestrate_multi_version_workflow(multi_version_config("adaptive"), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.kind, WorkflowKind::MultiVersion);
    // Parallel branch: no sequential checkpoints.
    let progress = progress_of(&mut events, &execution.id);
    assert!(progress.contains(&90.0));
    assert!(!progress.contains(&33.0));
}

#[tokio::test]
async fn test_multi_version_adaptive_under_high_load_runs_sequentially() {
    let orchestrator = Doubles {
        platform: MockPlatform {
            load: 0.9,
            ..MockPlatform::default()
        },
        ..Doubles::default()
    }
    .orchestrator();
    let mut events = orchestrator.subscribe();

    let execution = orchestrator
        .orchestrate_multi_version_workflow(multi_version_config("adaptive"), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    let progress = progress_of(&mut events, &execution.id);
    assert!(progress.contains(&33.0), "{progress:?}");
    assert!(progress.contains(&66.0), "{progress:?}");
}

#[tokio::test]
async fn test_adaptive_treats_unknown_load_as_high() {
    let orchestrator = Doubles {
        platform: MockPlatform::unavailable(),
        ..Doubles::default()
    }
    .orchestrator();
    let mut events = orchestrator.subscribe();

    let execution = orchestrator
        .orchestrate_multi_version_workflow(multi_version_config("adaptive"), "steward")
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(progress_of(&mut events, &execution.id).contains(&33.0));
}

// ============================================================================
// Queries and cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_unknown_execution() {
    let orchestrator = Doubles::default().orchestrator();

    let err = tokio_test::assert_err!(orchestrator.cancel_execution("missing"));
    assert_eq!(err, OrchestratorError::NotFound("missing".to_string()));
    assert!(matches!(
        orchestrator.get_execution("missing"),
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_cancel_finished_execution() {
    let orchestrator = Doubles::default().orchestrator();
    let execution = orchestrator.execute_ai_reasoning(ai_config()).await.unwrap();

    let err = tokio_test::assert_err!(orchestrator.cancel_execution(&execution.id));
    assert_eq!(err, OrchestratorError::NotRunning(execution.id));
}

#[tokio::test]
async fn test_cancel_running_execution() {
    let orchestrator = Doubles {
        ai: MockAi {
            reasoning_delay: Duration::from_secs(30),
        },
        ..Doubles::default()
    }
    .orchestrator();

    let id = orchestrator.submit_ai_reasoning(ai_config()).unwrap();
    let mut events = orchestrator.subscribe_execution(&id).unwrap();

    // Wait for the slow reasoning stage before cancelling.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if orchestrator
                .get_execution(&id)
                .is_ok_and(|e| e.current_step == "reason")
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    orchestrator.cancel_execution(&id).unwrap();

    let status = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(ExecutionEvent::ExecutionFinished { status, .. }) => return Some(status),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(status, Some(ExecutionStatus::Failed));

    let execution = orchestrator.get_execution(&id).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.errors.iter().any(|e| e.code == "EXECUTION_CANCELLED"));
    assert!(execution.progress < 100.0);
}

#[tokio::test]
async fn test_subscribe_requires_unfinished_execution() {
    let orchestrator = Doubles::default().orchestrator();

    let err = tokio_test::assert_err!(orchestrator.subscribe_execution("missing"));
    assert_eq!(err, OrchestratorError::NotFound("missing".to_string()));

    let execution = orchestrator.execute_ai_reasoning(ai_config()).await.unwrap();
    let err = tokio_test::assert_err!(orchestrator.subscribe_execution(&execution.id));
    assert_eq!(err, OrchestratorError::NotRunning(execution.id));
    assert!(format!("{orchestrator:?}").contains("execution_channels: 0"));
}

#[tokio::test]
async fn test_prune_keeps_recent_executions() {
    let orchestrator = Doubles::default().orchestrator();
    orchestrator.execute_ai_reasoning(ai_config()).await.unwrap();

    assert_eq!(orchestrator.prune_executions().await, 0);
    assert_eq!(
        orchestrator.list_executions(&ExecutionFilter::default()).len(),
        1
    );
}

#[derive(Debug, Default)]
struct RecordingArchive {
    archived: Mutex<Vec<String>>,
}

#[async_trait]
impl ExecutionArchive for RecordingArchive {
    async fn archive(&self, executions: Vec<WorkflowExecution>) -> Result<(), OrchestratorError> {
        self.archived
            .lock()
            .extend(executions.into_iter().map(|e| e.id));
        Ok(())
    }
}

#[tokio::test]
async fn test_pruned_executions_are_archived() {
    let archive = Arc::new(RecordingArchive::default());
    let repository = InMemoryExecutionRepository::shared(RetentionPolicy {
        ttl: Duration::from_secs(3_600),
        max_entries: 1,
    });
    let orchestrator = WorkflowOrchestrator::new(Doubles::default().services(), &Default::default())
        .with_repository(repository)
        .with_archive(Arc::clone(&archive) as Arc<dyn ExecutionArchive>);

    let first = orchestrator.execute_ai_reasoning(ai_config()).await.unwrap();
    let second = orchestrator.execute_ai_reasoning(ai_config()).await.unwrap();

    assert_eq!(orchestrator.prune_executions().await, 1);
    assert_eq!(*archive.archived.lock(), vec![first.id.clone()]);
    assert!(orchestrator.get_execution(&first.id).is_err());
    assert!(orchestrator.get_execution(&second.id).is_ok());
}
