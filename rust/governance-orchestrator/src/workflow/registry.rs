//! Execution repository.
//!
//! The orchestrator writes snapshots through [`ExecutionRepository`]; HTTP
//! handlers and callers read them back. The in-memory implementation keeps
//! entries in an LRU order and prunes finished executions by age and count.
//! Running executions are never evicted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::execution::{ExecutionStatus, WorkflowExecution, WorkflowKind};
use crate::config::RetentionConfig;
use crate::error::OrchestratorError;

/// Storage of execution snapshots.
pub trait ExecutionRepository: Send + Sync {
    /// Store a new execution. Ids must be unique.
    fn insert(&self, execution: WorkflowExecution) -> Result<(), OrchestratorError>;

    fn get(&self, id: &str) -> Option<WorkflowExecution>;

    /// Replace the snapshot of an existing execution.
    fn update(&self, execution: WorkflowExecution) -> Result<(), OrchestratorError>;

    /// All executions, oldest first.
    fn list(&self) -> Vec<WorkflowExecution>;

    /// Remove expired and excess finished executions and return them.
    fn prune(&self, now: DateTime<Utc>) -> Vec<WorkflowExecution>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destination of pruned executions.
#[async_trait]
pub trait ExecutionArchive: Send + Sync {
    async fn archive(&self, executions: Vec<WorkflowExecution>) -> Result<(), OrchestratorError>;
}

/// Filter for [`ExecutionRepository::list`] results.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
    pub kind: Option<WorkflowKind>,
    pub parent_id: Option<String>,
}

impl ExecutionFilter {
    #[must_use]
    pub fn matches(&self, execution: &WorkflowExecution) -> bool {
        self.status.is_none_or(|s| s == execution.status)
            && self.kind.is_none_or(|k| k == execution.kind)
            && self
                .parent_id
                .as_ref()
                .is_none_or(|p| execution.parent_id.as_ref() == Some(p))
    }
}

/// Limits applied by [`ExecutionRepository::prune`].
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Finished executions older than this are removed.
    pub ttl: Duration,
    /// Upper bound on stored executions.
    pub max_entries: usize,
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

/// In-memory repository with TTL and LRU pruning.
pub struct InMemoryExecutionRepository {
    entries: Mutex<lru::LruCache<String, WorkflowExecution>>,
    policy: RetentionPolicy,
}

impl std::fmt::Debug for InMemoryExecutionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryExecutionRepository")
            .field("entries", &self.entries.lock().len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl InMemoryExecutionRepository {
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        // Unbounded: capacity is enforced by `prune`, which must skip running entries.
        Self {
            entries: Mutex::new(lru::LruCache::unbounded()),
            policy,
        }
    }

    #[must_use]
    pub fn shared(policy: RetentionPolicy) -> Arc<dyn ExecutionRepository> {
        Arc::new(Self::new(policy))
    }
}

impl Default for InMemoryExecutionRepository {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl ExecutionRepository for InMemoryExecutionRepository {
    fn insert(&self, execution: WorkflowExecution) -> Result<(), OrchestratorError> {
        let mut entries = self.entries.lock();
        if entries.contains(&execution.id) {
            return Err(OrchestratorError::DuplicateExecution(execution.id));
        }
        entries.put(execution.id.clone(), execution);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<WorkflowExecution> {
        self.entries.lock().get(id).cloned()
    }

    fn update(&self, execution: WorkflowExecution) -> Result<(), OrchestratorError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(&execution.id) {
            Some(slot) => {
                *slot = execution;
                Ok(())
            }
            None => Err(OrchestratorError::NotFound(execution.id)),
        }
    }

    fn list(&self) -> Vec<WorkflowExecution> {
        let entries = self.entries.lock();
        let mut executions: Vec<WorkflowExecution> =
            entries.iter().map(|(_, e)| e.clone()).collect();
        executions.sort_by_key(|e| e.start_time);
        executions
    }

    fn prune(&self, now: DateTime<Utc>) -> Vec<WorkflowExecution> {
        let mut entries = self.entries.lock();
        let ttl = chrono::Duration::from_std(self.policy.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| {
                e.is_terminal() && e.end_time.is_some_and(|end| now.signed_duration_since(end) > ttl)
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut pruned: Vec<WorkflowExecution> = expired
            .iter()
            .filter_map(|id| entries.pop(id))
            .collect();

        while entries.len() > self.policy.max_entries {
            // Iteration runs most- to least-recently used.
            let victim = entries
                .iter()
                .rev()
                .find(|(_, e)| e.is_terminal())
                .map(|(id, _)| id.clone());
            match victim.and_then(|id| entries.pop(&id)) {
                Some(execution) => pruned.push(execution),
                None => break,
            }
        }

        if !pruned.is_empty() {
            tracing::debug!(
                pruned = pruned.len(),
                remaining = entries.len(),
                "Pruned execution history"
            );
        }
        pruned
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(kind: WorkflowKind, ended: DateTime<Utc>) -> WorkflowExecution {
        let mut execution = WorkflowExecution::new(kind);
        execution.status = ExecutionStatus::Completed;
        execution.progress = 100.0;
        execution.end_time = Some(ended);
        execution
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let repo = InMemoryExecutionRepository::default();
        let execution = WorkflowExecution::new(WorkflowKind::Classification);
        repo.insert(execution.clone()).unwrap();
        let err = repo.insert(execution).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateExecution(_)));
    }

    #[test]
    fn test_update_unknown_execution() {
        let repo = InMemoryExecutionRepository::default();
        let err = repo
            .update(WorkflowExecution::new(WorkflowKind::AiReasoning))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[test]
    fn test_prune_by_ttl_keeps_running() {
        let repo = InMemoryExecutionRepository::new(RetentionPolicy {
            ttl: Duration::from_secs(60),
            max_entries: 100,
        });
        let now = Utc::now();
        let old = finished(WorkflowKind::Classification, now - chrono::Duration::seconds(120));
        let fresh = finished(WorkflowKind::Classification, now);
        let mut running = WorkflowExecution::new(WorkflowKind::MlPipeline);
        running.status = ExecutionStatus::Running;
        running.start_time = now - chrono::Duration::days(2);

        let old_id = old.id.clone();
        repo.insert(old).unwrap();
        repo.insert(fresh).unwrap();
        repo.insert(running).unwrap();

        let pruned = repo.prune(now);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].id, old_id);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_prune_by_count_evicts_least_recently_used() {
        let repo = InMemoryExecutionRepository::new(RetentionPolicy {
            ttl: Duration::from_secs(3600),
            max_entries: 2,
        });
        let now = Utc::now();
        let a = finished(WorkflowKind::Classification, now);
        let b = finished(WorkflowKind::Classification, now);
        let c = finished(WorkflowKind::Classification, now);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        repo.insert(a).unwrap();
        repo.insert(b).unwrap();
        repo.insert(c).unwrap();

        // Touch `a` so that `b` becomes the least recently used.
        assert!(repo.get(&a_id).is_some());

        let pruned = repo.prune(now);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].id, b_id);
        assert!(repo.get(&a_id).is_some());
    }

    #[test]
    fn test_prune_never_evicts_running_over_capacity() {
        let repo = InMemoryExecutionRepository::new(RetentionPolicy {
            ttl: Duration::from_secs(3600),
            max_entries: 1,
        });
        for _ in 0..3 {
            let mut running = WorkflowExecution::new(WorkflowKind::AiReasoning);
            running.status = ExecutionStatus::Running;
            repo.insert(running).unwrap();
        }
        assert!(repo.prune(Utc::now()).is_empty());
        assert_eq!(repo.len(), 3);
    }

    #[test]
    fn test_filter() {
        let mut execution = WorkflowExecution::new(WorkflowKind::MlPipeline);
        execution.parent_id = Some("parent".to_string());

        assert!(ExecutionFilter::default().matches(&execution));
        assert!(ExecutionFilter {
            kind: Some(WorkflowKind::MlPipeline),
            parent_id: Some("parent".to_string()),
            ..Default::default()
        }
        .matches(&execution));
        assert!(!ExecutionFilter {
            status: Some(ExecutionStatus::Completed),
            ..Default::default()
        }
        .matches(&execution));
    }
}
