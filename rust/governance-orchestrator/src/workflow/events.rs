//! Event bus for real-time execution events.
//!
//! ```text
//! ExecutionTracker → EventBus::publish(event) → global subscribers
//!                                            → subscribers of that execution
//! ```
//!
//! Events are ephemeral. A subscriber that falls more than
//! [`CHANNEL_CAPACITY`] events behind receives `RecvError::Lagged`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::execution::{ExecutionStatus, Severity, WorkflowKind};

/// Channel capacity per subscription.
pub const CHANNEL_CAPACITY: usize = 256;

/// Execution lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: String,
        kind: WorkflowKind,
        parent_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A stage began.
    StepStarted {
        execution_id: String,
        step: String,
    },

    Progress {
        execution_id: String,
        step: String,
        progress: f64,
    },

    /// An error was appended to the execution.
    ErrorRecorded {
        execution_id: String,
        code: String,
        severity: Severity,
        message: String,
    },

    /// The execution reached a terminal status.
    ExecutionFinished {
        execution_id: String,
        status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Execution this event belongs to.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::StepStarted { execution_id, .. }
            | Self::Progress { execution_id, .. }
            | Self::ErrorRecorded { execution_id, .. }
            | Self::ExecutionFinished { execution_id, .. } => execution_id,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExecutionFinished { .. })
    }
}

/// Pub/sub hub for execution events.
///
/// Cloning is cheap and every clone publishes to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    global: broadcast::Sender<ExecutionEvent>,
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<ExecutionEvent>>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("global_subscribers", &self.global.receiver_count())
            .field("execution_channels", &self.channels.read().len())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (global, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            global,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to events of every execution.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.global.subscribe()
    }

    /// Subscribe to events of one execution.
    #[must_use]
    pub fn subscribe_execution(&self, execution_id: &str) -> broadcast::Receiver<ExecutionEvent> {
        let mut channels = self.channels.write();
        channels
            .entry(execution_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event. Returns the number of receivers reached.
    ///
    /// Terminal events close the per-execution channel after delivery.
    pub fn publish(&self, event: ExecutionEvent) -> usize {
        let terminal = event.is_terminal();
        let execution_id = event.execution_id().to_string();

        let mut delivered = self.global.send(event.clone()).unwrap_or(0);

        {
            let channels = self.channels.read();
            if let Some(sender) = channels.get(&execution_id) {
                delivered += sender.send(event).unwrap_or(0);
            }
        }

        if terminal {
            self.close_execution(&execution_id);
        }
        delivered
    }

    /// Drop the channel of one execution. Subscribers drain buffered events
    /// and then see the channel closed.
    pub fn close_execution(&self, execution_id: &str) {
        self.channels.write().remove(execution_id);
    }

    /// Number of executions with dedicated subscribers.
    #[must_use]
    pub fn active_channels(&self) -> usize {
        self.channels.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
