//! Post-commit side effects
//!
//! Engines do not dispatch framework-wide signals. The caller hands them a
//! [`HookList`]; after every successful store mutation the engine calls
//! each hook in order with a [`PortalEvent`]. [`EventBus`] is one such hook
//! and re-broadcasts events to any number of subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Side-effect notifications emitted by the engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PortalEvent {
    /// An entity was created or updated by the upsert engine
    EntitySaved {
        model: String,
        entity_id: Uuid,
        created: bool,
        timestamp: DateTime<Utc>,
    },

    /// A batch upload finished (successfully or not)
    UploadFinished {
        model: String,
        job_id: Option<Uuid>,
        success_count: usize,
        failed_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Recurrence sync created an occurrence
    OccurrenceCreated {
        template_id: Uuid,
        occurrence_id: Uuid,
        start_at: DateTime<Utc>,
    },

    /// Recurrence sync refreshed an occurrence from its template
    OccurrenceUpdated {
        template_id: Uuid,
        occurrence_id: Uuid,
    },

    /// Recurrence sync removed an occurrence
    OccurrenceDeleted {
        template_id: Uuid,
        occurrence_id: Uuid,
    },
}

/// Observer invoked after a store mutation commits
pub trait PostCommitHook: Send + Sync {
    fn on_commit(&self, event: &PortalEvent);
}

/// Ordered list of post-commit hooks
#[derive(Clone, Default)]
pub struct HookList {
    hooks: Vec<Arc<dyn PostCommitHook>>,
}

impl HookList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; hooks run in registration order
    pub fn with(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn push(&mut self, hook: Arc<dyn PostCommitHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook for one event
    pub fn notify(&self, event: &PortalEvent) {
        for hook in &self.hooks {
            hook.on_commit(event);
        }
    }
}

impl std::fmt::Debug for HookList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookList").field("hooks", &self.hooks.len()).finish()
    }
}

/// Broadcast channel for portal events
///
/// Events are dropped when no subscriber is listening.
pub struct EventBus {
    tx: broadcast::Sender<PortalEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PortalEvent,
    ) -> Result<usize, broadcast::error::SendError<PortalEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PortalEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl PostCommitHook for EventBus {
    fn on_commit(&self, event: &PortalEvent) {
        self.emit_lossy(event.clone());
    }
}
