use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event bus between the cache coordinator and its observers.
pub struct EventBus {
    /// Published snapshots (coordinator → observers)
    pub snapshots: broadcast::Sender<SnapshotEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            snapshots: broadcast::channel(16).0,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Emitted after each refresh cycle publishes a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEvent {
    /// Sequence number of the completed cycle.
    pub cycle: u64,
    pub environments: usize,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
