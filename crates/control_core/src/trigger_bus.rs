use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::domain::{ControlId, RotateDirection};
use tokio::sync::broadcast;

/// Raw surface notification emitted before any control resolution, so
/// rule-based triggers observe every press and rotate regardless of whether
/// a live control accepted it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    ControlPress {
        control_id: ControlId,
        pressed: bool,
        device_id: Option<String>,
        at: DateTime<Utc>,
    },
    ControlRotate {
        control_id: ControlId,
        direction: RotateDirection,
        device_id: Option<String>,
        at: DateTime<Utc>,
    },
}

/// Fire-and-forget event sink; emit never fails and never blocks.
pub trait TriggerEventBus: Send + Sync {
    fn emit(&self, event: TriggerEvent);
}

pub struct BroadcastTriggerBus {
    tx: broadcast::Sender<TriggerEvent>,
}

impl BroadcastTriggerBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastTriggerBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl TriggerEventBus for BroadcastTriggerBus {
    fn emit(&self, event: TriggerEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}
