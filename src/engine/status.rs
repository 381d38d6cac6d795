use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    Show,
    Update,
    Finish,
    Error,
}

/// Progress line for whatever presents run status to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub run_id: Uuid,
    pub phase: StatusPhase,
    pub text: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Fan-out of status messages. Publishing never blocks and never fails:
/// with no subscriber the message is dropped.
#[derive(Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusMessage>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusMessage> {
        self.tx.subscribe()
    }

    pub fn publish(&self, run_id: Uuid, phase: StatusPhase, text: impl Into<String>) {
        let msg = StatusMessage {
            run_id,
            phase,
            text: text.into(),
            at: chrono::Utc::now(),
        };
        tracing::debug!(run_id = %run_id, phase = ?phase, text = %msg.text, "status");
        let _ = self.tx.send(msg);
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}
