//! C2 — typed publish/subscribe event bus for execution progress.
//!
//! Generalizes the notification channel pattern from
//! `bridges/transaction_monitor.rs` (`mpsc::UnboundedSender<TransactionEvent>`)
//! into a broadcast channel so a UI, a logger and a test harness can each
//! subscribe independently without stealing events from one another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::StepType;

/// The full event set callers can subscribe to, per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BridgeEvent {
    QuoteUpdated { quote_id: String },
    ExecutionStarted { execution_id: String, quote_id: String, total_steps: usize },
    StepChanged { execution_id: String, step_index: usize, step_type: StepType, status: String },
    ApprovalRequired { execution_id: String, step_index: usize, token: String, spender: String },
    TransactionSent { execution_id: String, step_index: usize, kind: TransactionKind, tx_hash: String },
    TransactionConfirmed { execution_id: String, step_index: usize, kind: TransactionKind, tx_hash: String },
    DepositStarted { execution_id: String, amount: String },
    DepositCompleted { execution_id: String, tx_hash: String, amount: String },
    ExecutionCompleted { execution_id: String, tx_hash: Option<String>, received_amount: Option<String> },
    ExecutionFailed { execution_id: String, error_code: String, message: String },
    StatusChanged { execution_id: String, status: String },
}

/// Disambiguates an approval transaction from the underlying step
/// transaction for `TransactionSent`/`TransactionConfirmed` consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Approval,
    Step,
    Deposit,
}

impl BridgeEvent {
    pub fn execution_id(&self) -> Option<&str> {
        use BridgeEvent::*;
        match self {
            QuoteUpdated { .. } => None,
            ExecutionStarted { execution_id, .. }
            | StepChanged { execution_id, .. }
            | ApprovalRequired { execution_id, .. }
            | TransactionSent { execution_id, .. }
            | TransactionConfirmed { execution_id, .. }
            | DepositStarted { execution_id, .. }
            | DepositCompleted { execution_id, .. }
            | ExecutionCompleted { execution_id, .. }
            | ExecutionFailed { execution_id, .. }
            | StatusChanged { execution_id, .. } => Some(execution_id),
        }
    }
}

/// A timestamped envelope around a [`BridgeEvent`], the unit actually sent
/// over the broadcast channel so subscribers can order events without a
/// second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: BridgeEvent,
    pub emitted_at: DateTime<Utc>,
}

const CHANNEL_CAPACITY: usize = 1024;

/// The event bus. Cheap to clone (an `Arc`-backed sender internally).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to all future events. Past events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Publish an event. Best-effort: if there are no subscribers this is a
    /// no-op, matching spec.md §4.9's "callbacks and event emissions are
    /// best-effort" rule — a slow/absent listener never blocks the pipeline.
    pub fn publish(&self, event: BridgeEvent) {
        trace!(?event, "publishing bridge event");
        let envelope = EventEnvelope { event, emitted_at: Utc::now() };
        // A SendError here only means there are zero receivers; that's fine.
        let _ = self.sender.send(envelope);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("subscribers", &self.sender.receiver_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_is_received_by_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(BridgeEvent::ExecutionStarted {
            execution_id: "exec-1".into(),
            quote_id: "quote-1".into(),
            total_steps: 2,
        });

        let got_a = a.recv().await.unwrap();
        let got_b = b.recv().await.unwrap();
        assert_eq!(got_a.event.execution_id(), Some("exec-1"));
        assert_eq!(got_b.event.execution_id(), Some("exec-1"));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(BridgeEvent::QuoteUpdated { quote_id: "q".into() });
    }
}
