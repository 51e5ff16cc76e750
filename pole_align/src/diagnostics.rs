// Best-effort telemetry for the alignment loop. Every tick the controller
// publishes a snapshot; anyone interested subscribes. Nobody listening, or a
// subscriber falling behind, never slows down or fails the loop.

use crate::control::alignment::{AlignmentState, DriveCommand, TickOutcome};
use crate::control::offset_history::OffsetHistory;
use crate::core_modules::pole_analyzer::AnalyzedTarget;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSnapshot {
    pub tick: u64,
    pub state: AlignmentState,
    pub target: Option<AnalyzedTarget>,
    /// (angle offset, distance offset) pairs, oldest first.
    pub history: Vec<(f64, f64)>,
    pub command: DriveCommand,
}

impl AlignmentSnapshot {
    pub fn capture(outcome: &TickOutcome, history: &OffsetHistory) -> Self {
        Self {
            tick: outcome.tick,
            state: outcome.state,
            target: outcome.target,
            history: history.to_pairs(),
            command: outcome.command,
        }
    }
}

#[derive(Clone)]
pub struct DiagnosticsBus {
    snapshots_tx: broadcast::Sender<AlignmentSnapshot>,
}

impl DiagnosticsBus {
    pub fn new(capacity: usize) -> Self {
        let (snapshots_tx, _) = broadcast::channel::<AlignmentSnapshot>(capacity.max(1));
        Self { snapshots_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlignmentSnapshot> {
        self.snapshots_tx.subscribe()
    }

    /// Drops the snapshot when nobody is subscribed.
    pub fn publish(&self, snapshot: AlignmentSnapshot) {
        let _ = self.snapshots_tx.send(snapshot);
    }

    pub fn subscriber_count(&self) -> usize {
        self.snapshots_tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tick: u64) -> AlignmentSnapshot {
        AlignmentSnapshot {
            tick,
            state: AlignmentState::Seeking,
            target: None,
            history: Vec::new(),
            command: DriveCommand::Stop,
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = DiagnosticsBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(snapshot(1));
    }

    #[tokio::test]
    async fn slow_subscribers_lag_instead_of_blocking() {
        let bus = DiagnosticsBus::new(2);
        let mut rx = bus.subscribe();
        for tick in 1..=5 {
            bus.publish(snapshot(tick));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.map(|s| s.tick).ok(), Some(4));
        assert_eq!(rx.recv().await.map(|s| s.tick).ok(), Some(5));
    }
}
