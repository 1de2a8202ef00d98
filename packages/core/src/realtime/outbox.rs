//! Pushes held back until the sweep that produced them has committed.

use super::{emit_with_retry, NotificationPayload, RealtimeEmitter};
use crate::config::PushConfig;

#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<(i64, NotificationPayload)>,
}

/// Outcome of flushing an [`Outbox`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, user_id: i64, payload: NotificationPayload) {
        self.pending.push((user_id, payload));
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Stored types of the queued payloads, in queue order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(|(_, payload)| payload.kind.as_str())
    }

    /// Push every queued payload in order, each with retry.
    pub async fn flush(self, emitter: &dyn RealtimeEmitter, policy: &PushConfig) -> FlushReport {
        let mut report = FlushReport::default();
        for (user_id, payload) in &self.pending {
            if emit_with_retry(emitter, *user_id, payload, policy).await {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }
}
