//! In-process fan-out of pushed notifications.
//!
//! Used when the socket layer runs in the same process: it subscribes to
//! the channel and forwards each message to the user's connections.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{NotificationPayload, RealtimeEmitter};
use crate::error::EmitError;

/// One pushed notification, addressed to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeMessage {
    pub user_id: i64,
    pub payload: NotificationPayload,
}

pub struct BroadcastEmitter {
    sender: broadcast::Sender<RealtimeMessage>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl RealtimeEmitter for BroadcastEmitter {
    async fn emit(&self, user_id: i64, payload: &NotificationPayload) -> Result<(), EmitError> {
        self.sender
            .send(RealtimeMessage {
                user_id,
                payload: payload.clone(),
            })
            .map(|_| ())
            .map_err(|_| EmitError::ChannelClosed)
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}
