//! Real-time notification push.
//!
//! The socket server that connected clients listen on is owned by another
//! service. This module only defines the payload it expects and the
//! [`RealtimeEmitter`] seam used to reach it, plus delivery with retry.

pub mod broadcast;
pub mod gateway;
pub mod outbox;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EmitError;
use crate::models::{Notification, Priority};

pub use broadcast::{BroadcastEmitter, RealtimeMessage};
pub use gateway::HttpEmitter;
pub use outbox::{FlushReport, Outbox};
pub use retry::emit_with_retry;

/// JSON body pushed to a user's real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: Option<i64>,
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cow_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_stock_id: Option<i64>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
}

impl From<&Notification> for NotificationPayload {
    fn from(notification: &Notification) -> Self {
        Self {
            id: Some(notification.id),
            user_id: notification.user_id,
            cow_id: notification.cow_id,
            product_stock_id: notification.product_stock_id,
            message: notification.message.clone(),
            kind: notification.kind.clone(),
            priority: None,
            is_read: notification.is_read,
            created_at: notification.created_at,
            additional_data: notification.additional_data.clone(),
        }
    }
}

/// A destination for real-time notification pushes.
#[async_trait]
pub trait RealtimeEmitter: Send + Sync {
    /// Deliver one payload to `user_id`. A single attempt, no retry.
    async fn emit(&self, user_id: i64, payload: &NotificationPayload) -> Result<(), EmitError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

pub type SharedEmitter = Arc<dyn RealtimeEmitter>;

/// Emitter used when no push gateway is configured: logs and succeeds.
#[derive(Debug, Default, Clone)]
pub struct LogEmitter;

#[async_trait]
impl RealtimeEmitter for LogEmitter {
    async fn emit(&self, user_id: i64, payload: &NotificationPayload) -> Result<(), EmitError> {
        tracing::debug!(
            "No real-time gateway configured; {} notification for user {} not pushed",
            payload.kind,
            user_id
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_notification() -> Notification {
        Notification {
            id: 11,
            user_id: 3,
            cow_id: Some(5),
            product_stock_id: None,
            message: "Produksi susu rendah!".into(),
            kind: "low_production".into(),
            is_read: false,
            created_at: Utc::now(),
            additional_data: None,
        }
    }

    #[test]
    fn payload_from_notification_copies_fields() {
        let n = sample_notification();
        let payload = NotificationPayload::from(&n);
        assert_eq!(payload.id, Some(11));
        assert_eq!(payload.cow_id, Some(5));
        assert_eq!(payload.kind, "low_production");
        assert!(payload.priority.is_none());
    }

    #[test]
    fn payload_json_uses_type_key_and_omits_empty_fields() {
        let payload = NotificationPayload::from(&sample_notification());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "low_production");
        assert_eq!(json["is_read"], false);
        assert!(json.get("product_stock_id").is_none());
        assert!(json.get("priority").is_none());
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn priority_serializes_lowercase() {
        let mut payload = NotificationPayload::from(&sample_notification());
        payload.priority = Some(Priority::Critical);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["priority"], "critical");
    }

    #[tokio::test]
    async fn log_emitter_always_succeeds() {
        let payload = NotificationPayload::from(&sample_notification());
        assert!(LogEmitter.emit(3, &payload).await.is_ok());
    }
}
