//! Push delivery with a bounded number of attempts.

use std::time::Duration;

use rand::Rng;

use super::{NotificationPayload, RealtimeEmitter};
use crate::config::PushConfig;

/// Push `payload` to `user_id`, retrying on failure.
///
/// Makes up to `policy.max_attempts` attempts, sleeping `retry_delay` plus
/// a random jitter between failures. Never fails: the outcome is logged and
/// returned as `true` when some attempt succeeded.
pub async fn emit_with_retry(
    emitter: &dyn RealtimeEmitter,
    user_id: i64,
    payload: &NotificationPayload,
    policy: &PushConfig,
) -> bool {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match emitter.emit(user_id, payload).await {
            Ok(()) => {
                tracing::debug!(
                    "Notification pushed to user {} via {} (attempt {})",
                    user_id,
                    emitter.name(),
                    attempt
                );
                return true;
            }
            Err(err) if attempt == max_attempts => {
                tracing::error!(
                    "Failed to push notification to user {} after {} attempts: {}",
                    user_id,
                    max_attempts,
                    err
                );
            }
            Err(err) => {
                tracing::warn!("Push attempt {} failed: {}, retrying...", attempt, err);
                tokio::time::sleep(backoff(policy)).await;
            }
        }
    }

    false
}

fn backoff(policy: &PushConfig) -> Duration {
    let jitter_ms = policy.retry_jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return policy.retry_delay;
    }
    policy.retry_delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
}
