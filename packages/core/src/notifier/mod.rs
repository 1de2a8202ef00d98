//! Notification sweeps of the milk-production subsystem.
//!
//! Every public operation catches its own failures: it logs the error,
//! rolls its transaction back and reports zero. Writes of one operation
//! share a single transaction and real-time pushes are only sent once that
//! transaction has committed.

mod digest;
mod expiry;
mod production;
mod usage;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use crate::config::{NotificationConfig, PushConfig};
use crate::error::AppError;
use crate::format::{admin_message, sanitize_message};
use crate::metrics::AppMetrics;
use crate::models::{admin_type, NewNotification, NotificationStats, Priority};
use crate::rate_limiter::NotificationRateLimiter;
use crate::realtime::{NotificationPayload, Outbox, RealtimeEmitter, SharedEmitter};
use crate::repository::{herd, notifications, FarmRepository};

pub struct NotificationService {
    repo: FarmRepository,
    emitter: SharedEmitter,
    limiter: NotificationRateLimiter,
    config: NotificationConfig,
    metrics: Option<Arc<AppMetrics>>,
}

impl NotificationService {
    pub fn new(repo: FarmRepository, emitter: SharedEmitter, config: NotificationConfig) -> Self {
        Self {
            repo,
            emitter,
            limiter: NotificationRateLimiter::new(),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn repository(&self) -> &FarmRepository {
        &self.repo
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Insert one notification for `user_id` and push it.
    ///
    /// When `cow_id` is given the user must manage that cow, otherwise
    /// nothing is written. Returns the id of the new row.
    pub async fn create_notification(
        &mut self,
        user_id: i64,
        cow_id: Option<i64>,
        message: &str,
        kind: &str,
        additional_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let started = Instant::now();
        let result = self
            .run_create_notification(user_id, cow_id, message, kind, additional_data, now)
            .await;

        match result {
            Ok((id, outbox)) => {
                self.deliver(outbox).await;
                self.observe("create_notification", started, false);
                if let Some(id) = id {
                    tracing::info!("Notification created and sent to user {}", user_id);
                    Some(id)
                } else {
                    None
                }
            }
            Err(err) => {
                tracing::error!("Error creating notification: {}", err);
                self.observe("create_notification", started, true);
                None
            }
        }
    }

    async fn run_create_notification(
        &mut self,
        user_id: i64,
        cow_id: Option<i64>,
        message: &str,
        kind: &str,
        additional_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<(Option<i64>, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();

        if let Some(cow_id) = cow_id {
            if !herd::manages_cow(&mut tx, user_id, cow_id).await? {
                tracing::warn!("User {} does not have access to cow {}", user_id, cow_id);
                return Ok((None, outbox));
            }
        }

        let new = NewNotification {
            user_id,
            cow_id,
            product_stock_id: None,
            message: message.to_string(),
            kind: kind.to_string(),
            created_at: now,
            additional_data,
        };
        let id = insert_and_queue(&mut tx, &mut outbox, new, None).await?;

        tx.commit().await?;
        Ok((Some(id), outbox))
    }

    /// Notify every manager of `cow_id`. Returns the number notified.
    pub async fn create_notifications_for_cow(
        &mut self,
        cow_id: i64,
        message: &str,
        kind: &str,
        now: DateTime<Utc>,
    ) -> usize {
        let started = Instant::now();
        let result = self.run_notify_cow(cow_id, message, kind, now).await;
        self.complete("cow_notifications", started, result).await
    }

    async fn run_notify_cow(
        &mut self,
        cow_id: i64,
        message: &str,
        kind: &str,
        now: DateTime<Utc>,
    ) -> Result<(usize, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();

        if herd::find_cow(&mut tx, cow_id).await?.is_none() {
            tracing::warn!("Cow with ID {} not found", cow_id);
            return Ok((0, outbox));
        }

        let managers = herd::cow_manager_ids(&mut tx, cow_id).await?;
        tracing::info!("Found {} managers for cow ID: {}", managers.len(), cow_id);

        let count = self
            .notify_managers(&mut tx, &mut outbox, cow_id, &managers, kind, message, now)
            .await?;

        tx.commit().await?;
        Ok((count, outbox))
    }

    /// Delete notifications past the retention period.
    pub async fn cleanup_old_notifications(&mut self, now: DateTime<Utc>) -> u64 {
        let started = Instant::now();
        let cutoff = now - Duration::days(self.config.cleanup_days);

        match self.repo.delete_notifications_older_than(cutoff).await {
            Ok(deleted) => {
                tracing::info!("Cleaned up {} old notifications", deleted);
                if let Some(metrics) = &self.metrics {
                    metrics.notifications_cleaned_total.inc_by(deleted as f64);
                }
                self.observe("cleanup", started, false);
                deleted
            }
            Err(err) => {
                tracing::error!("Error cleaning up notifications: {}", err);
                self.observe("cleanup", started, true);
                0
            }
        }
    }

    /// Today's counters. Empty stats when the query fails.
    pub async fn get_notification_stats(&self, now: DateTime<Utc>) -> NotificationStats {
        match self.repo.notification_stats(now).await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::error!("Error getting notification stats: {}", err);
                NotificationStats::default()
            }
        }
    }

    /// Count the notification against `user_id`'s window. Returns `true`
    /// when the user is over `limit` and the notification must be skipped.
    fn rate_limited(&mut self, user_id: i64, limit: u32) -> bool {
        let limited = self
            .limiter
            .is_rate_limited(user_id, limit, self.config.rate_limit_window);
        if limited {
            tracing::warn!("Rate limit exceeded for user {}", user_id);
            if let Some(metrics) = &self.metrics {
                metrics.rate_limited_total.inc();
            }
        }
        limited
    }

    /// Insert `message` for each manager in `managers` that is not rate limited.
    #[allow(clippy::too_many_arguments)]
    async fn notify_managers(
        &mut self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        cow_id: i64,
        managers: &[i64],
        kind: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, sqlx::Error> {
        let mut count = 0;
        for &manager in managers {
            if self.rate_limited(manager, self.config.rate_limit_per_user) {
                continue;
            }
            let new = NewNotification::for_cow(manager, cow_id, kind, message, now);
            insert_and_queue(conn, outbox, new, None).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Send `[ADMIN] {message}` to every admin user as `admin_{kind}`.
    #[allow(clippy::too_many_arguments)]
    async fn notify_admins(
        &mut self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        kind: &str,
        message: &str,
        cow_id: Option<i64>,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Result<usize, sqlx::Error> {
        let admins = herd::admin_user_ids(conn).await?;
        if admins.is_empty() {
            tracing::warn!("No admin users found in system");
            return Ok(0);
        }

        let stored_type = admin_type(kind);
        let text = admin_message(message);
        let mut count = 0;

        for admin in admins {
            if self.rate_limited(admin, self.config.admin_rate_limit) {
                continue;
            }
            let new = NewNotification {
                user_id: admin,
                cow_id,
                product_stock_id: None,
                message: text.clone(),
                kind: stored_type.clone(),
                created_at: now,
                additional_data: None,
            };
            insert_and_queue(conn, outbox, new, Some(priority)).await?;
            count += 1;
        }

        if count > 0 {
            tracing::info!("Created {} admin notifications", count);
        }
        Ok(count)
    }

    /// Settle a finished operation: push its outbox on success, record
    /// timing, and turn failures into zero.
    async fn complete(
        &self,
        operation: &str,
        started: Instant,
        result: Result<(usize, Outbox), AppError>,
    ) -> usize {
        complete_sweep(
            operation,
            started,
            result,
            self.emitter.as_ref(),
            &self.config.push,
            self.metrics.as_deref(),
        )
        .await
    }

    async fn deliver(&self, outbox: Outbox) {
        deliver_outbox(
            outbox,
            self.emitter.as_ref(),
            &self.config.push,
            self.metrics.as_deref(),
        )
        .await;
    }

    fn observe(&self, operation: &str, started: Instant, failed: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_sweep(operation, started.elapsed().as_secs_f64(), failed);
        }
    }
}

/// Sanitize, insert and queue the push for one notification.
pub(crate) async fn insert_and_queue(
    conn: &mut SqliteConnection,
    outbox: &mut Outbox,
    mut new: NewNotification,
    priority: Option<Priority>,
) -> Result<i64, sqlx::Error> {
    new.message = sanitize_message(&new.message);
    let id = notifications::insert_notification(conn, &new).await?;
    outbox.queue(new.user_id, payload_for(Some(id), &new, priority));
    Ok(id)
}

pub(crate) fn payload_for(
    id: Option<i64>,
    new: &NewNotification,
    priority: Option<Priority>,
) -> NotificationPayload {
    NotificationPayload {
        id,
        user_id: new.user_id,
        cow_id: new.cow_id,
        product_stock_id: new.product_stock_id,
        message: new.message.clone(),
        kind: new.kind.clone(),
        priority,
        is_read: false,
        created_at: new.created_at,
        additional_data: new.additional_data.clone(),
    }
}

pub(crate) async fn deliver_outbox(
    outbox: Outbox,
    emitter: &dyn RealtimeEmitter,
    policy: &PushConfig,
    metrics: Option<&AppMetrics>,
) {
    if outbox.is_empty() {
        return;
    }
    if let Some(metrics) = metrics {
        for kind in outbox.kinds() {
            metrics
                .notifications_written_total
                .with_label_values(&[kind])
                .inc();
        }
    }

    let report = outbox.flush(emitter, policy).await;
    if report.failed > 0 {
        tracing::warn!(
            "{} of {} pushes failed",
            report.failed,
            report.failed + report.delivered
        );
        if let Some(metrics) = metrics {
            metrics.push_failures_total.inc_by(report.failed as f64);
        }
    }
}

pub(crate) async fn complete_sweep(
    operation: &str,
    started: Instant,
    result: Result<(usize, Outbox), AppError>,
    emitter: &dyn RealtimeEmitter,
    policy: &PushConfig,
    metrics: Option<&AppMetrics>,
) -> usize {
    match result {
        Ok((count, outbox)) => {
            deliver_outbox(outbox, emitter, policy, metrics).await;
            let elapsed = started.elapsed().as_secs_f64();
            tracing::info!(
                "{} completed in {:.3}s: {} notifications",
                operation,
                elapsed,
                count
            );
            if let Some(metrics) = metrics {
                metrics.observe_sweep(operation, elapsed, false);
            }
            count
        }
        Err(err) => {
            let elapsed = started.elapsed().as_secs_f64();
            tracing::error!(
                "{} failed after {:.3}s, changes rolled back: {}",
                operation,
                elapsed,
                err
            );
            if let Some(metrics) = metrics {
                metrics.observe_sweep(operation, elapsed, true);
            }
            0
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{drain, service};
    use super::*;
    use chrono::TimeZone;

    use crate::repository::fixtures;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn create_notification_stores_sanitized_text_and_pushes() {
        let (mut service, pool, mut rx) = service().await;
        let user = fixtures::user(&pool, "Budi", "farmer").await;

        let id = service
            .create_notification(
                user,
                None,
                "<b>Pakan</b> habis",
                "custom",
                Some(serde_json::json!({ "silo": 2 })),
                now(),
            )
            .await
            .unwrap();

        let listed = service
            .repository()
            .list_notifications_for_user(user, 10)
            .await
            .unwrap();
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].message, "&lt;b&gt;Pakan&lt;/b&gt; habis");
        assert_eq!(listed[0].additional_data.as_ref().unwrap()["silo"], 2);

        let pushed = drain(&mut rx);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].payload.id, Some(id));
    }

    #[tokio::test]
    async fn create_notification_requires_cow_access() {
        let (mut service, pool, mut rx) = service().await;
        let user = fixtures::user(&pool, "Budi", "farmer").await;
        let cow = fixtures::cow(&pool, "Molly").await;

        let denied = service
            .create_notification(user, Some(cow), "hi", "custom", None, now())
            .await;
        assert!(denied.is_none());
        assert!(drain(&mut rx).is_empty());

        fixtures::manage(&pool, user, cow).await;
        let allowed = service
            .create_notification(user, Some(cow), "hi", "custom", None, now())
            .await;
        assert!(allowed.is_some());
    }

    #[tokio::test]
    async fn cow_notifications_reach_every_manager() {
        let (mut service, pool, mut rx) = service().await;
        let a = fixtures::user(&pool, "Budi", "farmer").await;
        let b = fixtures::user(&pool, "Sari", "farmer").await;
        let cow = fixtures::cow(&pool, "Molly").await;
        fixtures::manage(&pool, a, cow).await;
        fixtures::manage(&pool, b, cow).await;

        let count = service
            .create_notifications_for_cow(cow, "Jadwal vaksin besok", "health_check", now())
            .await;

        assert_eq!(count, 2);
        let users: Vec<i64> = drain(&mut rx).iter().map(|m| m.user_id).collect();
        assert_eq!(users, vec![a, b]);
        assert_eq!(service.create_notifications_for_cow(999, "x", "y", now()).await, 0);
    }

    #[tokio::test]
    async fn rate_limited_managers_are_skipped() {
        let mut config = testing::fast_config();
        config.rate_limit_per_user = 1;
        let (mut service, pool, _rx) = testing::service_with(config).await;
        let user = fixtures::user(&pool, "Budi", "farmer").await;
        let cow = fixtures::cow(&pool, "Molly").await;
        fixtures::manage(&pool, user, cow).await;

        assert_eq!(service.create_notifications_for_cow(cow, "a", "t", now()).await, 1);
        assert_eq!(service.create_notifications_for_cow(cow, "b", "t", now()).await, 0);
    }

    #[tokio::test]
    async fn cleanup_uses_retention_period() {
        let (mut service, pool, _rx) = service().await;
        let user = fixtures::user(&pool, "Budi", "farmer").await;
        service
            .create_notification(user, None, "old", "custom", None, now() - Duration::days(31))
            .await;
        service
            .create_notification(user, None, "new", "custom", None, now() - Duration::days(29))
            .await;

        assert_eq!(service.cleanup_old_notifications(now()).await, 1);
        assert_eq!(fixtures::count(&pool, "SELECT COUNT(*) FROM notifications").await, 1);
    }

    #[tokio::test]
    async fn stats_report_todays_counts() {
        let (mut service, pool, _rx) = service().await;
        let user = fixtures::user(&pool, "Budi", "farmer").await;
        service
            .create_notification(user, None, "x", "milk_warning", None, now())
            .await;

        let stats = service.get_notification_stats(now()).await;
        assert_eq!(stats.total_today, 1);
        assert_eq!(stats.by_type["milk_warning"], 1);
    }

    #[tokio::test]
    async fn failed_operation_reports_zero() {
        let (mut service, pool, mut rx) = service().await;
        let user = fixtures::user(&pool, "Budi", "farmer").await;
        let cow = fixtures::cow(&pool, "Molly").await;
        fixtures::manage(&pool, user, cow).await;
        sqlx::query("DROP TABLE notifications")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(service.create_notifications_for_cow(cow, "x", "t", now()).await, 0);
        assert!(drain(&mut rx).is_empty());
    }
}
