use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::{insert_and_queue, payload_for, NotificationService};
use crate::db::start_of_day;
use crate::error::AppError;
use crate::format::{
    high_production_message, low_production_message, production_digest, sanitize_message,
    CowVolume, ProductionDigest,
};
use crate::models::{NewNotification, NotificationType, Priority};
use crate::realtime::Outbox;
use crate::repository::{herd, milk, notifications};

/// More low-producing cows than this escalates the digest to critical.
const CRITICAL_LOW_COWS: usize = 5;

impl NotificationService {
    /// Compare today's per-cow totals against the production range and
    /// notify the managers of every cow outside it.
    ///
    /// A cow already reported today gets its notification refreshed rather
    /// than duplicated. Returns the number of notifications written,
    /// admin digests included.
    pub async fn check_milk_production_and_notify(&mut self, now: DateTime<Utc>) -> usize {
        let started = Instant::now();
        let result = self.run_production_check(now).await;
        self.complete("production_check", started, result).await
    }

    async fn run_production_check(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<(usize, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();
        let today = now.date_naive();

        let summaries = milk::daily_summaries_for(&mut tx, today).await?;
        tracing::info!("Found {} daily milk summaries for {}", summaries.len(), today);

        let low_threshold = self.config.low_production_liters;
        let high_threshold = self.config.high_production_liters;
        let mut low = Vec::new();
        let mut high = Vec::new();
        let mut count = 0;

        for summary in &summaries {
            let (kind, message) = if summary.total_volume < low_threshold {
                low.push(CowVolume {
                    name: summary.cow_name.clone(),
                    volume: summary.total_volume,
                });
                (
                    NotificationType::LowProduction,
                    low_production_message(
                        summary.cow_id,
                        &summary.cow_name,
                        summary.total_volume,
                        low_threshold,
                    ),
                )
            } else if summary.total_volume > high_threshold {
                high.push(CowVolume {
                    name: summary.cow_name.clone(),
                    volume: summary.total_volume,
                });
                (
                    NotificationType::HighProduction,
                    high_production_message(
                        summary.cow_id,
                        &summary.cow_name,
                        summary.total_volume,
                        high_threshold,
                    ),
                )
            } else {
                continue;
            };

            count += self
                .upsert_production_notifications(&mut tx, &mut outbox, summary.cow_id, kind, &message, now)
                .await?;
        }

        if !low.is_empty() || !high.is_empty() {
            let total_cows = herd::cow_count(&mut tx).await?;
            let total_production: f64 = summaries.iter().map(|s| s.total_volume).sum();
            let text = production_digest(&ProductionDigest {
                date: today,
                total_cows,
                total_production,
                low: &low,
                high: &high,
                low_threshold,
                high_threshold,
                low_limit: self.config.digest_low_detail_limit,
                high_limit: self.config.digest_high_detail_limit,
            });
            let priority = if low.len() > CRITICAL_LOW_COWS {
                Priority::Critical
            } else {
                Priority::High
            };
            count += self
                .notify_admins(&mut tx, &mut outbox, "production_summary", &text, None, priority, now)
                .await?;
        }

        tx.commit().await?;
        Ok((count, outbox))
    }

    async fn upsert_production_notifications(
        &mut self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        cow_id: i64,
        kind: NotificationType,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, sqlx::Error> {
        let managers = herd::cow_manager_ids(conn, cow_id).await?;
        if managers.is_empty() {
            tracing::warn!("No managers found for cow ID: {}", cow_id);
            return Ok(0);
        }

        let today_start = start_of_day(now);
        let mut count = 0;

        for user_id in managers {
            if self.rate_limited(user_id, self.config.rate_limit_per_user) {
                continue;
            }

            let existing =
                notifications::find_for_cow_since(conn, user_id, cow_id, kind.as_str(), today_start)
                    .await?;

            match existing {
                Some(existing) => {
                    let sanitized = sanitize_message(message);
                    notifications::refresh_notification(conn, existing.id, &sanitized, now).await?;
                    let mut refreshed =
                        NewNotification::for_cow(user_id, cow_id, kind.as_str(), sanitized, now);
                    refreshed.additional_data = existing.additional_data;
                    outbox.queue(user_id, payload_for(Some(existing.id), &refreshed, None));
                    tracing::debug!("Updated existing notification for user {}, cow {}", user_id, cow_id);
                }
                None => {
                    let new = NewNotification::for_cow(user_id, cow_id, kind.as_str(), message, now);
                    insert_and_queue(conn, outbox, new, None).await?;
                    tracing::debug!("Created new notification for user {}, cow {}", user_id, cow_id);
                }
            }
            count += 1;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::super::testing::{drain, service};
    use super::*;
    use crate::repository::fixtures;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn low_and_high_cows_notify_managers_and_admins() {
        let (mut service, pool, mut rx) = service().await;
        let farmer = fixtures::user(&pool, "Budi", "farmer").await;
        let admin = fixtures::user(&pool, "Admin", "admin").await;
        let molly = fixtures::cow(&pool, "Molly").await;
        let bella = fixtures::cow(&pool, "Bella").await;
        let daisy = fixtures::cow(&pool, "Daisy").await;
        for cow in [molly, bella, daisy] {
            fixtures::manage(&pool, farmer, cow).await;
        }
        let today = now().date_naive();
        fixtures::summary(&pool, molly, today, 12.0).await;
        fixtures::summary(&pool, bella, today, 27.5).await;
        fixtures::summary(&pool, daisy, today, 20.0).await;

        let count = service.check_milk_production_and_notify(now()).await;

        assert_eq!(count, 3);
        let listed = service
            .repository()
            .list_notifications_for_user(farmer, 10)
            .await
            .unwrap();
        let kinds: Vec<&str> = listed.iter().map(|n| n.kind.as_str()).collect();
        assert!(kinds.contains(&"low_production"));
        assert!(kinds.contains(&"high_production"));

        let admin_rows = service
            .repository()
            .list_notifications_for_user(admin, 10)
            .await
            .unwrap();
        assert_eq!(admin_rows.len(), 1);
        assert_eq!(admin_rows[0].kind, "admin_production_summary");
        assert!(admin_rows[0].message.starts_with("[ADMIN] 📊 RINGKASAN PRODUKSI HARIAN"));

        let pushed = drain(&mut rx);
        assert_eq!(pushed.len(), 3);
        let digest = pushed.iter().find(|m| m.user_id == admin).unwrap();
        assert_eq!(digest.payload.priority, Some(Priority::High));
    }

    #[tokio::test]
    async fn second_run_same_day_refreshes_instead_of_duplicating() {
        let (mut service, pool, _rx) = service().await;
        let farmer = fixtures::user(&pool, "Budi", "farmer").await;
        let molly = fixtures::cow(&pool, "Molly").await;
        fixtures::manage(&pool, farmer, molly).await;
        fixtures::summary(&pool, molly, now().date_naive(), 10.0).await;

        service.check_milk_production_and_notify(now()).await;
        sqlx::query("UPDATE notifications SET is_read = 1")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE daily_milk_summaries SET total_volume = 11.5")
            .execute(&pool)
            .await
            .unwrap();

        let later = now() + Duration::hours(1);
        assert_eq!(service.check_milk_production_and_notify(later).await, 1);

        let rows = service
            .repository()
            .list_notifications_for_user(farmer, 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_read);
        assert_eq!(rows[0].created_at, later);
        assert!(rows[0].message.contains("11.5 liter"));
    }

    #[tokio::test]
    async fn cow_without_managers_is_skipped() {
        let (mut service, pool, mut rx) = service().await;
        let molly = fixtures::cow(&pool, "Molly").await;
        fixtures::summary(&pool, molly, now().date_naive(), 5.0).await;

        // No managers and no admins.
        assert_eq!(service.check_milk_production_and_notify(now()).await, 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn many_low_cows_make_the_digest_critical() {
        let (mut service, pool, mut rx) = service().await;
        let admin = fixtures::user(&pool, "Admin", "admin").await;
        for i in 0..6 {
            let cow = fixtures::cow(&pool, &format!("Sapi {}", i)).await;
            fixtures::summary(&pool, cow, now().date_naive(), 8.0).await;
        }

        assert_eq!(service.check_milk_production_and_notify(now()).await, 1);

        let pushed = drain(&mut rx);
        assert_eq!(pushed[0].user_id, admin);
        assert_eq!(pushed[0].payload.priority, Some(Priority::Critical));
        assert!(pushed[0].payload.message.contains("... dan 1 sapi lainnya"));
    }

    #[tokio::test]
    async fn boundary_volumes_are_in_range() {
        let (mut service, pool, _rx) = service().await;
        let farmer = fixtures::user(&pool, "Budi", "farmer").await;
        let a = fixtures::cow(&pool, "A").await;
        let b = fixtures::cow(&pool, "B").await;
        fixtures::manage(&pool, farmer, a).await;
        fixtures::manage(&pool, farmer, b).await;
        fixtures::summary(&pool, a, now().date_naive(), 15.0).await;
        fixtures::summary(&pool, b, now().date_naive(), 25.0).await;

        assert_eq!(service.check_milk_production_and_notify(now()).await, 0);
    }
}
