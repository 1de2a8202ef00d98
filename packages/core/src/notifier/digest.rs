use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

use super::NotificationService;
use crate::db::start_of_day;
use crate::error::AppError;
use crate::format::{critical_alert_message, daily_digest, DailyDigest};
use crate::models::{MilkStatus, Priority};
use crate::realtime::Outbox;
use crate::repository::{herd, milk, notifications};

impl NotificationService {
    /// Farm-wide end of day digest for admins.
    pub async fn create_daily_admin_summary(&mut self, now: DateTime<Utc>) -> usize {
        let started = Instant::now();
        let result = self.run_daily_summary(now).await;
        self.complete("daily_summary", started, result).await
    }

    async fn run_daily_summary(&mut self, now: DateTime<Utc>) -> Result<(usize, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();

        let today = now.date_naive();
        let today_start = start_of_day(now);
        let tomorrow_start = today_start + Duration::days(1);

        let summaries = milk::daily_summaries_for(&mut tx, today).await?;
        let low_threshold = self.config.low_production_liters;
        let high_threshold = self.config.high_production_liters;

        let text = daily_digest(&DailyDigest {
            date: today,
            total_cows: herd::cow_count(&mut tx).await?,
            total_production: summaries.iter().map(|s| s.total_volume).sum(),
            low_cows: summaries
                .iter()
                .filter(|s| s.total_volume < low_threshold)
                .count(),
            high_cows: summaries
                .iter()
                .filter(|s| s.total_volume > high_threshold)
                .count(),
            fresh_batches: milk::count_batches_with_status(&mut tx, MilkStatus::Fresh).await?,
            expired_today: milk::expired_batches_between(&mut tx, today_start, tomorrow_start)
                .await?
                .len() as i64,
            notifications_today: notifications::count_between(&mut tx, today_start, tomorrow_start)
                .await?,
            low_threshold,
            high_threshold,
        });

        let count = self
            .notify_admins(&mut tx, &mut outbox, "daily_summary", &text, None, Priority::High, now)
            .await?;

        tx.commit().await?;
        Ok((count, outbox))
    }

    /// Immediate alert to every admin, stored as `admin_critical_{alert_type}`.
    pub async fn create_critical_admin_alert(
        &mut self,
        message: &str,
        alert_type: &str,
        cow_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> usize {
        let started = Instant::now();
        let result = self.run_critical_alert(message, alert_type, cow_id, now).await;
        self.complete("critical_alert", started, result).await
    }

    async fn run_critical_alert(
        &mut self,
        message: &str,
        alert_type: &str,
        cow_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(usize, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();

        let count = self
            .notify_admins(
                &mut tx,
                &mut outbox,
                &format!("critical_{}", alert_type),
                &critical_alert_message(message),
                cow_id,
                Priority::Critical,
                now,
            )
            .await?;

        tx.commit().await?;
        Ok((count, outbox))
    }
}
