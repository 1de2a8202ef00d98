use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use super::{insert_and_queue, NotificationService};
use crate::db::start_of_day;
use crate::error::AppError;
use crate::format::{
    batch_expired_message, batch_marker, batch_warning_message, expiry_digest, sanitize_message,
    ExpiryDigest,
};
use crate::models::{MilkBatch, MilkStatus, NewNotification, NotificationType, Priority};
use crate::realtime::Outbox;
use crate::repository::{herd, milk, notifications};

/// More batches expired today than this escalates the digest to critical.
const CRITICAL_EXPIRED_BATCHES: usize = 3;

impl NotificationService {
    /// Expire overdue fresh batches, warn about batches close to expiry and
    /// send admins the batch status digest.
    pub async fn check_milk_expiry_and_notify(&mut self, now: DateTime<Utc>) -> usize {
        let started = Instant::now();
        let result = self.run_expiry_check(now).await;
        self.complete("expiry_check", started, result).await
    }

    async fn run_expiry_check(&mut self, now: DateTime<Utc>) -> Result<(usize, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();

        let mut count = self.process_expired_batches(&mut tx, &mut outbox, now).await?;
        count += self.process_warning_batches(&mut tx, &mut outbox, now).await?;
        count += self.expiry_admin_summary(&mut tx, &mut outbox, now).await?;

        tx.commit().await?;
        Ok((count, outbox))
    }

    async fn process_expired_batches(
        &mut self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        now: DateTime<Utc>,
    ) -> Result<usize, sqlx::Error> {
        let expired = milk::fresh_batches_expired_before(conn, now).await?;
        tracing::info!("Found {} expired milk batches", expired.len());

        let mut count = 0;
        for batch in &expired {
            match self.expire_batch(conn, outbox, batch, now).await {
                Ok(n) => count += n,
                Err(err) => {
                    tracing::error!("Error processing expired batch {}: {}", batch.id, err);
                }
            }
        }
        Ok(count)
    }

    async fn expire_batch(
        &mut self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        batch: &MilkBatch,
        now: DateTime<Utc>,
    ) -> Result<usize, sqlx::Error> {
        milk::set_batch_status(conn, batch.id, MilkStatus::Expired, now).await?;

        let cow_ids = milk::batch_cow_ids(conn, batch.id).await?;
        if cow_ids.is_empty() {
            tracing::warn!("No milking sessions found for batch ID: {}", batch.id);
            return Ok(0);
        }

        let mut count = 0;
        for cow_id in cow_ids {
            let Some(cow) = herd::find_cow(conn, cow_id).await? else {
                tracing::warn!("Cow with ID {} not found", cow_id);
                continue;
            };
            let message = batch_expired_message(
                &batch.batch_number,
                batch.total_volume,
                &cow.name,
                batch.expiry_date,
            );
            let managers = herd::cow_manager_ids(conn, cow_id).await?;
            count += self
                .notify_managers(
                    conn,
                    outbox,
                    cow_id,
                    &managers,
                    NotificationType::MilkExpiry.as_str(),
                    &message,
                    now,
                )
                .await?;
        }
        Ok(count)
    }

    async fn process_warning_batches(
        &mut self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        now: DateTime<Utc>,
    ) -> Result<usize, sqlx::Error> {
        let horizon = now + self.config.expiry_warning;
        let warning = milk::fresh_batches_expiring_between(conn, now, horizon).await?;
        tracing::info!(
            "Found {} batches that will expire within {} hours",
            warning.len(),
            self.config.expiry_warning.num_hours()
        );

        let mut count = 0;
        for batch in &warning {
            match self.warn_batch(conn, outbox, batch, now).await {
                Ok(n) => count += n,
                Err(err) => {
                    tracing::error!("Error processing warning batch {}: {}", batch.id, err);
                }
            }
        }
        Ok(count)
    }

    async fn warn_batch(
        &mut self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        batch: &MilkBatch,
        now: DateTime<Utc>,
    ) -> Result<usize, sqlx::Error> {
        let cow_ids = milk::batch_cow_ids(conn, batch.id).await?;
        if cow_ids.is_empty() {
            tracing::warn!("No milking sessions found for batch ID: {}", batch.id);
            return Ok(0);
        }

        let kind = NotificationType::MilkWarning.as_str();
        let marker = sanitize_message(&batch_marker(&batch.batch_number));
        let today_start = start_of_day(now);
        let mut count = 0;

        for cow_id in cow_ids {
            let Some(cow) = herd::find_cow(conn, cow_id).await? else {
                tracing::warn!("Cow with ID {} not found", cow_id);
                continue;
            };

            for user_id in herd::cow_manager_ids(conn, cow_id).await? {
                let already_sent = notifications::exists_for_cow_with_marker_since(
                    conn,
                    user_id,
                    cow_id,
                    kind,
                    &marker,
                    today_start,
                )
                .await?;
                if already_sent {
                    tracing::debug!(
                        "Warning notification already sent today for batch {} to manager {}",
                        batch.batch_number,
                        user_id
                    );
                    continue;
                }

                if self.rate_limited(user_id, self.config.rate_limit_per_user) {
                    continue;
                }

                let message = batch_warning_message(
                    &batch.batch_number,
                    batch.total_volume,
                    &cow.name,
                    batch.expiry_date,
                    now,
                );
                let new = NewNotification::for_cow(user_id, cow_id, kind, message, now);
                insert_and_queue(conn, outbox, new, None).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn expiry_admin_summary(
        &mut self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        now: DateTime<Utc>,
    ) -> Result<usize, sqlx::Error> {
        let today_start = start_of_day(now);
        let expired_today =
            milk::expired_batches_between(conn, today_start, today_start + Duration::days(1))
                .await?;
        let warning =
            milk::fresh_batches_expiring_between(conn, now, now + self.config.expiry_warning)
                .await?;

        if expired_today.is_empty() && warning.is_empty() {
            return Ok(0);
        }

        let fresh_batches = milk::count_batches_with_status(conn, MilkStatus::Fresh).await?;
        let text = expiry_digest(&ExpiryDigest {
            at: now,
            fresh_batches,
            expired_today: expired_today.len(),
            expired_volume: expired_today.iter().map(|b| b.total_volume).sum(),
            warning_batches: warning.len(),
            warning_volume: warning.iter().map(|b| b.total_volume).sum(),
            warning_hours: self.config.expiry_warning.num_hours(),
            price_per_liter: self.config.milk_price_per_liter,
        });
        let priority = if expired_today.len() > CRITICAL_EXPIRED_BATCHES {
            Priority::Critical
        } else {
            Priority::High
        };

        self.notify_admins(conn, outbox, "expiry_summary", &text, None, priority, now)
            .await
    }
}
