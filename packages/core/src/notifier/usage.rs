use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::{insert_and_queue, NotificationService};
use crate::db::start_of_day;
use crate::error::AppError;
use crate::format::{
    batch_marker, batch_status_used_message, batch_used_message, sanitize_message, usage_digest,
    UsageDigest,
};
use crate::models::{MilkBatch, MilkStatus, NewNotification, NotificationType, Priority};
use crate::realtime::Outbox;
use crate::repository::{herd, milk, notifications};

impl NotificationService {
    /// Tell managers about batches switched to `used` in the look-back
    /// window, then send admins a usage digest.
    pub async fn check_milk_usage_and_notify(&mut self, now: DateTime<Utc>) -> usize {
        let started = Instant::now();
        let result = self.run_usage_check(now).await;
        self.complete("usage_check", started, result).await
    }

    async fn run_usage_check(&mut self, now: DateTime<Utc>) -> Result<(usize, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();

        let used = milk::used_batches_updated_since(&mut tx, now - self.config.usage_lookback).await?;
        tracing::info!("Found {} recently used milk batches", used.len());

        let mut count = 0;
        for batch in &used {
            match self.notify_batch_used(&mut tx, &mut outbox, batch, now).await {
                Ok(n) => count += n,
                Err(err) => tracing::error!("Error processing used batch {}: {}", batch.id, err),
            }
        }

        if !used.is_empty() {
            let today_start = start_of_day(now);
            let text = usage_digest(&UsageDigest {
                at: now,
                batches_used: used.len(),
                used_today: used.iter().filter(|b| b.updated_at >= today_start).count(),
                total_volume: used.iter().map(|b| b.total_volume).sum(),
            });
            count += self
                .notify_admins(&mut tx, &mut outbox, "usage_summary", &text, None, Priority::Medium, now)
                .await?;
        }

        tx.commit().await?;
        Ok((count, outbox))
    }

    async fn notify_batch_used(
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

        let kind = NotificationType::MilkUsed.as_str();
        let marker = sanitize_message(&batch_marker(&batch.batch_number));
        let today_start = start_of_day(now);
        let mut count = 0;

        for cow_id in cow_ids {
            let Some(cow) = herd::find_cow(conn, cow_id).await? else {
                tracing::warn!("Cow with ID {} not found", cow_id);
                continue;
            };

            for user_id in herd::cow_manager_ids(conn, cow_id).await? {
                if self.rate_limited(user_id, self.config.rate_limit_per_user) {
                    continue;
                }

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
                        "Usage notification already sent for batch {} to manager {}",
                        batch.batch_number,
                        user_id
                    );
                    continue;
                }

                let message = batch_used_message(
                    &batch.batch_number,
                    batch.total_volume,
                    &cow.name,
                    batch.updated_at,
                    Some(batch.created_at),
                );
                let new = NewNotification::for_cow(user_id, cow_id, kind, message, now);
                insert_and_queue(conn, outbox, new, None).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Hook for callers that change a batch's status.
    ///
    /// A transition into `used` notifies the managers of every cow that
    /// contributed to the batch. Other transitions are ignored.
    pub async fn notify_batch_status_change(
        &mut self,
        batch_id: i64,
        old_status: MilkStatus,
        new_status: MilkStatus,
        now: DateTime<Utc>,
    ) -> usize {
        if new_status != MilkStatus::Used || old_status == MilkStatus::Used {
            return 0;
        }

        let started = Instant::now();
        let result = self.run_batch_status_change(batch_id, now).await;
        self.complete("batch_status_change", started, result).await
    }

    async fn run_batch_status_change(
        &mut self,
        batch_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(usize, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();

        let Some(batch) = milk::find_batch(&mut tx, batch_id).await? else {
            tracing::warn!("Milk batch with ID {} not found", batch_id);
            return Ok((0, outbox));
        };

        let mut count = 0;
        for cow_id in milk::batch_cow_ids(&mut tx, batch.id).await? {
            let cow = herd::find_cow(&mut tx, cow_id).await?;
            let message = batch_status_used_message(
                &batch.batch_number,
                batch.total_volume,
                cow.as_ref().map(|c| c.name.as_str()),
            );
            let managers = herd::cow_manager_ids(&mut tx, cow_id).await?;
            count += self
                .notify_managers(
                    &mut tx,
                    &mut outbox,
                    cow_id,
                    &managers,
                    NotificationType::MilkUsed.as_str(),
                    &message,
                    now,
                )
                .await?;
        }

        tx.commit().await?;
        Ok((count, outbox))
    }
}
