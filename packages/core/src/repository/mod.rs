//! Database access for the notification sweeps.
//!
//! Every query a sweep runs takes a `&mut SqliteConnection` so that the
//! whole sweep shares one transaction (see [`FarmRepository::begin`]).
//! Housekeeping that runs outside a sweep lives on [`FarmRepository`]
//! itself and uses the pool directly.

pub mod herd;
pub mod milk;
pub mod notifications;
pub mod stock;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::db::{encode_timestamp, start_of_day};
use crate::models::{Notification, NotificationStats, NotificationType};

/// Notification types counted individually in [`NotificationStats`].
pub const TRACKED_STAT_TYPES: &[NotificationType] = &[
    NotificationType::MilkExpiry,
    NotificationType::MilkWarning,
    NotificationType::LowProduction,
    NotificationType::HighProduction,
];

#[derive(Clone)]
pub struct FarmRepository {
    pool: SqlitePool,
}

impl FarmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start the transaction a sweep runs in. Dropping it without commit
    /// rolls everything back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Delete notifications created before `cutoff`. Returns the number deleted.
    pub async fn delete_notifications_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < ?")
            .bind(encode_timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counters for today (UTC) plus the global unread count.
    pub async fn notification_stats(
        &self,
        now: DateTime<Utc>,
    ) -> Result<NotificationStats, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let today_start = start_of_day(now);
        let tomorrow_start = today_start + chrono::Duration::days(1);

        let total_today =
            notifications::count_between(&mut conn, today_start, tomorrow_start).await?;

        let (unread_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE is_read = 0")
                .fetch_one(&mut *conn)
                .await?;

        let mut stats = NotificationStats {
            total_today,
            unread_count,
            ..Default::default()
        };

        for kind in TRACKED_STAT_TYPES {
            let count = notifications::count_type_between(
                &mut conn,
                kind.as_str(),
                today_start,
                tomorrow_start,
            )
            .await?;
            stats.by_type.insert(kind.as_str().to_string(), count);
        }

        Ok(stats)
    }

    /// Most recent notifications of a user, newest first. `limit` is clamped to 100.
    pub async fn list_notifications_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let limit = limit.clamp(1, 100);
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            notifications::COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notifications::notification_from_row).collect()
    }

    /// Mark one notification read. Returns `false` when the id does not exist.
    pub async fn mark_read(&self, notification_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
            .bind(notification_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Seed helpers for tests that need farm records in an in-memory database.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, NaiveDate, Utc};
    use sqlx::SqlitePool;

    use crate::db::{create_pool, encode_date, encode_timestamp};
    use crate::models::MilkStatus;

    pub async fn pool() -> SqlitePool {
        create_pool("sqlite::memory:").await.unwrap()
    }

    pub async fn user(pool: &SqlitePool, name: &str, role: &str) -> i64 {
        sqlx::query("INSERT INTO users (name, role) VALUES (?, ?)")
            .bind(name)
            .bind(role)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    pub async fn cow(pool: &SqlitePool, name: &str) -> i64 {
        sqlx::query("INSERT INTO cows (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    pub async fn manage(pool: &SqlitePool, user_id: i64, cow_id: i64) {
        sqlx::query("INSERT INTO user_cow_association (user_id, cow_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(cow_id)
            .execute(pool)
            .await
            .unwrap();
    }

    pub async fn summary(pool: &SqlitePool, cow_id: i64, date: NaiveDate, volume: f64) {
        sqlx::query(
            "INSERT INTO daily_milk_summaries (cow_id, date, total_volume) VALUES (?, ?, ?)",
        )
        .bind(cow_id)
        .bind(encode_date(date))
        .bind(volume)
        .execute(pool)
        .await
        .unwrap();
    }

    pub async fn batch(
        pool: &SqlitePool,
        number: &str,
        volume: f64,
        status: MilkStatus,
        expiry: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> i64 {
        sqlx::query(
            "INSERT INTO milk_batches
             (batch_number, total_volume, status, expiry_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(number)
        .bind(volume)
        .bind(status.as_str())
        .bind(encode_timestamp(expiry))
        .bind(encode_timestamp(created_at))
        .bind(encode_timestamp(updated_at))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    pub async fn session(pool: &SqlitePool, cow_id: i64, batch_id: i64, volume: f64) {
        sqlx::query(
            "INSERT INTO milking_sessions (cow_id, milk_batch_id, volume, milking_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(cow_id)
        .bind(batch_id)
        .bind(volume)
        .bind(encode_timestamp(Utc::now()))
        .execute(pool)
        .await
        .unwrap();
    }

    pub async fn stock(
        pool: &SqlitePool,
        product_type: &str,
        quantity: i64,
        expiry: DateTime<Utc>,
    ) -> i64 {
        sqlx::query(
            "INSERT INTO product_stocks (product_type, quantity, expiry_at, status)
             VALUES (?, ?, ?, 'available')",
        )
        .bind(product_type)
        .bind(quantity)
        .bind(encode_timestamp(expiry))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    pub async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::models::NewNotification;

    async fn insert(repo: &FarmRepository, user_id: i64, kind: &str, created_at: DateTime<Utc>) {
        let mut conn = repo.pool().acquire().await.unwrap();
        notifications::insert_notification(
            &mut conn,
            &NewNotification::for_cow(user_id, 1, kind, "msg", created_at),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn delete_older_than_removes_only_old_rows() {
        let repo = FarmRepository::new(fixtures::pool().await);
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();

        insert(&repo, 1, "milk_expiry", now - Duration::days(45)).await;
        insert(&repo, 1, "milk_expiry", now - Duration::days(31)).await;
        insert(&repo, 1, "milk_expiry", now - Duration::days(2)).await;

        let deleted = repo
            .delete_notifications_older_than(now - Duration::days(30))
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(repo.list_notifications_for_user(1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_count_today_unread_and_tracked_types() {
        let repo = FarmRepository::new(fixtures::pool().await);
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();

        insert(&repo, 1, "milk_expiry", now - Duration::hours(1)).await;
        insert(&repo, 1, "low_production", now - Duration::hours(2)).await;
        insert(&repo, 2, "admin_daily_summary", now - Duration::hours(3)).await;
        insert(&repo, 2, "milk_expiry", now - Duration::days(1)).await;

        let stats = repo.notification_stats(now).await.unwrap();

        assert_eq!(stats.total_today, 3);
        assert_eq!(stats.unread_count, 4);
        assert_eq!(stats.by_type["milk_expiry"], 1);
        assert_eq!(stats.by_type["low_production"], 1);
        assert_eq!(stats.by_type["high_production"], 0);
        assert_eq!(stats.by_type.len(), TRACKED_STAT_TYPES.len());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_mark_read_flips_flag() {
        let repo = FarmRepository::new(fixtures::pool().await);
        let now = Utc::now();

        insert(&repo, 5, "milk_used", now - Duration::minutes(10)).await;
        insert(&repo, 5, "milk_warning", now).await;

        let listed = repo.list_notifications_for_user(5, 10).await.unwrap();
        assert_eq!(listed[0].kind, "milk_warning");
        assert!(!listed[0].is_read);

        assert!(repo.mark_read(listed[0].id).await.unwrap());
        assert!(!repo.mark_read(9999).await.unwrap());

        let listed = repo.list_notifications_for_user(5, 10).await.unwrap();
        assert!(listed[0].is_read);
    }
}
