//! SQLite pool creation and timestamp encoding.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings
//! (`2026-10-18T06:00:00.000Z`) so that plain string comparison in SQL
//! agrees with chronological order. Calendar dates are stored as
//! `YYYY-MM-DD`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::AppError;

/// Open a pool for `database_url` and apply all migrations.
///
/// In-memory databases get a single long-lived connection: every SQLite
/// connection to `:memory:` would otherwise see its own empty database.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let in_memory = database_url.contains(":memory:");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options.connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::debug!("Database ready at {}", database_url);
    Ok(pool)
}

/// Encode a timestamp for storage.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode a stored timestamp.
pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

/// Encode a calendar date for storage.
pub fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn decode_date(raw: &str) -> Result<NaiveDate, sqlx::Error> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

/// Midnight (UTC) at the start of `now`'s day.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn in_memory_pool_applies_migrations() {
        let pool = create_pool("sqlite::memory:").await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();

        for expected in [
            "cows",
            "daily_milk_summaries",
            "milk_batches",
            "milking_sessions",
            "notifications",
            "product_stocks",
            "stock_histories",
            "user_cow_association",
            "users",
        ] {
            assert!(names.contains(&expected), "missing table {}", expected);
        }
    }

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 0).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(encode_timestamp(earlier) < encode_timestamp(later));
        assert_eq!(encode_timestamp(earlier), "2026-10-18T09:05:00.000Z");
    }

    #[test]
    fn timestamp_roundtrip_keeps_millisecond_precision() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(678);
        assert_eq!(decode_timestamp(&encode_timestamp(ts)).unwrap(), ts);
    }

    #[test]
    fn decode_timestamp_rejects_garbage() {
        assert!(decode_timestamp("yesterday").is_err());
    }

    #[test]
    fn start_of_day_truncates_to_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 17, 45, 12).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap()
        );
        assert_eq!(encode_date(now.date_naive()), "2026-10-18");
    }
}
