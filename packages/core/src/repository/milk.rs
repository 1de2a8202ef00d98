use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::db::{decode_date, decode_timestamp, encode_date, encode_timestamp};
use crate::models::{DailyMilkSummary, MilkBatch, MilkStatus};

const BATCH_COLUMNS: &str =
    "id, batch_number, total_volume, status, expiry_date, created_at, updated_at";

fn batch_from_row(row: &SqliteRow) -> Result<MilkBatch, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let expiry_date: String = row.try_get("expiry_date")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(MilkBatch {
        id: row.try_get("id")?,
        batch_number: row.try_get("batch_number")?,
        total_volume: row.try_get("total_volume")?,
        status: status
            .parse()
            .map_err(|err: String| sqlx::Error::Decode(err.into()))?,
        expiry_date: decode_timestamp(&expiry_date)?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

async fn fetch_batches(
    conn: &mut SqliteConnection,
    filter: &str,
    binds: &[String],
) -> Result<Vec<MilkBatch>, sqlx::Error> {
    let sql = format!("SELECT {} FROM milk_batches WHERE {}", BATCH_COLUMNS, filter);
    let mut query = sqlx::query(&sql);
    for value in binds {
        query = query.bind(value);
    }
    let rows = query.fetch_all(&mut *conn).await?;
    rows.iter().map(batch_from_row).collect()
}

/// Summaries recorded for `date`, joined with the cow name, by cow id.
pub async fn daily_summaries_for(
    conn: &mut SqliteConnection,
    date: NaiveDate,
) -> Result<Vec<DailyMilkSummary>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT s.id, s.cow_id, c.name AS cow_name, s.date, s.total_volume
         FROM daily_milk_summaries s
         JOIN cows c ON c.id = s.cow_id
         WHERE s.date = ?
         ORDER BY s.cow_id, s.id",
    )
    .bind(encode_date(date))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> Result<DailyMilkSummary, sqlx::Error> {
            let date: String = row.try_get("date")?;
            Ok(DailyMilkSummary {
                id: row.try_get("id")?,
                cow_id: row.try_get("cow_id")?,
                cow_name: row.try_get("cow_name")?,
                date: decode_date(&date)?,
                total_volume: row.try_get("total_volume")?,
            })
        })
        .collect()
}

pub async fn find_batch(
    conn: &mut SqliteConnection,
    batch_id: i64,
) -> Result<Option<MilkBatch>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM milk_batches WHERE id = ?",
        BATCH_COLUMNS
    ))
    .bind(batch_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(batch_from_row).transpose()
}

/// Fresh batches whose expiry is strictly before `now`.
pub async fn fresh_batches_expired_before(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<Vec<MilkBatch>, sqlx::Error> {
    fetch_batches(
        conn,
        "status = 'fresh' AND expiry_date < ? ORDER BY expiry_date, id",
        &[encode_timestamp(now)],
    )
    .await
}

/// Fresh batches with `after < expiry <= until`.
pub async fn fresh_batches_expiring_between(
    conn: &mut SqliteConnection,
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<MilkBatch>, sqlx::Error> {
    fetch_batches(
        conn,
        "status = 'fresh' AND expiry_date > ? AND expiry_date <= ? ORDER BY expiry_date, id",
        &[encode_timestamp(after), encode_timestamp(until)],
    )
    .await
}

/// Expired batches whose expiry falls in `[from, to)`.
pub async fn expired_batches_between(
    conn: &mut SqliteConnection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<MilkBatch>, sqlx::Error> {
    fetch_batches(
        conn,
        "status = 'expired' AND expiry_date >= ? AND expiry_date < ? ORDER BY expiry_date, id",
        &[encode_timestamp(from), encode_timestamp(to)],
    )
    .await
}

/// Used batches touched at or after `since`, most recent first.
pub async fn used_batches_updated_since(
    conn: &mut SqliteConnection,
    since: DateTime<Utc>,
) -> Result<Vec<MilkBatch>, sqlx::Error> {
    fetch_batches(
        conn,
        "status = 'used' AND updated_at >= ? ORDER BY updated_at DESC, id",
        &[encode_timestamp(since)],
    )
    .await
}

pub async fn count_batches_with_status(
    conn: &mut SqliteConnection,
    status: MilkStatus,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM milk_batches WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

pub async fn set_batch_status(
    conn: &mut SqliteConnection,
    batch_id: i64,
    status: MilkStatus,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE milk_batches SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(encode_timestamp(now))
        .bind(batch_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Distinct cows that contributed a milking session to the batch.
pub async fn batch_cow_ids(
    conn: &mut SqliteConnection,
    batch_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT cow_id FROM milking_sessions WHERE milk_batch_id = ? ORDER BY cow_id",
    )
    .bind(batch_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::repository::fixtures;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn summaries_are_filtered_by_date_and_carry_cow_name() {
        let pool = fixtures::pool().await;
        let molly = fixtures::cow(&pool, "Molly").await;
        let bella = fixtures::cow(&pool, "Bella").await;
        let today = now().date_naive();
        fixtures::summary(&pool, molly, today, 12.0).await;
        fixtures::summary(&pool, bella, today, 27.5).await;
        fixtures::summary(&pool, bella, today - Duration::days(1), 30.0).await;

        let mut conn = pool.acquire().await.unwrap();
        let summaries = daily_summaries_for(&mut conn, today).await.unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].cow_name, "Molly");
        assert_eq!(summaries[1].total_volume, 27.5);
        assert_eq!(summaries[1].date, today);
    }

    #[tokio::test]
    async fn expiry_windows_partition_fresh_batches() {
        let pool = fixtures::pool().await;
        let t = now();
        let created = t - Duration::hours(20);
        fixtures::batch(&pool, "B-1", 10.0, MilkStatus::Fresh, t - Duration::minutes(1), created, created).await;
        fixtures::batch(&pool, "B-2", 10.0, MilkStatus::Fresh, t, created, created).await;
        fixtures::batch(&pool, "B-3", 10.0, MilkStatus::Fresh, t + Duration::hours(4), created, created).await;
        fixtures::batch(&pool, "B-4", 10.0, MilkStatus::Fresh, t + Duration::hours(5), created, created).await;
        fixtures::batch(&pool, "B-5", 10.0, MilkStatus::Used, t - Duration::hours(1), created, created).await;

        let mut conn = pool.acquire().await.unwrap();

        let expired = fresh_batches_expired_before(&mut conn, t).await.unwrap();
        let numbers: Vec<&str> = expired.iter().map(|b| b.batch_number.as_str()).collect();
        assert_eq!(numbers, vec!["B-1"]);

        let warning = fresh_batches_expiring_between(&mut conn, t, t + Duration::hours(4))
            .await
            .unwrap();
        let numbers: Vec<&str> = warning.iter().map(|b| b.batch_number.as_str()).collect();
        assert_eq!(numbers, vec!["B-3"]);
    }

    #[tokio::test]
    async fn status_update_touches_updated_at() {
        let pool = fixtures::pool().await;
        let t = now();
        let id = fixtures::batch(&pool, "B-9", 22.0, MilkStatus::Fresh, t, t, t).await;

        let mut conn = pool.acquire().await.unwrap();
        set_batch_status(&mut conn, id, MilkStatus::Expired, t + Duration::minutes(5))
            .await
            .unwrap();

        let batch = find_batch(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(batch.status, MilkStatus::Expired);
        assert_eq!(batch.updated_at, t + Duration::minutes(5));
        assert_eq!(count_batches_with_status(&mut conn, MilkStatus::Fresh).await.unwrap(), 0);

        let today = crate::db::start_of_day(t);
        let expired_today = expired_batches_between(&mut conn, today, today + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(expired_today.len(), 1);
    }

    #[tokio::test]
    async fn batch_cows_are_distinct() {
        let pool = fixtures::pool().await;
        let t = now();
        let molly = fixtures::cow(&pool, "Molly").await;
        let bella = fixtures::cow(&pool, "Bella").await;
        let id = fixtures::batch(&pool, "B-7", 30.0, MilkStatus::Used, t, t, t).await;
        fixtures::session(&pool, molly, id, 10.0).await;
        fixtures::session(&pool, molly, id, 8.0).await;
        fixtures::session(&pool, bella, id, 12.0).await;

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(batch_cow_ids(&mut conn, id).await.unwrap(), vec![molly, bella]);

        let used = used_batches_updated_since(&mut conn, t - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(used.len(), 1);
        assert!(used_batches_updated_since(&mut conn, t + Duration::seconds(1))
            .await
            .unwrap()
            .is_empty());
    }
}
