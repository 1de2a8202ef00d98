use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::db::{decode_timestamp, encode_timestamp};
use crate::models::{NewNotification, Notification};

pub(crate) const COLUMNS: &str =
    "id, user_id, cow_id, product_stock_id, message, type, is_read, created_at, additional_data";

pub(crate) fn notification_from_row(row: &SqliteRow) -> Result<Notification, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;
    let is_read: i64 = row.try_get("is_read")?;
    let additional_data: Option<String> = row.try_get("additional_data")?;

    let additional_data = additional_data
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        cow_id: row.try_get("cow_id")?,
        product_stock_id: row.try_get("product_stock_id")?,
        message: row.try_get("message")?,
        kind: row.try_get("type")?,
        is_read: is_read != 0,
        created_at: decode_timestamp(&created_at)?,
        additional_data,
    })
}

/// Insert an unread notification. Returns the new row id.
pub async fn insert_notification(
    conn: &mut SqliteConnection,
    notification: &NewNotification,
) -> Result<i64, sqlx::Error> {
    let additional_data = notification
        .additional_data
        .as_ref()
        .map(|value| value.to_string());

    let result = sqlx::query(
        "INSERT INTO notifications
         (user_id, cow_id, product_stock_id, message, type, is_read, created_at, additional_data)
         VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(notification.user_id)
    .bind(notification.cow_id)
    .bind(notification.product_stock_id)
    .bind(&notification.message)
    .bind(&notification.kind)
    .bind(encode_timestamp(notification.created_at))
    .bind(additional_data)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Latest notification of `kind` for a user/cow pair created at or after `since`.
pub async fn find_for_cow_since(
    conn: &mut SqliteConnection,
    user_id: i64,
    cow_id: i64,
    kind: &str,
    since: DateTime<Utc>,
) -> Result<Option<Notification>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM notifications
         WHERE user_id = ? AND cow_id = ? AND type = ? AND created_at >= ?
         ORDER BY created_at DESC
         LIMIT 1",
        COLUMNS
    ))
    .bind(user_id)
    .bind(cow_id)
    .bind(kind)
    .bind(encode_timestamp(since))
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(notification_from_row).transpose()
}

/// Whether a notification of `kind` for a user/cow pair whose message
/// contains `marker` exists at or after `since`.
pub async fn exists_for_cow_with_marker_since(
    conn: &mut SqliteConnection,
    user_id: i64,
    cow_id: i64,
    kind: &str,
    marker: &str,
    since: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM notifications
         WHERE user_id = ? AND cow_id = ? AND type = ?
           AND instr(message, ?) > 0 AND created_at >= ?",
    )
    .bind(user_id)
    .bind(cow_id)
    .bind(kind)
    .bind(marker)
    .bind(encode_timestamp(since))
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

/// Whether any notification of `kind` exists for a product stock.
pub async fn exists_for_product(
    conn: &mut SqliteConnection,
    product_stock_id: i64,
    kind: &str,
) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM notifications WHERE product_stock_id = ? AND type = ?",
    )
    .bind(product_stock_id)
    .bind(kind)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

/// Replace the message of an existing notification and surface it again
/// as unread at `now`.
pub async fn refresh_notification(
    conn: &mut SqliteConnection,
    notification_id: i64,
    message: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE notifications SET message = ?, is_read = 0, created_at = ? WHERE id = ?")
        .bind(message)
        .bind(encode_timestamp(now))
        .bind(notification_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Notifications created in `[from, to)`.
pub async fn count_between(
    conn: &mut SqliteConnection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE created_at >= ? AND created_at < ?")
            .bind(encode_timestamp(from))
            .bind(encode_timestamp(to))
            .fetch_one(&mut *conn)
            .await?;

    Ok(count)
}

/// Notifications of `kind` created in `[from, to)`.
pub async fn count_type_between(
    conn: &mut SqliteConnection,
    kind: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM notifications
         WHERE type = ? AND created_at >= ? AND created_at < ?",
    )
    .bind(kind)
    .bind(encode_timestamp(from))
    .bind(encode_timestamp(to))
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}
