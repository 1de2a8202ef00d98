use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use crate::db::{decode_timestamp, encode_timestamp};
use crate::models::{ProductStock, StockStatus};

/// Every stock still marked `available`, soonest expiry first.
pub async fn available_stock(conn: &mut SqliteConnection) -> Result<Vec<ProductStock>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, product_type, quantity, expiry_at, status
         FROM product_stocks
         WHERE status = 'available'
         ORDER BY expiry_at, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> Result<ProductStock, sqlx::Error> {
            let expiry_at: String = row.try_get("expiry_at")?;
            let status: String = row.try_get("status")?;
            Ok(ProductStock {
                id: row.try_get("id")?,
                product_type: row.try_get("product_type")?,
                quantity: row.try_get("quantity")?,
                expiry_at: decode_timestamp(&expiry_at)?,
                status: status
                    .parse::<StockStatus>()
                    .map_err(|err| sqlx::Error::Decode(err.into()))?,
            })
        })
        .collect()
}

pub async fn mark_stock_expired(
    conn: &mut SqliteConnection,
    product_stock_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE product_stocks SET status = ? WHERE id = ?")
        .bind(StockStatus::Expired.as_str())
        .bind(product_stock_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Append a movement to the stock's history.
pub async fn insert_stock_history(
    conn: &mut SqliteConnection,
    product_stock_id: i64,
    change_type: &str,
    quantity_change: i64,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO stock_histories (product_stock_id, change_type, quantity_change, change_date)
         VALUES (?, ?, ?, ?)",
    )
    .bind(product_stock_id)
    .bind(change_type)
    .bind(quantity_change)
    .bind(encode_timestamp(at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::repository::fixtures;

    #[tokio::test]
    async fn expired_stock_leaves_the_available_list() {
        let pool = fixtures::pool().await;
        let now = Utc::now();
        let yogurt = fixtures::stock(&pool, "Yogurt", 12, now + Duration::hours(3)).await;
        let keju = fixtures::stock(&pool, "Keju", 4, now - Duration::hours(1)).await;

        let mut conn = pool.acquire().await.unwrap();
        let stock = available_stock(&mut conn).await.unwrap();
        assert_eq!(stock.iter().map(|s| s.id).collect::<Vec<_>>(), vec![keju, yogurt]);

        mark_stock_expired(&mut conn, keju).await.unwrap();
        insert_stock_history(&mut conn, keju, "expired", 4, now).await.unwrap();

        let stock = available_stock(&mut conn).await.unwrap();
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[0].product_type, "Yogurt");
        assert_eq!(stock[0].status, StockStatus::Available);
        drop(conn);

        assert_eq!(
            fixtures::count(&pool, "SELECT COUNT(*) FROM stock_histories WHERE change_type = 'expired' AND quantity_change = 4").await,
            1
        );
    }
}
