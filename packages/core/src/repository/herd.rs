use sqlx::{Row, SqliteConnection};

use crate::models::Cow;

pub async fn find_cow(conn: &mut SqliteConnection, cow_id: i64) -> Result<Option<Cow>, sqlx::Error> {
    let row = sqlx::query("SELECT id, name FROM cows WHERE id = ?")
        .bind(cow_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|row| -> Result<Cow, sqlx::Error> {
        Ok(Cow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    })
    .transpose()
}

pub async fn cow_count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cows")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Ids of the users managing `cow_id`, ascending.
pub async fn cow_manager_ids(
    conn: &mut SqliteConnection,
    cow_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT user_id FROM user_cow_association WHERE cow_id = ? ORDER BY user_id",
    )
    .bind(cow_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn manages_cow(
    conn: &mut SqliteConnection,
    user_id: i64,
    cow_id: i64,
) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM user_cow_association WHERE user_id = ? AND cow_id = ?",
    )
    .bind(user_id)
    .bind(cow_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

/// Ids of every user with the `admin` role, ascending.
pub async fn admin_user_ids(conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE role = 'admin' ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
