//! Usage log domain - per-user action rows and request counters

use sqlx::{Executor, PgPool, Postgres};

pub const ACTION_SIGNUP: &str = "signup";
pub const ACTION_LOGIN: &str = "login";
pub const ACTION_UPLOAD: &str = "upload";

/// Insert a log row for `action`, stamped now, with zeroed counters
pub async fn insert_log<'e, E>(executor: E, user_id: i64, action: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO logs (user_id, action, login_time)
        VALUES ($1, $2, NOW())
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(action)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// Bump the success or failure counter on the user's most recent log row,
/// creating an `upload` row first if the user has none.
pub async fn record_request_outcome(
    db: &PgPool,
    user_id: i64,
    success: bool,
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    let latest: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM logs
        WHERE user_id = $1
        ORDER BY login_time DESC, id DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let log_id = match latest {
        Some((id,)) => id,
        None => insert_log(&mut *tx, user_id, ACTION_UPLOAD).await?,
    };

    sqlx::query(
        r#"
        UPDATE logs
        SET successful_requests = successful_requests + CASE WHEN $2 THEN 1 ELSE 0 END,
            failed_requests = failed_requests + CASE WHEN $2 THEN 0 ELSE 1 END
        WHERE id = $1
        "#,
    )
    .bind(log_id)
    .bind(success)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}
