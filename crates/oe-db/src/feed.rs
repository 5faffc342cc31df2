use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct FeedHeartbeat {
    pub feed_name: String,
    pub last_tick_at: DateTime<Utc>,
    pub symbols_count: i32,
    pub is_connected: bool,
}

fn row_to_heartbeat(row: &sqlx::postgres::PgRow) -> Result<FeedHeartbeat> {
    Ok(FeedHeartbeat {
        feed_name: row.try_get("feed_name")?,
        last_tick_at: row.try_get("last_tick_at")?,
        symbols_count: row.try_get("symbols_count")?,
        is_connected: row.try_get("is_connected")?,
    })
}

pub async fn fetch(pool: &PgPool, feed_name: &str) -> Result<Option<FeedHeartbeat>> {
    let row = sqlx::query(
        "select feed_name, last_tick_at, symbols_count, is_connected from feed_heartbeat where feed_name = $1",
    )
    .bind(feed_name)
    .fetch_optional(pool)
    .await
    .context("fetch feed heartbeat failed")?;
    row.as_ref().map(row_to_heartbeat).transpose()
}

/// DB-level fallback heartbeat, written only when the fast-path cache is unavailable —
/// the hot path is expected to be a faster broadcast/cache layer, not this table.
pub async fn write_heartbeat(pool: &PgPool, feed_name: &str, symbols_count: i32) -> Result<()> {
    sqlx::query(
        r#"
        insert into feed_heartbeat (feed_name, last_tick_at, symbols_count, is_connected)
        values ($1, now(), $2, true)
        on conflict (feed_name) do update
        set last_tick_at = now(), symbols_count = excluded.symbols_count, is_connected = true
        "#,
    )
    .bind(feed_name)
    .bind(symbols_count)
    .execute(pool)
    .await
    .context("write_heartbeat failed")?;
    Ok(())
}

pub async fn mark_connected(pool: &PgPool, feed_name: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into feed_heartbeat (feed_name, last_tick_at, is_connected)
        values ($1, now(), true)
        on conflict (feed_name) do update set is_connected = true, last_tick_at = now()
        "#,
    )
    .bind(feed_name)
    .execute(pool)
    .await
    .context("mark_connected failed")?;
    Ok(())
}

pub async fn mark_disconnected(pool: &PgPool, feed_name: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into feed_heartbeat (feed_name, last_tick_at, is_connected)
        values ($1, now(), false)
        on conflict (feed_name) do update set is_connected = false
        "#,
    )
    .bind(feed_name)
    .execute(pool)
    .await
    .context("mark_disconnected failed")?;
    Ok(())
}
