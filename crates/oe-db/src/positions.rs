use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Position {
    pub id: Uuid,
    pub session_id: Uuid,
    pub symbol: String,
    pub display_symbol: String,
    pub product_type: String,
    pub net_quantity: i32,
    pub buy_quantity: i32,
    pub sell_quantity: i32,
    pub avg_buy_price: f64,
    pub avg_sell_price: f64,
    pub ltp: Option<f64>,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub broker_quantity: Option<i32>,
    pub reconcile_status: String,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

const POSITION_COLUMNS: &str = r#"
    id, session_id, symbol, display_symbol, product_type, net_quantity, buy_quantity,
    sell_quantity, avg_buy_price, avg_sell_price, ltp, unrealized_pnl, realized_pnl,
    broker_quantity, reconcile_status, last_reconciled_at
"#;

fn row_to_position(row: &sqlx::postgres::PgRow) -> Result<Position> {
    Ok(Position {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        symbol: row.try_get("symbol")?,
        display_symbol: row.try_get("display_symbol")?,
        product_type: row.try_get("product_type")?,
        net_quantity: row.try_get("net_quantity")?,
        buy_quantity: row.try_get("buy_quantity")?,
        sell_quantity: row.try_get("sell_quantity")?,
        avg_buy_price: row.try_get("avg_buy_price")?,
        avg_sell_price: row.try_get("avg_sell_price")?,
        ltp: row.try_get("ltp")?,
        unrealized_pnl: row.try_get("unrealized_pnl")?,
        realized_pnl: row.try_get("realized_pnl")?,
        broker_quantity: row.try_get("broker_quantity")?,
        reconcile_status: row.try_get("reconcile_status")?,
        last_reconciled_at: row.try_get("last_reconciled_at")?,
    })
}

pub async fn fetch_open_positions(pool: &PgPool, session_id: Uuid) -> Result<Vec<Position>> {
    let rows = sqlx::query(&format!(
        "select {POSITION_COLUMNS} from positions where session_id = $1 and net_quantity != 0"
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await
    .context("fetch_open_positions failed")?;
    rows.iter().map(row_to_position).collect()
}

pub async fn fetch_all_positions(pool: &PgPool, session_id: Uuid) -> Result<Vec<Position>> {
    let rows = sqlx::query(&format!(
        "select {POSITION_COLUMNS} from positions where session_id = $1"
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await
    .context("fetch_all_positions failed")?;
    rows.iter().map(row_to_position).collect()
}

pub async fn count_open_positions(pool: &PgPool, session_id: Uuid) -> Result<i64> {
    let row = sqlx::query(
        "select count(*)::bigint as n from positions where session_id = $1 and net_quantity != 0",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await
    .context("count_open_positions failed")?;
    Ok(row.try_get("n")?)
}

pub async fn ensure_position(
    pool: &PgPool,
    session_id: Uuid,
    symbol: &str,
    display_symbol: &str,
    product_type: &str,
) -> Result<Position> {
    sqlx::query(
        r#"
        insert into positions (session_id, symbol, display_symbol, product_type)
        values ($1, $2, $3, $4)
        on conflict (session_id, symbol, product_type) do nothing
        "#,
    )
    .bind(session_id)
    .bind(symbol)
    .bind(display_symbol)
    .bind(product_type)
    .execute(pool)
    .await
    .context("ensure_position insert failed")?;

    let row = sqlx::query(&format!(
        "select {POSITION_COLUMNS} from positions where session_id = $1 and symbol = $2 and product_type = $3"
    ))
    .bind(session_id)
    .bind(symbol)
    .bind(product_type)
    .fetch_one(pool)
    .await
    .context("ensure_position fetch failed")?;
    row_to_position(&row)
}

/// Refreshes LTP and marks the row OK — the broker-reported quantity matched.
pub async fn mark_reconciled_ok(pool: &PgPool, id: Uuid, ltp: Option<f64>) -> Result<()> {
    sqlx::query(
        r#"
        update positions
        set ltp = coalesce($2, ltp), reconcile_status = 'OK', last_reconciled_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(ltp)
    .execute(pool)
    .await
    .context("mark_reconciled_ok failed")?;
    Ok(())
}

/// Corrects the local net quantity to the broker's value and marks CORRECTED.
pub async fn correct_net_quantity(pool: &PgPool, id: Uuid, broker_quantity: i32) -> Result<()> {
    sqlx::query(
        r#"
        update positions
        set net_quantity = $2, broker_quantity = $2, reconcile_status = 'CORRECTED',
            last_reconciled_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(broker_quantity)
    .execute(pool)
    .await
    .context("correct_net_quantity failed")?;
    Ok(())
}
