use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub session_id: Uuid,
    pub idempotency_key: String,
    pub symbol: String,
    pub display_symbol: String,
    pub side: String,
    pub order_type: String,
    pub product_type: String,
    pub quantity: i32,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub validity: String,
    pub status: String,
    pub status_history: Value,
    pub broker_order_id: Option<String>,
    pub filled_quantity: i32,
    pub avg_fill_price: Option<f64>,
    pub fill_timestamp: Option<DateTime<Utc>>,
    pub risk_snapshot: Option<Value>,
    pub reject_reason: Option<String>,
    pub broker_reject_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acked_at: Option<DateTime<Utc>>,
}

const ORDER_COLUMNS: &str = r#"
    id, session_id, idempotency_key, symbol, display_symbol, side, order_type, product_type,
    quantity, price, trigger_price, validity, status, status_history, broker_order_id,
    filled_quantity, avg_fill_price, fill_timestamp, risk_snapshot, reject_reason,
    broker_reject_code, created_at, sent_at, acked_at
"#;

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        symbol: row.try_get("symbol")?,
        display_symbol: row.try_get("display_symbol")?,
        side: row.try_get("side")?,
        order_type: row.try_get("order_type")?,
        product_type: row.try_get("product_type")?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
        trigger_price: row.try_get("trigger_price")?,
        validity: row.try_get("validity")?,
        status: row.try_get("status")?,
        status_history: row.try_get("status_history")?,
        broker_order_id: row.try_get("broker_order_id")?,
        filled_quantity: row.try_get("filled_quantity")?,
        avg_fill_price: row.try_get("avg_fill_price")?,
        fill_timestamp: row.try_get("fill_timestamp")?,
        risk_snapshot: row.try_get("risk_snapshot")?,
        reject_reason: row.try_get("reject_reason")?,
        broker_reject_code: row.try_get("broker_reject_code")?,
        created_at: row.try_get("created_at")?,
        sent_at: row.try_get("sent_at")?,
        acked_at: row.try_get("acked_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub session_id: Uuid,
    pub idempotency_key: String,
    pub symbol: String,
    pub display_symbol: String,
    pub side: String,
    pub order_type: String,
    pub product_type: String,
    pub quantity: i32,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
}

/// Returns `Ok(None)` rather than an error when the idempotency key already exists —
/// callers use this to distinguish `DUPLICATE_ORDER` from a real infrastructure failure.
pub async fn insert_order_if_absent(pool: &PgPool, new: &NewOrder) -> Result<Option<Order>> {
    let history = serde_json::json!([{
        "status": "CREATED",
        "timestamp": Utc::now(),
        "actor": "executor",
        "reason": Value::Null,
    }]);

    let result = sqlx::query(
        r#"
        insert into orders (
            session_id, idempotency_key, symbol, display_symbol, side, order_type,
            product_type, quantity, price, trigger_price, status, status_history
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'CREATED', $11
        )
        "#,
    )
    .bind(new.session_id)
    .bind(&new.idempotency_key)
    .bind(&new.symbol)
    .bind(&new.display_symbol)
    .bind(&new.side)
    .bind(&new.order_type)
    .bind(&new.product_type)
    .bind(new.quantity)
    .bind(new.price)
    .bind(new.trigger_price)
    .bind(&history)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(Some(fetch_by_idempotency_key(pool, &new.idempotency_key).await?.context(
            "order row missing immediately after insert_order_if_absent",
        )?)),
        Err(e) if crate::is_unique_constraint_violation(&e, "uq_order_idempotency") => Ok(None),
        Err(e) => Err(e).context("insert_order_if_absent failed"),
    }
}

pub async fn fetch_by_idempotency_key(pool: &PgPool, key: &str) -> Result<Option<Order>> {
    let row = sqlx::query(&format!(
        "select {ORDER_COLUMNS} from orders where idempotency_key = $1"
    ))
    .bind(key)
    .fetch_optional(pool)
    .await
    .context("fetch_by_idempotency_key failed")?;
    row.as_ref().map(row_to_order).transpose()
}

pub async fn exists_by_idempotency_key(pool: &PgPool, key: &str) -> Result<bool> {
    let row = sqlx::query("select exists(select 1 from orders where idempotency_key = $1) as e")
        .bind(key)
        .fetch_one(pool)
        .await
        .context("exists_by_idempotency_key failed")?;
    Ok(row.try_get("e")?)
}

pub async fn fetch_by_id(pool: &PgPool, id: Uuid) -> Result<Order> {
    let row = sqlx::query(&format!("select {ORDER_COLUMNS} from orders where id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
        .context("fetch_by_id failed")?;
    row_to_order(&row)
}

pub async fn set_risk_snapshot(pool: &PgPool, id: Uuid, snapshot: &Value) -> Result<()> {
    sqlx::query("update orders set risk_snapshot = $2 where id = $1")
        .bind(id)
        .bind(snapshot)
        .execute(pool)
        .await
        .context("set_risk_snapshot failed")?;
    Ok(())
}

/// Appends a status transition, keeping the invariant that the last history entry's
/// status equals the row's own `status`.
pub async fn transition_status(
    pool: &PgPool,
    id: Uuid,
    new_status: &str,
    actor: &str,
    reason: Option<&str>,
) -> Result<()> {
    let entry = serde_json::json!({
        "status": new_status,
        "timestamp": Utc::now(),
        "actor": actor,
        "reason": reason,
    });

    sqlx::query(
        r#"
        update orders
        set status = $2, status_history = status_history || $3::jsonb
        where id = $1
        "#,
    )
    .bind(id)
    .bind(new_status)
    .bind(&entry)
    .execute(pool)
    .await
    .context("transition_status failed")?;
    Ok(())
}

pub async fn mark_sent(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("update orders set sent_at = now() where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("mark_sent failed")?;
    Ok(())
}

pub struct BrokerAck<'a> {
    pub broker_order_id: &'a str,
}

/// Records a successful broker acknowledgement and the ACKNOWLEDGED transition together.
pub async fn acknowledge_with_broker_id(pool: &PgPool, id: Uuid, ack: BrokerAck<'_>) -> Result<()> {
    let entry = serde_json::json!({
        "status": "ACKNOWLEDGED",
        "timestamp": Utc::now(),
        "actor": "broker",
        "reason": Value::Null,
    });

    sqlx::query(
        r#"
        update orders
        set status = 'ACKNOWLEDGED',
            broker_order_id = $2,
            acked_at = now(),
            status_history = status_history || $3::jsonb
        where id = $1
        "#,
    )
    .bind(id)
    .bind(ack.broker_order_id)
    .bind(&entry)
    .execute(pool)
    .await
    .context("acknowledge_with_broker_id failed")?;
    Ok(())
}

pub async fn reject(pool: &PgPool, id: Uuid, reason: &str, broker_code: Option<&str>) -> Result<()> {
    let entry = serde_json::json!({
        "status": "REJECTED",
        "timestamp": Utc::now(),
        "actor": "broker",
        "reason": reason,
    });

    sqlx::query(
        r#"
        update orders
        set status = 'REJECTED', reject_reason = $2, broker_reject_code = $3,
            status_history = status_history || $4::jsonb
        where id = $1
        "#,
    )
    .bind(id)
    .bind(reason)
    .bind(broker_code)
    .bind(&entry)
    .execute(pool)
    .await
    .context("reject failed")?;
    Ok(())
}

pub async fn fetch_non_terminal_with_broker_id(pool: &PgPool, session_id: Uuid) -> Result<Vec<Order>> {
    let rows = sqlx::query(&format!(
        r#"
        select {ORDER_COLUMNS} from orders
        where session_id = $1
          and broker_order_id is not null
          and status not in ('FILLED','CANCELLED','REJECTED','EXPIRED','RISK_REJECTED')
        "#
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await
    .context("fetch_non_terminal_with_broker_id failed")?;
    rows.iter().map(row_to_order).collect()
}

/// Orders stuck in SENDING/ACKNOWLEDGED older than `older_than_seconds` — candidates for
/// orphan recovery.
pub async fn fetch_orphan_candidates(
    pool: &PgPool,
    session_id: Uuid,
    older_than_seconds: i64,
) -> Result<Vec<Order>> {
    let rows = sqlx::query(&format!(
        r#"
        select {ORDER_COLUMNS} from orders
        where session_id = $1
          and status in ('SENDING', 'ACKNOWLEDGED')
          and created_at < now() - make_interval(secs => $2)
        "#
    ))
    .bind(session_id)
    .bind(older_than_seconds as f64)
    .fetch_all(pool)
    .await
    .context("fetch_orphan_candidates failed")?;
    rows.iter().map(row_to_order).collect()
}

/// Applies a broker-reported fill discovered during reconciliation (as opposed to the
/// live order-update path, which goes through `transition_status`).
pub async fn mark_filled(
    pool: &PgPool,
    id: Uuid,
    filled_quantity: i32,
    avg_fill_price: Option<f64>,
) -> Result<()> {
    let entry = serde_json::json!({
        "status": "FILLED",
        "timestamp": Utc::now(),
        "actor": "reconciliation_worker",
        "reason": Value::Null,
    });

    sqlx::query(
        r#"
        update orders
        set status = 'FILLED', filled_quantity = $2, avg_fill_price = $3, fill_timestamp = now(),
            status_history = status_history || $4::jsonb
        where id = $1
        "#,
    )
    .bind(id)
    .bind(filled_quantity)
    .bind(avg_fill_price)
    .bind(&entry)
    .execute(pool)
    .await
    .context("mark_filled failed")?;
    Ok(())
}

pub async fn fetch_by_broker_order_id(pool: &PgPool, broker_order_id: &str) -> Result<Option<Order>> {
    let row = sqlx::query(&format!(
        "select {ORDER_COLUMNS} from orders where broker_order_id = $1"
    ))
    .bind(broker_order_id)
    .fetch_optional(pool)
    .await
    .context("fetch_by_broker_order_id failed")?;
    row.as_ref().map(row_to_order).transpose()
}
