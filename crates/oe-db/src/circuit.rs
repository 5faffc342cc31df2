use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct CircuitBreakerState {
    pub id: uuid::Uuid,
    pub service_name: String,
    pub state: String,
    pub failure_count: i32,
    pub success_count: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

const CB_COLUMNS: &str = r#"
    id, service_name, state, failure_count, success_count, last_failure_at, opened_at, next_attempt_at
"#;

fn row_to_cb(row: &sqlx::postgres::PgRow) -> Result<CircuitBreakerState> {
    Ok(CircuitBreakerState {
        id: row.try_get("id")?,
        service_name: row.try_get("service_name")?,
        state: row.try_get("state")?,
        failure_count: row.try_get("failure_count")?,
        success_count: row.try_get("success_count")?,
        last_failure_at: row.try_get("last_failure_at")?,
        opened_at: row.try_get("opened_at")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
    })
}

pub async fn ensure_service(pool: &PgPool, service_name: &str) -> Result<CircuitBreakerState> {
    sqlx::query(
        "insert into circuit_breaker_states (service_name) values ($1) on conflict (service_name) do nothing",
    )
    .bind(service_name)
    .execute(pool)
    .await
    .context("ensure_service insert failed")?;

    let row = sqlx::query(&format!(
        "select {CB_COLUMNS} from circuit_breaker_states where service_name = $1"
    ))
    .bind(service_name)
    .fetch_one(pool)
    .await
    .context("ensure_service fetch failed")?;
    row_to_cb(&row)
}

pub async fn fetch_state(pool: &PgPool, service_name: &str) -> Result<CircuitBreakerState> {
    let row = sqlx::query(&format!(
        "select {CB_COLUMNS} from circuit_breaker_states where service_name = $1"
    ))
    .bind(service_name)
    .fetch_one(pool)
    .await
    .context("fetch_state failed")?;
    row_to_cb(&row)
}

pub async fn record_success(pool: &PgPool, service_name: &str) -> Result<CircuitBreakerState> {
    let row = sqlx::query(&format!(
        r#"
        update circuit_breaker_states
        set success_count = success_count + 1,
            failure_count = case when state = 'CLOSED' then 0 else failure_count end
        where service_name = $1
        returning {CB_COLUMNS}
        "#
    ))
    .bind(service_name)
    .fetch_one(pool)
    .await
    .context("record_success failed")?;
    row_to_cb(&row)
}

pub async fn record_failure(pool: &PgPool, service_name: &str) -> Result<CircuitBreakerState> {
    let row = sqlx::query(&format!(
        r#"
        update circuit_breaker_states
        set failure_count = failure_count + 1, last_failure_at = now()
        where service_name = $1
        returning {CB_COLUMNS}
        "#
    ))
    .bind(service_name)
    .fetch_one(pool)
    .await
    .context("record_failure failed")?;
    row_to_cb(&row)
}

/// Transitions into OPEN, recording when the next half-open probe is allowed.
pub async fn trip_open(
    pool: &PgPool,
    service_name: &str,
    cooldown_seconds: i64,
) -> Result<CircuitBreakerState> {
    let row = sqlx::query(&format!(
        r#"
        update circuit_breaker_states
        set state = 'OPEN', opened_at = now(),
            next_attempt_at = now() + make_interval(secs => $2),
            success_count = 0
        where service_name = $1
        returning {CB_COLUMNS}
        "#
    ))
    .bind(service_name)
    .bind(cooldown_seconds as f64)
    .fetch_one(pool)
    .await
    .context("trip_open failed")?;
    row_to_cb(&row)
}

pub async fn transition_to_half_open(pool: &PgPool, service_name: &str) -> Result<CircuitBreakerState> {
    let row = sqlx::query(&format!(
        r#"
        update circuit_breaker_states
        set state = 'HALF_OPEN', success_count = 0
        where service_name = $1
        returning {CB_COLUMNS}
        "#
    ))
    .bind(service_name)
    .fetch_one(pool)
    .await
    .context("transition_to_half_open failed")?;
    row_to_cb(&row)
}

pub async fn close_circuit(pool: &PgPool, service_name: &str) -> Result<CircuitBreakerState> {
    let row = sqlx::query(&format!(
        r#"
        update circuit_breaker_states
        set state = 'CLOSED', failure_count = 0, success_count = 0, opened_at = null, next_attempt_at = null
        where service_name = $1
        returning {CB_COLUMNS}
        "#
    ))
    .bind(service_name)
    .fetch_one(pool)
    .await
    .context("close_circuit failed")?;
    row_to_cb(&row)
}
