//! DB-persisted circuit breaker, one instance per external dependency (orders, quotes,
//! funds, the broker websocket). State lives in Postgres so every process sees the same
//! breaker — a single runaway order-placement loop in one replica should stop order
//! placement everywhere, not just locally.
use anyhow::Result;
use chrono::{DateTime, Utc};
use oe_db::circuit::{self, CircuitBreakerState};
use sqlx::PgPool;

pub mod policy;

pub use policy::{Policy, Service};

/// Pure view of breaker state, decoupled from the DB row shape so the decision logic can
/// be unit tested without a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    fn parse(s: &str) -> Self {
        match s {
            "OPEN" => State::Open,
            "HALF_OPEN" => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

/// What a caller should do before making the underlying call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Allow,
    Deny,
}

/// Decides whether a call should be allowed given the breaker's last known state and,
/// if OPEN, whether `next_attempt_at` has elapsed. Pure — no I/O.
pub fn gate(state: State, next_attempt_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Gate {
    match state {
        State::Closed | State::HalfOpen => Gate::Allow,
        State::Open => match next_attempt_at {
            Some(t) if now >= t => Gate::Allow,
            _ => Gate::Deny,
        },
    }
}

/// Checks the persisted state for `service`, allowing a probe call through once the
/// cooldown has elapsed by first flipping OPEN -> HALF_OPEN. Returns `Gate::Deny` without
/// any DB write when the cooldown hasn't elapsed yet.
pub async fn check(pool: &PgPool, service: Service) -> Result<Gate> {
    let row = circuit::ensure_service(pool, service.name()).await?;
    let current = State::parse(&row.state);
    let now = Utc::now();

    if current == State::Open {
        if let Some(next) = row.next_attempt_at {
            if now >= next {
                circuit::transition_to_half_open(pool, service.name()).await?;
                return Ok(Gate::Allow);
            }
        }
        return Ok(Gate::Deny);
    }

    Ok(gate(current, row.next_attempt_at, now))
}

/// Records a successful call. In HALF_OPEN, enough consecutive successes close the
/// breaker; in CLOSED each success also resets `failure_count`, so an isolated failure
/// doesn't linger in the count toward a later, unrelated trip.
pub async fn record_success(pool: &PgPool, service: Service) -> Result<CircuitBreakerState> {
    let updated = circuit::record_success(pool, service.name()).await?;
    let policy = service.policy();

    if State::parse(&updated.state) == State::HalfOpen
        && updated.success_count >= policy.half_open_success_threshold
    {
        return Ok(circuit::close_circuit(pool, service.name()).await?);
    }
    Ok(updated)
}

/// Records a failed call. A HALF_OPEN failure re-opens immediately (one bad probe is
/// enough); a CLOSED failure opens once `failure_threshold` is reached within the
/// tracked window — the window itself is enforced by resetting the counter on `close`.
pub async fn record_failure(pool: &PgPool, service: Service) -> Result<CircuitBreakerState> {
    let before = circuit::fetch_state(pool, service.name()).await?;
    let policy = service.policy();

    if State::parse(&before.state) == State::HalfOpen {
        return Ok(circuit::trip_open(pool, service.name(), policy.cooldown_seconds).await?);
    }

    let updated = circuit::record_failure(pool, service.name()).await?;
    if updated.failure_count >= policy.failure_threshold {
        return Ok(circuit::trip_open(pool, service.name(), policy.cooldown_seconds).await?);
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn closed_always_allows() {
        assert_eq!(gate(State::Closed, None, Utc::now()), Gate::Allow);
    }

    #[test]
    fn open_denies_before_cooldown() {
        let now = Utc::now();
        let next = now + Duration::seconds(30);
        assert_eq!(gate(State::Open, Some(next), now), Gate::Deny);
    }

    #[test]
    fn open_allows_after_cooldown() {
        let now = Utc::now();
        let next = now - Duration::seconds(1);
        assert_eq!(gate(State::Open, Some(next), now), Gate::Allow);
    }

    #[test]
    fn open_with_no_next_attempt_denies() {
        assert_eq!(gate(State::Open, None, Utc::now()), Gate::Deny);
    }

    #[test]
    fn half_open_allows_the_probe() {
        assert_eq!(gate(State::HalfOpen, None, Utc::now()), Gate::Allow);
    }
}
