//! Intent/ack control channel between the strategy control surface (an operator, or an
//! automated guard) and the strategy executor.
//!
//! A control action never mutates a strategy's status directly. It records a pending
//! intent; the executor picks it up on its own loop, performs whatever teardown/startup
//! the transition requires, and then acks by writing the resulting status. This keeps
//! "stop the strategy" from racing with the executor mid-tick.
use std::time::Duration;

use anyhow::{bail, Result};
use oe_db::control_log;
use oe_db::strategy_state::{self, StrategyState};
use oe_schemas::{ControlIntent, ErrorCode, StrategyStatus};
use serde::Serialize;
use sqlx::PgPool;

/// How long `send_intent` waits for the executor to ack before giving up.
pub const ACK_TIMEOUT_S: u64 = 10;
/// Poll interval while waiting for an ack.
pub const ACK_POLL_MS: u64 = 200;

/// What `wait_for_ack` resolved to. A timeout is not an error — the intent is still
/// queued and the executor is still free to consume it on its next loop tick.
#[derive(Debug, Clone)]
pub enum AckOutcome {
    Confirmed(StrategyState),
    Pending,
}

/// The three outcomes a caller of the control surface distinguishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAckStatus {
    Confirmed,
    Pending,
    Error,
}

/// Response shape for one control action: always returned, never just a bare `Result`,
/// so a caller can distinguish "executor acked", "still queued", and "rejected" without
/// parsing an error string.
#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub success: bool,
    pub strategy: String,
    pub action: String,
    pub status: ControlAckStatus,
    pub current_status: String,
    pub ack_latency_ms: Option<i32>,
    pub message: String,
}

fn allowed_from(intent: ControlIntent, current: StrategyStatus) -> bool {
    use ControlIntent::*;
    use StrategyStatus::*;
    match intent {
        Start => matches!(current, Stopped | Error),
        Stop => matches!(current, Running | Paused | Starting | Error),
        Pause => matches!(current, Running),
        Resume => matches!(current, Paused),
    }
}

/// Validates the transition and records a pending intent. Does not wait for the ack —
/// call `wait_for_ack` separately, or use `send_and_wait`.
///
/// `confirm` guards `Stop` only: a caller that omits it (or passes `false`) is rejected
/// with `CONFIRM_REQUIRED` before anything is recorded. Every other intent ignores it.
pub async fn send_intent(
    pool: &PgPool,
    strategy_name: &str,
    intent: ControlIntent,
    confirm: bool,
    actor: &str,
    ip_address: Option<&str>,
) -> Result<()> {
    if intent == ControlIntent::Stop && !confirm {
        bail!(
            "{}: stopping strategy '{}' requires confirm=true",
            ErrorCode::ConfirmRequired.as_str(),
            strategy_name
        );
    }

    let state = strategy_state::fetch_by_name(pool, strategy_name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown strategy: {strategy_name}"))?;

    let current = parse_status(&state.status)?;
    if !allowed_from(intent, current) {
        bail!(
            "{}: cannot {:?} strategy '{}' from status {:?}",
            ErrorCode::InvalidTransition.as_str(),
            intent,
            strategy_name,
            current
        );
    }

    let to_status = intent.resulting_status();
    control_log::record_intent(
        pool,
        strategy_name,
        intent.as_str(),
        actor,
        ip_address,
        current.as_str(),
        to_status.as_str(),
    )
    .await?;

    strategy_state::set_pending_intent(pool, strategy_name, intent.as_str(), actor).await?;
    Ok(())
}

/// Polls until the executor has cleared `control_intent` (acked) or the timeout elapses.
/// A timeout is not an error: the intent stays queued in the row and the executor's own
/// control loop keeps consuming it on its normal cadence, so the caller gets `Pending`
/// rather than a failure.
pub async fn wait_for_ack(pool: &PgPool, strategy_name: &str) -> Result<AckOutcome> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(ACK_TIMEOUT_S);

    loop {
        let state = strategy_state::fetch_by_name(pool, strategy_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown strategy: {strategy_name}"))?;

        if state.control_intent.is_none() {
            return Ok(AckOutcome::Confirmed(state));
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(AckOutcome::Pending);
        }

        tokio::time::sleep(Duration::from_millis(ACK_POLL_MS)).await;
    }
}

/// Sends an intent and waits for its outcome, always returning a [`ControlResponse`] —
/// a rejected transition or a missing confirm is reported as `status: Error` rather than
/// bubbling up as an `Err`, so every caller gets one typed shape back.
pub async fn send_and_wait(
    pool: &PgPool,
    strategy_name: &str,
    intent: ControlIntent,
    confirm: bool,
    actor: &str,
    ip_address: Option<&str>,
) -> Result<ControlResponse> {
    if let Err(e) = send_intent(pool, strategy_name, intent, confirm, actor, ip_address).await {
        let current_status = strategy_state::fetch_by_name(pool, strategy_name)
            .await
            .ok()
            .flatten()
            .map(|s| s.status)
            .unwrap_or_default();
        return Ok(ControlResponse {
            success: false,
            strategy: strategy_name.to_string(),
            action: intent.as_str().to_string(),
            status: ControlAckStatus::Error,
            current_status,
            ack_latency_ms: None,
            message: e.to_string(),
        });
    }

    match wait_for_ack(pool, strategy_name).await? {
        AckOutcome::Confirmed(state) => {
            let ack_latency_ms = control_log::fetch_recent(pool, strategy_name, 1)
                .await?
                .into_iter()
                .next()
                .and_then(|entry| entry.ack_latency_ms);
            oe_audit::strategy_control_action(pool, strategy_name, intent.as_str(), actor, ip_address)
                .await
                .ok();
            Ok(ControlResponse {
                success: true,
                strategy: strategy_name.to_string(),
                action: intent.as_str().to_string(),
                status: ControlAckStatus::Confirmed,
                current_status: state.status,
                ack_latency_ms,
                message: format!("{intent} confirmed"),
            })
        }
        AckOutcome::Pending => {
            let state = strategy_state::fetch_by_name(pool, strategy_name)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown strategy: {strategy_name}"))?;
            Ok(ControlResponse {
                success: true,
                strategy: strategy_name.to_string(),
                action: intent.as_str().to_string(),
                status: ControlAckStatus::Pending,
                current_status: state.status,
                ack_latency_ms: None,
                message: "intent queued, executor has not acked yet".to_string(),
            })
        }
    }
}

/// Executor-side: reads the pending intent (if any) for a strategy and, if present,
/// applies it and acks, recording latency back into the control log.
pub async fn poll_and_apply(pool: &PgPool, strategy_name: &str) -> Result<Option<ControlIntent>> {
    let state = strategy_state::fetch_by_name(pool, strategy_name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown strategy: {strategy_name}"))?;

    let Some(intent_str) = state.control_intent.as_deref() else {
        return Ok(None);
    };
    let intent: ControlIntent = intent_str.parse()?;

    let latency_ms = state
        .intent_set_at
        .map(|set_at| (chrono::Utc::now() - set_at).num_milliseconds() as i32)
        .unwrap_or(0);

    strategy_state::acknowledge_intent(pool, strategy_name, intent.resulting_status().as_str()).await?;
    control_log::record_ack(pool, strategy_name, latency_ms, None).await?;

    Ok(Some(intent))
}

fn parse_status(s: &str) -> Result<StrategyStatus> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_only_allowed_from_stopped_or_error() {
        assert!(allowed_from(ControlIntent::Start, StrategyStatus::Stopped));
        assert!(allowed_from(ControlIntent::Start, StrategyStatus::Error));
        assert!(!allowed_from(ControlIntent::Start, StrategyStatus::Running));
    }

    #[test]
    fn pause_only_from_running() {
        assert!(allowed_from(ControlIntent::Pause, StrategyStatus::Running));
        assert!(!allowed_from(ControlIntent::Pause, StrategyStatus::Paused));
        assert!(!allowed_from(ControlIntent::Pause, StrategyStatus::Stopped));
    }

    #[test]
    fn resume_only_from_paused() {
        assert!(allowed_from(ControlIntent::Resume, StrategyStatus::Paused));
        assert!(!allowed_from(ControlIntent::Resume, StrategyStatus::Running));
    }

    #[test]
    fn stop_from_running_paused_starting_or_error() {
        assert!(allowed_from(ControlIntent::Stop, StrategyStatus::Running));
        assert!(allowed_from(ControlIntent::Stop, StrategyStatus::Paused));
        assert!(allowed_from(ControlIntent::Stop, StrategyStatus::Starting));
        assert!(allowed_from(ControlIntent::Stop, StrategyStatus::Error));
        assert!(!allowed_from(ControlIntent::Stop, StrategyStatus::Stopped));
    }
}
