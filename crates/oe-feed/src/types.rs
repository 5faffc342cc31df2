/// A tick is considered stale once its age crosses this threshold — strategies should
/// treat the feed as suspect but the connection itself isn't necessarily dead yet.
pub const STALE_THRESHOLD_S: f64 = 1.0;

/// Past this age with no tick, the feed is presumed dead and a reconnect is warranted.
pub const DEAD_THRESHOLD_S: f64 = 3.0;

/// Consecutive dead evaluations before the websocket circuit breaker is tripped —
/// one slow tick shouldn't trip it, a feed that's been dead for a while should.
pub const CB_TRIP_THRESHOLD: u32 = 5;

/// Reconnect backoff schedule, indexed by attempt number (capped at the last entry).
pub const RECONNECT_DELAYS: [u64; 6] = [1, 2, 4, 8, 16, 30];

/// Seconds to wait before the `attempt`-th reconnect (1-indexed). Attempts beyond the
/// table length repeat the longest delay rather than growing further.
pub fn reconnect_delay_seconds(attempt: u32) -> u64 {
    let idx = (attempt.saturating_sub(1)) as usize;
    RECONNECT_DELAYS[idx.min(RECONNECT_DELAYS.len() - 1)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Fresh,
    Stale,
    Dead,
}

/// Pure classification of a feed's health from the age of its last tick. No I/O, no
/// clock reads — the caller supplies `age_seconds` so this stays testable without
/// sleeping.
pub fn classify(age_seconds: f64) -> FeedState {
    if age_seconds >= DEAD_THRESHOLD_S {
        FeedState::Dead
    } else if age_seconds >= STALE_THRESHOLD_S {
        FeedState::Stale
    } else {
        FeedState::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_below_stale_threshold() {
        assert_eq!(classify(0.5), FeedState::Fresh);
    }

    #[test]
    fn stale_between_thresholds() {
        assert_eq!(classify(1.5), FeedState::Stale);
    }

    #[test]
    fn dead_past_dead_threshold() {
        assert_eq!(classify(3.5), FeedState::Dead);
    }

    #[test]
    fn boundary_values_are_inclusive_on_the_higher_state() {
        assert_eq!(classify(STALE_THRESHOLD_S), FeedState::Stale);
        assert_eq!(classify(DEAD_THRESHOLD_S), FeedState::Dead);
    }

    #[test]
    fn reconnect_delay_follows_the_table_then_plateaus() {
        assert_eq!(reconnect_delay_seconds(1), 1);
        assert_eq!(reconnect_delay_seconds(4), 8);
        assert_eq!(reconnect_delay_seconds(6), 30);
        assert_eq!(reconnect_delay_seconds(20), 30);
    }
}
