//! Shared time budget helpers for pursuit deadlines.

use std::time::Duration;

use tokio::time::Instant;

/// Return the time left until `deadline`, or `None` once it has passed.
pub fn remaining_budget(deadline: Instant) -> Option<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return None;
    }
    Some(remaining)
}

/// The earlier of `deadline` and `now + timeout`.
pub fn tighten_deadline(deadline: Instant, timeout: Option<Duration>) -> Instant {
    match timeout {
        Some(timeout) => deadline.min(Instant::now() + timeout),
        None => deadline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn remaining_budget_expires_at_deadline() {
        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(remaining_budget(deadline), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(remaining_budget(deadline), None);
    }

    #[tokio::test(start_paused = true)]
    async fn tighten_deadline_picks_earlier_instant() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let tightened = tighten_deadline(deadline, Some(Duration::from_secs(10)));
        assert_eq!(tightened, Instant::now() + Duration::from_secs(10));
        assert_eq!(tighten_deadline(deadline, None), deadline);
    }
}
