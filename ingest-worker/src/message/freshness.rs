//! Freshness guard against redelivered or clock-skewed messages.

use tracing::warn;

use crate::error::{IngestError, Result};

/// Messages older than this (in milliseconds) are rejected.
pub const MAX_MESSAGE_AGE_MS: i64 = 300_000;

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// Reject messages whose base station time is more than five minutes old.
///
/// `age = now - baseStationTime * 1000`; the message is stale iff
/// `age > MAX_MESSAGE_AGE_MS`. Without a numeric base station time the guard
/// has nothing to evaluate and passes.
pub fn check_freshness(base_station_seconds: Option<i64>, now_ms: i64) -> Result<()> {
    let Some(seconds) = base_station_seconds else {
        return Ok(());
    };

    let age_ms = now_ms.saturating_sub(seconds.saturating_mul(1000));
    if age_ms > MAX_MESSAGE_AGE_MS {
        warn!(
            base_station_time = seconds,
            now_ms = now_ms,
            age_ms = age_ms,
            max_age_ms = MAX_MESSAGE_AGE_MS,
            "message_stale"
        );
        return Err(IngestError::StaleMessage {
            age_ms,
            max_age_ms: MAX_MESSAGE_AGE_MS,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: i64 = 1_511_714_827;

    #[test]
    fn test_fresh_message_passes() {
        assert!(check_freshness(Some(BASE), BASE * 1000 + 1_000).is_ok());
    }

    #[test]
    fn test_boundary_is_not_stale() {
        assert!(check_freshness(Some(BASE), BASE * 1000 + MAX_MESSAGE_AGE_MS).is_ok());
    }

    #[test]
    fn test_one_past_boundary_is_stale() {
        let err = check_freshness(Some(BASE), BASE * 1000 + MAX_MESSAGE_AGE_MS + 1).unwrap_err();
        match err {
            IngestError::StaleMessage { age_ms, .. } => assert_eq!(age_ms, 300_001),
            other => panic!("expected StaleMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_future_timestamp_passes() {
        assert!(check_freshness(Some(BASE + 60), BASE * 1000).is_ok());
    }

    #[test]
    fn test_missing_time_skips_guard() {
        assert!(check_freshness(None, i64::MAX).is_ok());
    }

    #[test]
    fn test_fixed_clock() {
        assert_eq!(FixedClock(42).now_millis(), 42);
        assert!(SystemClock.now_millis() > BASE * 1000);
    }
}
