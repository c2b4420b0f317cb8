// src/models/dedup.rs

//! Cross-run dedup state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Sighting and notification history for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub fingerprint: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub last_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notify_count: u32,
}

impl DedupRecord {
    /// Record for a first sighting.
    pub fn first_seen(fingerprint: impl Into<String>, seen_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            first_seen_at: seen_at,
            last_seen_at: seen_at,
            last_notified_at: None,
            notify_count: 0,
        }
    }

    /// Whether a notification at `now` is allowed.
    ///
    /// Never notified: always. Otherwise only when a cooldown is configured
    /// and has fully elapsed since the last notification.
    pub fn is_notifiable(&self, now: DateTime<Utc>, cooldown: Option<Duration>) -> bool {
        match (self.last_notified_at, cooldown) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(last), Some(window)) => now - last >= window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_notified_is_notifiable() {
        let now = Utc::now();
        let record = DedupRecord::first_seen("fp", now);
        assert!(record.is_notifiable(now, None));
    }

    #[test]
    fn test_default_window_never_renotifies() {
        let now = Utc::now();
        let mut record = DedupRecord::first_seen("fp", now);
        record.last_notified_at = Some(now - Duration::days(365));
        assert!(!record.is_notifiable(now, None));
    }

    #[test]
    fn test_cooldown_elapses() {
        let now = Utc::now();
        let mut record = DedupRecord::first_seen("fp", now);
        record.last_notified_at = Some(now - Duration::hours(5));
        assert!(!record.is_notifiable(now, Some(Duration::hours(6))));
        assert!(record.is_notifiable(now, Some(Duration::hours(5))));
    }
}
