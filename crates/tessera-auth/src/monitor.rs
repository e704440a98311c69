//! Authentication failure monitor.
//!
//! Keeps a bounded ring buffer of recent authentication failures and
//! flags repeating patterns, e.g. a burst of malformed tokens pointing
//! at systemic session corruption. Purely advisory: records are never
//! consulted for authorization decisions, and losing a record under
//! contention is acceptable.
//!
//! The monitor is an explicitly constructed component handed to the
//! gatekeeper by reference; its lifetime is the server process's own
//! startup and shutdown. Nothing here persists.

use std::collections::VecDeque;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::config::MonitorConfig;
use crate::error::FailureKind;

/// Maximum stored length of a failure message.
const MESSAGE_LIMIT: usize = 160;

/// One recorded authentication failure.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    /// When the failure occurred.
    pub at: OffsetDateTime,

    /// Failure category.
    pub kind: FailureKind,

    /// Truncated error message.
    pub message: String,

    /// Request path that triggered the failure.
    pub path: String,

    /// Whether the failure matches the token corruption signature
    /// (a credential present but unparsable).
    pub corruption_signature: bool,
}

/// Process-wide monitor of recent authentication failures.
pub struct AuthMonitor {
    records: RwLock<VecDeque<FailureRecord>>,
    capacity: usize,
    pattern_threshold: usize,
    pattern_window: Duration,
}

impl AuthMonitor {
    /// Creates a monitor with the given thresholds.
    #[must_use]
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(config.capacity)),
            capacity: config.capacity.max(1),
            pattern_threshold: config.pattern_threshold.max(1),
            pattern_window: config.pattern_window,
        }
    }

    /// Records a failure, evicting the oldest entry when full.
    pub async fn record(&self, kind: FailureKind, message: &str, path: &str) {
        let message: String = message.chars().take(MESSAGE_LIMIT).collect();

        let record = FailureRecord {
            at: OffsetDateTime::now_utc(),
            kind,
            message,
            path: path.to_string(),
            corruption_signature: kind == FailureKind::Malformed,
        };

        let mut records = self.records.write().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Returns the failure kind currently repeating, if any.
    ///
    /// A kind repeats when at least the configured threshold of failures
    /// of that kind fall within the sliding window ending now.
    pub async fn detected_pattern(&self) -> Option<FailureKind> {
        let cutoff = OffsetDateTime::now_utc() - self.pattern_window;
        let records = self.records.read().await;

        let mut counts: Vec<(FailureKind, usize)> = Vec::new();
        for record in records.iter().filter(|r| r.at >= cutoff) {
            match counts.iter_mut().find(|(kind, _)| *kind == record.kind) {
                Some((_, count)) => *count += 1,
                None => counts.push((record.kind, 1)),
            }
        }

        counts
            .into_iter()
            .filter(|(_, count)| *count >= self.pattern_threshold)
            .max_by_key(|(_, count)| *count)
            .map(|(kind, _)| kind)
    }

    /// Returns `true` if any failure kind is currently repeating.
    pub async fn has_repeating_pattern(&self) -> bool {
        self.detected_pattern().await.is_some()
    }

    /// Advisory recommendations for the detected pattern.
    ///
    /// Static, category-keyed strings; empty when no pattern is active.
    pub async fn recommendations(&self) -> Vec<&'static str> {
        match self.detected_pattern().await {
            Some(kind) => recommendations_for(kind),
            None => Vec::new(),
        }
    }

    /// Snapshot of the most recent failures, newest last.
    pub async fn recent(&self, limit: usize) -> Vec<FailureRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Static advisory strings per failure category.
fn recommendations_for(kind: FailureKind) -> Vec<&'static str> {
    match kind {
        FailureKind::Malformed => vec![
            "Inspect session cookie handling for truncation or double-encoding",
            "Clear affected sessions and force re-authentication",
        ],
        FailureKind::Expired => vec![
            "Check clock skew between this host and the identity provider",
            "Review the provider's token lifetime configuration",
        ],
        FailureKind::BadSignature => vec![
            "Confirm the provider's signing keys have not rotated unexpectedly",
            "Invalidate the signing key cache to force a fresh key set",
        ],
        FailureKind::IssuerMismatch => {
            vec!["Verify the configured issuer matches the provider environment"]
        }
        FailureKind::AudienceMismatch => {
            vec!["Verify the configured audience matches this application's registration"]
        }
        FailureKind::UnknownKey => vec![
            "Invalidate the signing key cache to force a fresh key set",
            "Confirm key rotation completed on the provider side",
        ],
        FailureKind::TenantMissing => {
            vec!["Review the provider's organization/team claim mapping"]
        }
        FailureKind::Service => {
            vec!["Check the network path to the identity provider's key set endpoint"]
        }
        FailureKind::Internal => vec!["Inspect server logs for the underlying failure"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_monitor(threshold: usize, window: Duration) -> AuthMonitor {
        AuthMonitor::new(&MonitorConfig {
            capacity: 16,
            pattern_threshold: threshold,
            pattern_window: window,
        })
    }

    #[tokio::test]
    async fn test_pattern_requires_threshold() {
        let monitor = test_monitor(5, Duration::from_secs(60));

        for _ in 0..4 {
            monitor
                .record(FailureKind::Malformed, "bad segment count", "/dashboard")
                .await;
        }
        assert!(!monitor.has_repeating_pattern().await);

        monitor
            .record(FailureKind::Malformed, "bad segment count", "/dashboard")
            .await;
        assert!(monitor.has_repeating_pattern().await);
        assert_eq!(
            monitor.detected_pattern().await,
            Some(FailureKind::Malformed)
        );
        assert!(!monitor.recommendations().await.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_kinds_do_not_accumulate() {
        let monitor = test_monitor(5, Duration::from_secs(60));

        monitor.record(FailureKind::Expired, "e", "/a").await;
        monitor.record(FailureKind::Malformed, "m", "/a").await;
        monitor.record(FailureKind::BadSignature, "s", "/a").await;
        monitor.record(FailureKind::Expired, "e", "/b").await;
        monitor.record(FailureKind::Malformed, "m", "/b").await;

        assert!(!monitor.has_repeating_pattern().await);
        assert!(monitor.recommendations().await.is_empty());
    }

    #[tokio::test]
    async fn test_ring_buffer_eviction() {
        let monitor = AuthMonitor::new(&MonitorConfig {
            capacity: 3,
            pattern_threshold: 100,
            pattern_window: Duration::from_secs(60),
        });

        for i in 0..5 {
            monitor
                .record(FailureKind::Expired, &format!("failure {i}"), "/a")
                .await;
        }

        assert_eq!(monitor.len().await, 3);
        let recent = monitor.recent(10).await;
        // Oldest two evicted.
        assert_eq!(recent[0].message, "failure 2");
        assert_eq!(recent[2].message, "failure 4");
    }

    #[tokio::test]
    async fn test_corruption_signature_flag() {
        let monitor = test_monitor(5, Duration::from_secs(60));

        monitor.record(FailureKind::Malformed, "garbage", "/a").await;
        monitor.record(FailureKind::Expired, "old", "/a").await;

        let recent = monitor.recent(10).await;
        assert!(recent[0].corruption_signature);
        assert!(!recent[1].corruption_signature);
    }

    #[tokio::test]
    async fn test_message_truncation() {
        let monitor = test_monitor(5, Duration::from_secs(60));
        let long = "x".repeat(500);

        monitor.record(FailureKind::Internal, &long, "/a").await;

        let recent = monitor.recent(1).await;
        assert_eq!(recent[0].message.len(), MESSAGE_LIMIT);
    }

    #[tokio::test]
    async fn test_window_excludes_old_failures() {
        // Zero-width window: nothing recorded "now" minus anything counts.
        let monitor = test_monitor(1, Duration::from_secs(0));
        monitor.record(FailureKind::Expired, "e", "/a").await;

        // Records at exactly the cutoff still count; sleep past it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!monitor.has_repeating_pattern().await);
    }
}
