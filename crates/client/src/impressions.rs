//! Per-session impression logging guard.

use std::collections::HashSet;
use std::sync::Mutex;

use referly_core::AdId;

/// Fraction of the ad container that must be visible in the viewport before
/// an impression is logged.
pub const VISIBILITY_THRESHOLD: f64 = 0.40;

/// Suppresses duplicate impression logging within one rendered session.
///
/// Keyed by `(ad, placement)` and cleared on session end; this only stops
/// the same page view from reporting an ad twice. Cross-session duplicates
/// are the server-side dedup window's job.
#[derive(Debug, Default)]
pub struct ImpressionTracker {
    logged: Mutex<HashSet<(AdId, String)>>,
}

impl ImpressionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the caller should fire an impression report now.
    ///
    /// Returns `true` exactly once per `(ad, placement)` per session, and
    /// only once the container is sufficiently visible.
    pub fn should_log(&self, ad: AdId, placement: &str, visible_fraction: f64) -> bool {
        if visible_fraction < VISIBILITY_THRESHOLD {
            return false;
        }
        let mut logged = self.logged.lock().unwrap();
        logged.insert((ad, placement.to_string()))
    }

    /// Forget everything (session end).
    pub fn reset(&self) {
        self.logged.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_once_per_ad_and_placement() {
        let tracker = ImpressionTracker::new();
        let ad = AdId::new();

        assert!(!tracker.should_log(ad, "sidebar", 0.1));
        assert!(tracker.should_log(ad, "sidebar", 0.5));
        assert!(!tracker.should_log(ad, "sidebar", 0.9));

        // Same ad in another placement is a separate impression.
        assert!(tracker.should_log(ad, "footer", 0.5));
    }

    #[test]
    fn threshold_is_inclusive() {
        let tracker = ImpressionTracker::new();
        assert!(tracker.should_log(AdId::new(), "sidebar", VISIBILITY_THRESHOLD));
    }

    #[test]
    fn reset_allows_logging_again() {
        let tracker = ImpressionTracker::new();
        let ad = AdId::new();

        assert!(tracker.should_log(ad, "sidebar", 1.0));
        tracker.reset();
        assert!(tracker.should_log(ad, "sidebar", 1.0));
    }
}
