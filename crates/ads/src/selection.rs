//! Client-facing ad selection policy.

use chrono::NaiveDate;

use crate::ad::Ad;

/// Pick the ad to render from the active ads of one placement.
///
/// Prefers the first ad whose validity window contains `today`; when none
/// match, falls back to the first active ad even if its window has lapsed or
/// not yet opened. Callers are expected to pass only active ads.
pub fn select_ad<'a>(ads: &'a [Ad], today: NaiveDate) -> Option<&'a Ad> {
    let active: Vec<&Ad> = ads.iter().filter(|ad| ad.active).collect();

    active
        .iter()
        .find(|ad| ad.window_contains(today))
        .or_else(|| active.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use referly_core::AdId;

    fn ad(active: bool, start: Option<&str>, end: Option<&str>) -> Ad {
        Ad {
            id: AdId::new(),
            title: "banner".to_string(),
            placement: "sidebar".to_string(),
            target_url: None,
            start_date: start.map(|s| s.parse().unwrap()),
            end_date: end.map(|s| s.parse().unwrap()),
            active,
            impressions: 0,
            clicks: 0,
            created_at: Utc::now(),
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn prefers_in_window_ad() {
        let ads = vec![
            ad(true, Some("2026-01-01"), Some("2026-01-31")),
            ad(true, Some("2026-03-01"), Some("2026-03-31")),
        ];
        let picked = select_ad(&ads, day("2026-03-15")).unwrap();
        assert_eq!(picked.id, ads[1].id);
    }

    #[test]
    fn falls_back_to_first_active_when_none_in_window() {
        let ads = vec![
            ad(false, None, None),
            ad(true, Some("2026-01-01"), Some("2026-01-31")),
            ad(true, Some("2026-02-01"), Some("2026-02-28")),
        ];
        // Nothing spans March; the first *active* ad wins even though its
        // window has lapsed.
        let picked = select_ad(&ads, day("2026-03-15")).unwrap();
        assert_eq!(picked.id, ads[1].id);
    }

    #[test]
    fn no_active_ads_yields_none() {
        let ads = vec![ad(false, None, None)];
        assert!(select_ad(&ads, day("2026-03-15")).is_none());
    }
}
