//! Best-match selection of a memento for a requested datetime.
//!
//! Everything here is a pure function of its inputs: no I/O, no clock reads
//! beyond [`target_or_now`].

use crate::types::{Memento, ResourceType, TimeMap};
use chrono::{DateTime, Utc};

/// Outcome of negotiating one TimeGate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationResult {
    pub chosen: Memento,
    pub first: Option<Memento>,
    pub last: Option<Memento>,
    /// Whether timemap links should be advertised alongside the redirect
    pub has_history_endpoint: bool,
}

/// The requested datetime, or the current time when the client sent none.
pub fn target_or_now(requested: Option<DateTime<Utc>>) -> DateTime<Utc> {
    requested.unwrap_or_else(Utc::now)
}

/// Wrap a memento fetched directly from a source.
pub fn negotiate_single(memento: Memento, has_history_endpoint: bool) -> NegotiationResult {
    NegotiationResult {
        chosen: memento,
        first: None,
        last: None,
        has_history_endpoint,
    }
}

/// Pick the best memento out of a full timemap.
pub fn negotiate_list(
    timemap: &TimeMap,
    target: DateTime<Utc>,
    resource_type: ResourceType,
    has_history_endpoint: bool,
) -> NegotiationResult {
    NegotiationResult {
        chosen: best(timemap, target, resource_type).clone(),
        first: Some(timemap.first().clone()),
        last: Some(timemap.last().clone()),
        has_history_endpoint,
    }
}

pub fn best(timemap: &TimeMap, target: DateTime<Utc>, resource_type: ResourceType) -> &Memento {
    match resource_type {
        ResourceType::VersionControlled => latest_not_after(timemap, target),
        ResourceType::Snapshot => closest(timemap, target),
    }
}

/// Rightmost memento with `datetime <= target`, or the first one if the
/// target predates the whole list.
fn latest_not_after(timemap: &TimeMap, target: DateTime<Utc>) -> &Memento {
    let mementos = timemap.as_slice();
    let after = mementos.partition_point(|m| m.datetime <= target);
    &mementos[after.saturating_sub(1)]
}

/// Memento minimizing the absolute distance to `target`; ties go to the
/// earlier entry.
fn closest(timemap: &TimeMap, target: DateTime<Utc>) -> &Memento {
    let mut best = timemap.first();
    let mut best_distance = (best.datetime - target).abs();
    for memento in timemap.iter().skip(1) {
        let distance = (memento.datetime - target).abs();
        if distance < best_distance {
            best = memento;
            best_distance = distance;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ymd(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    fn timemap(dates: &[DateTime<Utc>]) -> TimeMap {
        TimeMap::new(
            dates
                .iter()
                .enumerate()
                .map(|(i, dt)| Memento::new(format!("http://example.com/v{}", i + 1), *dt))
                .collect(),
        )
        .unwrap()
    }

    fn resource_a() -> TimeMap {
        timemap(&[ymd(1999, 1, 1), ymd(2010, 6, 1), ymd(2020, 1, 1)])
    }

    #[test]
    fn test_vcs_picks_latest_not_after_target() {
        let tm = resource_a();
        let chosen = best(&tm, ymd(2015, 1, 1), ResourceType::VersionControlled);
        assert_eq!(chosen.uri, "http://example.com/v2");
        let chosen = best(&tm, ymd(2010, 1, 1), ResourceType::VersionControlled);
        assert_eq!(chosen.uri, "http://example.com/v1");
    }

    #[test]
    fn test_vcs_exact_match_is_inclusive() {
        let tm = resource_a();
        let chosen = best(&tm, ymd(2010, 6, 1), ResourceType::VersionControlled);
        assert_eq!(chosen.uri, "http://example.com/v2");
    }

    #[test]
    fn test_vcs_before_everything_falls_back_to_first() {
        let tm = resource_a();
        let chosen = best(&tm, ymd(1900, 1, 1), ResourceType::VersionControlled);
        assert_eq!(chosen.uri, "http://example.com/v1");
    }

    #[test]
    fn test_vcs_after_everything_is_last() {
        let tm = resource_a();
        let chosen = best(&tm, ymd(2100, 1, 1), ResourceType::VersionControlled);
        assert_eq!(chosen.uri, "http://example.com/v3");
    }

    #[test]
    fn test_vcs_duplicate_datetimes_take_rightmost() {
        let tm = timemap(&[ymd(2000, 1, 1), ymd(2000, 1, 1), ymd(2001, 1, 1)]);
        let chosen = best(&tm, ymd(2000, 6, 1), ResourceType::VersionControlled);
        assert_eq!(chosen.uri, "http://example.com/v2");
    }

    #[test]
    fn test_snapshot_picks_closest_in_either_direction() {
        let tm = resource_a();
        let chosen = best(&tm, ymd(2010, 1, 1), ResourceType::Snapshot);
        assert_eq!(chosen.uri, "http://example.com/v2");
        let chosen = best(&tm, ymd(2100, 1, 1), ResourceType::Snapshot);
        assert_eq!(chosen.uri, "http://example.com/v3");
        let chosen = best(&tm, ymd(1900, 1, 1), ResourceType::Snapshot);
        assert_eq!(chosen.uri, "http://example.com/v1");
    }

    #[test]
    fn test_snapshot_tie_prefers_earlier() {
        let tm = timemap(&[ymd(2000, 1, 1), ymd(2000, 1, 3)]);
        let chosen = best(&tm, ymd(2000, 1, 2), ResourceType::Snapshot);
        assert_eq!(chosen.uri, "http://example.com/v1");
    }

    #[test]
    fn test_single_entry_list_always_chosen() {
        let tm = timemap(&[ymd(2005, 5, 5)]);
        for target in [ymd(1990, 1, 1), ymd(2005, 5, 5), ymd(2030, 1, 1)] {
            assert_eq!(best(&tm, target, ResourceType::Snapshot).uri, "http://example.com/v1");
            assert_eq!(
                best(&tm, target, ResourceType::VersionControlled).uri,
                "http://example.com/v1"
            );
        }
    }

    #[test]
    fn test_policies_agree_with_linear_scan() {
        let start = ymd(2000, 1, 1);
        let dates: Vec<_> = [0, 3, 3, 10, 25, 26, 40]
            .iter()
            .map(|d| start + Duration::days(*d))
            .collect();
        let tm = timemap(&dates);

        for offset in -5..50 {
            let target = start + Duration::days(offset) + Duration::hours(7);

            let expected_vcs = tm
                .iter()
                .rev()
                .find(|m| m.datetime <= target)
                .unwrap_or(tm.first());
            assert_eq!(best(&tm, target, ResourceType::VersionControlled), expected_vcs);

            let min_distance = tm.iter().map(|m| (m.datetime - target).abs()).min().unwrap();
            let expected_snapshot = tm
                .iter()
                .find(|m| (m.datetime - target).abs() == min_distance)
                .unwrap();
            assert_eq!(best(&tm, target, ResourceType::Snapshot), expected_snapshot);
        }
    }

    #[test]
    fn test_negotiate_list_reports_boundaries() {
        let tm = resource_a();
        let result = negotiate_list(&tm, ymd(2015, 1, 1), ResourceType::VersionControlled, true);
        assert_eq!(result.chosen.uri, "http://example.com/v2");
        assert_eq!(result.first.unwrap().uri, "http://example.com/v1");
        assert_eq!(result.last.unwrap().uri, "http://example.com/v3");
        assert!(result.has_history_endpoint);
    }

    #[test]
    fn test_negotiate_single_has_no_boundaries() {
        let memento = Memento::new("http://example.com/v9", ymd(2001, 1, 1));
        let result = negotiate_single(memento.clone(), false);
        assert_eq!(result.chosen, memento);
        assert!(result.first.is_none());
        assert!(result.last.is_none());
        assert!(!result.has_history_endpoint);
    }

    #[test]
    fn test_target_defaults_to_now() {
        let before = Utc::now();
        let target = target_or_now(None);
        assert!(target >= before);
        assert_eq!(target_or_now(Some(ymd(2001, 1, 1))), ymd(2001, 1, 1));
    }
}
