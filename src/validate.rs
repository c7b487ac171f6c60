//! Candidate filters applied before anything reaches the resolver.

use chrono::{DateTime, Utc};

use crate::candidate::{EventCandidate, NoticeCandidate};

/// Notices older than this many days are dropped.
pub const DEFAULT_NOTICE_MAX_AGE_DAYS: i64 = 5;

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "svg"];
const DAY_MS: f64 = 86_400_000.0;

/// True when the url mentions a known image extension anywhere in it.
///
/// This is a substring match, not a suffix match: `https://x/y?fmt=png` passes,
/// and so does any url that merely contains e.g. "svg" in a path segment.
/// Tightening it to a suffix check would change which items are eligible.
pub fn is_valid_image(url: Option<&str>) -> bool {
    let Some(url) = url else {
        return false;
    };
    if url.trim().is_empty() {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

/// `ceil((now - created_at) / 1 day) <= max_days`. Missing timestamp fails.
pub fn is_recent(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>, max_days: i64) -> bool {
    let Some(created_at) = created_at else {
        return false;
    };
    let elapsed_ms = (now - created_at).num_milliseconds() as f64;
    let days = (elapsed_ms / DAY_MS).ceil() as i64;
    days <= max_days
}

/// Keep notices with a usable flyer that are at most `max_days` old.
pub fn filter_notices(
    notices: Vec<NoticeCandidate>,
    now: DateTime<Utc>,
    max_days: i64,
) -> Vec<NoticeCandidate> {
    let before = notices.len();
    let kept: Vec<_> = notices
        .into_iter()
        .filter(|n| is_valid_image(n.image_url.as_deref()) && is_recent(n.created_at, now, max_days))
        .collect();
    tracing::debug!(target: "popup", before, kept = kept.len(), "notices filtered");
    kept
}

/// Keep events with a usable image. Event age is not checked.
pub fn filter_events(events: Vec<EventCandidate>) -> Vec<EventCandidate> {
    let before = events.len();
    let kept: Vec<_> = events
        .into_iter()
        .filter(|e| is_valid_image(e.image_url.as_deref()))
        .collect();
    tracing::debug!(target: "popup", before, kept = kept.len(), "events filtered");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::EventStatus;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn image_check_rejects_empty_and_missing() {
        assert!(!is_valid_image(None));
        assert!(!is_valid_image(Some("")));
        assert!(!is_valid_image(Some("   ")));
        assert!(!is_valid_image(Some("https://cdn.example.org/flyer.pdf")));
    }

    #[test]
    fn image_check_is_case_insensitive_substring() {
        assert!(is_valid_image(Some("https://cdn.example.org/flyer.PNG")));
        assert!(is_valid_image(Some("https://cdn.example.org/a.JpEg")));
        // loose match: extension text in the query string is enough
        assert!(is_valid_image(Some("https://cdn.example.org/render?fmt=webp")));
    }

    #[test]
    fn recency_uses_ceiling_days() {
        let now = t0();
        assert!(is_recent(Some(now - Duration::days(5)), now, 5));
        // 5 days and one millisecond rounds up to 6
        assert!(!is_recent(
            Some(now - Duration::days(5) - Duration::milliseconds(1)),
            now,
            5
        ));
        assert!(is_recent(Some(now - Duration::hours(1)), now, 5));
        assert!(!is_recent(None, now, 5));
    }

    #[test]
    fn future_timestamps_count_as_recent() {
        let now = t0();
        assert!(is_recent(Some(now + Duration::days(2)), now, 5));
    }

    #[test]
    fn notices_need_both_image_and_recency() {
        let now = t0();
        let mk = |id: &str, img: Option<&str>, age_days: i64| NoticeCandidate {
            id: id.into(),
            title: id.into(),
            image_url: img.map(str::to_string),
            description: None,
            created_at: Some(now - Duration::days(age_days)),
        };
        let kept = filter_notices(
            vec![
                mk("ok", Some("a.png"), 3),
                mk("old", Some("a.png"), 10),
                mk("noimg", None, 1),
                mk("badimg", Some("a.txt"), 1),
            ],
            now,
            DEFAULT_NOTICE_MAX_AGE_DAYS,
        );
        let ids: Vec<_> = kept.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    #[test]
    fn events_only_need_an_image() {
        let mk = |id: &str, img: Option<&str>| EventCandidate {
            id: id.into(),
            title: id.into(),
            image_url: img.map(str::to_string),
            description: None,
            status: EventStatus::Past,
        };
        let kept = filter_events(vec![mk("a", Some("x.gif")), mk("b", Some(""))]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
    }
}
