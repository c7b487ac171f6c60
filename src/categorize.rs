use crate::candidate::{EventCandidate, EventStatus};

/// Validated events split by status. Past and unknown statuses are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedEvents {
    pub ongoing: Vec<EventCandidate>,
    pub upcoming: Vec<EventCandidate>,
}

impl CategorizedEvents {
    pub fn is_empty(&self) -> bool {
        self.ongoing.is_empty() && self.upcoming.is_empty()
    }
}

/// Input order is kept inside each bucket.
pub fn categorize(events: Vec<EventCandidate>) -> CategorizedEvents {
    let mut out = CategorizedEvents::default();
    for e in events {
        match e.status {
            EventStatus::Running => out.ongoing.push(e),
            EventStatus::Upcoming => out.upcoming.push(e),
            EventStatus::Past | EventStatus::Other(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: &str, status: EventStatus) -> EventCandidate {
        EventCandidate {
            id: id.into(),
            title: id.into(),
            image_url: Some("x.png".into()),
            description: None,
            status,
        }
    }

    #[test]
    fn buckets_are_disjoint_and_drop_past() {
        let c = categorize(vec![
            ev("r1", EventStatus::Running),
            ev("u1", EventStatus::Upcoming),
            ev("p1", EventStatus::Past),
            ev("x1", EventStatus::Other("draft".into())),
            ev("r2", EventStatus::Running),
        ]);
        let on: Vec<_> = c.ongoing.iter().map(|e| e.id.as_str()).collect();
        let up: Vec<_> = c.upcoming.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(on, vec!["r1", "r2"]);
        assert_eq!(up, vec!["u1"]);
    }

    #[test]
    fn only_past_events_leave_nothing() {
        let c = categorize(vec![ev("p", EventStatus::Past)]);
        assert!(c.is_empty());
    }
}
