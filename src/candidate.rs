//! candidate.rs — popup candidates built fresh from the content streams on every evaluation.
//!
//! Notices and events share one output shape (`PopupCandidate`) so the suppression
//! store and the display side only need to look at `kind`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which content stream a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Notice,
    Event,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Notice => "notice",
            CandidateKind::Event => "event",
        }
    }
}

/// Server-computed event status. Anything the API sends besides the three known
/// values lands in `Other` and is ignored by the categorizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Upcoming,
    Running,
    Past,
    Other(String),
}

impl EventStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "upcoming" => EventStatus::Upcoming,
            "running" => EventStatus::Running,
            "past" => EventStatus::Past,
            _ => EventStatus::Other(raw.to_string()),
        }
    }
}

/// A pinned, approved notice.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeCandidate {
    pub id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// An approved event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventCandidate {
    pub id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub status: EventStatus,
}

/// The single item handed to the display side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupCandidate {
    pub id: String,
    pub title: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: CandidateKind,
}

impl From<&NoticeCandidate> for PopupCandidate {
    fn from(n: &NoticeCandidate) -> Self {
        Self {
            id: n.id.clone(),
            title: n.title.clone(),
            image_url: n.image_url.clone().unwrap_or_default(),
            description: n.description.clone(),
            kind: CandidateKind::Notice,
        }
    }
}

impl From<&EventCandidate> for PopupCandidate {
    fn from(e: &EventCandidate) -> Self {
        Self {
            id: e.id.clone(),
            title: e.title.clone(),
            image_url: e.image_url.clone().unwrap_or_default(),
            description: e.description.clone(),
            kind: CandidateKind::Event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parse_is_case_insensitive_and_keeps_unknown() {
        assert_eq!(EventStatus::parse("RUNNING"), EventStatus::Running);
        assert_eq!(EventStatus::parse(" upcoming "), EventStatus::Upcoming);
        assert_eq!(EventStatus::parse("past"), EventStatus::Past);
        assert_eq!(
            EventStatus::parse("cancelled"),
            EventStatus::Other("cancelled".into())
        );
    }

    #[test]
    fn popup_candidate_serializes_kind_lowercase() {
        let e = EventCandidate {
            id: "7".into(),
            title: "Hack night".into(),
            image_url: Some("https://cdn.example.org/e7.webp".into()),
            description: None,
            status: EventStatus::Running,
        };
        let v = serde_json::to_value(PopupCandidate::from(&e)).unwrap();
        assert_eq!(v["kind"], json!("event"));
        assert_eq!(v["image_url"], json!("https://cdn.example.org/e7.webp"));
        assert!(v.get("description").is_none());
    }
}
