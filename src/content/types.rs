// src/content/types.rs
//! Wire shapes of the content API and their conversion into candidates.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::candidate::{EventCandidate, EventStatus, NoticeCandidate};

/// The API answers with either a bare array or `{ "data": [...] }` (`results` for paginated lists).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "results")]
        data: Vec<T>,
    },
}

impl<T> ListBody<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListBody::Bare(v) => v,
            ListBody::Wrapped { data } => data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNotice {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub flyer: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub event_status: Option<String>,
}

impl From<RawNotice> for NoticeCandidate {
    fn from(n: RawNotice) -> Self {
        // flyer wins; fall back to the generic image field
        let image_url = non_empty(n.flyer).or_else(|| non_empty(n.image));
        Self {
            id: n.id,
            title: n.title.unwrap_or_default(),
            image_url,
            description: non_empty(n.content),
            created_at: n.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

impl From<RawEvent> for EventCandidate {
    fn from(e: RawEvent) -> Self {
        Self {
            id: e.id,
            title: e.title.unwrap_or_default(),
            image_url: non_empty(e.image),
            description: non_empty(e.description),
            status: EventStatus::parse(e.event_status.as_deref().unwrap_or_default()),
        }
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

/// RFC 3339 first, then a naive `YYYY-MM-DDTHH:MM:SS[.f]` read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|n| n.and_utc())
}

fn id_as_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("unsupported id: {other}"))),
    }
}
