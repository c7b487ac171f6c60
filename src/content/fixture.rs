// src/content/fixture.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use super::types::{ListBody, RawEvent, RawNotice};
use super::ContentSource;
use crate::candidate::{EventCandidate, NoticeCandidate};

/// Static content parsed from JSON, for tests and local demos.
/// Either stream can be switched to fail so degraded paths can be exercised.
#[derive(Debug, Clone, Default)]
pub struct FixtureContentSource {
    pub notices: Vec<NoticeCandidate>,
    pub events: Vec<EventCandidate>,
    fail_notices: bool,
    fail_events: bool,
}

impl FixtureContentSource {
    pub fn new(notices: Vec<NoticeCandidate>, events: Vec<EventCandidate>) -> Self {
        Self {
            notices,
            events,
            ..Self::default()
        }
    }

    /// Same payload shapes the HTTP API returns.
    pub fn from_json(notices_json: &str, events_json: &str) -> Result<Self> {
        let notices: ListBody<RawNotice> =
            serde_json::from_str(notices_json).context("parsing notices fixture")?;
        let events: ListBody<RawEvent> =
            serde_json::from_str(events_json).context("parsing events fixture")?;
        Ok(Self::new(
            notices.into_vec().into_iter().map(Into::into).collect(),
            events.into_vec().into_iter().map(Into::into).collect(),
        ))
    }

    pub fn failing_notices(mut self) -> Self {
        self.fail_notices = true;
        self
    }

    pub fn failing_events(mut self) -> Self {
        self.fail_events = true;
        self
    }
}

#[async_trait]
impl ContentSource for FixtureContentSource {
    async fn pinned_notices(&self) -> Result<Vec<NoticeCandidate>> {
        if self.fail_notices {
            return Err(anyhow!("fixture: notices unavailable"));
        }
        Ok(self.notices.clone())
    }

    async fn approved_events(&self) -> Result<Vec<EventCandidate>> {
        if self.fail_events {
            return Err(anyhow!("fixture: events unavailable"));
        }
        Ok(self.events.clone())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
