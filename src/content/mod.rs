// src/content/mod.rs
pub mod fixture;
pub mod http;
pub mod types;

use anyhow::Result;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::candidate::{EventCandidate, NoticeCandidate};

/// Read-only view of the content API. Both lists arrive already filtered
/// server-side (pinned + approved notices, approved events).
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    async fn pinned_notices(&self) -> Result<Vec<NoticeCandidate>>;
    async fn approved_events(&self) -> Result<Vec<EventCandidate>>;
    fn name(&self) -> &'static str;
}

/// Both streams after the join. A failed stream is simply empty.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub notices: Vec<NoticeCandidate>,
    pub events: Vec<EventCandidate>,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "popup_fetch_errors_total",
            "Content stream fetches that failed and degraded to an empty list."
        );
    });
}

/// Issue both fetches before awaiting either, wait for both, and degrade each
/// failure to an empty list on its own.
pub async fn fetch_both(source: &dyn ContentSource) -> Fetched {
    ensure_metrics_described();

    let (notices, events) = tokio::join!(source.pinned_notices(), source.approved_events());

    Fetched {
        notices: or_empty(notices, "notices", source.name()),
        events: or_empty(events, "events", source.name()),
    }
}

fn or_empty<T>(res: Result<Vec<T>>, stream: &'static str, provider: &'static str) -> Vec<T> {
    match res {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "popup::fetch", error = ?e, stream, provider, "content fetch failed, using empty list");
            counter!("popup_fetch_errors_total", "stream" => stream).increment(1);
            Vec::new()
        }
    }
}
