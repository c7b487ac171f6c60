// src/content/http.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::types::{ListBody, RawEvent, RawNotice};
use super::ContentSource;
use crate::candidate::{EventCandidate, NoticeCandidate};

/// Talks to the site's content API over HTTP.
#[derive(Clone)]
pub struct HttpContentSource {
    http: Client,
    base_url: String,
}

impl HttpContentSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("popup-engine/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building content http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} non-2xx"))?;
        let body: ListBody<T> = resp
            .json()
            .await
            .with_context(|| format!("decoding {path} list"))?;
        Ok(body.into_vec())
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn pinned_notices(&self) -> Result<Vec<NoticeCandidate>> {
        let raw: Vec<RawNotice> = self
            .get_list("notices", &[("status", "APPROVED"), ("pinned", "true")])
            .await?;
        Ok(raw.into_iter().map(NoticeCandidate::from).collect())
    }

    async fn approved_events(&self) -> Result<Vec<EventCandidate>> {
        let raw: Vec<RawEvent> = self.get_list("events", &[("status", "APPROVED")]).await?;
        Ok(raw.into_iter().map(EventCandidate::from).collect())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
